//! Loading of remote data for views that depend on several API endpoints.
//!
//! A [`View`] declares its endpoints. The [`LifecycleController`] requests all
//! of them concurrently through a per-view [`ApiClient`], folds every response
//! into one [`FetchState`] and picks which of the loading, error or loaded
//! states to render.

pub mod client;
pub mod descriptor;
pub mod errors;
pub mod lifecycle;
pub mod metrics_defs;
pub mod orchestrator;
pub mod render;
pub mod route;
pub mod state;
pub mod view;

#[cfg(test)]
mod testutils;

pub use client::{ApiClient, ApiRequest, ApiResponse, Query, QueryValue, ReqwestClient};
pub use descriptor::EndpointDescriptor;
pub use errors::{LoaderError, RequestError, Result};
pub use lifecycle::{ENDPOINTS_ERROR_KEY, LifecycleController, Visibility};
pub use render::{ErrorView, RenderPhase};
pub use route::{Location, RouteContext};
pub use state::FetchState;
pub use view::{RequestHooks, View};
