//! Mount, reload and teardown of a data-bound view.

use crate::client::ApiClient;
use crate::descriptor::{EndpointDescriptor, validate_descriptors};
use crate::errors::{LoaderError, RequestError, Result};
use crate::orchestrator::FetchOrchestrator;
use crate::render::{ErrorView, RenderFlags, RenderPhase, select};
use crate::route::RouteContext;
use crate::state::{BatchId, FetchState, StateOverrides};
use crate::view::{RequestHooks, View, catch_hook, guard_hook};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// State key under which a failure to build the endpoint list is recorded.
pub const ENDPOINTS_ERROR_KEY: &str = "view.endpoints";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Drives a [`View`] through loading, reloading and unmounting.
///
/// Owns the view's API client exclusively, so clearing requests never affects
/// another mounted view. Dropping the controller unmounts it.
pub struct LifecycleController<V: View, C: ApiClient> {
    view: Arc<V>,
    orchestrator: FetchOrchestrator<C>,
    route: RouteContext,
    visibility_listener: bool,
    mounted: bool,
    reported_failure: BatchLatch,
    reported_body_error: BatchLatch,
}

/// Remembers the last batch it was opened for, so something happens once per batch.
struct BatchLatch(AtomicU64);

impl BatchLatch {
    // Batch ids start at 1 and a detached state counts as 0
    const UNSET: u64 = u64::MAX;

    fn new() -> Self {
        BatchLatch(AtomicU64::new(Self::UNSET))
    }

    /// Returns true the first time it is called for `batch`.
    fn first(&self, batch: Option<BatchId>) -> bool {
        let batch = batch.unwrap_or_default();
        self.0.swap(batch, Ordering::Relaxed) != batch
    }
}

impl<V: View, C: ApiClient> LifecycleController<V, C> {
    /// Mounts `view` and starts loading its endpoints.
    pub fn mount(view: Arc<V>, client: C, route: RouteContext) -> Result<Self> {
        let descriptors = guard_hook("endpoints", || view.endpoints(&route))?;
        validate_descriptors(&descriptors)?;

        let hooks: Arc<dyn RequestHooks> = view.clone();
        let orchestrator = FetchOrchestrator::new(client, hooks, FetchState::new(&descriptors));
        let visibility_listener = view.reload_on_visible();

        let mut controller = LifecycleController {
            view,
            orchestrator,
            route,
            visibility_listener,
            mounted: true,
            reported_failure: BatchLatch::new(),
            reported_body_error: BatchLatch::new(),
        };
        controller.fetch(descriptors, StateOverrides::default())?;

        tracing::debug!(
            endpoints = controller.orchestrator.state().results_by_key.len(),
            visibility_listener,
            "Mounted view"
        );
        Ok(controller)
    }

    pub fn state(&self) -> FetchState {
        self.orchestrator.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.orchestrator.subscribe()
    }

    pub fn route(&self) -> &RouteContext {
        &self.route
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Waits until the current batch has fully resolved.
    pub async fn settled(&self) -> Result<FetchState> {
        // A detached batch never resolves
        self.ensure_mounted()?;
        let mut rx = self.orchestrator.subscribe();
        let state = rx
            .wait_for(|state| !state.loading)
            .await
            .map_err(|_| LoaderError::StateClosed)?;
        Ok(state.clone())
    }

    /// Refetches every endpoint while keeping the loaded data.
    pub fn reload(&mut self) -> Result<()> {
        self.ensure_mounted()?;
        let descriptors = self.endpoints()?;
        self.fetch(descriptors, StateOverrides::reloading())
    }

    /// Refetches every endpoint. Views that opt into soft reloads keep their
    /// data on screen, all others go back to the default state.
    pub fn remount(&mut self) -> Result<()> {
        self.ensure_mounted()?;
        if self.view.should_reload() {
            return self.reload();
        }

        let descriptors = self.endpoints()?;
        self.orchestrator.replace_state(FetchState::new(&descriptors));
        self.fetch(descriptors, StateOverrides::default())
    }

    /// Moves the view to `route`. Returns whether the data was refetched.
    pub fn update_route(&mut self, route: RouteContext) -> Result<bool> {
        self.ensure_mounted()?;
        let refetch = self.route.requires_refetch(&route);
        self.route = route;

        if refetch {
            tracing::debug!("Route changed, remounting view");
            self.remount()?;
        }
        Ok(refetch)
    }

    /// Handles a visibility change of the hosting page. Returns whether a reload started.
    pub fn visibility_changed(&mut self, visibility: Visibility) -> Result<bool> {
        self.ensure_mounted()?;
        if !self.visibility_listener
            || visibility == Visibility::Hidden
            || self.orchestrator.state().loading
            || !self.view.should_reload_on_visible()
        {
            return Ok(false);
        }

        self.reload()?;
        Ok(true)
    }

    pub fn phase(&self) -> RenderPhase {
        select(&self.orchestrator.state(), &self.render_flags())
    }

    /// Renders exactly one of the loading, error or loaded states.
    pub fn render(&self) -> V::Output {
        let state = self.orchestrator.state();

        match select(&state, &self.render_flags()) {
            RenderPhase::Loading => self.view.render_loading(),
            RenderPhase::Error(error) => {
                if let ErrorView::Generic { report: true } = error {
                    self.report_load_failure(&state);
                }
                self.view.render_error(&error, &state)
            }
            RenderPhase::Body => match catch_hook("render_body", || self.view.render_body(&state)) {
                Ok(Ok(output)) => output,
                Ok(Err(e)) | Err(e) => {
                    if self.reported_body_error.first(state.batch()) {
                        tracing::error!(error = %e, "Failed to render view body");
                    }
                    self.view
                        .render_error(&ErrorView::Generic { report: true }, &state)
                }
            },
        }
    }

    /// Cancels outstanding requests and detaches listeners. Idempotent.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.visibility_listener = false;
        self.orchestrator.shutdown();
        tracing::debug!("Unmounted view");
    }

    fn render_flags(&self) -> RenderFlags {
        RenderFlags {
            should_reload: self.view.should_reload(),
            should_render_bad_requests: self.view.should_render_bad_requests(),
        }
    }

    /// Builds and validates the endpoint list. A failure settles the view in
    /// the error state before it is returned.
    fn endpoints(&mut self) -> Result<Vec<EndpointDescriptor>> {
        let descriptors = guard_hook("endpoints", || self.view.endpoints(&self.route))
            .and_then(|descriptors| {
                validate_descriptors(&descriptors)?;
                Ok(descriptors)
            });

        if let Err(e) = &descriptors {
            tracing::error!(error = %e, "Could not build endpoint list");
            self.orchestrator
                .fail(ENDPOINTS_ERROR_KEY, RequestError::Internal(e.to_string()));
        }
        descriptors
    }

    fn fetch(&mut self, descriptors: Vec<EndpointDescriptor>, overrides: StateOverrides) -> Result<()> {
        let location_query = self.route.location.query();
        self.orchestrator
            .fetch_all(descriptors, &location_query, overrides)
    }

    fn report_load_failure(&self, state: &FetchState) {
        if !self.reported_failure.first(state.batch()) {
            return;
        }

        let failed: Vec<String> = state
            .errors_by_key
            .iter()
            .map(|(key, error)| format!("{key}: {error}"))
            .collect();
        tracing::error!(
            failed = %failed.join(", "),
            "Unable to load all required endpoints"
        );
    }

    fn ensure_mounted(&self) -> Result<()> {
        match self.mounted {
            true => Ok(()),
            false => Err(LoaderError::Unmounted),
        }
    }
}

impl<V: View, C: ApiClient> Drop for LifecycleController<V, C> {
    fn drop(&mut self) {
        self.unmount();
    }
}
