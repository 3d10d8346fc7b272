use crate::client::ApiResponse;
use crate::descriptor::EndpointDescriptor;
use crate::errors::{LoaderError, RequestError, Result};
use crate::render::ErrorView;
use crate::route::RouteContext;
use crate::state::FetchState;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Notifications about individual requests. All methods default to no-ops.
pub trait RequestHooks: Send + Sync {
    fn on_request_success(&self, _state_key: &str, _response: &ApiResponse) {}

    /// Also called for failures the descriptor allows.
    fn on_request_error(&self, _state_key: &str, _error: &RequestError) {}

    /// Called once per batch when every endpoint loaded without error.
    fn on_all_endpoints_succeeded(&self) {}
}

/// A view whose content depends on a set of remote endpoints.
pub trait View: RequestHooks + 'static {
    type Output;

    fn endpoints(&self, route: &RouteContext) -> Vec<EndpointDescriptor>;

    fn render_loading(&self) -> Self::Output;

    fn render_error(&self, error: &ErrorView, state: &FetchState) -> Self::Output;

    /// Renders the loaded state. Only called once every endpoint resolved.
    fn render_body(&self, _state: &FetchState) -> Result<Self::Output> {
        Err(LoaderError::NotImplemented)
    }

    /// Attach a visibility listener on mount
    fn reload_on_visible(&self) -> bool {
        false
    }

    /// Checked each time the view becomes visible again
    fn should_reload_on_visible(&self) -> bool {
        false
    }

    /// Keep loaded data on screen while refetching instead of showing the loading state
    fn should_reload(&self) -> bool {
        false
    }

    /// Show `detail` messages of 400 responses instead of the generic error
    fn should_render_bad_requests(&self) -> bool {
        false
    }
}

/// Runs a view hook, turning a panic into [`LoaderError::HookPanicked`].
pub(crate) fn guard_hook<T>(hook: &'static str, f: impl FnOnce() -> T) -> Result<T> {
    catch_hook(hook, f).inspect_err(|e| tracing::error!(hook, error = %e, "View hook panicked"))
}

/// Like [`guard_hook`], leaving the logging to the caller.
pub(crate) fn catch_hook<T>(hook: &'static str, f: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| LoaderError::HookPanicked {
        hook,
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_hook() {
        assert_eq!(guard_hook("endpoints", || 3), Ok(3));

        let error = guard_hook("on_request_success", || -> usize {
            panic!("missing field {}", "id");
        })
        .unwrap_err();
        assert_eq!(
            error,
            LoaderError::HookPanicked {
                hook: "on_request_success",
                message: "missing field id".into(),
            }
        );

        let error = guard_hook("render_body", || std::panic::panic_any(7u8)).unwrap_err();
        assert!(error.to_string().contains("unknown panic"));
    }
}
