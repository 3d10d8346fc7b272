use http::StatusCode;
use thiserror::Error;

/// Result type alias for view-loader operations
pub type Result<T, E = LoaderError> = std::result::Result<T, E>;

/// Failure of a single endpoint request.
///
/// These never escape the loader: they are recorded per state key and drive
/// which error view gets rendered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// The request was cancelled before a response arrived
    #[error("Request aborted")]
    Aborted,

    #[error("Request timed out")]
    Timeout,

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The server answered with a non-success status
    #[error("HTTP {status}")]
    Status {
        status: StatusCode,
        body: Option<serde_json::Value>,
    },

    #[error("Invalid response body (HTTP {status}): {message}")]
    InvalidBody { status: StatusCode, message: String },

    /// Raised inside the loader itself, e.g. by a panicking view hook
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RequestError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::Status { status, .. } | RequestError::InvalidBody { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// The numeric status, `0` when no response was received.
    pub fn status_code(&self) -> u16 {
        self.status().map_or(0, |status| status.as_u16())
    }

    /// Structured `detail` message of an error response body, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            RequestError::Status {
                body: Some(body), ..
            } => body.get("detail").and_then(serde_json::Value::as_str),
            _ => None,
        }
    }

    /// Raw response text, used for breadcrumbs.
    pub fn response_text(&self) -> Option<String> {
        match self {
            RequestError::Status {
                body: Some(body), ..
            } => Some(body.to_string()),
            _ => None,
        }
    }
}

/// Errors in how the loader is driven by its view.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoaderError {
    #[error("Endpoint descriptor has an empty state key")]
    EmptyStateKey,

    #[error("Duplicate state key in endpoint list: {0}")]
    DuplicateStateKey(String),

    #[error("render_body is not implemented")]
    NotImplemented,

    #[error("Data for {0} is not ready")]
    NotReady(String),

    #[error("View is unmounted")]
    Unmounted,

    #[error("View hook {hook} panicked: {message}")]
    HookPanicked { hook: &'static str, message: String },

    #[error("State channel closed")]
    StateClosed,

    #[error("Failed to render view: {0}")]
    Render(String),
}
