//! Selection of what a view shows for a given [`FetchState`].

use crate::state::FetchState;
use http::StatusCode;

pub const UNAUTHORIZED_MESSAGE: &str = "You are not authorized to access this resource.";
pub const PERMISSION_DENIED_MESSAGE: &str = "You don't have permission to access this resource.";
pub const GENERIC_ERROR_MESSAGE: &str = "There was an error loading data.";

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderFlags {
    pub should_reload: bool,
    pub should_render_bad_requests: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorView {
    /// An endpoint answered 401
    Unauthorized,
    /// An endpoint answered 403
    PermissionDenied,
    /// Deduplicated `detail` messages of 400 responses
    BadRequest(Vec<String>),
    /// Any other failure. `report` is false when every recorded failure is a
    /// request that never got a response.
    Generic { report: bool },
}

impl ErrorView {
    pub fn message(&self) -> String {
        match self {
            ErrorView::Unauthorized => UNAUTHORIZED_MESSAGE.to_string(),
            ErrorView::PermissionDenied => PERMISSION_DENIED_MESSAGE.to_string(),
            ErrorView::BadRequest(details) => details.join("\n"),
            ErrorView::Generic { .. } => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderPhase {
    Loading,
    Error(ErrorView),
    Body,
}

pub fn select(state: &FetchState, flags: &RenderFlags) -> RenderPhase {
    if state.loading && (!flags.should_reload || !state.reloading) {
        return RenderPhase::Loading;
    }

    if state.error {
        return RenderPhase::Error(error_view(state, flags));
    }

    RenderPhase::Body
}

fn error_view(state: &FetchState, flags: &RenderFlags) -> ErrorView {
    let errors = || state.errors_by_key.values();

    if errors().any(|e| e.status() == Some(StatusCode::UNAUTHORIZED)) {
        return ErrorView::Unauthorized;
    }

    if errors().any(|e| e.status() == Some(StatusCode::FORBIDDEN)) {
        return ErrorView::PermissionDenied;
    }

    if flags.should_render_bad_requests {
        let mut details: Vec<String> = Vec::new();
        for detail in errors()
            .filter(|e| e.status() == Some(StatusCode::BAD_REQUEST))
            .filter_map(|e| e.detail())
        {
            if !details.iter().any(|seen| seen == detail) {
                details.push(detail.to_string());
            }
        }
        if !details.is_empty() {
            return ErrorView::BadRequest(details);
        }
    }

    ErrorView::Generic {
        report: errors().any(|e| e.status_code() != 0),
    }
}
