use crate::client::{ApiClient, ApiRequest, ApiResponse};
use crate::errors::RequestError;
use crate::view::RequestHooks;
use async_trait::async_trait;
use http::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn status_error(status: StatusCode) -> RequestError {
    RequestError::Status { status, body: None }
}

#[derive(Default)]
struct MockInner {
    replies: Mutex<HashMap<String, Result<ApiResponse, RequestError>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    requests: Mutex<Vec<ApiRequest>>,
    clears: AtomicUsize,
}

/// Scripted API client. Clones share the same script and request log.
///
/// Unknown URLs answer 404. A gated URL holds its reply until the gate is notified.
#[derive(Clone, Default)]
pub struct MockClient {
    inner: Arc<MockInner>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: ApiResponse) {
        self.inner
            .replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(response));
    }

    pub fn fail(&self, url: &str, error: RequestError) {
        self.inner
            .replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
    }

    pub fn gate(&self, url: &str) -> Arc<Notify> {
        self.inner
            .gates
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .clone()
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn clear_count(&self) -> usize {
        self.inner.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiClient for MockClient {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        self.inner.requests.lock().unwrap().push(request.clone());

        let gate = self.inner.gates.lock().unwrap().get(&request.url).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.inner
            .replies
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Err(status_error(StatusCode::NOT_FOUND)))
    }

    fn clear(&self) {
        self.inner.clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hooks counting every notification.
#[derive(Default)]
pub struct RecordingHooks {
    pub successes: AtomicUsize,
    pub errors: AtomicUsize,
    pub all_succeeded: AtomicUsize,
    pub panic_on_success: bool,
}

impl RequestHooks for RecordingHooks {
    fn on_request_success(&self, _state_key: &str, _response: &ApiResponse) {
        self.successes.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_success {
            panic!("success hook failed");
        }
    }

    fn on_request_error(&self, _state_key: &str, _error: &RequestError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_all_endpoints_succeeded(&self) {
        self.all_succeeded.fetch_add(1, Ordering::SeqCst);
    }
}
