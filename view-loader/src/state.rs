use crate::descriptor::EndpointDescriptor;
use crate::errors::RequestError;
use indexmap::IndexMap;

pub type BatchId = u64;

/// Loading state of one mounted view.
///
/// Mutated only through the reducers below, each applied atomically to the
/// whole value by the orchestrator.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchState {
    /// Any request of the current batch is outstanding
    pub loading: bool,
    /// A soft reload is running while previously loaded data stays visible
    pub reloading: bool,
    /// Sticky for the batch: set once any endpoint fails
    pub error: bool,
    pub errors_by_key: IndexMap<String, RequestError>,
    pub results_by_key: IndexMap<String, Option<serde_json::Value>>,
    pub pagination_links_by_key: IndexMap<String, Option<String>>,
    pub remaining_requests: usize,
    batch: Option<BatchId>,
}

/// State merged into a new batch, used by the reload path.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StateOverrides {
    pub reloading: Option<bool>,
}

impl StateOverrides {
    pub fn reloading() -> Self {
        StateOverrides {
            reloading: Some(true),
        }
    }
}

/// How one endpoint of a batch resolved.
#[derive(Debug)]
pub(crate) enum Resolution {
    Success {
        payload: serde_json::Value,
        pagination_link: Option<String>,
    },
    /// Failure the descriptor allows; recorded as an empty result
    Suppressed,
    Failed(RequestError),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Transition {
    pub remaining: usize,
    pub error: bool,
}

impl Transition {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    pub fn all_succeeded(&self) -> bool {
        self.is_complete() && !self.error
    }
}

impl FetchState {
    /// Default state of a freshly mounted view: every endpoint unresolved.
    pub fn new(descriptors: &[EndpointDescriptor]) -> Self {
        FetchState {
            loading: true,
            reloading: false,
            error: false,
            errors_by_key: IndexMap::new(),
            results_by_key: descriptors
                .iter()
                .map(|d| (d.state_key.clone(), None))
                .collect(),
            pagination_links_by_key: descriptors
                .iter()
                .map(|d| (d.state_key.clone(), None))
                .collect(),
            remaining_requests: 0,
            batch: None,
        }
    }

    pub fn result(&self, key: &str) -> Option<&serde_json::Value> {
        self.results_by_key.get(key).and_then(Option::as_ref)
    }

    pub fn pagination_link(&self, key: &str) -> Option<&str> {
        self.pagination_links_by_key
            .get(key)
            .and_then(|link| link.as_deref())
    }

    /// The batch whose results this state accepts, `None` once detached.
    pub fn batch(&self) -> Option<BatchId> {
        self.batch
    }

    pub(crate) fn begin_batch(&mut self, batch: BatchId, requests: usize, overrides: StateOverrides) {
        self.batch = Some(batch);
        self.loading = true;
        self.error = false;
        self.errors_by_key.clear();
        self.remaining_requests = requests;
        if let Some(reloading) = overrides.reloading {
            self.reloading = reloading;
        }
    }

    /// Settles the state without issuing any request.
    pub(crate) fn finish_empty(&mut self) {
        self.batch = None;
        self.loading = false;
        self.reloading = false;
        self.error = false;
        self.remaining_requests = 0;
    }

    /// Stops accepting results; every later reducer call is a no-op.
    pub(crate) fn detach(&mut self) {
        self.batch = None;
    }

    /// Applies the resolution of `key`. Returns `None` if `batch` is not the live
    /// batch or has already completed.
    pub(crate) fn resolve(
        &mut self,
        batch: BatchId,
        key: &str,
        resolution: Resolution,
    ) -> Option<Transition> {
        if self.batch != Some(batch) || self.remaining_requests == 0 {
            return None;
        }

        match resolution {
            Resolution::Success {
                payload,
                pagination_link,
            } => {
                self.results_by_key.insert(key.to_string(), Some(payload));
                self.pagination_links_by_key
                    .insert(key.to_string(), pagination_link);
            }
            Resolution::Suppressed => {
                self.results_by_key.insert(key.to_string(), None);
                self.pagination_links_by_key.insert(key.to_string(), None);
                self.errors_by_key.shift_remove(key);
            }
            Resolution::Failed(error) => {
                self.results_by_key.insert(key.to_string(), None);
                self.pagination_links_by_key.insert(key.to_string(), None);
                self.errors_by_key.insert(key.to_string(), error);
                self.error = true;
            }
        }

        self.remaining_requests -= 1;
        self.loading = self.remaining_requests > 0;
        self.reloading = self.reloading && self.loading;

        Some(Transition {
            remaining: self.remaining_requests,
            error: self.error,
        })
    }

    /// Ends any live batch with `error` recorded under `key`, e.g. when the
    /// view could not produce its endpoint list.
    pub(crate) fn fail(&mut self, key: &str, error: RequestError) {
        self.batch = None;
        self.loading = false;
        self.reloading = false;
        self.error = true;
        self.remaining_requests = 0;
        self.errors_by_key.insert(key.to_string(), error);
    }

    /// Records a panicking hook of the live batch as an error of `key`.
    pub(crate) fn record_hook_failure(&mut self, batch: BatchId, key: &str, message: String) -> bool {
        if self.batch != Some(batch) {
            return false;
        }
        self.errors_by_key
            .insert(key.to_string(), RequestError::Internal(message));
        self.error = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use serde_json::json;

    fn descriptors(keys: &[&str]) -> Vec<EndpointDescriptor> {
        keys.iter()
            .map(|key| EndpointDescriptor::new(*key, format!("/{key}/")))
            .collect()
    }

    fn success(payload: serde_json::Value) -> Resolution {
        Resolution::Success {
            payload,
            pagination_link: None,
        }
    }

    fn server_error() -> RequestError {
        RequestError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: None,
        }
    }

    #[test]
    fn test_default_state() {
        let state = FetchState::new(&descriptors(&["a", "b"]));
        assert!(state.loading);
        assert!(!state.error);
        assert_eq!(state.results_by_key.len(), 2);
        assert!(state.results_by_key.values().all(Option::is_none));
        assert_eq!(state.batch(), None);
    }

    #[test]
    fn test_remaining_requests_countdown() {
        let mut state = FetchState::new(&descriptors(&["a", "b", "c"]));
        state.begin_batch(1, 3, StateOverrides::default());

        let first = state.resolve(1, "a", success(json!(1))).unwrap();
        assert_eq!(first.remaining, 2);
        assert!(state.loading);

        let second = state.resolve(1, "b", Resolution::Failed(server_error())).unwrap();
        assert_eq!(second.remaining, 1);
        assert!(state.loading);
        assert!(state.error);

        // Sticky error survives a later success
        let last = state.resolve(1, "c", success(json!(3))).unwrap();
        assert!(last.is_complete());
        assert!(!last.all_succeeded());
        assert!(!state.loading);
        assert!(state.error);
        assert_eq!(state.remaining_requests, 0);
        assert_eq!(state.result("b"), None);
        assert_eq!(state.result("c"), Some(&json!(3)));

        // Nothing left to resolve in a completed batch
        assert_eq!(state.resolve(1, "a", success(json!(2))), None);
        assert_eq!(state.result("a"), Some(&json!(1)));
    }

    #[test]
    fn test_stale_batch_is_ignored() {
        let mut state = FetchState::new(&descriptors(&["a"]));
        state.begin_batch(1, 1, StateOverrides::default());
        state.begin_batch(2, 1, StateOverrides::default());

        assert_eq!(state.resolve(1, "a", success(json!("old"))), None);
        assert_eq!(state.remaining_requests, 1);

        state.detach();
        assert_eq!(state.resolve(2, "a", success(json!("new"))), None);
        assert!(!state.record_hook_failure(2, "a", "boom".into()));
        assert!(state.loading);
        assert_eq!(state.result("a"), None);
    }

    #[test]
    fn test_suppressed_failure() {
        let mut state = FetchState::new(&descriptors(&["optional"]));
        state.begin_batch(1, 1, StateOverrides::default());

        let transition = state.resolve(1, "optional", Resolution::Suppressed).unwrap();
        assert!(transition.all_succeeded());
        assert!(!state.error);
        assert!(state.errors_by_key.is_empty());
        assert_eq!(state.results_by_key.get("optional"), Some(&None));
    }

    #[test]
    fn test_reload_keeps_results() {
        let mut state = FetchState::new(&descriptors(&["x"]));
        state.begin_batch(1, 1, StateOverrides::default());
        state.resolve(1, "x", success(json!(42)));
        assert!(!state.reloading);

        state.begin_batch(2, 1, StateOverrides::reloading());
        assert!(state.loading);
        assert!(state.reloading);
        assert_eq!(state.result("x"), Some(&json!(42)));

        state.resolve(2, "x", success(json!(43)));
        assert!(!state.loading);
        assert!(!state.reloading);
        assert_eq!(state.result("x"), Some(&json!(43)));
    }

    #[test]
    fn test_new_batch_clears_errors() {
        let mut state = FetchState::new(&descriptors(&["a"]));
        state.begin_batch(1, 1, StateOverrides::default());
        state.resolve(1, "a", Resolution::Failed(server_error()));
        assert!(state.error);

        state.begin_batch(2, 1, StateOverrides::reloading());
        assert!(!state.error);
        assert!(state.errors_by_key.is_empty());
    }

    #[test]
    fn test_fail_ends_live_batch() {
        let mut state = FetchState::new(&descriptors(&["a"]));
        state.begin_batch(1, 1, StateOverrides::reloading());

        state.fail("endpoints", RequestError::Internal("boom".into()));
        assert!(!state.loading);
        assert!(!state.reloading);
        assert!(state.error);
        assert_eq!(state.remaining_requests, 0);
        assert_eq!(state.batch(), None);
        assert!(state.errors_by_key.contains_key("endpoints"));
        assert_eq!(state.resolve(1, "a", success(json!(1))), None);
    }

    #[test]
    fn test_finish_empty() {
        let mut state = FetchState::new(&[]);
        state.finish_empty();
        assert!(!state.loading);
        assert!(!state.error);
        assert_eq!(state.remaining_requests, 0);
        assert_eq!(state.batch(), None);
    }
}
