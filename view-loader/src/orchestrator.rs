//! Concurrent loading of every endpoint a view depends on.

use crate::client::{ApiClient, ApiRequest, Query};
use crate::descriptor::{EndpointDescriptor, validate_descriptors};
use crate::errors::{RequestError, Result};
use crate::metrics_defs::{BATCH_DURATION, REQUEST_RESULT, REQUESTS_INFLIGHT};
use crate::state::{BatchId, FetchState, Resolution, StateOverrides, Transition};
use crate::view::{RequestHooks, guard_hook};
use shared::{counter, gauge, histogram};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Issues one request per endpoint descriptor and folds the results into a
/// single [`FetchState`].
///
/// At most one batch is live at a time: starting a batch cancels every request
/// of the previous one, and results that arrive for a batch that is no longer
/// live are discarded.
pub struct FetchOrchestrator<C: ApiClient> {
    client: Arc<C>,
    hooks: Arc<dyn RequestHooks>,
    state: Arc<watch::Sender<FetchState>>,
    tasks: JoinSet<()>,
    last_batch: BatchId,
}

impl<C: ApiClient> FetchOrchestrator<C> {
    pub fn new(client: C, hooks: Arc<dyn RequestHooks>, initial: FetchState) -> Self {
        FetchOrchestrator {
            client: Arc::new(client),
            hooks,
            state: Arc::new(watch::Sender::new(initial)),
            tasks: JoinSet::new(),
            last_batch: 0,
        }
    }

    pub fn state(&self) -> FetchState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.state.subscribe()
    }

    /// Replaces the whole state, discarding the live batch.
    pub fn replace_state(&self, state: FetchState) {
        self.state.send_replace(state);
    }

    /// Starts a new batch for `descriptors`.
    pub fn fetch_all(
        &mut self,
        descriptors: Vec<EndpointDescriptor>,
        location_query: &Query,
        overrides: StateOverrides,
    ) -> Result<()> {
        if descriptors.is_empty() {
            self.abort_tasks();
            self.state.send_modify(FetchState::finish_empty);
            return Ok(());
        }

        validate_descriptors(&descriptors)?;
        self.clear();

        self.last_batch += 1;
        let batch = self.last_batch;
        let requests = descriptors.len();
        self.state
            .send_modify(|state| state.begin_batch(batch, requests, overrides));
        tracing::debug!(batch, requests, "Starting fetch batch");

        let started = Instant::now();
        for descriptor in descriptors {
            let request = descriptor.build_request(location_query);
            let task = EndpointTask {
                batch,
                started,
                client: self.client.clone(),
                hooks: self.hooks.clone(),
                state: self.state.clone(),
                descriptor,
            };
            self.tasks.spawn(task.run(request));
        }

        Ok(())
    }

    /// Cancels every outstanding request.
    pub fn clear(&mut self) {
        self.client.clear();
        self.abort_tasks();
    }

    /// Cancels outstanding requests and settles the state as failed, with
    /// `error` recorded under `key`.
    pub fn fail(&mut self, key: &str, error: RequestError) {
        self.clear();
        self.state.send_modify(|state| state.fail(key, error));
    }

    /// Cancels outstanding requests and stops accepting results for good.
    pub fn shutdown(&mut self) {
        self.clear();
        self.state.send_modify(FetchState::detach);
    }

    fn abort_tasks(&mut self) {
        // Dropping a JoinSet aborts every task in it
        self.tasks = JoinSet::new();
    }
}

struct EndpointTask<C: ApiClient> {
    batch: BatchId,
    started: Instant,
    client: Arc<C>,
    hooks: Arc<dyn RequestHooks>,
    state: Arc<watch::Sender<FetchState>>,
    descriptor: EndpointDescriptor,
}

impl<C: ApiClient> EndpointTask<C> {
    async fn run(self, request: ApiRequest) {
        let key = self.descriptor.state_key.as_str();
        let result = {
            let _inflight = InflightGuard::new();
            self.client.request(request).await
        };

        // Hooks run before the result is applied, so a panicking hook lands in
        // the same state update as the countdown.
        let resolution = match result {
            Ok(response) => {
                counter!(REQUEST_RESULT, "outcome" => "success").increment(1);
                if !self.is_live() {
                    return self.discard();
                }

                match guard_hook("on_request_success", || {
                    self.hooks.on_request_success(key, &response)
                }) {
                    Ok(()) => Resolution::Success {
                        pagination_link: response.pagination_link(),
                        payload: response.body,
                    },
                    Err(e) => Resolution::Failed(RequestError::Internal(e.to_string())),
                }
            }
            Err(error) => {
                let (mut resolution, breadcrumb) = classify(&self.descriptor, &error);
                if let Some(breadcrumb) = breadcrumb {
                    sentry::add_breadcrumb(breadcrumb);
                }
                if !self.is_live() {
                    return self.discard();
                }

                let hook = guard_hook("on_request_error", || {
                    self.hooks.on_request_error(key, &error)
                });
                if let Err(e) = hook
                    && matches!(resolution, Resolution::Suppressed)
                {
                    resolution = Resolution::Failed(RequestError::Internal(e.to_string()));
                }
                resolution
            }
        };

        match self.apply(resolution) {
            Some(transition) => self.finish(transition),
            None => self.discard(),
        }
    }

    fn is_live(&self) -> bool {
        self.state.borrow().batch() == Some(self.batch)
    }

    fn discard(&self) {
        tracing::debug!(
            batch = self.batch,
            state_key = %self.descriptor.state_key,
            "Discarding result of stale batch"
        );
    }

    /// Applies the resolution as one atomic update of the whole state.
    fn apply(&self, resolution: Resolution) -> Option<Transition> {
        let mut transition = None;
        self.state.send_if_modified(|state| {
            transition = state.resolve(self.batch, &self.descriptor.state_key, resolution);
            transition.is_some()
        });
        transition
    }

    fn finish(&self, transition: Transition) {
        if !transition.is_complete() {
            return;
        }

        let outcome = if transition.error { "error" } else { "success" };
        histogram!(BATCH_DURATION, "outcome" => outcome).record(self.started.elapsed().as_secs_f64());
        tracing::debug!(batch = self.batch, outcome, "Fetch batch complete");

        if transition.all_succeeded()
            && let Err(error) = guard_hook("on_all_endpoints_succeeded", || {
                self.hooks.on_all_endpoints_succeeded()
            })
        {
            self.state.send_if_modified(|state| {
                state.record_hook_failure(self.batch, &self.descriptor.state_key, error.to_string())
            });
        }
    }
}

/// Decides how a failed request resolves. Only failures that are not allowed
/// leave a breadcrumb.
fn classify(
    descriptor: &EndpointDescriptor,
    error: &RequestError,
) -> (Resolution, Option<sentry::Breadcrumb>) {
    let key = descriptor.state_key.as_str();
    let allowed = guard_hook("allow_error", || descriptor.is_error_allowed(error)).unwrap_or(false);

    if allowed {
        counter!(REQUEST_RESULT, "outcome" => "suppressed").increment(1);
        tracing::debug!(state_key = key, error = %error, "Ignoring allowed endpoint error");
        return (Resolution::Suppressed, None);
    }

    counter!(REQUEST_RESULT, "outcome" => "error").increment(1);
    tracing::warn!(
        state_key = key,
        url = %descriptor.url,
        error = %error,
        "Endpoint request failed"
    );
    let breadcrumb = error.response_text().map(|text| sentry::Breadcrumb {
        category: Some("xhr".into()),
        message: Some(text),
        level: sentry::Level::Error,
        ..Default::default()
    });
    (Resolution::Failed(error.clone()), breadcrumb)
}

struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        InflightGuard
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}
