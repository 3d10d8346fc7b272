use crate::config::{EndpointConfig, ViewConfig};
use http::{Method, StatusCode};
use serde_json::{Map, Value};
use view_loader::{
    ApiResponse, EndpointDescriptor, ErrorView, FetchState, Location, LoaderError, RequestHooks,
    Result, RouteContext, View,
};

/// A view assembled from a `views` entry of the config file.
///
/// Renders the loaded results as one JSON object keyed by state key.
pub struct ConfiguredView {
    name: String,
    config: ViewConfig,
}

impl ConfiguredView {
    pub fn new(name: impl Into<String>, config: ViewConfig) -> Self {
        ConfiguredView {
            name: name.into(),
            config,
        }
    }

    pub fn route(&self) -> RouteContext {
        let mut route = RouteContext::new(Location::with_search(&self.config.location));
        for (key, value) in &self.config.params {
            route = route.with_param(key.clone(), value.clone());
        }
        route
    }

    fn descriptor(endpoint: &EndpointConfig) -> EndpointDescriptor {
        let mut descriptor = EndpointDescriptor::new(&endpoint.key, &endpoint.url);

        // Validated when the config was loaded
        if let Ok(method) = Method::from_bytes(endpoint.method.as_bytes()) {
            descriptor = descriptor.with_method(method);
        }
        for (key, value) in &endpoint.query {
            descriptor = descriptor.with_query(key.clone(), value.clone());
        }
        if endpoint.paginate {
            descriptor = descriptor.paginate();
        }

        let allowed: Vec<StatusCode> = endpoint
            .allow_status
            .iter()
            .filter_map(|status| StatusCode::from_u16(*status).ok())
            .collect();
        if !allowed.is_empty() {
            descriptor = descriptor
                .allow_error(move |error| error.status().is_some_and(|s| allowed.contains(&s)));
        }

        descriptor
    }
}

impl RequestHooks for ConfiguredView {
    fn on_request_success(&self, state_key: &str, response: &ApiResponse) {
        tracing::debug!(
            view = %self.name,
            state_key,
            status = response.status.as_u16(),
            "Loaded endpoint"
        );
    }

    fn on_all_endpoints_succeeded(&self) {
        tracing::info!(view = %self.name, "All endpoints loaded");
    }
}

impl View for ConfiguredView {
    type Output = String;

    fn endpoints(&self, _route: &RouteContext) -> Vec<EndpointDescriptor> {
        self.config.endpoints.iter().map(Self::descriptor).collect()
    }

    fn render_loading(&self) -> String {
        "Loading...".into()
    }

    fn render_error(&self, error: &ErrorView, _state: &FetchState) -> String {
        error.message()
    }

    fn render_body(&self, state: &FetchState) -> Result<String> {
        let mut body = Map::new();
        for endpoint in &self.config.endpoints {
            let mut entry = Map::new();
            entry.insert(
                "data".into(),
                state.result(&endpoint.key).cloned().unwrap_or(Value::Null),
            );
            if let Some(link) = state.pagination_link(&endpoint.key) {
                entry.insert("pagination".into(), Value::String(link.to_string()));
            }
            body.insert(endpoint.key.clone(), Value::Object(entry));
        }

        serde_json::to_string_pretty(&Value::Object(body))
            .map_err(|e| LoaderError::Render(e.to_string()))
    }

    fn should_render_bad_requests(&self) -> bool {
        self.config.should_render_bad_requests
    }
}
