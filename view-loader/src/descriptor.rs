use crate::client::{ApiRequest, Query, QueryValue};
use crate::errors::{LoaderError, RequestError, Result};
use http::{Method, StatusCode};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Query key carrying the pagination cursor in the hosting location.
pub const CURSOR_PARAM: &str = "cursor";

/// Decides whether a failed request should be treated as an empty result.
pub type AllowError = Arc<dyn Fn(&RequestError) -> bool + Send + Sync>;

#[derive(Clone, Debug, PartialEq)]
pub struct RequestParams {
    pub method: Method,
    pub query: Query,
    pub data: Option<serde_json::Value>,
}

impl Default for RequestParams {
    fn default() -> Self {
        RequestParams {
            method: Method::GET,
            query: Query::new(),
            data: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct EndpointOptions {
    /// Forward the whole location query, not only the cursor
    pub paginate: bool,
    /// Never merge the location query into this endpoint's request
    pub disable_entire_query: bool,
    pub allow_error: Option<AllowError>,
}

impl fmt::Debug for EndpointOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointOptions")
            .field("paginate", &self.paginate)
            .field("disable_entire_query", &self.disable_entire_query)
            .field("allow_error", &self.allow_error.is_some())
            .finish()
    }
}

/// A remote resource a view depends on, stored under `state_key` once loaded.
#[derive(Clone, Debug)]
pub struct EndpointDescriptor {
    pub state_key: String,
    pub url: String,
    pub params: RequestParams,
    pub options: EndpointOptions,
}

impl EndpointDescriptor {
    pub fn new(state_key: impl Into<String>, url: impl Into<String>) -> Self {
        EndpointDescriptor {
            state_key: state_key.into(),
            url: url.into(),
            params: RequestParams::default(),
            options: EndpointOptions::default(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.params.method = method;
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.params.query.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.params.data = Some(data);
        self
    }

    pub fn paginate(mut self) -> Self {
        self.options.paginate = true;
        self
    }

    pub fn disable_entire_query(mut self) -> Self {
        self.options.disable_entire_query = true;
        self
    }

    pub fn allow_error<F>(mut self, allow: F) -> Self
    where
        F: Fn(&RequestError) -> bool + Send + Sync + 'static,
    {
        self.options.allow_error = Some(Arc::new(allow));
        self
    }

    /// Treats responses with `status` as an empty result, e.g. 404 for optional resources.
    pub fn allow_status(self, status: StatusCode) -> Self {
        self.allow_error(move |error| error.status() == Some(status))
    }

    pub(crate) fn is_error_allowed(&self, error: &RequestError) -> bool {
        self.options
            .allow_error
            .as_ref()
            .is_some_and(|allow| allow(error))
    }

    /// Builds the request for this endpoint.
    ///
    /// The hosting location's query is merged in when the endpoint paginates or the
    /// location already carries a cursor, so lists keep their page across reloads.
    /// Keys set on the descriptor take precedence.
    pub fn build_request(&self, location_query: &Query) -> ApiRequest {
        let forward_location = (self.options.paginate || location_query.contains_key(CURSOR_PARAM))
            && !self.options.disable_entire_query;

        let query = if forward_location {
            let mut merged = location_query.clone();
            merged.extend(self.params.query.clone());
            merged
        } else {
            self.params.query.clone()
        };

        ApiRequest {
            method: self.params.method.clone(),
            url: self.url.clone(),
            query,
            body: self.params.data.clone(),
        }
    }
}

/// Checks that every state key is present and unique.
pub fn validate_descriptors(descriptors: &[EndpointDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        if descriptor.state_key.is_empty() {
            return Err(LoaderError::EmptyStateKey);
        }
        if !seen.insert(descriptor.state_key.as_str()) {
            return Err(LoaderError::DuplicateStateKey(descriptor.state_key.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(pairs: &[(&str, &str)]) -> Query {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), QueryValue::from(*value)))
            .collect()
    }

    #[test]
    fn test_query_not_forwarded_by_default() {
        let descriptor = EndpointDescriptor::new("plugins", "/projects/acme/web/plugins/")
            .with_query("status", "active");
        let request = descriptor.build_request(&location(&[("query", "is:unresolved")]));

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.query, location(&[("status", "active")]));
    }

    #[test]
    fn test_paginate_forwards_location_query() {
        let descriptor = EndpointDescriptor::new("issues", "/issues/")
            .with_query("limit", "25")
            .with_query("query", "is:resolved")
            .paginate();
        let request = descriptor.build_request(&location(&[
            ("query", "is:unresolved"),
            ("sort", "date"),
        ]));

        // Descriptor keys win over the location
        assert_eq!(
            request.query,
            location(&[("query", "is:resolved"), ("sort", "date"), ("limit", "25")])
        );
    }

    #[test]
    fn test_cursor_forwards_location_query() {
        let descriptor = EndpointDescriptor::new("issues", "/issues/");
        let request = descriptor.build_request(&location(&[("cursor", "0:25:0")]));
        assert_eq!(request.query, location(&[("cursor", "0:25:0")]));

        let request = descriptor
            .disable_entire_query()
            .build_request(&location(&[("cursor", "0:25:0")]));
        assert!(request.query.is_empty());
    }

    #[test]
    fn test_allow_status() {
        let descriptor =
            EndpointDescriptor::new("release", "/releases/latest/").allow_status(StatusCode::NOT_FOUND);

        assert!(descriptor.is_error_allowed(&RequestError::Status {
            status: StatusCode::NOT_FOUND,
            body: None,
        }));
        assert!(!descriptor.is_error_allowed(&RequestError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: None,
        }));
        assert!(!EndpointDescriptor::new("a", "/a/").is_error_allowed(&RequestError::Aborted));
    }

    #[test]
    fn test_validate_descriptors() {
        assert!(validate_descriptors(&[]).is_ok());
        assert!(
            validate_descriptors(&[
                EndpointDescriptor::new("a", "/a/"),
                EndpointDescriptor::new("b", "/b/"),
            ])
            .is_ok()
        );
        assert_eq!(
            validate_descriptors(&[
                EndpointDescriptor::new("a", "/a/"),
                EndpointDescriptor::new("a", "/other/"),
            ]),
            Err(LoaderError::DuplicateStateKey("a".into()))
        );
        assert_eq!(
            validate_descriptors(&[EndpointDescriptor::new("", "/a/")]),
            Err(LoaderError::EmptyStateKey)
        );
    }
}
