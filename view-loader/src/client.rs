use crate::errors::RequestError;
use async_trait::async_trait;
use http::header::{AUTHORIZATION, HeaderMap, HeaderValue, LINK};
use http::{Method, StatusCode};
use indexmap::IndexMap;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

/// Ordered query parameters. Repeated keys are kept as a single multi-valued entry.
pub type Query = IndexMap<String, QueryValue>;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Multi(Vec<String>),
}

impl QueryValue {
    pub fn values(&self) -> &[String] {
        match self {
            QueryValue::Single(value) => std::slice::from_ref(value),
            QueryValue::Multi(values) => values,
        }
    }

    /// Adds another value for the same key.
    pub fn push(&mut self, value: String) {
        match self {
            QueryValue::Single(first) => {
                *self = QueryValue::Multi(vec![std::mem::take(first), value]);
            }
            QueryValue::Multi(values) => values.push(value),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Single(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        QueryValue::Multi(values)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Resource path, resolved against the client's base URL
    pub url: String,
    pub query: Query,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        ApiRequest {
            method: Method::GET,
            url: url.into(),
            query: Query::new(),
            body: None,
        }
    }

    /// Flattened `(key, value)` pairs in query order.
    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        self.query
            .iter()
            .flat_map(|(key, value)| {
                value
                    .values()
                    .iter()
                    .map(move |value| (key.as_str(), value.as_str()))
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn json(body: serde_json::Value) -> Self {
        ApiResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn with_pagination_link(mut self, link: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(link) {
            self.headers.insert(LINK, value);
        }
        self
    }

    /// The `Link` header used for cursor pagination.
    pub fn pagination_link(&self) -> Option<String> {
        self.headers
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

/// Issues API requests on behalf of a single mounted view.
///
/// `clear` cancels every request this client has in flight; requests issued by
/// other client instances are unaffected.
#[async_trait]
pub trait ApiClient: Send + Sync + 'static {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, RequestError>;

    fn clear(&self);
}

/// [`ApiClient`] backed by `reqwest`.
pub struct ReqwestClient {
    client: reqwest::Client,
    base_url: Url,
    // Bumped by `clear`. Requests race against a change of this value.
    epoch: watch::Sender<u64>,
}

impl ReqwestClient {
    pub fn new(
        base_url: Url,
        auth_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        if let Some(token) = auth_token
            && let Ok(mut value) = HeaderValue::from_str(&format!("Bearer {token}"))
        {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(ReqwestClient {
            client,
            base_url,
            epoch: watch::Sender::new(0),
        })
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        let url = self
            .base_url
            .join(&request.url)
            .map_err(|e| RequestError::Transport {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .query(&request.query_pairs());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&url, e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&url, e))?;

        if !status.is_success() {
            let body = serde_json::from_slice(&bytes).ok();
            return Err(RequestError::Status { status, body });
        }

        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| RequestError::InvalidBody {
                status,
                message: e.to_string(),
            })?
        };

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(url: &Url, error: reqwest::Error) -> RequestError {
    if error.is_timeout() {
        RequestError::Timeout
    } else {
        RequestError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl ApiClient for ReqwestClient {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        let mut cancelled = self.epoch.subscribe();

        tokio::select! {
            biased;
            _ = cancelled.changed() => Err(RequestError::Aborted),
            result = self.send(request) => result,
        }
    }

    fn clear(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
    }
}
