use crate::client::Query;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Location of the hosting view.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub pathname: String,
    /// Raw query string, with or without the leading `?`
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub hash: String,
    /// History state attached to the location
    #[serde(default)]
    pub state: Option<serde_json::Value>,
}

impl Location {
    pub fn with_search(search: impl Into<String>) -> Self {
        Location {
            search: search.into(),
            ..Default::default()
        }
    }

    /// Parses `search` into a query. Repeated keys become multi-valued entries.
    pub fn query(&self) -> Query {
        let search = self.search.strip_prefix('?').unwrap_or(&self.search);
        let mut query = Query::new();
        for (key, value) in url::form_urlencoded::parse(search.as_bytes()) {
            match query.get_mut(key.as_ref()) {
                Some(existing) => existing.push(value.into_owned()),
                None => {
                    query.insert(key.into_owned(), value.into_owned().into());
                }
            }
        }
        query
    }
}

/// Routing context of a mounted view.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RouteContext {
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub location: Location,
}

impl RouteContext {
    pub fn new(location: Location) -> Self {
        RouteContext {
            params: BTreeMap::new(),
            location,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Whether moving to `next` invalidates the loaded data. Hash changes alone do not.
    pub fn requires_refetch(&self, next: &RouteContext) -> bool {
        self.params != next.params
            || self.location.search != next.location.search
            || self.location.state != next.location.state
    }
}
