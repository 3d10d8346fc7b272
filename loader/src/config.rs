use indexmap::IndexMap;
use serde::Deserialize;
use shared::telemetry::{LoggingConfig, MetricsConfig};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use url::Url;
use view_loader::Query;

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ApiConfig {
    /// Endpoint URLs are resolved against this, so it should end with `/`
    pub base_url: Url,
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct EndpointConfig {
    pub key: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub query: Query,
    #[serde(default)]
    pub paginate: bool,
    /// Statuses treated as an empty result instead of an error
    #[serde(default)]
    pub allow_status: Vec<u16>,
}

fn default_method() -> String {
    "GET".into()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ViewConfig {
    pub endpoints: Vec<EndpointConfig>,
    /// Query string of the hosting location, e.g. `?cursor=0:100:0`
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub should_render_bad_requests: bool,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub api: ApiConfig,
    pub views: IndexMap<String, ViewConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.views.is_empty() {
            return Err(ValidationError::NoViews);
        }

        for (name, view) in &self.views {
            let mut keys = HashSet::new();
            for endpoint in &view.endpoints {
                if endpoint.key.is_empty() {
                    return Err(ValidationError::EmptyKey(name.clone()));
                }
                if !keys.insert(endpoint.key.as_str()) {
                    return Err(ValidationError::DuplicateKey {
                        view: name.clone(),
                        key: endpoint.key.clone(),
                    });
                }
                if http::Method::from_bytes(endpoint.method.as_bytes()).is_err() {
                    return Err(ValidationError::InvalidMethod(endpoint.method.clone()));
                }
                if let Some(status) = endpoint
                    .allow_status
                    .iter()
                    .find(|status| http::StatusCode::from_u16(**status).is_err())
                {
                    return Err(ValidationError::InvalidStatus(*status));
                }
            }
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("no views configured")]
    NoViews,
    #[error("view {0} has an endpoint without a key")]
    EmptyKey(String),
    #[error("view {view} declares endpoint key {key} twice")]
    DuplicateKey { view: String, key: String },
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("invalid status code: {0}")]
    InvalidStatus(u16),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    ValidationError(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use view_loader::QueryValue;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    const VALID: &str = r#"
        logging:
            level: debug
        api:
            base_url: https://sentry.example.com/api/0/
            auth_token: secret
        views:
            project-plugins:
                location: "?cursor=0:100:0"
                should_render_bad_requests: true
                params:
                    orgId: acme
                endpoints:
                    - key: plugins
                      url: projects/acme/web/plugins/
                      paginate: true
                      query:
                          status: active
                          project: ["1", "2"]
                    - key: release
                      url: projects/acme/web/releases/latest/
                      allow_status: [404]
        "#;

    #[test]
    fn test_load_config() {
        let tmp = write_tmp_file(VALID);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.api.auth_token.as_deref(), Some("secret"));
        assert!(config.common.metrics.is_none());
        assert_eq!(config.common.logging.unwrap().level, "debug");

        let view = &config.views["project-plugins"];
        assert!(view.should_render_bad_requests);
        assert_eq!(view.params.get("orgId").map(String::as_str), Some("acme"));
        assert_eq!(view.endpoints.len(), 2);
        assert_eq!(view.endpoints[0].method, "GET");
        assert_eq!(
            view.endpoints[0].query.get("project"),
            Some(&QueryValue::Multi(vec!["1".into(), "2".into()]))
        );
        assert_eq!(view.endpoints[1].allow_status, vec![404]);
    }

    #[test]
    fn test_validation_errors() {
        let base: Config = serde_yaml::from_str(VALID).unwrap();
        assert!(base.validate().is_ok());

        let mut config = base.clone();
        config.views.clear();
        assert_eq!(config.validate(), Err(ValidationError::NoViews));

        let mut config = base.clone();
        let view = config.views.get_mut("project-plugins").unwrap();
        view.endpoints[1].key = "plugins".into();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateKey { .. })
        ));

        let mut config = base.clone();
        config.views.get_mut("project-plugins").unwrap().endpoints[0].key = String::new();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::EmptyKey(_))
        ));

        let mut config = base.clone();
        config.views.get_mut("project-plugins").unwrap().endpoints[0].method = "GE T".into();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidMethod(_))
        ));

        let mut config = base;
        config.views.get_mut("project-plugins").unwrap().endpoints[1].allow_status = vec![42];
        assert_eq!(config.validate(), Err(ValidationError::InvalidStatus(42)));
    }

    #[test]
    fn test_deserialization_errors() {
        // Invalid base URL
        assert!(
            serde_yaml::from_str::<Config>(
                r#"
api: {base_url: "not-a-url"}
views: {}
"#
            )
            .is_err()
        );

        // Missing api section
        assert!(serde_yaml::from_str::<Config>("views: {}").is_err());

        let tmp = write_tmp_file("api: {base_url: 'http://127.0.0.1/'}\nviews: {}\n");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ValidationError(ValidationError::NoViews))
        ));
    }
}
