use crate::metrics_defs::{MetricDef, describe_all};
use metrics_exporter_statsd::StatsdBuilder;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "view_loader".into()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    pub environment: Option<String>,
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            sentry_dsn: None,
            environment: None,
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".into()
}

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("could not build statsd recorder: {0}")]
    Statsd(String),
    #[error("a metrics recorder is already installed")]
    RecorderInstalled,
}

/// Installs the global tracing subscriber and, when a DSN is configured, the
/// Sentry client. Error level events are forwarded to Sentry by the tracing layer.
///
/// The returned guard flushes pending Sentry events on drop and must be held
/// for the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: config.environment.clone().map(Into::into),
                ..Default::default()
            },
        ))
    });

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry::integrations::tracing::layer())
        .try_init()
    {
        eprintln!("Failed to install tracing subscriber: {e}");
    }

    guard
}

/// Installs a statsd recorder as the global metrics recorder.
pub fn init_metrics(config: &MetricsConfig, defs: &[MetricDef]) -> Result<(), TelemetryError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(config.prefix.as_str()))
        .map_err(|e| TelemetryError::Statsd(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|_| TelemetryError::RecorderInstalled)?;
    describe_all(defs);

    tracing::debug!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Installed statsd metrics recorder"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_defaults() {
        let config: LoggingConfig = serde_yaml::from_str("sentry_dsn: null").unwrap();
        assert_eq!(config, LoggingConfig::default());
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_metrics_config_prefix() {
        let config: MetricsConfig =
            serde_yaml::from_str("{statsd_host: 127.0.0.1, statsd_port: 8125}").unwrap();
        assert_eq!(config.prefix, "view_loader");

        let config: MetricsConfig = serde_yaml::from_str(
            "{statsd_host: 127.0.0.1, statsd_port: 8125, prefix: settings}",
        )
        .unwrap();
        assert_eq!(config.prefix, "settings");
    }
}
