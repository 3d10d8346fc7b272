pub mod metrics_defs;
pub mod telemetry;
