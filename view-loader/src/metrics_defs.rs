//! Metrics definitions for the view loader.

use shared::metrics_defs::{MetricDef, MetricType};

pub const BATCH_DURATION: MetricDef = MetricDef {
    name: "fetch.batch.duration",
    metric_type: MetricType::Histogram,
    description: "Time until every endpoint of a batch resolved, in seconds. Tagged with outcome.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "fetch.requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of endpoint requests currently in flight",
};

pub const REQUEST_RESULT: MetricDef = MetricDef {
    name: "fetch.request.result",
    metric_type: MetricType::Counter,
    description: "Resolved endpoint requests. Tagged with outcome.",
};

pub const ALL_METRICS: &[MetricDef] = &[BATCH_DURATION, REQUESTS_INFLIGHT, REQUEST_RESULT];
