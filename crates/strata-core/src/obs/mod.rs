//! Observability: runtime telemetry (metrics) and sink abstractions.
//!
//! This module does not access storage internals directly.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, EventState, ModelCounters};
pub use sink::{
    ExecKind, GlobalMetricsSink, MetricsEvent, MetricsSink, PlanKind, metrics_report,
    metrics_reset_all,
};
