//! Metrics sink boundary.
//!
//! Core store logic MUST NOT depend on obs::metrics directly.
//! All instrumentation flows through MetricsEvent and MetricsSink.
use crate::obs::metrics;
use std::time::Instant;

///
/// ExecKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecKind {
    Read,
    Write,
    Feed,
}

///
/// PlanKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlanKind {
    Keys,
    Index,
    FullScan,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    ExecStart {
        kind: ExecKind,
        model: &'a str,
    },
    ExecFinish {
        kind: ExecKind,
        model: &'a str,
        rows_touched: u64,
        elapsed_micros: u64,
    },
    RowsScanned {
        model: &'a str,
        rows_scanned: u64,
    },
    UniqueViolation {
        model: &'a str,
    },
    IndexDelta {
        model: &'a str,
        inserts: u64,
        removes: u64,
    },
    Plan {
        kind: PlanKind,
    },
    UpdatesEmitted {
        model: &'a str,
        count: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

///
/// GlobalMetricsSink
/// Default sink that writes into the process-wide metrics state.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::ExecStart { kind, model } => {
                metrics::with_state_mut(|m| {
                    let entry = m.models.entry(model.to_string()).or_default();
                    match kind {
                        ExecKind::Read => {
                            m.ops.read_calls = m.ops.read_calls.saturating_add(1);
                            entry.read_calls = entry.read_calls.saturating_add(1);
                        }
                        ExecKind::Write => {
                            m.ops.write_calls = m.ops.write_calls.saturating_add(1);
                            entry.write_calls = entry.write_calls.saturating_add(1);
                        }
                        ExecKind::Feed => m.ops.feed_calls = m.ops.feed_calls.saturating_add(1),
                    }
                });
            }

            MetricsEvent::ExecFinish {
                kind,
                model,
                rows_touched,
                elapsed_micros,
            } => {
                metrics::with_state_mut(|m| {
                    metrics::add_elapsed(
                        &mut m.ops.exec_micros_total,
                        &mut m.ops.exec_micros_max,
                        elapsed_micros,
                    );

                    let entry = m.models.entry(model.to_string()).or_default();
                    match kind {
                        ExecKind::Read | ExecKind::Feed => {
                            m.ops.rows_read = m.ops.rows_read.saturating_add(rows_touched);
                            entry.rows_read = entry.rows_read.saturating_add(rows_touched);
                        }
                        ExecKind::Write => {
                            m.ops.rows_written = m.ops.rows_written.saturating_add(rows_touched);
                            entry.rows_written = entry.rows_written.saturating_add(rows_touched);
                        }
                    }
                });
            }

            MetricsEvent::RowsScanned {
                model,
                rows_scanned,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.rows_scanned = m.ops.rows_scanned.saturating_add(rows_scanned);
                    let entry = m.models.entry(model.to_string()).or_default();
                    entry.rows_scanned = entry.rows_scanned.saturating_add(rows_scanned);
                });
            }

            MetricsEvent::UniqueViolation { model } => {
                metrics::with_state_mut(|m| {
                    m.ops.unique_violations = m.ops.unique_violations.saturating_add(1);
                    let entry = m.models.entry(model.to_string()).or_default();
                    entry.unique_violations = entry.unique_violations.saturating_add(1);
                });
            }

            MetricsEvent::IndexDelta {
                model,
                inserts,
                removes,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.index_inserts = m.ops.index_inserts.saturating_add(inserts);
                    m.ops.index_removes = m.ops.index_removes.saturating_add(removes);
                    let entry = m.models.entry(model.to_string()).or_default();
                    entry.index_inserts = entry.index_inserts.saturating_add(inserts);
                    entry.index_removes = entry.index_removes.saturating_add(removes);
                });
            }

            MetricsEvent::Plan { kind } => {
                metrics::with_state_mut(|m| match kind {
                    PlanKind::Keys => m.ops.plan_keys = m.ops.plan_keys.saturating_add(1),
                    PlanKind::Index => m.ops.plan_index = m.ops.plan_index.saturating_add(1),
                    PlanKind::FullScan => {
                        m.ops.plan_full_scan = m.ops.plan_full_scan.saturating_add(1);
                    }
                });
            }

            MetricsEvent::UpdatesEmitted { model, count } => {
                metrics::with_state_mut(|m| {
                    m.ops.updates_emitted = m.ops.updates_emitted.saturating_add(count);
                    let entry = m.models.entry(model.to_string()).or_default();
                    entry.updates_emitted = entry.updates_emitted.saturating_add(count);
                });
            }
        }
    }
}

/// Snapshot the current metrics state.
///
/// `window_start_ms` filters by window start (`EventState::window_start_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

///
/// Span
/// RAII guard that emits start/finish metrics events for one executor call.
/// Finish accounting happens even on unwind.
///

pub(crate) struct Span<'a> {
    sink: &'a dyn MetricsSink,
    kind: ExecKind,
    model: &'a str,
    start: Instant,
    rows: u64,
}

impl<'a> Span<'a> {
    #[must_use]
    pub(crate) fn new(sink: &'a dyn MetricsSink, kind: ExecKind, model: &'a str) -> Self {
        sink.record(MetricsEvent::ExecStart { kind, model });

        Self {
            sink,
            kind,
            model,
            start: Instant::now(),
            rows: 0,
        }
    }

    pub(crate) const fn set_rows(&mut self, rows: u64) {
        self.rows = rows;
    }
}

impl Drop for Span<'_> {
    fn drop(&mut self) {
        let elapsed_micros = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);

        self.sink.record(MetricsEvent::ExecFinish {
            kind: self.kind,
            model: self.model,
            rows_touched: self.rows,
            elapsed_micros,
        });
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
    }

    impl MetricsSink for RecordingSink {
        fn record(&self, event: MetricsEvent<'_>) {
            self.events.lock().push(format!("{event:?}"));
        }
    }

    #[test]
    fn span_records_start_and_finish_with_rows() {
        let sink = RecordingSink::default();
        {
            let mut span = Span::new(&sink, ExecKind::Read, "obs::span");
            span.set_rows(3);
        }

        let events = sink.events.lock();
        assert_eq!(events.len(), 2);
        assert!(events[0].starts_with("ExecStart"));
        assert!(events[1].contains("rows_touched: 3"));
    }

    #[test]
    fn global_sink_accumulates_per_model_counters() {
        let model = "obs::tests::global";
        GlobalMetricsSink.record(MetricsEvent::IndexDelta {
            model,
            inserts: 3,
            removes: 2,
        });
        GlobalMetricsSink.record(MetricsEvent::UniqueViolation { model });

        let report = metrics_report(None);
        let counters = report.model_counters.get(model).expect("model counters");
        assert!(counters.index_inserts >= 3);
        assert!(counters.index_removes >= 2);
        assert!(counters.unique_violations >= 1);
    }

    #[test]
    fn report_window_after_current_window_is_empty() {
        let report = metrics_report(Some(u64::MAX));

        assert!(report.counters.is_none());
        assert!(report.model_counters.is_empty());
    }
}
