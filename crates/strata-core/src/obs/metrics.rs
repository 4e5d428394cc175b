use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::LazyLock,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters for store operations.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub models: BTreeMap<String, ModelCounters>,
    pub window_start_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            models: BTreeMap::new(),
            window_start_ms: now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Executor entrypoints
    pub read_calls: u64,
    pub write_calls: u64,
    pub feed_calls: u64,

    // Planner kinds
    pub plan_keys: u64,
    pub plan_index: u64,
    pub plan_full_scan: u64,

    // Rows touched
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_scanned: u64,

    // Index maintenance
    pub index_inserts: u64,
    pub index_removes: u64,
    pub unique_violations: u64,

    // Live subscriptions
    pub updates_emitted: u64,

    // Wall time spent in executors
    pub exec_micros_total: u128,
    pub exec_micros_max: u64,
}

///
/// ModelCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ModelCounters {
    pub read_calls: u64,
    pub write_calls: u64,
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_scanned: u64,
    pub index_inserts: u64,
    pub index_removes: u64,
    pub unique_violations: u64,
    pub updates_emitted: u64,
}

///
/// EventReport
///
/// `counters` is `None` when the requested window starts after the
/// current accumulation window.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: Option<EventState>,
    pub model_counters: BTreeMap<String, ModelCounters>,
}

static EVENT_STATE: LazyLock<Mutex<EventState>> =
    LazyLock::new(|| Mutex::new(EventState::default()));

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    f(&EVENT_STATE.lock())
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    f(&mut EVENT_STATE.lock())
}

/// Reset all counters and restart the accumulation window.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

/// Accumulate an elapsed time and track its max.
pub(crate) fn add_elapsed(total: &mut u128, max: &mut u64, delta: u64) {
    *total = total.saturating_add(u128::from(delta));
    if delta > *max {
        *max = delta;
    }
}

pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    with_state(|m| {
        if window_start_ms.is_some_and(|start| start > m.window_start_ms) {
            return EventReport::default();
        }

        EventReport {
            counters: Some(m.clone()),
            model_counters: m.models.clone(),
        }
    })
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
