//! Module: db::subscription
//! Responsibility: activation of update windows, commit reconciliation and
//! the live listener task.
//! Does not own: the commit path (see `commit`) or request validation of
//! scan limits (see `config`).

mod listener;
mod stream;
mod tracker;
mod update;
mod window;

use crate::{
    clock::Version,
    db::{
        change::feed::{FeedWindow, changes_of},
        config::StoreConfig,
        error::{Error, RequestError},
        predicate::{Predicate, ensure_live},
        query::{self, Order, ReadSpec, ScanSpec, object_values, project},
        request::{UpdatePayload, UpdateSource, UpdatesRequest},
        response::ObjectChanges,
        state::StoreState,
        store::RecordView,
    },
    error::InternalError,
    key::Key,
    value::Values,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use window::{Ranking, StartBound, Window, WindowEntry, diff_known};

pub(crate) use listener::Listener;
pub(crate) use tracker::{Refill, Tracker};
pub use stream::{LiveUpdates, SubscriptionState};
pub use update::{RemovalReason, Update};

///
/// Activation
/// Messages of a freshly computed window plus the tracker that follows it.
///

#[derive(Debug)]
pub(crate) struct Activation {
    pub(crate) updates: Vec<Update>,
    pub(crate) tracker: Tracker,
}

/// Compute the window of `request` at the current version.
///
/// `live` subscriptions additionally require a filter the tracker can
/// re-evaluate per commit.
pub(crate) fn activate(
    state: &StoreState,
    config: &StoreConfig,
    request: &UpdatesRequest,
    live: bool,
) -> Result<Activation, Error> {
    if let Some(filter) = request.filter.as_ref().filter(|_| live) {
        ensure_live(filter)?;
    }
    let predicate = Predicate::compile(request.filter.as_ref())?;
    if request.from_version.is_some() && !config.keep_all_versions {
        return Err(RequestError::HistoryDisabled.into());
    }

    let version = state.version;
    let select = request.select.as_deref();
    let (window, order_index, views) = match &request.source {
        UpdateSource::Keys(keys) => listed_window(state, config, &predicate, keys)?,
        UpdateSource::Scan {
            start_key,
            include_start,
            order,
            limit,
        } => {
            let limit = config.scan_limit(*limit)?;
            ordered_window(
                state,
                &predicate,
                order,
                start_key.as_ref(),
                *include_start,
                limit,
            )?
        }
    };

    let tracker = Tracker {
        window,
        predicate,
        select: request.select.clone(),
        order_index,
        cursor: version,
    };

    let mut updates = Vec::new();
    let keys = tracker.window.keys();
    match &request.known_window {
        Some(known) => {
            let diff = diff_known(known, &keys);
            let mut values: BTreeMap<&Key, &Values> =
                views.iter().map(|view| (&view.key, &view.values)).collect();
            updates.extend(diff.removals.into_iter().map(|key| Update::Removal {
                key,
                version,
                reason: RemovalReason::NotInRange,
            }));
            for (index, key) in diff.additions {
                let values = values.remove(&key).cloned().ok_or_else(|| {
                    InternalError::subscription_invariant(format!("window key {key} has no values"))
                })?;
                updates.push(Update::Addition {
                    key,
                    version,
                    index: u32::try_from(index).unwrap_or(u32::MAX),
                    values: project(values, select),
                });
            }
        }
        None => updates.push(Update::OrderedKeys {
            keys: keys.clone(),
            version,
        }),
    }

    match request.payload {
        UpdatePayload::Keys => {}
        UpdatePayload::Values => {
            if request.known_window.is_none() {
                updates.push(Update::InitialValues {
                    values: views
                        .into_iter()
                        .map(|view| object_values(view, select))
                        .collect(),
                    version,
                });
            }
        }
        UpdatePayload::Changes => {
            let window = FeedWindow {
                from: request.from_version.unwrap_or(Version::ZERO),
                to: Some(version),
                select,
                max_versions: None,
            };
            updates.push(Update::InitialChanges {
                changes: window_changes(state, &keys, &window)?,
                version,
            });
        }
    }

    // history since `from_version`, already folded into initial changes
    if let Some(from) = request
        .from_version
        .filter(|_| request.payload != UpdatePayload::Changes)
    {
        let window = FeedWindow {
            from,
            to: Some(version),
            select: None,
            max_versions: None,
        };
        let mut history: Vec<Update> = window_changes(state, &keys, &window)?
            .into_iter()
            .flat_map(|object| {
                let key = object.key;
                object
                    .sets
                    .into_iter()
                    .map(|set| Update::Change {
                        key: key.clone(),
                        version: set.version,
                        deltas: tracker.change_deltas(&set.deltas),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        history.sort_by_key(Update::version);
        updates.extend(history);
    }

    debug!(
        model = state.model_name(),
        version = %version,
        window = keys.len(),
        updates = updates.len(),
        "subscription activated"
    );

    Ok(Activation { updates, tracker })
}

type WindowParts = (Window, Option<String>, Vec<RecordView>);

fn listed_window(
    state: &StoreState,
    config: &StoreConfig,
    predicate: &Predicate,
    keys: &[Key],
) -> Result<WindowParts, Error> {
    config.check_keys(keys.len())?;

    let mut seen = BTreeSet::new();
    let keys: Vec<Key> = keys.iter().filter(|key| seen.insert(*key)).cloned().collect();
    let read = ReadSpec {
        predicate,
        as_of: None,
        include_soft_deleted: false,
    };
    let views = query::get(state.codec(), |key| state.records.get(key), &keys, &read)?;

    let entries = views
        .iter()
        .map(|view| WindowEntry {
            key: view.key.clone(),
            rank: None,
        })
        .collect();
    let ranks = keys.into_iter().enumerate().map(|(i, key)| (key, i)).collect();

    Ok((Window::new(Ranking::Listed(ranks), entries), None, views))
}

fn ordered_window(
    state: &StoreState,
    predicate: &Predicate,
    order: &Order,
    start_key: Option<&Key>,
    include_start: bool,
    limit: usize,
) -> Result<WindowParts, Error> {
    // live windows walk an index; a materialized order cannot be tracked
    let order_index = if order.is_key_order() {
        None
    } else {
        let name = state
            .indexes
            .definitions()
            .find(|index| order.served_by(index))
            .map(|index| index.name.clone())
            .ok_or_else(|| RequestError::FullScanRequired {
                order: order.to_string(),
            })?;
        Some(name)
    };

    let start = match start_key {
        None => None,
        Some(key) => {
            let rank = match &order_index {
                None => None,
                Some(name) => Some(
                    state
                        .indexes
                        .get(name)
                        .and_then(|index| index.rank_of(key))
                        .ok_or_else(|| RequestError::UnrankedStart {
                            key: key.clone(),
                            order: order.to_string(),
                        })?,
                ),
            };
            Some(StartBound {
                entry: WindowEntry {
                    key: key.clone(),
                    rank,
                },
                inclusive: include_start,
            })
        }
    };

    let outcome = query::scan(
        state,
        &ScanSpec {
            read: ReadSpec {
                predicate,
                as_of: None,
                include_soft_deleted: false,
            },
            start_key,
            start_rank: start.as_ref().and_then(|start| start.entry.rank.as_ref()),
            include_start,
            order,
            limit,
            allow_full_scan: false,
        },
    )?;

    let entries = outcome
        .rows
        .iter()
        .map(|view| WindowEntry {
            key: view.key.clone(),
            rank: order.rank(&view.values),
        })
        .collect();
    let ranking = Ranking::Ordered {
        order: order.clone(),
        start,
        limit,
    };

    Ok((Window::new(ranking, entries), order_index, outcome.rows))
}

// Change feeds of the window keys, in window order; keys without
// matching history are skipped.
fn window_changes(
    state: &StoreState,
    keys: &[Key],
    window: &FeedWindow<'_>,
) -> Result<Vec<ObjectChanges>, Error> {
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(record) = state.records.get(key) else {
            continue;
        };
        let sets = changes_of(record, state.codec(), key, window)?;
        if !sets.is_empty() {
            out.push(ObjectChanges {
                key: key.clone(),
                sets,
            });
        }
    }

    Ok(out)
}

///
/// StoreRefill
/// Serves tracker refills from the locked store state.
///

pub(crate) struct StoreRefill<'a> {
    pub(crate) state: &'a StoreState,
    pub(crate) keep_history: bool,
}

impl Refill for StoreRefill<'_> {
    fn after(
        &self,
        window: &Window,
        predicate: &Predicate,
        after: Option<&WindowEntry>,
        count: usize,
        version: Version,
    ) -> Result<Vec<(Key, Values)>, Error> {
        let Ranking::Ordered { order, start, .. } = window.ranking() else {
            return Ok(Vec::new());
        };
        let (from, include_start) = match (after, start) {
            (Some(entry), _) => (Some(entry), false),
            (None, Some(bound)) => (Some(&bound.entry), bound.inclusive),
            (None, None) => (None, true),
        };

        let outcome = query::scan(
            self.state,
            &ScanSpec {
                read: ReadSpec {
                    predicate,
                    as_of: self.keep_history.then_some(version),
                    include_soft_deleted: false,
                },
                start_key: from.map(|entry| &entry.key),
                start_rank: from.and_then(|entry| entry.rank.as_ref()),
                include_start,
                order,
                limit: count,
                allow_full_scan: true,
            },
        )?;

        Ok(outcome
            .rows
            .into_iter()
            .map(|view| (view.key, view.values))
            .collect())
    }
}
