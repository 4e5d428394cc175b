//! Commit protocol and publication.
//!
//! Contract: every fallible step (validation, encoding) happens before
//! `commit` is called. `commit` issues the version, updates the record,
//! its index entries and unique claims, and publishes the event while the
//! caller holds the state write guard, so mailbox order is version order.

use crate::{
    clock::{HlcClock, Version},
    db::{
        change::{Delta, DeltaSet},
        state::StoreState,
        store::{RawRow, Record},
    },
    key::Key,
    obs::{MetricsEvent, MetricsSink},
    value::Values,
};
use parking_lot::Mutex;
use std::{cell::Cell, sync::Arc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

///
/// CommitKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CommitKind {
    Created,
    Changed,
    SoftDeleted,
    HardDeleted,
}

///
/// CommitEvent
/// What subscriptions learn about one commit.
///

#[derive(Clone, Debug)]
pub(crate) struct CommitEvent {
    pub(crate) version: Version,
    pub(crate) key: Key,
    pub(crate) kind: CommitKind,
    /// Latest values; `None` after a hard delete.
    pub(crate) values: Option<Values>,
    pub(crate) deltas: Vec<Delta>,
}

///
/// CommitBus
/// One unbounded mailbox per live subscription.
///

#[derive(Debug, Default)]
pub(crate) struct CommitBus {
    mailboxes: Mutex<Vec<UnboundedSender<Arc<CommitEvent>>>>,
}

impl CommitBus {
    pub(crate) fn subscribe(&self) -> UnboundedReceiver<Arc<CommitEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.lock().push(tx);

        rx
    }

    /// Deliver to every open mailbox, dropping closed ones.
    pub(crate) fn publish(&self, event: &Arc<CommitEvent>) {
        self.mailboxes
            .lock()
            .retain(|mailbox| mailbox.send(Arc::clone(event)).is_ok());
    }

    pub(crate) fn len(&self) -> usize {
        self.mailboxes.lock().len()
    }
}

///
/// WriteContext
/// Per-request collaborators of the write path.
///

pub(crate) struct WriteContext<'a> {
    pub(crate) clock: &'a HlcClock,
    pub(crate) keep_history: bool,
    pub(crate) bus: &'a CommitBus,
    pub(crate) sink: &'a dyn MetricsSink,
    remote: Cell<Option<Version>>,
}

impl<'a> WriteContext<'a> {
    pub(crate) const fn new(
        clock: &'a HlcClock,
        keep_history: bool,
        bus: &'a CommitBus,
        sink: &'a dyn MetricsSink,
    ) -> Self {
        Self {
            clock,
            keep_history,
            bus,
            sink,
            remote: Cell::new(None),
        }
    }

    /// The first commit of this context merges `remote` into the clock.
    #[must_use]
    pub(crate) fn after_remote(self, remote: Version) -> Self {
        self.remote.set(Some(remote));
        self
    }

    fn issue(&self) -> Version {
        match self.remote.take() {
            Some(remote) => self.clock.observe(remote),
            None => self.clock.now(),
        }
    }
}

///
/// Mutation
///

#[derive(Debug)]
pub(crate) enum Mutation {
    /// New or re-created record.
    Create { row: RawRow, values: Values },
    Update { row: RawRow, values: Values },
    SoftDelete { values: Values },
    HardDelete,
}

impl Mutation {
    const fn kind(&self) -> CommitKind {
        match self {
            Self::Create { .. } => CommitKind::Created,
            Self::Update { .. } => CommitKind::Changed,
            Self::SoftDelete { .. } => CommitKind::SoftDeleted,
            Self::HardDelete => CommitKind::HardDeleted,
        }
    }

    const fn values(&self) -> Option<&Values> {
        match self {
            Self::Create { values, .. }
            | Self::Update { values, .. }
            | Self::SoftDelete { values } => Some(values),
            Self::HardDelete => None,
        }
    }
}

///
/// PreparedCommit
///

#[derive(Debug)]
pub(crate) struct PreparedCommit {
    pub(crate) key: Key,
    pub(crate) mutation: Mutation,
    /// Values currently holding unique claims, released by this commit.
    pub(crate) claimed: Option<Values>,
    pub(crate) deltas: Vec<Delta>,
}

///
/// Committed
///

#[derive(Debug)]
pub(crate) struct Committed {
    pub(crate) version: Version,
    pub(crate) deltas: Vec<Delta>,
}

/// Apply one prepared commit. Infallible by construction.
pub(crate) fn commit(
    state: &mut StoreState,
    ctx: &WriteContext<'_>,
    prepared: PreparedCommit,
) -> Committed {
    let PreparedCommit {
        key,
        mutation,
        claimed,
        mut deltas,
    } = prepared;
    let kind = mutation.kind();
    let version = ctx.issue();

    // indexes keep soft-deleted records; reads filter them
    let index_delta = state.indexes.update(&key, mutation.values());
    deltas.extend(index_delta.updates.into_iter().map(Delta::IndexUpdate));

    let model = state.codec.model();
    if let Some(claimed) = &claimed {
        state.unique.release(model, &key, claimed);
    }
    if let Mutation::Create { values, .. } | Mutation::Update { values, .. } = &mutation {
        state.unique.claim(model, &key, values);
    }

    let history = ctx
        .keep_history
        .then(|| DeltaSet::new(version, deltas.clone()));
    let values = mutation.values().cloned();
    write_record(state, &key, version, mutation, history);
    state.version = version;

    ctx.sink.record(MetricsEvent::IndexDelta {
        model: state.model_name(),
        inserts: index_delta.inserts,
        removes: index_delta.removes,
    });
    debug!(
        model = state.model_name(),
        key = %key,
        version = %version,
        ?kind,
        deltas = deltas.len(),
        "commit"
    );

    ctx.bus.publish(&Arc::new(CommitEvent {
        version,
        key,
        kind,
        values,
        deltas: deltas.clone(),
    }));

    Committed { version, deltas }
}

fn write_record(
    state: &mut StoreState,
    key: &Key,
    version: Version,
    mutation: Mutation,
    history: Option<DeltaSet>,
) {
    let (row, deleted, created) = match mutation {
        Mutation::HardDelete => {
            state.records.remove(key);
            return;
        }
        Mutation::Create { row, .. } => (Some(row), false, true),
        Mutation::Update { row, .. } => (Some(row), false, false),
        Mutation::SoftDelete { .. } => (None, true, false),
    };

    if let Some(record) = state.records.get_mut(key) {
        if let Some(row) = row {
            record.row = row;
        }
        record.deleted = deleted;
        if created {
            record.first_version = version;
        }
        record.last_version = version;
        if let (Some(sets), Some(set)) = (record.history.as_mut(), history) {
            sets.push(set);
        }
    } else if let Some(row) = row {
        state.records.insert(
            key.clone(),
            Record {
                row,
                deleted,
                first_version: version,
                last_version: version,
                history: history.map(|set| vec![set]),
            },
        );
    }
}
