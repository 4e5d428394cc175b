//! Module: db::process
//! Responsibility: apply updates produced by another store to local state.
//! Does not own: conflict resolution beyond the write path's own checks.
//!
//! Every local commit goes through the regular write path, so validation,
//! uniqueness and publication behave exactly as for local requests. The
//! first commit merges the remote version into the local clock.

use crate::{
    clock::Version,
    db::{
        change::{Change, Delta, DeltaSet, apply::apply_deltas, diff_deltas},
        commit::WriteContext,
        request::ObjectChange,
        response::{
            AddStatus, ChangeStatus, DeleteStatus, ObjectValues, ProcessResponse, ProcessStatus,
        },
        state::StoreState,
        subscription::{RemovalReason, Update},
        write::{add_one, change_one, delete_one},
    },
    key::Key,
    value::Values,
};
use tracing::warn;

///
/// Step
/// Local outcome for one key of a remote update.
///

enum Step {
    Applied(Version),
    Skipped,
    Failed(String),
}

///
/// Task
/// One key's share of a remote update.
///

enum Task<'u> {
    Object(&'u ObjectValues),
    Sets(&'u Key, &'u [DeltaSet]),
    Upsert(&'u Key, &'u Values),
    Remote(&'u Key, &'u [Delta]),
    Delete(&'u Key, bool),
}

impl Task<'_> {
    const fn key(&self) -> &Key {
        match self {
            Self::Object(object) => &object.key,
            Self::Sets(key, _)
            | Self::Upsert(key, _)
            | Self::Remote(key, _)
            | Self::Delete(key, _) => key,
        }
    }

    fn run(&self, state: &mut StoreState, ctx: &WriteContext<'_>) -> Step {
        match *self {
            Self::Object(object) if object.is_deleted => delete(state, ctx, &object.key, false),
            Self::Object(object) => upsert(state, ctx, &object.key, object.values.clone()),
            Self::Sets(key, sets) => {
                let mut last = Step::Skipped;
                for set in sets {
                    match apply_remote(state, ctx, key, &set.deltas) {
                        Step::Skipped => {}
                        failed @ Step::Failed(_) => return failed,
                        applied @ Step::Applied(_) => last = applied,
                    }
                }
                last
            }
            Self::Upsert(key, values) => upsert(state, ctx, key, values.clone()),
            Self::Remote(key, deltas) => apply_remote(state, ctx, key, deltas),
            Self::Delete(key, hard) => delete(state, ctx, key, hard),
        }
    }
}

pub(crate) fn process_update(
    state: &mut StoreState,
    ctx: &WriteContext<'_>,
    update: &Update,
) -> ProcessResponse {
    let tasks: Vec<Task<'_>> = match update {
        Update::OrderedKeys { .. }
        | Update::Removal {
            reason: RemovalReason::NotInRange,
            ..
        } => Vec::new(),
        Update::InitialValues { values, .. } => values.iter().map(Task::Object).collect(),
        Update::InitialChanges { changes, .. } => changes
            .iter()
            .map(|object| Task::Sets(&object.key, &object.sets))
            .collect(),
        Update::Addition { key, values, .. } => vec![Task::Upsert(key, values)],
        Update::Change { key, deltas, .. } => vec![Task::Remote(key, deltas)],
        Update::Removal { key, reason, .. } => {
            vec![Task::Delete(key, *reason == RemovalReason::HardDeleted)]
        }
    };

    let mut applied = Vec::new();
    let mut version = None;
    for task in tasks {
        match task.run(state, ctx) {
            Step::Applied(at) => {
                applied.push(task.key().clone());
                version = Some(at);
            }
            Step::Skipped => {}
            Step::Failed(cause) => {
                let key = task.key().clone();
                warn!(
                    model = state.model_name(),
                    key = %key,
                    remote = %update.version(),
                    %cause,
                    "remote update rejected"
                );
                return ProcessResponse {
                    status: ProcessStatus::Failed { key, cause },
                    version,
                };
            }
        }
    }

    let status = if applied.is_empty() {
        ProcessStatus::Ignored
    } else {
        ProcessStatus::Applied { keys: applied }
    };

    ProcessResponse { status, version }
}

// Replace the local record with `values`, creating it when absent.
fn upsert(state: &mut StoreState, ctx: &WriteContext<'_>, key: &Key, values: Values) -> Step {
    let current = match live_values(state, key) {
        Ok(current) => current,
        Err(cause) => return Step::Failed(cause),
    };

    match current {
        Some(current) => replace(state, ctx, key, &current, &values),
        None => match add_one(state, ctx, values) {
            AddStatus::Success { key: added, version } if added == *key => Step::Applied(version),
            AddStatus::Success { key: added, .. } => Step::Failed(format!(
                "values derive key {added}, update names {key}"
            )),
            AddStatus::AlreadyExists { key, reference } => Step::Failed(match reference {
                Some(reference) => format!("'{reference}' is already held by {key}"),
                None => format!("record {key} already exists"),
            }),
            AddStatus::ValidationFail { exceptions } => Step::Failed(join(&exceptions)),
            AddStatus::ServerFail { cause } => Step::Failed(cause),
        },
    }
}

// Apply one remote delta set on top of the local record.
fn apply_remote(
    state: &mut StoreState,
    ctx: &WriteContext<'_>,
    key: &Key,
    deltas: &[Delta],
) -> Step {
    let current = match live_values(state, key) {
        Ok(current) => current,
        Err(cause) => return Step::Failed(cause),
    };
    let creates = deltas.iter().any(|delta| matches!(delta, Delta::ObjectCreate));

    let base = match (&current, creates) {
        (Some(current), _) => current.clone(),
        (None, true) => Values::new(),
        // nothing but markers for a record this store never saw
        (None, false) if deltas.iter().all(|delta| delta.reference().is_none()) => {
            return Step::Skipped;
        }
        (None, false) => return Step::Failed(format!("record {key} does not exist locally")),
    };
    let next = match apply_deltas(base, deltas) {
        Ok(next) => next,
        Err(err) => return Step::Failed(err.to_string()),
    };

    let written = match &current {
        Some(current) => replace(state, ctx, key, current, &next.values),
        None => upsert(state, ctx, key, next.values),
    };
    if !next.deleted || matches!(written, Step::Failed(_)) {
        return written;
    }

    match delete(state, ctx, key, false) {
        Step::Skipped => written,
        other => other,
    }
}

fn replace(
    state: &mut StoreState,
    ctx: &WriteContext<'_>,
    key: &Key,
    current: &Values,
    next: &Values,
) -> Step {
    let changes = diff_deltas(current, next)
        .into_iter()
        .filter_map(|delta| match delta {
            Delta::Put { reference, value } => Some(Change::Put { reference, value }),
            Delta::Delete { reference } => Some(Change::Delete { reference }),
            _ => None,
        });

    match change_one(state, ctx, &ObjectChange::new(key.clone(), changes)) {
        ChangeStatus::Success { version, .. } => Step::Applied(version),
        ChangeStatus::DoesNotExist => Step::Failed(format!("record {key} does not exist locally")),
        ChangeStatus::AlreadyExists { key, reference } => Step::Failed(format!(
            "'{}' is already held by {key}",
            reference.unwrap_or_default()
        )),
        ChangeStatus::ValidationFail { exceptions } => Step::Failed(join(&exceptions)),
        ChangeStatus::ServerFail { cause } => Step::Failed(cause),
    }
}

fn delete(state: &mut StoreState, ctx: &WriteContext<'_>, key: &Key, hard: bool) -> Step {
    match delete_one(state, ctx, key, hard) {
        DeleteStatus::Success { version } => Step::Applied(version),
        DeleteStatus::DoesNotExist => Step::Skipped,
        DeleteStatus::ServerFail { cause } => Step::Failed(cause),
    }
}

fn live_values(state: &StoreState, key: &Key) -> Result<Option<Values>, String> {
    match state.records.get(key).filter(|record| !record.deleted) {
        Some(record) => record
            .decode(state.codec(), key)
            .map(Some)
            .map_err(|err| err.to_string()),
        None => Ok(None),
    }
}

fn join(exceptions: &[impl ToString]) -> String {
    exceptions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
