use crate::{
    db::{
        change::{
            Delta,
            apply::{apply_changes, failed_checks},
        },
        commit::{Mutation, PreparedCommit, WriteContext, commit},
        request::ObjectChange,
        response::ChangeStatus,
        state::StoreState,
        store::RawRow,
        write::unique_conflict,
    },
    key::Key,
    model::{ExceptionKind, ValidationException},
};
use tracing::warn;

/// Apply the changes of one record.
pub(crate) fn change_one(
    state: &mut StoreState,
    ctx: &WriteContext<'_>,
    object: &ObjectChange,
) -> ChangeStatus {
    let codec = state.codec.clone();
    let key = &object.key;

    let Some(record) = state.records.get(key).filter(|record| !record.deleted) else {
        return ChangeStatus::DoesNotExist;
    };

    if let Some(expected) = object.last_version.filter(|v| *v != record.last_version) {
        return ChangeStatus::ValidationFail {
            exceptions: vec![ValidationException::new(
                key.to_hex(),
                ExceptionKind::ConcurrentChange {
                    expected,
                    actual: record.last_version,
                },
            )],
        };
    }

    let current = match record.decode(codec.as_ref(), key) {
        Ok(values) => values,
        Err(err) => return server_fail(state, key, err.to_string()),
    };

    let failed = failed_checks(&current, &object.changes);
    if !failed.is_empty() {
        return ChangeStatus::ValidationFail { exceptions: failed };
    }

    // structural application
    let mut next = current.clone();
    let deltas = match apply_changes(&mut next, &object.changes) {
        Ok(deltas) => deltas,
        Err(err) => return server_fail(state, key, err.to_string()),
    };

    // schema validation and final properties
    let mut exceptions = codec.validate(&next);
    for name in codec.model().final_properties() {
        let previous = current.get(name);
        if previous.is_some() && next.get(name) != previous {
            exceptions.push(ValidationException::new(name, ExceptionKind::AlreadySet));
        }
    }
    if !exceptions.is_empty() {
        return ChangeStatus::ValidationFail { exceptions };
    }

    if let Some(conflict) = unique_conflict(state, ctx.sink, key, &next) {
        return ChangeStatus::AlreadyExists {
            key: conflict.holder,
            reference: Some(conflict.property),
        };
    }

    if deltas.is_empty() {
        return ChangeStatus::Success {
            version: record.last_version,
            server_changes: Vec::new(),
        };
    }

    let row = match codec.encode(&next) {
        Ok(bytes) => RawRow::new(bytes),
        Err(err) => return server_fail(state, key, err.to_string()),
    };

    let committed = commit(
        state,
        ctx,
        PreparedCommit {
            key: key.clone(),
            mutation: Mutation::Update { row, values: next },
            claimed: Some(current),
            deltas,
        },
    );

    ChangeStatus::Success {
        version: committed.version,
        server_changes: committed
            .deltas
            .into_iter()
            .filter(|delta| matches!(delta, Delta::IncMapAdded { .. } | Delta::IndexUpdate(_)))
            .collect(),
    }
}

fn server_fail(state: &StoreState, key: &Key, cause: String) -> ChangeStatus {
    warn!(model = state.model_name(), key = %key, %cause, "change failed");

    ChangeStatus::ServerFail { cause }
}
