use crate::{
    db::{
        change::creation_deltas,
        commit::{Mutation, PreparedCommit, WriteContext, commit},
        response::AddStatus,
        state::StoreState,
        store::RawRow,
        write::unique_conflict,
    },
    value::Values,
};
use tracing::warn;

/// Add one record at the key derived from its values.
///
/// A soft-deleted record at that key is re-created; its history continues
/// with a new creation marker.
pub(crate) fn add_one(state: &mut StoreState, ctx: &WriteContext<'_>, values: Values) -> AddStatus {
    let codec = state.codec.clone();

    let exceptions = codec.validate(&values);
    if !exceptions.is_empty() {
        return AddStatus::ValidationFail { exceptions };
    }

    let key = match codec.key_of(&values) {
        Ok(key) => key,
        Err(err) => {
            warn!(model = state.model_name(), error = %err, "key derivation failed");
            return AddStatus::ServerFail {
                cause: err.to_string(),
            };
        }
    };

    if state.records.get(&key).is_some_and(|record| !record.deleted) {
        return AddStatus::AlreadyExists {
            key,
            reference: None,
        };
    }
    if let Some(conflict) = unique_conflict(state, ctx.sink, &key, &values) {
        return AddStatus::AlreadyExists {
            key: conflict.holder,
            reference: Some(conflict.property),
        };
    }

    let row = match codec.encode(&values) {
        Ok(bytes) => RawRow::new(bytes),
        Err(err) => {
            return AddStatus::ServerFail {
                cause: err.to_string(),
            };
        }
    };

    let deltas = creation_deltas(&values);
    let committed = commit(
        state,
        ctx,
        PreparedCommit {
            key: key.clone(),
            mutation: Mutation::Create { row, values },
            claimed: None,
            deltas,
        },
    );

    AddStatus::Success {
        key,
        version: committed.version,
    }
}
