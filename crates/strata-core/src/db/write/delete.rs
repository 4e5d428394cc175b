use crate::{
    db::{
        change::Delta,
        commit::{Mutation, PreparedCommit, WriteContext, commit},
        response::DeleteStatus,
        state::StoreState,
    },
    key::Key,
};
use tracing::warn;

/// Soft-delete (mark, keep history, release unique claims) or hard-delete
/// (purge record, history, index entries and claims) one record.
pub(crate) fn delete_one(
    state: &mut StoreState,
    ctx: &WriteContext<'_>,
    key: &Key,
    hard: bool,
) -> DeleteStatus {
    let codec = state.codec.clone();

    let Some(record) = state.records.get(key) else {
        return DeleteStatus::DoesNotExist;
    };
    if record.deleted && !hard {
        return DeleteStatus::DoesNotExist;
    }
    let was_live = !record.deleted;

    let values = match record.decode(codec.as_ref(), key) {
        Ok(values) => values,
        Err(err) => {
            warn!(model = state.model_name(), key = %key, error = %err, "delete failed");
            return DeleteStatus::ServerFail {
                cause: err.to_string(),
            };
        }
    };

    let claimed = was_live.then(|| values.clone());
    let (mutation, deltas) = if hard {
        (Mutation::HardDelete, Vec::new())
    } else {
        (Mutation::SoftDelete { values }, vec![Delta::SoftDelete])
    };

    let committed = commit(
        state,
        ctx,
        PreparedCommit {
            key: key.clone(),
            mutation,
            claimed,
            deltas,
        },
    );

    DeleteStatus::Success {
        version: committed.version,
    }
}
