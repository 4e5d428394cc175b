//! Module: db::write
//! Responsibility: per-key add, change and delete against locked state.
//! Does not own: locking, version issuance or publication (see `commit`).
//!
//! Validation order per key: structural application, schema validation
//! plus final-property protection, uniqueness, then commit.

mod add;
mod change;
mod delete;

use crate::{
    db::{state::StoreState, unique::UniqueConflict},
    key::Key,
    obs::{MetricsEvent, MetricsSink},
    value::Values,
};
use tracing::warn;

pub(crate) use add::add_one;
pub(crate) use change::change_one;
pub(crate) use delete::delete_one;

// Unique collision of `values` against other live records, recorded and
// logged when found.
fn unique_conflict(
    state: &StoreState,
    sink: &dyn MetricsSink,
    key: &Key,
    values: &Values,
) -> Option<UniqueConflict> {
    let conflict = state.unique.conflict(state.codec.model(), key, values)?;

    sink.record(MetricsEvent::UniqueViolation {
        model: state.model_name(),
    });
    warn!(
        model = state.model_name(),
        key = %key,
        property = %conflict.property,
        holder = %conflict.holder,
        "unique value already held"
    );

    Some(conflict)
}
