use crate::db::predicate::{Filter, FilterError};

/// Reject filter kinds that live subscriptions cannot re-evaluate per
/// commit: only equality, membership, ordered comparisons and ranges,
/// combined with `And`/`Or`/`Not`.
pub(crate) fn ensure_live(filter: &Filter) -> Result<(), FilterError> {
    match filter {
        Filter::Equals(_)
        | Filter::ValueIn(..)
        | Filter::Range { .. }
        | Filter::GreaterThan(..)
        | Filter::GreaterThanEquals(..)
        | Filter::LessThan(..)
        | Filter::LessThanEquals(..) => Ok(()),
        Filter::Not(inner) => ensure_live(inner),
        Filter::And(children) | Filter::Or(children) => children.iter().try_for_each(ensure_live),
        Filter::Exists(_) | Filter::Prefix { .. } | Filter::RegEx { .. } => {
            Err(FilterError::NotLive {
                kind: filter.kind_name(),
            })
        }
    }
}
