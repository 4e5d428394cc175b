//! Module: db::query
//! Responsibility: key reads and ordered scans over the record store.
//! Does not own: request validation, aggregation or change feeds.

mod order;
mod scan;

use crate::{
    clock::Version,
    db::{predicate::Predicate, response::ObjectValues, store::{Record, RecordView}},
    error::InternalError,
    key::Key,
    model::Codec,
    reference::PropertyRef,
    value::Values,
};

// re-exports
pub use order::Order;
pub(crate) use scan::{ScanSpec, scan};

///
/// ReadSpec
/// Visibility rules shared by every read path.
///

pub(crate) struct ReadSpec<'a> {
    pub(crate) predicate: &'a Predicate,
    pub(crate) as_of: Option<Version>,
    pub(crate) include_soft_deleted: bool,
}

impl ReadSpec<'_> {
    /// The record as the reader sees it, or `None` when it is hidden.
    pub(crate) fn admit(
        &self,
        codec: &dyn Codec,
        key: &Key,
        record: &Record,
    ) -> Result<Option<RecordView>, InternalError> {
        let Some(view) = record.view(codec, key, self.as_of)? else {
            return Ok(None);
        };
        if view.deleted && !self.include_soft_deleted {
            return Ok(None);
        }

        Ok(self.predicate.matches(&view.values).then_some(view))
    }
}

/// Admitted records for the given keys, in request order.
pub(crate) fn get<'a>(
    codec: &dyn Codec,
    lookup: impl Fn(&Key) -> Option<&'a Record>,
    keys: &[Key],
    read: &ReadSpec<'_>,
) -> Result<Vec<RecordView>, InternalError> {
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(record) = lookup(key) else {
            continue;
        };
        if let Some(view) = read.admit(codec, key, record)? {
            out.push(view);
        }
    }

    Ok(out)
}

/// Keep only the top-level properties the selection reaches.
pub(crate) fn project(values: Values, select: Option<&[PropertyRef]>) -> Values {
    let Some(select) = select else {
        return values;
    };

    values
        .into_iter()
        .filter(|(name, _)| select.iter().any(|s| s.root() == name))
        .collect()
}

pub(crate) fn object_values(view: RecordView, select: Option<&[PropertyRef]>) -> ObjectValues {
    ObjectValues {
        key: view.key,
        values: project(view.values, select),
        is_deleted: view.deleted,
        first_version: view.first_version,
        last_version: view.last_version,
    }
}
