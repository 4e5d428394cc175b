//! Module: db::change
//! Responsibility: change requests, recorded deltas and their replay.
//! Does not own: commit ordering or index maintenance.

pub(crate) mod apply;
pub(crate) mod feed;

use crate::{
    clock::Version,
    db::index::IndexKey,
    reference::PropertyRef,
    value::{Value, Values},
};
use serde::{Deserialize, Serialize};

// re-exports
pub use apply::{ApplyError, ReplayState, replay};

///
/// Change
///
/// One requested mutation of a record. Changes of one request apply in
/// the order given. Every `Check` reads the stored record before any
/// change applies, and one failing check aborts the whole batch.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Change {
    Put {
        reference: PropertyRef,
        value: Value,
    },
    /// Removing an incrementing map clears its entries but keeps its
    /// key counter.
    Delete {
        reference: PropertyRef,
    },
    List {
        reference: PropertyRef,
        ops: Vec<ListOp>,
    },
    SetItems {
        reference: PropertyRef,
        add: Vec<Value>,
        remove: Vec<Value>,
    },
    /// Append values under store-assigned ascending keys.
    IncMapAdd {
        reference: PropertyRef,
        values: Vec<Value>,
    },
    /// Expected current value; `None` expects absence.
    Check {
        reference: PropertyRef,
        expected: Option<Value>,
    },
}

impl Change {
    #[must_use]
    pub fn put(reference: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::Put {
            reference: reference.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn delete(reference: impl Into<PropertyRef>) -> Self {
        Self::Delete {
            reference: reference.into(),
        }
    }

    #[must_use]
    pub fn list(reference: impl Into<PropertyRef>, ops: impl IntoIterator<Item = ListOp>) -> Self {
        Self::List {
            reference: reference.into(),
            ops: ops.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn check(reference: impl Into<PropertyRef>, expected: Option<Value>) -> Self {
        Self::Check {
            reference: reference.into(),
            expected,
        }
    }
}

///
/// ListOp
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ListOp {
    Insert { index: u32, value: Value },
    DeleteAt { index: u32 },
    /// Removes every element equal to the value.
    DeleteValue { value: Value },
    Append { value: Value },
}

impl ListOp {
    #[must_use]
    pub fn insert(index: u32, value: impl Into<Value>) -> Self {
        Self::Insert {
            index,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn delete_value(value: impl Into<Value>) -> Self {
        Self::DeleteValue {
            value: value.into(),
        }
    }

    #[must_use]
    pub fn append(value: impl Into<Value>) -> Self {
        Self::Append {
            value: value.into(),
        }
    }
}

///
/// Delta
///
/// One entry of a recorded delta set. Replaying the field deltas of every
/// delta set in version order from empty rebuilds the record.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Delta {
    /// The record (re)starts here from an empty value bag.
    ObjectCreate,
    SoftDelete,

    Put {
        reference: PropertyRef,
        value: Value,
    },
    /// Removing an incrementing map clears its entries but keeps its
    /// key counter.
    Delete {
        reference: PropertyRef,
    },
    List {
        reference: PropertyRef,
        ops: Vec<ListOp>,
    },
    SetItems {
        reference: PropertyRef,
        add: Vec<Value>,
        remove: Vec<Value>,
    },
    /// Incrementing-map entries with the keys the store assigned.
    IncMapAdded {
        reference: PropertyRef,
        entries: Vec<(u32, Value)>,
    },
    /// A tagged-union property switched to another arm.
    TypeChange {
        reference: PropertyRef,
        tag: String,
        value: Value,
    },

    /// Side effect on a secondary index; ignored by replay.
    IndexUpdate(IndexUpdate),
}

impl Delta {
    /// Property the delta touches, for field deltas.
    #[must_use]
    pub const fn reference(&self) -> Option<&PropertyRef> {
        match self {
            Self::Put { reference, .. }
            | Self::Delete { reference }
            | Self::List { reference, .. }
            | Self::SetItems { reference, .. }
            | Self::IncMapAdded { reference, .. }
            | Self::TypeChange { reference, .. } => Some(reference),
            Self::ObjectCreate | Self::SoftDelete | Self::IndexUpdate(_) => None,
        }
    }

    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::ObjectCreate | Self::SoftDelete)
    }
}

///
/// IndexUpdate
///
/// A changed index position of one record (or one collection element, for
/// wildcard indexes). `key` is `None` when the entry disappeared and
/// `previous` is `None` when it is new.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexUpdate {
    pub index: String,
    pub element: Option<Value>,
    pub key: Option<IndexKey>,
    pub previous: Option<IndexKey>,
}

///
/// DeltaSet
/// Everything committed atomically at one version.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DeltaSet {
    pub version: Version,
    pub deltas: Vec<Delta>,
}

impl DeltaSet {
    #[must_use]
    pub const fn new(version: Version, deltas: Vec<Delta>) -> Self {
        Self { version, deltas }
    }

    /// Keep structural markers and index updates; keep field deltas only
    /// when they touch a selected property.
    #[must_use]
    pub fn select(mut self, select: &[PropertyRef]) -> Self {
        self.deltas.retain(|delta| {
            delta.reference().is_none_or(|reference| {
                select
                    .iter()
                    .any(|s| reference.starts_with(s) || s.starts_with(reference))
            })
        });
        self
    }
}

/// Creation deltas describing a complete value bag.
pub(crate) fn creation_deltas(values: &Values) -> Vec<Delta> {
    let mut deltas = Vec::with_capacity(values.len() + 1);
    deltas.push(Delta::ObjectCreate);
    deltas.extend(values.iter().map(|(name, value)| Delta::Put {
        reference: PropertyRef::field(name.clone()),
        value: value.clone(),
    }));

    deltas
}

/// Top-level deltas turning `previous` into `next`.
pub(crate) fn diff_deltas(previous: &Values, next: &Values) -> Vec<Delta> {
    let mut deltas = Vec::new();

    for (name, value) in next.iter() {
        if previous.get(name) != Some(value) {
            deltas.push(Delta::Put {
                reference: PropertyRef::field(name.clone()),
                value: value.clone(),
            });
        }
    }
    for name in previous.keys() {
        if !next.contains_key(name) {
            deltas.push(Delta::Delete {
                reference: PropertyRef::field(name.clone()),
            });
        }
    }

    deltas
}
