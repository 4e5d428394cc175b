use crate::{
    clock::Version,
    db::{
        change::Delta,
        response::{ObjectChanges, ObjectValues},
    },
    key::Key,
    value::Values,
};
use serde::Serialize;

///
/// RemovalReason
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum RemovalReason {
    /// No longer matches, or ranked out of the bounded window.
    NotInRange,
    SoftDeleted,
    HardDeleted,
}

///
/// Update
///
/// One message of a subscription. Activation emits `OrderedKeys` (or the
/// difference against a known window) plus the requested initial payload;
/// later messages follow commits in version order.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Update {
    OrderedKeys {
        keys: Vec<Key>,
        version: Version,
    },
    InitialValues {
        values: Vec<ObjectValues>,
        version: Version,
    },
    InitialChanges {
        changes: Vec<ObjectChanges>,
        version: Version,
    },
    /// `index` is the insertion position in the window.
    Addition {
        key: Key,
        version: Version,
        index: u32,
        values: Values,
    },
    Removal {
        key: Key,
        version: Version,
        reason: RemovalReason,
    },
    Change {
        key: Key,
        version: Version,
        deltas: Vec<Delta>,
    },
}

impl Update {
    #[must_use]
    pub const fn version(&self) -> Version {
        match self {
            Self::OrderedKeys { version, .. }
            | Self::InitialValues { version, .. }
            | Self::InitialChanges { version, .. }
            | Self::Addition { version, .. }
            | Self::Removal { version, .. }
            | Self::Change { version, .. } => *version,
        }
    }

    /// Key of a per-record update.
    #[must_use]
    pub const fn key(&self) -> Option<&Key> {
        match self {
            Self::Addition { key, .. } | Self::Removal { key, .. } | Self::Change { key, .. } => {
                Some(key)
            }
            Self::OrderedKeys { .. } | Self::InitialValues { .. } | Self::InitialChanges { .. } => {
                None
            }
        }
    }
}
