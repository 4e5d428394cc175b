//! Module: db::response
//! Responsibility: per-key statuses and read results returned by `DataStore`.

use crate::{
    clock::Version,
    db::{
        aggregate::AggregationResult,
        change::{Delta, DeltaSet},
        subscription::Update,
    },
    key::Key,
    model::ValidationException,
    value::Values,
};
use serde::Serialize;
use std::collections::BTreeMap;

///
/// AddStatus
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum AddStatus {
    Success {
        key: Key,
        version: Version,
    },
    /// `reference` names the unique property on a unique collision, in
    /// which case `key` is the record holding the value.
    AlreadyExists {
        key: Key,
        reference: Option<String>,
    },
    ValidationFail {
        exceptions: Vec<ValidationException>,
    },
    ServerFail {
        cause: String,
    },
}

///
/// ChangeStatus
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum ChangeStatus {
    /// `server_changes` are the deltas the store produced on its own:
    /// assigned incrementing-map keys and index updates.
    Success {
        version: Version,
        server_changes: Vec<Delta>,
    },
    DoesNotExist,
    AlreadyExists {
        key: Key,
        reference: Option<String>,
    },
    ValidationFail {
        exceptions: Vec<ValidationException>,
    },
    ServerFail {
        cause: String,
    },
}

///
/// DeleteStatus
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum DeleteStatus {
    Success { version: Version },
    DoesNotExist,
    ServerFail { cause: String },
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AddResponse {
    pub statuses: Vec<AddStatus>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ChangeResponse {
    pub statuses: Vec<(Key, ChangeStatus)>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct DeleteResponse {
    pub statuses: Vec<(Key, DeleteStatus)>,
}

///
/// ObjectValues
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ObjectValues {
    pub key: Key,
    pub values: Values,
    pub is_deleted: bool,
    pub first_version: Version,
    pub last_version: Version,
}

///
/// FetchType
/// How a read was serviced.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum FetchType {
    ByKey,
    ByIndex { index: String },
}

///
/// ValuesResponse
///

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValuesResponse {
    pub values: Vec<ObjectValues>,
    pub aggregations: BTreeMap<String, AggregationResult>,
    pub fetch_type: FetchType,
    /// Store version the read observed.
    pub version: Version,
}

impl ValuesResponse {
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.values.iter().map(|v| v.key.clone()).collect()
    }
}

///
/// ObjectChanges
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ObjectChanges {
    pub key: Key,
    pub sets: Vec<DeltaSet>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChangesResponse {
    pub changes: Vec<ObjectChanges>,
    pub version: Version,
}

///
/// UpdatesResponse
/// One-shot result of an updates request: the activation sequence.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct UpdatesResponse {
    pub updates: Vec<Update>,
    pub version: Version,
}

///
/// ProcessStatus
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum ProcessStatus {
    Applied { keys: Vec<Key> },
    /// The update carries nothing to apply locally.
    Ignored,
    Failed { key: Key, cause: String },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ProcessResponse {
    pub status: ProcessStatus,
    /// Last local version committed while applying the update.
    pub version: Option<Version>,
}
