//! Module: db::request
//! Responsibility: request shapes accepted by `DataStore`.

use crate::{
    clock::Version,
    db::{aggregate::Aggregation, change::Change, predicate::Filter, query::Order},
    key::Key,
    reference::PropertyRef,
    value::Values,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// AddRequest
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct AddRequest {
    pub values: Vec<Values>,
}

impl AddRequest {
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = Values>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

///
/// ObjectChange
/// Changes for one record, optionally guarded by its expected last version.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ObjectChange {
    pub key: Key,
    pub changes: Vec<Change>,
    pub last_version: Option<Version>,
}

impl ObjectChange {
    #[must_use]
    pub fn new(key: Key, changes: impl IntoIterator<Item = Change>) -> Self {
        Self {
            key,
            changes: changes.into_iter().collect(),
            last_version: None,
        }
    }

    #[must_use]
    pub const fn expect_version(mut self, version: Version) -> Self {
        self.last_version = Some(version);
        self
    }
}

///
/// ChangeRequest
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ChangeRequest {
    pub objects: Vec<ObjectChange>,
}

impl ChangeRequest {
    #[must_use]
    pub fn new(objects: impl IntoIterator<Item = ObjectChange>) -> Self {
        Self {
            objects: objects.into_iter().collect(),
        }
    }
}

///
/// DeleteRequest
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DeleteRequest {
    pub keys: Vec<Key>,
    pub hard_delete: bool,
}

impl DeleteRequest {
    #[must_use]
    pub fn soft(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            hard_delete: false,
        }
    }

    #[must_use]
    pub fn hard(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            hard_delete: true,
        }
    }
}

///
/// GetRequest
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GetRequest {
    pub keys: Vec<Key>,
    pub filter: Option<Filter>,
    pub to_version: Option<Version>,
    pub select: Option<Vec<PropertyRef>>,
    pub include_soft_deleted: bool,
    pub aggregations: BTreeMap<String, Aggregation>,
}

impl GetRequest {
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub const fn to_version(mut self, version: Version) -> Self {
        self.to_version = Some(version);
        self
    }

    #[must_use]
    pub fn select(mut self, select: impl IntoIterator<Item = impl Into<PropertyRef>>) -> Self {
        self.select = Some(select.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub const fn include_soft_deleted(mut self) -> Self {
        self.include_soft_deleted = true;
        self
    }

    #[must_use]
    pub fn aggregate(mut self, name: impl Into<String>, aggregation: Aggregation) -> Self {
        self.aggregations.insert(name.into(), aggregation);
        self
    }
}

///
/// ScanRequest
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ScanRequest {
    pub start_key: Option<Key>,
    pub filter: Option<Filter>,
    pub order: Order,
    /// Store default when unset.
    pub limit: Option<u32>,
    pub include_start: bool,
    pub to_version: Option<Version>,
    pub select: Option<Vec<PropertyRef>>,
    pub aggregations: BTreeMap<String, Aggregation>,
    pub include_soft_deleted: bool,
    pub allow_full_scan: bool,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            start_key: None,
            filter: None,
            order: Order::by_key(),
            limit: None,
            include_start: true,
            to_version: None,
            select: None,
            aggregations: BTreeMap::new(),
            include_soft_deleted: false,
            allow_full_scan: false,
        }
    }
}

impl ScanRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn start_at(mut self, key: Key) -> Self {
        self.start_key = Some(key);
        self
    }

    #[must_use]
    pub const fn exclude_start(mut self) -> Self {
        self.include_start = false;
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn to_version(mut self, version: Version) -> Self {
        self.to_version = Some(version);
        self
    }

    #[must_use]
    pub fn select(mut self, select: impl IntoIterator<Item = impl Into<PropertyRef>>) -> Self {
        self.select = Some(select.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn aggregate(mut self, name: impl Into<String>, aggregation: Aggregation) -> Self {
        self.aggregations.insert(name.into(), aggregation);
        self
    }

    #[must_use]
    pub const fn include_soft_deleted(mut self) -> Self {
        self.include_soft_deleted = true;
        self
    }

    #[must_use]
    pub const fn allow_full_scan(mut self) -> Self {
        self.allow_full_scan = true;
        self
    }
}

///
/// ChangesWindow
/// Version bounds and shaping shared by both change-feed requests.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ChangesWindow {
    /// Exclusive lower bound.
    pub from_version: Version,
    /// Inclusive upper bound.
    pub to_version: Option<Version>,
    pub select: Option<Vec<PropertyRef>>,
    /// Keep only the newest N delta sets per key.
    pub max_versions: Option<u32>,
}

///
/// GetChangesRequest
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct GetChangesRequest {
    pub keys: Vec<Key>,
    pub filter: Option<Filter>,
    pub window: ChangesWindow,
    pub include_soft_deleted: bool,
}

impl GetChangesRequest {
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub const fn from_version(mut self, version: Version) -> Self {
        self.window.from_version = version;
        self
    }

    #[must_use]
    pub const fn to_version(mut self, version: Version) -> Self {
        self.window.to_version = Some(version);
        self
    }

    #[must_use]
    pub fn select(mut self, select: impl IntoIterator<Item = impl Into<PropertyRef>>) -> Self {
        self.window.select = Some(select.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub const fn max_versions(mut self, max: u32) -> Self {
        self.window.max_versions = Some(max);
        self
    }

    #[must_use]
    pub const fn include_soft_deleted(mut self) -> Self {
        self.include_soft_deleted = true;
        self
    }
}

///
/// ScanChangesRequest
/// Scan shape selecting the keys plus the change window applied to each.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ScanChangesRequest {
    pub scan: ScanRequest,
    pub window: ChangesWindow,
}

impl ScanChangesRequest {
    #[must_use]
    pub fn new(scan: ScanRequest) -> Self {
        Self {
            scan,
            window: ChangesWindow::default(),
        }
    }

    #[must_use]
    pub const fn from_version(mut self, version: Version) -> Self {
        self.window.from_version = version;
        self
    }

    #[must_use]
    pub const fn max_versions(mut self, max: u32) -> Self {
        self.window.max_versions = Some(max);
        self
    }

    #[must_use]
    pub fn select(mut self, select: impl IntoIterator<Item = impl Into<PropertyRef>>) -> Self {
        self.window.select = Some(select.into_iter().map(Into::into).collect());
        self
    }
}

///
/// UpdateSource
/// Which records a subscription tracks.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum UpdateSource {
    /// A fixed key list; window order follows the list.
    Keys(Vec<Key>),
    /// An ordered, limit-bounded scan window.
    Scan {
        start_key: Option<Key>,
        include_start: bool,
        order: Order,
        limit: Option<u32>,
    },
}

///
/// UpdatePayload
/// What follows the initial window announcement.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum UpdatePayload {
    #[default]
    Keys,
    Values,
    Changes,
}

///
/// UpdatesRequest
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct UpdatesRequest {
    pub source: UpdateSource,
    pub filter: Option<Filter>,
    pub select: Option<Vec<PropertyRef>>,
    pub payload: UpdatePayload,
    /// Replay history in `(from_version, activation]` for window keys.
    pub from_version: Option<Version>,
    /// Window the caller already holds; activation sends the difference.
    pub known_window: Option<Vec<Key>>,
}

impl UpdatesRequest {
    #[must_use]
    pub fn keys(keys: impl IntoIterator<Item = Key>) -> Self {
        Self::from_source(UpdateSource::Keys(keys.into_iter().collect()))
    }

    #[must_use]
    pub fn scan(order: Order, limit: u32) -> Self {
        Self::from_source(UpdateSource::Scan {
            start_key: None,
            include_start: true,
            order,
            limit: Some(limit),
        })
    }

    const fn from_source(source: UpdateSource) -> Self {
        Self {
            source,
            filter: None,
            select: None,
            payload: UpdatePayload::Keys,
            from_version: None,
            known_window: None,
        }
    }

    #[must_use]
    pub fn start_at(mut self, key: Key, include_start: bool) -> Self {
        if let UpdateSource::Scan {
            start_key,
            include_start: include,
            ..
        } = &mut self.source
        {
            *start_key = Some(key);
            *include = include_start;
        }
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn select(mut self, select: impl IntoIterator<Item = impl Into<PropertyRef>>) -> Self {
        self.select = Some(select.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub const fn payload(mut self, payload: UpdatePayload) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub const fn from_version(mut self, version: Version) -> Self {
        self.from_version = Some(version);
        self
    }

    #[must_use]
    pub fn known_window(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.known_window = Some(keys.into_iter().collect());
        self
    }
}
