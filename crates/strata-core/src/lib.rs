//! Core runtime for Strata: a versioned, indexable object store with
//! time-travel reads, change feeds and live subscriptions.

// public exports are one module level down
pub mod clock;
pub mod db;
pub mod error;
pub mod key;
pub mod model;
pub mod obs;
pub mod reference;
pub mod serialize;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary plus the store facade.
/// No internals, serializers, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        clock::Version,
        db::{
            DataStore,
            aggregate::Aggregation,
            change::{Change, ListOp},
            config::StoreConfig,
            predicate::Filter,
            query::Order,
            request::{
                AddRequest, ChangeRequest, DeleteRequest, GetChangesRequest, GetRequest,
                ObjectChange, ScanChangesRequest, ScanRequest, UpdatePayload, UpdatesRequest,
            },
            subscription::{RemovalReason, Update},
        },
        key::Key,
        model::{DataModel, ModelCodec, PropertyDefinition, PropertyKind},
        reference::PropertyRef,
        value::{Value, Values},
    };
}
