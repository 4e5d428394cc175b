//! Strata: a versioned, indexable object store with time-travel reads,
//! change feeds and live subscriptions.
//!
//! This is the public meta-crate. Downstream users depend on **strata** only.
//!
//! It re-exports the stable public API of `strata-core` (store facade,
//! data models, filters, requests, values and metrics).

pub use strata_core as core;

pub use strata_core::{
    db::{DataStore, error::Error},
    obs,
};

//
// Prelude
//

pub mod prelude {
    pub use strata_core::prelude::*;
    pub use strata_core::db::subscription::{LiveUpdates, SubscriptionState};
}
