//! Module: db::unique
//! Responsibility: unique-property claims of live records.

use crate::{
    key::Key,
    model::DataModel,
    value::{Values, encode_ordered},
};
use std::collections::BTreeMap;

///
/// UniqueConflict
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct UniqueConflict {
    pub(crate) property: String,
    pub(crate) holder: Key,
}

///
/// UniqueClaims
/// `(property, encoded value) -> holder`, for non-soft-deleted records.
///

#[derive(Debug, Default)]
pub(crate) struct UniqueClaims {
    claims: BTreeMap<(String, Vec<u8>), Key>,
}

impl UniqueClaims {
    /// First unique property of `values` already held by another record.
    pub(crate) fn conflict(
        &self,
        model: &DataModel,
        key: &Key,
        values: &Values,
    ) -> Option<UniqueConflict> {
        claim_keys(model, values).into_iter().find_map(|claim| {
            self.claims
                .get(&claim)
                .filter(|holder| *holder != key)
                .map(|holder| UniqueConflict {
                    property: claim.0.clone(),
                    holder: holder.clone(),
                })
        })
    }

    pub(crate) fn claim(&mut self, model: &DataModel, key: &Key, values: &Values) {
        for claim in claim_keys(model, values) {
            self.claims.insert(claim, key.clone());
        }
    }

    /// Drop the claims `key` holds for `values`.
    pub(crate) fn release(&mut self, model: &DataModel, key: &Key, values: &Values) {
        for claim in claim_keys(model, values) {
            if self.claims.get(&claim) == Some(key) {
                self.claims.remove(&claim);
            }
        }
    }
}

fn claim_keys(model: &DataModel, values: &Values) -> Vec<(String, Vec<u8>)> {
    model
        .unique_properties()
        .filter_map(|property| {
            let value = values.get(property)?;
            let mut bytes = Vec::new();
            encode_ordered(value, &mut bytes).ok()?;
            Some((property.to_string(), bytes))
        })
        .collect()
}

///
/// TESTS
///
