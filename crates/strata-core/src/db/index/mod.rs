//! Module: db::index
//! Responsibility: secondary index maintenance and per-commit index deltas.
//! Does not own: uniqueness (see `db::unique`) or query planning.

mod key;
mod store;

use crate::{
    db::change::IndexUpdate,
    key::Key,
    model::{DataModel, IndexDefinition},
    value::Values,
};
use std::collections::BTreeMap;

// re-exports
pub use key::IndexKey;
pub(crate) use key::sort_key;
pub(crate) use store::IndexStore;

///
/// IndexManager
///

#[derive(Debug, Default)]
pub(crate) struct IndexManager {
    stores: BTreeMap<String, IndexStore>,
}

///
/// IndexDelta
/// Index side effects of one commit.
///

#[derive(Debug, Default)]
pub(crate) struct IndexDelta {
    pub(crate) updates: Vec<IndexUpdate>,
    pub(crate) inserts: u64,
    pub(crate) removes: u64,
}

impl IndexManager {
    pub(crate) fn new(model: &DataModel) -> Self {
        Self {
            stores: model
                .indexes
                .iter()
                .map(|index| (index.name.clone(), IndexStore::new(index.clone())))
                .collect(),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&IndexStore> {
        self.stores.get(name)
    }

    pub(crate) fn definitions(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.stores.values().map(IndexStore::definition)
    }

    /// Re-derive every index entry of one record; `None` drops the record.
    pub(crate) fn update(&mut self, primary: &Key, values: Option<&Values>) -> IndexDelta {
        let mut delta = IndexDelta::default();

        for store in self.stores.values_mut() {
            let entry_delta = store.replace(primary, values);
            delta.updates.extend(entry_delta.updates);
            delta.inserts += entry_delta.inserts;
            delta.removes += entry_delta.removes;
        }

        delta
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_model;

    #[test]
    fn update_touches_every_declared_index() {
        let model = sample_model();
        let mut manager = IndexManager::new(&model);
        let key = Key::new([7; 8]);
        let values = crate::test_support::article(1, "hello", "a@x.io", &["x", "y"]);

        let delta = manager.update(&key, Some(&values));
        assert!(delta.inserts >= 3);
        assert_eq!(delta.removes, 0);

        let delta = manager.update(&key, None);
        assert_eq!(delta.inserts, 0);
        assert!(delta.updates.iter().all(|u| u.key.is_none()));
        assert!(
            manager
                .definitions()
                .all(|d| manager.get(&d.name).unwrap().ranked(None, false).next().is_none())
        );
    }
}
