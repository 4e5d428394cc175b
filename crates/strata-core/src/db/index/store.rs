//! Module: index::store
//! Responsibility: ordered entries of one index plus the reverse map used
//! to compute per-record deltas.

use crate::{
    db::{
        change::IndexUpdate,
        index::key::{IndexKey, encode_entries},
    },
    key::Key,
    model::IndexDefinition,
    value::{Value, Values},
};
use std::collections::{BTreeMap, BTreeSet};

///
/// IndexEntry
///
/// Ordering is `(index_key, primary, element)`, so equal index keys
/// tie-break by primary key.
///

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) struct IndexEntry {
    pub(crate) index_key: IndexKey,
    pub(crate) primary: Key,
    pub(crate) element: Option<Value>,
}

///
/// EntryDelta
///

#[derive(Debug, Default)]
pub(crate) struct EntryDelta {
    pub(crate) updates: Vec<IndexUpdate>,
    pub(crate) inserts: u64,
    pub(crate) removes: u64,
}

///
/// IndexStore
///

#[derive(Debug)]
pub(crate) struct IndexStore {
    definition: IndexDefinition,
    entries: BTreeSet<IndexEntry>,
    by_record: BTreeMap<Key, BTreeMap<Option<Value>, IndexKey>>,
}

impl IndexStore {
    pub(crate) const fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            entries: BTreeSet::new(),
            by_record: BTreeMap::new(),
        }
    }

    pub(crate) const fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    /// Replace the entries of one record; `None` removes them all.
    pub(crate) fn replace(&mut self, primary: &Key, values: Option<&Values>) -> EntryDelta {
        let previous = self.by_record.remove(primary).unwrap_or_default();
        let next: BTreeMap<Option<Value>, IndexKey> = values
            .map(|values| encode_entries(&self.definition.parts, values))
            .unwrap_or_default()
            .into_iter()
            .collect();

        let mut delta = EntryDelta::default();
        let elements: BTreeSet<&Option<Value>> = previous.keys().chain(next.keys()).collect();

        for element in elements {
            let old = previous.get(element);
            let new = next.get(element);
            if old == new {
                continue;
            }

            if let Some(old) = old {
                self.entries.remove(&IndexEntry {
                    index_key: old.clone(),
                    primary: primary.clone(),
                    element: element.clone(),
                });
                delta.removes += 1;
            }
            if let Some(new) = new {
                self.entries.insert(IndexEntry {
                    index_key: new.clone(),
                    primary: primary.clone(),
                    element: element.clone(),
                });
                delta.inserts += 1;
            }

            delta.updates.push(IndexUpdate {
                index: self.definition.name.clone(),
                element: element.clone(),
                key: new.cloned(),
                previous: old.cloned(),
            });
        }

        if !next.is_empty() {
            self.by_record.insert(primary.clone(), next);
        }

        delta
    }

    /// Records in index order, each ranked once at its lowest entry,
    /// beginning at the `(rank, key)` position when one is given.
    pub(crate) fn ranked<'a>(
        &'a self,
        from: Option<(&IndexKey, &Key)>,
        descending: bool,
    ) -> Box<dyn Iterator<Item = (&'a IndexKey, &'a Key)> + 'a> {
        let entries: Box<dyn Iterator<Item = &'a IndexEntry> + 'a> = match (from, descending) {
            (None, false) => Box::new(self.entries.iter()),
            (None, true) => Box::new(self.entries.iter().rev()),
            (Some((rank, key)), false) => Box::new(self.entries.range(IndexEntry {
                index_key: rank.clone(),
                primary: key.clone(),
                element: None,
            }..)),
            (Some((rank, key)), true) => {
                let (rank, key) = (rank.clone(), key.clone());
                Box::new(self.entries.iter().rev().skip_while(move |entry| {
                    (&entry.index_key, &entry.primary) > (&rank, &key)
                }))
            }
        };

        Box::new(
            entries
                .filter(move |entry| self.is_lowest(entry))
                .map(|entry| (&entry.index_key, &entry.primary)),
        )
    }

    // Entries sort by (index key, primary, element), so a record's lowest
    // entry is its smallest (index key, element) pair.
    fn is_lowest(&self, entry: &IndexEntry) -> bool {
        self.by_record
            .get(&entry.primary)
            .and_then(|entries| {
                entries
                    .iter()
                    .min_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)))
            })
            .is_some_and(|(element, key)| *key == entry.index_key && *element == entry.element)
    }

    /// Lowest entry of one record, if it has any.
    pub(crate) fn rank_of(&self, primary: &Key) -> Option<IndexKey> {
        self.by_record
            .get(primary)
            .and_then(|entries| entries.values().min().cloned())
    }
}

///
/// TESTS
///
