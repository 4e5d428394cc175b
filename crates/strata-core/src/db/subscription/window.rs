//! Ordered subscription window and known-window reconciliation.

use crate::{
    db::{index::IndexKey, query::Order},
    key::Key,
    value::Values,
};
use std::{cmp::Ordering, collections::BTreeMap};

///
/// WindowEntry
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct WindowEntry {
    pub(crate) key: Key,
    /// Order rank; always `None` for key order and listed keys.
    pub(crate) rank: Option<IndexKey>,
}

///
/// StartBound
///

#[derive(Clone, Debug)]
pub(crate) struct StartBound {
    pub(crate) entry: WindowEntry,
    pub(crate) inclusive: bool,
}

///
/// Ranking
///

#[derive(Clone, Debug)]
pub(crate) enum Ranking {
    /// Fixed key list; position in the list is the rank.
    Listed(BTreeMap<Key, usize>),
    Ordered {
        order: Order,
        start: Option<StartBound>,
        limit: usize,
    },
}

///
/// Window
///
/// Keys a subscriber currently holds, kept sorted by the ranking. For
/// ordered rankings the entries are always the first `len` qualifying
/// records after the start bound.
///

#[derive(Clone, Debug)]
pub(crate) struct Window {
    ranking: Ranking,
    entries: Vec<WindowEntry>,
}

impl Window {
    pub(crate) const fn new(ranking: Ranking, entries: Vec<WindowEntry>) -> Self {
        Self { ranking, entries }
    }

    pub(crate) fn keys(&self) -> Vec<Key> {
        self.entries.iter().map(|e| e.key.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn last(&self) -> Option<&WindowEntry> {
        self.entries.last()
    }

    pub(crate) fn contains(&self, key: &Key) -> bool {
        self.position(key).is_some()
    }

    pub(crate) fn position(&self, key: &Key) -> Option<usize> {
        self.entries.iter().position(|e| &e.key == key)
    }

    pub(crate) const fn ranking(&self) -> &Ranking {
        &self.ranking
    }

    /// Room left before the bounded window is full; `None` when unbounded.
    pub(crate) fn free(&self) -> Option<usize> {
        match &self.ranking {
            Ranking::Listed(_) => None,
            Ranking::Ordered { limit, .. } => Some(limit.saturating_sub(self.entries.len())),
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.free() == Some(0)
    }

    /// Window entry for a record with these values, when its position can
    /// qualify at all: listed, ranked, and not before the start bound.
    pub(crate) fn candidate(&self, key: &Key, values: &Values) -> Option<WindowEntry> {
        match &self.ranking {
            Ranking::Listed(keys) => keys.contains_key(key).then(|| WindowEntry {
                key: key.clone(),
                rank: None,
            }),
            Ranking::Ordered { order, start, .. } => {
                let rank = order.rank(values);
                if !order.is_key_order() && rank.is_none() {
                    return None;
                }
                let entry = WindowEntry {
                    key: key.clone(),
                    rank,
                };
                let after_start = start.as_ref().is_none_or(|start| {
                    match self.compare(&entry, &start.entry) {
                        Ordering::Greater => true,
                        Ordering::Equal => start.inclusive,
                        Ordering::Less => false,
                    }
                });

                after_start.then_some(entry)
            }
        }
    }

    pub(crate) fn insertion_index(&self, entry: &WindowEntry) -> usize {
        self.entries
            .partition_point(|e| self.compare(e, entry) == Ordering::Less)
    }

    pub(crate) fn insert(&mut self, index: usize, entry: WindowEntry) {
        self.entries.insert(index, entry);
    }

    pub(crate) fn remove(&mut self, index: usize) -> WindowEntry {
        self.entries.remove(index)
    }

    pub(crate) fn pop(&mut self) -> Option<WindowEntry> {
        self.entries.pop()
    }

    fn compare(&self, a: &WindowEntry, b: &WindowEntry) -> Ordering {
        match &self.ranking {
            Ranking::Listed(keys) => keys.get(&a.key).cmp(&keys.get(&b.key)),
            Ranking::Ordered { order, .. } => {
                order.compare((a.rank.as_ref(), &a.key), (b.rank.as_ref(), &b.key))
            }
        }
    }
}

///
/// KnownWindowDiff
///

#[derive(Debug, Default, Eq, PartialEq)]
pub(crate) struct KnownWindowDiff {
    pub(crate) removals: Vec<Key>,
    /// `(index, key)`, applied in ascending index order after removals.
    pub(crate) additions: Vec<(usize, Key)>,
}

/// Turn the window a caller holds into the current one with the fewest
/// moves: the known keys whose relative order survived (a longest
/// increasing run of their current positions) stay, every other known key
/// is removed, and missing keys are added at their final index.
pub(crate) fn diff_known(known: &[Key], current: &[Key]) -> KnownWindowDiff {
    let positions: BTreeMap<&Key, usize> = current.iter().enumerate().map(|(i, k)| (k, i)).collect();
    let present: Vec<(usize, &Key)> = known
        .iter()
        .filter_map(|k| positions.get(k).map(|&i| (i, k)))
        .collect();

    let kept = longest_increasing(&present.iter().map(|(i, _)| *i).collect::<Vec<_>>());
    let kept_keys: Vec<&Key> = kept.iter().map(|&at| present[at].1).collect();

    let removals = known
        .iter()
        .filter(|k| !kept_keys.contains(k))
        .cloned()
        .collect();
    let additions = current
        .iter()
        .enumerate()
        .filter(|(_, k)| !kept_keys.contains(k))
        .map(|(i, k)| (i, k.clone()))
        .collect();

    KnownWindowDiff {
        removals,
        additions,
    }
}

// Indexes into `values` of one longest strictly increasing subsequence.
fn longest_increasing(values: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut previous = vec![None; values.len()];

    for (i, value) in values.iter().enumerate() {
        let at = tails.partition_point(|&t| values[t] < *value);
        if at > 0 {
            previous[i] = Some(tails[at - 1]);
        }
        if at == tails.len() {
            tails.push(i);
        } else {
            tails[at] = i;
        }
    }

    let mut out = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        out.push(i);
        cursor = previous[i];
    }
    out.reverse();

    out
}

///
/// TESTS
///
