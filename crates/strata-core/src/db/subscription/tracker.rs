//! Per-commit reconciliation of one subscription window.

use crate::{
    clock::Version,
    db::{
        change::Delta,
        commit::{CommitEvent, CommitKind},
        error::Error,
        predicate::Predicate,
        query::project,
        subscription::{
            RemovalReason, Update,
            window::{Ranking, Window, WindowEntry},
        },
    },
    key::Key,
    reference::PropertyRef,
    value::Values,
};

///
/// Refill
/// Source of the records that follow the window's last entry.
///

pub(crate) trait Refill {
    /// Up to `count` records matching `predicate` after `after` (or from
    /// the start bound when `None`), as of `version`.
    fn after(
        &self,
        window: &Window,
        predicate: &Predicate,
        after: Option<&WindowEntry>,
        count: usize,
        version: Version,
    ) -> Result<Vec<(Key, Values)>, Error>;
}

///
/// Tracker
///

#[derive(Debug)]
pub(crate) struct Tracker {
    pub(crate) window: Window,
    pub(crate) predicate: Predicate,
    pub(crate) select: Option<Vec<PropertyRef>>,
    /// Index whose updates accompany `Change` messages.
    pub(crate) order_index: Option<String>,
    /// Version the window is synchronized to.
    pub(crate) cursor: Version,
}

impl Tracker {
    /// Reconcile the window with one commit. Commits at or below the
    /// cursor were already reflected at activation.
    pub(crate) fn process(
        &mut self,
        event: &CommitEvent,
        refill: &dyn Refill,
    ) -> Result<Vec<Update>, Error> {
        if event.version <= self.cursor {
            return Ok(Vec::new());
        }
        self.cursor = event.version;

        let mut updates = Vec::new();
        let was = self.window.position(&event.key);
        let candidate = match (&event.values, event.kind) {
            (Some(values), CommitKind::Created | CommitKind::Changed)
                if self.predicate.matches(values) =>
            {
                self.window.candidate(&event.key, values)
            }
            _ => None,
        };

        match (was, candidate) {
            (Some(at), Some(entry)) => {
                let was_full = self.window.is_full();
                self.window.remove(at);
                let to = self.window.insertion_index(&entry);

                if to == at {
                    self.window.insert(at, entry);
                    updates.push(Update::Change {
                        key: event.key.clone(),
                        version: event.version,
                        deltas: self.change_deltas(&event.deltas),
                    });
                } else {
                    updates.push(self.removal(event, RemovalReason::NotInRange));
                    if was_full && to == self.window.len() {
                        self.refill(event.version, refill, &mut updates)?;
                    } else {
                        self.add(event, to, entry, &mut updates);
                    }
                }
            }
            (Some(at), None) => {
                let was_full = self.window.is_full();
                self.window.remove(at);
                let reason = match event.kind {
                    CommitKind::SoftDeleted => RemovalReason::SoftDeleted,
                    CommitKind::HardDeleted => RemovalReason::HardDeleted,
                    CommitKind::Created | CommitKind::Changed => RemovalReason::NotInRange,
                };
                updates.push(self.removal(event, reason));
                if was_full {
                    self.refill(event.version, refill, &mut updates)?;
                }
            }
            (None, Some(entry)) => {
                let to = self.window.insertion_index(&entry);
                if self.window.is_full() {
                    if to < self.window.len() {
                        if let Some(last) = self.window.pop() {
                            updates.push(Update::Removal {
                                key: last.key,
                                version: event.version,
                                reason: RemovalReason::NotInRange,
                            });
                        }
                        self.add(event, to, entry, &mut updates);
                    }
                } else {
                    self.add(event, to, entry, &mut updates);
                }
            }
            (None, None) => {}
        }

        Ok(updates)
    }

    /// Field deltas touching the selection plus updates of the order index.
    pub(crate) fn change_deltas(&self, deltas: &[Delta]) -> Vec<Delta> {
        deltas
            .iter()
            .filter(|delta| match delta {
                Delta::IndexUpdate(update) => self.order_index.as_deref() == Some(&update.index),
                other => other.reference().is_none_or(|reference| {
                    self.select.as_ref().is_none_or(|select| {
                        select
                            .iter()
                            .any(|s| reference.starts_with(s) || s.starts_with(reference))
                    })
                }),
            })
            .cloned()
            .collect()
    }

    fn removal(&self, event: &CommitEvent, reason: RemovalReason) -> Update {
        Update::Removal {
            key: event.key.clone(),
            version: event.version,
            reason,
        }
    }

    fn add(&mut self, event: &CommitEvent, to: usize, entry: WindowEntry, updates: &mut Vec<Update>) {
        let values = event.values.clone().unwrap_or_default();
        self.window.insert(to, entry);
        updates.push(Update::Addition {
            key: event.key.clone(),
            version: event.version,
            index: index_u32(to),
            values: project(values, self.select.as_deref()),
        });
    }

    // Top the bounded window back up with the records that follow it.
    fn refill(
        &mut self,
        version: Version,
        refill: &dyn Refill,
        updates: &mut Vec<Update>,
    ) -> Result<(), Error> {
        let Some(free) = self.window.free().filter(|free| *free > 0) else {
            return Ok(());
        };
        if !matches!(self.window.ranking(), Ranking::Ordered { .. }) {
            return Ok(());
        }

        let rows = refill.after(
            &self.window,
            &self.predicate,
            self.window.last(),
            free,
            version,
        )?;
        for (key, values) in rows {
            if self.window.contains(&key) {
                continue;
            }
            let Some(entry) = self.window.candidate(&key, &values) else {
                continue;
            };
            let to = self.window.len();
            self.window.insert(to, entry);
            updates.push(Update::Addition {
                key,
                version,
                index: index_u32(to),
                values: project(values, self.select.as_deref()),
            });
        }

        Ok(())
    }
}

fn index_u32(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{predicate::Filter, query::Order};
    use std::cell::RefCell;

    fn k(b: u8) -> Key {
        Key::new([b])
    }

    // Serves refills from a fixed backing list sorted by key.
    struct Backing(RefCell<Vec<(Key, Values)>>);

    impl Refill for Backing {
        fn after(
            &self,
            _window: &Window,
            _predicate: &Predicate,
            after: Option<&WindowEntry>,
            count: usize,
            _version: Version,
        ) -> Result<Vec<(Key, Values)>, Error> {
            Ok(self
                .0
                .borrow()
                .iter()
                .filter(|(key, _)| after.is_none_or(|after| key > &after.key))
                .take(count)
                .cloned()
                .collect())
        }
    }

    fn tracker(limit: usize, keys: &[u8]) -> Tracker {
        Tracker {
            window: Window::new(
                Ranking::Ordered {
                    order: Order::by_key(),
                    start: None,
                    limit,
                },
                keys.iter()
                    .map(|&b| WindowEntry { key: k(b), rank: None })
                    .collect(),
            ),
            predicate: Predicate::compile(Some(&Filter::equals("live", true))).unwrap(),
            select: None,
            order_index: None,
            cursor: Version::from_parts(1, 0),
        }
    }

    fn event(n: u64, key: u8, kind: CommitKind, live: bool) -> CommitEvent {
        CommitEvent {
            version: Version::from_parts(n, 0),
            key: k(key),
            kind,
            values: (kind != CommitKind::HardDeleted).then(|| Values::new().with("live", live)),
            deltas: Vec::new(),
        }
    }

    fn backing(keys: &[u8]) -> Backing {
        Backing(RefCell::new(
            keys.iter()
                .map(|&b| (k(b), Values::new().with("live", true)))
                .collect(),
        ))
    }

    #[test]
    fn stale_commits_are_ignored() {
        let mut tracker = tracker(3, &[1, 2]);
        let updates = tracker
            .process(&event(1, 3, CommitKind::Created, true), &backing(&[]))
            .unwrap();

        assert!(updates.is_empty());
    }

    #[test]
    fn addition_into_full_window_evicts_last_first() {
        let mut tracker = tracker(2, &[2, 4]);
        let updates = tracker
            .process(&event(2, 3, CommitKind::Created, true), &backing(&[]))
            .unwrap();

        assert!(matches!(&updates[0], Update::Removal { key, .. } if *key == k(4)));
        assert!(matches!(&updates[1], Update::Addition { key, index: 1, .. } if *key == k(3)));
        assert_eq!(tracker.window.keys(), vec![k(2), k(3)]);
    }

    #[test]
    fn additions_past_a_full_window_are_ignored() {
        let mut tracker = tracker(2, &[2, 4]);
        let updates = tracker
            .process(&event(2, 9, CommitKind::Created, true), &backing(&[]))
            .unwrap();

        assert!(updates.is_empty());
    }

    #[test]
    fn removal_refills_from_the_store() {
        let mut tracker = tracker(2, &[2, 4]);
        let updates = tracker
            .process(&event(2, 2, CommitKind::SoftDeleted, true), &backing(&[4, 6]))
            .unwrap();

        assert!(matches!(
            &updates[0],
            Update::Removal { reason: RemovalReason::SoftDeleted, .. }
        ));
        assert!(matches!(&updates[1], Update::Addition { key, index: 1, .. } if *key == k(6)));
        assert_eq!(tracker.window.keys(), vec![k(4), k(6)]);
    }

    #[test]
    fn failing_filter_removes_with_not_in_range() {
        let mut tracker = tracker(5, &[2]);
        let updates = tracker
            .process(&event(2, 2, CommitKind::Changed, false), &backing(&[]))
            .unwrap();

        assert_eq!(
            updates,
            vec![Update::Removal {
                key: k(2),
                version: Version::from_parts(2, 0),
                reason: RemovalReason::NotInRange,
            }]
        );
    }

    #[test]
    fn unchanged_position_yields_change() {
        let mut tracker = tracker(5, &[2, 4]);
        let updates = tracker
            .process(&event(2, 4, CommitKind::Changed, true), &backing(&[]))
            .unwrap();

        assert!(matches!(&updates[..], [Update::Change { key, .. }] if *key == k(4)));
    }
}
