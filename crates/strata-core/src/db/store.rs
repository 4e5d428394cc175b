//! Module: db::store
//! Responsibility: keyed record storage and version-bounded reads.
//! Does not own: index maintenance, uniqueness or commit publication.

use crate::{
    clock::Version,
    db::change::{Delta, DeltaSet, apply::replay_until, creation_deltas},
    error::InternalError,
    key::Key,
    model::Codec,
    value::Values,
};
use derive_more::Deref;
use std::{collections::BTreeMap, ops::Bound};

///
/// RawRow
/// Codec-encoded latest values of one record.
///

#[derive(Clone, Debug, Deref, Eq, PartialEq)]
pub(crate) struct RawRow(Vec<u8>);

impl RawRow {
    pub(crate) const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

///
/// Record
///

#[derive(Clone, Debug)]
pub(crate) struct Record {
    pub(crate) row: RawRow,
    pub(crate) deleted: bool,
    /// Version of the most recent creation.
    pub(crate) first_version: Version,
    pub(crate) last_version: Version,
    /// Present only when the store keeps every version.
    pub(crate) history: Option<Vec<DeltaSet>>,
}

impl Record {
    pub(crate) fn decode(&self, codec: &dyn Codec, key: &Key) -> Result<Values, InternalError> {
        codec.decode(&self.row).map_err(|err| {
            InternalError::store_corruption(format!("record {key} failed to decode: {err}"))
        })
    }

    /// State of the record as of `as_of` (latest when `None`).
    ///
    /// With history the state is replayed exactly. Without it the latest
    /// state stands in for any version at or after the last creation.
    pub(crate) fn view(
        &self,
        codec: &dyn Codec,
        key: &Key,
        as_of: Option<Version>,
    ) -> Result<Option<RecordView>, InternalError> {
        match (as_of, &self.history) {
            (None, _) => Ok(Some(self.latest(codec, key)?)),
            (Some(version), Some(history)) => {
                let state = replay_until(history, Some(version)).map_err(|err| {
                    InternalError::store_corruption(format!("record {key} history: {err}"))
                })?;

                Ok(state.map(|state| RecordView {
                    key: key.clone(),
                    values: state.values,
                    deleted: state.deleted,
                    first_version: state.created,
                    last_version: state.version,
                }))
            }
            (Some(version), None) if version >= self.first_version => {
                Ok(Some(self.latest(codec, key)?))
            }
            (Some(_), None) => Ok(None),
        }
    }

    /// Ordered delta sets of the record; a single synthetic set at the
    /// last version when history is not kept.
    pub(crate) fn delta_sets(
        &self,
        codec: &dyn Codec,
        key: &Key,
    ) -> Result<Vec<DeltaSet>, InternalError> {
        if let Some(history) = &self.history {
            return Ok(history.clone());
        }

        let mut deltas = creation_deltas(&self.decode(codec, key)?);
        if self.deleted {
            deltas.push(Delta::SoftDelete);
        }

        Ok(vec![DeltaSet::new(self.last_version, deltas)])
    }

    fn latest(&self, codec: &dyn Codec, key: &Key) -> Result<RecordView, InternalError> {
        Ok(RecordView {
            key: key.clone(),
            values: self.decode(codec, key)?,
            deleted: self.deleted,
            first_version: self.first_version,
            last_version: self.last_version,
        })
    }
}

///
/// RecordView
/// Decoded state of one record at some version.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct RecordView {
    pub(crate) key: Key,
    pub(crate) values: Values,
    pub(crate) deleted: bool,
    pub(crate) first_version: Version,
    pub(crate) last_version: Version,
}

///
/// RecordStore
///

#[derive(Debug, Default)]
pub(crate) struct RecordStore {
    records: BTreeMap<Key, Record>,
}

impl RecordStore {
    pub(crate) fn get(&self, key: &Key) -> Option<&Record> {
        self.records.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &Key) -> Option<&mut Record> {
        self.records.get_mut(key)
    }

    pub(crate) fn insert(&mut self, key: Key, record: Record) {
        self.records.insert(key, record);
    }

    pub(crate) fn remove(&mut self, key: &Key) -> Option<Record> {
        self.records.remove(key)
    }

    pub(crate) fn iter(&self) -> impl DoubleEndedIterator<Item = (&Key, &Record)> {
        self.records.iter()
    }

    /// Records in key order from `start`, ascending or descending.
    pub(crate) fn range_from<'a>(
        &'a self,
        start: Bound<&'a Key>,
        descending: bool,
    ) -> Box<dyn Iterator<Item = (&'a Key, &'a Record)> + 'a> {
        if descending {
            Box::new(
                self.records
                    .range::<Key, _>((Bound::Unbounded, start))
                    .rev(),
            )
        } else {
            Box::new(self.records.range::<Key, _>((start, Bound::Unbounded)))
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_codec;

    fn record(codec: &dyn Codec, values: &Values, history: bool) -> Record {
        let created = Version::from_parts(10, 0);
        Record {
            row: RawRow::new(codec.encode(values).unwrap()),
            deleted: false,
            first_version: created,
            last_version: created,
            history: history.then(|| vec![DeltaSet::new(created, creation_deltas(values))]),
        }
    }

    #[test]
    fn views_respect_versions_with_history() {
        let codec = sample_codec();
        let values = Values::new().with("title", "a");
        let key = Key::new([1]);
        let record = record(&codec, &values, true);

        assert!(
            record
                .view(&codec, &key, Some(Version::from_parts(9, 0)))
                .unwrap()
                .is_none()
        );
        let view = record
            .view(&codec, &key, Some(Version::from_parts(10, 0)))
            .unwrap()
            .unwrap();
        assert_eq!(view.values, values);
    }

    #[test]
    fn views_without_history_fall_back_to_latest() {
        let codec = sample_codec();
        let values = Values::new().with("title", "a");
        let key = Key::new([1]);
        let record = record(&codec, &values, false);

        assert!(
            record
                .view(&codec, &key, Some(Version::from_parts(9, 0)))
                .unwrap()
                .is_none()
        );
        assert!(
            record
                .view(&codec, &key, Some(Version::from_parts(99, 0)))
                .unwrap()
                .is_some()
        );
        assert_eq!(record.delta_sets(&codec, &key).unwrap().len(), 1);
    }

    #[test]
    fn undecodable_rows_are_corruption() {
        let codec = sample_codec();
        let mut record = record(&codec, &Values::new(), false);
        record.row = RawRow::new(vec![0xff, 0xff]);

        let err = record.view(&codec, &Key::new([1]), None).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn range_from_walks_both_directions() {
        let codec = sample_codec();
        let mut store = RecordStore::default();
        for b in 1..=4u8 {
            store.insert(Key::new([b]), record(&codec, &Values::new(), false));
        }

        let start = Key::new([2]);
        let up: Vec<_> = store
            .range_from(Bound::Included(&start), false)
            .map(|(k, _)| k.as_bytes()[0])
            .collect();
        let down: Vec<_> = store
            .range_from(Bound::Excluded(&start), true)
            .map(|(k, _)| k.as_bytes()[0])
            .collect();

        assert_eq!(up, vec![2, 3, 4]);
        assert_eq!(down, vec![1]);
    }
}
