use crate::{
    clock::Version,
    db::{index::IndexManager, store::RecordStore, unique::UniqueClaims},
    error::InternalError,
    model::Codec,
};
use std::sync::Arc;

///
/// StoreState
///
/// Everything guarded by the store lock: records, indexes and unique
/// claims always change together under one write guard.
///

pub(crate) struct StoreState {
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) records: RecordStore,
    pub(crate) indexes: IndexManager,
    pub(crate) unique: UniqueClaims,
    /// Version of the last commit.
    pub(crate) version: Version,
}

impl StoreState {
    pub(crate) fn new(codec: Arc<dyn Codec>) -> Self {
        let indexes = IndexManager::new(codec.model());

        Self {
            codec,
            records: RecordStore::default(),
            indexes,
            unique: UniqueClaims::default(),
            version: Version::ZERO,
        }
    }

    pub(crate) fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub(crate) fn model_name(&self) -> &str {
        &self.codec.model().name
    }

    /// Swap the codec and re-derive indexes and unique claims of every
    /// record under the new model.
    pub(crate) fn reindex(&mut self, codec: Arc<dyn Codec>) -> Result<(), InternalError> {
        let mut indexes = IndexManager::new(codec.model());
        let mut unique = UniqueClaims::default();

        for (key, record) in self.records.iter() {
            let values = record.decode(codec.as_ref(), key)?;
            indexes.update(key, Some(&values));
            if !record.deleted {
                unique.claim(codec.model(), key, &values);
            }
        }

        self.codec = codec;
        self.indexes = indexes;
        self.unique = unique;

        Ok(())
    }
}
