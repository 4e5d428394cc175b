use crate::{
    clock::Version,
    db::{change::DeltaSet, store::Record},
    error::InternalError,
    key::Key,
    model::Codec,
    reference::PropertyRef,
};

///
/// FeedWindow
///
/// Version bounds and shaping of one change feed: `(from, to]`, optional
/// property selection, and a cap keeping only the newest delta sets.
///

#[derive(Clone, Copy, Debug)]
pub(crate) struct FeedWindow<'a> {
    pub(crate) from: Version,
    pub(crate) to: Option<Version>,
    pub(crate) select: Option<&'a [PropertyRef]>,
    pub(crate) max_versions: Option<usize>,
}

impl FeedWindow<'_> {
    fn contains(&self, version: Version) -> bool {
        version > self.from && self.to.is_none_or(|to| version <= to)
    }
}

/// Delta sets of one record inside the window, oldest first.
pub(crate) fn changes_of(
    record: &Record,
    codec: &dyn Codec,
    key: &Key,
    window: &FeedWindow<'_>,
) -> Result<Vec<DeltaSet>, InternalError> {
    let mut sets: Vec<DeltaSet> = record
        .delta_sets(codec, key)?
        .into_iter()
        .filter(|set| window.contains(set.version))
        .map(|set| match window.select {
            Some(select) => set.select(select),
            None => set,
        })
        .collect();

    if let Some(max) = window.max_versions {
        let excess = sets.len().saturating_sub(max);
        sets.drain(..excess);
    }

    Ok(sets)
}

///
/// TESTS
///
