//! Module: index::key
//! Responsibility: order-preserving index key encoding.
//! Does not own: entry storage or delta bookkeeping.

use crate::{
    model::IndexPart,
    value::{Value, Values, encode_ordered, invert},
};
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

///
/// IndexKey
///
/// Concatenated ordered encodings of an index's parts. Encodings are
/// prefix-free, so byte order equals tuple order; reversed parts are
/// bit-inverted.
///

#[derive(Clone, Default, Deref, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct IndexKey(Vec<u8>);

impl IndexKey {
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex = String::with_capacity(self.0.len() * 2);
        for b in &self.0 {
            let _ = write!(hex, "{b:02x}");
        }
        write!(f, "IndexKey({hex})")
    }
}

/// Encode the index entries of one value bag: one entry without a
/// discriminator for plain indexes, one per element for wildcard indexes.
/// Records lacking any part value produce no entry.
pub(crate) fn encode_entries(parts: &[IndexPart], values: &Values) -> Vec<(Option<Value>, IndexKey)> {
    let Some(wildcard) = parts.iter().position(|p| p.reference.is_wildcard()) else {
        return encode_with(parts, values, None)
            .map(|key| vec![(None, key)])
            .unwrap_or_default();
    };

    parts[wildcard]
        .reference
        .resolve_elements(values)
        .into_iter()
        .filter_map(|(discriminator, element)| {
            encode_with(parts, values, Some((wildcard, element)))
                .map(|key| (Some(discriminator), key))
        })
        .collect()
}

/// Rank of a value bag under the given parts: its lowest entry.
pub(crate) fn sort_key(parts: &[IndexPart], values: &Values) -> Option<IndexKey> {
    encode_entries(parts, values)
        .into_iter()
        .map(|(_, key)| key)
        .min()
}

fn encode_with(
    parts: &[IndexPart],
    values: &Values,
    element: Option<(usize, &Value)>,
) -> Option<IndexKey> {
    let mut out = Vec::new();

    for (i, part) in parts.iter().enumerate() {
        let value = match element {
            Some((position, element)) if position == i => element,
            _ => part.reference.get(values)?,
        };
        let start = out.len();
        encode_ordered(value, &mut out).ok()?;
        if part.reversed {
            invert(&mut out[start..]);
        }
    }

    Some(IndexKey(out))
}

///
/// TESTS
///
