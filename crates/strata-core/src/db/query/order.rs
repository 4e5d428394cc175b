use crate::{
    db::{
        direction::Direction,
        index::{IndexKey, sort_key},
    },
    key::Key,
    model::{IndexDefinition, IndexPart},
    reference::PropertyRef,
    value::Values,
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

///
/// Order
///
/// Result order: key order when `parts` is empty, otherwise the tuple of
/// part values (each optionally reversed) with the primary key breaking
/// ties. `direction` flips the whole sequence.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Order {
    pub parts: Vec<IndexPart>,
    pub direction: Direction,
}

impl Order {
    #[must_use]
    pub fn by_key() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn by(reference: impl Into<PropertyRef>) -> Self {
        Self::by_key().then(reference)
    }

    #[must_use]
    pub fn then(mut self, reference: impl Into<PropertyRef>) -> Self {
        self.parts.push(IndexPart {
            reference: reference.into(),
            reversed: false,
        });
        self
    }

    #[must_use]
    pub fn then_reversed(mut self, reference: impl Into<PropertyRef>) -> Self {
        self.parts.push(IndexPart {
            reference: reference.into(),
            reversed: true,
        });
        self
    }

    #[must_use]
    pub const fn desc(mut self) -> Self {
        self.direction = Direction::Desc;
        self
    }

    #[must_use]
    pub const fn is_key_order(&self) -> bool {
        self.parts.is_empty()
    }

    /// True when walking `index` yields exactly this order (before the
    /// global direction is applied).
    #[must_use]
    pub fn served_by(&self, index: &IndexDefinition) -> bool {
        !self.is_key_order() && index.parts == self.parts
    }

    /// Rank of a value bag under this order; `None` for key order or when
    /// the record lacks a part value.
    pub(crate) fn rank(&self, values: &Values) -> Option<IndexKey> {
        if self.is_key_order() {
            return None;
        }

        sort_key(&self.parts, values)
    }

    /// Directional comparison of two ranked records.
    pub(crate) fn compare(
        &self,
        a: (Option<&IndexKey>, &Key),
        b: (Option<&IndexKey>, &Key),
    ) -> Ordering {
        self.direction.apply(a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
    }

    /// Index of the first entry at or after (`include_start`) or strictly
    /// after the start position, in a sequence sorted by `compare`.
    pub(crate) fn start_index<T>(
        &self,
        sorted: &[T],
        position: impl Fn(&T) -> (Option<&IndexKey>, &Key),
        start: (Option<&IndexKey>, &Key),
        include_start: bool,
    ) -> usize {
        sorted.partition_point(|item| {
            let ordering = self.compare(position(item), start);
            if include_start {
                ordering == Ordering::Less
            } else {
                ordering != Ordering::Greater
            }
        })
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_key_order() {
            f.write_str("key")?;
        }
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        if self.direction.is_desc() {
            f.write_str(" desc")?;
        }

        Ok(())
    }
}
