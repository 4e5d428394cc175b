use crate::reference::PropertyRef;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

///
/// IndexDefinition
/// Secondary index over one or more property references. Part order is
/// significant; at most one part may be a wildcard reference.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexDefinition {
    pub name: String,
    pub parts: Vec<IndexPart>,
}

impl IndexDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parts: Vec::new(),
        }
    }

    #[must_use]
    pub fn part(mut self, reference: impl Into<PropertyRef>) -> Self {
        self.parts.push(IndexPart {
            reference: reference.into(),
            reversed: false,
        });
        self
    }

    #[must_use]
    pub fn reversed_part(mut self, reference: impl Into<PropertyRef>) -> Self {
        self.parts.push(IndexPart {
            reference: reference.into(),
            reversed: true,
        });
        self
    }

    /// Entries are produced per collection element.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.parts.iter().any(|p| p.reference.is_wildcard())
    }

    /// Whether any part reads from the given top-level property.
    #[must_use]
    pub fn reads(&self, property: &str) -> bool {
        self.parts.iter().any(|p| p.reference.root() == property)
    }
}

impl Display for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .parts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        write!(f, "{}({parts})", self.name)
    }
}

///
/// IndexPart
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexPart {
    pub reference: PropertyRef,
    /// Bit-inverted in the index key, so this part sorts descending.
    pub reversed: bool,
}

impl Display for IndexPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reversed {
            write!(f, "{} DESC", self.reference)
        } else {
            write!(f, "{}", self.reference)
        }
    }
}
