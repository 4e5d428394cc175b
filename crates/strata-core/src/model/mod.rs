//! Runtime data model definitions.
//!
//! A `DataModel` describes the properties of one record type, how its key
//! is derived and which secondary indexes it carries. The store consumes
//! it only through the [`Codec`] collaborator.

mod codec;
mod context;
mod index;
mod property;
mod validate;

use crate::{
    reference::{PropertyRef, Segment},
    value::fixed_width,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error as ThisError;

// re-exports
pub use codec::{Codec, ModelCodec};
pub use context::{Definitions, DefinitionsContext, ObjectDefinition};
pub use index::{IndexDefinition, IndexPart};
pub use property::{PropertyDefinition, PropertyKind};
pub use validate::{ExceptionKind, ValidationException};

/// Width in bytes of content-hash surrogate keys.
pub const CONTENT_HASH_KEY_LEN: usize = 16;

///
/// SchemaError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SchemaError {
    #[error("definition '{name}' declared twice")]
    DuplicateDefinition { name: String },

    #[error("definition '{name}' defined before being declared")]
    UndeclaredDefinition { name: String },

    #[error("definition '{name}' declared but never defined")]
    MissingDefinition { name: String },

    #[error("reference to unknown definition '{name}'")]
    UnresolvedReference { name: String },

    #[error("'{owner}' declares property '{name}' twice")]
    DuplicateProperty { owner: String, name: String },

    #[error("key part '{property}' does not name a property")]
    UnknownKeyPart { property: String },

    #[error("key part '{property}' must be a required fixed-width scalar")]
    InvalidKeyPart { property: String },

    #[error("model has no key parts")]
    EmptyKey,

    #[error("unique property '{property}' must be a scalar")]
    UniqueNotScalar { property: String },

    #[error("index '{name}' declared twice")]
    DuplicateIndex { name: String },

    #[error("index '{index}' has no parts")]
    EmptyIndex { index: String },

    #[error("index '{index}' part '{reference}' does not resolve to an orderable property")]
    InvalidIndexPart { index: String, reference: String },

    #[error("index '{index}' has more than one wildcard part")]
    MultipleWildcards { index: String },

    #[error("invalid text pattern '{pattern}'")]
    InvalidPattern { pattern: String },
}

///
/// KeyDefinition
/// How a record key is derived from its values.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum KeyDefinition {
    /// Fixed-width encodings of the named properties, concatenated.
    Parts(Vec<KeyPart>),
    /// Truncated SHA-256 of the encoded values.
    ContentHash,
}

impl KeyDefinition {
    /// Names of the properties that make up the key.
    #[must_use]
    pub fn properties(&self) -> Vec<&str> {
        match self {
            Self::Parts(parts) => parts.iter().map(|p| p.property.as_str()).collect(),
            Self::ContentHash => Vec::new(),
        }
    }
}

///
/// KeyPart
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct KeyPart {
    pub property: String,
    pub reversed: bool,
}

impl KeyPart {
    #[must_use]
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            reversed: false,
        }
    }

    #[must_use]
    pub fn reversed(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            reversed: true,
        }
    }
}

///
/// DataModel
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DataModel {
    pub name: String,
    pub version: u32,
    pub properties: Vec<PropertyDefinition>,
    pub key: KeyDefinition,
    pub indexes: Vec<IndexDefinition>,
    pub definitions: Definitions,
}

impl DataModel {
    #[must_use]
    pub fn builder(name: impl Into<String>, version: u32) -> DataModelBuilder {
        DataModelBuilder {
            model: Self {
                name: name.into(),
                version,
                properties: Vec::new(),
                key: KeyDefinition::ContentHash,
                indexes: Vec::new(),
                definitions: Definitions::default(),
            },
        }
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Properties that can never change once set: declared final ones and
    /// key parts.
    pub fn final_properties(&self) -> impl Iterator<Item = &str> {
        let key = self.key.properties();
        self.properties
            .iter()
            .filter(move |p| p.is_final || key.contains(&p.name.as_str()))
            .map(|p| p.name.as_str())
    }

    pub fn unique_properties(&self) -> impl Iterator<Item = &str> {
        self.properties
            .iter()
            .filter(|p| p.unique)
            .map(|p| p.name.as_str())
    }

    /// Width in bytes of every key of this model.
    #[must_use]
    pub fn key_width(&self) -> usize {
        match &self.key {
            KeyDefinition::Parts(parts) => parts
                .iter()
                .filter_map(|part| self.property(&part.property))
                .filter_map(|p| fixed_width(p.kind.kind_name()))
                .sum(),
            KeyDefinition::ContentHash => CONTENT_HASH_KEY_LEN,
        }
    }

    /// Kind addressed by a reference, walking embedded definitions and
    /// collection elements. Tagged unions end the walk.
    #[must_use]
    pub fn kind_of(&self, reference: &PropertyRef) -> Option<&PropertyKind> {
        let (first, rest) = reference.segments().split_first()?;
        let Segment::Field(name) = first else {
            return None;
        };
        let mut kind = &self.property(name)?.kind;

        for segment in rest {
            kind = match (kind, segment) {
                (PropertyKind::Embed(object), Segment::Field(field)) => {
                    &self.definitions.get(object)?.get(field)?.kind
                }
                (_, Segment::Index(_) | Segment::Key(_) | Segment::Any) => kind.element()?,
                _ => return None,
            };
        }

        Some(kind)
    }

    fn check(&self) -> Result<(), SchemaError> {
        context::check_unique_names(&self.name, &self.properties)?;

        let known: BTreeSet<String> = self.definitions.iter().map(|d| d.name.clone()).collect();
        for property in &self.properties {
            context::check_references(&property.kind, &known)?;
            if property.unique && !property.kind.is_orderable() {
                return Err(SchemaError::UniqueNotScalar {
                    property: property.name.clone(),
                });
            }
        }

        if let KeyDefinition::Parts(parts) = &self.key {
            if parts.is_empty() {
                return Err(SchemaError::EmptyKey);
            }
            for part in parts {
                let property =
                    self.property(&part.property)
                        .ok_or_else(|| SchemaError::UnknownKeyPart {
                            property: part.property.clone(),
                        })?;
                if !property.required || fixed_width(property.kind.kind_name()).is_none() {
                    return Err(SchemaError::InvalidKeyPart {
                        property: part.property.clone(),
                    });
                }
            }
        }

        let mut names = BTreeSet::new();
        for index in &self.indexes {
            if !names.insert(index.name.as_str()) {
                return Err(SchemaError::DuplicateIndex {
                    name: index.name.clone(),
                });
            }
            if index.parts.is_empty() {
                return Err(SchemaError::EmptyIndex {
                    index: index.name.clone(),
                });
            }
            if index
                .parts
                .iter()
                .filter(|p| p.reference.is_wildcard())
                .count()
                > 1
            {
                return Err(SchemaError::MultipleWildcards {
                    index: index.name.clone(),
                });
            }
            for part in &index.parts {
                let orderable = self
                    .kind_of(&part.reference)
                    .is_some_and(PropertyKind::is_orderable);
                if !orderable {
                    return Err(SchemaError::InvalidIndexPart {
                        index: index.name.clone(),
                        reference: part.reference.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

///
/// DataModelBuilder
///

#[derive(Debug)]
pub struct DataModelBuilder {
    model: DataModel,
}

impl DataModelBuilder {
    #[must_use]
    pub fn property(mut self, property: PropertyDefinition) -> Self {
        self.model.properties.push(property);
        self
    }

    #[must_use]
    pub fn key(mut self, key: KeyDefinition) -> Self {
        self.model.key = key;
        self
    }

    #[must_use]
    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.model.indexes.push(index);
        self
    }

    #[must_use]
    pub fn definitions(mut self, definitions: Definitions) -> Self {
        self.model.definitions = definitions;
        self
    }

    pub fn build(self) -> Result<DataModel, SchemaError> {
        self.model.check()?;

        Ok(self.model)
    }
}

///
/// TESTS
///
