use crate::{
    key::{Key, KeyError},
    model::{
        CONTENT_HASH_KEY_LEN, DataModel, KeyDefinition, PropertyKind, SchemaError,
        ValidationException, validate::Validator,
    },
    serialize::{self, SerializeError},
    value::{Values, encode_fixed, invert},
};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, sync::Arc};

///
/// Codec
///
/// Schema collaborator consumed by the store. The store never inspects
/// the model beyond what this trait exposes.
///

pub trait Codec: Send + Sync {
    /// The model this codec encodes for.
    fn model(&self) -> &DataModel;

    fn encode(&self, values: &Values) -> Result<Vec<u8>, SerializeError>;

    fn decode(&self, bytes: &[u8]) -> Result<Values, SerializeError>;

    /// Every violation of the model's rules; empty when valid.
    fn validate(&self, values: &Values) -> Vec<ValidationException>;

    /// Whether records written under this codec remain readable under `model`.
    fn compatible_with(&self, model: &DataModel) -> bool;

    fn key_of(&self, values: &Values) -> Result<Key, KeyError>;

    /// Build the codec for a newer, compatible model.
    fn upgrade(&self, model: DataModel) -> Result<Arc<dyn Codec>, SchemaError>;
}

///
/// ModelCodec
/// CBOR codec driven by a `DataModel`.
///

#[derive(Debug)]
pub struct ModelCodec {
    model: DataModel,
    patterns: BTreeMap<String, Regex>,
    max_bytes: usize,
}

impl ModelCodec {
    /// Default decode limit for one stored record.
    pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

    pub fn new(model: DataModel) -> Result<Self, SchemaError> {
        let mut patterns = BTreeMap::new();
        for property in &model.properties {
            collect_patterns(&property.kind, &mut patterns)?;
        }
        for definition in model.definitions.iter() {
            for property in &definition.properties {
                collect_patterns(&property.kind, &mut patterns)?;
            }
        }

        Ok(Self {
            model,
            patterns,
            max_bytes: Self::MAX_RECORD_BYTES,
        })
    }
}

impl Codec for ModelCodec {
    fn model(&self) -> &DataModel {
        &self.model
    }

    fn encode(&self, values: &Values) -> Result<Vec<u8>, SerializeError> {
        serialize::to_cbor(values)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Values, SerializeError> {
        serialize::from_cbor(bytes, self.max_bytes)
    }

    fn validate(&self, values: &Values) -> Vec<ValidationException> {
        Validator::new(&self.model.definitions, &self.patterns).validate(&self.model, values)
    }

    // Same name, version not lower, no property changes shape, and no
    // property becomes newly required.
    fn compatible_with(&self, model: &DataModel) -> bool {
        if model.name != self.model.name || model.version < self.model.version {
            return false;
        }

        let shapes_kept = self.model.properties.iter().all(|current| {
            model
                .property(&current.name)
                .is_none_or(|next| next.kind.same_shape(&current.kind))
        });
        let no_new_required = model.properties.iter().all(|next| {
            !next.required
                || self
                    .model
                    .property(&next.name)
                    .is_some_and(|current| current.required)
        });

        shapes_kept && no_new_required && model.key == self.model.key
    }

    fn key_of(&self, values: &Values) -> Result<Key, KeyError> {
        match &self.model.key {
            KeyDefinition::Parts(parts) => {
                let mut out = Vec::with_capacity(self.model.key_width());
                for part in parts {
                    let value =
                        values
                            .get(&part.property)
                            .ok_or_else(|| KeyError::MissingPart {
                                property: part.property.clone(),
                            })?;
                    let start = out.len();
                    encode_fixed(value, &mut out).map_err(|_| KeyError::NotFixedWidth {
                        property: part.property.clone(),
                        kind: value.kind_name(),
                    })?;
                    if part.reversed {
                        invert(&mut out[start..]);
                    }
                }

                Ok(Key::new(out))
            }
            KeyDefinition::ContentHash => {
                let bytes = serialize::to_cbor(values).map_err(|_| KeyError::MissingPart {
                    property: "<content>".to_string(),
                })?;
                let digest = Sha256::digest(&bytes);

                Ok(Key::new(&digest[..CONTENT_HASH_KEY_LEN]))
            }
        }
    }

    fn upgrade(&self, model: DataModel) -> Result<Arc<dyn Codec>, SchemaError> {
        Ok(Arc::new(Self::new(model)?))
    }
}

fn collect_patterns(
    kind: &PropertyKind,
    out: &mut BTreeMap<String, Regex>,
) -> Result<(), SchemaError> {
    match kind {
        PropertyKind::Text {
            pattern: Some(pattern),
            ..
        } if !out.contains_key(pattern) => {
            let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|_| {
                SchemaError::InvalidPattern {
                    pattern: pattern.clone(),
                }
            })?;
            out.insert(pattern.clone(), regex);
            Ok(())
        }
        PropertyKind::List { item, .. } | PropertyKind::Set { item, .. } => {
            collect_patterns(item, out)
        }
        PropertyKind::Map { key, value, .. } => {
            collect_patterns(key, out)?;
            collect_patterns(value, out)
        }
        PropertyKind::IncMap { value, .. } => collect_patterns(value, out),
        PropertyKind::MultiType(arms) => arms
            .iter()
            .try_for_each(|(_, arm)| collect_patterns(arm, out)),
        _ => Ok(()),
    }
}

///
/// TESTS
///
