use crate::{
    clock::Version,
    model::{DataModel, Definitions, PropertyDefinition, PropertyKind},
    value::{Value, Values},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// ValidationException
/// One violation found while validating a value bag. All violations of a
/// request are collected, never fail-fast.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{reference}: {kind}")]
pub struct ValidationException {
    pub reference: String,
    pub kind: ExceptionKind,
}

impl ValidationException {
    #[must_use]
    pub fn new(reference: impl Into<String>, kind: ExceptionKind) -> Self {
        Self {
            reference: reference.into(),
            kind,
        }
    }
}

///
/// ExceptionKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
pub enum ExceptionKind {
    #[error("value is required")]
    Required,

    #[error("value is final and already set")]
    AlreadySet,

    #[error("value {value} is outside [{min}, {max}]")]
    OutOfRange {
        value: String,
        min: String,
        max: String,
    },

    #[error("size {len} is outside [{min:?}, {max:?}]")]
    Size {
        len: usize,
        min: Option<usize>,
        max: Option<usize>,
    },

    #[error("value does not match pattern '{pattern}'")]
    Pattern { pattern: String },

    #[error("expected {expected}, found {actual}")]
    Type { expected: String, actual: String },

    #[error("property is not declared")]
    UnknownProperty,

    #[error("check failed: expected {expected:?}, found {actual:?}")]
    FailedCheck {
        expected: Option<Value>,
        actual: Option<Value>,
    },

    #[error("record changed concurrently: expected version {expected}, found {actual}")]
    ConcurrentChange { expected: Version, actual: Version },
}

///
/// Validator
/// Recursive value validation against a model, with compiled patterns.
///

pub(crate) struct Validator<'a> {
    definitions: &'a Definitions,
    patterns: &'a BTreeMap<String, Regex>,
    out: Vec<ValidationException>,
}

impl<'a> Validator<'a> {
    pub(crate) const fn new(
        definitions: &'a Definitions,
        patterns: &'a BTreeMap<String, Regex>,
    ) -> Self {
        Self {
            definitions,
            patterns,
            out: Vec::new(),
        }
    }

    pub(crate) fn validate(mut self, model: &DataModel, values: &Values) -> Vec<ValidationException> {
        self.object("", &model.properties, values);
        self.out
    }

    fn object(&mut self, path: &str, properties: &[PropertyDefinition], values: &Values) {
        for property in properties {
            let child = join(path, &property.name);
            match values.get(&property.name) {
                Some(value) => self.value(&child, &property.kind, value),
                None if property.required => {
                    self.push(&child, ExceptionKind::Required);
                }
                None => {}
            }
        }

        for name in values.keys() {
            if !properties.iter().any(|p| &p.name == name) {
                self.push(&join(path, name), ExceptionKind::UnknownProperty);
            }
        }
    }

    fn value(&mut self, path: &str, kind: &PropertyKind, value: &Value) {
        match (kind, value) {
            (PropertyKind::Bool, Value::Bool(_))
            | (PropertyKind::Timestamp, Value::Timestamp(_)) => {}

            (PropertyKind::Int { min, max }, Value::Int(v)) => {
                self.range(path, *v, *min, *max);
            }
            (PropertyKind::Uint { min, max }, Value::Uint(v)) => {
                self.range(path, *v, *min, *max);
            }
            (PropertyKind::Float { min, max }, Value::Float(v)) => {
                let below = min.is_some_and(|m| v.get() < m);
                let above = max.is_some_and(|m| v.get() > m);
                if below || above {
                    self.out_of_range(path, v.get(), *min, *max);
                }
            }

            (
                PropertyKind::Text {
                    min_len,
                    max_len,
                    pattern,
                },
                Value::Text(text),
            ) => {
                self.size(path, text.chars().count(), *min_len, *max_len);
                if let Some(pattern) = pattern {
                    let matched = self
                        .patterns
                        .get(pattern)
                        .is_some_and(|regex| regex.is_match(text));
                    if !matched {
                        self.push(
                            path,
                            ExceptionKind::Pattern {
                                pattern: pattern.clone(),
                            },
                        );
                    }
                }
            }
            (PropertyKind::Blob { max_len }, Value::Blob(bytes)) => {
                self.size(path, bytes.len(), None, *max_len);
            }

            (PropertyKind::List { item, max_len }, Value::List(items)) => {
                self.size(path, items.len(), None, *max_len);
                for (i, element) in items.iter().enumerate() {
                    self.value(&format!("{path}.@{i}"), item, element);
                }
            }
            (PropertyKind::Set { item, max_len }, Value::Set(items)) => {
                self.size(path, items.len(), None, *max_len);
                for element in items {
                    self.value(&format!("{path}[{element}]"), item, element);
                }
            }
            (
                PropertyKind::Map {
                    key,
                    value: value_kind,
                    max_len,
                },
                Value::Map(entries),
            ) => {
                self.size(path, entries.len(), None, *max_len);
                for (k, v) in entries {
                    let child = format!("{path}[{k}]");
                    self.value(&child, key, k);
                    self.value(&child, value_kind, v);
                }
            }
            (
                PropertyKind::IncMap {
                    value: value_kind,
                    max_len,
                },
                Value::IncMap(map),
            ) => {
                self.size(path, map.len(), None, *max_len);
                for (k, v) in map.iter() {
                    self.value(&format!("{path}.#{k}"), value_kind, v);
                }
            }

            (PropertyKind::Embed(name), Value::Embed(values)) => {
                if let Some(definition) = self.definitions.get(name) {
                    self.object(path, &definition.properties, values);
                }
            }

            (PropertyKind::MultiType(arms), Value::Tagged(tagged)) => {
                match arms.iter().find(|(tag, _)| tag == &tagged.tag) {
                    Some((_, arm)) => self.value(path, arm, &tagged.value),
                    None => self.push(
                        path,
                        ExceptionKind::Type {
                            expected: arms
                                .iter()
                                .map(|(tag, _)| tag.as_str())
                                .collect::<Vec<_>>()
                                .join("|"),
                            actual: tagged.tag.clone(),
                        },
                    ),
                }
            }

            (kind, value) => self.push(
                path,
                ExceptionKind::Type {
                    expected: kind.kind_name().to_string(),
                    actual: value.kind_name().to_string(),
                },
            ),
        }
    }

    fn range<T>(&mut self, path: &str, v: T, min: Option<T>, max: Option<T>)
    where
        T: PartialOrd + Copy + ToString,
    {
        let below = min.is_some_and(|m| v < m);
        let above = max.is_some_and(|m| v > m);
        if below || above {
            self.out_of_range(path, v, min, max);
        }
    }

    fn out_of_range<T: ToString>(&mut self, path: &str, v: T, min: Option<T>, max: Option<T>) {
        let bound = |b: Option<T>| b.map_or_else(|| "-".to_string(), |b| b.to_string());
        self.push(
            path,
            ExceptionKind::OutOfRange {
                value: v.to_string(),
                min: bound(min),
                max: bound(max),
            },
        );
    }

    fn size(&mut self, path: &str, len: usize, min: Option<usize>, max: Option<usize>) {
        if min.is_some_and(|m| len < m) || max.is_some_and(|m| len > m) {
            self.push(path, ExceptionKind::Size { len, min, max });
        }
    }

    fn push(&mut self, path: &str, kind: ExceptionKind) {
        self.out.push(ValidationException::new(path, kind));
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}
