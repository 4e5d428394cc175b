//! Property references.
//!
//! A reference is a path from the root of a value bag to a property,
//! a nested property, one collection element, or every element of a
//! collection (wildcard).

use crate::value::{Value, Values};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Segment
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Segment {
    /// Named property of a value bag or embedded object.
    Field(String),
    /// Position in a list.
    Index(u32),
    /// Map key, set item, or incrementing-map key (as `Uint`).
    Key(Value),
    /// Any element of a collection.
    Any,
}

///
/// PropertyRef
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PropertyRef {
    segments: Vec<Segment>,
}

impl PropertyRef {
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Field(name.into())],
        }
    }

    /// Parse a dotted path: `name`, `embed.child`, `list.@2`, `tags.*`,
    /// `counters.#3` (incrementing-map key).
    pub fn parse(path: &str) -> Result<Self, ReferenceError> {
        let mut segments = Vec::new();

        for (position, part) in path.split('.').enumerate() {
            let segment = if part == "*" {
                Segment::Any
            } else if let Some(index) = part.strip_prefix('@') {
                Segment::Index(index.parse().map_err(|_| ReferenceError::InvalidPath {
                    path: path.to_string(),
                })?)
            } else if let Some(key) = part.strip_prefix('#') {
                Segment::Key(Value::Uint(key.parse().map_err(|_| {
                    ReferenceError::InvalidPath {
                        path: path.to_string(),
                    }
                })?))
            } else if part.is_empty() {
                return Err(ReferenceError::InvalidPath {
                    path: path.to_string(),
                });
            } else {
                Segment::Field(part.to_string())
            };

            if position == 0 && !matches!(segment, Segment::Field(_)) {
                return Err(ReferenceError::InvalidPath {
                    path: path.to_string(),
                });
            }
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    #[must_use]
    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.segments.push(Segment::Field(name.into()));
        self
    }

    #[must_use]
    pub fn at(mut self, index: u32) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.segments.push(Segment::Key(key.into()));
        self
    }

    #[must_use]
    pub fn any(mut self) -> Self {
        self.segments.push(Segment::Any);
        self
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Name of the top-level property this reference starts at.
    #[must_use]
    pub fn root(&self) -> &str {
        match self.segments.first() {
            Some(Segment::Field(name)) => name,
            _ => "",
        }
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Any))
    }

    /// True for plain top-level property references.
    #[must_use]
    pub const fn is_top_level(&self) -> bool {
        self.segments.len() == 1
    }

    /// True when `self` addresses `other` or something beneath it.
    #[must_use]
    pub fn starts_with(&self, other: &Self) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Split into the parent reference and the final segment.
    #[must_use]
    pub fn split_last(&self) -> Option<(&[Segment], &Segment)> {
        self.segments
            .split_last()
            .map(|(last, parent)| (parent, last))
    }

    ///
    /// RESOLUTION
    ///

    /// Resolve a non-wildcard reference to at most one value.
    #[must_use]
    pub fn get<'a>(&self, values: &'a Values) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let Segment::Field(name) = first else {
            return None;
        };
        let mut current = values.get(name)?;
        for segment in rest {
            current = step(current, segment)?;
        }

        Some(current)
    }

    /// Resolve every value the reference addresses; wildcards fan out.
    #[must_use]
    pub fn resolve<'a>(&self, values: &'a Values) -> Vec<&'a Value> {
        let Some((Segment::Field(name), rest)) = self.segments.split_first() else {
            return Vec::new();
        };
        let Some(root) = values.get(name) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        resolve_into(root, rest, &mut out);
        out
    }

    /// Resolve a reference with exactly one wildcard into
    /// `(element discriminator, value)` pairs.
    #[must_use]
    pub fn resolve_elements<'a>(&self, values: &'a Values) -> Vec<(Value, &'a Value)> {
        let Some(position) = self.segments.iter().position(|s| matches!(s, Segment::Any)) else {
            return self
                .get(values)
                .map(|v| vec![(Value::Uint(0), v)])
                .unwrap_or_default();
        };

        let container = Self {
            segments: self.segments[..position].to_vec(),
        };
        let suffix = &self.segments[position + 1..];
        let Some(elements) = container.get(values).and_then(Value::elements) else {
            return Vec::new();
        };

        elements
            .into_iter()
            .filter_map(|(discriminator, element)| {
                let mut current = element;
                for segment in suffix {
                    current = step(current, segment)?;
                }
                Some((discriminator, current))
            })
            .collect()
    }
}

// One navigation step from a value through a non-wildcard segment.
// Tagged unions are transparent to navigation.
pub(crate) fn step<'a>(value: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Tagged(tagged), _) => step(&tagged.value, segment),
        (Value::Embed(values), Segment::Field(name)) => values.get(name),
        (Value::List(items), Segment::Index(index)) => items.get(*index as usize),
        (Value::Map(entries), Segment::Key(key)) => entries.get(key),
        (Value::Set(items), Segment::Key(key)) => items.get(key),
        (Value::IncMap(map), Segment::Key(Value::Uint(key))) => {
            u32::try_from(*key).ok().and_then(|key| map.get(key))
        }
        _ => None,
    }
}

fn resolve_into<'a>(value: &'a Value, rest: &[Segment], out: &mut Vec<&'a Value>) {
    let Some((segment, tail)) = rest.split_first() else {
        out.push(value);
        return;
    };

    if matches!(segment, Segment::Any) {
        let target = match value {
            Value::Tagged(tagged) => tagged.value.as_ref(),
            other => other,
        };
        if let Some(elements) = target.elements() {
            for (_, element) in elements {
                resolve_into(element, tail, out);
            }
        }
        return;
    }

    if let Some(next) = step(value, segment) {
        resolve_into(next, tail, out);
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                Segment::Field(name) => f.write_str(name)?,
                Segment::Index(index) => write!(f, "@{index}")?,
                Segment::Key(Value::Uint(key)) => write!(f, "#{key}")?,
                Segment::Key(key) => write!(f, "[{key}]")?,
                Segment::Any => f.write_str("*")?,
            }
        }
        Ok(())
    }
}

impl From<&str> for PropertyRef {
    fn from(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|_| Self::field(name))
    }
}

///
/// ReferenceError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ReferenceError {
    #[error("invalid property path '{path}'")]
    InvalidPath { path: String },
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Values {
        Values::new()
            .with("name", "ada")
            .with(
                "address",
                Values::new().with("city", "london").with("zip", "n1"),
            )
            .with("tags", Value::list(["x", "y", "z"]))
            .with(
                "contacts",
                Value::list([
                    Value::Embed(Values::new().with("email", "a@x.io")),
                    Value::Embed(Values::new().with("email", "b@x.io")),
                ]),
            )
            .with("scores", Value::map([("math", 9u64), ("art", 4u64)]))
    }

    #[test]
    fn parse_and_display_round_trip() {
        for path in ["name", "address.city", "tags.@1", "tags.*", "counters.#3"] {
            assert_eq!(PropertyRef::parse(path).unwrap().to_string(), path);
        }
        assert!(PropertyRef::parse("").is_err());
        assert!(PropertyRef::parse("*.x").is_err());
        assert!(PropertyRef::parse("tags.@x").is_err());
    }

    #[test]
    fn get_navigates_nested_values() {
        let values = sample();

        assert_eq!(
            PropertyRef::parse("address.city").unwrap().get(&values),
            Some(&Value::text("london"))
        );
        assert_eq!(
            PropertyRef::field("tags").at(2).get(&values),
            Some(&Value::text("z"))
        );
        assert_eq!(
            PropertyRef::field("scores").key("art").get(&values),
            Some(&Value::Uint(4))
        );
        assert_eq!(PropertyRef::field("tags").at(7).get(&values), None);
    }

    #[test]
    fn wildcard_fans_out_through_embedded_elements() {
        let values = sample();
        let emails = PropertyRef::parse("contacts.*.email").unwrap();

        assert_eq!(
            emails.resolve(&values),
            vec![&Value::text("a@x.io"), &Value::text("b@x.io")]
        );

        let elements = emails.resolve_elements(&values);
        assert_eq!(elements[1].0, Value::Uint(1));
    }

    #[test]
    fn starts_with_checks_path_prefix() {
        let city = PropertyRef::parse("address.city").unwrap();

        assert!(city.starts_with(&PropertyRef::field("address")));
        assert!(!PropertyRef::field("address").starts_with(&city));
        assert_eq!(city.root(), "address");
    }
}
