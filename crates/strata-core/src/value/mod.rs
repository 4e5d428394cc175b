mod compare;
mod encode;


use derive_more::{Deref, DerefMut};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fmt,
    hash::{Hash, Hasher},
};

// re-exports
pub use compare::{compare_order, values_equal};
pub use encode::EncodeError;
pub(crate) use encode::{encode_fixed, encode_ordered, fixed_width, invert};

///
/// Value
///
/// Dynamically typed property value. Scalars are orderable and indexable;
/// collections and embedded objects are addressable through references.
///
/// Timestamp → milliseconds since the Unix epoch.
/// IncMap    → map with store-assigned ascending `u32` keys.
/// Tagged    → one arm of a tagged union (multi-type property).
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(Float64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(i64),
    List(Vec<Self>),
    Set(BTreeSet<Self>),
    Map(BTreeMap<Self, Self>),
    IncMap(IncMap),
    Embed(Values),
    Tagged(TypedValue),
}

impl Value {
    ///
    /// CONSTRUCTION
    ///

    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn list(values: impl IntoIterator<Item = impl Into<Self>>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn set(values: impl IntoIterator<Item = impl Into<Self>>) -> Self {
        Self::Set(values.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn map(entries: impl IntoIterator<Item = (impl Into<Self>, impl Into<Self>)>) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    #[must_use]
    pub fn tagged(tag: impl Into<String>, value: impl Into<Self>) -> Self {
        Self::Tagged(TypedValue::new(tag, value))
    }

    ///
    /// INSPECTION
    ///

    /// Stable lowercase name of the value family, used in diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::IncMap(_) => "inc_map",
            Self::Embed(_) => "embed",
            Self::Tagged(_) => "tagged",
        }
    }

    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        !matches!(
            self,
            Self::List(_) | Self::Set(_) | Self::Map(_) | Self::IncMap(_) | Self::Embed(_)
        )
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Element count for collections, character count for text, byte
    /// count for blobs.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::Text(s) => Some(s.chars().count()),
            Self::Blob(b) => Some(b.len()),
            Self::List(l) => Some(l.len()),
            Self::Set(s) => Some(s.len()),
            Self::Map(m) => Some(m.len()),
            Self::IncMap(m) => Some(m.len()),
            _ => None,
        }
    }

    /// Enumerate collection elements with their discriminator: list
    /// position, set item, map key or incrementing-map key.
    #[must_use]
    pub fn elements(&self) -> Option<Vec<(Self, &Self)>> {
        match self {
            Self::List(items) => Some(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (Self::Uint(i as u64), v))
                    .collect(),
            ),
            Self::Set(items) => Some(items.iter().map(|v| (v.clone(), v)).collect()),
            Self::Map(entries) => Some(entries.iter().map(|(k, v)| (k.clone(), v)).collect()),
            Self::IncMap(map) => Some(
                map.iter()
                    .map(|(k, v)| (Self::Uint(u64::from(*k)), v))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Uint(u64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(Float64(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Values> for Value {
    fn from(value: Values) -> Self {
        Self::Embed(value)
    }
}

///
/// Float64
/// f64 with a total order (`f64::total_cmp`) so values can key sets and maps.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Float64(pub f64);

impl Float64 {
    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for Float64 {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Float64 {}

impl PartialOrd for Float64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Float64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Float64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

///
/// IncMap
///
/// Map whose keys are assigned by the store in ascending order. `next_key`
/// only ever grows, so keys freed by removal are never handed out again.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct IncMap {
    entries: BTreeMap<u32, Value>,
    next_key: u32,
}

impl IncMap {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_key: 0,
        }
    }

    /// Append a value under the next unused key and return that key.
    pub fn push(&mut self, value: Value) -> u32 {
        let key = self.next_key;
        self.entries.insert(key, value);
        self.next_key = key.saturating_add(1);

        key
    }

    /// Insert at an explicit key, as replayed from history.
    pub fn insert_at(&mut self, key: u32, value: Value) {
        self.entries.insert(key, value);
        self.next_key = self.next_key.max(key.saturating_add(1));
    }

    pub fn remove(&mut self, key: u32) -> Option<Value> {
        self.entries.remove(&key)
    }

    /// Drop every entry; the key counter is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Never hand out a key below `next_key`.
    pub fn reserve_from(&mut self, next_key: u32) {
        self.next_key = self.next_key.max(next_key);
    }

    #[must_use]
    pub fn get(&self, key: u32) -> Option<&Value> {
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, key: u32) -> Option<&mut Value> {
        self.entries.get_mut(&key)
    }

    #[must_use]
    pub const fn next_key(&self) -> u32 {
        self.next_key
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &Value)> {
        self.entries.iter()
    }
}

///
/// TypedValue
/// One arm of a tagged union: the tag names the active type.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct TypedValue {
    pub tag: String,
    pub value: Box<Value>,
}

impl TypedValue {
    #[must_use]
    pub fn new(tag: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            tag: tag.into(),
            value: Box::new(value.into()),
        }
    }
}

///
/// Values
///
/// The value bag of one record (or embedded object): property name to value.
/// Absent properties are simply missing; there is no null.
///

#[derive(
    Clone,
    Debug,
    Default,
    Deref,
    DerefMut,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(transparent)]
pub struct Values(BTreeMap<String, Value>);

impl Values {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl IntoIterator for Values {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<S: Into<String>, V: Into<Value>> FromIterator<(S, V)> for Values {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) | Self::Timestamp(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{}", v.0),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
            Self::Tagged(v) => write!(f, "{}({})", v.tag, v.value),
            other => write!(f, "<{}>", other.kind_name()),
        }
    }
}
