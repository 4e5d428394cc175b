use serde::{Deserialize, Serialize};

///
/// PropertyDefinition
/// Runtime metadata for one property of a data model or embedded object.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PropertyDefinition {
    pub name: String,
    pub kind: PropertyKind,
    pub required: bool,
    /// Once set, the value can never change.
    pub is_final: bool,
    /// Held by at most one live record at a time.
    pub unique: bool,
}

impl PropertyDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            is_final: false,
            unique: false,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn set_once(mut self) -> Self {
        self.is_final = true;
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

///
/// PropertyKind
///
/// Type shape of a property, aligned with `Value` variants. Scalar kinds
/// carry their validation constraints; collection kinds carry their
/// element kinds and an optional size bound.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum PropertyKind {
    // Scalars
    Bool,
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    Uint {
        min: Option<u64>,
        max: Option<u64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    Text {
        min_len: Option<usize>,
        max_len: Option<usize>,
        pattern: Option<String>,
    },
    Blob {
        max_len: Option<usize>,
    },
    Timestamp,

    // Collections
    List {
        item: Box<Self>,
        max_len: Option<usize>,
    },
    Set {
        item: Box<Self>,
        max_len: Option<usize>,
    },
    Map {
        key: Box<Self>,
        value: Box<Self>,
        max_len: Option<usize>,
    },
    IncMap {
        value: Box<Self>,
        max_len: Option<usize>,
    },

    /// Embedded object, by definition name.
    Embed(String),

    /// Tagged union: one `(tag, kind)` arm is active at a time.
    MultiType(Vec<(String, Self)>),
}

impl PropertyKind {
    ///
    /// CONSTRUCTION
    ///

    #[must_use]
    pub const fn int() -> Self {
        Self::Int {
            min: None,
            max: None,
        }
    }

    #[must_use]
    pub const fn uint() -> Self {
        Self::Uint {
            min: None,
            max: None,
        }
    }

    #[must_use]
    pub const fn float() -> Self {
        Self::Float {
            min: None,
            max: None,
        }
    }

    #[must_use]
    pub const fn text() -> Self {
        Self::Text {
            min_len: None,
            max_len: None,
            pattern: None,
        }
    }

    #[must_use]
    pub const fn blob() -> Self {
        Self::Blob { max_len: None }
    }

    #[must_use]
    pub fn list(item: Self) -> Self {
        Self::List {
            item: Box::new(item),
            max_len: None,
        }
    }

    #[must_use]
    pub fn set(item: Self) -> Self {
        Self::Set {
            item: Box::new(item),
            max_len: None,
        }
    }

    #[must_use]
    pub fn map(key: Self, value: Self) -> Self {
        Self::Map {
            key: Box::new(key),
            value: Box::new(value),
            max_len: None,
        }
    }

    #[must_use]
    pub fn inc_map(value: Self) -> Self {
        Self::IncMap {
            value: Box::new(value),
            max_len: None,
        }
    }

    #[must_use]
    pub fn embed(name: impl Into<String>) -> Self {
        Self::Embed(name.into())
    }

    ///
    /// INSPECTION
    ///

    /// Stable lowercase family name, matching `Value::kind_name`.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int { .. } => "int",
            Self::Uint { .. } => "uint",
            Self::Float { .. } => "float",
            Self::Text { .. } => "text",
            Self::Blob { .. } => "blob",
            Self::Timestamp => "timestamp",
            Self::List { .. } => "list",
            Self::Set { .. } => "set",
            Self::Map { .. } => "map",
            Self::IncMap { .. } => "inc_map",
            Self::Embed(_) => "embed",
            Self::MultiType(_) => "tagged",
        }
    }

    /// Scalars and tagged unions have an ordered byte encoding.
    #[must_use]
    pub const fn is_orderable(&self) -> bool {
        !matches!(
            self,
            Self::List { .. }
                | Self::Set { .. }
                | Self::Map { .. }
                | Self::IncMap { .. }
                | Self::Embed(_)
        )
    }

    /// Element kind addressed by a collection segment.
    #[must_use]
    pub fn element(&self) -> Option<&Self> {
        match self {
            Self::List { item, .. } | Self::Set { item, .. } => Some(item),
            Self::Map { value, .. } | Self::IncMap { value, .. } => Some(value),
            _ => None,
        }
    }

    /// True when both kinds have the same shape, ignoring constraints.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List { item: a, .. }, Self::List { item: b, .. })
            | (Self::Set { item: a, .. }, Self::Set { item: b, .. })
            | (Self::IncMap { value: a, .. }, Self::IncMap { value: b, .. }) => a.same_shape(b),
            (
                Self::Map {
                    key: ka, value: va, ..
                },
                Self::Map {
                    key: kb, value: vb, ..
                },
            ) => ka.same_shape(kb) && va.same_shape(vb),
            (Self::Embed(a), Self::Embed(b)) => a == b,
            (Self::MultiType(a), Self::MultiType(b)) => {
                // arms may be added, never changed
                a.iter().all(|(tag, kind)| {
                    b.iter()
                        .any(|(other_tag, other)| tag == other_tag && kind.same_shape(other))
                })
            }
            _ => self.kind_name() == other.kind_name(),
        }
    }
}
