//! Module: db::predicate
//! Responsibility: filter trees, their compiled form and live-filter checks.
//! Does not own: query planning or row loading.

mod eval;
mod live;


use crate::{reference::PropertyRef, value::Value};
use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr, Not as NotOp};
use thiserror::Error as ThisError;

// re-exports
pub(crate) use eval::Predicate;
pub(crate) use live::ensure_live;

///
/// Filter
///
/// Schema-agnostic filter tree evaluated against one value bag. Leaves
/// whose reference fans out over a wildcard match when any element
/// satisfies them.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Filter {
    Exists(PropertyRef),
    /// Every pair must hold.
    Equals(Vec<(PropertyRef, Value)>),
    Prefix {
        reference: PropertyRef,
        prefix: String,
    },
    /// Full match against text values.
    RegEx {
        reference: PropertyRef,
        pattern: String,
    },
    /// `from <= value < to`.
    Range {
        reference: PropertyRef,
        from: Value,
        to: Value,
    },
    GreaterThan(PropertyRef, Value),
    GreaterThanEquals(PropertyRef, Value),
    LessThan(PropertyRef, Value),
    LessThanEquals(PropertyRef, Value),
    ValueIn(PropertyRef, Vec<Value>),
    Not(Box<Self>),
    And(Vec<Self>),
    Or(Vec<Self>),
}

impl Filter {
    #[must_use]
    pub fn exists(reference: impl Into<PropertyRef>) -> Self {
        Self::Exists(reference.into())
    }

    #[must_use]
    pub fn equals(reference: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::Equals(vec![(reference.into(), value.into())])
    }

    #[must_use]
    pub fn prefix(reference: impl Into<PropertyRef>, prefix: impl Into<String>) -> Self {
        Self::Prefix {
            reference: reference.into(),
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn regex(reference: impl Into<PropertyRef>, pattern: impl Into<String>) -> Self {
        Self::RegEx {
            reference: reference.into(),
            pattern: pattern.into(),
        }
    }

    #[must_use]
    pub fn range(
        reference: impl Into<PropertyRef>,
        from: impl Into<Value>,
        to: impl Into<Value>,
    ) -> Self {
        Self::Range {
            reference: reference.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    #[must_use]
    pub fn gt(reference: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::GreaterThan(reference.into(), value.into())
    }

    #[must_use]
    pub fn gte(reference: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::GreaterThanEquals(reference.into(), value.into())
    }

    #[must_use]
    pub fn lt(reference: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::LessThan(reference.into(), value.into())
    }

    #[must_use]
    pub fn lte(reference: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::LessThanEquals(reference.into(), value.into())
    }

    #[must_use]
    pub fn value_in(
        reference: impl Into<PropertyRef>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        Self::ValueIn(reference.into(), values.into_iter().map(Into::into).collect())
    }

    /// Stable name of the node kind, used in diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Exists(_) => "exists",
            Self::Equals(_) => "equals",
            Self::Prefix { .. } => "prefix",
            Self::RegEx { .. } => "regex",
            Self::Range { .. } => "range",
            Self::GreaterThan(..) => "greater_than",
            Self::GreaterThanEquals(..) => "greater_than_equals",
            Self::LessThan(..) => "less_than",
            Self::LessThanEquals(..) => "less_than_equals",
            Self::ValueIn(..) => "value_in",
            Self::Not(_) => "not",
            Self::And(_) => "and",
            Self::Or(_) => "or",
        }
    }
}

impl BitAnd for Filter {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match self {
            Self::And(mut children) => {
                children.push(rhs);
                Self::And(children)
            }
            lhs => Self::And(vec![lhs, rhs]),
        }
    }
}

impl BitOr for Filter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        match self {
            Self::Or(mut children) => {
                children.push(rhs);
                Self::Or(children)
            }
            lhs => Self::Or(vec![lhs, rhs]),
        }
    }
}

impl NotOp for Filter {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}

///
/// FilterError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum FilterError {
    #[error("invalid regular expression '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("{kind} filters cannot drive live updates")]
    NotLive { kind: &'static str },
}
