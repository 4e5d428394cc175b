use crate::{
    db::predicate::{Filter, FilterError},
    reference::PropertyRef,
    value::{Value, Values, compare_order, values_equal},
};
use regex::Regex;
use std::cmp::Ordering;

///
/// Predicate
///
/// Filter compiled for repeated evaluation: patterns are built once,
/// anchored for full matches.
///

#[derive(Clone, Debug)]
pub(crate) enum Predicate {
    True,
    Exists(PropertyRef),
    Equals(Vec<(PropertyRef, Value)>),
    Prefix(PropertyRef, String),
    Matches(PropertyRef, Regex),
    Compare {
        reference: PropertyRef,
        value: Value,
        accept: fn(Ordering) -> bool,
    },
    Range {
        reference: PropertyRef,
        from: Value,
        to: Value,
    },
    In(PropertyRef, Vec<Value>),
    Not(Box<Self>),
    And(Vec<Self>),
    Or(Vec<Self>),
}

impl Predicate {
    pub(crate) fn compile(filter: Option<&Filter>) -> Result<Self, FilterError> {
        filter.map_or(Ok(Self::True), compile_node)
    }

    pub(crate) fn matches(&self, values: &Values) -> bool {
        match self {
            Self::True => true,
            Self::Exists(reference) => !reference.resolve(values).is_empty(),
            Self::Equals(pairs) => pairs.iter().all(|(reference, expected)| {
                reference
                    .resolve(values)
                    .into_iter()
                    .any(|v| values_equal(v, expected))
            }),
            Self::Prefix(reference, prefix) => any_text(reference, values, |s| s.starts_with(prefix.as_str())),
            Self::Matches(reference, regex) => any_text(reference, values, |s| regex.is_match(s)),
            Self::Compare {
                reference,
                value,
                accept,
            } => reference
                .resolve(values)
                .into_iter()
                .any(|v| compare_order(v, value).is_some_and(accept)),
            Self::Range {
                reference,
                from,
                to,
            } => reference.resolve(values).into_iter().any(|v| {
                compare_order(v, from).is_some_and(Ordering::is_ge)
                    && compare_order(v, to).is_some_and(Ordering::is_lt)
            }),
            Self::In(reference, candidates) => reference
                .resolve(values)
                .into_iter()
                .any(|v| candidates.iter().any(|c| values_equal(v, c))),
            Self::Not(inner) => !inner.matches(values),
            Self::And(children) => children.iter().all(|c| c.matches(values)),
            Self::Or(children) => children.iter().any(|c| c.matches(values)),
        }
    }
}

fn compile_node(filter: &Filter) -> Result<Predicate, FilterError> {
    let compare = |reference: &PropertyRef, value: &Value, accept: fn(Ordering) -> bool| {
        Predicate::Compare {
            reference: reference.clone(),
            value: value.clone(),
            accept,
        }
    };

    Ok(match filter {
        Filter::Exists(reference) => Predicate::Exists(reference.clone()),
        Filter::Equals(pairs) => Predicate::Equals(pairs.clone()),
        Filter::Prefix { reference, prefix } => Predicate::Prefix(reference.clone(), prefix.clone()),
        Filter::RegEx { reference, pattern } => {
            let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
                FilterError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                }
            })?;
            Predicate::Matches(reference.clone(), regex)
        }
        Filter::Range {
            reference,
            from,
            to,
        } => Predicate::Range {
            reference: reference.clone(),
            from: from.clone(),
            to: to.clone(),
        },
        Filter::GreaterThan(reference, value) => compare(reference, value, Ordering::is_gt),
        Filter::GreaterThanEquals(reference, value) => compare(reference, value, Ordering::is_ge),
        Filter::LessThan(reference, value) => compare(reference, value, Ordering::is_lt),
        Filter::LessThanEquals(reference, value) => compare(reference, value, Ordering::is_le),
        Filter::ValueIn(reference, values) => Predicate::In(reference.clone(), values.clone()),
        Filter::Not(inner) => Predicate::Not(Box::new(compile_node(inner)?)),
        Filter::And(children) => Predicate::And(compile_all(children)?),
        Filter::Or(children) => Predicate::Or(compile_all(children)?),
    })
}

fn compile_all(children: &[Filter]) -> Result<Vec<Predicate>, FilterError> {
    children.iter().map(compile_node).collect()
}

fn any_text(reference: &PropertyRef, values: &Values, test: impl Fn(&str) -> bool) -> bool {
    reference
        .resolve(values)
        .into_iter()
        .filter_map(Value::as_text)
        .any(test)
}
