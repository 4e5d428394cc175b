use crate::value::Value;
use std::cmp::Ordering;

///
/// Compare two values for filter semantics.
///
/// Returns `None` when the pair has no defined order (different families,
/// collections). Signed, unsigned and float numbers compare numerically
/// across families.
///
#[must_use]
pub fn compare_order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) | (Value::Timestamp(a), Value::Timestamp(b)) => {
            Some(a.cmp(b))
        }
        (Value::Uint(a), Value::Uint(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Uint(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
        (Value::Uint(a), Value::Int(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
        (Value::Float(a), Value::Float(b)) => Some(a.cmp(b)),
        (Value::Float(_), Value::Int(_) | Value::Uint(_))
        | (Value::Int(_) | Value::Uint(_), Value::Float(_)) => {
            as_f64(left)?.partial_cmp(&as_f64(right)?)
        }
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
        (Value::Tagged(a), Value::Tagged(b)) if a.tag == b.tag => compare_order(&a.value, &b.value),
        _ => None,
    }
}

/// Equality under filter semantics: numerically equal numbers match across
/// families, everything else compares structurally.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (
            Value::Int(_) | Value::Uint(_) | Value::Float(_),
            Value::Int(_) | Value::Uint(_) | Value::Float(_),
        ) => compare_order(left, right) == Some(Ordering::Equal),
        _ => left == right,
    }
}

#[expect(clippy::cast_precision_loss)]
const fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Uint(v) => Some(*v as f64),
        Value::Float(v) => Some(v.0),
        _ => None,
    }
}
