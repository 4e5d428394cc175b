//! Order-preserving byte encoding for scalar values.
//!
//! Every encoding is prefix-free, so concatenated encodings compare like
//! tuples and a bit-inverted encoding sorts in reverse.

use crate::value::Value;
use thiserror::Error as ThisError;

const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_UINT: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_TEXT: u8 = 0x05;
const TAG_BLOB: u8 = 0x06;
const TAG_TIMESTAMP: u8 = 0x07;
const TAG_TAGGED: u8 = 0x08;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xff;
const TERMINATOR: u8 = 0x00;

///
/// EncodeError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum EncodeError {
    #[error("{kind} values cannot be encoded as ordered bytes")]
    NotOrderable { kind: &'static str },

    #[error("{kind} values have no fixed-width encoding")]
    NotFixedWidth { kind: &'static str },
}

/// Append the type-tagged ordered encoding of a scalar value.
pub(crate) fn encode_ordered(value: &Value, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    match value {
        Value::Bool(v) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*v));
        }
        Value::Int(v) => {
            out.push(TAG_INT);
            out.extend_from_slice(&int_bytes(*v));
        }
        Value::Uint(v) => {
            out.push(TAG_UINT);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Value::Float(v) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&float_bytes(v.0));
        }
        Value::Text(v) => {
            out.push(TAG_TEXT);
            escaped(v.as_bytes(), out);
        }
        Value::Blob(v) => {
            out.push(TAG_BLOB);
            escaped(v, out);
        }
        Value::Timestamp(v) => {
            out.push(TAG_TIMESTAMP);
            out.extend_from_slice(&int_bytes(*v));
        }
        Value::Tagged(v) => {
            out.push(TAG_TAGGED);
            escaped(v.tag.as_bytes(), out);
            encode_ordered(&v.value, out)?;
        }
        other => {
            return Err(EncodeError::NotOrderable {
                kind: other.kind_name(),
            });
        }
    }

    Ok(())
}

/// Append the untagged fixed-width encoding used by key parts.
pub(crate) fn encode_fixed(value: &Value, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    match value {
        Value::Bool(v) => out.push(u8::from(*v)),
        Value::Int(v) | Value::Timestamp(v) => out.extend_from_slice(&int_bytes(*v)),
        Value::Uint(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::Float(v) => out.extend_from_slice(&float_bytes(v.0)),
        other => {
            return Err(EncodeError::NotFixedWidth {
                kind: other.kind_name(),
            });
        }
    }

    Ok(())
}

/// Width in bytes of the fixed encoding for a value family, by name.
pub(crate) fn fixed_width(kind: &str) -> Option<usize> {
    match kind {
        "bool" => Some(1),
        "int" | "uint" | "float" | "timestamp" => Some(8),
        _ => None,
    }
}

/// Bit-invert an encoded span in place, reversing its sort order.
pub(crate) fn invert(bytes: &mut [u8]) {
    for b in bytes {
        *b = !*b;
    }
}

const fn int_bytes(v: i64) -> [u8; 8] {
    ((v as u64) ^ (1 << 63)).to_be_bytes()
}

const fn float_bytes(v: f64) -> [u8; 8] {
    let bits = v.to_bits();
    let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };

    ordered.to_be_bytes()
}

fn escaped(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        if b == ESCAPE {
            out.push(ESCAPE);
            out.push(ESCAPED_ZERO);
        } else {
            out.push(b);
        }
    }
    out.push(ESCAPE);
    out.push(TERMINATOR);
}
