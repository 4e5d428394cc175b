//! CBOR boundary for stored rows and content-hash keys.
//!
//! Decoding is always bounded: a stored row larger than the codec's limit
//! is rejected before `serde_cbor` sees it.

use crate::error::InternalError;
use serde::{Serialize, de::DeserializeOwned};
use serde_cbor::{from_slice, to_vec};
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error as ThisError;

///
/// SerializeError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SerializeError {
    #[error("cbor encode failed: {0}")]
    Encode(String),

    #[error("cbor decode failed: {0}")]
    Decode(String),

    #[error("row of {len} bytes exceeds the {max_bytes} byte limit")]
    RowTooLarge { len: usize, max_bytes: usize },
}

impl From<SerializeError> for InternalError {
    fn from(err: SerializeError) -> Self {
        Self::serialize_internal(err.to_string())
    }
}

pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, SerializeError> {
    to_vec(value).map_err(|err| SerializeError::Encode(err.to_string()))
}

/// Decode a row written by [`to_cbor`], refusing payloads over `max_bytes`.
///
/// A panic inside the decoder surfaces as [`SerializeError::Decode`].
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8], max_bytes: usize) -> Result<T, SerializeError> {
    if bytes.len() > max_bytes {
        return Err(SerializeError::RowTooLarge {
            len: bytes.len(),
            max_bytes,
        });
    }

    match catch_unwind(AssertUnwindSafe(|| from_slice(bytes))) {
        Ok(decoded) => decoded.map_err(|err| SerializeError::Decode(err.to_string())),
        Err(_) => Err(SerializeError::Decode("decoder panicked".into())),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, Values};

    #[test]
    fn rows_decode_to_the_values_they_encode() {
        let values = Values::new()
            .with("name", "ada")
            .with("tags", Value::set(["x", "y"]))
            .with("score", 1.5);

        let bytes = to_cbor(&values).unwrap();

        assert_eq!(from_cbor::<Values>(&bytes, 1024).unwrap(), values);
    }

    #[test]
    fn oversized_rows_are_refused_before_decoding() {
        let bytes = to_cbor(&"a long enough string").unwrap();

        assert_eq!(
            from_cbor::<String>(&bytes, 4),
            Err(SerializeError::RowTooLarge {
                len: bytes.len(),
                max_bytes: 4,
            })
        );
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = from_cbor::<Values>(&[0xff, 0x00, 0x13], 1024).unwrap_err();

        assert!(matches!(err, SerializeError::Decode(_)));
    }
}
