use derive_more::Deref;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use thiserror::Error as ThisError;

///
/// Key
///
/// Opaque, byte-orderable record identifier. All keys of one data model
/// share the same width; ordering is plain byte order.
///

#[derive(Clone, Deref, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Key(Vec<u8>);

impl Key {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 2);
        for b in &self.0 {
            let _ = write!(out, "{b:02x}");
        }
        out
    }

    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        if hex.len() % 2 != 0 || !hex.is_ascii() {
            return Err(KeyError::InvalidHex(hex.to_string()));
        }

        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
            .map_err(|_| KeyError::InvalidHex(hex.to_string()))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.to_hex())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

///
/// KeyError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum KeyError {
    #[error("key part '{property}' is missing")]
    MissingPart { property: String },

    #[error("key part '{property}' has no fixed-width encoding ({kind})")]
    NotFixedWidth {
        property: String,
        kind: &'static str,
    },

    #[error("key has {actual} bytes, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex key: {0}")]
    InvalidHex(String),
}

///
/// TESTS
///
