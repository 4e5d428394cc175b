use crate::{
    clock::Version,
    db::predicate::FilterError,
    error::InternalError,
    key::Key,
    serialize::SerializeError,
};
use thiserror::Error as ThisError;

///
/// Error
///
/// Facade error. Request errors surface before any event or mutation;
/// internal errors report engine faults. Per-key outcomes are statuses.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl From<SerializeError> for Error {
    fn from(err: SerializeError) -> Self {
        Self::Internal(err.into())
    }
}

impl From<FilterError> for Error {
    fn from(err: FilterError) -> Self {
        Self::Request(err.into())
    }
}

///
/// RequestError
/// Malformed or unsupported request shape.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum RequestError {
    #[error("version-bounded reads need history, which this store does not keep")]
    HistoryDisabled,

    #[error("filter is not usable: {0}")]
    InvalidFilter(#[from] FilterError),

    #[error("order [{order}] is not served by an index; set allow_full_scan")]
    FullScanRequired { order: String },

    #[error("start record {key} has no position in order [{order}]")]
    UnrankedStart { key: Key, order: String },

    #[error("limit {limit} is outside 1..={max}")]
    LimitOutOfRange { limit: u32, max: u32 },

    #[error("{count} keys requested, at most {max} allowed")]
    TooManyKeys { count: usize, max: usize },

    #[error("{operation} needs a {expected} source")]
    SourceMismatch {
        operation: &'static str,
        expected: &'static str,
    },

    #[error("from_version {from} is after to_version {to}")]
    InvertedVersions { from: Version, to: Version },

    #[error("model '{name}' v{version} is not compatible with the current model")]
    IncompatibleModel { name: String, version: u32 },

    #[error("live updates need a running tokio runtime")]
    RuntimeUnavailable,
}
