//! Errors returned by the storage layer.
//!
//! Each message is already in the form sent to clients (`ERR ...` or
//! `WRONGTYPE ...`), so the dispatcher can reply with `to_string()`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("ERR The ID specified in XADD must be greater than 0-0")]
    IdMustExceedZero,

    #[error("ERR The ID specified in XADD is equal or smaller than the target stream top item")]
    IdNotMonotonic,

    #[error("ERR Invalid stream ID specified as stream command argument")]
    InvalidIdFormat,

    #[error("ERR no such stream '{0}'")]
    NoSuchStream(String),

    #[error("ERR no entries after {after} in stream '{stream}'")]
    NoSuchEntry { stream: String, after: String },

    #[error("ERR invalid expire time in 'set' command")]
    InvalidExpiry,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
}

impl StoreError {
    pub(crate) fn no_such_stream(key: &[u8]) -> Self {
        StoreError::NoSuchStream(String::from_utf8_lossy(key).into_owned())
    }
}
