use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Motivos por los que un buffer binario se rechaza. Un mensaje que produce
/// cualquiera de estos errores nunca se persiste.
#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum DecodeError {
    #[error("bad magic: payload is not a result message")]
    BadMagic,
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),
    #[error("truncated payload: needed {needed} bytes at offset {offset}, {remaining} remaining")]
    Truncated { offset: usize, needed: usize, remaining: usize },
    #[error("unknown type tag {tag} at offset {offset}")]
    UnknownTypeTag { tag: u8, offset: usize },
    #[error("invalid boolean byte {0}")]
    InvalidBool(u8),
    #[error("invalid utf-8 string at offset {0}")]
    InvalidUtf8(usize),
    #[error("duplicate key '{0}'")]
    DuplicateKey(String),
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    #[error("submitted_at out of range: {0}")]
    InvalidTimestamp(i64),
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EncodeError {
    #[error("field '{field}' is too large for the wire format ({len} items)")]
    TooLarge { field: &'static str, len: usize },
}
