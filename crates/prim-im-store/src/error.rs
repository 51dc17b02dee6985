//! Error types for the store module.

use prim_im_core::CodecError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// CBOR encoding or decoding of a stored value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored frame no longer decodes.
    #[error("stored frame is corrupt: {0}")]
    Codec(#[from] CodecError),

    /// Invalid data in storage or handed to the store.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding in-process state was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Where each variant is raised. No wildcard, so a new variant has to
    /// name its source here.
    fn origin(err: &StoreError) -> &'static str {
        match err {
            StoreError::Database(_) => "sqlite",
            StoreError::Serialization(_) => "kv codec",
            StoreError::Codec(_) => "stored frame",
            StoreError::InvalidData(_) => "save_message",
            StoreError::Migration(_) => "migration",
            StoreError::Poisoned(_) => "lock",
        }
    }

    #[test]
    fn test_conversions_and_display() {
        let err: StoreError = CodecError::Truncated { len: 7 }.into();
        assert_eq!(origin(&err), "stored frame");
        assert!(err.to_string().starts_with("stored frame is corrupt: frame truncated"));

        let err: StoreError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(origin(&err), "sqlite");

        let err = StoreError::Poisoned("kv".into());
        assert_eq!(err.to_string(), "lock poisoned: kv");
    }
}
