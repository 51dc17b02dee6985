//! Error types for the sync module.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A backfilled frame failed to decode.
    #[error("codec error: {0}")]
    Codec(#[from] prim_im_core::CodecError),

    /// The history source reported a failure.
    #[error("history fetch failed: {0}")]
    Fetch(String),

    /// A single page fetch did not answer in time.
    #[error("history fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Every attempt for one page failed; the channel stays where it was.
    #[error("history fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] prim_im_store::StoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
