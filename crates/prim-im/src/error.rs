//! Error types for the client.

use prim_im_core::CodecError;
use prim_im_store::StoreError;
use prim_im_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A frame failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The transport failed to deliver or receive.
    #[error("transport error: {0}")]
    Transport(String),

    /// The outbound buffer is full; the message was not queued.
    #[error("send buffer full ({capacity} messages queued)")]
    SendBufferFull { capacity: usize },

    /// No connection is established.
    #[error("not connected")]
    NotConnected,

    /// The server rejected the session's credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
