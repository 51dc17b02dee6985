//! MessageStore trait: the abstract interface for local persistence.
//!
//! The client only ever talks to this trait. Implementations include SQLite
//! (durable) and in-memory (for tests).

use std::future::Future;

use async_trait::async_trait;
use prim_im_core::{ChannelKey, Msg};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

/// Result of saving a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// Message was stored.
    Saved,
    /// A message already occupies this `(channel, seq_num)`; nothing changed.
    AlreadyExists,
}

/// Async interface for message and key/value persistence.
///
/// Only sequenced messages are stored. A message with `seq_num == 0` has no
/// stable position yet and is rejected with [`StoreError::InvalidData`].
#[async_trait]
pub trait MessageStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Message Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a sequenced message under its channel.
    async fn save_message(&self, channel: ChannelKey, msg: &Msg) -> Result<SaveResult>;

    /// Messages with `from <= seq_num <= to`, ascending.
    async fn get_messages_in_range(
        &self,
        channel: ChannelKey,
        from: u64,
        to: u64,
    ) -> Result<Vec<Msg>>;

    /// Up to `limit` messages with `seq_num < before`, newest of them last.
    async fn get_messages_before(
        &self,
        channel: ChannelKey,
        before: u64,
        limit: usize,
    ) -> Result<Vec<Msg>>;

    /// Highest stored sequence number in the channel.
    async fn latest_seq_num(&self, channel: ChannelKey) -> Result<Option<u64>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Key/Value Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Extension trait for typed key/value access.
///
/// Values are CBOR-encoded.
pub trait StoreExt: MessageStore {
    fn get_cbor<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<T>>> + Send;

    fn set_cbor<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<S: MessageStore + ?Sized> StoreExt for S {
    async fn get_cbor<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        let value = ciborium::from_reader(raw.as_slice())
            .map_err(|e| StoreError::Serialization(format!("{key}: {e}")))?;
        Ok(Some(value))
    }

    async fn set_cbor<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(format!("{key}: {e}")))?;
        self.set(key, &buf).await
    }
}

/// Reject messages that have no stable position.
pub(crate) fn require_sequenced(msg: &Msg) -> Result<u64> {
    match msg.position().seq_num() {
        Some(seq) => Ok(seq),
        None => Err(StoreError::InvalidData(format!(
            "cannot store unsequenced message: {msg}"
        ))),
    }
}
