//! In-memory implementation of the MessageStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use prim_im_core::{ChannelKey, Msg};

use crate::error::{Result, StoreError};
use crate::traits::{require_sequenced, MessageStore, SaveResult};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Messages per channel, ordered by seq_num.
    messages: HashMap<ChannelKey, BTreeMap<u64, Msg>>,

    /// Opaque key/value entries.
    kv: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    /// Number of stored messages across all channels.
    pub fn message_count(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.messages.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save_message(&self, channel: ChannelKey, msg: &Msg) -> Result<SaveResult> {
        let seq = require_sequenced(msg)?;
        let mut inner = self.write()?;

        let messages = inner.messages.entry(channel).or_default();
        if messages.contains_key(&seq) {
            return Ok(SaveResult::AlreadyExists);
        }
        messages.insert(seq, msg.clone());
        Ok(SaveResult::Saved)
    }

    async fn get_messages_in_range(
        &self,
        channel: ChannelKey,
        from: u64,
        to: u64,
    ) -> Result<Vec<Msg>> {
        if from > to {
            return Ok(Vec::new());
        }
        let inner = self.read()?;
        Ok(inner
            .messages
            .get(&channel)
            .map(|m| m.range(from..=to).map(|(_, msg)| msg.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_messages_before(
        &self,
        channel: ChannelKey,
        before: u64,
        limit: usize,
    ) -> Result<Vec<Msg>> {
        let inner = self.read()?;
        let Some(messages) = inner.messages.get(&channel) else {
            return Ok(Vec::new());
        };

        let mut out: Vec<Msg> = messages
            .range(..before)
            .rev()
            .take(limit)
            .map(|(_, msg)| msg.clone())
            .collect();
        out.reverse();
        Ok(out)
    }

    async fn latest_seq_num(&self, channel: ChannelKey) -> Result<Option<u64>> {
        let inner = self.read()?;
        Ok(inner
            .messages
            .get(&channel)
            .and_then(|m| m.keys().next_back().copied()))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.read()?;
        Ok(inner.kv.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut inner = self.write()?;
        inner.kv.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.write()?;
        inner.kv.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;

    fn seq_msg(seq: u64) -> Msg {
        let mut msg = Msg::text(2, 1, 0, 1_000 + seq, "hi").unwrap();
        msg.head.seq_num = seq;
        msg
    }

    #[tokio::test]
    async fn test_save_idempotent() {
        let store = MemoryStore::new();
        let channel = ChannelKey::new(1, 2);

        assert_eq!(
            store.save_message(channel, &seq_msg(5)).await.unwrap(),
            SaveResult::Saved
        );
        assert_eq!(
            store.save_message(channel, &seq_msg(5)).await.unwrap(),
            SaveResult::AlreadyExists
        );
        assert_eq!(store.message_count(), 1);
    }

    #[tokio::test]
    async fn test_unsequenced_rejected() {
        let store = MemoryStore::new();
        let pending = Msg::text(1, 2, 0, 1_000, "hi").unwrap();
        let err = store
            .save_message(ChannelKey::new(1, 2), &pending)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_range_and_before() {
        let store = MemoryStore::new();
        let channel = ChannelKey::new(1, 2);
        for seq in 1..=10 {
            store.save_message(channel, &seq_msg(seq)).await.unwrap();
        }

        let range = store.get_messages_in_range(channel, 3, 5).await.unwrap();
        let seqs: Vec<u64> = range.iter().map(|m| m.head.seq_num).collect();
        assert_eq!(seqs, vec![3, 4, 5]);

        let before = store.get_messages_before(channel, 8, 3).await.unwrap();
        let seqs: Vec<u64> = before.iter().map(|m| m.head.seq_num).collect();
        assert_eq!(seqs, vec![5, 6, 7]);

        assert_eq!(store.latest_seq_num(channel).await.unwrap(), Some(10));
        assert_eq!(
            store.latest_seq_num(ChannelKey::new(1, 3)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_kv_cbor() {
        let store = MemoryStore::new();
        store.set_cbor("k", &vec![1u64, 2, 3]).await.unwrap();
        let back: Option<Vec<u64>> = store.get_cbor("k").await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));

        store.delete("k").await.unwrap();
        let gone: Option<Vec<u64>> = store.get_cbor("k").await.unwrap();
        assert_eq!(gone, None);
    }
}
