//! The account's conversation list.
//!
//! One summary per peer, newest activity first. Entries are only appended or
//! replaced, never removed.

use serde::{Deserialize, Serialize};

use prim_im_core::{AccountId, Msg, MsgType};
use prim_im_store::{MessageStore, StoreExt};

use crate::error::Result;

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub peer_id: AccountId,
    /// Timestamp of the latest message, in ms.
    pub last_activity: u64,
    pub preview: String,
    pub unread: u32,
    pub last_type: MsgType,
}

impl ConversationSummary {
    fn empty(peer_id: AccountId, last_activity: u64) -> Self {
        Self {
            peer_id,
            last_activity,
            preview: String::new(),
            unread: 0,
            last_type: MsgType::NA,
        }
    }
}

/// Short text shown for a message in the conversation list.
pub fn preview_of(msg: &Msg) -> String {
    match msg.head.typ {
        MsgType::Text | MsgType::Meme => msg
            .payload_text()
            .map(str::to_owned)
            .unwrap_or_else(|_| "[message]".to_string()),
        MsgType::File => "[file]".to_string(),
        MsgType::Image => "[image]".to_string(),
        MsgType::Video => "[video]".to_string(),
        MsgType::Audio => "[audio]".to_string(),
        other => format!("[{:?}]", other).to_lowercase(),
    }
}

/// Conversation summaries for one account.
#[derive(Debug, Clone, Default)]
pub struct ConversationSet {
    entries: Vec<ConversationSummary>,
}

impl ConversationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// KV key the set is persisted under.
    pub fn storage_key(account_id: AccountId) -> String {
        format!("conversations-{}", account_id)
    }

    /// Load the persisted set, or start empty.
    pub async fn load<S: MessageStore + ?Sized>(store: &S, account_id: AccountId) -> Result<Self> {
        let entries: Option<Vec<ConversationSummary>> =
            store.get_cbor(&Self::storage_key(account_id)).await?;
        let mut set = Self {
            entries: entries.unwrap_or_default(),
        };
        set.sort();
        Ok(set)
    }

    pub async fn save<S: MessageStore + ?Sized>(&self, store: &S, account_id: AccountId) -> Result<()> {
        store
            .set_cbor(&Self::storage_key(account_id), &self.entries)
            .await?;
        Ok(())
    }

    /// Account for a message in the conversation with `peer`.
    ///
    /// Only a message newer than the current summary replaces the preview.
    /// It counts as unread when `peer` sent it and `counts_unread` is set.
    pub fn record_message(&mut self, peer: AccountId, msg: &Msg, counts_unread: bool) {
        let timestamp = msg.head.timestamp;
        let from_peer = msg.head.sender == peer;
        let bump = u32::from(from_peer && counts_unread);

        match self.position(peer) {
            Some(index) => {
                let entry = &mut self.entries[index];
                if timestamp < entry.last_activity {
                    return;
                }
                entry.last_activity = timestamp;
                entry.preview = preview_of(msg);
                entry.last_type = msg.head.typ;
                entry.unread += bump;
            }
            None => self.entries.push(ConversationSummary {
                peer_id: peer,
                last_activity: timestamp,
                preview: preview_of(msg),
                unread: bump,
                last_type: msg.head.typ,
            }),
        }
        self.sort();
    }

    /// An acknowledgement moves the conversation to the server's timestamp.
    pub fn record_ack(&mut self, peer: AccountId, server_ts: u64) {
        if let Some(index) = self.position(peer) {
            let entry = &mut self.entries[index];
            entry.last_activity = entry.last_activity.max(server_ts);
            self.sort();
        }
    }

    /// Merge a roster snapshot of `(peer, last_activity)` pairs.
    pub fn merge_roster(&mut self, roster: &[(AccountId, u64)]) {
        for &(peer, last_activity) in roster {
            match self.position(peer) {
                Some(index) => {
                    let entry = &mut self.entries[index];
                    entry.last_activity = entry.last_activity.max(last_activity);
                }
                None => self
                    .entries
                    .push(ConversationSummary::empty(peer, last_activity)),
            }
        }
        self.sort();
    }

    pub fn mark_read(&mut self, peer: AccountId) {
        if let Some(index) = self.position(peer) {
            self.entries[index].unread = 0;
        }
    }

    pub fn get(&self, peer: AccountId) -> Option<&ConversationSummary> {
        self.entries.iter().find(|e| e.peer_id == peer)
    }

    /// Summaries, newest activity first.
    pub fn iter(&self) -> impl Iterator<Item = &ConversationSummary> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, peer: AccountId) -> Option<usize> {
        self.entries.iter().position(|e| e.peer_id == peer)
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prim_im_store::MemoryStore;

    #[test]
    fn test_unread_counts_peer_messages_only() {
        let mut set = ConversationSet::new();
        set.record_message(2, &Msg::text(2, 1, 0, 100, "hi").unwrap(), true);
        set.record_message(2, &Msg::text(1, 2, 0, 200, "yo").unwrap(), true);
        set.record_message(2, &Msg::text(2, 1, 0, 300, "sup").unwrap(), true);

        let entry = set.get(2).unwrap();
        assert_eq!(entry.unread, 2);
        assert_eq!(entry.preview, "sup");
        assert_eq!(entry.last_activity, 300);

        set.mark_read(2);
        assert_eq!(set.get(2).unwrap().unread, 0);
    }

    #[test]
    fn test_stale_message_keeps_preview() {
        let mut set = ConversationSet::new();
        set.record_message(2, &Msg::text(2, 1, 0, 300, "new").unwrap(), true);
        set.record_message(2, &Msg::text(2, 1, 0, 100, "old").unwrap(), true);
        assert_eq!(set.get(2).unwrap().preview, "new");
        assert_eq!(set.get(2).unwrap().unread, 1);
    }

    #[test]
    fn test_sorted_newest_first() {
        let mut set = ConversationSet::new();
        set.merge_roster(&[(2, 100), (3, 300), (4, 200)]);
        let order: Vec<AccountId> = set.iter().map(|e| e.peer_id).collect();
        assert_eq!(order, vec![3, 4, 2]);

        set.record_ack(2, 400);
        assert_eq!(set.iter().next().unwrap().peer_id, 2);
    }

    #[test]
    fn test_media_preview() {
        let msg = Msg::build(
            MsgType::Image,
            2,
            1,
            0,
            0,
            bytes::Bytes::from_static(b"\x89PNG"),
            bytes::Bytes::new(),
        )
        .unwrap();
        assert_eq!(preview_of(&msg), "[image]");
    }

    #[tokio::test]
    async fn test_persist_roundtrip() {
        let store = MemoryStore::new();
        let mut set = ConversationSet::new();
        set.record_message(2, &Msg::text(2, 1, 0, 100, "hi").unwrap(), true);
        set.save(&store, 1).await.unwrap();

        let loaded = ConversationSet::load(&store, 1).await.unwrap();
        assert_eq!(loaded.get(2), set.get(2));
        assert!(ConversationSet::load(&store, 9).await.unwrap().is_empty());
    }
}
