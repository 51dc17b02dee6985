//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::ops::RangeInclusive;

use prim_im_core::{Account, AccountId, ChannelKey, Msg};
use prim_im_store::MemoryStore;
use prim_im_sync::memory::MemoryHistory;

/// Base timestamp for fixture messages, 2025-01-14T12:00:00Z.
pub const BASE_TS: u64 = 1_736_856_000_000;

/// A test fixture with a local account and memory store.
pub struct TestFixture {
    pub account: Account,
    pub store: MemoryStore,
}

impl TestFixture {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account: Account::new(account_id),
            store: MemoryStore::new(),
        }
    }

    pub fn id(&self) -> AccountId {
        self.account.id
    }

    pub fn channel_with(&self, peer: AccountId) -> ChannelKey {
        self.account.channel_with(peer)
    }

    /// A sequenced text message sent by `peer` to this account.
    ///
    /// The timestamp is derived from `seq`, so later numbers are also later
    /// in time.
    pub fn incoming(&self, peer: AccountId, seq: u64, text: &str) -> Msg {
        sequenced(peer, self.account.id, seq, text)
    }

    /// A pending text message minted by this account at `minted_ts`.
    pub fn outgoing(&self, peer: AccountId, minted_ts: u64, text: &str) -> Msg {
        Msg::text(self.account.id, peer, 0, minted_ts, text)
            .expect("fixture text frame")
    }

    /// The server's acknowledgement of `sent`.
    pub fn ack_for(&self, sent: &Msg, seq: u64, server_ts: u64) -> Msg {
        Msg::ack(
            sent.head.sender,
            sent.head.receiver,
            sent.head.node_id,
            server_ts,
            seq,
            sent.head.timestamp,
        )
        .expect("fixture ack frame")
    }

    /// A history endpoint already holding `seqs` from `peer`.
    pub fn history_with(&self, peer: AccountId, seqs: RangeInclusive<u64>) -> MemoryHistory {
        let history = MemoryHistory::new(self.account.id);
        for seq in seqs {
            history
                .push(&self.incoming(peer, seq, &format!("m{seq}")))
                .expect("fixture history frame");
        }
        history
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Create fixtures for accounts `1..=count`.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (1..=count as AccountId).map(TestFixture::new).collect()
}

fn sequenced(sender: AccountId, receiver: AccountId, seq: u64, text: &str) -> Msg {
    let mut msg = Msg::text(sender, receiver, 0, BASE_TS + seq, text)
        .expect("fixture text frame");
    msg.head.seq_num = seq;
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use prim_im_core::Timeline;
    use prim_im_store::MessageStore;
    use prim_im_sync::{BackfillRequest, HistorySource};

    #[test]
    fn test_fixture_ack_promotes_outgoing() {
        let fixture = TestFixture::new(1);
        let sent = fixture.outgoing(2, BASE_TS, "hi");

        let mut timeline = Timeline::new();
        timeline.insert(sent.clone());

        let ack = fixture.ack_for(&sent, 7, BASE_TS + 30);
        let promoted = timeline
            .promote(
                ack.head.sender,
                ack.head.receiver,
                ack.ack_minted_timestamp().unwrap(),
                ack.head.seq_num,
                ack.head.timestamp,
            )
            .unwrap();
        assert_eq!(promoted.head.seq_num, 7);
    }

    #[tokio::test]
    async fn test_fixture_store_and_history() {
        let fixture = TestFixture::default();
        let channel = fixture.channel_with(2);
        fixture
            .store
            .save_message(channel, &fixture.incoming(2, 3, "x"))
            .await
            .unwrap();
        assert_eq!(fixture.store.latest_seq_num(channel).await.unwrap(), Some(3));

        let history = fixture.history_with(2, 1..=5);
        let frames = history
            .fetch_page(&BackfillRequest::page(2, 1, 50))
            .await
            .unwrap();
        assert_eq!(frames.len(), 5);
    }

    #[test]
    fn test_multi_party() {
        let parties = multi_party_fixtures(3);
        let ids: Vec<AccountId> = parties.iter().map(TestFixture::id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(parties[0].channel_with(2), parties[1].channel_with(1));
    }
}
