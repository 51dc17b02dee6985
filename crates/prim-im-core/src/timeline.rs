//! Per-channel ordered message list.
//!
//! Messages arrive from three directions: the local cache, the live stream
//! and paginated backfill. `Timeline` merges them into one ascending,
//! duplicate-free list. Sequenced messages order by `seq_num`; as soon as
//! either side of a comparison is still pending, timestamps decide.

use std::cmp::Ordering;

use crate::frame::Msg;
use crate::types::{AccountId, Position};

/// Result of merging one message into a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored at this index.
    Inserted { index: usize },
    /// An entry with the same position already exists; the message was dropped.
    Duplicate,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted { .. })
    }
}

/// Compare two positions the way the merge walks the list.
fn compare(existing: Position, incoming: Position, existing_ts: u64, incoming_ts: u64) -> Ordering {
    match (existing, incoming) {
        (Position::Confirmed { seq_num: a }, Position::Confirmed { seq_num: b }) => a.cmp(&b),
        _ => existing_ts.cmp(&incoming_ts),
    }
}

/// Ascending list of the messages in one channel.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<Msg>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a message, scanning backward from the tail.
    ///
    /// Appending in order is O(1); an out-of-order arrival walks back until
    /// it finds an entry strictly before it.
    pub fn insert(&mut self, msg: Msg) -> InsertOutcome {
        let position = msg.position();
        let timestamp = msg.head.timestamp;

        for index in (0..self.entries.len()).rev() {
            let existing = &self.entries[index];
            match compare(existing.position(), position, existing.head.timestamp, timestamp) {
                Ordering::Less => {
                    self.entries.insert(index + 1, msg);
                    return InsertOutcome::Inserted { index: index + 1 };
                }
                Ordering::Equal => return InsertOutcome::Duplicate,
                Ordering::Greater => continue,
            }
        }

        self.entries.insert(0, msg);
        InsertOutcome::Inserted { index: 0 }
    }

    /// Assign the server's sequence number and timestamp to a pending message.
    ///
    /// The pending entry is found by `(sender, receiver, minted_ts)`. Returns
    /// the promoted message, or `None` if no such entry is pending. If the
    /// live stream already delivered the sequenced copy, the pending entry is
    /// dropped in favour of it.
    pub fn promote(
        &mut self,
        sender: AccountId,
        receiver: AccountId,
        minted_ts: u64,
        seq_num: u64,
        server_ts: u64,
    ) -> Option<Msg> {
        let index = self.entries.iter().position(|m| {
            m.position().is_pending()
                && m.head.sender == sender
                && m.head.receiver == receiver
                && m.head.timestamp == minted_ts
        })?;

        if let Some(existing) = self.get_by_seq(seq_num).cloned() {
            self.entries.remove(index);
            return Some(existing);
        }

        let entry = &mut self.entries[index];
        entry.head.seq_num = seq_num;
        entry.head.timestamp = server_ts;
        let promoted = entry.clone();

        // confirmed by seq first, then pending by mint time
        self.entries.sort_by_key(|m| match m.position() {
            Position::Confirmed { seq_num } => (0u8, seq_num),
            Position::Pending { timestamp } => (1u8, timestamp),
        });
        Some(promoted)
    }

    pub fn get_by_seq(&self, seq_num: u64) -> Option<&Msg> {
        self.entries
            .iter()
            .find(|m| m.position().seq_num() == Some(seq_num))
    }

    /// Highest confirmed sequence number.
    pub fn newest_seq(&self) -> Option<u64> {
        self.confirmed_seqs().max()
    }

    /// Lowest confirmed sequence number.
    pub fn oldest_seq(&self) -> Option<u64> {
        self.confirmed_seqs().min()
    }

    /// Contiguous runs of sequence numbers in `from..=to` that are not loaded,
    /// ascending.
    pub fn missing_ranges(&self, from: u64, to: u64) -> Vec<(u64, u64)> {
        let mut present: Vec<u64> = self
            .confirmed_seqs()
            .filter(|s| (from..=to).contains(s))
            .collect();
        present.sort_unstable();

        let mut gaps = Vec::new();
        let mut expected = from;
        for s in present {
            if s > expected {
                gaps.push((expected, s - 1));
            }
            expected = s.saturating_add(1);
        }
        if expected <= to {
            gaps.push((expected, to));
        }
        gaps
    }

    /// Messages still awaiting acknowledgement.
    pub fn pending(&self) -> impl Iterator<Item = &Msg> {
        self.entries.iter().filter(|m| m.position().is_pending())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Msg> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&Msg> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn confirmed_seqs(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().filter_map(|m| m.position().seq_num())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seq_msg(seq: u64) -> Msg {
        let mut msg = Msg::text(2, 1, 0, 1_000 + seq, &format!("m{seq}")).unwrap();
        msg.head.seq_num = seq;
        msg
    }

    fn seqs(timeline: &Timeline) -> Vec<u64> {
        timeline.iter().map(|m| m.head.seq_num).collect()
    }

    #[test]
    fn test_out_of_order_inserts() {
        let mut timeline = Timeline::new();
        for seq in [3, 5, 7] {
            timeline.insert(seq_msg(seq));
        }
        assert_eq!(timeline.insert(seq_msg(4)), InsertOutcome::Inserted { index: 1 });
        assert_eq!(seqs(&timeline), vec![3, 4, 5, 7]);

        assert_eq!(timeline.insert(seq_msg(1)), InsertOutcome::Inserted { index: 0 });
        assert_eq!(seqs(&timeline), vec![1, 3, 4, 5, 7]);
    }

    #[test]
    fn test_duplicate_seq_discarded() {
        let mut timeline = Timeline::new();
        timeline.insert(seq_msg(10));
        let mut copy = seq_msg(10);
        copy.payload = bytes::Bytes::from_static(b"other");
        copy.head.payload_length = 5;

        assert_eq!(timeline.insert(copy), InsertOutcome::Duplicate);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.iter().next().unwrap().payload_text().unwrap(), "m10");
    }

    #[test]
    fn test_pending_orders_by_timestamp() {
        let mut timeline = Timeline::new();
        timeline.insert(seq_msg(1)); // ts 1001
        let pending = Msg::text(1, 2, 0, 5_000, "hi").unwrap();
        assert_eq!(timeline.insert(pending.clone()), InsertOutcome::Inserted { index: 1 });
        assert_eq!(timeline.insert(pending), InsertOutcome::Duplicate);
        assert_eq!(timeline.pending().count(), 1);
    }

    #[test]
    fn test_promote_pending() {
        let mut timeline = Timeline::new();
        timeline.insert(seq_msg(41));
        timeline.insert(Msg::text(1, 2, 0, 1_000, "hello").unwrap());

        let promoted = timeline.promote(1, 2, 1_000, 42, 2_000).unwrap();
        assert_eq!(promoted.head.seq_num, 42);
        assert_eq!(promoted.head.timestamp, 2_000);
        assert_eq!(seqs(&timeline), vec![41, 42]);
        assert_eq!(timeline.pending().count(), 0);
        assert_eq!(timeline.newest_seq(), Some(42));

        assert!(timeline.promote(1, 2, 1_000, 43, 3_000).is_none());
    }

    #[test]
    fn test_promote_after_live_copy() {
        let mut timeline = Timeline::new();
        timeline.insert(Msg::text(1, 2, 0, 1_000, "hello").unwrap());
        timeline.insert(seq_msg(42));

        assert!(timeline.promote(1, 2, 1_000, 42, 2_000).is_some());
        assert_eq!(seqs(&timeline), vec![42]);
    }

    #[test]
    fn test_seq_bounds_and_gaps() {
        let mut timeline = Timeline::new();
        assert_eq!(timeline.newest_seq(), None);
        for seq in [2, 3, 6, 7, 9] {
            timeline.insert(seq_msg(seq));
        }
        assert_eq!(timeline.oldest_seq(), Some(2));
        assert_eq!(timeline.newest_seq(), Some(9));
        assert_eq!(timeline.missing_ranges(1, 10), vec![(1, 1), (4, 5), (8, 8), (10, 10)]);
        assert_eq!(timeline.missing_ranges(2, 3), vec![]);
        assert_eq!(timeline.missing_ranges(6, 9), vec![(8, 8)]);
        assert_eq!(Timeline::new().missing_ranges(91, 94), vec![(91, 94)]);
    }

    proptest! {
        #[test]
        fn prop_merge_sorted_and_idempotent(input in proptest::collection::vec(1u64..500, 0..120)) {
            let mut timeline = Timeline::new();
            for seq in &input {
                timeline.insert(seq_msg(*seq));
            }

            let mut expected = input.clone();
            expected.sort_unstable();
            expected.dedup();
            prop_assert_eq!(seqs(&timeline), expected.clone());

            // replaying every message changes nothing
            for seq in &input {
                prop_assert_eq!(timeline.insert(seq_msg(*seq)), InsertOutcome::Duplicate);
            }
            prop_assert_eq!(seqs(&timeline), expected);
        }

        #[test]
        fn prop_pending_and_sequenced_interleave(
            (pending, order) in (1usize..80).prop_flat_map(|n| (
                proptest::collection::vec(any::<bool>(), n),
                Just((1..=n as u64).collect::<Vec<_>>()).prop_shuffle(),
            ))
        ) {
            // timestamps rise with sequence order; some entries are still pending
            let mut timeline = Timeline::new();
            for seq in &order {
                let mut msg = seq_msg(*seq);
                if pending[(*seq - 1) as usize] {
                    msg.head.seq_num = 0;
                }
                prop_assert!(timeline.insert(msg).is_inserted());
            }

            let stamps: Vec<u64> = timeline.iter().map(|m| m.head.timestamp).collect();
            prop_assert_eq!(stamps.len(), order.len());
            prop_assert!(stamps.windows(2).all(|w| w[0] < w[1]), "{:?}", stamps);
        }
    }
}
