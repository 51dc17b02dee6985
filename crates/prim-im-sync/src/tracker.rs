//! Per-channel sequence bookkeeping.
//!
//! Each channel moves through `Unknown → Syncing → CaughtUp`. The tracker
//! decides when a backfill cycle is worth issuing and records its progress;
//! it never performs I/O itself.

use std::collections::HashMap;

use prim_im_core::ChannelKey;
use prim_im_store::MessageStore;

use crate::error::Result;
use crate::messages::{BackfillPlan, CAUGHT_UP, DEFAULT_PAGE_SIZE, UNKNOWN_SEQ};

/// Sync state of one channel, rebuilt every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSyncState {
    /// Smallest sequence number still needed. [`UNKNOWN_SEQ`] before the
    /// first gap is seen, [`CAUGHT_UP`] once backfill has finished.
    pub next_seq_num: u64,
    /// Newest sequence number materialized locally. Set once from the cached
    /// tail, afterwards only raised.
    pub newest_seq_num: Option<u64>,
    /// A backfill cycle was already issued during this activation.
    pub synced: bool,
}

impl Default for ChannelSyncState {
    fn default() -> Self {
        Self {
            next_seq_num: UNKNOWN_SEQ,
            newest_seq_num: None,
            synced: false,
        }
    }
}

impl ChannelSyncState {
    pub fn phase(&self) -> SyncPhase {
        if self.next_seq_num == CAUGHT_UP {
            SyncPhase::CaughtUp
        } else if self.synced {
            SyncPhase::Syncing
        } else {
            SyncPhase::Unknown
        }
    }
}

/// Coarse state of a channel's synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Unknown,
    Syncing,
    CaughtUp,
}

/// Sync state for every channel touched this session.
#[derive(Debug)]
pub struct SyncTracker {
    channels: HashMap<ChannelKey, ChannelSyncState>,
    page_size: u64,
}

impl Default for SyncTracker {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl SyncTracker {
    pub fn new(page_size: u64) -> Self {
        Self {
            channels: HashMap::new(),
            page_size: page_size.max(1),
        }
    }

    /// Create the channel's state if needed and fix `newest_seq_num` from the
    /// locally cached tail. Later calls never overwrite it.
    pub fn touch(&mut self, channel: ChannelKey, cached_tail: Option<u64>) -> &ChannelSyncState {
        let state = self.channels.entry(channel).or_default();
        if state.newest_seq_num.is_none() {
            state.newest_seq_num = Some(cached_tail.unwrap_or(0));
        }
        state
    }

    /// Like [`touch`](Self::touch), reading the tail from the store.
    pub async fn touch_from_store<S: MessageStore + ?Sized>(
        &mut self,
        store: &S,
        channel: ChannelKey,
    ) -> Result<ChannelSyncState> {
        if let Some(state) = self.channels.get(&channel) {
            if state.newest_seq_num.is_some() {
                return Ok(*state);
            }
        }
        let tail = store.latest_seq_num(channel).await?;
        Ok(*self.touch(channel, tail))
    }

    /// Record a sequenced arrival.
    ///
    /// Returns `true` if the arrival skipped past the newest known number,
    /// in which case `next_seq_num` is lowered to the first missing one.
    pub fn observe(&mut self, channel: ChannelKey, seq_num: u64) -> bool {
        self.touch(channel, None);
        let Some(state) = self.channels.get_mut(&channel) else {
            return false;
        };

        let newest = state.newest_seq_num.unwrap_or(0);
        let gap = seq_num > newest.saturating_add(1);
        if gap {
            let first_missing = newest + 1;
            if state.next_seq_num == CAUGHT_UP || state.next_seq_num > first_missing {
                state.next_seq_num = first_missing;
            }
            tracing::debug!(%channel, seq_num, newest, "sequence gap");
        }
        if seq_num > newest {
            state.newest_seq_num = Some(seq_num);
        }
        gap
    }

    /// Issue at most one backfill cycle per activation.
    ///
    /// Marks the channel synced even when there is nothing to fetch.
    pub fn maybe_sync(&mut self, channel: ChannelKey) -> Option<BackfillPlan> {
        self.touch(channel, None);
        let page_size = self.page_size;
        let state = self.channels.get_mut(&channel)?;
        if state.synced {
            return None;
        }
        state.synced = true;

        let next = state.next_seq_num;
        let newest = state.newest_seq_num.unwrap_or(0);
        if next == UNKNOWN_SEQ || next == CAUGHT_UP || next > newest {
            tracing::debug!(%channel, next, newest, "nothing to backfill");
            return None;
        }

        Some(BackfillPlan {
            channel,
            from: next,
            to: newest,
            page_size,
        })
    }

    /// Record that everything up to `last_seq` has been merged.
    pub fn advance(&mut self, channel: ChannelKey, last_seq: u64) {
        let Some(state) = self.channels.get_mut(&channel) else {
            return;
        };
        if state.next_seq_num != CAUGHT_UP {
            let next = last_seq.saturating_add(1);
            if state.next_seq_num == UNKNOWN_SEQ || next > state.next_seq_num {
                state.next_seq_num = next;
            }
        }
        if state.newest_seq_num.map_or(true, |n| last_seq > n) {
            state.newest_seq_num = Some(last_seq);
        }
    }

    /// Mark the channel fully caught up.
    pub fn complete(&mut self, channel: ChannelKey) {
        let state = self.channels.entry(channel).or_default();
        state.next_seq_num = CAUGHT_UP;
        tracing::info!(%channel, newest = ?state.newest_seq_num, "channel caught up");
    }

    /// Allow every channel one more backfill cycle, as after a reconnect.
    pub fn reset_synced(&mut self) {
        for state in self.channels.values_mut() {
            state.synced = false;
        }
    }

    pub fn state(&self, channel: ChannelKey) -> Option<&ChannelSyncState> {
        self.channels.get(&channel)
    }

    pub fn phase(&self, channel: ChannelKey) -> SyncPhase {
        self.channels
            .get(&channel)
            .map_or(SyncPhase::Unknown, ChannelSyncState::phase)
    }

    /// Channels touched this session.
    pub fn channels(&self) -> impl Iterator<Item = ChannelKey> + '_ {
        self.channels.keys().copied()
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }
}
