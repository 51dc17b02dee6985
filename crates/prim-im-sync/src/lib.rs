//! # Prim IM Sync
//!
//! Sequence tracking and history backfill for Prim IM channels.
//!
//! ## Overview
//!
//! Every channel's messages carry a server-assigned sequence number. The
//! [`SyncTracker`] notices when live traffic skips numbers, and at most once
//! per activation turns that gap into a [`BackfillPlan`]. The [`Backfiller`]
//! then walks the plan page by page against a [`HistorySource`] until the
//! source runs dry or sends a completion sentinel.
//!
//! ## Key Properties
//!
//! - **Bounded**: each page is fetched under a timeout with a fixed retry budget
//! - **Monotonic**: `newest_seq_num` only rises; a failed fetch never advances `next_seq_num`
//! - **Resumable**: a reconnect resets `synced`, so the next activation picks up the gap
//!
//! ## Usage
//!
//! ```rust,no_run
//! use prim_im_core::ChannelKey;
//! use prim_im_sync::{memory::MemoryHistory, Backfiller, SyncConfig, SyncTracker};
//!
//! async fn example() {
//!     let channel = ChannelKey::new(1, 2);
//!     let mut tracker = SyncTracker::default();
//!     let backfiller = Backfiller::new(MemoryHistory::new(1), SyncConfig::default());
//!
//!     tracker.touch(channel, Some(0));
//!     tracker.observe(channel, 120);
//!     if let Some(plan) = tracker.maybe_sync(channel) {
//!         let mut cursor = plan.cursor(2);
//!         while let Some(page) = backfiller.next_page(&mut cursor).await.unwrap() {
//!             if let Some(last) = page.last_seq() {
//!                 tracker.advance(channel, last);
//!             }
//!             if page.complete {
//!                 tracker.complete(channel);
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! ## Channel States
//!
//! ```text
//! Unknown ──maybe_sync──> Syncing ──empty page / sentinel──> CaughtUp
//!    ^                                                          |
//!    └──────────────── reconnect (reset_synced) ────────────────┘
//! ```

pub mod backfill;
pub mod error;
pub mod messages;
pub mod tracker;

pub use backfill::{memory, Backfiller, HistorySource, RetryPolicy, SyncConfig};
pub use error::{Result, SyncError};
pub use messages::{
    is_sync_done, BackfillCursor, BackfillPlan, BackfillRequest, Page, CAUGHT_UP,
    DEFAULT_PAGE_SIZE, UNKNOWN_SEQ,
};
pub use tracker::{ChannelSyncState, SyncPhase, SyncTracker};
