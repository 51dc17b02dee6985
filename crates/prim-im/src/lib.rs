//! # Prim IM
//!
//! Client-side protocol and sync engine for the Prim instant messenger.
//!
//! ## Overview
//!
//! This crate ties the component crates into one session:
//!
//! - **Frames**: a fixed 32-byte header followed by payload and extension
//! - **Channels**: one ordered timeline per account pair or group
//! - **Sync**: gap detection and paginated backfill from the history endpoint
//! - **Conversations**: the per-account list with previews and unread counts
//!
//! ## Key Concepts
//!
//! - **Pending**: a message the server has not sequenced yet, ordered by its
//!   minting timestamp.
//! - **Ack**: the server's answer to a sent message, carrying its sequence
//!   number. Promotes the pending copy in place.
//! - **Backfill**: pages of history requested from the oldest missing
//!   sequence number until an empty page or a completion sentinel.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use prim_im::{Client, ClientConfig};
//! use prim_im::store::SqliteStore;
//! use prim_im::sync::memory::MemoryHistory;
//! use prim_im::transport::memory;
//!
//! async fn example() {
//!     let config = ClientConfig {
//!         account_id: 1,
//!         token: "secret".into(),
//!         ..ClientConfig::default()
//!     };
//!
//!     let store = Arc::new(SqliteStore::open("prim.db").unwrap());
//!     let (transport, _server) = memory::pair();
//!     let history = MemoryHistory::new(1);
//!
//!     let (mut client, mut events) = Client::new(config, transport, store, history);
//!     client.connect().await.unwrap();
//!     client.send_text(2, "hello").await.unwrap();
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!     client.run().await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `prim_im::core` - Frame codec, channel keys and timelines
//! - `prim_im::store` - Storage abstraction and SQLite
//! - `prim_im::sync` - Sync tracking and backfill

pub mod client;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod transport;

// Re-export component crates
pub use prim_im_core as core;
pub use prim_im_store as store;
pub use prim_im_sync as sync;

// Re-export main types for convenience
pub use client::{Client, ClientConfig};
pub use conversation::{preview_of, ConversationSet, ConversationSummary};
pub use dispatch::{AuthState, DispatchConfig, Dispatcher, Routed, SessionEvent, SyncOutcome};
pub use error::{ClientError, Result};
pub use transport::{ConnectMode, Credentials, Transport};

// Re-export commonly used core types
pub use prim_im_core::{Account, AccountId, ChannelKey, InsertOutcome, Msg, MsgType, Timeline};
