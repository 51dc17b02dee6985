//! # Prim IM Store
//!
//! Local persistence for the Prim IM client. Provides a trait-based interface
//! for message and key/value storage with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`MessageStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`SaveResult`] - Result of saving a message
//!
//! ## Usage
//!
//! ```rust,no_run
//! use prim_im_store::{MessageStore, SqliteStore};
//! use prim_im_core::ChannelKey;
//!
//! async fn example() {
//!     let store = SqliteStore::open("prim.db").unwrap();
//!     let latest = store.latest_seq_num(ChannelKey::new(1, 2)).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Sequenced only**: pending messages live in memory until acknowledged
//! - **Idempotent saves**: a second save at the same `(channel, seq_num)` returns `AlreadyExists`
//! - **Typed KV**: [`StoreExt`] layers CBOR encoding over the opaque key/value calls

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{MessageStore, SaveResult, StoreExt};
