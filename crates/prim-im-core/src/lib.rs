//! # Prim IM Core
//!
//! Pure primitives for the Prim IM client: the wire frame, conversation keys
//! and the ordered per-channel timeline.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Head`] - The 32-byte bit-packed frame header
//! - [`Msg`] - A frame: header, payload and extension
//! - [`MsgType`] - Discriminator for payload interpretation
//! - [`ChannelKey`] - Order-independent key for a two-party conversation
//! - [`Timeline`] - Ascending, duplicate-free message list for one channel
//!
//! ## Wire Format
//!
//! A frame is `[header:32][payload][extension]`. See the [`header`] module
//! for the bit layout. Encoding rejects any field wider than its slot.

pub mod channel;
pub mod error;
pub mod frame;
pub mod header;
pub mod timeline;
pub mod types;

pub use channel::{Account, ChannelKey};
pub use error::{CodecError, Result};
pub use frame::{now_millis, Msg};
pub use header::{Head, HEAD_LEN, MAX_EXTENSION_LEN, MAX_PAYLOAD_LEN, MAX_SEQ_NUM};
pub use timeline::{InsertOutcome, Timeline};
pub use types::{is_group, AccountId, MsgType, Position, GROUP_ID_THRESHOLD};
