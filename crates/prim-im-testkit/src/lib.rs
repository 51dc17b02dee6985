//! # Prim IM Testkit
//!
//! Testing utilities for Prim IM.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden frames**: known messages with their exact wire bytes
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Helper structs for setting up test scenarios
//!
//! ## Golden Frames
//!
//! Golden frames pin the header layout so that any other client produces
//! byte-identical output:
//!
//! ```rust
//! use prim_im_testkit::vectors::{all_vectors, msg_from_vector};
//!
//! for vector in all_vectors() {
//!     let bytes = msg_from_vector(&vector).encode().unwrap();
//!     assert_eq!(hex::encode(&bytes), vector.expected_hex);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use prim_im_testkit::generators::{msg_from_params, MsgParams};
//!
//! proptest! {
//!     #[test]
//!     fn frames_roundtrip(params: MsgParams) {
//!         let msg = msg_from_params(&params);
//!         let decoded = Msg::decode(&msg.encode().unwrap()).unwrap();
//!         prop_assert_eq!(decoded, msg);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use prim_im_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new(1);
//! let msg = fixture.incoming(2, 10, "hello");
//! assert_eq!(msg.channel_key(1), fixture.channel_with(2));
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_party_fixtures, TestFixture};
pub use generators::{msg_from_params, MsgParams};
pub use vectors::{all_vectors, msg_from_vector, verify_all_vectors, GoldenVector};
