//! # Chatseal Testkit
//!
//! Testing utilities for chatseal.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a shared deployment ([`TestWorld`]) and per-process devices
//! - **Faults**: collaborator wrappers that count calls, add latency, fail as
//!   unavailable or deny access
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use chatseal_testkit::{conversation, TestWorld};
//!
//! async fn example() {
//!     let world = TestWorld::new();
//!     let chat = conversation(1);
//!     let alice = world.member(&chat).await;
//!
//!     alice.ibe_faults.fail_next(2);
//!     let secret = alice.manager.resolve_conversation_key(&chat).await.unwrap();
//!     assert_eq!(alice.ibe_faults.calls(), 3);
//! #   drop(secret);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use chatseal_testkit::generators::{plaintext, secret};
//!
//! proptest! {
//!     #[test]
//!     fn roundtrip(p in plaintext(256), s in secret()) {
//!         // ...
//!     }
//! }
//! ```

pub mod faults;
pub mod fixtures;
pub mod generators;

pub use faults::{CountingSigner, DecliningSigner, Faults, Faulty};
pub use fixtures::{conversation, init_tracing, DeviceManager, TestDevice, TestWorld, TEST_NAMESPACE};
