//! # Chatseal Store
//!
//! Local cache of conversation secrets. Provides a trait-based interface with
//! SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The key manager reads the cache on every send and receive and writes it once
//! per conversation, after the secret was generated or recovered from escrow.
//! Lookups are synchronous: the cache is local and never suspends.
//!
//! ## Key Types
//!
//! - [`SecretStore`] - the trait every backend implements
//! - [`SqliteSecretStore`] - durable store, secrets sealed at rest
//! - [`MemorySecretStore`] - process-local store for tests
//! - [`SecretEntry`] - one cached secret with its creation time
//! - [`PutResult`] - outcome of an upsert
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chatseal_core::{ConversationId, Secret};
//! use chatseal_store::{SecretStore, SqliteSecretStore, StorageKey};
//!
//! let key = StorageKey::derive(b"device-bound key material");
//! let store = SqliteSecretStore::open("secrets.db", key).unwrap();
//!
//! let conversation = ConversationId::from_bytes([1u8; 32]);
//! store.put(&conversation, &Secret::generate()).unwrap();
//! assert!(store.get(&conversation).unwrap().is_some());
//! ```
//!
//! ## Design Notes
//!
//! - **Immutable entries**: putting the same secret twice returns
//!   `AlreadyExists`; putting a different one fails with `SecretConflict`.
//! - **All-or-nothing writes**: an entry is either fully present or absent,
//!   so a cancelled resolution never leaves a partial row behind.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sealing;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemorySecretStore;
pub use sealing::StorageKey;
pub use sqlite::SqliteSecretStore;
pub use traits::{PutResult, SecretEntry, SecretStore};
