//! # Chatseal
//!
//! End-to-end secrets for conversations, without a server that ever holds a
//! plaintext key.
//!
//! ## Overview
//!
//! Each conversation has exactly one 32-byte secret. The first participant to
//! open the conversation generates it, escrows it under the conversation's
//! identity with a threshold IBE capability, and publishes the escrow to a
//! shared policy store. Everyone else recovers it from the escrow with a
//! short-lived signed credential. Recovered secrets are cached locally and
//! used to seal message payloads with AES-256-GCM.
//!
//! ## Key Concepts
//!
//! - **ConversationKeyManager**: the only entry point callers need
//! - **SecretStore**: local cache; a hit means no network calls at all
//! - **PolicyStore**: shared slot per conversation with compare-and-publish, so
//!   concurrent creators converge on one secret
//! - **Failure kinds**: [`ErrorKind`] keeps `AccessDenied` (never retried)
//!   apart from `EscrowUnavailable` (retried with bounded backoff)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chatseal::{ConversationKeyManager, ManagerConfig};
//! use chatseal::core::{ConversationId, Keypair};
//! use chatseal::escrow::{MemoryKeyServers, MemoryPolicyStore};
//! use chatseal::store::{SqliteSecretStore, StorageKey};
//!
//! async fn example() {
//!     let keypair = Keypair::generate();
//!     let store = SqliteSecretStore::open("secrets.db", StorageKey::generate()).unwrap();
//!     let manager = ConversationKeyManager::new(
//!         store,
//!         MemoryPolicyStore::new(),
//!         MemoryKeyServers::new(3),
//!         keypair,
//!         ManagerConfig::new("0xchat"),
//!     );
//!
//!     let conversation = ConversationId::from_bytes([7u8; 32]);
//!     let envelope = manager
//!         .encrypt_message(b"hello world", &conversation)
//!         .await
//!         .unwrap();
//!     let plaintext = manager
//!         .decrypt_message(&envelope, &conversation)
//!         .await
//!         .unwrap();
//!     assert_eq!(plaintext, b"hello world");
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `chatseal::core` - ids, secrets, identities and the message codec
//! - `chatseal::store` - the local secret cache
//! - `chatseal::escrow` - credentials, escrow and collaborator interfaces

pub mod config;
pub mod error;
pub mod manager;
mod retry;
pub mod state;
pub mod transport;

// Re-export component crates
pub use chatseal_core as core;
pub use chatseal_escrow as escrow;
pub use chatseal_store as store;

// Re-export main types for convenience
pub use config::{ManagerConfig, RetryPolicy};
pub use error::{ErrorKind, KeyError, Result};
pub use manager::{ConversationKeyManager, LoadedMessage};
pub use state::ResolutionState;
pub use transport::memory::MemoryBlobTransport;
pub use transport::{frame_envelope, unframe_envelope, BlobId, BlobTransport};

// Re-export commonly used core types
pub use chatseal_core::{
    ConversationId, Identity, Keypair, MessageBlob, MessageCodec, MessageEnvelope, Secret,
};
