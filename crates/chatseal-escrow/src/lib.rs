//! # Chatseal Escrow
//!
//! Session credentials and identity-based escrow of conversation secrets.
//!
//! ## Overview
//!
//! A conversation secret never leaves a device in cleartext. Instead it is
//! encrypted under the conversation's identity with a threshold
//! identity-based encryption scheme and published to a shared policy store.
//! Any participant can later recover it by presenting a short-lived, signed
//! session credential to the key servers, which release their shares only if
//! the participant passes the conversation's access policy.
//!
//! ## Key Concepts
//!
//! - **SessionCredential**: a signed, expiring proof binding an identity to one
//!   conversation
//! - **IbeCapability**: the external threshold IBE service (key servers)
//! - **PolicyStore**: the external durable slot holding one escrowed secret per
//!   conversation, written with compare-and-publish
//! - **KeyEscrowService**: escrows and recovers secrets through a capability
//!
//! ## In-memory collaborators
//!
//! [`ibe::memory::MemoryKeyServers`] and [`policy::memory::MemoryPolicyStore`]
//! implement the external interfaces in-process, with real threshold sharing
//! and a real compare-and-swap, for tests and local development.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use chatseal_core::{ConversationId, Keypair, Secret};
//! use chatseal_escrow::{
//!     KeyEscrowService, MemoryKeyServers, ParticipantPolicy, SessionCredentialIssuer,
//! };
//!
//! async fn example() {
//!     let servers = MemoryKeyServers::new(3);
//!     let escrow = KeyEscrowService::new(servers.clone(), "0xchat");
//!     let conversation = ConversationId::from_bytes([1u8; 32]);
//!
//!     let secret = Secret::generate();
//!     let escrowed = escrow
//!         .escrow(&secret, &conversation, 2, ParticipantPolicy::default())
//!         .await
//!         .unwrap();
//!
//!     let keypair = Keypair::generate();
//!     servers.add_member(&conversation, keypair.identity()).await;
//!     let issuer = SessionCredentialIssuer::new(keypair.clone(), "0xchat");
//!     let credential = issuer
//!         .issue(&keypair.identity(), &conversation, Duration::from_secs(600))
//!         .await
//!         .unwrap();
//!
//!     let recovered = escrow.recover(&escrowed, &credential).await.unwrap();
//!     assert_eq!(recovered, secret);
//! }
//! ```

pub mod credential;
pub mod error;
pub mod escrow;
pub mod ibe;
pub mod policy;

pub use credential::{
    SessionCredential, SessionCredentialIssuer, Signer, CREDENTIAL_DOMAIN, DEFAULT_CREDENTIAL_TTL,
};
pub use error::{CredentialError, EscrowError, IbeError, PolicyError, Result};
pub use escrow::{EscrowedSecret, KeyEscrowService, ParticipantPolicy, ESCROW_FORMAT_VERSION};
pub use ibe::memory::MemoryKeyServers;
pub use ibe::{EscrowIdentity, IbeCapability, KeyServerId};
pub use policy::memory::MemoryPolicyStore;
pub use policy::{PolicyStore, PublishOutcome};
