//! # Chatseal Core
//!
//! Pure primitives for chatseal: conversation identifiers, conversation
//! secrets, signing identities and the authenticated message codec.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! computation over byte strings, with randomness drawn from the operating
//! system's CSPRNG.
//!
//! ## Key Types
//!
//! - [`ConversationId`] - 32-byte identifier of a conversation
//! - [`Secret`] - 32-byte symmetric key shared by a conversation's members
//! - [`Identity`] / [`Keypair`] - Ed25519 identities used to sign credentials
//! - [`MessageCodec`] / [`AesGcmCodec`] - AEAD over message payloads
//! - [`MessageEnvelope`] - nonce, ciphertext and tag of one message
//! - [`MessageBlob`] - the JSON payload carried inside an envelope
//!
//! ## Wire format
//!
//! ```text
//! base64( nonce (12 bytes) || ciphertext || tag (16 bytes) )
//! ```

pub mod codec;
pub mod crypto;
pub mod error;
pub mod payload;
pub mod secret;
pub mod types;

pub use codec::{AesGcmCodec, MessageCodec, MessageEnvelope, NONCE_LEN, TAG_LEN};
pub use crypto::{Identity, Keypair, Signature};
pub use error::{CodecError, CoreError};
pub use payload::{iso_timestamp_now, ContentType, MessageBlob};
pub use secret::{Secret, SECRET_LEN};
pub use types::ConversationId;

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
