//! Error types for chatseal core.

use thiserror::Error;

/// Errors from identifiers, keys and signatures.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid secret: {0}")]
    InvalidSecret(String),

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,
}

/// Errors from the message codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Tag verification failed: the envelope was altered or the wrong
    /// secret was used.
    #[error("authentication failure")]
    AuthenticationFailure,

    /// The transport form could not be parsed into an envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The AEAD refused to encrypt (oversized input).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// The decrypted payload is not a valid message blob.
    #[error("invalid payload: {0}")]
    Payload(String),
}
