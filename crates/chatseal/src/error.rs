//! Error types for the key manager.

use std::time::Duration;

use chatseal_core::CodecError;
use chatseal_escrow::{CredentialError, EscrowError, PolicyError};
use chatseal_store::StoreError;
use thiserror::Error;

/// The failure kinds callers branch on.
///
/// `AccessDenied` and `EscrowUnavailable` are kept apart on purpose: the
/// first must never be retried as if it might succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Tampered envelope or wrong secret.
    AuthenticationFailure,
    /// Structurally invalid envelope.
    MalformedEnvelope,
    /// The envelope authenticated but its plaintext is not a message blob.
    MalformedPayload,
    /// The AEAD refused to encrypt.
    Encryption,
    /// Escrow record or ciphertext cannot be parsed.
    MalformedEscrow,
    /// The key servers refused the credential.
    AccessDenied,
    /// The session credential lapsed.
    Expired,
    /// Transient network or server failure, including timeouts.
    EscrowUnavailable,
    /// A different secret is already cached for the conversation.
    SecretConflict,
    /// The signer failed or was declined.
    Signing,
    /// Local cache failure.
    Storage,
    /// Blob upload or download failed.
    Transport,
    /// The configured threshold cannot be met.
    InvalidThreshold,
}

/// Errors that can occur during key manager operations.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Message encryption or decryption error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Escrow or recovery error.
    #[error("escrow error: {0}")]
    Escrow(#[from] EscrowError),

    /// Credential issuance error.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Local cache error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// A collaborator call exceeded the configured timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Blob transport error.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<PolicyError> for KeyError {
    fn from(err: PolicyError) -> Self {
        KeyError::Escrow(err.into())
    }
}

impl KeyError {
    /// The kind of failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeyError::Codec(CodecError::AuthenticationFailure) => ErrorKind::AuthenticationFailure,
            KeyError::Codec(CodecError::MalformedEnvelope(_)) => ErrorKind::MalformedEnvelope,
            KeyError::Codec(CodecError::Payload(_)) => ErrorKind::MalformedPayload,
            KeyError::Codec(CodecError::Encryption(_)) => ErrorKind::Encryption,
            KeyError::Escrow(err) => match err {
                EscrowError::AccessDenied(_) => ErrorKind::AccessDenied,
                EscrowError::Expired => ErrorKind::Expired,
                EscrowError::EscrowUnavailable(_) => ErrorKind::EscrowUnavailable,
                EscrowError::MalformedEscrow(_) => ErrorKind::MalformedEscrow,
                EscrowError::InvalidThreshold { .. } => ErrorKind::InvalidThreshold,
            },
            KeyError::Credential(err) => match err {
                CredentialError::Expired { .. } => ErrorKind::Expired,
                CredentialError::InvalidSignature => ErrorKind::AccessDenied,
                CredentialError::IdentityMismatch { .. } | CredentialError::Signing(_) => {
                    ErrorKind::Signing
                }
            },
            KeyError::Store(StoreError::SecretConflict { .. }) => ErrorKind::SecretConflict,
            KeyError::Store(_) => ErrorKind::Storage,
            KeyError::Timeout { .. } => ErrorKind::EscrowUnavailable,
            KeyError::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::EscrowUnavailable
    }
}

/// Result type for key manager operations.
pub type Result<T> = std::result::Result<T, KeyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            KeyError::from(CodecError::AuthenticationFailure).kind(),
            ErrorKind::AuthenticationFailure
        );
        assert_eq!(
            KeyError::from(CodecError::MalformedEnvelope("short".into())).kind(),
            ErrorKind::MalformedEnvelope
        );
        assert_eq!(
            KeyError::from(CodecError::Payload("not json".into())).kind(),
            ErrorKind::MalformedPayload
        );
        assert_eq!(
            KeyError::from(CodecError::Encryption("too long".into())).kind(),
            ErrorKind::Encryption
        );
        assert_eq!(
            KeyError::from(EscrowError::AccessDenied("no".into())).kind(),
            ErrorKind::AccessDenied
        );
        assert_eq!(
            KeyError::from(StoreError::SecretConflict {
                conversation: "0x01".into()
            })
            .kind(),
            ErrorKind::SecretConflict
        );
        assert_eq!(
            KeyError::from(PolicyError::Malformed("x".into())).kind(),
            ErrorKind::MalformedEscrow
        );
    }

    #[test]
    fn test_timeout_is_unavailable_and_retryable() {
        let err = KeyError::Timeout {
            operation: "recover",
            after: Duration::from_secs(1),
        };
        assert_eq!(err.kind(), ErrorKind::EscrowUnavailable);
        assert!(err.is_retryable());
        assert!(KeyError::from(PolicyError::Unavailable("down".into())).is_retryable());
        assert!(!KeyError::from(EscrowError::Expired).is_retryable());
        assert!(!KeyError::from(EscrowError::AccessDenied("no".into())).is_retryable());
    }
}
