//! Error types for the escrow module.

use thiserror::Error;

/// Errors from issuing or verifying session credentials.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The credential's expiry is in the past.
    #[error("credential expired at {expires_at} (now {now})")]
    Expired { expires_at: i64, now: i64 },

    /// The signature does not verify against the credential's identity.
    #[error("invalid credential signature")]
    InvalidSignature,

    /// The signer cannot prove control of the requested identity.
    #[error("signer {signer} cannot sign for identity {requested}")]
    IdentityMismatch { requested: String, signer: String },

    /// The external signer failed or the user declined.
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Errors reported by an identity-based encryption capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IbeError {
    /// The key servers' policy check rejected the credential.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The credential lapsed before the key servers saw it.
    #[error("credential expired")]
    Expired,

    /// Not enough key servers reachable.
    #[error("key servers unavailable: {0}")]
    Unavailable(String),

    /// The ciphertext cannot be parsed.
    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    /// The threshold is zero or exceeds the number of key servers.
    #[error("invalid threshold {threshold} for {servers} key servers")]
    InvalidThreshold { threshold: u8, servers: usize },
}

/// Errors reported by the policy store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The store could not be reached.
    #[error("policy store unavailable: {0}")]
    Unavailable(String),

    /// The stored escrow record cannot be parsed.
    #[error("malformed escrow record: {0}")]
    Malformed(String),
}

/// Errors from escrowing or recovering a secret.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// The key servers refused to release the secret.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The session credential has lapsed.
    #[error("session credential expired")]
    Expired,

    /// Transient failure reaching the capability; retryable.
    #[error("escrow unavailable: {0}")]
    EscrowUnavailable(String),

    /// The escrowed ciphertext cannot be parsed or holds no valid secret.
    #[error("malformed escrow: {0}")]
    MalformedEscrow(String),

    /// The requested threshold cannot be met by the key server set.
    #[error("invalid threshold {threshold} for {servers} key servers")]
    InvalidThreshold { threshold: u8, servers: usize },
}

impl EscrowError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EscrowError::EscrowUnavailable(_))
    }
}

impl From<IbeError> for EscrowError {
    fn from(err: IbeError) -> Self {
        match err {
            IbeError::AccessDenied(reason) => EscrowError::AccessDenied(reason),
            IbeError::Expired => EscrowError::Expired,
            IbeError::Unavailable(reason) => EscrowError::EscrowUnavailable(reason),
            IbeError::Malformed(reason) => EscrowError::MalformedEscrow(reason),
            IbeError::InvalidThreshold { threshold, servers } => {
                EscrowError::InvalidThreshold { threshold, servers }
            }
        }
    }
}

impl From<CredentialError> for EscrowError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Expired { .. } => EscrowError::Expired,
            other => EscrowError::AccessDenied(other.to_string()),
        }
    }
}

impl From<PolicyError> for EscrowError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Unavailable(reason) => EscrowError::EscrowUnavailable(reason),
            PolicyError::Malformed(reason) => EscrowError::MalformedEscrow(reason),
        }
    }
}

/// Result type for escrow operations.
pub type Result<T> = std::result::Result<T, EscrowError>;
