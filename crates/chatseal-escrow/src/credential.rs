//! Short-lived session credentials.
//!
//! A credential proves that the holder of an identity asked to read one
//! conversation's secret during a bounded window. Key servers accept it as
//! the proof of an IBE decryption request.
//!
//! The signed message is domain-separated and binds every field, so a
//! credential cannot be replayed for another conversation, namespace, or
//! window.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatseal_core::{now_millis, ConversationId, Identity, Keypair, Signature};

use crate::error::CredentialError;

/// Domain separator prefixed to every credential message.
pub const CREDENTIAL_DOMAIN: &[u8] = b"chatseal-session-credential-v1";

/// Default lifetime of an issued credential.
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(10 * 60);

/// A signed, expiring proof that `identity` may request the secret of
/// `conversation_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub identity: Identity,
    pub conversation_id: ConversationId,
    pub namespace: String,
    /// Issue time in Unix milliseconds.
    pub issued_at: i64,
    /// Expiry in Unix milliseconds. The credential is invalid at and after
    /// this instant.
    pub expires_at: i64,
    pub signature: Signature,
}

impl SessionCredential {
    /// Build the bytes a signer signs for these fields.
    pub fn signing_message(
        identity: &Identity,
        conversation: &ConversationId,
        namespace: &str,
        issued_at: i64,
        expires_at: i64,
    ) -> Vec<u8> {
        let ns = namespace.as_bytes();
        let mut msg = Vec::with_capacity(CREDENTIAL_DOMAIN.len() + 32 + 32 + 4 + ns.len() + 16);
        msg.extend_from_slice(CREDENTIAL_DOMAIN);
        msg.extend_from_slice(identity.as_bytes());
        msg.extend_from_slice(conversation.as_bytes());
        msg.extend_from_slice(&(ns.len() as u32).to_be_bytes());
        msg.extend_from_slice(ns);
        msg.extend_from_slice(&issued_at.to_be_bytes());
        msg.extend_from_slice(&expires_at.to_be_bytes());
        msg
    }

    /// The message this credential's signature covers.
    pub fn message(&self) -> Vec<u8> {
        Self::signing_message(
            &self.identity,
            &self.conversation_id,
            &self.namespace,
            self.issued_at,
            self.expires_at,
        )
    }

    /// Check if expired at the given time.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Milliseconds of validity left at `now`, zero once expired.
    pub fn remaining_at(&self, now: i64) -> i64 {
        (self.expires_at - now).max(0)
    }

    /// Verify at a given time. Expiry is checked before the signature.
    pub fn verify_at(&self, now: i64) -> Result<(), CredentialError> {
        if self.is_expired_at(now) {
            return Err(CredentialError::Expired {
                expires_at: self.expires_at,
                now,
            });
        }
        self.identity
            .verify(&self.message(), &self.signature)
            .map_err(|_| CredentialError::InvalidSignature)
    }

    /// Verify against the current wall clock.
    pub fn verify(&self) -> Result<(), CredentialError> {
        self.verify_at(now_millis())
    }
}

/// Something that can sign a personal message on behalf of an identity.
///
/// In production this is a wallet prompt; it may be slow or declined.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The identity whose key produces the signatures.
    fn identity(&self) -> Identity;

    /// Sign `message` as a personal message.
    async fn sign_personal_message(&self, message: &[u8]) -> Result<Signature, CredentialError>;
}

#[async_trait]
impl Signer for Keypair {
    fn identity(&self) -> Identity {
        Keypair::identity(self)
    }

    async fn sign_personal_message(&self, message: &[u8]) -> Result<Signature, CredentialError> {
        Ok(self.sign(message))
    }
}

#[async_trait]
impl<T: Signer + ?Sized> Signer for Arc<T> {
    fn identity(&self) -> Identity {
        (**self).identity()
    }

    async fn sign_personal_message(&self, message: &[u8]) -> Result<Signature, CredentialError> {
        (**self).sign_personal_message(message).await
    }
}

/// Issues and verifies session credentials for one namespace.
pub struct SessionCredentialIssuer<G> {
    signer: G,
    namespace: String,
}

impl<G: Signer> SessionCredentialIssuer<G> {
    pub fn new(signer: G, namespace: impl Into<String>) -> Self {
        Self {
            signer,
            namespace: namespace.into(),
        }
    }

    /// The identity credentials are issued for.
    pub fn identity(&self) -> Identity {
        self.signer.identity()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Issue a credential valid for `ttl` from now.
    pub async fn issue(
        &self,
        identity: &Identity,
        conversation: &ConversationId,
        ttl: Duration,
    ) -> Result<SessionCredential, CredentialError> {
        self.issue_at(identity, conversation, ttl, now_millis()).await
    }

    /// Issue a credential whose window starts at `issued_at`.
    pub async fn issue_at(
        &self,
        identity: &Identity,
        conversation: &ConversationId,
        ttl: Duration,
        issued_at: i64,
    ) -> Result<SessionCredential, CredentialError> {
        let signer = self.signer.identity();
        if signer != *identity {
            return Err(CredentialError::IdentityMismatch {
                requested: identity.to_hex(),
                signer: signer.to_hex(),
            });
        }

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = issued_at.saturating_add(ttl_ms);
        let message = SessionCredential::signing_message(
            identity,
            conversation,
            &self.namespace,
            issued_at,
            expires_at,
        );
        let signature = self.signer.sign_personal_message(&message).await?;

        tracing::debug!(
            conversation = %conversation,
            expires_at,
            "issued session credential"
        );

        Ok(SessionCredential {
            identity: *identity,
            conversation_id: *conversation,
            namespace: self.namespace.clone(),
            issued_at,
            expires_at,
            signature,
        })
    }

    /// Verify a credential against the current time.
    pub fn verify(&self, credential: &SessionCredential) -> Result<(), CredentialError> {
        credential.verify()
    }
}
