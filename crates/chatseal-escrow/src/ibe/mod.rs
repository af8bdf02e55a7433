//! Threshold identity-based encryption capability.
//!
//! The capability is external: a set of key servers that each hold a master
//! secret. Encryption needs only public parameters; decryption needs
//! `threshold` servers to agree that the requester passes the access policy.

pub mod memory;
pub mod shamir;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chatseal_core::ConversationId;
use serde::{Deserialize, Serialize};

use crate::credential::SessionCredential;
use crate::error::IbeError;

/// Opaque identifier of one key server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyServerId(pub String);

impl fmt::Display for KeyServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity a conversation secret is encrypted under.
///
/// Namespace-prefixed so the same conversation id in two deployments yields
/// unrelated identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscrowIdentity {
    pub namespace: String,
    pub conversation_id: ConversationId,
}

impl EscrowIdentity {
    pub fn new(namespace: impl Into<String>, conversation_id: ConversationId) -> Self {
        Self {
            namespace: namespace.into(),
            conversation_id,
        }
    }

    /// Length-prefixed namespace followed by the conversation id.
    pub fn to_bytes(&self) -> Vec<u8> {
        let ns = self.namespace.as_bytes();
        let mut out = Vec::with_capacity(2 + ns.len() + 32);
        out.extend_from_slice(&(ns.len() as u16).to_be_bytes());
        out.extend_from_slice(ns);
        out.extend_from_slice(self.conversation_id.as_bytes());
        out
    }
}

/// The threshold IBE service.
#[async_trait]
pub trait IbeCapability: Send + Sync {
    /// The key servers ciphertexts are split across.
    fn key_servers(&self) -> Vec<KeyServerId>;

    /// Encrypt `plaintext` to `identity`, recoverable by any `threshold`
    /// of [`key_servers`](Self::key_servers).
    async fn encrypt(
        &self,
        identity: &EscrowIdentity,
        threshold: u8,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, IbeError>;

    /// Ask the key servers to decrypt, presenting `proof` for the policy check.
    async fn decrypt(
        &self,
        identity: &EscrowIdentity,
        proof: &SessionCredential,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, IbeError>;
}

#[async_trait]
impl<T: IbeCapability + ?Sized> IbeCapability for Arc<T> {
    fn key_servers(&self) -> Vec<KeyServerId> {
        (**self).key_servers()
    }

    async fn encrypt(
        &self,
        identity: &EscrowIdentity,
        threshold: u8,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, IbeError> {
        (**self).encrypt(identity, threshold, plaintext).await
    }

    async fn decrypt(
        &self,
        identity: &EscrowIdentity,
        proof: &SessionCredential,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, IbeError> {
        (**self).decrypt(identity, proof, ciphertext).await
    }
}
