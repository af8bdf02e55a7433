//! In-process threshold key servers.
//!
//! Stands in for the external key server network in tests and local
//! development. Each server holds a master secret; a ciphertext carries one
//! Shamir share per server, wrapped under a key derived from that server's
//! master and the escrow identity. Decryption is released only to members
//! of the conversation who present a valid credential, and only while at
//! least `threshold` servers are online.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use chatseal_core::{ConversationId, Identity};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use super::shamir::{self, Share};
use super::{EscrowIdentity, IbeCapability, KeyServerId};
use crate::credential::SessionCredential;
use crate::error::{CredentialError, IbeError};

const SHARE_KEY_CONTEXT: &str = "chatseal-escrow-v1 key server share wrap";
const CIPHERTEXT_VERSION: u8 = 1;

struct KeyServer {
    id: KeyServerId,
    master: Zeroizing<[u8; 32]>,
    online: bool,
}

impl KeyServer {
    fn share_key(&self, identity: &[u8]) -> Zeroizing<[u8; 32]> {
        let mut material = Zeroizing::new(Vec::with_capacity(32 + identity.len()));
        material.extend_from_slice(&self.master[..]);
        material.extend_from_slice(identity);
        Zeroizing::new(blake3::derive_key(SHARE_KEY_CONTEXT, &material))
    }
}

#[derive(Serialize, Deserialize)]
struct WrappedShare {
    server: KeyServerId,
    x: u8,
    nonce: [u8; 12],
    sealed: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct ThresholdCiphertext {
    version: u8,
    threshold: u8,
    identity: Vec<u8>,
    shares: Vec<WrappedShare>,
}

#[derive(Default)]
struct Inner {
    ids: Vec<KeyServerId>,
    servers: RwLock<Vec<KeyServer>>,
    members: RwLock<HashMap<ConversationId, HashSet<Identity>>>,
}

/// A set of key servers sharing one membership registry.
///
/// Cloning yields another handle to the same servers.
#[derive(Clone, Default)]
pub struct MemoryKeyServers {
    inner: Arc<Inner>,
}

impl MemoryKeyServers {
    /// Create `count` online servers with fresh master secrets.
    pub fn new(count: usize) -> Self {
        let servers: Vec<KeyServer> = (0..count)
            .map(|i| {
                let mut master = Zeroizing::new([0u8; 32]);
                OsRng.fill_bytes(&mut master[..]);
                KeyServer {
                    id: KeyServerId(format!("keyserver-{i}")),
                    master,
                    online: true,
                }
            })
            .collect();

        Self {
            inner: Arc::new(Inner {
                ids: servers.iter().map(|s| s.id.clone()).collect(),
                servers: RwLock::new(servers),
                members: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Take a server offline or bring it back.
    pub async fn set_online(&self, index: usize, online: bool) {
        let mut servers = self.inner.servers.write().await;
        if let Some(server) = servers.get_mut(index) {
            server.online = online;
        }
    }

    /// Number of servers currently online.
    pub async fn online_count(&self) -> usize {
        self.inner
            .servers
            .read()
            .await
            .iter()
            .filter(|s| s.online)
            .count()
    }

    /// Admit `identity` to the conversation's access policy.
    pub async fn add_member(&self, conversation: &ConversationId, identity: Identity) {
        self.inner
            .members
            .write()
            .await
            .entry(*conversation)
            .or_default()
            .insert(identity);
    }

    /// Remove `identity` from the conversation's access policy.
    pub async fn remove_member(&self, conversation: &ConversationId, identity: &Identity) {
        if let Some(members) = self.inner.members.write().await.get_mut(conversation) {
            members.remove(identity);
        }
    }

    async fn is_member(&self, conversation: &ConversationId, identity: &Identity) -> bool {
        self.inner
            .members
            .read()
            .await
            .get(conversation)
            .map(|m| m.contains(identity))
            .unwrap_or(false)
    }

    fn check_proof(identity: &EscrowIdentity, proof: &SessionCredential) -> Result<(), IbeError> {
        match proof.verify() {
            Ok(()) => {}
            Err(CredentialError::Expired { .. }) => return Err(IbeError::Expired),
            Err(e) => return Err(IbeError::AccessDenied(e.to_string())),
        }
        if proof.conversation_id != identity.conversation_id {
            return Err(IbeError::AccessDenied(
                "credential is for a different conversation".into(),
            ));
        }
        if proof.namespace != identity.namespace {
            return Err(IbeError::AccessDenied(
                "credential is for a different namespace".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IbeCapability for MemoryKeyServers {
    fn key_servers(&self) -> Vec<KeyServerId> {
        self.inner.ids.clone()
    }

    async fn encrypt(
        &self,
        identity: &EscrowIdentity,
        threshold: u8,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, IbeError> {
        let servers = self.inner.servers.read().await;
        let count = u8::try_from(servers.len()).map_err(|_| IbeError::InvalidThreshold {
            threshold,
            servers: servers.len(),
        })?;
        let shares = shamir::split(plaintext, threshold, count)?;
        let identity_bytes = identity.to_bytes();

        let mut wrapped = Vec::with_capacity(shares.len());
        for (server, share) in servers.iter().zip(shares) {
            let key = server.share_key(&identity_bytes);
            let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
            let mut nonce = [0u8; 12];
            OsRng.fill_bytes(&mut nonce);
            let sealed = cipher
                .encrypt(
                    Nonce::from_slice(&nonce),
                    Payload {
                        msg: share.y.as_slice(),
                        aad: &identity_bytes,
                    },
                )
                .map_err(|e| IbeError::Malformed(e.to_string()))?;
            wrapped.push(WrappedShare {
                server: server.id.clone(),
                x: share.x,
                nonce,
                sealed,
            });
        }

        let ciphertext = ThresholdCiphertext {
            version: CIPHERTEXT_VERSION,
            threshold,
            identity: identity_bytes,
            shares: wrapped,
        };
        let mut out = Vec::new();
        ciborium::into_writer(&ciphertext, &mut out)
            .map_err(|e| IbeError::Malformed(e.to_string()))?;
        Ok(out)
    }

    async fn decrypt(
        &self,
        identity: &EscrowIdentity,
        proof: &SessionCredential,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, IbeError> {
        let parsed: ThresholdCiphertext =
            ciborium::from_reader(ciphertext).map_err(|e| IbeError::Malformed(e.to_string()))?;
        if parsed.version != CIPHERTEXT_VERSION {
            return Err(IbeError::Malformed(format!(
                "unsupported ciphertext version {}",
                parsed.version
            )));
        }
        let identity_bytes = identity.to_bytes();
        if parsed.identity != identity_bytes {
            return Err(IbeError::Malformed(
                "ciphertext is bound to a different identity".into(),
            ));
        }

        Self::check_proof(identity, proof)?;
        if !self.is_member(&identity.conversation_id, &proof.identity).await {
            tracing::debug!(
                conversation = %identity.conversation_id,
                requester = %proof.identity,
                "key servers refused non-member"
            );
            return Err(IbeError::AccessDenied(
                "requester is not a participant of the conversation".into(),
            ));
        }

        let servers = self.inner.servers.read().await;
        let mut collected: Vec<Share> = Vec::with_capacity(parsed.threshold as usize);
        for wrapped in &parsed.shares {
            if collected.len() == parsed.threshold as usize {
                break;
            }
            let Some(server) = servers.iter().find(|s| s.id == wrapped.server) else {
                continue;
            };
            if !server.online {
                continue;
            }
            let key = server.share_key(&identity_bytes);
            let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
            let y = cipher
                .decrypt(
                    Nonce::from_slice(&wrapped.nonce),
                    Payload {
                        msg: &wrapped.sealed,
                        aad: &identity_bytes,
                    },
                )
                .map_err(|_| {
                    IbeError::Malformed(format!("share for {} does not open", wrapped.server))
                })?;
            collected.push(Share {
                x: wrapped.x,
                y: Zeroizing::new(y),
            });
        }

        if collected.len() < parsed.threshold as usize {
            return Err(IbeError::Unavailable(format!(
                "{} of {} key servers reachable, need {}",
                collected.len(),
                parsed.shares.len(),
                parsed.threshold
            )));
        }

        let secret = shamir::combine(&collected)?;
        Ok(secret.to_vec())
    }
}
