//! Escrow and recovery of conversation secrets.
//!
//! [`KeyEscrowService`] encrypts a conversation secret to the conversation's
//! escrow identity and recovers it for participants holding a valid session
//! credential. The service keeps no state; everything needed for recovery
//! travels in the [`EscrowedSecret`].

use chatseal_core::{ConversationId, Secret};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::credential::SessionCredential;
use crate::error::{EscrowError, Result};
use crate::ibe::{EscrowIdentity, IbeCapability, KeyServerId};

/// Version of the [`EscrowedSecret`] record layout.
pub const ESCROW_FORMAT_VERSION: u8 = 1;

/// The access rule key servers evaluate before releasing shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantPolicy {
    /// Name of the approval check, e.g. the on-chain function the key servers
    /// dry-run against the requester.
    pub approve_target: String,
}

impl ParticipantPolicy {
    pub fn new(approve_target: impl Into<String>) -> Self {
        Self {
            approve_target: approve_target.into(),
        }
    }
}

impl Default for ParticipantPolicy {
    fn default() -> Self {
        Self::new("conversation::seal_approve")
    }
}

/// A conversation secret encrypted to its escrow identity.
///
/// Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowedSecret {
    pub version: u8,
    pub identity: EscrowIdentity,
    pub threshold: u8,
    pub key_servers: Vec<KeyServerId>,
    pub policy: ParticipantPolicy,
    pub created_at: i64,
    /// IBE ciphertext, opaque to this crate.
    pub ciphertext: Vec<u8>,
}

impl EscrowedSecret {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.identity.conversation_id
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| EscrowError::MalformedEscrow(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let escrowed: Self = ciborium::from_reader(bytes)
            .map_err(|e| EscrowError::MalformedEscrow(e.to_string()))?;
        if escrowed.version != ESCROW_FORMAT_VERSION {
            return Err(EscrowError::MalformedEscrow(format!(
                "unsupported escrow version {}",
                escrowed.version
            )));
        }
        Ok(escrowed)
    }
}

/// Escrows and recovers secrets through an IBE capability.
pub struct KeyEscrowService<C> {
    capability: C,
    namespace: String,
}

impl<C: IbeCapability> KeyEscrowService<C> {
    pub fn new(capability: C, namespace: impl Into<String>) -> Self {
        Self {
            capability,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn capability(&self) -> &C {
        &self.capability
    }

    /// Encrypt `secret` so that any `threshold` key servers can release it to
    /// participants allowed by `policy`.
    pub async fn escrow(
        &self,
        secret: &Secret,
        conversation: &ConversationId,
        threshold: u8,
        policy: ParticipantPolicy,
    ) -> Result<EscrowedSecret> {
        let key_servers = self.capability.key_servers();
        if threshold == 0 || threshold as usize > key_servers.len() {
            return Err(EscrowError::InvalidThreshold {
                threshold,
                servers: key_servers.len(),
            });
        }

        let identity = EscrowIdentity::new(self.namespace.clone(), *conversation);
        let ciphertext = self
            .capability
            .encrypt(&identity, threshold, secret.as_bytes())
            .await?;

        tracing::debug!(
            conversation = %conversation,
            threshold,
            servers = key_servers.len(),
            "escrowed conversation secret"
        );

        Ok(EscrowedSecret {
            version: ESCROW_FORMAT_VERSION,
            identity,
            threshold,
            key_servers,
            policy,
            created_at: chatseal_core::now_millis(),
            ciphertext,
        })
    }

    /// Recover the secret with a session credential.
    ///
    /// The credential is checked locally first, expiry before signature, so a
    /// lapsed credential fails with [`EscrowError::Expired`] without a
    /// round trip.
    pub async fn recover(
        &self,
        escrowed: &EscrowedSecret,
        credential: &SessionCredential,
    ) -> Result<Secret> {
        credential.verify()?;

        if credential.conversation_id != escrowed.identity.conversation_id {
            return Err(EscrowError::AccessDenied(
                "credential is for a different conversation".into(),
            ));
        }
        if escrowed.version != ESCROW_FORMAT_VERSION {
            return Err(EscrowError::MalformedEscrow(format!(
                "unsupported escrow version {}",
                escrowed.version
            )));
        }

        let plaintext = Zeroizing::new(
            self.capability
                .decrypt(&escrowed.identity, credential, &escrowed.ciphertext)
                .await?,
        );

        Secret::from_slice(&plaintext).map_err(|e| EscrowError::MalformedEscrow(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{SessionCredentialIssuer, DEFAULT_CREDENTIAL_TTL};
    use crate::ibe::memory::MemoryKeyServers;
    use chatseal_core::{Keypair, Signature};
    use std::time::Duration;

    const NS: &str = "0xchat";

    fn conversation() -> ConversationId {
        ConversationId::from_bytes([8u8; 32])
    }

    async fn setup() -> (MemoryKeyServers, KeyEscrowService<MemoryKeyServers>, Keypair) {
        let servers = MemoryKeyServers::new(3);
        let member = Keypair::generate();
        servers.add_member(&conversation(), member.identity()).await;
        let service = KeyEscrowService::new(servers.clone(), NS);
        (servers, service, member)
    }

    async fn credential(member: &Keypair) -> SessionCredential {
        SessionCredentialIssuer::new(member.clone(), NS)
            .issue(&member.identity(), &conversation(), DEFAULT_CREDENTIAL_TTL)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_escrow_then_recover() {
        let (_, service, member) = setup().await;
        let secret = Secret::generate();

        let escrowed = service
            .escrow(&secret, &conversation(), 2, ParticipantPolicy::default())
            .await
            .unwrap();
        assert_eq!(escrowed.threshold, 2);
        assert_eq!(escrowed.key_servers.len(), 3);
        assert_eq!(escrowed.conversation_id(), &conversation());

        let recovered = service
            .recover(&escrowed, &credential(&member).await)
            .await
            .unwrap();
        assert_eq!(recovered, secret);
    }

    #[tokio::test]
    async fn test_record_survives_serialization() {
        let (_, service, member) = setup().await;
        let secret = Secret::generate();
        let escrowed = service
            .escrow(&secret, &conversation(), 2, ParticipantPolicy::default())
            .await
            .unwrap();

        let restored = EscrowedSecret::from_bytes(&escrowed.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, escrowed);
        let recovered = service
            .recover(&restored, &credential(&member).await)
            .await
            .unwrap();
        assert_eq!(recovered, secret);
    }

    #[tokio::test]
    async fn test_expired_credential_rejected_locally() {
        let (servers, service, member) = setup().await;
        let escrowed = service
            .escrow(&Secret::generate(), &conversation(), 2, ParticipantPolicy::default())
            .await
            .unwrap();

        let stale = SessionCredentialIssuer::new(member.clone(), NS)
            .issue_at(&member.identity(), &conversation(), Duration::from_secs(60), 0)
            .await
            .unwrap();

        // Expiry wins even when the key servers are unreachable.
        servers.set_online(0, false).await;
        servers.set_online(1, false).await;
        let err = service.recover(&escrowed, &stale).await.unwrap_err();
        assert_eq!(err, EscrowError::Expired);
    }

    #[tokio::test]
    async fn test_expired_wins_over_bad_signature() {
        let (_, service, member) = setup().await;
        let escrowed = service
            .escrow(&Secret::generate(), &conversation(), 2, ParticipantPolicy::default())
            .await
            .unwrap();

        let mut stale = SessionCredentialIssuer::new(member.clone(), NS)
            .issue_at(&member.identity(), &conversation(), Duration::from_secs(60), 0)
            .await
            .unwrap();
        stale.signature = Signature([0; 64]);

        let err = service.recover(&escrowed, &stale).await.unwrap_err();
        assert_eq!(err, EscrowError::Expired);
    }

    #[tokio::test]
    async fn test_outsider_denied() {
        let (_, service, _) = setup().await;
        let escrowed = service
            .escrow(&Secret::generate(), &conversation(), 2, ParticipantPolicy::default())
            .await
            .unwrap();

        let outsider = Keypair::generate();
        let err = service
            .recover(&escrowed, &credential(&outsider).await)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_credential_for_other_conversation_denied() {
        let (_, service, member) = setup().await;
        let escrowed = service
            .escrow(&Secret::generate(), &conversation(), 2, ParticipantPolicy::default())
            .await
            .unwrap();

        let other = SessionCredentialIssuer::new(member.clone(), NS)
            .issue(
                &member.identity(),
                &ConversationId::from_bytes([1u8; 32]),
                DEFAULT_CREDENTIAL_TTL,
            )
            .await
            .unwrap();
        assert!(matches!(
            service.recover(&escrowed, &other).await,
            Err(EscrowError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_servers_below_threshold_unavailable() {
        let (servers, service, member) = setup().await;
        let escrowed = service
            .escrow(&Secret::generate(), &conversation(), 3, ParticipantPolicy::default())
            .await
            .unwrap();

        servers.set_online(1, false).await;
        let err = service
            .recover(&escrowed, &credential(&member).await)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_garbage_ciphertext_is_malformed() {
        let (_, service, member) = setup().await;
        let mut escrowed = service
            .escrow(&Secret::generate(), &conversation(), 2, ParticipantPolicy::default())
            .await
            .unwrap();
        escrowed.ciphertext = vec![0xff, 0x00, 0x13];

        assert!(matches!(
            service.recover(&escrowed, &credential(&member).await).await,
            Err(EscrowError::MalformedEscrow(_))
        ));
        assert!(matches!(
            EscrowedSecret::from_bytes(b"\x01\x02"),
            Err(EscrowError::MalformedEscrow(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_length_plaintext_is_malformed() {
        let (servers, service, member) = setup().await;
        let identity = EscrowIdentity::new(NS, conversation());
        let ciphertext = servers.encrypt(&identity, 2, &[1u8; 16]).await.unwrap();
        let escrowed = EscrowedSecret {
            version: ESCROW_FORMAT_VERSION,
            identity,
            threshold: 2,
            key_servers: servers.key_servers(),
            policy: ParticipantPolicy::default(),
            created_at: 0,
            ciphertext,
        };

        assert!(matches!(
            service.recover(&escrowed, &credential(&member).await).await,
            Err(EscrowError::MalformedEscrow(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_threshold() {
        let (_, service, _) = setup().await;
        let err = service
            .escrow(&Secret::generate(), &conversation(), 4, ParticipantPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EscrowError::InvalidThreshold {
                threshold: 4,
                servers: 3
            }
        );
    }
}
