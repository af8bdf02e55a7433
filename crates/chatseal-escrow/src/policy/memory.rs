//! In-memory policy store for tests and local development.
//!
//! Records are kept in their serialized form so a corrupted slot can be
//! simulated with [`MemoryPolicyStore::insert_raw`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chatseal_core::ConversationId;
use tokio::sync::RwLock;

use super::{PolicyStore, PublishOutcome};
use crate::error::PolicyError;
use crate::escrow::EscrowedSecret;

/// A shared in-memory slot per conversation.
///
/// Cloning yields another handle to the same slots, the way several devices
/// see one policy object.
#[derive(Clone, Default)]
pub struct MemoryPolicyStore {
    slots: Arc<RwLock<HashMap<ConversationId, Vec<u8>>>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a slot with arbitrary bytes.
    pub async fn insert_raw(&self, conversation: &ConversationId, bytes: Vec<u8>) {
        self.slots.write().await.insert(*conversation, bytes);
    }

    /// Number of published records.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn get_escrowed_secret(
        &self,
        conversation: &ConversationId,
    ) -> Result<Option<EscrowedSecret>, PolicyError> {
        let slots = self.slots.read().await;
        match slots.get(conversation) {
            Some(bytes) => EscrowedSecret::from_bytes(bytes)
                .map(Some)
                .map_err(|e| PolicyError::Malformed(e.to_string())),
            None => Ok(None),
        }
    }

    async fn compare_and_publish(
        &self,
        conversation: &ConversationId,
        escrowed: &EscrowedSecret,
    ) -> Result<PublishOutcome, PolicyError> {
        let bytes = escrowed
            .to_bytes()
            .map_err(|e| PolicyError::Malformed(e.to_string()))?;

        let mut slots = self.slots.write().await;
        if slots.contains_key(conversation) {
            return Ok(PublishOutcome::AlreadyExists);
        }
        slots.insert(*conversation, bytes);
        Ok(PublishOutcome::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::{ParticipantPolicy, ESCROW_FORMAT_VERSION};
    use crate::ibe::{EscrowIdentity, KeyServerId};

    fn record(conversation: ConversationId, marker: u8) -> EscrowedSecret {
        EscrowedSecret {
            version: ESCROW_FORMAT_VERSION,
            identity: EscrowIdentity::new("0xchat", conversation),
            threshold: 1,
            key_servers: vec![KeyServerId("keyserver-0".into())],
            policy: ParticipantPolicy::default(),
            created_at: 0,
            ciphertext: vec![marker; 8],
        }
    }

    #[tokio::test]
    async fn test_first_publish_wins() {
        let store = MemoryPolicyStore::new();
        let conversation = ConversationId::from_bytes([1u8; 32]);

        assert!(store
            .get_escrowed_secret(&conversation)
            .await
            .unwrap()
            .is_none());

        let first = record(conversation, 1);
        let second = record(conversation, 2);
        assert_eq!(
            store.compare_and_publish(&conversation, &first).await.unwrap(),
            PublishOutcome::Published
        );
        assert_eq!(
            store.compare_and_publish(&conversation, &second).await.unwrap(),
            PublishOutcome::AlreadyExists
        );

        let stored = store.get_escrowed_secret(&conversation).await.unwrap();
        assert_eq!(stored, Some(first));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_publishers_single_winner() {
        let store = MemoryPolicyStore::new();
        let conversation = ConversationId::from_bytes([2u8; 32]);

        let mut handles = Vec::new();
        for marker in 0..16u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_publish(&conversation, &record(conversation, marker))
                    .await
                    .unwrap()
            }));
        }

        let mut published = 0;
        for handle in handles {
            if handle.await.unwrap() == PublishOutcome::Published {
                published += 1;
            }
        }
        assert_eq!(published, 1);
    }

    #[tokio::test]
    async fn test_corrupted_slot_is_malformed() {
        let store = MemoryPolicyStore::new();
        let conversation = ConversationId::from_bytes([3u8; 32]);
        store.insert_raw(&conversation, vec![0xde, 0xad]).await;

        assert!(matches!(
            store.get_escrowed_secret(&conversation).await,
            Err(PolicyError::Malformed(_))
        ));
    }
}
