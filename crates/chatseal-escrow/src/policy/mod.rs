//! The shared policy store holding one escrowed secret per conversation.
//!
//! The slot is write-once. Concurrent initializers race through
//! [`PolicyStore::compare_and_publish`]; exactly one publishes and every
//! other caller is told a record already exists.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chatseal_core::ConversationId;

use crate::error::PolicyError;
use crate::escrow::EscrowedSecret;

/// Outcome of a compare-and-publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The slot was empty and now holds the caller's record.
    Published,
    /// The slot was already occupied; the caller's record was discarded.
    AlreadyExists,
}

/// Durable, shared storage of escrowed secrets.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Fetch the conversation's escrowed secret, if one has been published.
    async fn get_escrowed_secret(
        &self,
        conversation: &ConversationId,
    ) -> Result<Option<EscrowedSecret>, PolicyError>;

    /// Publish `escrowed` only if the conversation's slot is empty.
    async fn compare_and_publish(
        &self,
        conversation: &ConversationId,
        escrowed: &EscrowedSecret,
    ) -> Result<PublishOutcome, PolicyError>;
}

#[async_trait]
impl<T: PolicyStore + ?Sized> PolicyStore for Arc<T> {
    async fn get_escrowed_secret(
        &self,
        conversation: &ConversationId,
    ) -> Result<Option<EscrowedSecret>, PolicyError> {
        (**self).get_escrowed_secret(conversation).await
    }

    async fn compare_and_publish(
        &self,
        conversation: &ConversationId,
        escrowed: &EscrowedSecret,
    ) -> Result<PublishOutcome, PolicyError> {
        (**self).compare_and_publish(conversation, escrowed).await
    }
}
