//! SecretStore trait: the interface for the local secret cache.
//!
//! Backends can be an in-memory map, a SQLite file or an OS keychain. The key
//! manager only needs these operations.

use std::fmt;
use std::sync::Arc;

use chatseal_core::{ConversationId, Secret};
use zeroize::Zeroizing;

use crate::error::{Result, StoreError};

/// Result of putting a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
    /// The secret was inserted.
    Inserted,
    /// The identical secret was already cached (idempotent, not an error).
    AlreadyExists,
}

/// One cached secret.
#[derive(Clone)]
pub struct SecretEntry {
    /// The conversation this secret belongs to.
    pub conversation_id: ConversationId,
    /// Standard base64 of the secret bytes.
    pub secret_base64: Zeroizing<String>,
    /// When the entry was first written (Unix ms).
    pub created_at: i64,
}

impl SecretEntry {
    /// Build an entry for a freshly acquired secret.
    pub fn new(conversation_id: ConversationId, secret: &Secret, created_at: i64) -> Self {
        Self {
            conversation_id,
            secret_base64: Zeroizing::new(secret.to_base64()),
            created_at,
        }
    }

    /// Decode the cached secret.
    pub fn secret(&self) -> Result<Secret> {
        Secret::from_base64(&self.secret_base64).map_err(|e| StoreError::InvalidData(e.to_string()))
    }
}

impl fmt::Debug for SecretEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretEntry")
            .field("conversation_id", &self.conversation_id)
            .field("secret_base64", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// The local secret cache.
///
/// # Invariants
///
/// - At most one secret per conversation; it never changes once written.
/// - `put` either writes the whole entry or nothing.
/// - Removal happens only through `delete` or `clear` (cache invalidation,
///   e.g. on logout).
pub trait SecretStore: Send + Sync {
    /// Look up the full entry for a conversation.
    fn entry(&self, conversation: &ConversationId) -> Result<Option<SecretEntry>>;

    /// Insert a secret.
    ///
    /// # Returns
    /// - `Inserted` if no entry existed.
    /// - `AlreadyExists` if the same secret is already cached.
    ///
    /// # Errors
    /// `SecretConflict` if a different secret is cached.
    fn put(&self, conversation: &ConversationId, secret: &Secret) -> Result<PutResult>;

    /// Remove one entry. Returns whether an entry existed.
    fn delete(&self, conversation: &ConversationId) -> Result<bool>;

    /// Remove every entry. Returns how many were removed.
    fn clear(&self) -> Result<usize>;

    /// All conversations with a cached secret.
    fn conversations(&self) -> Result<Vec<ConversationId>>;

    /// Look up the secret for a conversation.
    fn get(&self, conversation: &ConversationId) -> Result<Option<Secret>> {
        self.entry(conversation)?
            .map(|entry| entry.secret())
            .transpose()
    }
}

impl<T: SecretStore + ?Sized> SecretStore for Arc<T> {
    fn entry(&self, conversation: &ConversationId) -> Result<Option<SecretEntry>> {
        (**self).entry(conversation)
    }

    fn put(&self, conversation: &ConversationId, secret: &Secret) -> Result<PutResult> {
        (**self).put(conversation, secret)
    }

    fn delete(&self, conversation: &ConversationId) -> Result<bool> {
        (**self).delete(conversation)
    }

    fn clear(&self) -> Result<usize> {
        (**self).clear()
    }

    fn conversations(&self) -> Result<Vec<ConversationId>> {
        (**self).conversations()
    }

    fn get(&self, conversation: &ConversationId) -> Result<Option<Secret>> {
        (**self).get(conversation)
    }
}

/// Compare a cached secret with an incoming one, shared by all backends.
pub(crate) fn check_existing(
    conversation: &ConversationId,
    existing: &Secret,
    incoming: &Secret,
) -> Result<PutResult> {
    if existing == incoming {
        Ok(PutResult::AlreadyExists)
    } else {
        tracing::warn!(conversation = %conversation, "refusing to overwrite cached secret");
        Err(StoreError::SecretConflict {
            conversation: conversation.to_string(),
        })
    }
}
