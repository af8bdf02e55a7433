//! In-memory implementation of the SecretStore trait.
//!
//! Same semantics as SQLite but nothing survives the process. Thread-safe via
//! RwLock.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chatseal_core::{now_millis, ConversationId, Secret};

use crate::error::{Result, StoreError};
use crate::traits::{check_existing, PutResult, SecretEntry, SecretStore};

/// In-memory secret store.
pub struct MemorySecretStore {
    entries: RwLock<HashMap<ConversationId, SecretEntry>>,
}

impl MemorySecretStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<ConversationId, SecretEntry>>> {
        self.entries
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<ConversationId, SecretEntry>>> {
        self.entries
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for MemorySecretStore {
    fn entry(&self, conversation: &ConversationId) -> Result<Option<SecretEntry>> {
        Ok(self.read()?.get(conversation).cloned())
    }

    fn put(&self, conversation: &ConversationId, secret: &Secret) -> Result<PutResult> {
        let mut entries = self.write()?;

        if let Some(existing) = entries.get(conversation) {
            return check_existing(conversation, &existing.secret()?, secret);
        }

        entries.insert(
            *conversation,
            SecretEntry::new(*conversation, secret, now_millis()),
        );
        Ok(PutResult::Inserted)
    }

    fn delete(&self, conversation: &ConversationId) -> Result<bool> {
        Ok(self.write()?.remove(conversation).is_some())
    }

    fn clear(&self) -> Result<usize> {
        let mut entries = self.write()?;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    fn conversations(&self) -> Result<Vec<ConversationId>> {
        let mut ids: Vec<ConversationId> = self.read()?.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
