//! SQLite implementation of the SecretStore trait.
//!
//! The durable backend. Uses rusqlite with bundled SQLite; every secret is
//! sealed with a [`StorageKey`] before it touches the file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use chatseal_core::{now_millis, ConversationId, Secret};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::sealing::StorageKey;
use crate::traits::{check_existing, PutResult, SecretEntry, SecretStore};

/// SQLite-based secret store.
///
/// Thread-safe via an internal Mutex. Operations are short single-row
/// statements, so they run inline rather than on a blocking pool.
pub struct SqliteSecretStore {
    conn: Mutex<Connection>,
    key: StorageKey,
}

impl SqliteSecretStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>, key: StorageKey) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            key,
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory(key: StorageKey) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            key,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn row_to_entry(
        &self,
        conversation: &ConversationId,
        sealed: &[u8],
        created_at: i64,
    ) -> Result<SecretEntry> {
        let secret = self.key.unseal(conversation, sealed)?;
        Ok(SecretEntry::new(*conversation, &secret, created_at))
    }
}

impl SecretStore for SqliteSecretStore {
    fn entry(&self, conversation: &ConversationId) -> Result<Option<SecretEntry>> {
        let row: Option<(Vec<u8>, i64)> = self
            .lock()?
            .query_row(
                "SELECT sealed_secret, created_at FROM conversation_secrets
                 WHERE conversation_id = ?1",
                params![conversation.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(sealed, created_at)| self.row_to_entry(conversation, &sealed, created_at))
            .transpose()
    }

    fn put(&self, conversation: &ConversationId, secret: &Secret) -> Result<PutResult> {
        let sealed = self.key.seal(conversation, secret)?;

        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front so another process sharing
        // the file cannot interleave between the check and the insert.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<Vec<u8>> = tx
            .query_row(
                "SELECT sealed_secret FROM conversation_secrets WHERE conversation_id = ?1",
                params![conversation.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(existing) = existing {
            let cached = self.key.unseal(conversation, &existing)?;
            return check_existing(conversation, &cached, secret);
        }

        tx.execute(
            "INSERT INTO conversation_secrets (conversation_id, sealed_secret, created_at)
             VALUES (?1, ?2, ?3)",
            params![conversation.as_bytes().as_slice(), sealed, now_millis()],
        )?;
        tx.commit()?;

        Ok(PutResult::Inserted)
    }

    fn delete(&self, conversation: &ConversationId) -> Result<bool> {
        let removed = self.lock()?.execute(
            "DELETE FROM conversation_secrets WHERE conversation_id = ?1",
            params![conversation.as_bytes().as_slice()],
        )?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<usize> {
        Ok(self.lock()?.execute("DELETE FROM conversation_secrets", [])?)
    }

    fn conversations(&self) -> Result<Vec<ConversationId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT conversation_id FROM conversation_secrets ORDER BY conversation_id",
        )?;

        let rows = stmt
            .query_map([], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.iter()
            .map(|bytes| {
                ConversationId::try_from(bytes.as_slice())
                    .map_err(|e| StoreError::InvalidData(e.to_string()))
            })
            .collect()
    }
}
