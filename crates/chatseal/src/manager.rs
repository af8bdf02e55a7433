//! The conversation key manager.
//!
//! Ensures exactly one secret exists per conversation and makes it available
//! locally. The local cache is always consulted first; on a miss the shared
//! policy store decides between recovering the published secret and creating
//! a new one.
//!
//! Creation across processes is racy but convergent: every creator escrows a
//! fresh secret and publishes it with compare-and-publish. Losers discard
//! their secret and recover the winner's. Within one process a per-conversation
//! async mutex keeps at most one resolution in flight.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};

use chatseal_core::{
    AesGcmCodec, ConversationId, Identity, MessageBlob, MessageCodec, MessageEnvelope, Secret,
};
use chatseal_escrow::{
    EscrowError, EscrowedSecret, IbeCapability, KeyEscrowService, PolicyStore, PublishOutcome,
    SessionCredential, SessionCredentialIssuer, Signer,
};
use chatseal_store::{PutResult, SecretStore};
use tokio::sync::Mutex;

use crate::config::ManagerConfig;
use crate::error::{ErrorKind, KeyError, Result};
use crate::retry::with_retry;
use crate::state::{ResolutionState, StateTable};
use crate::transport::{frame_envelope, unframe_envelope, BlobId, BlobTransport};

type Flights = StdMutex<HashMap<ConversationId, Arc<Mutex<()>>>>;

/// A seat on a conversation's in-flight resolution.
///
/// The last ticket for a conversation removes its mutex from the table, so
/// the table only holds conversations with a resolution running or queued.
struct FlightTicket<'a> {
    flights: &'a Flights,
    conversation: ConversationId,
    lock: Arc<Mutex<()>>,
}

impl Drop for FlightTicket<'_> {
    fn drop(&mut self) {
        let mut flights = self
            .flights
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the table, one here.
        if Arc::strong_count(&self.lock) == 2 {
            if let Some(current) = flights.get(&self.conversation) {
                if Arc::ptr_eq(current, &self.lock) {
                    flights.remove(&self.conversation);
                }
            }
        }
    }
}

/// One message from [`ConversationKeyManager::load_messages`].
#[derive(Debug)]
pub struct LoadedMessage {
    pub blob_id: BlobId,
    pub result: Result<MessageBlob>,
}

/// Orchestrates the secret cache, escrow, credentials and the message codec.
///
/// Callers only talk to this type. Generic over its collaborators:
///
/// - `S`: the local [`SecretStore`]
/// - `P`: the shared [`PolicyStore`]
/// - `C`: the threshold IBE capability
/// - `G`: the signer that proves control of this device's identity
pub struct ConversationKeyManager<S, P, C, G> {
    store: S,
    policy: P,
    escrow: KeyEscrowService<C>,
    issuer: SessionCredentialIssuer<G>,
    codec: Arc<dyn MessageCodec>,
    config: ManagerConfig,
    flights: Flights,
    states: StateTable,
}

impl<S, P, C, G> ConversationKeyManager<S, P, C, G>
where
    S: SecretStore,
    P: PolicyStore,
    C: IbeCapability,
    G: Signer,
{
    /// Create a manager using AES-256-GCM for messages.
    pub fn new(store: S, policy: P, capability: C, signer: G, config: ManagerConfig) -> Self {
        Self {
            store,
            policy,
            escrow: KeyEscrowService::new(capability, config.namespace.clone()),
            issuer: SessionCredentialIssuer::new(signer, config.namespace.clone()),
            codec: Arc::new(AesGcmCodec::new()),
            config,
            flights: StdMutex::new(HashMap::new()),
            states: StateTable::default(),
        }
    }

    /// Replace the message codec.
    pub fn with_codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The local secret cache.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The identity credentials are issued for.
    pub fn identity(&self) -> Identity {
        self.issuer.identity()
    }

    /// Resolution state of a conversation in this process.
    pub fn state(&self, conversation: &ConversationId) -> ResolutionState {
        self.states.get(conversation)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Return the conversation's secret, resolving it if it is not cached.
    ///
    /// A cache hit makes no collaborator calls. Dropping the returned future
    /// leaves the cache untouched or fully written.
    pub async fn resolve_conversation_key(&self, conversation: &ConversationId) -> Result<Secret> {
        if let Some(secret) = self.store.get(conversation)? {
            tracing::trace!(conversation = %conversation, "secret cache hit");
            self.states.set(conversation, ResolutionState::Ready);
            return Ok(secret);
        }

        let flight = self.flight(conversation);
        let _turn = flight.lock.lock().await;

        // Whoever held the lock before us may have resolved it.
        if let Some(secret) = self.store.get(conversation)? {
            self.states.set(conversation, ResolutionState::Ready);
            return Ok(secret);
        }

        tracing::debug!(conversation = %conversation, "secret cache miss, resolving");
        let guard = self.states.begin(conversation);
        match self.resolve_uncached(conversation).await {
            Ok(secret) => {
                guard.settle(ResolutionState::Ready);
                tracing::info!(conversation = %conversation, "conversation key ready");
                Ok(secret)
            }
            Err(err) => {
                tracing::warn!(
                    conversation = %conversation,
                    kind = ?err.kind(),
                    error = %err,
                    "conversation key resolution failed"
                );
                guard.settle(ResolutionState::Failed(err.kind()));
                Err(err)
            }
        }
    }

    async fn resolve_uncached(&self, conversation: &ConversationId) -> Result<Secret> {
        let existing = self
            .call("get_escrowed_secret", move || {
                self.policy.get_escrowed_secret(conversation)
            })
            .await?;

        match existing {
            Some(escrowed) => self.recover(conversation, &escrowed).await,
            None => self.create(conversation).await,
        }
    }

    /// Generate, escrow and try to publish a new secret.
    async fn create(&self, conversation: &ConversationId) -> Result<Secret> {
        let secret = Secret::generate();
        let threshold = self.config.threshold;
        let policy = &self.config.policy;

        let escrowed = {
            let secret = &secret;
            self.call("escrow", move || {
                self.escrow
                    .escrow(secret, conversation, threshold, policy.clone())
            })
            .await?
        };

        let published = &escrowed;
        let outcome = self
            .call("compare_and_publish", move || {
                self.policy.compare_and_publish(conversation, published)
            })
            .await?;

        match outcome {
            PublishOutcome::Published => {
                tracing::info!(
                    conversation = %conversation,
                    threshold,
                    "published new conversation secret"
                );
                self.cache(conversation, &secret)?;
                Ok(secret)
            }
            PublishOutcome::AlreadyExists => {
                tracing::info!(
                    conversation = %conversation,
                    "lost publish race, recovering the published secret"
                );
                drop(secret);

                let winner = self
                    .call("get_escrowed_secret", move || {
                        self.policy.get_escrowed_secret(conversation)
                    })
                    .await?
                    .ok_or_else(|| {
                        KeyError::Escrow(EscrowError::EscrowUnavailable(
                            "escrow slot reported occupied but reads empty".into(),
                        ))
                    })?;
                self.recover(conversation, &winner).await
            }
        }
    }

    /// Recover a published secret, reissuing the credential once if it lapses.
    async fn recover(
        &self,
        conversation: &ConversationId,
        escrowed: &EscrowedSecret,
    ) -> Result<Secret> {
        let mut reissued = false;
        loop {
            let credential = self.issue_credential(conversation).await?;
            let proof = &credential;
            let outcome = self
                .call("recover", move || self.escrow.recover(escrowed, proof))
                .await;

            match outcome {
                Ok(secret) => {
                    self.cache(conversation, &secret)?;
                    return Ok(secret);
                }
                Err(err) if err.kind() == ErrorKind::Expired && !reissued => {
                    tracing::debug!(
                        conversation = %conversation,
                        "session credential expired, reissuing"
                    );
                    reissued = true;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn issue_credential(&self, conversation: &ConversationId) -> Result<SessionCredential> {
        let identity = self.issuer.identity();
        let identity = &identity;
        let ttl = self.config.credential_ttl;
        self.call("issue_credential", move || {
            self.issuer.issue(identity, conversation, ttl)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt a payload under the conversation's secret.
    pub async fn encrypt_message(
        &self,
        plaintext: &[u8],
        conversation: &ConversationId,
    ) -> Result<MessageEnvelope> {
        let secret = self.resolve_conversation_key(conversation).await?;
        Ok(self.codec.encrypt(plaintext, &secret)?)
    }

    /// Decrypt an envelope with the conversation's secret.
    pub async fn decrypt_message(
        &self,
        envelope: &MessageEnvelope,
        conversation: &ConversationId,
    ) -> Result<Vec<u8>> {
        let secret = self.resolve_conversation_key(conversation).await?;
        Ok(self.codec.decrypt(envelope, &secret)?)
    }

    /// Seal a message and upload it.
    pub async fn post_message<T: BlobTransport + ?Sized>(
        &self,
        transport: &T,
        conversation: &ConversationId,
        message: &MessageBlob,
    ) -> Result<BlobId> {
        let envelope = self.encrypt_message(&message.to_json()?, conversation).await?;
        let framed = frame_envelope(&envelope)?;

        let blob_id = self
            .call("upload", move || transport.upload(framed.clone()))
            .await?;
        tracing::debug!(conversation = %conversation, blob = %blob_id, "posted message");
        Ok(blob_id)
    }

    /// Download and open messages.
    ///
    /// Fails as a whole only if the conversation's secret cannot be resolved;
    /// otherwise every blob gets its own result.
    pub async fn load_messages<T: BlobTransport + ?Sized>(
        &self,
        transport: &T,
        conversation: &ConversationId,
        blob_ids: &[BlobId],
    ) -> Result<Vec<LoadedMessage>> {
        let secret = self.resolve_conversation_key(conversation).await?;

        let mut loaded = Vec::with_capacity(blob_ids.len());
        for blob_id in blob_ids {
            let result = self.load_one(transport, &secret, blob_id).await;
            if let Err(err) = &result {
                tracing::warn!(
                    conversation = %conversation,
                    blob = %blob_id,
                    kind = ?err.kind(),
                    "failed to load message"
                );
            }
            loaded.push(LoadedMessage {
                blob_id: blob_id.clone(),
                result,
            });
        }
        Ok(loaded)
    }

    async fn load_one<T: BlobTransport + ?Sized>(
        &self,
        transport: &T,
        secret: &Secret,
        blob_id: &BlobId,
    ) -> Result<MessageBlob> {
        let blob = self
            .call("download", move || transport.download(blob_id))
            .await?;
        let envelope = unframe_envelope(&blob)?;
        let plaintext = self.codec.decrypt(&envelope, secret)?;
        Ok(MessageBlob::from_json(&plaintext)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cache invalidation
    // ─────────────────────────────────────────────────────────────────────────

    /// Drop one conversation's cached secret and reset its state.
    ///
    /// The escrowed secret is untouched; the next access recovers it.
    pub fn forget(&self, conversation: &ConversationId) -> Result<bool> {
        let removed = self.store.delete(conversation)?;
        self.states.reset(conversation);
        tracing::info!(conversation = %conversation, removed, "forgot conversation key");
        Ok(removed)
    }

    /// Drop every cached secret, e.g. on logout.
    pub fn logout(&self) -> Result<usize> {
        let removed = self.store.clear()?;
        self.states.reset_all();
        tracing::info!(removed, "cleared all conversation keys");
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────────

    fn flight(&self, conversation: &ConversationId) -> FlightTicket<'_> {
        let mut flights = self
            .flights
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        FlightTicket {
            flights: &self.flights,
            conversation: *conversation,
            lock: Arc::clone(flights.entry(*conversation).or_default()),
        }
    }

    #[cfg(test)]
    fn flights_in_table(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn cache(&self, conversation: &ConversationId, secret: &Secret) -> Result<()> {
        match self.store.put(conversation, secret)? {
            PutResult::Inserted => {
                tracing::debug!(conversation = %conversation, "cached conversation secret");
            }
            PutResult::AlreadyExists => {}
        }
        Ok(())
    }

    async fn call<T, E, F, Fut>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<KeyError>,
    {
        with_retry(operation, &self.config.retry, self.config.call_timeout, call).await
    }
}
