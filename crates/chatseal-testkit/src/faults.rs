//! Fault-injecting and call-counting collaborator wrappers.
//!
//! Wrap an in-memory collaborator to count calls, add latency, fail the next
//! few calls as unavailable, or deny access. A [`Faults`] handle is shared
//! with the test so it can flip behavior while a manager is running.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatseal_core::{ConversationId, Identity, Signature};
use chatseal_escrow::{
    CredentialError, EscrowIdentity, EscrowedSecret, IbeCapability, IbeError, KeyServerId,
    PolicyError, PolicyStore, PublishOutcome, SessionCredential, Signer,
};

enum Injected {
    Unavailable,
    Denied,
}

#[derive(Default)]
struct FaultState {
    calls: AtomicUsize,
    fail_next: AtomicU32,
    deny: AtomicBool,
    delay_ms: AtomicU64,
}

/// Shared control handle for a [`Faulty`] wrapper.
#[derive(Clone, Default)]
pub struct Faults {
    state: Arc<FaultState>,
}

impl Faults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls seen so far.
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Fail the next `n` calls as unavailable.
    pub fn fail_next(&self, n: u32) {
        self.state.fail_next.store(n, Ordering::SeqCst);
    }

    /// Deny every call until cleared.
    pub fn deny(&self, deny: bool) {
        self.state.deny.store(deny, Ordering::SeqCst);
    }

    /// Delay every call by `delay` before it runs.
    pub fn set_delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Remove all injected faults. The call count is kept.
    pub fn clear(&self) {
        self.fail_next(0);
        self.deny(false);
        self.set_delay(Duration::ZERO);
    }

    async fn enter(&self) -> Option<Injected> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.state.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.state.deny.load(Ordering::SeqCst) {
            return Some(Injected::Denied);
        }
        let consumed = self
            .state
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        consumed.ok().map(|_| Injected::Unavailable)
    }
}

/// A collaborator wrapped with injectable faults.
pub struct Faulty<T> {
    inner: T,
    faults: Faults,
}

impl<T> Faulty<T> {
    pub fn new(inner: T) -> (Self, Faults) {
        let faults = Faults::new();
        (
            Self {
                inner,
                faults: faults.clone(),
            },
            faults,
        )
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

fn ibe_fault(injected: Injected) -> IbeError {
    match injected {
        Injected::Unavailable => IbeError::Unavailable("injected outage".into()),
        Injected::Denied => IbeError::AccessDenied("injected denial".into()),
    }
}

#[async_trait]
impl<C: IbeCapability> IbeCapability for Faulty<C> {
    fn key_servers(&self) -> Vec<KeyServerId> {
        self.inner.key_servers()
    }

    async fn encrypt(
        &self,
        identity: &EscrowIdentity,
        threshold: u8,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, IbeError> {
        if let Some(injected) = self.faults.enter().await {
            return Err(ibe_fault(injected));
        }
        self.inner.encrypt(identity, threshold, plaintext).await
    }

    async fn decrypt(
        &self,
        identity: &EscrowIdentity,
        proof: &SessionCredential,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, IbeError> {
        if let Some(injected) = self.faults.enter().await {
            return Err(ibe_fault(injected));
        }
        self.inner.decrypt(identity, proof, ciphertext).await
    }
}

#[async_trait]
impl<P: PolicyStore> PolicyStore for Faulty<P> {
    async fn get_escrowed_secret(
        &self,
        conversation: &ConversationId,
    ) -> Result<Option<EscrowedSecret>, PolicyError> {
        if self.faults.enter().await.is_some() {
            return Err(PolicyError::Unavailable("injected outage".into()));
        }
        self.inner.get_escrowed_secret(conversation).await
    }

    async fn compare_and_publish(
        &self,
        conversation: &ConversationId,
        escrowed: &EscrowedSecret,
    ) -> Result<PublishOutcome, PolicyError> {
        if self.faults.enter().await.is_some() {
            return Err(PolicyError::Unavailable("injected outage".into()));
        }
        self.inner.compare_and_publish(conversation, escrowed).await
    }
}

/// A signer that counts signatures.
pub struct CountingSigner<G> {
    inner: G,
    count: Arc<AtomicUsize>,
}

impl<G: Signer> CountingSigner<G> {
    pub fn new(inner: G) -> (Self, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                count: Arc::clone(&count),
            },
            count,
        )
    }
}

#[async_trait]
impl<G: Signer> Signer for CountingSigner<G> {
    fn identity(&self) -> Identity {
        self.inner.identity()
    }

    async fn sign_personal_message(&self, message: &[u8]) -> Result<Signature, CredentialError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_personal_message(message).await
    }
}

/// A signer whose user always declines.
pub struct DecliningSigner(pub Identity);

#[async_trait]
impl Signer for DecliningSigner {
    fn identity(&self) -> Identity {
        self.0
    }

    async fn sign_personal_message(&self, _message: &[u8]) -> Result<Signature, CredentialError> {
        Err(CredentialError::Signing("user rejected the request".into()))
    }
}
