//! Test fixtures and helpers.
//!
//! A [`TestWorld`] is one deployment: a shared policy store and a set of key
//! servers. Each [`TestDevice`] is one process with its own secret cache and
//! its own view of the shared collaborators, wrapped so tests can count calls
//! and inject faults per device.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chatseal::{ConversationKeyManager, ManagerConfig, RetryPolicy};
use chatseal_core::{ConversationId, Keypair};
use chatseal_escrow::{MemoryKeyServers, MemoryPolicyStore};
use chatseal_store::MemorySecretStore;

use crate::faults::{CountingSigner, Faults, Faulty};

/// Namespace used by every fixture.
pub const TEST_NAMESPACE: &str = "0xc4a7";

/// The manager type every [`TestDevice`] runs.
pub type DeviceManager = ConversationKeyManager<
    Arc<MemorySecretStore>,
    Faulty<MemoryPolicyStore>,
    Faulty<MemoryKeyServers>,
    CountingSigner<Keypair>,
>;

/// One deployment shared by many devices.
pub struct TestWorld {
    pub policy: MemoryPolicyStore,
    pub servers: MemoryKeyServers,
}

impl TestWorld {
    /// Three key servers and an empty policy store.
    pub fn new() -> Self {
        Self::with_servers(3)
    }

    pub fn with_servers(count: usize) -> Self {
        Self {
            policy: MemoryPolicyStore::new(),
            servers: MemoryKeyServers::new(count),
        }
    }

    /// Manager config tuned for tests: short backoff, two-second timeout.
    pub fn config() -> ManagerConfig {
        ManagerConfig {
            call_timeout: Duration::from_secs(2),
            retry: RetryPolicy {
                max_attempts: 4,
                initial_backoff: Duration::from_millis(10),
                multiplier: 2,
                max_backoff: Duration::from_millis(100),
            },
            ..ManagerConfig::new(TEST_NAMESPACE)
        }
    }

    /// A device whose identity participates in `conversation`.
    pub async fn member(&self, conversation: &ConversationId) -> TestDevice {
        self.member_with_config(conversation, Self::config()).await
    }

    pub async fn member_with_config(
        &self,
        conversation: &ConversationId,
        config: ManagerConfig,
    ) -> TestDevice {
        let device = self.device(Keypair::generate(), config);
        self.servers
            .add_member(conversation, device.keypair.identity())
            .await;
        device
    }

    /// A device that participates in no conversation.
    pub fn outsider(&self) -> TestDevice {
        self.device(Keypair::generate(), Self::config())
    }

    /// A device for an existing keypair, e.g. a second device of one user.
    pub fn device(&self, keypair: Keypair, config: ManagerConfig) -> TestDevice {
        let store = Arc::new(MemorySecretStore::new());
        let (policy, policy_faults) = Faulty::new(self.policy.clone());
        let (servers, ibe_faults) = Faulty::new(self.servers.clone());
        let (signer, signatures) = CountingSigner::new(keypair.clone());

        let manager = ConversationKeyManager::new(
            Arc::clone(&store),
            policy,
            servers,
            signer,
            config,
        );

        TestDevice {
            keypair,
            store,
            manager: Arc::new(manager),
            policy_faults,
            ibe_faults,
            signatures,
        }
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// One process: a manager plus handles on everything it touches.
pub struct TestDevice {
    pub keypair: Keypair,
    pub store: Arc<MemorySecretStore>,
    pub manager: Arc<DeviceManager>,
    pub policy_faults: Faults,
    pub ibe_faults: Faults,
    pub signatures: Arc<AtomicUsize>,
}

impl TestDevice {
    /// Calls made to any external collaborator.
    pub fn network_calls(&self) -> usize {
        self.policy_faults.calls() + self.ibe_faults.calls() + self.signature_count()
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.load(Ordering::SeqCst)
    }
}

/// A conversation id that differs per `n`.
pub fn conversation(n: u8) -> ConversationId {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xc0;
    bytes[31] = n;
    ConversationId::from_bytes(bytes)
}

/// Route `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatseal::ResolutionState;

    #[tokio::test]
    async fn test_members_share_a_secret() {
        let world = TestWorld::new();
        let conversation = conversation(1);
        let alice = world.member(&conversation).await;
        let bob = world.member(&conversation).await;

        let a = alice
            .manager
            .resolve_conversation_key(&conversation)
            .await
            .unwrap();
        let b = bob
            .manager
            .resolve_conversation_key(&conversation)
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(bob.manager.state(&conversation), ResolutionState::Ready);
        assert!(bob.network_calls() > 0);
    }

    #[test]
    fn test_conversations_are_distinct() {
        assert_ne!(conversation(1), conversation(2));
    }
}
