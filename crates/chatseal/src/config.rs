//! Configuration for the conversation key manager.

use std::time::Duration;

use chatseal_escrow::{ParticipantPolicy, DEFAULT_CREDENTIAL_TTL};

/// Bounded exponential backoff for transient collaborator failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Factor applied to the delay after each failed retry.
    pub multiplier: u32,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(200),
            multiplier: 2,
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Configuration for a [`ConversationKeyManager`](crate::ConversationKeyManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Namespace prefixed to every escrow identity.
    pub namespace: String,
    /// Key servers needed to recover a secret.
    pub threshold: u8,
    /// Lifetime of each session credential.
    pub credential_ttl: Duration,
    /// Timeout applied to every collaborator call.
    pub call_timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Approval rule recorded with new escrows.
    pub policy: ParticipantPolicy,
}

impl ManagerConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            namespace: String::from("chatseal"),
            threshold: 2,
            credential_ttl: DEFAULT_CREDENTIAL_TTL,
            call_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            policy: ParticipantPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::new("0xchat");
        assert_eq!(config.namespace, "0xchat");
        assert_eq!(config.threshold, 2);
        assert_eq!(config.credential_ttl, Duration::from_secs(600));
        assert_eq!(RetryPolicy::none().max_attempts, 1);
    }
}
