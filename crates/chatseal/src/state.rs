//! Per-conversation resolution state.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chatseal_core::ConversationId;

use crate::error::ErrorKind;

/// Where a conversation is in key resolution, for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Not accessed yet, or forgotten.
    Unresolved,
    /// A resolution is in flight.
    Resolving,
    /// The secret is cached.
    Ready,
    /// The last resolution failed; the caller may retry.
    Failed(ErrorKind),
}

impl ResolutionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ResolutionState::Ready)
    }
}

/// Shared table of resolution states.
#[derive(Debug, Default)]
pub(crate) struct StateTable {
    states: Mutex<HashMap<ConversationId, ResolutionState>>,
}

impl StateTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationId, ResolutionState>> {
        // The map holds plain values; a panic mid-update cannot leave it torn.
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn get(&self, conversation: &ConversationId) -> ResolutionState {
        self.lock()
            .get(conversation)
            .copied()
            .unwrap_or(ResolutionState::Unresolved)
    }

    pub(crate) fn set(&self, conversation: &ConversationId, state: ResolutionState) {
        self.lock().insert(*conversation, state);
    }

    pub(crate) fn reset(&self, conversation: &ConversationId) {
        self.lock().remove(conversation);
    }

    pub(crate) fn reset_all(&self) {
        self.lock().clear();
    }

    /// Mark `conversation` as resolving until the returned guard settles.
    pub(crate) fn begin(&self, conversation: &ConversationId) -> ResolvingGuard<'_> {
        self.set(conversation, ResolutionState::Resolving);
        ResolvingGuard {
            table: self,
            conversation: *conversation,
            settled: false,
        }
    }
}

/// Reverts a `Resolving` state to `Unresolved` if the resolution is dropped
/// before it settles.
pub(crate) struct ResolvingGuard<'a> {
    table: &'a StateTable,
    conversation: ConversationId,
    settled: bool,
}

impl ResolvingGuard<'_> {
    pub(crate) fn settle(mut self, state: ResolutionState) {
        self.table.set(&self.conversation, state);
        self.settled = true;
    }
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(conversation = %self.conversation, "resolution cancelled");
            self.table.reset(&self.conversation);
        }
    }
}
