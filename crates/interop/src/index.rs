//! The in-memory cross-domain message index.

use omnisim_types::{CrossDomainMessage, MessageKey, MessageStatus};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;

/// Append-only index of every cross-domain message observed during a run.
///
/// Written by one subscription task per source chain and read concurrently by
/// the relayer and external inspection code. Writers for different source
/// chains never touch the same identity key, so a single map-wide lock keeps
/// every read consistent: a reader either sees a record completely or not at
/// all. Records live for the process lifetime; only `status` ever changes.
#[derive(Debug, Default)]
pub struct MessageIndex {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    messages: HashMap<MessageKey, CrossDomainMessage>,
    // Discovery order per destination chain:
    // (source chain, source block, source log index) -> identity key.
    by_destination: HashMap<u64, BTreeMap<(u64, u64, u64), MessageKey>>,
}

impl MessageIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a newly observed message. Returns `false` without touching the
    /// index when the identity key is already present: event streams may
    /// redeliver, so duplicate delivery must be a no-op.
    pub async fn insert(&self, message: CrossDomainMessage) -> bool {
        let mut inner = self.inner.write().await;
        let key = message.key();
        if inner.messages.contains_key(&key) {
            return false;
        }
        inner
            .by_destination
            .entry(message.dest_chain_id)
            .or_default()
            .insert(message.order_key(), key);
        inner.messages.insert(key, message);
        true
    }

    /// Looks up a message by identity key.
    pub async fn get(&self, key: MessageKey) -> Option<CrossDomainMessage> {
        self.inner.read().await.messages.get(&key).cloned()
    }

    /// Messages destined for `dest_chain_id` still in
    /// [`MessageStatus::Indexed`], in discovery order.
    pub async fn pending_for(&self, dest_chain_id: u64) -> Vec<CrossDomainMessage> {
        self.messages_with(dest_chain_id, |m| m.status == MessageStatus::Indexed).await
    }

    /// All messages destined for `dest_chain_id`, in discovery order.
    pub async fn messages_for(&self, dest_chain_id: u64) -> Vec<CrossDomainMessage> {
        self.messages_with(dest_chain_id, |_| true).await
    }

    async fn messages_with(
        &self,
        dest_chain_id: u64,
        filter: impl Fn(&CrossDomainMessage) -> bool,
    ) -> Vec<CrossDomainMessage> {
        let inner = self.inner.read().await;
        let Some(ordered) = inner.by_destination.get(&dest_chain_id) else {
            return Vec::new();
        };
        ordered
            .values()
            .filter_map(|key| inner.messages.get(key))
            .filter(|m| filter(m))
            .cloned()
            .collect()
    }

    /// Advances a message's status along the forward-only lifecycle.
    /// Terminal statuses are stable: once a message reached
    /// [`MessageStatus::Relayed`] or [`MessageStatus::RelayFailed`] no
    /// further transition is accepted, and a non-terminal message only moves
    /// one legal step forward.
    pub async fn set_status(
        &self,
        key: MessageKey,
        status: MessageStatus,
    ) -> Result<(), IndexError> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .get_mut(&key)
            .ok_or(IndexError::UnknownMessage { key })?;
        if message.status.is_terminal() {
            return Err(IndexError::TerminalStatus { key, current: message.status });
        }
        if !message.status.can_transition(status) {
            return Err(IndexError::InvalidTransition { key, from: message.status, to: status });
        }
        message.status = status;
        Ok(())
    }

    /// Number of indexed messages.
    pub async fn len(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    /// Whether the index is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.messages.is_empty()
    }
}

/// Errors from index mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// The identity key is not present in the index.
    #[error("unknown message {key}")]
    UnknownMessage {
        /// The identity key looked up.
        key: MessageKey,
    },
    /// The message already reached a terminal status.
    #[error("message {key} is terminal ({current}), refusing transition")]
    TerminalStatus {
        /// The identity key.
        key: MessageKey,
        /// The terminal status the message holds.
        current: MessageStatus,
    },
    /// The requested transition is not a legal forward step.
    #[error("message {key}: illegal transition {from} -> {to}")]
    InvalidTransition {
        /// The identity key.
        key: MessageKey,
        /// The status the message holds.
        from: MessageStatus,
        /// The rejected status.
        to: MessageStatus,
    },
}
