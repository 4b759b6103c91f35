//! Shared types for the omnisim local multi-chain network.
//!
//! This crate carries the data model used across the orchestrator and the
//! interop message subsystem: chain descriptors, component lifecycle states,
//! the cross-domain message record, and the on-chain messenger ABI that the
//! indexer and relayer must match exactly.

mod chain;
pub use chain::{ChainDescriptor, ChainLifecycleState};

mod message;
pub use message::{CrossDomainMessage, MessageDecodeError, MessageKey, MessageStatus};

mod messenger;
pub use messenger::{
    CROSS_DOMAIN_MESSENGER, MessageAlreadyRelayed, RELAY_ACCOUNT, RELAY_ACCOUNT_KEY, SentMessage,
    relayMessageCall, sendMessageCall,
};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_util;
