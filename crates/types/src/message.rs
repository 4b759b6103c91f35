//! The cross-domain message record and its identity key.

use crate::messenger::{CROSS_DOMAIN_MESSENGER, SentMessage};
use alloy_primitives::{Address, Bytes};
use alloy_rpc_types_eth::Log;
use alloy_sol_types::SolEvent;
use thiserror::Error;

/// Identity key of a cross-domain message: the nonce is assigned by the
/// source chain's messenger contract and is monotonically increasing per
/// source chain, so the pair is unique across the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey {
    /// Chain ID of the chain the message was emitted on.
    pub source_chain_id: u64,
    /// Messenger-assigned nonce on the source chain.
    pub nonce: u64,
}

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source_chain_id, self.nonce)
    }
}

/// Relay status of an indexed message.
///
/// Created as [`MessageStatus::Indexed`] by the indexer; every later
/// transition is made exclusively by the relayer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageStatus {
    /// Observed on the source chain, not yet relayed.
    #[default]
    Indexed,
    /// A relay transaction has been submitted to the destination chain.
    RelaySubmitted,
    /// The relay transaction confirmed, or the destination contract reported
    /// the message as already relayed. Terminal.
    Relayed,
    /// The relay submission failed unrecoverably. Terminal, no automatic
    /// retry.
    RelayFailed,
}

impl MessageStatus {
    /// Terminal statuses never transition again.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Relayed | Self::RelayFailed)
    }

    /// Whether a transition from `self` to `next` is a legal forward step.
    /// A message only ever moves `Indexed` → `RelaySubmitted` →
    /// `Relayed`/`RelayFailed`; everything else, including standing still,
    /// is rejected.
    pub const fn can_transition(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Indexed, Self::RelaySubmitted) |
                (Self::RelaySubmitted, Self::Relayed | Self::RelayFailed)
        )
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Indexed => "indexed",
            Self::RelaySubmitted => "relay submitted",
            Self::Relayed => "relayed",
            Self::RelayFailed => "relay failed",
        };
        f.write_str(s)
    }
}

/// One message emitted by the cross-domain messenger on a source chain for
/// delivery to a destination chain. Immutable except for `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossDomainMessage {
    /// Chain the message was emitted on.
    pub source_chain_id: u64,
    /// Chain the message is destined for.
    pub dest_chain_id: u64,
    /// Messenger-assigned nonce on the source chain.
    pub nonce: u64,
    /// The account that sent the message on the source chain.
    pub sender: Address,
    /// The account the message targets on the destination chain.
    pub target: Address,
    /// Opaque message payload.
    pub payload: Bytes,
    /// Block the emission event landed in on the source chain.
    pub source_block_number: u64,
    /// Log index of the emission event within that block.
    pub source_log_index: u64,
    /// Current relay status.
    pub status: MessageStatus,
}

impl CrossDomainMessage {
    /// Returns the identity key of this message.
    pub const fn key(&self) -> MessageKey {
        MessageKey { source_chain_id: self.source_chain_id, nonce: self.nonce }
    }

    /// Discovery-order key: messages for one destination are consumed in
    /// `(source chain, source block, source log index)` order.
    pub const fn order_key(&self) -> (u64, u64, u64) {
        (self.source_chain_id, self.source_block_number, self.source_log_index)
    }

    /// Decodes a messenger `SentMessage` log observed on `source_chain_id`
    /// into a message record with status [`MessageStatus::Indexed`].
    pub fn from_log(source_chain_id: u64, log: &Log) -> Result<Self, MessageDecodeError> {
        if log.address() != CROSS_DOMAIN_MESSENGER {
            return Err(MessageDecodeError::UnexpectedEmitter { address: log.address() });
        }

        let event = SentMessage::decode_log_data(&log.inner.data)
            .map_err(|source| MessageDecodeError::Abi { source })?;

        let block_number = log.block_number.ok_or(MessageDecodeError::PendingLog)?;
        let log_index = log.log_index.ok_or(MessageDecodeError::PendingLog)?;

        let nonce = u64::try_from(event.nonce)
            .map_err(|_| MessageDecodeError::FieldOverflow { field: "nonce" })?;
        let dest_chain_id = u64::try_from(event.destChainId)
            .map_err(|_| MessageDecodeError::FieldOverflow { field: "destChainId" })?;
        let emitted_source = u64::try_from(event.sourceChainId)
            .map_err(|_| MessageDecodeError::FieldOverflow { field: "sourceChainId" })?;

        if emitted_source != source_chain_id {
            return Err(MessageDecodeError::SourceChainMismatch {
                expected: source_chain_id,
                got: emitted_source,
            });
        }

        Ok(Self {
            source_chain_id,
            dest_chain_id,
            nonce,
            sender: event.sender,
            target: event.target,
            payload: event.payload,
            source_block_number: block_number,
            source_log_index: log_index,
            status: MessageStatus::Indexed,
        })
    }
}

/// Failure to interpret a log as a cross-domain message emission.
#[derive(Debug, Error)]
pub enum MessageDecodeError {
    /// The log was emitted by a contract other than the messenger predeploy.
    #[error("log emitted by {address}, not the cross-domain messenger")]
    UnexpectedEmitter {
        /// The actual emitter.
        address: Address,
    },
    /// The log body did not decode as a `SentMessage` event.
    #[error("failed to decode SentMessage event: {source}")]
    Abi {
        /// Underlying ABI decoding error.
        source: alloy_sol_types::Error,
    },
    /// The log is missing block number or log index metadata.
    #[error("log is pending and carries no block position")]
    PendingLog,
    /// A uint256 field did not fit the expected width.
    #[error("event field `{field}` exceeds u64")]
    FieldOverflow {
        /// The offending field.
        field: &'static str,
    },
    /// The chain the log was observed on does not match the chain the event
    /// claims as its source.
    #[error("source chain mismatch: observed on {expected}, event claims {got}")]
    SourceChainMismatch {
        /// The chain the subscription was reading from.
        expected: u64,
        /// The chain ID embedded in the event.
        got: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::sent_message_log;

    #[test]
    fn decodes_sent_message_log() {
        let log = sent_message_log(10, 30, 1, 5, 0);
        let msg = CrossDomainMessage::from_log(10, &log).unwrap();
        assert_eq!(msg.key(), MessageKey { source_chain_id: 10, nonce: 1 });
        assert_eq!(msg.dest_chain_id, 30);
        assert_eq!(msg.source_block_number, 5);
        assert_eq!(msg.source_log_index, 0);
        assert_eq!(msg.status, MessageStatus::Indexed);
        assert_eq!(msg.payload, Bytes::from_static(b"payload"));
    }

    #[test]
    fn rejects_foreign_emitter() {
        let mut log = sent_message_log(10, 30, 1, 5, 0);
        log.inner.address = Address::repeat_byte(0x99);
        assert!(matches!(
            CrossDomainMessage::from_log(10, &log),
            Err(MessageDecodeError::UnexpectedEmitter { .. })
        ));
    }

    #[test]
    fn rejects_source_chain_mismatch() {
        let log = sent_message_log(10, 30, 1, 5, 0);
        assert!(matches!(
            CrossDomainMessage::from_log(30, &log),
            Err(MessageDecodeError::SourceChainMismatch { expected: 30, got: 10 })
        ));
    }

    #[test]
    fn rejects_pending_log() {
        let mut log = sent_message_log(10, 30, 1, 5, 0);
        log.block_number = None;
        assert!(matches!(
            CrossDomainMessage::from_log(10, &log),
            Err(MessageDecodeError::PendingLog)
        ));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!MessageStatus::Indexed.is_terminal());
        assert!(!MessageStatus::RelaySubmitted.is_terminal());
        assert!(MessageStatus::Relayed.is_terminal());
        assert!(MessageStatus::RelayFailed.is_terminal());
    }

    #[test]
    fn status_transitions_only_move_forward() {
        use MessageStatus::*;
        assert!(Indexed.can_transition(RelaySubmitted));
        assert!(RelaySubmitted.can_transition(Relayed));
        assert!(RelaySubmitted.can_transition(RelayFailed));

        assert!(!Indexed.can_transition(Relayed));
        assert!(!Indexed.can_transition(Indexed));
        assert!(!RelaySubmitted.can_transition(Indexed));
        assert!(!Relayed.can_transition(RelayFailed));
        assert!(!RelayFailed.can_transition(RelaySubmitted));
    }
}
