//! Test helpers for building messenger logs.

use crate::messenger::{CROSS_DOMAIN_MESSENGER, SentMessage};
use alloy_primitives::{Address, B256, Bytes, LogData, U256};
use alloy_rpc_types_eth::Log;
use alloy_sol_types::SolEvent;

/// Builds a `SentMessage` log as it would be delivered by a source chain's
/// event stream.
pub fn sent_message_log(
    source_chain_id: u64,
    dest_chain_id: u64,
    nonce: u64,
    block_number: u64,
    log_index: u64,
) -> Log {
    let event = SentMessage {
        destChainId: U256::from(dest_chain_id),
        target: Address::repeat_byte(0x22),
        nonce: U256::from(nonce),
        sender: Address::repeat_byte(0x11),
        sourceChainId: U256::from(source_chain_id),
        payload: Bytes::from_static(b"payload"),
    };
    let data: LogData = event.encode_log_data();
    Log {
        inner: alloy_primitives::Log { address: CROSS_DOMAIN_MESSENGER, data },
        block_number: Some(block_number),
        log_index: Some(log_index),
        block_hash: Some(B256::repeat_byte(0xbb)),
        ..Default::default()
    }
}
