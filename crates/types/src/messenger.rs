//! The standardized cross-domain messenger ABI.
//!
//! The messenger contract is deployed at the same predeploy address on every
//! L2 chain. Its event and entry-point signatures are a fixed external
//! protocol: the indexer and relayer must match the
//! `(nonce, sender, target, sourceChainID, destChainID, payload)` tuple
//! exactly. Nonce allocation and replay rejection are enforced on-chain.

use alloy_primitives::{Address, address};
use alloy_sol_types::sol;

/// The predeploy address of the cross-domain messenger on every L2 chain.
pub const CROSS_DOMAIN_MESSENGER: Address =
    address!("4200000000000000000000000000000000000023");

/// The well-known dev account used to submit relay transactions.
pub const RELAY_ACCOUNT: Address = address!("a0Ee7A142d267C1f36714E4a8F75612F20a79720");

/// Private key of [`RELAY_ACCOUNT`]. A fixed dev-chain key, funded in every
/// default genesis; never use outside a local simulator.
pub const RELAY_ACCOUNT_KEY: &str =
    "0x2a871d0798f97d79848a013d4936a73bf4cc922c825d33c1cf7073dff6d409c6";

sol! {
    /// Sends a message to `target` on the destination chain. The messenger
    /// assigns the nonce and emits [`SentMessage`].
    function sendMessage(
        uint256 destChainId,
        address target,
        bytes calldata payload
    ) external;

    /// Emitted by the messenger on the source chain when a cross-domain
    /// message is sent.
    #[derive(Debug, PartialEq, Eq)]
    event SentMessage(
        uint256 indexed destChainId,
        address indexed target,
        uint256 indexed nonce,
        address sender,
        uint256 sourceChainId,
        bytes payload
    );

    /// Raised by [`relayMessage`](relayMessageCall) when the
    /// `(sourceChainId, nonce)` pair was relayed before.
    error MessageAlreadyRelayed();

    /// Executes a previously sent message on its destination chain. Reverts
    /// with [`MessageAlreadyRelayed`] when the `(sourceChainId, nonce)` pair
    /// was relayed before.
    #[derive(Debug, PartialEq, Eq)]
    function relayMessage(
        uint256 nonce,
        address sender,
        address target,
        uint256 sourceChainId,
        uint256 destChainId,
        bytes calldata payload
    ) external;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, U256};
    use alloy_sol_types::{SolCall, SolError, SolEvent};

    #[test]
    fn sent_message_topic0_is_stable() {
        assert_eq!(
            SentMessage::SIGNATURE,
            "SentMessage(uint256,address,uint256,address,uint256,bytes)"
        );
    }

    // The on-chain dispatcher is keyed on these selectors; they must never
    // drift.
    #[test]
    fn entry_point_selectors_are_stable() {
        assert_eq!(sendMessageCall::SELECTOR, [0x70, 0x56, 0xf4, 0x1f]);
        assert_eq!(relayMessageCall::SELECTOR, [0xd7, 0x64, 0xad, 0x0b]);
        assert_eq!(MessageAlreadyRelayed::SELECTOR, [0x9c, 0xa9, 0x48, 0x0b]);
    }

    #[test]
    fn relay_message_round_trips() {
        let call = relayMessageCall {
            nonce: U256::from(7u64),
            sender: Address::repeat_byte(0x11),
            target: Address::repeat_byte(0x22),
            sourceChainId: U256::from(10u64),
            destChainId: U256::from(30u64),
            payload: Bytes::from_static(b"hello"),
        };
        let encoded = call.abi_encode();
        let decoded = relayMessageCall::abi_decode(&encoded).unwrap();
        assert_eq!(decoded, call);
    }
}
