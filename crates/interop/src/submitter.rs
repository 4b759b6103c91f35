//! Relay transaction submission against a destination chain's messenger.

use alloy_network::TransactionBuilder;
use alloy_primitives::{B256, U256, hex};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolCall, SolError};
use async_trait::async_trait;
use omnisim_types::{
    CROSS_DOMAIN_MESSENGER, CrossDomainMessage, MessageAlreadyRelayed, MessageKey,
    RELAY_ACCOUNT_KEY, relayMessageCall,
};
use thiserror::Error;
use tracing::debug;

/// Result of a relay submission that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The relay transaction was mined successfully.
    Relayed {
        /// Hash of the relay transaction.
        tx_hash: B256,
    },
    /// The destination messenger reported the message as relayed before.
    /// The relayer treats this as success: the message is delivered, just
    /// not by us.
    AlreadyRelayed,
}

/// Submits relay transactions for one destination chain.
#[async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait RelaySubmitter: Send + Sync + std::fmt::Debug {
    /// The destination chain this submitter writes to.
    fn dest_chain_id(&self) -> u64;

    /// Submits the relay transaction for `message` and waits for it to mine.
    async fn submit_relay(
        &self,
        message: &CrossDomainMessage,
    ) -> Result<RelayOutcome, RelayError>;
}

/// [`RelaySubmitter`] that signs with the well-known dev relay account and
/// sends through the destination chain's RPC endpoint.
#[derive(Debug)]
pub struct MessengerSubmitter {
    dest_chain_id: u64,
    provider: DynProvider,
}

impl MessengerSubmitter {
    /// Connects a wallet-backed provider to the destination chain.
    pub async fn connect(dest_chain_id: u64, rpc_url: &str) -> Result<Self, RelayError> {
        let signer: PrivateKeySigner = RELAY_ACCOUNT_KEY
            .parse()
            .map_err(|err: alloy_signer_local::LocalSignerError| RelayError::Signer {
                message: err.to_string(),
            })?;
        let provider = ProviderBuilder::new()
            .wallet(signer)
            .connect(rpc_url)
            .await
            .map_err(|err| RelayError::Connect { dest_chain_id, message: err.to_string() })?
            .erased();
        Ok(Self { dest_chain_id, provider })
    }
}

fn relay_calldata(message: &CrossDomainMessage) -> Vec<u8> {
    relayMessageCall {
        nonce: U256::from(message.nonce),
        sender: message.sender,
        target: message.target,
        sourceChainId: U256::from(message.source_chain_id),
        destChainId: U256::from(message.dest_chain_id),
        payload: message.payload.clone(),
    }
    .abi_encode()
}

/// The messenger rejects replays with a `MessageAlreadyRelayed` revert, which
/// surfaces as an estimation or execution error string. Nodes without the
/// contract ABI render the revert as the raw error selector.
fn is_already_relayed(error: &str) -> bool {
    error.contains("MessageAlreadyRelayed")
        || error.contains(&hex::encode(MessageAlreadyRelayed::SELECTOR))
        || error.to_lowercase().contains("already relayed")
}

#[async_trait]
impl RelaySubmitter for MessengerSubmitter {
    fn dest_chain_id(&self) -> u64 {
        self.dest_chain_id
    }

    async fn submit_relay(
        &self,
        message: &CrossDomainMessage,
    ) -> Result<RelayOutcome, RelayError> {
        let key = message.key();
        let tx = TransactionRequest::default()
            .with_to(CROSS_DOMAIN_MESSENGER)
            .with_input(relay_calldata(message));

        let pending = match self.provider.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(err) => {
                let rendered = err.to_string();
                if is_already_relayed(&rendered) {
                    debug!(target: "omnisim::relayer", %key, "message already relayed on destination");
                    return Ok(RelayOutcome::AlreadyRelayed);
                }
                return Err(RelayError::Submit { key, message: rendered });
            }
        };

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|err| RelayError::Receipt { key, message: err.to_string() })?;
        let tx_hash = receipt.transaction_hash;
        if receipt.status() {
            Ok(RelayOutcome::Relayed { tx_hash })
        } else {
            Err(RelayError::Reverted { key, tx_hash })
        }
    }
}

/// Errors submitting a relay transaction.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The relay account key failed to parse.
    #[error("failed to load relay signer: {message}")]
    Signer {
        /// Signer construction detail.
        message: String,
    },
    /// The destination chain endpoint could not be reached.
    #[error("chain {dest_chain_id}: failed to connect relay provider: {message}")]
    Connect {
        /// The destination chain.
        dest_chain_id: u64,
        /// Transport-level detail.
        message: String,
    },
    /// Submission of the relay transaction failed.
    #[error("message {key}: relay submission failed: {message}")]
    Submit {
        /// The message being relayed.
        key: MessageKey,
        /// Submission failure detail.
        message: String,
    },
    /// The relay transaction was sent but its receipt never arrived.
    #[error("message {key}: relay receipt not available: {message}")]
    Receipt {
        /// The message being relayed.
        key: MessageKey,
        /// Receipt retrieval detail.
        message: String,
    },
    /// The relay transaction mined but reverted.
    #[error("message {key}: relay transaction {tx_hash} reverted")]
    Reverted {
        /// The message being relayed.
        key: MessageKey,
        /// The reverted transaction.
        tx_hash: B256,
    },
}
