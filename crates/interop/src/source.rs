//! The event-source seam between the indexer and a chain's RPC endpoint.

use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types_eth::{Filter, Log};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use omnisim_types::{CROSS_DOMAIN_MESSENGER, SentMessage};
use std::pin::Pin;
use thiserror::Error;

/// A live stream of messenger logs from one source chain.
pub type LogStream = Pin<Box<dyn Stream<Item = Log> + Send>>;

/// Source of messenger emission events for one chain.
///
/// The production implementation subscribes over WebSocket; tests drive the
/// indexer through a mock.
#[async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait LogSource: Send + Sync + std::fmt::Debug {
    /// The source chain this stream reads from.
    fn chain_id(&self) -> u64;

    /// Opens a live subscription filtered to the messenger contract's
    /// message-sent event signature.
    async fn subscribe_messages(&self) -> Result<LogStream, SubscriptionError>;

    /// Fetches messenger logs in the inclusive block range, used to replay
    /// blocks missed while a subscription was down.
    async fn messages_range(&self, from_block: u64, to_block: u64)
        -> Result<Vec<Log>, SubscriptionError>;

    /// The chain's current head block number.
    async fn latest_block(&self) -> Result<u64, SubscriptionError>;
}

/// [`LogSource`] backed by a WebSocket [`RootProvider`].
#[derive(Debug)]
pub struct ProviderLogSource {
    chain_id: u64,
    provider: RootProvider,
}

impl ProviderLogSource {
    /// Connects to the chain's WebSocket endpoint.
    pub async fn connect(chain_id: u64, ws_url: &str) -> Result<Self, SubscriptionError> {
        let provider = RootProvider::connect(ws_url).await.map_err(|err| {
            SubscriptionError::Connect { chain_id, message: err.to_string() }
        })?;
        Ok(Self { chain_id, provider })
    }

    fn filter(&self) -> Filter {
        Filter::new()
            .address(CROSS_DOMAIN_MESSENGER)
            .event_signature(SentMessage::SIGNATURE_HASH)
    }
}

#[async_trait]
impl LogSource for ProviderLogSource {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn subscribe_messages(&self) -> Result<LogStream, SubscriptionError> {
        let chain_id = self.chain_id;
        let subscription =
            self.provider.subscribe_logs(&self.filter()).await.map_err(|err| {
                SubscriptionError::Connect { chain_id, message: err.to_string() }
            })?;
        Ok(subscription.into_stream().boxed())
    }

    async fn messages_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, SubscriptionError> {
        let filter = self.filter().from_block(from_block).to_block(to_block);
        self.provider
            .get_logs(&filter)
            .await
            .map_err(|err| SubscriptionError::Rpc { chain_id: self.chain_id, message: err.to_string() })
    }

    async fn latest_block(&self) -> Result<u64, SubscriptionError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|err| SubscriptionError::Rpc { chain_id: self.chain_id, message: err.to_string() })
    }
}

/// Errors establishing or serving an event subscription.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// The subscription could not be established.
    #[error("chain {chain_id}: failed to establish event subscription: {message}")]
    Connect {
        /// The source chain.
        chain_id: u64,
        /// Transport-level detail.
        message: String,
    },
    /// A catch-up RPC query failed.
    #[error("chain {chain_id}: event catch-up query failed: {message}")]
    Rpc {
        /// The source chain.
        chain_id: u64,
        /// Transport-level detail.
        message: String,
    },
    /// The live stream closed and could not be re-established.
    #[error("chain {chain_id}: event stream closed and resubscription failed")]
    StreamClosed {
        /// The source chain.
        chain_id: u64,
    },
}

impl SubscriptionError {
    /// The chain the error names.
    pub const fn chain_id(&self) -> u64 {
        match self {
            Self::Connect { chain_id, .. } |
            Self::Rpc { chain_id, .. } |
            Self::StreamClosed { chain_id } => *chain_id,
        }
    }
}
