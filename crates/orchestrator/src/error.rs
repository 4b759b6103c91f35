//! Orchestrator error taxonomy.

use crate::ConfigError;
use omnisim_chains::{ChainProcessError, ProxyError};
use omnisim_interop::{IndexerError, RelayError, RelayerError, SubscriptionError};
use thiserror::Error;

/// Errors surfaced by the orchestrator's start path. Startup fails fast: the
/// first failing component aborts the start, after a best-effort teardown of
/// everything already running.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The network configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A chain process failed.
    #[error(transparent)]
    Chain(#[from] ChainProcessError),
    /// An RPC proxy failed.
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    /// The message indexer failed to start or stop.
    #[error(transparent)]
    Indexer(#[from] IndexerError),
    /// The message relayer failed to start or stop.
    #[error(transparent)]
    Relayer(#[from] RelayerError),
    /// A relay submitter could not be connected.
    #[error(transparent)]
    Relay(#[from] RelayError),
    /// A log source could not be connected.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    /// A fan-out task failed to join.
    #[error("orchestration task failed: {message}")]
    Task {
        /// Join failure detail.
        message: String,
    },
    /// The requested chain is not part of this network.
    #[error("chain {chain_id} is not part of this network")]
    UnknownChain {
        /// The unknown chain ID.
        chain_id: u64,
    },
    /// Start was called twice.
    #[error("orchestrator already started")]
    AlreadyStarted,
}

/// Aggregate of every failure encountered while stopping the network. The
/// stop path is best-effort: it continues through failures and reports them
/// all at once.
#[derive(Debug, Error)]
#[error("shutdown completed with {} failure(s): [{}]", failures.len(), failures.join("; "))]
pub struct ShutdownError {
    /// Rendered per-component failures, in stop order.
    pub failures: Vec<String>,
}
