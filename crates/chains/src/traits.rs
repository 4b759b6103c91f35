//! Lifecycle traits the orchestrator core depends on.

use crate::config::ProxyConfig;
use async_trait::async_trait;
use omnisim_types::{ChainDescriptor, ChainLifecycleState};
use std::{path::PathBuf, time::Duration};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// One simulated chain node, as seen by the orchestrator.
#[async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait ChainProcess: Send + Sync + std::fmt::Debug {
    /// The chain ID this process serves.
    fn chain_id(&self) -> u64;

    /// Immutable descriptor for this chain.
    fn descriptor(&self) -> ChainDescriptor;

    /// HTTP RPC endpoint.
    fn endpoint(&self) -> String;

    /// WebSocket RPC endpoint, used for event subscriptions.
    fn ws_endpoint(&self) -> String;

    /// Path to the chain's log file.
    fn log_path(&self) -> PathBuf;

    /// Current lifecycle state.
    fn state(&self) -> ChainLifecycleState;

    /// Whether the process has reached a terminal state.
    fn stopped(&self) -> bool {
        self.state().is_terminal()
    }

    /// Starts the chain process. Errors if already started or if the spawn
    /// fails. Cancelling `cancel` after a successful start kills the process.
    async fn start(&self, cancel: CancellationToken) -> Result<(), ChainProcessError>;

    /// Stops the chain process. A second call reports
    /// [`ChainProcessError::AlreadyStopped`].
    async fn stop(&self) -> Result<(), ChainProcessError>;

    /// Blocks until the node answers its liveness probe with the expected
    /// client signature, the configured deadline passes, or `cancel` fires.
    async fn wait_until_ready(&self, cancel: CancellationToken) -> Result<(), ChainProcessError>;

    /// Configures periodic block production. Returns
    /// [`ChainProcessError::Cancelled`] when `cancel` fires before the node
    /// acknowledges.
    async fn set_interval_mining(
        &self,
        interval_secs: u64,
        cancel: CancellationToken,
    ) -> Result<(), ChainProcessError>;
}

/// An RPC proxy fronting one L2 chain.
#[async_trait]
#[auto_impl::auto_impl(Arc)]
pub trait ProxyProcess: Send + Sync + std::fmt::Debug {
    /// The chain ID of the fronted chain.
    fn chain_id(&self) -> u64;

    /// HTTP endpoint of the proxy.
    fn endpoint(&self) -> String;

    /// Proxy configuration, including bridge contract addresses.
    fn config(&self) -> ProxyConfig;

    /// Current lifecycle state.
    fn state(&self) -> ChainLifecycleState;

    /// Starts serving. Errors if already started or if the bind fails.
    async fn start(&self, cancel: CancellationToken) -> Result<(), ProxyError>;

    /// Gracefully stops serving. A second call reports
    /// [`ProxyError::AlreadyStopped`].
    async fn stop(&self) -> Result<(), ProxyError>;
}

/// Errors from a chain process wrapper.
#[derive(Debug, Error)]
pub enum ChainProcessError {
    /// Start was called on a process that is not in the not-started state.
    #[error("chain {chain_id}: already started")]
    AlreadyStarted {
        /// The offending chain.
        chain_id: u64,
    },
    /// Stop was called on a process that already reached a terminal state.
    #[error("chain {chain_id}: already stopped")]
    AlreadyStopped {
        /// The offending chain.
        chain_id: u64,
    },
    /// No unused port could be reserved for the node.
    #[error("chain {chain_id}: failed to allocate a port: {source}")]
    PortAllocation {
        /// The offending chain.
        chain_id: u64,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The node's log file could not be created.
    #[error("chain {chain_id}: failed to open log file: {source}")]
    LogFile {
        /// The offending chain.
        chain_id: u64,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The genesis file could not be materialized on disk.
    #[error("chain {chain_id}: failed to write genesis file: {source}")]
    Genesis {
        /// The offending chain.
        chain_id: u64,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The node process could not be spawned.
    #[error("chain {chain_id}: failed to spawn node process: {source}")]
    Spawn {
        /// The offending chain.
        chain_id: u64,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The node process could not be killed.
    #[error("chain {chain_id}: failed to kill node process: {source}")]
    Kill {
        /// The offending chain.
        chain_id: u64,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The readiness probe did not succeed within the deadline.
    #[error("chain {chain_id}: not ready after {timeout:?}")]
    ReadyTimeout {
        /// The offending chain.
        chain_id: u64,
        /// The deadline that passed.
        timeout: Duration,
    },
    /// The liveness probe answered with an unexpected client signature.
    #[error("chain {chain_id}: unexpected client version `{version}`")]
    UnexpectedClientVersion {
        /// The offending chain.
        chain_id: u64,
        /// The version string the node reported.
        version: String,
    },
    /// The operation was cancelled externally.
    #[error("chain {chain_id}: cancelled while {operation}")]
    Cancelled {
        /// The offending chain.
        chain_id: u64,
        /// The operation that was in flight.
        operation: &'static str,
    },
    /// An RPC call against the node failed.
    #[error("chain {chain_id}: rpc `{method}` failed: {source}")]
    Rpc {
        /// The offending chain.
        chain_id: u64,
        /// The RPC method.
        method: &'static str,
        /// Underlying transport error.
        source: alloy_transport::TransportError,
    },
}

impl ChainProcessError {
    /// The chain the error names.
    pub const fn chain_id(&self) -> u64 {
        match self {
            Self::AlreadyStarted { chain_id } |
            Self::AlreadyStopped { chain_id } |
            Self::PortAllocation { chain_id, .. } |
            Self::LogFile { chain_id, .. } |
            Self::Genesis { chain_id, .. } |
            Self::Spawn { chain_id, .. } |
            Self::Kill { chain_id, .. } |
            Self::ReadyTimeout { chain_id, .. } |
            Self::UnexpectedClientVersion { chain_id, .. } |
            Self::Cancelled { chain_id, .. } |
            Self::Rpc { chain_id, .. } => *chain_id,
        }
    }
}

/// Errors from an RPC proxy wrapper.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Start was called on a proxy that is not in the not-started state.
    #[error("proxy for chain {chain_id}: already started")]
    AlreadyStarted {
        /// The fronted chain.
        chain_id: u64,
    },
    /// Stop was called on a proxy that already reached a terminal state.
    #[error("proxy for chain {chain_id}: already stopped")]
    AlreadyStopped {
        /// The fronted chain.
        chain_id: u64,
    },
    /// No unused port could be reserved for the proxy.
    #[error("proxy for chain {chain_id}: failed to allocate a port: {source}")]
    PortAllocation {
        /// The fronted chain.
        chain_id: u64,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The listener could not be bound.
    #[error("proxy for chain {chain_id}: failed to bind listener: {source}")]
    Bind {
        /// The fronted chain.
        chain_id: u64,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The serve task did not wind down cleanly.
    #[error("proxy for chain {chain_id}: serve task failed to join: {message}")]
    StopJoin {
        /// The fronted chain.
        chain_id: u64,
        /// Join failure detail.
        message: String,
    },
}
