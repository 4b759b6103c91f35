//! Network-level configuration, validated before anything starts.

use omnisim_chains::ChainConfig;
use std::collections::HashSet;
use thiserror::Error;

/// Configuration of a whole simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// The L1 chain.
    pub l1: ChainConfig,
    /// The L2 chains. Each is fronted by an RPC proxy; the node itself runs
    /// on an ephemeral port, so the `port` field of these configs is unused.
    pub l2s: Vec<ChainConfig>,
    /// First proxy port; L2 proxies bind consecutive ports from here.
    /// `0` picks unused ports instead.
    pub l2_starting_port: u16,
    /// Whether indexed messages are automatically relayed to their
    /// destination chains.
    pub enable_auto_relay: bool,
}

impl NetworkConfig {
    /// Creates a config with the default port layout and auto-relay off.
    pub const fn new(l1: ChainConfig, l2s: Vec<ChainConfig>) -> Self {
        Self { l1, l2s, l2_starting_port: 9545, enable_auto_relay: false }
    }

    /// Validates the configuration. Called by the orchestrator before any
    /// process is spawned.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.l2s.is_empty() {
            return Err(ConfigError::NoL2Chains);
        }

        let mut seen = HashSet::new();
        for l2 in &self.l2s {
            if l2.chain_id == self.l1.chain_id {
                return Err(ConfigError::L1ChainIdReused { chain_id: l2.chain_id });
            }
            if !seen.insert(l2.chain_id) {
                return Err(ConfigError::DuplicateChainId { chain_id: l2.chain_id });
            }
        }
        Ok(())
    }
}

/// Rejected network configurations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The network has no L2 chains to simulate.
    #[error("at least one L2 chain is required")]
    NoL2Chains,
    /// Two L2 chains share a chain ID.
    #[error("chain id {chain_id} is configured more than once")]
    DuplicateChainId {
        /// The repeated chain ID.
        chain_id: u64,
    },
    /// An L2 chain reuses the L1 chain ID.
    #[error("chain id {chain_id} is used for both L1 and an L2")]
    L1ChainIdReused {
        /// The shared chain ID.
        chain_id: u64,
    },
}
