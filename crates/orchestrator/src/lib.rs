//! Coordinated lifecycle for the local multi-chain network: one L1 chain,
//! N L2 chains each fronted by an RPC proxy, a cross-domain message indexer,
//! and an optional auto-relayer.

mod config;
pub use config::{ConfigError, NetworkConfig};

mod error;
pub use error::{OrchestratorError, ShutdownError};

mod genesis;
pub use genesis::{L1_GENESIS, L2_GENESIS};

mod orchestrator;
pub use orchestrator::Orchestrator;
