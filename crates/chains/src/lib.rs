//! Chain process and RPC proxy wrappers.
//!
//! These are the external collaborators of the orchestrator core: a wrapper
//! around a local deterministic EVM node process ([`SimChain`]) and an
//! RPC-intercepting proxy that fronts each L2 node ([`RpcProxy`]). The core
//! only depends on the [`ChainProcess`] and [`ProxyProcess`] traits.

mod config;
pub use config::{BridgeAddresses, ChainConfig, ProxyConfig, pick_unused_port};

mod traits;
pub use traits::{ChainProcess, ChainProcessError, ProxyError, ProxyProcess};

mod sim;
pub use sim::SimChain;

mod proxy;
pub use proxy::RpcProxy;
