//! Chain and proxy configuration.

use alloy_primitives::Address;
use std::{io, net::TcpListener, path::PathBuf, time::Duration};

/// Canonical readiness poll interval. One consistent pair is used everywhere
/// a component waits for a chain to come up.
pub(crate) const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Canonical readiness timeout.
pub(crate) const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one simulated chain process.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Chain ID, unique within a run.
    pub chain_id: u64,
    /// Human readable chain name.
    pub name: String,
    /// Port to bind the node to. `0` picks an unused port at construction.
    pub port: u16,
    /// Optional genesis file contents. `None` runs the node's default dev
    /// genesis.
    pub genesis: Option<Vec<u8>>,
    /// Interval mining period, in seconds.
    pub block_interval_secs: u64,
    /// Readiness probe interval.
    pub poll_interval: Duration,
    /// Readiness probe deadline.
    pub ready_timeout: Duration,
    /// Directory the chain's log file is written to.
    pub log_dir: PathBuf,
}

impl ChainConfig {
    /// Creates a config with the default dev-chain settings.
    pub fn new(chain_id: u64, name: impl Into<String>) -> Self {
        Self {
            chain_id,
            name: name.into(),
            port: 0,
            genesis: None,
            block_interval_secs: 2,
            poll_interval: READY_POLL_INTERVAL,
            ready_timeout: READY_TIMEOUT,
            log_dir: std::env::temp_dir(),
        }
    }

    /// Sets an explicit port.
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the genesis file contents.
    pub fn with_genesis(mut self, genesis: Vec<u8>) -> Self {
        self.genesis = Some(genesis);
        self
    }
}

/// L1 contract addresses exposed by an L2's fronting proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeAddresses {
    /// The portal contract on L1.
    pub portal: Address,
    /// The L1 side of the cross-domain messenger.
    pub l1_cross_domain_messenger: Address,
    /// The L1 standard bridge.
    pub l1_standard_bridge: Address,
}

impl BridgeAddresses {
    /// Deterministic per-chain dev addresses, so configuration output is
    /// stable across runs.
    pub fn for_chain(chain_id: u64) -> Self {
        Self {
            portal: dev_address(0x01, chain_id),
            l1_cross_domain_messenger: dev_address(0x02, chain_id),
            l1_standard_bridge: dev_address(0x03, chain_id),
        }
    }
}

fn dev_address(tag: u8, chain_id: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0x0b;
    bytes[1] = tag;
    bytes[12..].copy_from_slice(&chain_id.to_be_bytes());
    Address::from(bytes)
}

/// Configuration exposed by an [`RpcProxy`](crate::RpcProxy).
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Chain ID of the fronted L2 chain.
    pub chain_id: u64,
    /// Name of the fronted L2 chain.
    pub name: String,
    /// Port the proxy listens on. `0` picks an unused port at construction.
    pub port: u16,
    /// L1 bridge contract addresses for the fronted chain.
    pub l1_addresses: BridgeAddresses,
}

impl ProxyConfig {
    /// Creates a proxy config with deterministic dev bridge addresses.
    pub fn new(chain_id: u64, name: impl Into<String>, port: u16) -> Self {
        Self { chain_id, name: name.into(), port, l1_addresses: BridgeAddresses::for_chain(chain_id) }
    }
}

/// Reserves an unused localhost port by binding and immediately dropping a
/// listener. The small race between drop and reuse is acceptable for a local
/// simulator.
pub fn pick_unused_port() -> io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
