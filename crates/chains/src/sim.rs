//! A local chain node backed by an `anvil` subprocess.

use crate::{
    ChainProcess, ChainProcessError,
    config::ChainConfig,
};
use alloy_rpc_client::{ClientBuilder, RpcClient};
use async_trait::async_trait;
use omnisim_types::{ChainDescriptor, ChainLifecycleState};
use std::{
    io::Write,
    path::PathBuf,
    process::Stdio,
    sync::{Arc, Mutex},
};
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const HOST: &str = "127.0.0.1";

/// One simulated chain node: spawns `anvil` with the configured chain ID and
/// genesis, pipes its output to a log file, and exposes the lifecycle the
/// orchestrator drives.
///
/// The port is resolved at construction so the endpoint is known before the
/// process starts.
#[derive(Debug)]
pub struct SimChain {
    cfg: ChainConfig,
    port: u16,
    log_path: PathBuf,
    rpc: RpcClient,

    state: Arc<Mutex<ChainLifecycleState>>,
    child: Arc<tokio::sync::Mutex<Option<Child>>>,
    // Keeps the materialized genesis file alive for the process lifetime.
    genesis_file: Mutex<Option<NamedTempFile>>,
}

impl SimChain {
    /// Creates a chain wrapper from its config, reserving a port when the
    /// config asks for an ephemeral one.
    pub fn new(cfg: ChainConfig) -> Result<Self, ChainProcessError> {
        let port = if cfg.port == 0 {
            crate::pick_unused_port()
                .map_err(|source| ChainProcessError::PortAllocation { chain_id: cfg.chain_id, source })?
        } else {
            cfg.port
        };

        let log_path = cfg.log_dir.join(format!("chain-{}.log", cfg.chain_id));
        let url = format!("http://{HOST}:{port}")
            .parse()
            .map_err(|_| ChainProcessError::PortAllocation {
                chain_id: cfg.chain_id,
                source: std::io::Error::other("invalid endpoint url"),
            })?;
        let rpc = ClientBuilder::default().http(url);

        Ok(Self {
            cfg,
            port,
            log_path,
            rpc,
            state: Arc::new(Mutex::new(ChainLifecycleState::NotStarted)),
            child: Arc::new(tokio::sync::Mutex::new(None)),
            genesis_file: Mutex::new(None),
        })
    }

    /// The port the node is bound to.
    pub const fn port(&self) -> u16 {
        self.port
    }

    fn set_state(&self, next: ChainLifecycleState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    fn materialize_genesis(&self) -> Result<Option<PathBuf>, ChainProcessError> {
        let Some(genesis) = &self.cfg.genesis else { return Ok(None) };

        let mut file = NamedTempFile::new()
            .map_err(|source| ChainProcessError::Genesis { chain_id: self.cfg.chain_id, source })?;
        file.write_all(genesis)
            .map_err(|source| ChainProcessError::Genesis { chain_id: self.cfg.chain_id, source })?;
        let path = file.path().to_path_buf();
        *self.genesis_file.lock().unwrap_or_else(|e| e.into_inner()) = Some(file);
        Ok(Some(path))
    }
}

#[async_trait]
impl ChainProcess for SimChain {
    fn chain_id(&self) -> u64 {
        self.cfg.chain_id
    }

    fn descriptor(&self) -> ChainDescriptor {
        ChainDescriptor {
            chain_id: self.cfg.chain_id,
            name: self.cfg.name.clone(),
            rpc_url: self.endpoint(),
            log_path: self.log_path.clone(),
            port: self.port,
        }
    }

    fn endpoint(&self) -> String {
        format!("http://{HOST}:{}", self.port)
    }

    fn ws_endpoint(&self) -> String {
        format!("ws://{HOST}:{}", self.port)
    }

    fn log_path(&self) -> PathBuf {
        self.log_path.clone()
    }

    fn state(&self) -> ChainLifecycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn start(&self, cancel: CancellationToken) -> Result<(), ChainProcessError> {
        let chain_id = self.cfg.chain_id;
        if !self.state().can_start() {
            return Err(ChainProcessError::AlreadyStarted { chain_id });
        }
        self.set_state(ChainLifecycleState::Starting);

        let genesis_path = match self.materialize_genesis() {
            Ok(path) => path,
            Err(err) => {
                self.set_state(ChainLifecycleState::Failed);
                return Err(err);
            }
        };

        let log_file = match std::fs::File::create(&self.log_path) {
            Ok(file) => file,
            Err(source) => {
                self.set_state(ChainLifecycleState::Failed);
                return Err(ChainProcessError::LogFile { chain_id, source });
            }
        };
        let stderr_file = log_file
            .try_clone()
            .map_err(|source| ChainProcessError::LogFile { chain_id, source })?;

        let mut command = Command::new("anvil");
        command
            .arg("--silent")
            .arg("--host")
            .arg(HOST)
            .arg("--chain-id")
            .arg(self.cfg.chain_id.to_string())
            .arg("--port")
            .arg(self.port.to_string())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr_file))
            .kill_on_drop(true);
        if let Some(path) = genesis_path {
            command.arg("--init").arg(path);
        }

        info!(target: "omnisim::chain", chain_id, port = self.port, "starting chain node");
        let child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.set_state(ChainLifecycleState::Failed);
                return Err(ChainProcessError::Spawn { chain_id, source });
            }
        };

        *self.child.lock().await = Some(child);
        self.set_state(ChainLifecycleState::Running);

        // Kill the node if the run-level cancellation fires before an
        // explicit stop.
        let child_slot = Arc::clone(&self.child);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            cancel.cancelled().await;
            let mut guard = child_slot.lock().await;
            if let Some(mut child) = guard.take() {
                debug!(target: "omnisim::chain", chain_id, "cancellation received, killing chain node");
                if let Err(err) = child.kill().await {
                    error!(target: "omnisim::chain", chain_id, %err, "failed to kill chain node");
                }
                *state.lock().unwrap_or_else(|e| e.into_inner()) = ChainLifecycleState::Stopped;
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<(), ChainProcessError> {
        let chain_id = self.cfg.chain_id;
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return Err(ChainProcessError::AlreadyStopped { chain_id });
        };

        self.set_state(ChainLifecycleState::Stopping);
        info!(target: "omnisim::chain", chain_id, "stopping chain node");
        let result = child
            .kill()
            .await
            .map_err(|source| ChainProcessError::Kill { chain_id, source });
        self.set_state(ChainLifecycleState::Stopped);
        *self.genesis_file.lock().unwrap_or_else(|e| e.into_inner()) = None;
        result
    }

    async fn wait_until_ready(&self, cancel: CancellationToken) -> Result<(), ChainProcessError> {
        let chain_id = self.cfg.chain_id;
        let deadline = tokio::time::sleep(self.cfg.ready_timeout);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(self.cfg.poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ChainProcessError::Cancelled { chain_id, operation: "waiting for readiness" });
                }
                _ = &mut deadline => {
                    return Err(ChainProcessError::ReadyTimeout { chain_id, timeout: self.cfg.ready_timeout });
                }
                _ = ticker.tick() => {
                    let version: String = match self.rpc.request_noparams("web3_clientVersion").await {
                        Ok(version) => version,
                        Err(err) => {
                            debug!(target: "omnisim::chain", chain_id, %err, "liveness probe not answered yet");
                            continue;
                        }
                    };
                    if version.starts_with("anvil") {
                        debug!(target: "omnisim::chain", chain_id, version, "chain node ready");
                        return Ok(());
                    }
                    warn!(target: "omnisim::chain", chain_id, version, "unexpected client behind chain endpoint");
                    return Err(ChainProcessError::UnexpectedClientVersion { chain_id, version });
                }
            }
        }
    }

    async fn set_interval_mining(
        &self,
        interval_secs: u64,
        cancel: CancellationToken,
    ) -> Result<(), ChainProcessError> {
        let chain_id = self.cfg.chain_id;
        debug!(target: "omnisim::chain", chain_id, interval_secs, "enabling interval mining");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(ChainProcessError::Cancelled { chain_id, operation: "enabling interval mining" })
            }
            result = self.rpc.request::<_, serde_json::Value>("evm_setIntervalMining", (interval_secs,)) => {
                result
                    .map(|_| ())
                    .map_err(|source| ChainProcessError::Rpc { chain_id, method: "evm_setIntervalMining", source })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(chain_id: u64) -> ChainConfig {
        let mut cfg = ChainConfig::new(chain_id, format!("test-{chain_id}"));
        cfg.ready_timeout = std::time::Duration::from_millis(300);
        cfg.poll_interval = std::time::Duration::from_millis(50);
        cfg
    }

    #[test]
    fn resolves_ephemeral_port_at_construction() {
        let chain = SimChain::new(test_config(901)).unwrap();
        assert_ne!(chain.port(), 0);
        assert!(chain.endpoint().starts_with("http://127.0.0.1:"));
        assert!(chain.ws_endpoint().starts_with("ws://127.0.0.1:"));
    }

    #[test]
    fn descriptor_reflects_config() {
        let chain = SimChain::new(test_config(901)).unwrap();
        let descriptor = chain.descriptor();
        assert_eq!(descriptor.chain_id, 901);
        assert_eq!(descriptor.name, "test-901");
        assert_eq!(descriptor.port, chain.port());
        assert_eq!(descriptor.rpc_url, chain.endpoint());
    }

    #[tokio::test]
    async fn stop_before_start_reports_already_stopped() {
        let chain = SimChain::new(test_config(901)).unwrap();
        assert!(matches!(
            chain.stop().await,
            Err(ChainProcessError::AlreadyStopped { chain_id: 901 })
        ));
    }

    #[tokio::test]
    async fn readiness_times_out_against_dead_endpoint() {
        // Nothing listens on the reserved port, so every probe fails until
        // the deadline passes.
        let chain = SimChain::new(test_config(901)).unwrap();
        let start = std::time::Instant::now();
        let err = chain.wait_until_ready(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ChainProcessError::ReadyTimeout { chain_id: 901, .. }));
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn readiness_respects_cancellation() {
        let chain = SimChain::new(test_config(901)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = chain.wait_until_ready(cancel).await.unwrap_err();
        assert!(matches!(err, ChainProcessError::Cancelled { chain_id: 901, .. }));
    }

    #[tokio::test]
    async fn interval_mining_respects_cancellation() {
        // Nothing listens on the reserved port; the cancelled token must win
        // over the doomed RPC.
        let chain = SimChain::new(test_config(901)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = chain.set_interval_mining(2, cancel).await.unwrap_err();
        assert!(matches!(
            err,
            ChainProcessError::Cancelled { chain_id: 901, operation: "enabling interval mining" }
        ));
    }
}
