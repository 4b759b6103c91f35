//! The orchestrator: owns every component of the simulated network and
//! drives their lifecycles as one unit.

use crate::{NetworkConfig, OrchestratorError, ShutdownError};
use omnisim_chains::{
    ChainProcess, ChainProcessError, ProxyConfig, ProxyError, ProxyProcess, RpcProxy, SimChain,
};
use omnisim_interop::{
    CrossDomainMessageIndexer, CrossDomainMessageRelayer, LogSource, MessageIndex,
    MessengerSubmitter, ProviderLogSource, RelaySubmitter,
};
use omnisim_types::{ChainDescriptor, ChainLifecycleState};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives the full network lifecycle: the L1 chain, every L2 chain and its
/// fronting proxy, the cross-domain message indexer, and the optional
/// auto-relayer.
///
/// Start is fail-fast: the first component that fails aborts the start, and
/// everything already running is stopped before the error is returned. Stop
/// is best-effort: it walks every component in reverse start order,
/// continues through failures, and reports them aggregated.
///
/// Generic over the chain and proxy implementations so the coordination
/// logic is testable without real processes.
#[derive(Debug)]
pub struct Orchestrator<C = SimChain, P = RpcProxy> {
    config: NetworkConfig,
    cancel: CancellationToken,
    started: AtomicBool,

    l1: Arc<C>,
    l2_chains: BTreeMap<u64, Arc<C>>,
    proxies: BTreeMap<u64, Arc<P>>,
    // Mining interval per chain id, taken from the chain configs.
    intervals: BTreeMap<u64, u64>,

    indexer: CrossDomainMessageIndexer,
    relayer: Option<CrossDomainMessageRelayer>,
}

impl Orchestrator {
    /// Builds the production component set from a validated config: one
    /// `anvil`-backed chain per entry, one proxy per L2. The L2 nodes run on
    /// ephemeral ports behind their proxies; proxies bind consecutive ports
    /// from the configured starting port.
    ///
    /// Chains without an explicit genesis get the embedded defaults: the L2
    /// genesis carries the cross-domain messenger predeploy, which the
    /// indexer and relayer require.
    pub fn from_config(mut config: NetworkConfig) -> Result<Self, OrchestratorError> {
        config.check()?;

        config.l1.genesis.get_or_insert_with(|| crate::L1_GENESIS.to_vec());
        for l2 in &mut config.l2s {
            l2.genesis.get_or_insert_with(|| crate::L2_GENESIS.to_vec());
        }

        let l1 = Arc::new(SimChain::new(config.l1.clone())?);
        let mut l2_chains = BTreeMap::new();
        let mut proxies = BTreeMap::new();
        for (position, l2) in config.l2s.iter().enumerate() {
            let mut node_cfg = l2.clone();
            node_cfg.port = 0;
            let chain = Arc::new(SimChain::new(node_cfg)?);

            let proxy_port = if config.l2_starting_port == 0 {
                0
            } else {
                config.l2_starting_port.saturating_add(position as u16)
            };
            let proxy = Arc::new(RpcProxy::new(
                ProxyConfig::new(l2.chain_id, l2.name.clone(), proxy_port),
                chain.endpoint(),
            )?);

            l2_chains.insert(l2.chain_id, chain);
            proxies.insert(l2.chain_id, proxy);
        }

        Ok(Self::with_components(config, l1, l2_chains, proxies))
    }
}

impl<C, P> Orchestrator<C, P>
where
    C: ChainProcess + 'static,
    P: ProxyProcess + 'static,
{
    /// Assembles an orchestrator from pre-built components. The maps are
    /// fixed for the orchestrator's lifetime.
    pub fn with_components(
        config: NetworkConfig,
        l1: Arc<C>,
        l2_chains: BTreeMap<u64, Arc<C>>,
        proxies: BTreeMap<u64, Arc<P>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let indexer = CrossDomainMessageIndexer::new(cancel.child_token());
        let relayer = config
            .enable_auto_relay
            .then(|| CrossDomainMessageRelayer::new(indexer.index(), cancel.child_token()));

        let mut intervals = BTreeMap::new();
        intervals.insert(config.l1.chain_id, config.l1.block_interval_secs);
        for l2 in &config.l2s {
            intervals.insert(l2.chain_id, l2.block_interval_secs);
        }

        Self {
            config,
            cancel,
            started: AtomicBool::new(false),
            l1,
            l2_chains,
            proxies,
            intervals,
            indexer,
            relayer,
        }
    }

    /// Brings up the whole network: L1, every L2 chain, every proxy,
    /// readiness and mining fan-outs, then the interop components. On any
    /// failure everything already running is stopped before returning.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(OrchestratorError::AlreadyStarted);
        }

        info!(
            target: "omnisim::orchestrator",
            l1_chain_id = self.config.l1.chain_id,
            l2_count = self.l2_chains.len(),
            "starting local multi-chain network"
        );

        let result = self.start_network().await;
        let result = match result {
            Ok(()) => self.start_interop().await,
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            error!(target: "omnisim::orchestrator", %err, "startup failed, stopping components that already started");
            if let Err(stop_err) = self.stop().await {
                warn!(target: "omnisim::orchestrator", %stop_err, "teardown after failed start reported failures");
            }
            return Err(err);
        }

        info!(target: "omnisim::orchestrator", "network is up");
        Ok(())
    }

    async fn start_network(&self) -> Result<(), OrchestratorError> {
        self.l1.start(self.cancel.child_token()).await?;
        for chain in self.l2_chains.values() {
            chain.start(self.cancel.child_token()).await?;
        }
        for proxy in self.proxies.values() {
            proxy.start(self.cancel.child_token()).await?;
        }

        self.wait_all_ready().await?;
        self.kick_off_mining().await?;
        Ok(())
    }

    async fn start_interop(&self) -> Result<(), OrchestratorError> {
        let mut sources: HashMap<u64, Arc<dyn LogSource>> = HashMap::new();
        for (chain_id, chain) in &self.l2_chains {
            let source = ProviderLogSource::connect(*chain_id, &chain.ws_endpoint()).await?;
            sources.insert(*chain_id, Arc::new(source));
        }
        self.indexer.start(sources).await?;

        if let Some(relayer) = &self.relayer {
            let mut submitters: HashMap<u64, Arc<dyn RelaySubmitter>> = HashMap::new();
            for (chain_id, proxy) in &self.proxies {
                let submitter = MessengerSubmitter::connect(*chain_id, &proxy.endpoint()).await?;
                submitters.insert(*chain_id, Arc::new(submitter));
            }
            relayer.start(submitters).await?;
        }
        Ok(())
    }

    /// Waits for every chain to answer its liveness probe. The first failure
    /// cancels the remaining waits; every task is still joined, so no result
    /// is lost.
    async fn wait_all_ready(&self) -> Result<(), OrchestratorError> {
        let gate = self.cancel.child_token();
        let mut tasks: JoinSet<Result<(), ChainProcessError>> = JoinSet::new();
        for chain in self.all_chains() {
            let token = gate.clone();
            tasks.spawn(async move { chain.wait_until_ready(token).await });
        }
        collect_fan_out(tasks, &gate).await
    }

    /// Enables interval mining on every chain with its configured period.
    /// The first failure cancels the remaining calls through the shared gate.
    async fn kick_off_mining(&self) -> Result<(), OrchestratorError> {
        let gate = self.cancel.child_token();
        let mut tasks: JoinSet<Result<(), ChainProcessError>> = JoinSet::new();
        for chain in self.all_chains() {
            let interval = self.intervals.get(&chain.chain_id()).copied().unwrap_or(2);
            let token = gate.clone();
            tasks.spawn(async move { chain.set_interval_mining(interval, token).await });
        }
        collect_fan_out(tasks, &gate).await
    }

    fn all_chains(&self) -> Vec<Arc<C>> {
        let mut chains = Vec::with_capacity(self.l2_chains.len() + 1);
        chains.push(Arc::clone(&self.l1));
        chains.extend(self.l2_chains.values().cloned());
        chains
    }

    /// Stops every component in reverse start order: relayer, indexer,
    /// proxies, L2 chains, L1. Continues through failures and reports them
    /// all. Components that never started are skipped.
    pub async fn stop(&self) -> Result<(), ShutdownError> {
        info!(target: "omnisim::orchestrator", "stopping network");
        let mut failures = Vec::new();

        if let Some(relayer) = &self.relayer {
            if let Err(err) = relayer.stop(STOP_TIMEOUT).await {
                failures.push(err.to_string());
            }
        }
        if let Err(err) = self.indexer.stop(STOP_TIMEOUT).await {
            failures.push(err.to_string());
        }

        for proxy in self.proxies.values().rev() {
            if proxy.state() == ChainLifecycleState::NotStarted {
                continue;
            }
            if let Err(err) = proxy.stop().await {
                if !matches!(err, ProxyError::AlreadyStopped { .. }) {
                    failures.push(err.to_string());
                }
            }
        }
        for chain in self.l2_chains.values().rev() {
            if chain.state() == ChainLifecycleState::NotStarted {
                continue;
            }
            if let Err(err) = chain.stop().await {
                if !matches!(err, ChainProcessError::AlreadyStopped { .. }) {
                    failures.push(err.to_string());
                }
            }
        }
        if self.l1.state() != ChainLifecycleState::NotStarted {
            if let Err(err) = self.l1.stop().await {
                if !matches!(err, ChainProcessError::AlreadyStopped { .. }) {
                    failures.push(err.to_string());
                }
            }
        }

        // Backstop for anything still attached to the run token.
        self.cancel.cancel();

        if failures.is_empty() {
            info!(target: "omnisim::orchestrator", "network stopped");
            Ok(())
        } else {
            Err(ShutdownError { failures })
        }
    }

    /// Resolves the user-facing endpoint for a chain: the L1 node itself, or
    /// the fronting proxy for an L2.
    pub fn endpoint(&self, chain_id: u64) -> Result<String, OrchestratorError> {
        if chain_id == self.config.l1.chain_id {
            return Ok(self.l1.endpoint());
        }
        self.proxies
            .get(&chain_id)
            .map(|proxy| proxy.endpoint())
            .ok_or(OrchestratorError::UnknownChain { chain_id })
    }

    /// Descriptor of the L1 chain.
    pub fn l1_descriptor(&self) -> ChainDescriptor {
        self.l1.descriptor()
    }

    /// User-facing descriptors of the L2 chains: endpoint and port are the
    /// fronting proxy's. Sorted by port, then chain ID.
    pub fn l2_descriptors(&self) -> Vec<ChainDescriptor> {
        let mut descriptors: Vec<ChainDescriptor> = self
            .l2_chains
            .iter()
            .map(|(chain_id, chain)| {
                let mut descriptor = chain.descriptor();
                if let Some(proxy) = self.proxies.get(chain_id) {
                    descriptor.rpc_url = proxy.endpoint();
                    descriptor.port = proxy.config().port;
                }
                descriptor
            })
            .collect();
        descriptors.sort_by_key(|d| (d.port, d.chain_id));
        descriptors
    }

    /// Human-readable summary of the running network, deterministic across
    /// runs with the same configuration.
    pub fn config_string(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let l1 = self.l1_descriptor();
        let _ = writeln!(out, "Chain Configuration");
        let _ = writeln!(out, "===================");
        let _ = writeln!(
            out,
            "L1: Name: {}  Chain ID: {}  RPC: {}  LogPath: {}",
            l1.name,
            l1.chain_id,
            l1.rpc_url,
            l1.log_path.display()
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "L2:");
        for descriptor in self.l2_descriptors() {
            let _ = writeln!(
                out,
                "* Name: {}  Chain ID: {}  RPC: {}  LogPath: {}",
                descriptor.name,
                descriptor.chain_id,
                descriptor.rpc_url,
                descriptor.log_path.display()
            );
            if let Some(proxy) = self.proxies.get(&descriptor.chain_id) {
                let addresses = proxy.config().l1_addresses;
                let _ = writeln!(
                    out,
                    "  Portal: {}  L1CrossDomainMessenger: {}  L1StandardBridge: {}",
                    addresses.portal,
                    addresses.l1_cross_domain_messenger,
                    addresses.l1_standard_bridge
                );
            }
        }
        out
    }

    /// Shared handle to the cross-domain message index.
    pub fn message_index(&self) -> Arc<MessageIndex> {
        self.indexer.index()
    }

    /// Whether every indexer subscription is healthy.
    pub fn healthy(&self) -> bool {
        self.indexer.healthy()
    }
}

/// Joins every fan-out task, cancelling the shared gate on the first failure
/// and returning that first failure once all tasks have settled.
async fn collect_fan_out(
    mut tasks: JoinSet<Result<(), ChainProcessError>>,
    gate: &CancellationToken,
) -> Result<(), OrchestratorError> {
    let mut first: Option<OrchestratorError> = None;
    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result.map_err(OrchestratorError::Chain),
            Err(err) => Err(OrchestratorError::Task { message: err.to_string() }),
        };
        if let Err(err) = result {
            gate.cancel();
            if first.is_none() {
                first = Some(err);
            }
        }
    }
    first.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use omnisim_chains::{BridgeAddresses, ChainConfig};
    use std::path::PathBuf;

    mock! {
        #[derive(Debug)]
        pub Chain {}

        #[async_trait]
        impl ChainProcess for Chain {
            fn chain_id(&self) -> u64;
            fn descriptor(&self) -> ChainDescriptor;
            fn endpoint(&self) -> String;
            fn ws_endpoint(&self) -> String;
            fn log_path(&self) -> PathBuf;
            fn state(&self) -> ChainLifecycleState;
            async fn start(&self, cancel: CancellationToken) -> Result<(), ChainProcessError>;
            async fn stop(&self) -> Result<(), ChainProcessError>;
            async fn wait_until_ready(&self, cancel: CancellationToken) -> Result<(), ChainProcessError>;
            async fn set_interval_mining(&self, interval_secs: u64, cancel: CancellationToken) -> Result<(), ChainProcessError>;
        }
    }

    mock! {
        #[derive(Debug)]
        pub Proxy {}

        #[async_trait]
        impl ProxyProcess for Proxy {
            fn chain_id(&self) -> u64;
            fn endpoint(&self) -> String;
            fn config(&self) -> ProxyConfig;
            fn state(&self) -> ChainLifecycleState;
            async fn start(&self, cancel: CancellationToken) -> Result<(), ProxyError>;
            async fn stop(&self) -> Result<(), ProxyError>;
        }
    }

    fn network_config(l1_id: u64, l2_ids: &[u64]) -> NetworkConfig {
        NetworkConfig::new(
            ChainConfig::new(l1_id, "l1"),
            l2_ids.iter().map(|id| ChainConfig::new(*id, format!("l2-{id}"))).collect(),
        )
    }

    fn chain(chain_id: u64) -> MockChain {
        let mut chain = MockChain::new();
        chain.expect_chain_id().return_const(chain_id);
        chain.expect_endpoint().return_const(format!("http://127.0.0.1:{chain_id}"));
        chain
    }

    fn idle_proxy(chain_id: u64) -> MockProxy {
        let mut proxy = MockProxy::new();
        proxy.expect_chain_id().return_const(chain_id);
        proxy.expect_state().return_const(ChainLifecycleState::NotStarted);
        proxy
    }

    fn build(
        config: NetworkConfig,
        l1: MockChain,
        l2s: Vec<(u64, MockChain)>,
        proxies: Vec<(u64, MockProxy)>,
    ) -> Orchestrator<MockChain, MockProxy> {
        Orchestrator::with_components(
            config,
            Arc::new(l1),
            l2s.into_iter().map(|(id, c)| (id, Arc::new(c))).collect(),
            proxies.into_iter().map(|(id, p)| (id, Arc::new(p))).collect(),
        )
    }

    #[tokio::test]
    async fn l2_start_failure_stops_everything_already_started() {
        let mut l1 = chain(900);
        l1.expect_start().times(1).returning(|_| Ok(()));
        l1.expect_state().return_const(ChainLifecycleState::Running);
        l1.expect_stop().times(1).returning(|| Ok(()));

        let mut first = chain(901);
        first.expect_start().times(1).returning(|_| Ok(()));
        first.expect_state().return_const(ChainLifecycleState::Running);
        first.expect_stop().times(1).returning(|| Ok(()));

        let mut second = chain(902);
        second.expect_start().times(1).returning(|_| {
            Err(ChainProcessError::Spawn { chain_id: 902, source: std::io::Error::other("boom") })
        });
        second.expect_state().return_const(ChainLifecycleState::NotStarted);

        let orchestrator = build(
            network_config(900, &[901, 902]),
            l1,
            vec![(901, first), (902, second)],
            vec![(901, idle_proxy(901)), (902, idle_proxy(902))],
        );

        let err = orchestrator.start().await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Chain(ChainProcessError::Spawn { chain_id: 902, .. })
        ));
    }

    #[tokio::test]
    async fn readiness_failure_surfaces_first_error_and_tears_down() {
        let mut l1 = chain(900);
        l1.expect_start().times(1).returning(|_| Ok(()));
        l1.expect_wait_until_ready().returning(|_| Ok(()));
        l1.expect_state().return_const(ChainLifecycleState::Running);
        l1.expect_stop().times(1).returning(|| Ok(()));

        let mut slow = chain(901);
        slow.expect_start().times(1).returning(|_| Ok(()));
        slow.expect_wait_until_ready().times(1).returning(|_| {
            Err(ChainProcessError::ReadyTimeout { chain_id: 901, timeout: Duration::from_secs(10) })
        });
        slow.expect_state().return_const(ChainLifecycleState::Running);
        slow.expect_stop().times(1).returning(|| Ok(()));

        let mut proxy = MockProxy::new();
        proxy.expect_chain_id().return_const(901u64);
        proxy.expect_start().times(1).returning(|_| Ok(()));
        proxy.expect_state().return_const(ChainLifecycleState::Running);
        proxy.expect_stop().times(1).returning(|| Ok(()));

        let orchestrator = build(
            network_config(900, &[901]),
            l1,
            vec![(901, slow)],
            vec![(901, proxy)],
        );

        let err = orchestrator.start().await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Chain(ChainProcessError::ReadyTimeout { chain_id: 901, .. })
        ));
    }

    #[tokio::test]
    async fn mining_fan_out_uses_each_chains_interval() {
        let mut config = network_config(900, &[901]);
        config.l1.block_interval_secs = 4;
        config.l2s[0].block_interval_secs = 3;

        let mut l1 = chain(900);
        l1.expect_start().times(1).returning(|_| Ok(()));
        l1.expect_wait_until_ready().times(1).returning(|_| Ok(()));
        // Each chain gets its own interval and a live cancellation lever.
        l1.expect_set_interval_mining()
            .times(1)
            .withf(|interval, cancel| *interval == 4 && !cancel.is_cancelled())
            .returning(|_, _| Ok(()));

        let mut l2 = chain(901);
        l2.expect_start().times(1).returning(|_| Ok(()));
        l2.expect_wait_until_ready().times(1).returning(|_| Ok(()));
        l2.expect_set_interval_mining()
            .times(1)
            .withf(|interval, cancel| *interval == 3 && !cancel.is_cancelled())
            .returning(|_, _| Ok(()));

        let mut proxy = MockProxy::new();
        proxy.expect_chain_id().return_const(901u64);
        proxy.expect_start().times(1).returning(|_| Ok(()));

        let orchestrator = build(config, l1, vec![(901, l2)], vec![(901, proxy)]);
        orchestrator.start_network().await.unwrap();
    }

    #[tokio::test]
    async fn stop_continues_through_failures_and_aggregates_them() {
        let mut l1 = chain(900);
        l1.expect_state().return_const(ChainLifecycleState::Running);
        l1.expect_stop().times(1).returning(|| {
            Err(ChainProcessError::Kill { chain_id: 900, source: std::io::Error::other("kill") })
        });

        let mut l2 = chain(901);
        l2.expect_state().return_const(ChainLifecycleState::Running);
        l2.expect_stop().times(1).returning(|| {
            Err(ChainProcessError::Kill { chain_id: 901, source: std::io::Error::other("kill") })
        });

        let mut proxy = MockProxy::new();
        proxy.expect_chain_id().return_const(901u64);
        proxy.expect_state().return_const(ChainLifecycleState::Running);
        proxy.expect_stop().times(1).returning(|| {
            Err(ProxyError::StopJoin { chain_id: 901, message: "join".to_string() })
        });

        let orchestrator =
            build(network_config(900, &[901]), l1, vec![(901, l2)], vec![(901, proxy)]);

        let err = orchestrator.stop().await.unwrap_err();
        assert_eq!(err.failures.len(), 3);
        // Reverse start order: proxy, then L2, then L1.
        assert!(err.failures[0].contains("proxy"));
        assert!(err.failures[2].contains("900"));
    }

    #[tokio::test]
    async fn already_stopped_components_do_not_pollute_shutdown_errors() {
        let mut l1 = chain(900);
        l1.expect_state().return_const(ChainLifecycleState::Stopped);
        l1.expect_stop()
            .times(1)
            .returning(|| Err(ChainProcessError::AlreadyStopped { chain_id: 900 }));

        let mut l2 = chain(901);
        l2.expect_state().return_const(ChainLifecycleState::Stopped);
        l2.expect_stop()
            .times(1)
            .returning(|| Err(ChainProcessError::AlreadyStopped { chain_id: 901 }));

        let orchestrator = build(
            network_config(900, &[901]),
            l1,
            vec![(901, l2)],
            vec![(901, idle_proxy(901))],
        );

        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn endpoint_resolution_prefers_proxies_for_l2s() {
        let l1 = chain(900);
        let l2 = chain(901);
        let mut proxy = MockProxy::new();
        proxy.expect_chain_id().return_const(901u64);
        proxy.expect_endpoint().return_const("http://127.0.0.1:9545".to_string());

        let orchestrator =
            build(network_config(900, &[901]), l1, vec![(901, l2)], vec![(901, proxy)]);

        assert_eq!(orchestrator.endpoint(900).unwrap(), "http://127.0.0.1:900");
        assert_eq!(orchestrator.endpoint(901).unwrap(), "http://127.0.0.1:9545");
        assert!(matches!(
            orchestrator.endpoint(999),
            Err(OrchestratorError::UnknownChain { chain_id: 999 })
        ));
    }

    #[tokio::test]
    async fn config_string_is_sorted_by_proxy_port() {
        fn descriptor(chain_id: u64, name: &str) -> ChainDescriptor {
            ChainDescriptor {
                chain_id,
                name: name.to_string(),
                rpc_url: format!("http://127.0.0.1:{chain_id}"),
                log_path: PathBuf::from(format!("/tmp/chain-{chain_id}.log")),
                port: chain_id as u16,
            }
        }

        let mut l1 = chain(900);
        l1.expect_descriptor().returning(|| descriptor(900, "l1"));

        let mut alpha = chain(901);
        alpha.expect_descriptor().returning(|| descriptor(901, "alpha"));
        let mut beta = chain(902);
        beta.expect_descriptor().returning(|| descriptor(902, "beta"));

        // beta's proxy binds the lower port, so it lists first.
        let mut alpha_proxy = MockProxy::new();
        alpha_proxy.expect_chain_id().return_const(901u64);
        alpha_proxy.expect_endpoint().return_const("http://127.0.0.1:9546".to_string());
        alpha_proxy.expect_config().returning(|| ProxyConfig::new(901, "alpha", 9546));

        let mut beta_proxy = MockProxy::new();
        beta_proxy.expect_chain_id().return_const(902u64);
        beta_proxy.expect_endpoint().return_const("http://127.0.0.1:9545".to_string());
        beta_proxy.expect_config().returning(|| ProxyConfig::new(902, "beta", 9545));

        let orchestrator = build(
            network_config(900, &[901, 902]),
            l1,
            vec![(901, alpha), (902, beta)],
            vec![(901, alpha_proxy), (902, beta_proxy)],
        );

        let rendered = orchestrator.config_string();
        let beta_at = rendered.find("Name: beta").unwrap();
        let alpha_at = rendered.find("Name: alpha").unwrap();
        assert!(beta_at < alpha_at);
        assert!(rendered.contains(&BridgeAddresses::for_chain(901).portal.to_string()));

        let descriptors = orchestrator.l2_descriptors();
        assert_eq!(descriptors[0].chain_id, 902);
        assert_eq!(descriptors[0].rpc_url, "http://127.0.0.1:9545");
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let mut l1 = chain(900);
        l1.expect_start().times(1).returning(|_| {
            Err(ChainProcessError::Spawn { chain_id: 900, source: std::io::Error::other("boom") })
        });
        l1.expect_state().return_const(ChainLifecycleState::NotStarted);

        let l2 = {
            let mut c = chain(901);
            c.expect_state().return_const(ChainLifecycleState::NotStarted);
            c
        };

        let orchestrator = build(
            network_config(900, &[901]),
            l1,
            vec![(901, l2)],
            vec![(901, idle_proxy(901))],
        );

        assert!(orchestrator.start().await.is_err());
        assert!(matches!(
            orchestrator.start().await,
            Err(OrchestratorError::AlreadyStarted)
        ));
    }

    #[test]
    fn from_config_fills_in_default_geneses() {
        let mut config = network_config(900, &[901, 902]);
        config.l2_starting_port = 0;

        let orchestrator = Orchestrator::from_config(config).unwrap();
        assert_eq!(orchestrator.config.l1.genesis.as_deref(), Some(crate::L1_GENESIS));
        for l2 in &orchestrator.config.l2s {
            assert_eq!(l2.genesis.as_deref(), Some(crate::L2_GENESIS));
        }
    }

    #[test]
    fn from_config_keeps_explicit_geneses() {
        let mut config = network_config(900, &[901]);
        config.l2_starting_port = 0;
        config.l2s[0] = config.l2s[0].clone().with_genesis(b"{}".to_vec());

        let orchestrator = Orchestrator::from_config(config).unwrap();
        assert_eq!(orchestrator.config.l2s[0].genesis.as_deref(), Some(b"{}".as_slice()));
    }
}
