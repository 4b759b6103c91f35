//! CLI flags and the run loop.

use anyhow::anyhow;
use clap::Parser;
use omnisim_chains::ChainConfig;
use omnisim_orchestrator::{NetworkConfig, Orchestrator};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs a local L1 plus a set of L2 chains, each fronted by an RPC proxy,
/// with cross-domain messages indexed continuously and optionally relayed.
#[derive(Debug, Parser)]
#[command(name = "omnisim", version, about)]
pub(crate) struct Cli {
    /// Chain ID of the L1 chain.
    #[arg(long = "l1.chain-id", default_value_t = 900, env = "OMNISIM_L1_CHAIN_ID")]
    pub l1_chain_id: u64,

    /// Port the L1 chain listens on.
    #[arg(long = "l1.port", default_value_t = 8545, env = "OMNISIM_L1_PORT")]
    pub l1_port: u16,

    /// Chain IDs of the L2 chains, comma separated.
    #[arg(
        long = "l2.chain-ids",
        value_delimiter = ',',
        default_values_t = [901u64, 902],
        env = "OMNISIM_L2_CHAIN_IDS"
    )]
    pub l2_chain_ids: Vec<u64>,

    /// First L2 proxy port; proxies bind consecutive ports from here.
    #[arg(long = "l2.starting.port", default_value_t = 9545, env = "OMNISIM_L2_STARTING_PORT")]
    pub l2_starting_port: u16,

    /// Automatically relay indexed messages to their destination chains.
    #[arg(long = "interop.autorelay", default_value_t = false, env = "OMNISIM_INTEROP_AUTORELAY")]
    pub interop_autorelay: bool,

    /// Verbosity level (-v debug, -vv trace).
    #[arg(short, action = clap::ArgAction::Count)]
    pub v: u8,
}

impl Cli {
    /// Initializes the tracing subscriber, honoring `RUST_LOG` over the
    /// verbosity flag.
    pub(crate) fn init_telemetry(&self) -> anyhow::Result<()> {
        let default_level = match self.v {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }

    fn network_config(&self) -> NetworkConfig {
        let l1 = ChainConfig::new(self.l1_chain_id, "l1").with_port(self.l1_port);
        let l2s = self
            .l2_chain_ids
            .iter()
            .map(|chain_id| ChainConfig::new(*chain_id, format!("l2-{chain_id}")))
            .collect();

        let mut config = NetworkConfig::new(l1, l2s);
        config.l2_starting_port = self.l2_starting_port;
        config.enable_auto_relay = self.interop_autorelay;
        config
    }

    /// Brings the network up and runs it until ctrl-c.
    pub(crate) fn run(self) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
        runtime.block_on(async move {
            let orchestrator = Orchestrator::from_config(self.network_config())?;
            orchestrator.start().await?;
            println!("{}", orchestrator.config_string());

            tokio::signal::ctrl_c().await?;
            info!(target: "omnisim::cli", "ctrl-c received, shutting down");
            orchestrator.stop().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_layout() {
        let cli = Cli::try_parse_from(["omnisim"]).unwrap();
        assert_eq!(cli.l1_chain_id, 900);
        assert_eq!(cli.l1_port, 8545);
        assert_eq!(cli.l2_chain_ids, vec![901, 902]);
        assert_eq!(cli.l2_starting_port, 9545);
        assert!(!cli.interop_autorelay);
    }

    #[test]
    fn parses_comma_separated_chain_ids() {
        let cli = Cli::try_parse_from([
            "omnisim",
            "--l2.chain-ids",
            "10,20,30",
            "--interop.autorelay",
        ])
        .unwrap();
        assert_eq!(cli.l2_chain_ids, vec![10, 20, 30]);
        assert!(cli.interop_autorelay);

        let config = cli.network_config();
        assert_eq!(config.l2s.len(), 3);
        assert!(config.enable_auto_relay);
        config.check().unwrap();
    }
}
