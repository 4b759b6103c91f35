//! The `omnisim` binary: a local multi-chain network with cross-domain
//! message indexing and optional auto-relay.

use clap::Parser;

mod cli;
use cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.init_telemetry()?;
    cli.run()
}
