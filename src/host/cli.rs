use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::host::Host;
use crate::utils::logging::{init_logging, LogFormat};

/// CLI for the processor host.
#[derive(Debug, Parser)]
#[clap(name = "chainhost", version)]
pub struct Cli {
    /// Processor module to host (path to a built processor library)
    pub target: String,

    /// RPC listen port
    #[clap(short, long, default_value_t = 4000)]
    pub port: u16,

    /// Upper bound on simultaneously processed binding batches
    #[clap(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Path to the per-chain endpoint configuration
    #[clap(short = 'c', long, default_value = "chains-config.json")]
    pub chains_config: PathBuf,

    /// Chain query service address handed to the module
    #[clap(long, default_value = "")]
    pub chainquery_server: String,

    /// Price feed service address handed to the module
    #[clap(long, default_value = "")]
    pub pricefeed_server: String,

    /// Log output format
    #[clap(long, value_enum, default_value_t = LogFormat::Console)]
    pub log_format: LogFormat,

    /// Enable debug logging
    #[clap(long)]
    pub debug: bool,
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.debug);
    if cli.debug {
        debug!("starting host with target {}", cli.target);
    }

    let handle = Host::start(cli).await?;
    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.shutdown().await?;
    info!("host stopped");
    Ok(())
}
