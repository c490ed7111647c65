//! Startup sequence: configuration, service wiring, listeners.
//!
//! Order matters: the chains-config is loaded and resolved, the service is
//! built and registered, and only then do the listeners bind. Any failure in
//! that sequence propagates out so the process exits non-zero; the module
//! itself is NOT loaded here, only on the first call that needs it.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::endpoints::{ChainConfig, Endpoints};
use crate::host::cli::Cli;
use crate::host::service_handle::ServiceHandle;
use crate::loader::DylibLoader;
use crate::metrics::{self, RpcMetrics, METRICS_PORT};
use crate::rpc::RpcServer;
use crate::service::{FullProcessorService, ProcessorService};

/// Load and parse the chains-config file.
pub fn load_chains_config(path: &Path) -> Result<HashMap<String, ChainConfig>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("cannot read chains config {}", path.display()))?;
    let config = serde_json::from_str(&data)
        .with_context(|| format!("invalid chains config {}", path.display()))?;
    Ok(config)
}

/// The wired host process.
pub struct Host;

impl Host {
    /// Start the RPC server and the metrics exporter; returns the handle
    /// used to shut the host down.
    pub async fn start(cli: Cli) -> Result<ServiceHandle> {
        Self::start_with_metrics_port(cli, METRICS_PORT).await
    }

    /// As [`start`](Self::start) with an explicit exporter port.
    pub async fn start_with_metrics_port(cli: Cli, metrics_port: u16) -> Result<ServiceHandle> {
        let config = load_chains_config(&cli.chains_config)?;
        let endpoints = Arc::new(Endpoints::from_chains_config(
            &config,
            cli.concurrency,
            cli.chainquery_server.clone(),
            cli.pricefeed_server.clone(),
        ));
        info!("resolved endpoints for {} chains", endpoints.chain_count());

        let metrics = Arc::new(RpcMetrics::new().context("failed to build RPC metrics")?);
        metrics.set_configured_chains(endpoints.chain_count());

        let mut server = RpcServer::new(cli.port, metrics.clone());
        let loader = Arc::new(DylibLoader::new(cli.target.clone()));
        let base = ProcessorService::new(loader, endpoints, server.shutdown_hook());
        server.register(Arc::new(FullProcessorService::new(base)));

        let mut handle = ServiceHandle::new(server.shutdown_handle());
        handle.attach(server.listen().await?);

        // The exporter is deliberately not attached: it serves until the
        // process exits, outliving a graceful RPC shutdown.
        let _exporter = metrics::listen(metrics, metrics_port).await?;

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::logging::LogFormat;
    use std::io::Write;
    use std::path::PathBuf;

    fn test_cli(chains_config: PathBuf, port: u16) -> Cli {
        Cli {
            target: "processor.so".to_string(),
            port,
            concurrency: 4,
            chains_config,
            chainquery_server: String::new(),
            pricefeed_server: String::new(),
            log_format: LogFormat::Console,
            debug: false,
        }
    }

    #[test]
    fn test_load_chains_config_missing_file_fails() {
        let err = load_chains_config(Path::new("/nonexistent/chains.json")).unwrap_err();
        assert!(err.to_string().contains("cannot read chains config"));
    }

    #[test]
    fn test_load_chains_config_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_chains_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("invalid chains config"));
    }

    #[tokio::test]
    async fn test_start_fails_before_bind_on_missing_config() {
        let cli = test_cli(PathBuf::from("/nonexistent/chains.json"), 0);
        assert!(Host::start_with_metrics_port(cli, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"1":{{"ChainServer":"a:50051"}}}}"#).unwrap();

        // port 0 everywhere so parallel tests never collide
        let cli = test_cli(file.path().to_path_buf(), 0);
        let handle = Host::start_with_metrics_port(cli, 0).await.unwrap();
        handle.shutdown().await.unwrap();
    }
}
