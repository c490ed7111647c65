//! Endpoint registry: read-after-init mapping from chain id to network endpoint.
//!
//! Built once at startup from the chains-config file, then shared as
//! `Arc<Endpoints>` with every component that consults it. Nothing writes to
//! the registry after construction, so concurrent readers need no locks.
//!
//! Resolution order per chain entry:
//! - explicit `ChainServer` wins;
//! - else the first `Https` URL;
//! - else the chain is dropped with a configuration warning and later
//!   lookups fail softly with `NotConfigured`.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

use crate::processor::ExecutionEnv;
use crate::utils::errors::HostError;

/// One entry of the chains-config file, keyed by chain id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainConfig {
    /// Dedicated chain-server endpoint; wins over `Https` when present.
    #[serde(rename = "ChainServer")]
    pub chain_server: Option<String>,
    /// Ordered fallback HTTPS endpoints; only the first entry is used.
    #[serde(rename = "Https")]
    pub https: Option<Vec<String>>,
}

/// Resolved endpoint registry, immutable after construction.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Upper bound on simultaneously in-flight processing operations.
    pub concurrency: usize,
    /// Auxiliary chain query service URL (may be empty).
    pub chainquery_api: String,
    /// Auxiliary price feed service URL (may be empty).
    pub pricefeed_api: String,
    // chain id -> resolved endpoint; absence is a recorded configuration gap
    chain_server: HashMap<String, String>,
}

impl Endpoints {
    /// Resolve the chains-config map into a registry.
    ///
    /// Deterministic and total: a bad entry is warned about and skipped,
    /// never fatal.
    pub fn from_chains_config(
        config: &HashMap<String, ChainConfig>,
        concurrency: usize,
        chainquery_api: impl Into<String>,
        pricefeed_api: impl Into<String>,
    ) -> Self {
        let mut chain_server = HashMap::new();
        for (id, chain) in config {
            if let Some(server) = chain.chain_server.as_ref().filter(|s| !s.is_empty()) {
                chain_server.insert(id.clone(), server.clone());
            } else if let Some(url) = chain
                .https
                .as_ref()
                .and_then(|urls| urls.first())
                .filter(|u| !u.is_empty())
            {
                chain_server.insert(id.clone(), url.clone());
            } else {
                warn!("not valid config for chain {}", id);
            }
        }
        Self {
            concurrency,
            chainquery_api: chainquery_api.into(),
            pricefeed_api: pricefeed_api.into(),
            chain_server,
        }
    }

    /// Endpoint for a chain id; `NotConfigured` if it was dropped or never
    /// present.
    pub fn lookup(&self, chain_id: &str) -> Result<&str, HostError> {
        self.chain_server
            .get(chain_id)
            .map(String::as_str)
            .ok_or_else(|| HostError::NotConfigured { chain_id: chain_id.to_string() })
    }

    /// Number of chains that resolved to a usable endpoint.
    pub fn chain_count(&self) -> usize {
        self.chain_server.len()
    }

    /// Snapshot threaded into the module execution path at start.
    pub fn execution_env(&self) -> ExecutionEnv {
        ExecutionEnv {
            concurrency: self.concurrency,
            chainquery_api: self.chainquery_api.clone(),
            pricefeed_api: self.pricefeed_api.clone(),
            chain_server: self.chain_server.clone(),
        }
    }
}
