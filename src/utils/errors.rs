use thiserror::Error;

use crate::loader::ModuleLoadError;

/// Unified error type for request-scoped host failures.
///
/// Startup-fatal conditions (unreadable config, bind failures) use `anyhow`
/// at the wiring layer instead; everything here maps onto a JSON-RPC error
/// object and never takes the process down.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("chain {chain_id} is not configured")]
    NotConfigured { chain_id: String },

    #[error(transparent)]
    ModuleLoad(#[from] ModuleLoadError),

    #[error("host is shutting down")]
    ShuttingDown,

    #[error("rpc error: {0}")]
    Rpc(String),
}
