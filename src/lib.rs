//! chainhost: runtime host for user-authored blockchain data processors.
//!
//! The host resolves per-chain network endpoints from configuration, lazily
//! loads a processor module behind a version-stable service contract, serves
//! it over JSON-RPC with transport limits, and exposes merged Prometheus
//! metrics on an independent listener.

pub mod endpoints;
pub mod host;
pub mod loader;
pub mod metrics;
pub mod processor;
pub mod rpc;
pub mod service;
pub mod utils;
