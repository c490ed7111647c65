//! The fixed handler-capability contract a processor module satisfies.
//!
//! The host never looks inside a module's business logic: anything that
//! implements [`ProcessorHandlers`] can be bound to the RPC surface. Modules
//! are built as cdylibs exporting [`MODULE_ENTRY_SYMBOL`]; the loader keeps
//! the concrete technique behind its own interface so other isolation
//! strategies stay possible.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current version of the network-visible contract. Requests tagged with an
/// older (or missing) version are upgraded by the adaptation layer before a
/// module sees them.
pub const API_VERSION: u32 = 2;

/// Symbol a processor cdylib must export.
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"chainhost_module_entry\0";

/// Entry point signature for a processor cdylib.
pub type ModuleEntry = unsafe extern "Rust" fn() -> Box<dyn ProcessorHandlers>;

/// Host configuration snapshot threaded into the module execution path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionEnv {
    /// Upper bound on simultaneously in-flight processing operations.
    pub concurrency: usize,
    pub chainquery_api: String,
    pub pricefeed_api: String,
    /// Resolved chain id -> endpoint map.
    pub chain_server: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigRequest {
    #[serde(default)]
    pub api_version: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigResponse {
    #[serde(default)]
    pub api_version: u32,
    /// Contracts the module wants observed, by chain id.
    #[serde(default)]
    pub contract_configs: Vec<ContractConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractConfig {
    pub chain_id: String,
    pub address: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRequest {
    /// Template instances to bind on top of the statically configured ones.
    #[serde(default)]
    pub template_instances: Vec<TemplateInstance>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateInstance {
    pub template_id: u32,
    pub contract: ContractConfig,
}

/// One unit of chain data bound to the module handlers that should see it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataBinding {
    pub chain_id: String,
    /// Handlers to invoke, referenced by the ids the module returned in its
    /// config.
    #[serde(default)]
    pub handler_ids: Vec<u32>,
    /// Pre-v2 single-handler field; folded into `handler_ids` by the
    /// adaptation layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_id: Option<u32>,
    /// Raw chain payload (block, log, transaction...); schema owned by the
    /// module.
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessBindingsRequest {
    #[serde(default)]
    pub api_version: u32,
    #[serde(default)]
    pub bindings: Vec<DataBinding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessBindingsResponse {
    #[serde(default)]
    pub api_version: u32,
    #[serde(default)]
    pub results: Vec<ProcessResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    pub handler_id: u32,
    #[serde(default)]
    pub output: serde_json::Value,
}

/// Handler-capability set every processor module provides.
///
/// Implementations run on the shared scheduler; anything that can stall
/// (outbound calls, heavy computation) must suspend cooperatively.
#[async_trait]
pub trait ProcessorHandlers: Send + Sync {
    /// Describe the contracts and handlers this module registers.
    async fn get_config(&self, request: ConfigRequest) -> anyhow::Result<ConfigResponse>;

    /// Begin processing with the host-supplied execution environment.
    async fn start(&self, request: StartRequest, env: ExecutionEnv) -> anyhow::Result<()>;

    /// Stop processing and release held resources.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Run the referenced handlers over a batch of chain data.
    async fn process_bindings(
        &self,
        request: ProcessBindingsRequest,
    ) -> anyhow::Result<ProcessBindingsResponse>;
}
