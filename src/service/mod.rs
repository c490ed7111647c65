//! Service composer: binds a lazily loaded processor module to the RPC
//! surface.
//!
//! [`ProcessorService`] is the sole holder of the loaded module reference.
//! It defers the module import to the first call that needs it, validates
//! chain ids against the endpoint registry, bounds in-flight processing with
//! the registry's concurrency limit, and refuses new work once the RPC
//! server's shutdown hook fires.

pub mod full;
pub use full::FullProcessorService;

use std::sync::Arc;
use tokio::sync::{watch, Semaphore};

use crate::endpoints::Endpoints;
use crate::loader::{LazyModule, ModuleLoader};
use crate::processor::{
    ConfigRequest, ConfigResponse, ProcessBindingsRequest, ProcessBindingsResponse,
    ProcessorHandlers, StartRequest,
};
use crate::utils::errors::HostError;

/// Base RPC-facing service wrapping the raw module.
pub struct ProcessorService {
    module: LazyModule,
    endpoints: Arc<Endpoints>,
    // bounds simultaneously in-flight process_bindings calls
    inflight: Semaphore,
    // flipped by the RPC server when it begins shutting down
    shutdown: watch::Receiver<bool>,
}

impl ProcessorService {
    /// `shutdown` is the hook injected by the RPC server; no module import
    /// happens here.
    pub fn new(
        loader: Arc<dyn ModuleLoader>,
        endpoints: Arc<Endpoints>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let inflight = Semaphore::new(endpoints.concurrency.max(1));
        Self { module: LazyModule::new(loader), endpoints, inflight, shutdown }
    }

    fn check_accepting(&self) -> Result<(), HostError> {
        if *self.shutdown.borrow() {
            return Err(HostError::ShuttingDown);
        }
        Ok(())
    }

    async fn module(&self) -> Result<Arc<dyn ProcessorHandlers>, HostError> {
        Ok(self.module.get().await?)
    }

    pub async fn get_config(&self, request: ConfigRequest) -> Result<ConfigResponse, HostError> {
        self.check_accepting()?;
        let module = self.module().await?;
        module.get_config(request).await.map_err(|e| HostError::Rpc(e.to_string()))
    }

    pub async fn start(&self, request: StartRequest) -> Result<(), HostError> {
        self.check_accepting()?;
        let module = self.module().await?;
        module
            .start(request, self.endpoints.execution_env())
            .await
            .map_err(|e| HostError::Rpc(e.to_string()))
    }

    /// Stop is honored even during shutdown, but only a loaded module sees
    /// it; stop must not trigger a load.
    pub async fn stop(&self) -> Result<(), HostError> {
        if let Some(module) = self.module.loaded() {
            module.stop().await.map_err(|e| HostError::Rpc(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn process_bindings(
        &self,
        request: ProcessBindingsRequest,
    ) -> Result<ProcessBindingsResponse, HostError> {
        self.check_accepting()?;
        // Request-scoped validation: an unknown chain fails this call only.
        for binding in &request.bindings {
            self.endpoints.lookup(&binding.chain_id)?;
        }
        let module = self.module().await?;
        let _permit =
            self.inflight.acquire().await.map_err(|_| HostError::ShuttingDown)?;
        module.process_bindings(request).await.map_err(|e| HostError::Rpc(e.to_string()))
    }
}
