//! Dylib-backed module loader.
//!
//! The target specifier is a path to a cdylib built against the processor
//! contract, exporting [`MODULE_ENTRY_SYMBOL`]. The mapped library is kept
//! alive for as long as the handler set it produced.

use async_trait::async_trait;
use libloading::Library;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ModuleLoadError, ModuleLoader};
use crate::processor::{
    ConfigRequest, ConfigResponse, ExecutionEnv, ModuleEntry, ProcessBindingsRequest,
    ProcessBindingsResponse, ProcessorHandlers, StartRequest, MODULE_ENTRY_SYMBOL,
};

/// Loads the target as a cdylib.
pub struct DylibLoader {
    target: String,
    path: PathBuf,
}

impl DylibLoader {
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        let path = PathBuf::from(&target);
        Self { target, path }
    }
}

#[async_trait]
impl ModuleLoader for DylibLoader {
    fn target(&self) -> &str {
        &self.target
    }

    async fn load(&self) -> Result<Arc<dyn ProcessorHandlers>, ModuleLoadError> {
        let target = self.target.clone();
        let path = self.path.clone();
        // dlopen can hit the disk; keep it off the async scheduler.
        let module = tokio::task::spawn_blocking(move || open_module(&path))
            .await
            .map_err(|e| ModuleLoadError::new(&target, e))?
            .map_err(|e| ModuleLoadError::new(&target, e))?;
        Ok(Arc::new(module))
    }
}

/// A loaded module together with the library backing its code.
struct DylibModule {
    handlers: Box<dyn ProcessorHandlers>,
    // declared after `handlers` so the code stays mapped while they drop
    _library: Library,
}

fn open_module(path: &Path) -> Result<DylibModule, libloading::Error> {
    // Safety: the target is the user-authored processor the host exists to
    // run; the entry symbol's signature is fixed by the contract.
    unsafe {
        let library = Library::new(path)?;
        let handlers = {
            let entry: libloading::Symbol<ModuleEntry> = library.get(MODULE_ENTRY_SYMBOL)?;
            entry()
        };
        Ok(DylibModule { handlers, _library: library })
    }
}

#[async_trait]
impl ProcessorHandlers for DylibModule {
    async fn get_config(&self, request: ConfigRequest) -> anyhow::Result<ConfigResponse> {
        self.handlers.get_config(request).await
    }

    async fn start(&self, request: StartRequest, env: ExecutionEnv) -> anyhow::Result<()> {
        self.handlers.start(request, env).await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.handlers.stop().await
    }

    async fn process_bindings(
        &self,
        request: ProcessBindingsRequest,
    ) -> anyhow::Result<ProcessBindingsResponse> {
        self.handlers.process_bindings(request).await
    }
}
