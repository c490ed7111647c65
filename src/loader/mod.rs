//! Module loader: resolves a processor module on demand and caches it.
//!
//! - [`ModuleLoader`]: narrow plugin-loading interface; the concrete
//!   technique (dylib today, subprocess isolation tomorrow) hides behind it.
//! - [`DylibLoader`]: the shipped implementation, backed by `libloading`.
//! - [`LazyModule`]: at-most-once-load cache. Concurrent first calls
//!   coalesce onto a single shared load; every waiter sees the same module
//!   or the same failure. A failed load leaves the cache empty so a later
//!   call can retry.

mod dylib;
pub use dylib::DylibLoader;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::processor::ProcessorHandlers;

/// Load failure carrying the target and the underlying cause.
///
/// Cloneable so an in-flight shared load can hand the same failure to every
/// waiter.
#[derive(Debug, Clone, Error)]
#[error("failed to load processor module {target}: {cause}")]
pub struct ModuleLoadError {
    pub target: String,
    pub cause: String,
}

impl ModuleLoadError {
    pub fn new(target: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self { target: target.into(), cause: cause.to_string() }
    }
}

/// Resolves a target specifier into a live handler set.
///
/// A failed load must not terminate the host; callers retry on a later
/// request.
#[async_trait]
pub trait ModuleLoader: Send + Sync + 'static {
    /// The module specifier this loader resolves.
    fn target(&self) -> &str;

    /// Resolve and instantiate the module.
    async fn load(&self) -> Result<Arc<dyn ProcessorHandlers>, ModuleLoadError>;
}

type LoadResult = Result<Arc<dyn ProcessorHandlers>, ModuleLoadError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

enum LoadState {
    Idle,
    Loading(SharedLoad),
    Ready(Arc<dyn ProcessorHandlers>),
}

/// Lazily loaded module with the at-most-once-load invariant.
pub struct LazyModule {
    loader: Arc<dyn ModuleLoader>,
    state: Mutex<LoadState>,
}

impl LazyModule {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self { loader, state: Mutex::new(LoadState::Idle) }
    }

    /// The module instance, if a load already succeeded.
    pub fn loaded(&self) -> Option<Arc<dyn ProcessorHandlers>> {
        match &*self.state.lock() {
            LoadState::Ready(module) => Some(module.clone()),
            _ => None,
        }
    }

    /// Get the loaded module, triggering the load on first use.
    pub async fn get(&self) -> LoadResult {
        // Join or start the in-flight load; the lock is never held across an
        // await point.
        let load = {
            let mut state = self.state.lock();
            match &*state {
                LoadState::Ready(module) => return Ok(module.clone()),
                LoadState::Loading(load) => load.clone(),
                LoadState::Idle => {
                    let loader = self.loader.clone();
                    debug!("loading processor module {}", loader.target());
                    let load: SharedLoad = async move { loader.load().await }.boxed().shared();
                    *state = LoadState::Loading(load.clone());
                    load
                }
            }
        };

        let result = load.clone().await;

        let mut state = self.state.lock();
        match &result {
            Ok(module) => {
                if !matches!(*state, LoadState::Ready(_)) {
                    info!("processor module {} loaded", self.loader.target());
                    *state = LoadState::Ready(module.clone());
                }
            }
            Err(_) => {
                // Reset so a later call retries; everyone already waiting on
                // this load shares the failure. Only the load we actually
                // awaited may be reset: a late waiter must not clear a fresh
                // load another caller has started in the meantime.
                if let LoadState::Loading(current) = &*state {
                    if current.ptr_eq(&load) {
                        *state = LoadState::Idle;
                    }
                }
            }
        }
        result
    }
}
