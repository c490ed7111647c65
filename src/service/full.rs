//! Version adaptation between the network-visible contract and the contract
//! the module author coded against.
//!
//! Deployed callers keep working while the module-facing contract evolves:
//! old request shapes are upgraded here, responses are stamped with the
//! current API version, and the base service never sees a legacy field.

use crate::processor::{
    ConfigRequest, ConfigResponse, ProcessBindingsRequest, ProcessBindingsResponse, StartRequest,
    API_VERSION,
};
use crate::service::ProcessorService;
use crate::utils::errors::HostError;

/// The service actually registered with the RPC server.
pub struct FullProcessorService {
    inner: ProcessorService,
}

impl FullProcessorService {
    pub fn new(inner: ProcessorService) -> Self {
        Self { inner }
    }

    pub async fn get_config(
        &self,
        mut request: ConfigRequest,
    ) -> Result<ConfigResponse, HostError> {
        if request.api_version == 0 {
            request.api_version = API_VERSION;
        }
        let mut response = self.inner.get_config(request).await?;
        response.api_version = API_VERSION;
        Ok(response)
    }

    pub async fn start(&self, request: StartRequest) -> Result<(), HostError> {
        self.inner.start(request).await
    }

    pub async fn stop(&self) -> Result<(), HostError> {
        self.inner.stop().await
    }

    pub async fn process_bindings(
        &self,
        mut request: ProcessBindingsRequest,
    ) -> Result<ProcessBindingsResponse, HostError> {
        for binding in &mut request.bindings {
            // pre-v2 callers sent a single handler id
            if let Some(id) = binding.handler_id.take() {
                if !binding.handler_ids.contains(&id) {
                    binding.handler_ids.push(id);
                }
            }
        }
        request.api_version = API_VERSION;
        let mut response = self.inner.process_bindings(request).await?;
        response.api_version = API_VERSION;
        Ok(response)
    }
}
