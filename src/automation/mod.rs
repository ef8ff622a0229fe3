//! Outbound calls to the n8n automation workflows.
//!
//! [`AutomationClient`] is the seam the orchestrator talks through.
//! [`N8nClient`] does the real HTTP work; [`DemoFallback`] wraps any client
//! and fakes a success when the real call fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ghost_common::wire::{
    BuildSiteRequest, BuildUrlRequest, BuildUrlResponse, DeployAndInvoiceRequest,
    DeployAndInvoiceResponse, OutreachRequest, RenderDeployRequest, RenderDeployResponse,
    TriggerResponse,
};

use crate::config::GhostToml;
use crate::errors::AutomationError;

pub mod demo;
pub mod n8n;

pub use demo::DemoFallback;
pub use n8n::N8nClient;

/// Every call carries its own timeout budget; none retries on its own.
#[async_trait]
pub trait AutomationClient: Send + Sync {
    /// Stage 1: ask the AI site builder for an auto-submitting build URL.
    async fn generate_build_url(
        &self,
        request: &BuildUrlRequest,
    ) -> Result<BuildUrlResponse, AutomationError>;

    /// Stage 3: provision hosting from a published GitHub repository.
    async fn deploy_from_repo(
        &self,
        request: &RenderDeployRequest,
    ) -> Result<RenderDeployResponse, AutomationError>;

    async fn trigger_website_build(
        &self,
        request: &BuildSiteRequest,
    ) -> Result<TriggerResponse, AutomationError>;

    async fn deploy_and_invoice(
        &self,
        request: &DeployAndInvoiceRequest,
    ) -> Result<DeployAndInvoiceResponse, AutomationError>;

    /// SMS or email, chosen by `request.kind`.
    async fn send_outreach(
        &self,
        request: &OutreachRequest,
    ) -> Result<TriggerResponse, AutomationError>;
}

/// Build the client the configuration asks for: the real n8n client, wrapped
/// in [`DemoFallback`] when demo mode is on.
pub fn from_config(config: &GhostToml) -> anyhow::Result<Arc<dyn AutomationClient>> {
    let client = N8nClient::new(config.webhook_urls(), config.timeouts())?;
    if config.dashboard.demo_mode {
        let delay = Duration::from_millis(config.dashboard.demo_delay_ms);
        tracing::info!(delay_ms = config.dashboard.demo_delay_ms, "Demo mode enabled");
        Ok(Arc::new(DemoFallback::new(client, delay)))
    } else {
        Ok(Arc::new(client))
    }
}
