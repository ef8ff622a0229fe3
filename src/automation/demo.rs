use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ghost_common::slugify;
use ghost_common::wire::{
    BuildSiteRequest, BuildUrlRequest, BuildUrlResponse, DeployAndInvoiceRequest,
    DeployAndInvoiceResponse, OutreachRequest, RenderDeployRequest, RenderDeployResponse,
    TriggerResponse,
};

use super::AutomationClient;
use crate::errors::AutomationError;

const BUILDER_BASE_URL: &str = "https://lovable.dev/?autosubmit=true";

/// Demo-mode decorator: tries the real client first, and when that fails waits
/// `delay` and answers with made-up values flagged `is_demo`.
pub struct DemoFallback<C> {
    inner: C,
    delay: Duration,
}

impl<C: AutomationClient> DemoFallback<C> {
    pub fn new(inner: C, delay: Duration) -> Self {
        Self { inner, delay }
    }

    async fn fake_after(&self, call: &str, error: &AutomationError) {
        tracing::warn!(call, error = %error, "Automation call failed; answering with demo data");
        tokio::time::sleep(self.delay).await;
    }
}

/// Builder URL that auto-submits a prompt for `business_name`.
pub fn demo_build_url(business_name: &str) -> String {
    let prompt = format!("prompt=Create a professional website for {}", business_name);
    match reqwest::Url::parse(BUILDER_BASE_URL) {
        Ok(mut url) => {
            url.set_fragment(Some(&prompt));
            url.to_string()
        }
        Err(_) => BUILDER_BASE_URL.to_string(),
    }
}

pub fn demo_site_url(business_name: &str) -> String {
    format!("https://{}.onrender.com", slugify(business_name))
}

#[async_trait]
impl<C: AutomationClient> AutomationClient for DemoFallback<C> {
    async fn generate_build_url(
        &self,
        request: &BuildUrlRequest,
    ) -> Result<BuildUrlResponse, AutomationError> {
        match self.inner.generate_build_url(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.fake_after("generate_build_url", &e).await;
                Ok(BuildUrlResponse {
                    success: true,
                    lovable_build_url: Some(demo_build_url(&request.business_name)),
                    error: None,
                    is_demo: true,
                })
            }
        }
    }

    async fn deploy_from_repo(
        &self,
        request: &RenderDeployRequest,
    ) -> Result<RenderDeployResponse, AutomationError> {
        match self.inner.deploy_from_repo(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.fake_after("deploy_from_repo", &e).await;
                Ok(RenderDeployResponse {
                    success: true,
                    render_url: Some(demo_site_url(&request.business_name)),
                    render_service_id: None,
                    error: None,
                    is_demo: true,
                })
            }
        }
    }

    async fn trigger_website_build(
        &self,
        request: &BuildSiteRequest,
    ) -> Result<TriggerResponse, AutomationError> {
        match self.inner.trigger_website_build(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.fake_after("trigger_website_build", &e).await;
                Ok(TriggerResponse {
                    demo_url: Some(demo_site_url(&request.business_name)),
                    is_demo: true,
                })
            }
        }
    }

    async fn deploy_and_invoice(
        &self,
        request: &DeployAndInvoiceRequest,
    ) -> Result<DeployAndInvoiceResponse, AutomationError> {
        match self.inner.deploy_and_invoice(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.fake_after("deploy_and_invoice", &e).await;
                let slug = slugify(&request.business_name);
                Ok(DeployAndInvoiceResponse {
                    build_id: Some(format!("demo-{}", Utc::now().timestamp_millis())),
                    payment_link: Some(format!("https://buy.stripe.com/demo_{}", slug)),
                    preview_url: Some(demo_site_url(&request.business_name)),
                    is_demo: true,
                })
            }
        }
    }

    async fn send_outreach(
        &self,
        request: &OutreachRequest,
    ) -> Result<TriggerResponse, AutomationError> {
        match self.inner.send_outreach(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.fake_after("send_outreach", &e).await;
                Ok(TriggerResponse {
                    demo_url: None,
                    is_demo: true,
                })
            }
        }
    }
}
