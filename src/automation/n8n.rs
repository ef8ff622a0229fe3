use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use axum::body::Bytes;
use ghost_common::wire::{
    BuildSiteRequest, BuildUrlRequest, BuildUrlResponse, DeployAndInvoiceRequest,
    DeployAndInvoiceResponse, OutreachKind, OutreachRequest, RenderDeployRequest,
    RenderDeployResponse, TriggerResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::AutomationClient;
use super::demo::demo_site_url;
use crate::config::{Timeouts, WebhookUrls};
use crate::errors::AutomationError;

/// HTTP client for the n8n webhook workflows.
#[derive(Clone)]
pub struct N8nClient {
    http: reqwest::Client,
    urls: WebhookUrls,
    timeouts: Timeouts,
}

impl N8nClient {
    pub fn new(urls: WebhookUrls, timeouts: Timeouts) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ghost-hunter/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            urls,
            timeouts,
        })
    }

    /// POST `body` as JSON and return the raw response body of a 2xx answer.
    /// The budget covers connecting, sending and reading the whole body.
    async fn post<B>(&self, url: &str, body: &B, budget: Duration) -> Result<Bytes, AutomationError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let started = Instant::now();
        let call = async {
            let response = self
                .http
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(AutomationError::Transport)?;
            let status = response.status();
            if !status.is_success() {
                return Err(AutomationError::Upstream {
                    status: status.as_u16(),
                });
            }
            response.bytes().await.map_err(AutomationError::Transport)
        };

        let result = match tokio::time::timeout(budget, call).await {
            Ok(result) => result,
            Err(_) => Err(AutomationError::Timeout(budget)),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::debug!(url, elapsed_ms, "Automation webhook answered"),
            Err(e) => tracing::warn!(url, elapsed_ms, error = %e, "Automation webhook failed"),
        }
        result
    }

    async fn post_json<B, R>(&self, url: &str, body: &B, budget: Duration) -> Result<R, AutomationError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let bytes = self.post(url, body, budget).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AutomationError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl AutomationClient for N8nClient {
    async fn generate_build_url(
        &self,
        request: &BuildUrlRequest,
    ) -> Result<BuildUrlResponse, AutomationError> {
        let response: BuildUrlResponse = self
            .post_json(&self.urls.deploy_website, request, self.timeouts.build_url)
            .await?;
        if !response.success {
            return Err(AutomationError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "Failed to generate build URL".to_string()),
            ));
        }
        if response
            .lovable_build_url
            .as_deref()
            .is_none_or(|url| url.trim().is_empty())
        {
            return Err(AutomationError::MalformedResponse(
                "success without lovableBuildUrl".to_string(),
            ));
        }
        Ok(response)
    }

    async fn deploy_from_repo(
        &self,
        request: &RenderDeployRequest,
    ) -> Result<RenderDeployResponse, AutomationError> {
        let response: RenderDeployResponse = self
            .post_json(&self.urls.github_to_render, request, self.timeouts.deploy)
            .await?;
        if !response.success {
            return Err(AutomationError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "Deployment failed".to_string()),
            ));
        }
        if response
            .render_url
            .as_deref()
            .is_none_or(|url| url.trim().is_empty())
        {
            return Err(AutomationError::MalformedResponse(
                "success without renderUrl".to_string(),
            ));
        }
        Ok(response)
    }

    async fn trigger_website_build(
        &self,
        request: &BuildSiteRequest,
    ) -> Result<TriggerResponse, AutomationError> {
        self.post(&self.urls.build_site, request, self.timeouts.default)
            .await?;
        Ok(TriggerResponse {
            demo_url: Some(demo_site_url(&request.business_name)),
            is_demo: false,
        })
    }

    async fn deploy_and_invoice(
        &self,
        request: &DeployAndInvoiceRequest,
    ) -> Result<DeployAndInvoiceResponse, AutomationError> {
        self.post_json(
            &self.urls.deploy_and_invoice,
            request,
            self.timeouts.deploy_invoice,
        )
        .await
    }

    async fn send_outreach(
        &self,
        request: &OutreachRequest,
    ) -> Result<TriggerResponse, AutomationError> {
        let url = match request.kind {
            OutreachKind::Sms => &self.urls.send_sms,
            OutreachKind::Email => &self.urls.send_email,
        };
        self.post(url, request, self.timeouts.default).await?;
        Ok(TriggerResponse::default())
    }
}
