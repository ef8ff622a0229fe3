//! One-shot automation calls that sit outside the staged pipeline.

use chrono::Utc;
use ghost_common::wire::{
    BuildSiteRequest, DeployAndInvoiceRequest, OutreachKind, OutreachRequest, TriggerResponse,
};
use ghost_common::{BuildJob, BuildStatus, BusinessRef, JobUpdate, Package};
use serde::Serialize;

use super::DeployOrchestrator;
use crate::errors::{AutomationError, OrchestratorError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demo_url: Option<String>,
    pub is_demo: bool,
    pub error: Option<String>,
}

impl OutreachResult {
    fn from_call(call: &str, result: Result<TriggerResponse, AutomationError>) -> Self {
        match result {
            Ok(response) => {
                if response.is_demo {
                    tracing::info!(call, "Outreach answered with demo data");
                }
                Self {
                    success: true,
                    demo_url: response.demo_url,
                    is_demo: response.is_demo,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(call, error = %e, "Outreach call failed");
                Self {
                    success: false,
                    demo_url: None,
                    is_demo: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployInvoiceResult {
    pub success: bool,
    pub build_id: Option<String>,
    pub payment_link: Option<String>,
    pub preview_url: Option<String>,
    pub is_demo: bool,
    pub error: Option<String>,
    pub job: BuildJob,
}

fn required(value: &str, what: &str) -> Result<(), OrchestratorError> {
    if value.trim().is_empty() {
        Err(OrchestratorError::InvalidInput(format!("{} is required", what)))
    } else {
        Ok(())
    }
}

impl DeployOrchestrator {
    /// Fire-and-forget site build for a prospect.
    pub async fn trigger_website_build(
        &self,
        business: &BusinessRef,
    ) -> Result<OutreachResult, OrchestratorError> {
        required(&business.name, "Business name")?;
        let request = BuildSiteRequest {
            place_id: business.place_id.clone(),
            business_name: business.name.clone(),
            phone: business.phone.clone(),
            address: business.address.clone(),
            timestamp: Utc::now(),
        };
        Ok(OutreachResult::from_call(
            "trigger_website_build",
            self.client.trigger_website_build(&request).await,
        ))
    }

    /// Deploy and send the invoice in one call. A job is recorded first; a
    /// failed call moves it to `error` so the operator can retry.
    pub async fn deploy_and_invoice(
        &self,
        business: &BusinessRef,
        email: &str,
        package: Package,
        amount: Option<f64>,
    ) -> Result<DeployInvoiceResult, OrchestratorError> {
        required(email, "Email")?;
        let job = self.create_job(business, package, amount).await?;
        let request = DeployAndInvoiceRequest {
            place_id: business.place_id.clone(),
            business_name: job.business_name.clone(),
            phone: business.phone.clone(),
            address: business.address.clone(),
            email: email.trim().to_string(),
            package: job.package.to_string(),
            amount: job.amount,
            timestamp: Utc::now(),
        };

        match self.client.deploy_and_invoice(&request).await {
            Ok(response) => {
                let update = JobUpdate {
                    status: Some(BuildStatus::Building),
                    preview_url: response.preview_url.clone(),
                    ..JobUpdate::default()
                };
                let change = self.apply(&job.id, update).await?;
                tracing::info!(job_id = %job.id, is_demo = response.is_demo, "Invoice sent");
                Ok(DeployInvoiceResult {
                    success: true,
                    build_id: response.build_id,
                    payment_link: response.payment_link,
                    preview_url: response.preview_url,
                    is_demo: response.is_demo,
                    error: None,
                    job: change.after,
                })
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(job_id = %job.id, error = %message, "Deploy and invoice failed");
                let update = JobUpdate {
                    error_message: Some(message.clone()),
                    ..JobUpdate::status(BuildStatus::Error)
                };
                let change = self.apply(&job.id, update).await?;
                Ok(DeployInvoiceResult {
                    success: false,
                    build_id: None,
                    payment_link: None,
                    preview_url: None,
                    is_demo: false,
                    error: Some(message),
                    job: change.after,
                })
            }
        }
    }

    pub async fn send_sms(
        &self,
        to: &str,
        message: &str,
        business_name: &str,
    ) -> Result<OutreachResult, OrchestratorError> {
        required(to, "Recipient")?;
        required(message, "Message")?;
        let request = OutreachRequest {
            to: to.trim().to_string(),
            subject: None,
            message: message.to_string(),
            business_name: business_name.to_string(),
            kind: OutreachKind::Sms,
            timestamp: Utc::now(),
        };
        Ok(OutreachResult::from_call(
            "send_sms",
            self.client.send_outreach(&request).await,
        ))
    }

    pub async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        business_name: &str,
    ) -> Result<OutreachResult, OrchestratorError> {
        required(to, "Recipient")?;
        required(body, "Message")?;
        let request = OutreachRequest {
            to: to.trim().to_string(),
            subject: Some(subject.to_string()),
            message: body.to_string(),
            business_name: business_name.to_string(),
            kind: OutreachKind::Email,
            timestamp: Utc::now(),
        };
        Ok(OutreachResult::from_call(
            "send_email",
            self.client.send_outreach(&request).await,
        ))
    }
}
