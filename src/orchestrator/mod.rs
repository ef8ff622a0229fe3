//! Human-in-the-loop deploy pipeline.
//!
//! ```text
//! initial ──generate_build_url──▶ lovable-ready ──confirm_publish──▶ github-ready
//!                                                                       │
//!                                                   deploy_from_repo ───┘──▶ complete
//! ```
//!
//! Each step checks the stored stage first, so step N+1 can only run after
//! step N succeeded. A failed outbound call leaves the job where it was and
//! comes back as `StageResult { success: false }`; nothing retries on its own.

use std::sync::Arc;

use chrono::Utc;
use ghost_common::wire::{BuildUrlRequest, RenderDeployRequest};
use ghost_common::{
    BuildJob, BuildStatus, BusinessRef, DeployStage, JobUpdate, NewBuildJob, Package,
    PaymentStatus,
};
use serde::Serialize;

use crate::automation::AutomationClient;
use crate::dashboard::notify::{Notification, Notifier};
use crate::errors::{OrchestratorError, StoreError};
use crate::store::{DbHandle, JobChange};

pub mod outreach;

pub use outreach::{DeployInvoiceResult, OutreachResult};

/// Outcome of one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub success: bool,
    /// Stage the job is in after the step.
    pub stage: DeployStage,
    pub url: Option<String>,
    pub is_demo: bool,
    pub error: Option<String>,
    pub job: BuildJob,
}

impl StageResult {
    fn advanced(job: BuildJob, url: Option<String>, is_demo: bool) -> Self {
        Self {
            success: true,
            stage: job.stage,
            url,
            is_demo,
            error: None,
            job,
        }
    }

    fn failed(job: BuildJob, error: String) -> Self {
        Self {
            success: false,
            stage: job.stage,
            url: None,
            is_demo: false,
            error: Some(error),
            job,
        }
    }
}

pub struct DeployOrchestrator {
    store: DbHandle,
    client: Arc<dyn AutomationClient>,
    notifier: Notifier,
}

impl DeployOrchestrator {
    pub fn new(store: DbHandle, client: Arc<dyn AutomationClient>, notifier: Notifier) -> Self {
        Self {
            store,
            client,
            notifier,
        }
    }

    pub fn store(&self) -> &DbHandle {
        &self.store
    }

    /// Create a job for `business` and run the first step.
    pub async fn start(
        &self,
        business: &BusinessRef,
        package: Package,
        amount: Option<f64>,
    ) -> Result<StageResult, OrchestratorError> {
        let job = self.create_job(business, package, amount).await?;
        self.generate_build_url(&job.id, business).await
    }

    pub(crate) async fn create_job(
        &self,
        business: &BusinessRef,
        package: Package,
        amount: Option<f64>,
    ) -> Result<BuildJob, OrchestratorError> {
        if business.id.trim().is_empty() || business.name.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "Business id and name are required".to_string(),
            ));
        }
        let amount = package.resolve_amount(amount)?;
        let new = NewBuildJob::for_business(business, package, amount);
        let job = self.store.call(move |db| db.create_job(&new)).await?;

        tracing::info!(
            job_id = %job.id,
            business = %job.business_name,
            package = %job.package,
            amount = job.amount,
            "Build job created"
        );
        self.notifier
            .notify(&Notification::JobCreated { job: job.clone() });
        Ok(job)
    }

    /// Step 1 (`initial → lovable-ready`): get an auto-submitting build URL
    /// from the AI site builder.
    pub async fn generate_build_url(
        &self,
        job_id: &str,
        business: &BusinessRef,
    ) -> Result<StageResult, OrchestratorError> {
        let job = self.job_at_stage(job_id, DeployStage::Initial).await?;
        let request = BuildUrlRequest {
            business_name: job.business_name.clone(),
            address: business.address.clone(),
            phone: business.phone.clone(),
            package: job.package.to_string(),
            amount: job.amount,
            timestamp: Utc::now(),
        };

        let response = match self.client.generate_build_url(&request).await {
            Ok(response) => response,
            Err(e) => return Ok(self.step_failed(job, &e.to_string())),
        };

        let update = JobUpdate {
            status: Some(BuildStatus::Building),
            stage: Some(DeployStage::LovableReady),
            build_url: response.lovable_build_url.clone(),
            ..JobUpdate::default()
        };
        let change = self.apply(job_id, update).await?;
        Ok(StageResult::advanced(
            change.after,
            response.lovable_build_url,
            response.is_demo,
        ))
    }

    /// Step 2 (`lovable-ready → github-ready`): the operator confirms the
    /// builder published to GitHub. No network call.
    pub async fn confirm_publish(&self, job_id: &str) -> Result<StageResult, OrchestratorError> {
        self.job_at_stage(job_id, DeployStage::LovableReady).await?;
        let update = JobUpdate {
            status: Some(BuildStatus::GithubCreating),
            stage: Some(DeployStage::GithubReady),
            ..JobUpdate::default()
        };
        let change = self.apply(job_id, update).await?;
        let url = change.after.build_url.clone();
        Ok(StageResult::advanced(change.after, url, false))
    }

    /// Step 3 (`github-ready → complete`): deploy the repository to hosting.
    pub async fn deploy_from_repo(
        &self,
        job_id: &str,
        github_repo: &str,
    ) -> Result<StageResult, OrchestratorError> {
        let github_repo = github_repo.trim();
        if github_repo.is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "GitHub repository is required".to_string(),
            ));
        }
        let job = self.job_at_stage(job_id, DeployStage::GithubReady).await?;
        let request = RenderDeployRequest {
            business_name: job.business_name.clone(),
            github_repo: github_repo.to_string(),
            timestamp: Utc::now(),
        };

        let response = match self.client.deploy_from_repo(&request).await {
            Ok(response) => response,
            Err(e) => return Ok(self.step_failed(job, &e.to_string())),
        };

        let update = JobUpdate {
            status: Some(BuildStatus::Live),
            stage: Some(DeployStage::Complete),
            github_repo: Some(github_repo.to_string()),
            render_service_id: response.render_service_id.clone(),
            render_deployment_url: response.render_url.clone(),
            preview_url: response.render_url.clone(),
            ..JobUpdate::default()
        };
        let change = self.apply(job_id, update).await?;
        Ok(StageResult::advanced(
            change.after,
            response.render_url,
            response.is_demo,
        ))
    }

    /// `pending|failed → paid`, booking the revenue once. Allowed at any
    /// stage; repeating it changes nothing.
    pub async fn mark_paid(&self, job_id: &str) -> Result<BuildJob, OrchestratorError> {
        let id = job_id.to_string();
        let change = self
            .store
            .call(move |db| db.confirm_payment(&id, Utc::now()))
            .await?;
        if change.became_paid() {
            tracing::info!(job_id, amount = change.after.amount, "Payment received");
        }
        self.notifier.job_changed(&change);
        Ok(change.after)
    }

    pub async fn mark_payment_failed(&self, job_id: &str) -> Result<BuildJob, OrchestratorError> {
        let change = self
            .apply(job_id, JobUpdate::payment(PaymentStatus::Failed))
            .await?;
        Ok(change.after)
    }

    /// Operator retry of a job in `error`.
    pub async fn retry(&self, job_id: &str) -> Result<BuildJob, OrchestratorError> {
        let id = job_id.to_string();
        let change = match self.store.call(move |db| db.retry_job(&id)).await {
            Ok(change) => change,
            Err(StoreError::InvalidTransition { .. }) => {
                return Err(OrchestratorError::NotRetryable {
                    id: job_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(job_id, stage = %change.after.stage, "Job retried by operator");
        self.notifier.job_changed(&change);
        Ok(change.after)
    }

    async fn job_at_stage(
        &self,
        job_id: &str,
        expected: DeployStage,
    ) -> Result<BuildJob, OrchestratorError> {
        let job = self.require_job(job_id).await?;
        if job.status == BuildStatus::Error {
            return Err(OrchestratorError::JobInError {
                id: job_id.to_string(),
            });
        }
        if job.stage != expected {
            return Err(OrchestratorError::WrongStage {
                id: job_id.to_string(),
                expected,
                actual: job.stage,
            });
        }
        Ok(job)
    }

    pub(crate) async fn require_job(&self, job_id: &str) -> Result<BuildJob, OrchestratorError> {
        let id = job_id.to_string();
        self.store
            .call(move |db| db.get_job(&id))
            .await?
            .ok_or_else(|| {
                StoreError::JobNotFound {
                    id: job_id.to_string(),
                }
                .into()
            })
    }

    pub(crate) async fn apply(
        &self,
        job_id: &str,
        update: JobUpdate,
    ) -> Result<JobChange, OrchestratorError> {
        let id = job_id.to_string();
        let change = self
            .store
            .call(move |db| db.update_job(&id, &update))
            .await?;
        self.notifier.job_changed(&change);
        Ok(change)
    }

    fn step_failed(&self, job: BuildJob, error: &str) -> StageResult {
        let message = format!("{} failed: {}", job.stage.step_label(), error);
        tracing::warn!(job_id = %job.id, stage = %job.stage, error, "Deploy step failed");
        StageResult::failed(job, message)
    }
}
