use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ghost_common::{BusinessRef, Package, PaymentStatus};
use serde::Deserialize;

use super::notify::{self, Notifier};
use crate::errors::{OrchestratorError, StoreError};
use crate::orchestrator::DeployOrchestrator;
use crate::store::DbHandle;
use crate::webhook::{self, WebhookState};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: DeployOrchestrator,
    pub store: DbHandle,
    pub notifier: Notifier,
    pub webhook_secret: Option<Arc<str>>,
}

pub type SharedState = Arc<AppState>;

impl FromRef<SharedState> for Notifier {
    fn from_ref(state: &SharedState) -> Self {
        state.notifier.clone()
    }
}

impl FromRef<SharedState> for WebhookState {
    fn from_ref(state: &SharedState) -> Self {
        WebhookState {
            store: state.store.clone(),
            notifier: state.notifier.clone(),
            secret: state.webhook_secret.clone(),
        }
    }
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDeployRequest {
    pub business: BusinessRef,
    pub package: String,
    pub amount: Option<f64>,
}

/// Contact details for re-running stage 1; the job itself only stores the
/// business id and name.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BuildUrlRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub github_repo: String,
}

#[derive(Deserialize)]
pub struct ListJobsQuery {
    pub payment: Option<String>,
}

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsRequest {
    pub to: String,
    pub message: String,
    #[serde(default)]
    pub business_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    pub to: String,
    #[serde(default)]
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub business_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployInvoiceRequest {
    pub business: BusinessRef,
    pub email: Option<String>,
    pub package: String,
    pub amount: Option<f64>,
}

const DEFAULT_RECENT: u32 = 10;
const MAX_RECENT: u32 = 100;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let msg = e.to_string();
        match e {
            StoreError::JobNotFound { .. } => ApiError::NotFound(msg),
            StoreError::InvalidTransition { .. } => ApiError::Conflict(msg),
            StoreError::InvalidAmount(_) => ApiError::BadRequest(msg),
            StoreError::Database(_) => {
                tracing::error!(error = %msg, "Store failure");
                ApiError::Internal(msg)
            }
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        let msg = e.to_string();
        match e {
            OrchestratorError::WrongStage { .. }
            | OrchestratorError::NotRetryable { .. }
            | OrchestratorError::JobInError { .. } => ApiError::Conflict(msg),
            OrchestratorError::InvalidInput(_) | OrchestratorError::Package(_) => {
                ApiError::BadRequest(msg)
            }
            OrchestratorError::Store(e) => e.into(),
        }
    }
}

fn parse_package(raw: &str) -> Result<Package, ApiError> {
    Package::from_str(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/jobs", get(list_jobs).post(start_deploy))
        .route("/api/jobs/recent", get(recent_jobs))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/build-url", post(generate_build_url))
        .route("/api/jobs/{id}/confirm-publish", post(confirm_publish))
        .route("/api/jobs/{id}/deploy", post(deploy_from_repo))
        .route("/api/jobs/{id}/paid", post(mark_paid))
        .route("/api/jobs/{id}/payment-failed", post(mark_payment_failed))
        .route("/api/jobs/{id}/retry", post(retry_job))
        .route("/api/stats", get(stats))
        .route("/api/outreach/sms", post(send_sms))
        .route("/api/outreach/email", post(send_email))
        .route("/api/outreach/build-site", post(trigger_website_build))
        .route("/api/outreach/deploy-invoice", post(deploy_and_invoice))
        .route(webhook::ROUTE, post(webhook::deployment_status))
        .route("/ws", get(notify::ws_handler))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_jobs(
    State(state): State<SharedState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = query
        .payment
        .as_deref()
        .map(PaymentStatus::from_str)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let jobs = state
        .store
        .call(move |db| match filter {
            Some(status) => db.jobs_by_payment_status(status),
            None => db.list_jobs(),
        })
        .await?;
    Ok(Json(jobs))
}

async fn recent_jobs(
    State(state): State<SharedState>,
    Query(query): Query<RecentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT).min(MAX_RECENT);
    let jobs = state.store.call(move |db| db.recent_jobs(limit)).await?;
    Ok(Json(jobs))
}

async fn get_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = id.clone();
    let job = state.store.call(move |db| db.get_job(&lookup)).await?;
    match job {
        Some(job) => Ok(Json(job)),
        None => Err(ApiError::NotFound(format!("Build job {} not found", id))),
    }
}

async fn start_deploy(
    State(state): State<SharedState>,
    Json(req): Json<StartDeployRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let package = parse_package(&req.package)?;
    let result = state
        .orchestrator
        .start(&req.business, package, req.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn generate_build_url(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let contact: BuildUrlRequest = if body.is_empty() {
        BuildUrlRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    let job = state.orchestrator.require_job(&id).await?;
    let business = BusinessRef {
        id: job.business_id,
        name: job.business_name,
        phone: contact.phone,
        address: contact.address,
        ..BusinessRef::default()
    };
    let result = state.orchestrator.generate_build_url(&id, &business).await?;
    Ok(Json(result))
}

async fn confirm_publish(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.orchestrator.confirm_publish(&id).await?))
}

async fn deploy_from_repo(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<DeployRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .orchestrator
        .deploy_from_repo(&id, &req.github_repo)
        .await?;
    Ok(Json(result))
}

async fn mark_paid(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.orchestrator.mark_paid(&id).await?))
}

async fn mark_payment_failed(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.orchestrator.mark_payment_failed(&id).await?))
}

async fn retry_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.orchestrator.retry(&id).await?))
}

async fn stats(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.store.call(|db| db.stats()).await?;
    Ok(Json(stats))
}

async fn send_sms(
    State(state): State<SharedState>,
    Json(req): Json<SmsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .orchestrator
        .send_sms(&req.to, &req.message, &req.business_name)
        .await?;
    Ok(Json(result))
}

async fn send_email(
    State(state): State<SharedState>,
    Json(req): Json<EmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .orchestrator
        .send_email(&req.to, &req.subject, &req.body, &req.business_name)
        .await?;
    Ok(Json(result))
}

async fn trigger_website_build(
    State(state): State<SharedState>,
    Json(business): Json<BusinessRef>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.orchestrator.trigger_website_build(&business).await?))
}

async fn deploy_and_invoice(
    State(state): State<SharedState>,
    Json(req): Json<DeployInvoiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let package = parse_package(&req.package)?;
    let email = req
        .email
        .clone()
        .or_else(|| req.business.email.clone())
        .unwrap_or_default();
    let result = state
        .orchestrator
        .deploy_and_invoice(&req.business, &email, package, req.amount)
        .await?;
    Ok(Json(result))
}
