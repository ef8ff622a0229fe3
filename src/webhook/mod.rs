//! Deployment-status callbacks from the external deployment pipeline.
//!
//! `POST /api/webhooks/deployment-status` with header `X-Webhook-Secret`.
//! Checks run in a fixed order (body, auth, JSON, required fields) and
//! nothing is touched until all of them pass. After that every outcome is a
//! 200 so the sender never retries into a half-applied state.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use ghost_common::wire::DeploymentStatusWebhook;
use ghost_common::{DeploymentStatus, JobUpdate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dashboard::notify::{Notification, Notifier};
use crate::errors::StoreError;
use crate::store::{DbHandle, JobChange};

pub const SECRET_HEADER: &str = "x-webhook-secret";
pub const ROUTE: &str = "/api/webhooks/deployment-status";

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct WebhookState {
    pub store: DbHandle,
    pub notifier: Notifier,
    pub secret: Option<Arc<str>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookReply {
    pub success: bool,
    pub message: String,
}

fn reply(status: StatusCode, success: bool, message: &str) -> (StatusCode, Json<WebhookReply>) {
    (
        status,
        Json(WebhookReply {
            success,
            message: message.to_string(),
        }),
    )
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route(ROUTE, post(deployment_status))
        .with_state(state)
}

/// Constant-time secret check. Both sides are hashed first so the comparison
/// length never depends on the input. No configured secret rejects everything.
pub fn authenticate(expected: Option<&str>, provided: Option<&str>) -> bool {
    let (Some(expected), Some(provided)) = (expected, provided) else {
        return false;
    };
    if expected.is_empty() {
        return false;
    }
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(provided.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn non_empty_field<'a>(payload: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub async fn deployment_status(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Body,
) -> (StatusCode, Json<WebhookReply>) {
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read deployment-status body");
            return reply(StatusCode::INTERNAL_SERVER_ERROR, false, "Internal server error");
        }
    };

    let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if !authenticate(state.secret.as_deref(), provided) {
        tracing::warn!(
            has_header = provided.is_some(),
            "Rejected deployment-status callback with bad credentials"
        );
        return reply(StatusCode::UNAUTHORIZED, false, "Unauthorized");
    }

    let payload: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(payload) => payload,
        Err(_) => return reply(StatusCode::BAD_REQUEST, false, "Invalid JSON payload"),
    };
    if non_empty_field(&payload, "businessId").is_none()
        || non_empty_field(&payload, "status").is_none()
    {
        return reply(StatusCode::BAD_REQUEST, false, "Invalid payload");
    }
    let mut hook: DeploymentStatusWebhook = match serde_json::from_value(payload) {
        Ok(hook) => hook,
        Err(_) => return reply(StatusCode::BAD_REQUEST, false, "Invalid payload"),
    };
    hook.business_id = hook.business_id.trim().to_string();

    match reconcile(&state.store, &state.notifier, &hook).await {
        Ok(Reconciled::NoMatchingJob) => reply(
            StatusCode::OK,
            true,
            "Status received (no matching build job)",
        ),
        Ok(Reconciled::Applied(_)) => reply(StatusCode::OK, true, "Status received and processed"),
        Err(e) => {
            tracing::error!(
                business_id = %hook.business_id,
                error = %e,
                "Failed to apply deployment status"
            );
            reply(
                StatusCode::OK,
                true,
                "Status received (processing error logged)",
            )
        }
    }
}

#[derive(Debug)]
pub enum Reconciled {
    NoMatchingJob,
    Applied(JobChange),
}

/// Apply one callback to the latest job of its business.
///
/// Status only moves forward, URLs are write-once, and notifications fire
/// only when something actually changed, so replaying a callback is harmless.
pub async fn reconcile(
    store: &DbHandle,
    notifier: &Notifier,
    hook: &DeploymentStatusWebhook,
) -> Result<Reconciled, StoreError> {
    let business_id = hook.business_id.clone();
    let Some(job) = store
        .call(move |db| db.latest_job_for_business(&business_id))
        .await?
    else {
        tracing::warn!(
            business_id = %hook.business_id,
            status = %hook.status,
            "Deployment status for a business with no build job"
        );
        return Ok(Reconciled::NoMatchingJob);
    };

    let mut update = JobUpdate {
        status: hook.status.local_status(),
        deployment_status: Some(hook.status.clone()),
        preview_url: hook.render_url.clone(),
        render_deployment_url: hook.render_url.clone(),
        ..JobUpdate::default()
    };
    if hook.status == DeploymentStatus::Failed {
        update.error_message = Some(
            hook.error
                .clone()
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "Deployment failed".to_string()),
        );
    }

    let id = job.id.clone();
    let change = store.call(move |db| db.update_job(&id, &update)).await?;
    tracing::info!(
        job_id = %change.after.id,
        reported = %hook.status,
        from = %change.before.status,
        to = %change.after.status,
        "Deployment status applied"
    );

    notifier.job_changed(&change);
    if let DeploymentStatus::Unknown(raw) = &hook.status
        && change.before.deployment_status != change.after.deployment_status
    {
        notifier.notify(&Notification::NeedsAttention {
            job_id: change.after.id.clone(),
            business_name: change.after.business_name.clone(),
            reported_status: raw.clone(),
        });
    }

    Ok(Reconciled::Applied(change))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::notify::drain;
    use crate::store::JobDb;
    use axum::http::Request;
    use ghost_common::{BuildStatus, NewBuildJob, Package};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const SECRET: &str = "s3cret-hook-key";

    fn test_state() -> WebhookState {
        WebhookState {
            store: DbHandle::new(JobDb::new_in_memory().unwrap()),
            notifier: Notifier::new(),
            secret: Some(Arc::from(SECRET)),
        }
    }

    async fn seed_job(state: &WebhookState, business_id: &str) -> String {
        let new = NewBuildJob {
            business_id: business_id.to_string(),
            business_name: "Acme Plumbing".into(),
            package: Package::Business,
            amount: 300.0,
        };
        state
            .store
            .call(move |db| db.create_job(&new))
            .await
            .unwrap()
            .id
    }

    async fn send(
        state: &WebhookState,
        secret: Option<&str>,
        body: &str,
    ) -> (StatusCode, WebhookReply) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(ROUTE)
            .header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header("X-Webhook-Secret", secret);
        }
        let response = router(state.clone())
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn job(state: &WebhookState, id: &str) -> ghost_common::BuildJob {
        let id = id.to_string();
        state
            .store
            .call(move |db| db.get_job(&id))
            .await
            .unwrap()
            .unwrap()
    }

    const LIVE: &str = r#"{"businessId":"X","status":"live","renderUrl":"https://acme.onrender.com","timestamp":"2026-03-02T10:00:00Z"}"#;

    #[test]
    fn test_authenticate() {
        assert!(authenticate(Some("abc"), Some("abc")));
        assert!(!authenticate(Some("abc"), Some("abd")));
        assert!(!authenticate(Some("abc"), Some("abcd")));
        assert!(!authenticate(Some("abc"), None));
        assert!(!authenticate(None, Some("abc")));
        assert!(!authenticate(Some(""), Some("")));
    }

    #[tokio::test]
    async fn test_live_callback_updates_job() {
        let state = test_state();
        let id = seed_job(&state, "X").await;

        let (status, reply) = send(&state, Some(SECRET), LIVE).await;
        assert_eq!(status, StatusCode::OK);
        assert!(reply.success);
        assert_eq!(reply.message, "Status received and processed");

        let job = job(&state, &id).await;
        assert_eq!(job.status, BuildStatus::Live);
        assert_eq!(job.preview_url.as_deref(), Some("https://acme.onrender.com"));
        assert_eq!(job.deployment_status, Some(DeploymentStatus::Live));
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let state = test_state();
        let id = seed_job(&state, "X").await;
        let mut rx = state.notifier.subscribe();

        send(&state, Some(SECRET), LIVE).await;
        let after_first = job(&state, &id).await;
        let (status, reply) = send(&state, Some(SECRET), LIVE).await;
        let after_second = job(&state, &id).await;

        assert_eq!(status, StatusCode::OK);
        assert!(reply.success);
        assert_eq!(after_first, after_second);

        let live = drain(&mut rx)
            .into_iter()
            .filter(|n| matches!(n, Notification::SiteLive { .. }))
            .count();
        assert_eq!(live, 1);
    }

    #[tokio::test]
    async fn test_missing_secret_is_unauthorized() {
        let state = test_state();
        let id = seed_job(&state, "X").await;
        let before = job(&state, &id).await;

        let (status, reply) = send(&state, None, LIVE).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(!reply.success);
        assert_eq!(reply.message, "Unauthorized");
        assert_eq!(job(&state, &id).await, before);

        let (status, _) = send(&state, Some("wrong"), LIVE).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unconfigured_secret_rejects_everything() {
        let state = WebhookState {
            secret: None,
            ..test_state()
        };
        let (status, _) = send(&state, Some(SECRET), LIVE).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_checked_before_json() {
        let state = test_state();
        let (status, _) = send(&state, None, "not json").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, reply) = send(&state, Some(SECRET), "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.message, "Invalid JSON payload");
    }

    #[tokio::test]
    async fn test_missing_fields_are_invalid() {
        let state = test_state();
        for body in [
            r#"{"status":"live"}"#,
            r#"{"businessId":"X"}"#,
            r#"{"businessId":"  ","status":"live"}"#,
            r#"{"businessId":"X","status":""}"#,
            r#"{"businessId":"X","status":"live","renderUrl":42}"#,
        ] {
            let (status, reply) = send(&state, Some(SECRET), body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
            assert_eq!(reply.message, "Invalid payload");
        }
    }

    #[tokio::test]
    async fn test_unknown_business_creates_nothing() {
        let state = test_state();
        let (status, reply) = send(&state, Some(SECRET), LIVE).await;
        assert_eq!(status, StatusCode::OK);
        assert!(reply.success);
        assert_eq!(reply.message, "Status received (no matching build job)");

        let jobs = state.store.call(|db| db.list_jobs()).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn test_stale_callback_cannot_regress() {
        let state = test_state();
        let id = seed_job(&state, "X").await;
        send(&state, Some(SECRET), LIVE).await;

        let deploying = r#"{"businessId":"X","status":"deploying"}"#;
        let (status, _) = send(&state, Some(SECRET), deploying).await;
        assert_eq!(status, StatusCode::OK);
        let job = job(&state, &id).await;
        assert_eq!(job.status, BuildStatus::Live);
        assert_eq!(job.deployment_status, Some(DeploymentStatus::Deploying));
    }

    #[tokio::test]
    async fn test_failed_callback_records_error() {
        let state = test_state();
        let id = seed_job(&state, "X").await;
        let mut rx = state.notifier.subscribe();

        let failed = r#"{"businessId":"X","status":"failed","error":"Build exited with 1"}"#;
        send(&state, Some(SECRET), failed).await;

        let job = job(&state, &id).await;
        assert_eq!(job.status, BuildStatus::Error);
        assert_eq!(job.error_message.as_deref(), Some("Build exited with 1"));
        assert!(
            drain(&mut rx)
                .iter()
                .any(|n| matches!(n, Notification::DeployFailed { .. }))
        );
    }

    #[tokio::test]
    async fn test_unknown_status_needs_attention() {
        let state = test_state();
        let id = seed_job(&state, "X").await;
        let mut rx = state.notifier.subscribe();

        let body = r#"{"businessId":"X","status":"suspended"}"#;
        let (status, reply) = send(&state, Some(SECRET), body).await;
        assert_eq!(status, StatusCode::OK);
        assert!(reply.success);
        send(&state, Some(SECRET), body).await;

        let job = job(&state, &id).await;
        assert_eq!(job.status, BuildStatus::Queued);
        assert_eq!(
            job.deployment_status,
            Some(DeploymentStatus::Unknown("suspended".into()))
        );
        let attention = drain(&mut rx)
            .into_iter()
            .filter(|n| matches!(n, Notification::NeedsAttention { .. }))
            .count();
        assert_eq!(attention, 1);
    }

    #[tokio::test]
    async fn test_oversized_body_is_server_error() {
        let state = test_state();
        let id = seed_job(&state, "X").await;
        let padding = "x".repeat(MAX_BODY_BYTES + 1);
        let body = format!(r#"{{"businessId":"X","status":"live","error":"{}"}}"#, padding);

        let (status, reply) = send(&state, Some(SECRET), &body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!reply.success);
        assert_eq!(reply.message, "Internal server error");
        assert_eq!(job(&state, &id).await.status, BuildStatus::Queued);
    }

    #[tokio::test]
    async fn test_store_failure_after_auth_is_acknowledged() {
        let state = test_state();
        state.store.call(|db| db.drop_jobs_table()).await.unwrap();

        let (status, reply) = send(&state, Some(SECRET), LIVE).await;
        assert_eq!(status, StatusCode::OK);
        assert!(reply.success);
        assert_eq!(reply.message, "Status received (processing error logged)");

        let (status, _) = send(&state, None, LIVE).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_deploying_callback_notifies_once() {
        let state = test_state();
        let id = seed_job(&state, "X").await;
        let mut rx = state.notifier.subscribe();

        let deploying = r#"{"businessId":"X","status":"deploying"}"#;
        send(&state, Some(SECRET), deploying).await;
        send(&state, Some(SECRET), deploying).await;

        assert_eq!(job(&state, &id).await.status, BuildStatus::AutoDeploying);
        let deploying = drain(&mut rx)
            .into_iter()
            .filter(|n| matches!(n, Notification::Deploying { .. }))
            .count();
        assert_eq!(deploying, 1);
    }

    #[tokio::test]
    async fn test_targets_latest_job_for_business() {
        let state = test_state();
        let older = seed_job(&state, "X").await;
        let newer = seed_job(&state, "X").await;

        send(&state, Some(SECRET), LIVE).await;
        assert_eq!(job(&state, &newer).await.status, BuildStatus::Live);
        assert_eq!(job(&state, &older).await.status, BuildStatus::Queued);
    }
}
