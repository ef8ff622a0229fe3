//! Typed error hierarchy for Ghost Hunter.
//!
//! One enum per subsystem:
//! - `AutomationError` — outbound calls to the n8n workflows
//! - `StoreError` — build-job table and ledger failures
//! - `OrchestratorError` — deploy pipeline stage violations
//! - `ProxyError` — credential proxy relay failures

use std::time::Duration;

use ghost_common::{DeployStage, PackageError};
use thiserror::Error;

/// Errors from an outbound automation webhook call.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Failed to reach automation service: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Webhook returned {status}")]
    Upstream { status: u16 },

    #[error("Malformed response from automation service: {0}")]
    MalformedResponse(String),

    #[error("Automation workflow reported failure: {0}")]
    Rejected(String),
}

/// Errors from the build-job store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Build job {id} not found")]
    JobNotFound { id: String },

    #[error("Invalid status transition for job {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Invalid amount {0}: must be a finite, non-negative number")]
    InvalidAmount(f64),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
}

/// Errors from the deploy orchestrator that are not stage results.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Job {id} is at stage '{actual}', expected '{expected}'")]
    WrongStage {
        id: String,
        expected: DeployStage,
        actual: DeployStage,
    },

    #[error("Job {id} is not in error state; nothing to retry")]
    NotRetryable { id: String },

    #[error("Job {id} is in error state; retry it before continuing")]
    JobInError { id: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the credential proxy relay.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Failed to read request body: {0}")]
    Body(String),

    #[error("Invalid upstream URL '{url}'")]
    InvalidUrl { url: String },

    #[error("Upstream request failed: {0}")]
    Upstream(#[source] reqwest::Error),

    #[error("Failed to build response: {0}")]
    Response(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(e: anyhow::Error) -> Self {
        StoreError::Database(e)
    }
}
