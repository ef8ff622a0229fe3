use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::package::Package;
use crate::status::{BuildStatus, DeployStage, DeploymentStatus, PaymentStatus};

/// The slice of a CRM business record the deploy pipeline needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub place_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// One deployment attempt for a prospect business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildJob {
    pub id: String,
    pub business_id: String,
    pub business_name: String,
    pub package: Package,
    pub amount: f64,
    pub status: BuildStatus,
    pub payment_status: PaymentStatus,
    pub stage: DeployStage,
    pub triggered_at: DateTime<Utc>,
    pub build_url: Option<String>,
    pub preview_url: Option<String>,
    pub github_repo: Option<String>,
    pub render_service_id: Option<String>,
    pub render_deployment_url: Option<String>,
    pub deployment_status: Option<DeploymentStatus>,
    pub error_message: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl BuildJob {
    /// Generate a fresh opaque job id.
    pub fn new_id() -> String {
        format!("build-{}", uuid::Uuid::new_v4())
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

/// Fields supplied when a job is created; everything else starts empty.
#[derive(Debug, Clone)]
pub struct NewBuildJob {
    pub business_id: String,
    pub business_name: String,
    pub package: Package,
    pub amount: f64,
}

impl NewBuildJob {
    pub fn for_business(business: &BusinessRef, package: Package, amount: f64) -> Self {
        Self {
            business_id: business.id.clone(),
            business_name: business.name.clone(),
            package,
            amount,
        }
    }
}

/// Partial update merged into a stored job. `None` leaves a field untouched;
/// nothing here can clear a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<BuildStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub stage: Option<DeployStage>,
    pub build_url: Option<String>,
    pub preview_url: Option<String>,
    pub github_repo: Option<String>,
    pub render_service_id: Option<String>,
    pub render_deployment_url: Option<String>,
    pub deployment_status: Option<DeploymentStatus>,
    pub error_message: Option<String>,
    /// Explicit commercial-terms override.
    pub package: Option<Package>,
    pub amount: Option<f64>,
}

impl JobUpdate {
    pub fn status(status: BuildStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn payment(payment_status: PaymentStatus) -> Self {
        Self {
            payment_status: Some(payment_status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
