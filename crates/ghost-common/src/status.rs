//! Status vocabularies, one enum per boundary.
//!
//! | Enum               | Owner                         | Wire form          |
//! |--------------------|-------------------------------|--------------------|
//! | `BuildStatus`      | local job table               | kebab-case         |
//! | `PaymentStatus`    | local job table               | lowercase          |
//! | `DeployStage`      | deploy orchestrator           | kebab-case         |
//! | `DeploymentStatus` | external deployment callbacks | sender's own words |
//!
//! The only crossing between them is [`DeploymentStatus::local_status`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a build job. Moves forward only; `Error` is reachable from
/// anywhere and left again only through an explicit operator retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStatus {
    Queued,
    Building,
    GithubCreating,
    RenderProvisioning,
    AutoDeploying,
    Live,
    Error,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Building => "building",
            Self::GithubCreating => "github-creating",
            Self::RenderProvisioning => "render-provisioning",
            Self::AutoDeploying => "auto-deploying",
            Self::Live => "live",
            Self::Error => "error",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Building => 1,
            Self::GithubCreating => 2,
            Self::RenderProvisioning => 3,
            Self::AutoDeploying => 4,
            Self::Live => 5,
            Self::Error => 6,
        }
    }

    /// Whether a non-operator update may move a job from `self` to `next`.
    ///
    /// Re-applying the current status is allowed (and is a no-op).
    pub fn can_advance_to(self, next: BuildStatus) -> bool {
        if self == next {
            return true;
        }
        match (self, next) {
            (Self::Error, _) => false,
            (_, Self::Error) => true,
            (current, next) => next.rank() > current.rank(),
        }
    }

    pub fn is_in_flight(self) -> bool {
        !matches!(self, Self::Live | Self::Error)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "building" => Ok(Self::Building),
            "github-creating" => Ok(Self::GithubCreating),
            "render-provisioning" => Ok(Self::RenderProvisioning),
            "auto-deploying" => Ok(Self::AutoDeploying),
            "live" => Ok(Self::Live),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid build status: {}", s)),
        }
    }
}

/// Invoice state, independent of [`BuildStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    /// `pending → paid | failed`, plus the operator override `failed → paid`.
    /// `paid` is terminal.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid) | (Self::Pending, Self::Failed) | (Self::Failed, Self::Paid)
        ) || self == next
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// Human-in-the-loop deploy pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployStage {
    Initial,
    LovableReady,
    GithubReady,
    Complete,
}

impl DeployStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::LovableReady => "lovable-ready",
            Self::GithubReady => "github-ready",
            Self::Complete => "complete",
        }
    }

    /// Operator-facing label for the step that runs *from* this stage.
    pub fn step_label(&self) -> &'static str {
        match self {
            Self::Initial => "generate build URL",
            Self::LovableReady => "confirm GitHub publish",
            Self::GithubReady => "deploy to hosting",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(Self::Initial),
            "lovable-ready" => Ok(Self::LovableReady),
            "github-ready" => Ok(Self::GithubReady),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Invalid deploy stage: {}", s)),
        }
    }
}

/// Status word reported by the external deployment pipeline.
///
/// Anything the sender emits outside the known vocabulary is kept verbatim in
/// `Unknown` so it can be surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeploymentStatus {
    Pending,
    Deploying,
    Live,
    Failed,
    Unknown(String),
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Deploying => "deploying",
            Self::Live => "live",
            Self::Failed => "failed",
            Self::Unknown(raw) => raw,
        }
    }

    /// Translation table from the sender's vocabulary to [`BuildStatus`].
    ///
    /// Returns `None` for unrecognised words: those never move the local job.
    pub fn local_status(&self) -> Option<BuildStatus> {
        match self {
            Self::Live => Some(BuildStatus::Live),
            Self::Failed => Some(BuildStatus::Error),
            Self::Deploying => Some(BuildStatus::AutoDeploying),
            Self::Pending => Some(BuildStatus::Queued),
            Self::Unknown(_) => None,
        }
    }
}

impl From<&str> for DeploymentStatus {
    fn from(s: &str) -> Self {
        match s.trim() {
            "pending" => Self::Pending,
            "deploying" => Self::Deploying,
            "live" => Self::Live,
            "failed" => Self::Failed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for DeploymentStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<DeploymentStatus> for String {
    fn from(status: DeploymentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
