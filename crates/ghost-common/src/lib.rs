//! Shared domain types for the Ghost Hunter deployment back-end.

pub mod job;
pub mod package;
pub mod slug;
pub mod status;
pub mod wire;

pub use job::{BuildJob, BusinessRef, JobUpdate, NewBuildJob};
pub use package::{Package, PackageError};
pub use slug::slugify;
pub use status::{BuildStatus, DeployStage, DeploymentStatus, PaymentStatus};
