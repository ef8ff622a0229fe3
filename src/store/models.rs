use ghost_common::{BuildJob, BuildStatus, PaymentStatus};
use serde::{Deserialize, Serialize};

/// Revenue buckets. Each rolls over on its own calendar boundary (UTC).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revenue {
    pub today: f64,
    pub this_week: f64,
    pub this_month: f64,
    pub last_month: f64,
    pub total: f64,
}

/// Aggregate figures for the revenue dashboard.
///
/// `average_deal_size`, `close_rate` (percent) and `month_over_month` (percent
/// change against last month) are computed on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub pending_invoices: u32,
    pub pending_invoices_total: f64,
    pub revenue: Revenue,
    pub average_deal_size: f64,
    pub close_rate: f64,
    pub month_over_month: Option<f64>,
    pub total_jobs: u32,
    pub paid_jobs: u32,
}

/// A job as it was before and after one store mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobChange {
    pub before: BuildJob,
    pub after: BuildJob,
}

impl JobChange {
    pub fn status_changed(&self) -> bool {
        self.before.status != self.after.status
    }

    /// True when this mutation is the one that moved the job into `status`.
    pub fn entered(&self, status: BuildStatus) -> bool {
        self.status_changed() && self.after.status == status
    }

    /// True exactly once per job: on the mutation that confirmed payment.
    pub fn became_paid(&self) -> bool {
        self.before.payment_status != PaymentStatus::Paid
            && self.after.payment_status == PaymentStatus::Paid
    }
}
