use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, SecondsFormat, TimeDelta, Utc};
use ghost_common::{
    BuildJob, BuildStatus, DeployStage, DeploymentStatus, JobUpdate, NewBuildJob, Package,
    PaymentStatus,
};
use rusqlite::{Connection, OptionalExtension, params};

use super::models::{JobChange, JobStats, Revenue};
use crate::errors::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Async-safe handle to the job database.
///
/// Wraps `JobDb` behind `Arc<Mutex>` and runs every access on tokio's blocking
/// pool via `spawn_blocking`. The mutex makes the store a single writer.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<JobDb>>,
}

impl DbHandle {
    pub fn new(db: JobDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&JobDb) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct JobDb {
    conn: Connection,
}

const JOB_COLUMNS: &str = "id, business_id, business_name, package, amount, status, payment_status, stage, triggered_at, build_url, preview_url, github_repo, render_service_id, render_deployment_url, deployment_status, error_message, paid_at";

impl JobDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Break the schema so every later query fails.
    #[cfg(test)]
    pub(crate) fn drop_jobs_table(&self) -> StoreResult<()> {
        self.conn
            .execute_batch("DROP TABLE build_jobs;")
            .context("Failed to drop build_jobs")?;
        Ok(())
    }

    fn init(&self) -> anyhow::Result<()> {
        // Every committed mutation is synced before the call returns.
        self.conn
            .execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;")
            .context("Failed to configure SQLite durability")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS build_jobs (
                    id TEXT PRIMARY KEY,
                    business_id TEXT NOT NULL,
                    business_name TEXT NOT NULL,
                    package TEXT NOT NULL,
                    amount REAL NOT NULL,
                    status TEXT NOT NULL DEFAULT 'queued',
                    payment_status TEXT NOT NULL DEFAULT 'pending',
                    stage TEXT NOT NULL DEFAULT 'initial',
                    triggered_at TEXT NOT NULL,
                    build_url TEXT,
                    preview_url TEXT,
                    github_repo TEXT,
                    render_service_id TEXT,
                    render_deployment_url TEXT,
                    deployment_status TEXT,
                    error_message TEXT,
                    paid_at TEXT
                );

                CREATE TABLE IF NOT EXISTS ledger (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    pending_count INTEGER NOT NULL DEFAULT 0,
                    pending_total REAL NOT NULL DEFAULT 0,
                    revenue_today REAL NOT NULL DEFAULT 0,
                    revenue_week REAL NOT NULL DEFAULT 0,
                    revenue_month REAL NOT NULL DEFAULT 0,
                    revenue_last_month REAL NOT NULL DEFAULT 0,
                    revenue_total REAL NOT NULL DEFAULT 0,
                    day_key TEXT NOT NULL DEFAULT '',
                    week_key TEXT NOT NULL DEFAULT '',
                    month_key TEXT NOT NULL DEFAULT ''
                );

                INSERT OR IGNORE INTO ledger (id) VALUES (1);

                CREATE INDEX IF NOT EXISTS idx_build_jobs_business ON build_jobs(business_id, triggered_at);
                CREATE INDEX IF NOT EXISTS idx_build_jobs_payment ON build_jobs(payment_status);
                CREATE INDEX IF NOT EXISTS idx_build_jobs_triggered ON build_jobs(triggered_at);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Jobs ──────────────────────────────────────────────────────────

    /// Insert a new job (`queued`, `pending`, stage `initial`) and add its
    /// amount to the pending-invoice figures.
    pub fn create_job(&self, new: &NewBuildJob) -> StoreResult<BuildJob> {
        self.create_job_at(new, Utc::now())
    }

    pub fn create_job_at(&self, new: &NewBuildJob, now: DateTime<Utc>) -> StoreResult<BuildJob> {
        check_amount(new.amount)?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let triggered_at = self.next_triggered_at(now)?;
        let job = BuildJob {
            id: BuildJob::new_id(),
            business_id: new.business_id.clone(),
            business_name: new.business_name.clone(),
            package: new.package,
            amount: new.amount,
            status: BuildStatus::Queued,
            payment_status: PaymentStatus::Pending,
            stage: DeployStage::Initial,
            triggered_at,
            build_url: None,
            preview_url: None,
            github_repo: None,
            render_service_id: None,
            render_deployment_url: None,
            deployment_status: None,
            error_message: None,
            paid_at: None,
        };

        self.conn
            .execute(
                &format!(
                    "INSERT INTO build_jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL)",
                    JOB_COLUMNS
                ),
                params![
                    job.id,
                    job.business_id,
                    job.business_name,
                    job.package.as_str(),
                    job.amount,
                    job.status.as_str(),
                    job.payment_status.as_str(),
                    job.stage.as_str(),
                    fmt_ts(&job.triggered_at),
                ],
            )
            .context("Failed to insert build job")?;

        self.conn
            .execute(
                "UPDATE ledger SET pending_count = pending_count + 1, pending_total = pending_total + ?1 WHERE id = 1",
                params![job.amount],
            )
            .context("Failed to update pending invoices")?;

        tx.commit().context("Failed to commit build job")?;
        Ok(job)
    }

    /// Strictly after every existing job, and never before `now`.
    fn next_triggered_at(&self, now: DateTime<Utc>) -> StoreResult<DateTime<Utc>> {
        let now = truncate_micros(now);
        let latest: Option<String> = self
            .conn
            .query_row("SELECT MAX(triggered_at) FROM build_jobs", [], |row| {
                row.get(0)
            })
            .context("Failed to read latest trigger time")?;
        let next = match latest {
            Some(raw) => {
                let latest = parse_ts(&raw)?;
                if now > latest {
                    now
                } else {
                    latest + TimeDelta::microseconds(1)
                }
            }
            None => now,
        };
        Ok(next)
    }

    /// Merge `update` into job `id` and return the job before and after.
    ///
    /// * `status` only moves forward; a regressive value is ignored.
    /// * `payment_status` must follow `pending → paid | failed`, `failed → paid`;
    ///   anything else is rejected.
    /// * URL and repository fields are write-once.
    /// * `error_message` is only recorded on the transition into `error`.
    /// * Moving into `paid` takes the job's amount off the pending figures
    ///   (clamped at zero).
    pub fn update_job(&self, id: &str, update: &JobUpdate) -> StoreResult<JobChange> {
        self.update_job_at(id, update, Utc::now())
    }

    pub fn update_job_at(
        &self,
        id: &str,
        update: &JobUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<JobChange> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let change = self.apply_update(id, update, now)?;
        tx.commit().context("Failed to commit job update")?;
        Ok(change)
    }

    fn apply_update(
        &self,
        id: &str,
        update: &JobUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<JobChange> {
        let before = self.require_job(id)?;
        let mut after = before.clone();

        if let Some(next) = update.payment_status {
            if !before.payment_status.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    id: id.to_string(),
                    from: before.payment_status.to_string(),
                    to: next.to_string(),
                });
            }
            after.payment_status = next;
        }

        if let Some(next) = update.status {
            if before.status.can_advance_to(next) {
                after.status = next;
            } else {
                tracing::debug!(
                    job_id = %id,
                    from = %before.status,
                    to = %next,
                    "Ignoring regressive status update"
                );
            }
        }

        if after.status == BuildStatus::Error
            && before.status != BuildStatus::Error
            && let Some(message) = non_empty(&update.error_message)
        {
            after.error_message = Some(message.to_string());
        }

        if let Some(stage) = update.stage {
            after.stage = stage;
        }
        if let Some(status) = &update.deployment_status {
            after.deployment_status = Some(status.clone());
        }
        if let Some(package) = update.package {
            after.package = package;
        }
        if let Some(amount) = update.amount {
            check_amount(amount)?;
            after.amount = amount;
        }

        write_once(&mut after.build_url, &update.build_url);
        write_once(&mut after.preview_url, &update.preview_url);
        write_once(&mut after.github_repo, &update.github_repo);
        write_once(&mut after.render_service_id, &update.render_service_id);
        write_once(&mut after.render_deployment_url, &update.render_deployment_url);

        let mut change = JobChange { before, after };
        if change.became_paid() {
            change.after.paid_at = Some(truncate_micros(now));
        }

        self.write_job(&change.after)?;
        self.adjust_pending(&change)?;
        Ok(change)
    }

    fn adjust_pending(&self, change: &JobChange) -> StoreResult<()> {
        let was_unpaid = change.before.payment_status != PaymentStatus::Paid;
        let amount_delta = change.after.amount - change.before.amount;

        if was_unpaid && amount_delta != 0.0 {
            self.conn
                .execute(
                    "UPDATE ledger SET pending_total = MAX(pending_total + ?1, 0) WHERE id = 1",
                    params![amount_delta],
                )
                .context("Failed to adjust pending total")?;
        }

        if change.became_paid() {
            self.conn
                .execute(
                    "UPDATE ledger SET pending_count = MAX(pending_count - 1, 0), pending_total = MAX(pending_total - ?1, 0) WHERE id = 1",
                    params![change.after.amount],
                )
                .context("Failed to decrement pending invoices")?;
        }
        Ok(())
    }

    fn write_job(&self, job: &BuildJob) -> StoreResult<()> {
        self.conn
            .execute(
                "UPDATE build_jobs SET package = ?1, amount = ?2, status = ?3, payment_status = ?4, stage = ?5,
                    build_url = ?6, preview_url = ?7, github_repo = ?8, render_service_id = ?9,
                    render_deployment_url = ?10, deployment_status = ?11, error_message = ?12, paid_at = ?13
                 WHERE id = ?14",
                params![
                    job.package.as_str(),
                    job.amount,
                    job.status.as_str(),
                    job.payment_status.as_str(),
                    job.stage.as_str(),
                    job.build_url,
                    job.preview_url,
                    job.github_repo,
                    job.render_service_id,
                    job.render_deployment_url,
                    job.deployment_status.as_ref().map(|s| s.as_str().to_string()),
                    job.error_message,
                    job.paid_at.as_ref().map(fmt_ts),
                    job.id,
                ],
            )
            .context("Failed to update build job")?;
        Ok(())
    }

    /// Operator retry: `error → building`, error message cleared. The stage
    /// falls back to `initial` when no build URL was ever obtained.
    pub fn retry_job(&self, id: &str) -> StoreResult<JobChange> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let before = self.require_job(id)?;
        if before.status != BuildStatus::Error {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: before.status.to_string(),
                to: BuildStatus::Building.to_string(),
            });
        }

        let mut after = before.clone();
        after.status = BuildStatus::Building;
        after.error_message = None;
        if after.build_url.is_none() {
            after.stage = DeployStage::Initial;
        }
        self.write_job(&after)?;

        tx.commit().context("Failed to commit retry")?;
        Ok(JobChange { before, after })
    }

    /// Confirm payment and book the revenue in one transaction. A job that is
    /// already paid is returned unchanged and nothing is booked.
    pub fn confirm_payment(&self, id: &str, now: DateTime<Utc>) -> StoreResult<JobChange> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let change = self.apply_update(id, &JobUpdate::payment(PaymentStatus::Paid), now)?;
        if change.became_paid() {
            self.book_revenue(change.after.amount, now)?;
        }
        tx.commit().context("Failed to commit payment")?;
        Ok(change)
    }

    pub fn get_job(&self, id: &str) -> StoreResult<Option<BuildJob>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM build_jobs WHERE id = ?1", JOB_COLUMNS),
                params![id],
                read_job_row,
            )
            .optional()
            .context("Failed to query build job")?;
        row.map(JobRow::into_job).transpose()
    }

    fn require_job(&self, id: &str) -> StoreResult<BuildJob> {
        self.get_job(id)?.ok_or_else(|| StoreError::JobNotFound {
            id: id.to_string(),
        })
    }

    /// All jobs, newest first.
    pub fn list_jobs(&self) -> StoreResult<Vec<BuildJob>> {
        self.query_jobs(
            &format!(
                "SELECT {} FROM build_jobs ORDER BY triggered_at DESC",
                JOB_COLUMNS
            ),
            params![],
        )
    }

    pub fn recent_jobs(&self, limit: u32) -> StoreResult<Vec<BuildJob>> {
        self.query_jobs(
            &format!(
                "SELECT {} FROM build_jobs ORDER BY triggered_at DESC LIMIT ?1",
                JOB_COLUMNS
            ),
            params![limit],
        )
    }

    pub fn jobs_by_payment_status(&self, status: PaymentStatus) -> StoreResult<Vec<BuildJob>> {
        self.query_jobs(
            &format!(
                "SELECT {} FROM build_jobs WHERE payment_status = ?1 ORDER BY triggered_at DESC",
                JOB_COLUMNS
            ),
            params![status.as_str()],
        )
    }

    /// Most recently triggered job for a CRM business.
    pub fn latest_job_for_business(&self, business_id: &str) -> StoreResult<Option<BuildJob>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM build_jobs WHERE business_id = ?1 ORDER BY triggered_at DESC LIMIT 1",
                    JOB_COLUMNS
                ),
                params![business_id],
                read_job_row,
            )
            .optional()
            .context("Failed to query latest job for business")?;
        row.map(JobRow::into_job).transpose()
    }

    fn query_jobs(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> StoreResult<Vec<BuildJob>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare job query")?;
        let rows = stmt
            .query_map(params, read_job_row)
            .context("Failed to query build jobs")?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.context("Failed to read build job row")?.into_job()?);
        }
        Ok(jobs)
    }

    // ── Ledger ────────────────────────────────────────────────────────

    /// Add a confirmed payment to today, this week, this month and the
    /// all-time total, rolling buckets forward to `now` first.
    pub fn add_revenue(&self, amount: f64, now: DateTime<Utc>) -> StoreResult<Revenue> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let revenue = self.book_revenue(amount, now)?;
        tx.commit().context("Failed to commit revenue")?;
        Ok(revenue)
    }

    fn book_revenue(&self, amount: f64, now: DateTime<Utc>) -> StoreResult<Revenue> {
        check_amount(amount)?;
        let mut ledger = self.load_ledger()?.rolled_to(now);
        ledger.revenue.today += amount;
        ledger.revenue.this_week += amount;
        ledger.revenue.this_month += amount;
        ledger.revenue.total += amount;
        self.save_ledger(&ledger)?;
        Ok(ledger.revenue)
    }

    pub fn stats(&self) -> StoreResult<JobStats> {
        self.stats_at(Utc::now())
    }

    /// Aggregate figures as seen at `now`. Buckets that `now` has rolled past
    /// read as zero; nothing is written.
    pub fn stats_at(&self, now: DateTime<Utc>) -> StoreResult<JobStats> {
        let ledger = self.load_ledger()?.rolled_to(now);
        let (total_jobs, paid_jobs, paid_sum): (i64, i64, f64) = self
            .conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN payment_status = 'paid' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN payment_status = 'paid' THEN amount ELSE 0.0 END), 0.0)
                 FROM build_jobs",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .context("Failed to aggregate build jobs")?;

        let average_deal_size = if paid_jobs > 0 {
            paid_sum / paid_jobs as f64
        } else {
            0.0
        };
        let close_rate = if total_jobs > 0 {
            paid_jobs as f64 / total_jobs as f64 * 100.0
        } else {
            0.0
        };
        let month_over_month = (ledger.revenue.last_month > 0.0).then(|| {
            (ledger.revenue.this_month - ledger.revenue.last_month) / ledger.revenue.last_month
                * 100.0
        });

        Ok(JobStats {
            pending_invoices: ledger.pending_count.max(0) as u32,
            pending_invoices_total: ledger.pending_total.max(0.0),
            revenue: ledger.revenue,
            average_deal_size,
            close_rate,
            month_over_month,
            total_jobs: total_jobs as u32,
            paid_jobs: paid_jobs as u32,
        })
    }

    fn load_ledger(&self) -> StoreResult<Ledger> {
        let ledger = self
            .conn
            .query_row(
                "SELECT pending_count, pending_total, revenue_today, revenue_week, revenue_month,
                        revenue_last_month, revenue_total, day_key, week_key, month_key
                 FROM ledger WHERE id = 1",
                [],
                |row| {
                    Ok(Ledger {
                        pending_count: row.get(0)?,
                        pending_total: row.get(1)?,
                        revenue: Revenue {
                            today: row.get(2)?,
                            this_week: row.get(3)?,
                            this_month: row.get(4)?,
                            last_month: row.get(5)?,
                            total: row.get(6)?,
                        },
                        day_key: row.get(7)?,
                        week_key: row.get(8)?,
                        month_key: row.get(9)?,
                    })
                },
            )
            .context("Failed to read ledger")?;
        Ok(ledger)
    }

    fn save_ledger(&self, ledger: &Ledger) -> StoreResult<()> {
        self.conn
            .execute(
                "UPDATE ledger SET pending_count = ?1, pending_total = ?2, revenue_today = ?3,
                    revenue_week = ?4, revenue_month = ?5, revenue_last_month = ?6, revenue_total = ?7,
                    day_key = ?8, week_key = ?9, month_key = ?10
                 WHERE id = 1",
                params![
                    ledger.pending_count,
                    ledger.pending_total,
                    ledger.revenue.today,
                    ledger.revenue.this_week,
                    ledger.revenue.this_month,
                    ledger.revenue.last_month,
                    ledger.revenue.total,
                    ledger.day_key,
                    ledger.week_key,
                    ledger.month_key,
                ],
            )
            .context("Failed to write ledger")?;
        Ok(())
    }
}

/// Single-row money ledger.
#[derive(Debug, Clone)]
struct Ledger {
    pending_count: i64,
    pending_total: f64,
    revenue: Revenue,
    day_key: String,
    week_key: String,
    month_key: String,
}

impl Ledger {
    /// Zero every bucket whose period ended before `now`. The month being
    /// closed becomes `last_month` only if it is the calendar month right
    /// before `now`'s.
    fn rolled_to(mut self, now: DateTime<Utc>) -> Self {
        let day = now.format("%Y-%m-%d").to_string();
        let iso = now.iso_week();
        let week = format!("{}-W{:02}", iso.year(), iso.week());
        let month = now.format("%Y-%m").to_string();

        if self.month_key != month {
            self.revenue.last_month = if is_previous_month(&self.month_key, &now) {
                self.revenue.this_month
            } else {
                0.0
            };
            self.revenue.this_month = 0.0;
            self.month_key = month;
        }
        if self.week_key != week {
            self.revenue.this_week = 0.0;
            self.week_key = week;
        }
        if self.day_key != day {
            self.revenue.today = 0.0;
            self.day_key = day;
        }
        self
    }
}

fn is_previous_month(key: &str, now: &DateTime<Utc>) -> bool {
    let Some((year, month)) = key.split_once('-') else {
        return false;
    };
    let (Ok(year), Ok(month)) = (year.parse::<i32>(), month.parse::<i32>()) else {
        return false;
    };
    let stored = year * 12 + (month - 1);
    let current = now.year() * 12 + now.month0() as i32;
    current - stored == 1
}

fn check_amount(amount: f64) -> StoreResult<()> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(StoreError::InvalidAmount(amount))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// First non-empty value wins; later writes never clear or replace it.
fn write_once(slot: &mut Option<String>, value: &Option<String>) {
    if slot.as_deref().is_none_or(|s| s.trim().is_empty())
        && let Some(value) = non_empty(value)
    {
        *slot = Some(value.to_string());
    }
}

fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Failed to parse timestamp '{}'", raw))?;
    Ok(ts.with_timezone(&Utc))
}

fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

/// Intermediate row struct for build_jobs.
struct JobRow {
    id: String,
    business_id: String,
    business_name: String,
    package: String,
    amount: f64,
    status: String,
    payment_status: String,
    stage: String,
    triggered_at: String,
    build_url: Option<String>,
    preview_url: Option<String>,
    github_repo: Option<String>,
    render_service_id: Option<String>,
    render_deployment_url: Option<String>,
    deployment_status: Option<String>,
    error_message: Option<String>,
    paid_at: Option<String>,
}

fn read_job_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRow> {
    Ok(JobRow {
        id: row.get(0)?,
        business_id: row.get(1)?,
        business_name: row.get(2)?,
        package: row.get(3)?,
        amount: row.get(4)?,
        status: row.get(5)?,
        payment_status: row.get(6)?,
        stage: row.get(7)?,
        triggered_at: row.get(8)?,
        build_url: row.get(9)?,
        preview_url: row.get(10)?,
        github_repo: row.get(11)?,
        render_service_id: row.get(12)?,
        render_deployment_url: row.get(13)?,
        deployment_status: row.get(14)?,
        error_message: row.get(15)?,
        paid_at: row.get(16)?,
    })
}

impl JobRow {
    fn into_job(self) -> StoreResult<BuildJob> {
        let package = Package::from_str(&self.package)
            .map_err(|e| anyhow!(e))
            .context("Failed to parse job package")?;
        let status = BuildStatus::from_str(&self.status)
            .map_err(|e| anyhow!(e))
            .context("Failed to parse job status")?;
        let payment_status = PaymentStatus::from_str(&self.payment_status)
            .map_err(|e| anyhow!(e))
            .context("Failed to parse payment status")?;
        let stage = DeployStage::from_str(&self.stage)
            .map_err(|e| anyhow!(e))
            .context("Failed to parse deploy stage")?;
        let paid_at = self.paid_at.as_deref().map(parse_ts).transpose()?;

        Ok(BuildJob {
            id: self.id,
            business_id: self.business_id,
            business_name: self.business_name,
            package,
            amount: self.amount,
            status,
            payment_status,
            stage,
            triggered_at: parse_ts(&self.triggered_at)?,
            build_url: self.build_url,
            preview_url: self.preview_url,
            github_repo: self.github_repo,
            render_service_id: self.render_service_id,
            render_deployment_url: self.render_deployment_url,
            deployment_status: self.deployment_status.map(DeploymentStatus::from),
            error_message: self.error_message,
            paid_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn acme() -> NewBuildJob {
        NewBuildJob {
            business_id: "rec-acme".into(),
            business_name: "Acme Plumbing".into(),
            package: Package::Business,
            amount: 300.0,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_create_database_and_run_migrations() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('build_jobs', 'ledger')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 2);

        let ledger_rows: i32 = db
            .conn
            .query_row("SELECT COUNT(*) FROM ledger", [], |row| row.get(0))?;
        assert_eq!(ledger_rows, 1);
        Ok(())
    }

    #[test]
    fn test_create_job_starts_queued_and_pending() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;

        assert!(job.id.starts_with("build-"));
        assert_eq!(job.status, BuildStatus::Queued);
        assert_eq!(job.payment_status, PaymentStatus::Pending);
        assert_eq!(job.stage, DeployStage::Initial);
        assert_eq!(db.get_job(&job.id)?, Some(job));

        let stats = db.stats()?;
        assert_eq!(stats.pending_invoices, 1);
        assert_eq!(stats.pending_invoices_total, 300.0);
        assert_eq!(stats.total_jobs, 1);
        Ok(())
    }

    #[test]
    fn test_create_job_rejects_negative_amount() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let mut new = acme();
        new.amount = -5.0;
        assert!(matches!(
            db.create_job(&new),
            Err(StoreError::InvalidAmount(_))
        ));
        assert_eq!(db.stats()?.total_jobs, 0);
        Ok(())
    }

    #[test]
    fn test_triggered_at_is_strictly_increasing() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let now = at(2026, 3, 2);
        let first = db.create_job_at(&acme(), now)?;
        let second = db.create_job_at(&acme(), now)?;
        let third = db.create_job_at(&acme(), now - TimeDelta::hours(1))?;

        assert!(second.triggered_at > first.triggered_at);
        assert!(third.triggered_at > second.triggered_at);

        let listed = db.list_jobs()?;
        assert_eq!(listed[0].id, third.id);
        assert_eq!(listed[2].id, first.id);
        Ok(())
    }

    #[test]
    fn test_status_never_regresses() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;
        db.update_job(&job.id, &JobUpdate::status(BuildStatus::Live))?;

        let change = db.update_job(&job.id, &JobUpdate::status(BuildStatus::AutoDeploying))?;
        assert!(!change.status_changed());
        assert_eq!(change.after.status, BuildStatus::Live);
        Ok(())
    }

    #[test]
    fn test_error_message_only_on_transition_into_error() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;

        let update = JobUpdate {
            error_message: Some("too early".into()),
            ..JobUpdate::status(BuildStatus::Building)
        };
        let change = db.update_job(&job.id, &update)?;
        assert!(change.after.error_message.is_none());

        let update = JobUpdate {
            error_message: Some("Render build failed".into()),
            ..JobUpdate::status(BuildStatus::Error)
        };
        let change = db.update_job(&job.id, &update)?;
        assert_eq!(change.after.error_message.as_deref(), Some("Render build failed"));

        let update = JobUpdate {
            error_message: Some("second failure".into()),
            ..JobUpdate::status(BuildStatus::Error)
        };
        let change = db.update_job(&job.id, &update)?;
        assert_eq!(change.after.error_message.as_deref(), Some("Render build failed"));
        Ok(())
    }

    #[test]
    fn test_url_fields_are_write_once() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;

        let first = JobUpdate {
            preview_url: Some("https://acme.onrender.com".into()),
            ..JobUpdate::default()
        };
        db.update_job(&job.id, &first)?;

        let second = JobUpdate {
            preview_url: Some("https://other.onrender.com".into()),
            render_deployment_url: Some("https://acme-2.onrender.com".into()),
            ..JobUpdate::default()
        };
        let change = db.update_job(&job.id, &second)?;
        assert_eq!(change.after.preview_url.as_deref(), Some("https://acme.onrender.com"));
        assert_eq!(
            change.after.render_deployment_url.as_deref(),
            Some("https://acme-2.onrender.com")
        );

        let blank = JobUpdate {
            render_deployment_url: Some("  ".into()),
            ..JobUpdate::default()
        };
        let change = db.update_job(&job.id, &blank)?;
        assert_eq!(
            change.after.render_deployment_url.as_deref(),
            Some("https://acme-2.onrender.com")
        );
        Ok(())
    }

    #[test]
    fn test_paid_decrements_pending_exactly_once() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;
        let other = db.create_job(&NewBuildJob {
            amount: 150.0,
            package: Package::Starter,
            ..acme()
        })?;

        let change = db.update_job(&job.id, &JobUpdate::payment(PaymentStatus::Paid))?;
        assert!(change.became_paid());
        assert!(change.after.paid_at.is_some());

        let stats = db.stats()?;
        assert_eq!(stats.pending_invoices, 1);
        assert_eq!(stats.pending_invoices_total, 150.0);

        let again = db.update_job(&job.id, &JobUpdate::payment(PaymentStatus::Paid))?;
        assert!(!again.became_paid());
        assert_eq!(again.after.paid_at, change.after.paid_at);
        let stats = db.stats()?;
        assert_eq!(stats.pending_invoices, 1);
        assert_eq!(stats.pending_invoices_total, 150.0);

        assert_eq!(db.get_job(&other.id)?.unwrap().payment_status, PaymentStatus::Pending);
        Ok(())
    }

    #[test]
    fn test_pending_figures_clamp_at_zero() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;
        db.conn.execute(
            "UPDATE ledger SET pending_count = 0, pending_total = 100 WHERE id = 1",
            [],
        )?;

        db.update_job(&job.id, &JobUpdate::payment(PaymentStatus::Paid))?;
        let stats = db.stats()?;
        assert_eq!(stats.pending_invoices, 0);
        assert_eq!(stats.pending_invoices_total, 0.0);
        Ok(())
    }

    #[test]
    fn test_payment_transitions_are_enforced() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;
        db.update_job(&job.id, &JobUpdate::payment(PaymentStatus::Failed))?;

        // Operator override: failed -> paid.
        let change = db.update_job(&job.id, &JobUpdate::payment(PaymentStatus::Paid))?;
        assert!(change.became_paid());

        let err = db
            .update_job(&job.id, &JobUpdate::payment(PaymentStatus::Failed))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert!(db.get_job(&job.id)?.unwrap().is_paid());
        Ok(())
    }

    #[test]
    fn test_amount_override_adjusts_pending_total() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;
        let update = JobUpdate {
            package: Some(Package::Premium),
            amount: Some(500.0),
            ..JobUpdate::default()
        };
        let change = db.update_job(&job.id, &update)?;
        assert_eq!(change.after.package, Package::Premium);
        assert_eq!(db.stats()?.pending_invoices_total, 500.0);
        Ok(())
    }

    #[test]
    fn test_update_missing_job() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let err = db
            .update_job("build-missing", &JobUpdate::status(BuildStatus::Live))
            .unwrap_err();
        assert!(matches!(err, StoreError::JobNotFound { .. }));
        Ok(())
    }

    #[test]
    fn test_retry_only_from_error() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;
        assert!(matches!(
            db.retry_job(&job.id),
            Err(StoreError::InvalidTransition { .. })
        ));

        let update = JobUpdate {
            error_message: Some("Network error".into()),
            stage: Some(DeployStage::LovableReady),
            ..JobUpdate::status(BuildStatus::Error)
        };
        db.update_job(&job.id, &update)?;

        let change = db.retry_job(&job.id)?;
        assert_eq!(change.after.status, BuildStatus::Building);
        assert!(change.after.error_message.is_none());
        assert_eq!(change.after.stage, DeployStage::Initial);
        Ok(())
    }

    #[test]
    fn test_retry_keeps_stage_when_build_url_exists() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;
        let update = JobUpdate {
            build_url: Some("https://lovable.dev/?autosubmit=true".into()),
            stage: Some(DeployStage::GithubReady),
            ..JobUpdate::status(BuildStatus::Error)
        };
        db.update_job(&job.id, &update)?;

        let change = db.retry_job(&job.id)?;
        assert_eq!(change.after.stage, DeployStage::GithubReady);
        Ok(())
    }

    #[test]
    fn test_confirm_payment_books_revenue_once() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;
        let now = at(2026, 3, 4);

        assert!(db.confirm_payment(&job.id, now)?.became_paid());
        assert!(!db.confirm_payment(&job.id, now)?.became_paid());

        let stats = db.stats_at(now)?;
        assert_eq!(stats.revenue.total, 300.0);
        assert_eq!(stats.revenue.today, 300.0);
        assert_eq!(stats.pending_invoices_total, 0.0);
        assert_eq!(stats.paid_jobs, 1);
        assert_eq!(stats.average_deal_size, 300.0);
        assert_eq!(stats.close_rate, 100.0);
        Ok(())
    }

    #[test]
    fn test_revenue_rolls_over_day_week_and_month() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;

        // Monday 2026-03-30 and Tuesday 2026-03-31 share an ISO week.
        db.add_revenue(100.0, at(2026, 3, 30))?;
        let revenue = db.add_revenue(50.0, at(2026, 3, 31))?;
        assert_eq!(revenue.today, 50.0);
        assert_eq!(revenue.this_week, 150.0);
        assert_eq!(revenue.this_month, 150.0);

        // Wednesday 2026-04-01: new day and month, same week.
        let revenue = db.add_revenue(25.0, at(2026, 4, 1))?;
        assert_eq!(revenue.today, 25.0);
        assert_eq!(revenue.this_week, 175.0);
        assert_eq!(revenue.this_month, 25.0);
        assert_eq!(revenue.last_month, 150.0);
        assert_eq!(revenue.total, 175.0);

        // Monday 2026-04-06: new week.
        let stats = db.stats_at(at(2026, 4, 6))?;
        assert_eq!(stats.revenue.today, 0.0);
        assert_eq!(stats.revenue.this_week, 0.0);
        assert_eq!(stats.revenue.this_month, 25.0);
        Ok(())
    }

    #[test]
    fn test_last_month_resets_after_gap() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        db.add_revenue(100.0, at(2026, 1, 15))?;
        let stats = db.stats_at(at(2026, 3, 15))?;
        assert_eq!(stats.revenue.last_month, 0.0);
        assert_eq!(stats.revenue.this_month, 0.0);
        assert_eq!(stats.revenue.total, 100.0);
        assert!(stats.month_over_month.is_none());

        let stats = db.stats_at(at(2026, 2, 3))?;
        assert_eq!(stats.revenue.last_month, 100.0);
        assert_eq!(stats.month_over_month, Some(-100.0));
        Ok(())
    }

    #[test]
    fn test_latest_job_for_business() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        db.create_job(&acme())?;
        let newer = db.create_job(&acme())?;
        db.create_job(&NewBuildJob {
            business_id: "rec-other".into(),
            ..acme()
        })?;

        let latest = db.latest_job_for_business("rec-acme")?.unwrap();
        assert_eq!(latest.id, newer.id);
        assert!(db.latest_job_for_business("rec-nobody")?.is_none());
        Ok(())
    }

    #[test]
    fn test_jobs_by_payment_status_and_recent() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let a = db.create_job(&acme())?;
        db.create_job(&acme())?;
        let c = db.create_job(&acme())?;
        db.update_job(&a.id, &JobUpdate::payment(PaymentStatus::Paid))?;

        let paid = db.jobs_by_payment_status(PaymentStatus::Paid)?;
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].id, a.id);
        assert_eq!(db.jobs_by_payment_status(PaymentStatus::Pending)?.len(), 2);

        let recent = db.recent_jobs(2)?;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, c.id);
        Ok(())
    }

    #[test]
    fn test_unknown_deployment_status_persists_verbatim() -> anyhow::Result<()> {
        let db = JobDb::new_in_memory()?;
        let job = db.create_job(&acme())?;
        let update = JobUpdate {
            deployment_status: Some(DeploymentStatus::from("suspended")),
            ..JobUpdate::default()
        };
        db.update_job(&job.id, &update)?;
        let stored = db.get_job(&job.id)?.unwrap();
        assert_eq!(
            stored.deployment_status,
            Some(DeploymentStatus::Unknown("suspended".into()))
        );
        Ok(())
    }

    #[test]
    fn test_file_database_survives_reopen() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("ghost.db");
        let id = {
            let db = JobDb::new(&path)?;
            db.create_job(&acme())?.id
        };
        let db = JobDb::new(&path)?;
        assert!(db.get_job(&id)?.is_some());
        assert_eq!(db.stats()?.pending_invoices, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_runs_on_blocking_pool() -> anyhow::Result<()> {
        let handle = DbHandle::new(JobDb::new_in_memory()?);
        let job = handle.call(|db| db.create_job(&acme())).await?;
        let id = job.id.clone();
        let fetched = handle.call(move |db| db.get_job(&id)).await?;
        assert_eq!(fetched, Some(job));
        Ok(())
    }
}
