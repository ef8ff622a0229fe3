//! Read-only views of the job store — `ghost-hunter jobs` and `ghost-hunter stats`.

use std::str::FromStr;

use anyhow::{Context, Result};

use ghost_common::{BuildStatus, PaymentStatus};
use ghost_hunter::config::GhostConfig;
use ghost_hunter::store::JobDb;

/// Open the database, or `None` when `init` has not run yet.
fn open_db(config: &GhostConfig) -> Result<Option<JobDb>> {
    let db_path = config.db_path();
    if !db_path.exists() {
        println!("No job database at {}", db_path.display());
        println!("Run `ghost-hunter init` first.");
        return Ok(None);
    }
    let db = JobDb::new(&db_path).context("Failed to open job database")?;
    Ok(Some(db))
}

fn styled_status(status: BuildStatus) -> console::StyledObject<&'static str> {
    let style = console::style(status.as_str());
    match status {
        BuildStatus::Live => style.green(),
        BuildStatus::Error => style.red(),
        BuildStatus::Queued => style.dim(),
        _ => style.yellow(),
    }
}

pub fn cmd_jobs(config: &GhostConfig, payment: Option<&str>, limit: u32, json: bool) -> Result<()> {
    let filter = payment
        .map(PaymentStatus::from_str)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let Some(db) = open_db(config)? else {
        return Ok(());
    };

    let mut jobs = match filter {
        Some(status) => db.jobs_by_payment_status(status)?,
        None => db.recent_jobs(limit)?,
    };
    jobs.truncate(limit as usize);

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }
    if jobs.is_empty() {
        println!("No build jobs.");
        return Ok(());
    }

    println!(
        "{}",
        console::style(format!(
            "{:<44} {:<24} {:<18} {:<14} {:<8} {:>9}",
            "JOB", "BUSINESS", "STATUS", "STAGE", "PAYMENT", "AMOUNT"
        ))
        .bold()
    );
    for job in &jobs {
        println!(
            "{:<44} {:<24} {:<18} {:<14} {:<8} {:>9.2}",
            job.id,
            truncate(&job.business_name, 24),
            styled_status(job.status),
            job.stage,
            job.payment_status,
            job.amount
        );
        if let Some(error) = &job.error_message {
            println!("  {} {}", console::style("Error:").red().bold(), error);
        }
    }
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let cut: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

pub fn cmd_stats(config: &GhostConfig, json: bool) -> Result<()> {
    let Some(db) = open_db(config)? else {
        return Ok(());
    };
    let stats = db.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("{}", console::style("Revenue").bold().cyan());
    println!("  today        ${:>10.2}", stats.revenue.today);
    println!("  this week    ${:>10.2}", stats.revenue.this_week);
    println!("  this month   ${:>10.2}", stats.revenue.this_month);
    println!("  last month   ${:>10.2}", stats.revenue.last_month);
    println!("  total        ${:>10.2}", stats.revenue.total);
    if let Some(change) = stats.month_over_month {
        println!("  vs last month {:>+9.1}%", change);
    }
    println!();
    println!("{}", console::style("Pipeline").bold().cyan());
    println!(
        "  pending invoices {} (${:.2})",
        stats.pending_invoices, stats.pending_invoices_total
    );
    println!("  jobs             {} ({} paid)", stats.total_jobs, stats.paid_jobs);
    println!("  close rate       {:.1}%", stats.close_rate);
    println!("  average deal     ${:.2}", stats.average_deal_size);
    println!();
    Ok(())
}
