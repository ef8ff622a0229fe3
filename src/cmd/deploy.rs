//! Terminal front-end for the deploy pipeline — `ghost-hunter deploy`.

use std::str::FromStr;

use anyhow::{Context, Result, bail};

use ghost_common::{BuildJob, BusinessRef, Package};
use ghost_hunter::automation;
use ghost_hunter::config::GhostConfig;
use ghost_hunter::dashboard::Notifier;
use ghost_hunter::orchestrator::{DeployOrchestrator, StageResult};
use ghost_hunter::store::{DbHandle, JobDb};

use crate::DeployCommands;

fn orchestrator(config: &GhostConfig) -> Result<DeployOrchestrator> {
    let db = JobDb::new(&config.db_path()).context("Failed to open job database")?;
    let client = automation::from_config(&config.toml)?;
    Ok(DeployOrchestrator::new(
        DbHandle::new(db),
        client,
        Notifier::new(),
    ))
}

fn print_job(job: &BuildJob) {
    println!("  job      {}", job.id);
    println!("  business {}", job.business_name);
    println!("  status   {}", job.status);
    println!("  stage    {}", job.stage);
    println!("  payment  {} (${:.2})", job.payment_status, job.amount);
}

fn report(result: &StageResult) -> Result<()> {
    if !result.success {
        print_job(&result.job);
        bail!(
            "{}",
            result.error.as_deref().unwrap_or("Deploy step failed")
        );
    }
    println!(
        "{} {}",
        console::style("✓").green().bold(),
        console::style(format!("Now at stage {}", result.stage)).bold()
    );
    print_job(&result.job);
    if let Some(url) = &result.url {
        println!("  url      {}", url);
    }
    if result.is_demo {
        println!(
            "  {}",
            console::style("demo data: the automation service did not answer").yellow()
        );
    }
    Ok(())
}

pub async fn cmd_deploy(config: &GhostConfig, command: DeployCommands) -> Result<()> {
    let orch = orchestrator(config)?;

    match command {
        DeployCommands::Start {
            business_id,
            name,
            package,
            amount,
            phone,
            address,
            open,
        } => {
            let package = Package::from_str(&package)?;
            let business = BusinessRef {
                id: business_id,
                name,
                phone,
                address,
                ..BusinessRef::default()
            };
            let result = orch.start(&business, package, amount).await?;
            report(&result)?;
            if open && let Some(url) = &result.url {
                if let Err(e) = open::that(url) {
                    eprintln!("Failed to open browser: {}", e);
                }
            }
        }
        DeployCommands::Confirm { job_id } => {
            report(&orch.confirm_publish(&job_id).await?)?;
        }
        DeployCommands::Repo {
            job_id,
            github_repo,
        } => {
            report(&orch.deploy_from_repo(&job_id, &github_repo).await?)?;
        }
        DeployCommands::Paid { job_id } => {
            let job = orch.mark_paid(&job_id).await?;
            println!("{}", console::style("Payment recorded.").green().bold());
            print_job(&job);
        }
        DeployCommands::Retry { job_id } => {
            let job = orch.retry(&job_id).await?;
            println!("Job moved out of error.");
            print_job(&job);
        }
    }

    Ok(())
}
