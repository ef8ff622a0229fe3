use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ghost_hunter::config::GhostConfig;
use ghost_hunter::telemetry;

mod cmd;

#[derive(Parser)]
#[command(name = "ghost-hunter")]
#[command(
    version,
    about = "Ghost Hunter CRM back-end: deploy orchestration, credential proxy and status webhooks"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .ghost/ghost.toml and the job database
    Init,
    /// Run the dashboard API, deployment-status webhook and notification socket
    Serve {
        /// Port to serve on (defaults to dashboard.port)
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Fake successful automation calls when n8n is unreachable
        #[arg(long)]
        demo: bool,
    },
    /// Run the credential proxy in front of the n8n API
    Proxy {
        /// Port to serve on (defaults to proxy.port)
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// List build jobs, newest first
    Jobs {
        /// Only jobs with this payment status: pending, paid or failed
        #[arg(long)]
        payment: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show revenue and pipeline figures
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Drive one build job through the deploy pipeline from the terminal
    Deploy {
        #[command(subcommand)]
        command: DeployCommands,
    },
    /// View and validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum DeployCommands {
    /// Create a job and generate the site-builder URL
    Start {
        /// CRM business record id
        business_id: String,

        /// Business name
        name: String,

        /// Starter, Business, Premium, Enterprise or Custom
        #[arg(long, default_value = "Business")]
        package: String,

        /// Price override (required for Custom)
        #[arg(long)]
        amount: Option<f64>,

        #[arg(long, default_value = "")]
        phone: String,

        #[arg(long, default_value = "")]
        address: String,

        /// Open the builder URL in a browser
        #[arg(long)]
        open: bool,
    },
    /// Confirm the site builder published to GitHub
    Confirm { job_id: String },
    /// Deploy the published repository to hosting
    Repo { job_id: String, github_repo: String },
    /// Record that the invoice was paid
    Paid { job_id: String },
    /// Move a job out of error so its current step can run again
    Retry { job_id: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let mut config = GhostConfig::load(&project_dir)?;
    let _telemetry = telemetry::init(
        &config.toml.logging,
        config.log_dir().as_deref(),
        cli.verbose,
    )?;

    match &cli.command {
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Serve { port, host, demo } => {
            if *demo {
                config.toml.dashboard.demo_mode = true;
            }
            cmd::cmd_serve(&config, *port, host).await?;
        }
        Commands::Proxy { port, host } => {
            if let Some(port) = port {
                config.toml.proxy.port = *port;
            }
            cmd::cmd_proxy(&config, host).await?;
        }
        Commands::Jobs {
            payment,
            limit,
            json,
        } => cmd::cmd_jobs(&config, payment.as_deref(), *limit, *json)?,
        Commands::Stats { json } => cmd::cmd_stats(&config, *json)?,
        Commands::Deploy { command } => cmd::cmd_deploy(&config, command.clone()).await?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
