//! Project setup command — `ghost-hunter init`.

use anyhow::{Context, Result};

use ghost_hunter::config::{GhostConfig, GhostToml};
use ghost_hunter::store::JobDb;

pub fn cmd_init(config: &GhostConfig) -> Result<()> {
    let config_path = config.config_path();
    let db_path = config.db_path();
    let was_initialized = config_path.exists();

    std::fs::create_dir_all(&config.ghost_dir).with_context(|| {
        format!(
            "Failed to create config directory {}",
            config.ghost_dir.display()
        )
    })?;
    if !was_initialized {
        GhostToml::default().save(&config_path)?;
    }
    JobDb::new(&db_path).context("Failed to initialize job database")?;

    if was_initialized {
        println!(
            "Ghost Hunter project already initialized at {}",
            config.ghost_dir.display()
        );
        println!("Job database verified at {}", db_path.display());
        return Ok(());
    }

    println!(
        "Initialized Ghost Hunter project at {}",
        config.ghost_dir.display()
    );
    println!();
    println!("Created:");
    println!("  .ghost/");
    println!("  ├── ghost.toml   # Upstream, proxy, timeouts, dashboard settings");
    println!("  └── ghost.db     # Build jobs and revenue ledger");
    println!();
    println!("Secrets stay out of ghost.toml. Put them in .env:");
    println!("  N8N_API_KEY=...          # required by `ghost-hunter proxy`");
    println!("  WEBHOOK_SECRET_KEY=...   # required for deployment-status callbacks");
    println!();
    println!("Next steps:");
    println!("  1. Run `ghost-hunter config validate`");
    println!("  2. Run `ghost-hunter serve` to start the dashboard back-end");

    Ok(())
}
