//! Configuration view and validation commands — `ghost-hunter config`.

use anyhow::Result;

use ghost_hunter::config::GhostConfig;

use crate::ConfigCommands;

fn secret_state(value: &Option<String>) -> &'static str {
    if value.is_some() { "set" } else { "not set" }
}

pub fn cmd_config(config: &GhostConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_path();
    let toml = &config.toml;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Ghost Hunter Configuration");
            println!("==========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No ghost.toml found at {}", config_path.display());
                println!("Using defaults. Run 'ghost-hunter init' to create one.");
            }
            println!();
            println!("Effective values (with env overrides):");
            println!();

            println!("[upstream]");
            println!("  base_url = \"{}\"", toml.upstream.base_url);
            println!("  api_key = {}", secret_state(&toml.upstream.api_key));
            println!();

            println!("[proxy]");
            println!("  port = {}", toml.proxy.port);
            match &toml.proxy.allowed_origins {
                Some(origins) => println!("  allowed_origins = \"{}\"", origins),
                None => println!("  allowed_origins = * (unset)"),
            }
            println!();

            let urls = toml.webhook_urls();
            println!("[webhooks]");
            println!("  build_site = \"{}\"", urls.build_site);
            println!("  deploy_website = \"{}\"", urls.deploy_website);
            println!("  github_to_render = \"{}\"", urls.github_to_render);
            println!("  deploy_and_invoice = \"{}\"", urls.deploy_and_invoice);
            println!("  send_sms = \"{}\"", urls.send_sms);
            println!("  send_email = \"{}\"", urls.send_email);
            println!();

            println!("[timeouts]");
            println!("  default_secs = {}", toml.timeouts.default_secs);
            println!("  build_url_secs = {}", toml.timeouts.build_url_secs);
            println!("  deploy_secs = {}", toml.timeouts.deploy_secs);
            println!("  deploy_invoice_secs = {}", toml.timeouts.deploy_invoice_secs);
            println!();

            println!("[dashboard]");
            println!("  port = {}", toml.dashboard.port);
            println!("  db_path = \"{}\"", config.db_path().display());
            println!(
                "  webhook_secret = {}",
                secret_state(&toml.dashboard.webhook_secret)
            );
            println!("  demo_mode = {}", toml.dashboard.demo_mode);
            println!();

            println!("[logging]");
            println!("  format = {:?}", toml.logging.format);
            println!("  filter = \"{}\"", toml.logging.filter);
            if let Some(dir) = config.log_dir() {
                println!("  dir = \"{}\"", dir.display());
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
    }

    Ok(())
}
