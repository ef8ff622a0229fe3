//! Long-running servers — `ghost-hunter serve` and `ghost-hunter proxy`.

use anyhow::Result;

use ghost_hunter::config::GhostConfig;
use ghost_hunter::dashboard::{ServerConfig, start_server};
use ghost_hunter::proxy::start_proxy;

pub async fn cmd_serve(
    config: &GhostConfig,
    port: Option<u16>,
    host: &str,
) -> Result<()> {
    for warning in config.toml.validate() {
        tracing::warn!("{}", warning);
    }

    let mut server = ServerConfig::from_config(config);
    server.host = host.to_string();
    if let Some(port) = port {
        server.port = port;
    }

    start_server(config, server).await
}

pub async fn cmd_proxy(config: &GhostConfig, host: &str) -> Result<()> {
    start_proxy(&config.toml, host).await
}
