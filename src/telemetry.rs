//! Tracing subscriber setup.
//!
//! Console output goes to stderr (plain or JSON) so command output on stdout
//! stays machine-readable. With `logging.dir` set, a JSON copy is also
//! written to a daily rolling file.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LoggingSection};

const LOG_FILE_PREFIX: &str = "ghost-hunter.log";

/// Keeps the background file writer alive; drop it last.
#[must_use]
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
}

/// `RUST_LOG` wins; otherwise the configured filter, raised to `debug` by
/// `--verbose`.
fn filter_directive(settings: &LoggingSection, verbose: bool, rust_log: Option<&str>) -> String {
    match rust_log {
        Some(directive) if !directive.trim().is_empty() => directive.to_string(),
        _ if verbose => "debug".to_string(),
        _ => settings.filter.clone(),
    }
}

pub fn init(settings: &LoggingSection, log_dir: Option<&Path>, verbose: bool) -> Result<TelemetryGuard> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(settings, verbose, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter '{}'", directive))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(match settings.format {
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
    });

    let mut file_guard = None;
    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(TelemetryGuard { _file: file_guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_takes_precedence() {
        let settings = LoggingSection::default();
        assert_eq!(
            filter_directive(&settings, true, Some("ghost_hunter=trace")),
            "ghost_hunter=trace"
        );
    }

    #[test]
    fn test_verbose_raises_level() {
        let settings = LoggingSection::default();
        assert_eq!(filter_directive(&settings, true, None), "debug");
        assert_eq!(filter_directive(&settings, false, Some("  ")), "info");
    }

    #[test]
    fn test_configured_filter_is_default() {
        let settings = LoggingSection {
            filter: "warn,ghost_hunter=info".into(),
            ..LoggingSection::default()
        };
        assert_eq!(filter_directive(&settings, false, None), "warn,ghost_hunter=info");
    }
}
