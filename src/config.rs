//! Unified configuration for Ghost Hunter.
//!
//! Settings are layered: `.ghost/ghost.toml` → `.env` / process environment →
//! CLI flags. Secrets (the n8n API key, the webhook secret) normally come from
//! the environment and are redacted from every `Debug` rendering.
//!
//! # Configuration File Format
//!
//! ```toml
//! [upstream]
//! base_url = "https://n8n.example.com"
//!
//! [proxy]
//! port = 8787
//! allowed_origins = "https://dashboard.example.com,http://localhost:5173"
//!
//! [webhooks]
//! deploy_website = "https://n8n.example.com/webhook/deploy-website"
//!
//! [timeouts]
//! default_secs = 5
//! build_url_secs = 90
//! deploy_secs = 60
//! deploy_invoice_secs = 10
//!
//! [dashboard]
//! port = 3141
//! db_path = ".ghost/ghost.db"
//! demo_mode = false
//!
//! [logging]
//! format = "json"
//! dir = ".ghost/logs"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_DIR: &str = ".ghost";
const CONFIG_FILE: &str = "ghost.toml";

fn redact(secret: &Option<String>) -> &'static str {
    if secret.is_some() { "<redacted>" } else { "<unset>" }
}

/// Upstream automation service (n8n).
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Normally supplied through `N8N_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:5678".to_string()
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
        }
    }
}

impl fmt::Debug for UpstreamSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamSection")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySection {
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// Comma-separated CORS allow-list. Unset means `*`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<String>,
}

fn default_proxy_port() -> u16 {
    8787
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            port: default_proxy_port(),
            allowed_origins: None,
        }
    }
}

/// Explicit webhook URLs. Any left unset resolve to `<base_url>/webhook/<name>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhooksSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_to_render: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_and_invoice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_sms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsSection {
    #[serde(default = "default_timeout_secs")]
    pub default_secs: u64,
    #[serde(default = "default_build_url_secs")]
    pub build_url_secs: u64,
    #[serde(default = "default_deploy_secs")]
    pub deploy_secs: u64,
    #[serde(default = "default_deploy_invoice_secs")]
    pub deploy_invoice_secs: u64,
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_build_url_secs() -> u64 {
    90
}

fn default_deploy_secs() -> u64 {
    60
}

fn default_deploy_invoice_secs() -> u64 {
    10
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            default_secs: default_timeout_secs(),
            build_url_secs: default_build_url_secs(),
            deploy_secs: default_deploy_secs(),
            deploy_invoice_secs: default_deploy_invoice_secs(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DashboardSection {
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Normally supplied through `WEBHOOK_SECRET_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub demo_mode: bool,
    #[serde(default = "default_demo_delay_ms")]
    pub demo_delay_ms: u64,
}

fn default_dashboard_port() -> u16 {
    3141
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".ghost/ghost.db")
}

fn default_demo_delay_ms() -> u64 {
    2000
}

impl Default for DashboardSection {
    fn default() -> Self {
        Self {
            port: default_dashboard_port(),
            db_path: default_db_path(),
            webhook_secret: None,
            demo_mode: false,
            demo_delay_ms: default_demo_delay_ms(),
        }
    }
}

impl fmt::Debug for DashboardSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DashboardSection")
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("demo_mode", &self.demo_mode)
            .field("demo_delay_ms", &self.demo_delay_ms)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// When set, logs are also written to a daily rolling file here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
            dir: None,
        }
    }
}

/// Contents of `.ghost/ghost.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GhostToml {
    #[serde(default)]
    pub upstream: UpstreamSection,
    #[serde(default)]
    pub proxy: ProxySection,
    #[serde(default)]
    pub webhooks: WebhooksSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default)]
    pub dashboard: DashboardSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl GhostToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse ghost.toml")
    }

    /// Load `ghost.toml` from `ghost_dir`, or defaults if it does not exist.
    pub fn load_or_default(ghost_dir: &Path) -> Result<Self> {
        let config_path = ghost_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file. Secrets are never written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut scrubbed = self.clone();
        scrubbed.upstream.api_key = None;
        scrubbed.dashboard.webhook_secret = None;
        let content =
            toml::to_string_pretty(&scrubbed).context("Failed to serialize ghost.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("N8N_API_BASE_URL") {
            self.upstream.base_url = url;
        }
        if let Some(key) = get("N8N_API_KEY") {
            self.upstream.api_key = Some(key);
        }
        if let Some(origins) = get("ALLOWED_ORIGINS") {
            self.proxy.allowed_origins = Some(origins);
        }
        if let Some(secret) = get("WEBHOOK_SECRET_KEY") {
            self.dashboard.webhook_secret = Some(secret);
        }
        if let Some(flag) = get("GHOST_DEMO_MODE") {
            self.dashboard.demo_mode = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(format) = get("GHOST_LOG_FORMAT")
            && let Ok(format) = format.parse()
        {
            self.logging.format = format;
        }

        let hooks = &mut self.webhooks;
        for (var, slot) in [
            ("N8N_WEBHOOK_URL", &mut hooks.build_site),
            ("N8N_LOVABLE_DEPLOY_WEBHOOK_URL", &mut hooks.deploy_website),
            ("N8N_RENDER_DEPLOY_URL", &mut hooks.github_to_render),
            ("N8N_DEPLOY_WEBHOOK_URL", &mut hooks.deploy_and_invoice),
            ("N8N_SMS_WEBHOOK_URL", &mut hooks.send_sms),
            ("N8N_EMAIL_WEBHOOK_URL", &mut hooks.send_email),
        ] {
            if let Some(url) = get(var) {
                *slot = Some(url);
            }
        }
    }

    /// Resolve every webhook URL against the upstream base.
    pub fn webhook_urls(&self) -> WebhookUrls {
        let base = self.upstream.base_url.trim_end_matches('/');
        let resolve = |explicit: &Option<String>, name: &str| {
            explicit
                .clone()
                .unwrap_or_else(|| format!("{}/webhook/{}", base, name))
        };
        let hooks = &self.webhooks;
        WebhookUrls {
            build_site: resolve(&hooks.build_site, "build-site"),
            deploy_website: resolve(&hooks.deploy_website, "deploy-website"),
            github_to_render: resolve(&hooks.github_to_render, "github-to-render"),
            deploy_and_invoice: resolve(&hooks.deploy_and_invoice, "deploy-and-invoice"),
            send_sms: resolve(&hooks.send_sms, "send-sms"),
            send_email: resolve(&hooks.send_email, "send-email"),
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            default: Duration::from_secs(self.timeouts.default_secs),
            build_url: Duration::from_secs(self.timeouts.build_url_secs),
            deploy: Duration::from_secs(self.timeouts.deploy_secs),
            deploy_invoice: Duration::from_secs(self.timeouts.deploy_invoice_secs),
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !is_http_url(&self.upstream.base_url) {
            warnings.push(format!(
                "upstream.base_url '{}' is not an http(s) URL",
                self.upstream.base_url
            ));
        }
        if self.upstream.api_key.is_none() {
            warnings.push("N8N_API_KEY is not set; the credential proxy will refuse to start".into());
        }
        if self.dashboard.webhook_secret.is_none() {
            warnings.push(
                "WEBHOOK_SECRET_KEY is not set; every deployment-status callback will be rejected"
                    .into(),
            );
        }
        for (name, secs) in [
            ("default_secs", self.timeouts.default_secs),
            ("build_url_secs", self.timeouts.build_url_secs),
            ("deploy_secs", self.timeouts.deploy_secs),
            ("deploy_invoice_secs", self.timeouts.deploy_invoice_secs),
        ] {
            if secs == 0 {
                warnings.push(format!("timeouts.{} is 0; every call would time out", name));
            }
        }
        if let Some(origins) = &self.proxy.allowed_origins
            && origins.split(',').all(|o| o.trim().is_empty())
        {
            warnings.push("proxy.allowed_origins is set but empty".into());
        }
        if self.dashboard.demo_mode {
            warnings.push("demo_mode is on: failed automation calls will be faked as successes".into());
        }

        warnings
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Fully resolved outbound webhook URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookUrls {
    pub build_site: String,
    pub deploy_website: String,
    pub github_to_render: String,
    pub deploy_and_invoice: String,
    pub send_sms: String,
    pub send_email: String,
}

/// Per-call timeout budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub default: Duration,
    pub build_url: Duration,
    pub deploy: Duration,
    pub deploy_invoice: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        GhostToml::default().timeouts()
    }
}

/// Runtime configuration: parsed file plus environment, anchored at a
/// project directory.
#[derive(Debug, Clone)]
pub struct GhostConfig {
    pub project_dir: PathBuf,
    pub ghost_dir: PathBuf,
    pub toml: GhostToml,
}

impl GhostConfig {
    /// Load `.env`, `.ghost/ghost.toml` and environment overrides.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let env_file = project_dir.join(".env");
        if env_file.exists() {
            dotenvy::from_path(&env_file)
                .with_context(|| format!("Failed to load {}", env_file.display()))?;
        }

        let ghost_dir = project_dir.join(CONFIG_DIR);
        let mut toml = GhostToml::load_or_default(&ghost_dir)?;
        toml.apply_env();

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            ghost_dir,
            toml,
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.ghost_dir.join(CONFIG_FILE)
    }

    /// Database path, resolved against the project directory when relative.
    pub fn db_path(&self) -> PathBuf {
        self.resolve(&self.toml.dashboard.db_path)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.toml.logging.dir.as_ref().map(|dir| self.resolve(dir))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GhostToml::default();
        assert_eq!(config.proxy.port, 8787);
        assert_eq!(config.dashboard.port, 3141);
        assert_eq!(config.timeouts.build_url_secs, 90);
        assert_eq!(config.timeouts.deploy_secs, 60);
        assert_eq!(config.timeouts.default_secs, 5);
        assert!(!config.dashboard.demo_mode);
        assert!(config.upstream.api_key.is_none());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = GhostToml::parse(
            r#"
[upstream]
base_url = "https://n8n.example.com/"

[timeouts]
build_url_secs = 120

[dashboard]
demo_mode = true
"#,
        )
        .unwrap();
        assert_eq!(config.upstream.base_url, "https://n8n.example.com/");
        assert_eq!(config.timeouts.build_url_secs, 120);
        assert_eq!(config.timeouts.deploy_secs, 60);
        assert!(config.dashboard.demo_mode);
        assert_eq!(config.proxy.port, 8787);
    }

    #[test]
    fn test_webhook_urls_resolve_against_base() {
        let mut config = GhostToml::default();
        config.upstream.base_url = "https://n8n.example.com/".into();
        config.webhooks.send_sms = Some("https://sms.example.com/hook".into());

        let urls = config.webhook_urls();
        assert_eq!(
            urls.deploy_website,
            "https://n8n.example.com/webhook/deploy-website"
        );
        assert_eq!(
            urls.github_to_render,
            "https://n8n.example.com/webhook/github-to-render"
        );
        assert_eq!(urls.send_sms, "https://sms.example.com/hook");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = GhostToml::default();
        config.apply_env_with(env(&[
            ("N8N_API_BASE_URL", "https://n8n.internal"),
            ("N8N_API_KEY", "key-123"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("WEBHOOK_SECRET_KEY", "s3cret"),
            ("GHOST_DEMO_MODE", "true"),
            ("GHOST_LOG_FORMAT", "json"),
            ("N8N_RENDER_DEPLOY_URL", "https://render.example/hook"),
        ]));

        assert_eq!(config.upstream.base_url, "https://n8n.internal");
        assert_eq!(config.upstream.api_key.as_deref(), Some("key-123"));
        assert_eq!(
            config.proxy.allowed_origins.as_deref(),
            Some("https://a.example, https://b.example")
        );
        assert_eq!(config.dashboard.webhook_secret.as_deref(), Some("s3cret"));
        assert!(config.dashboard.demo_mode);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.webhook_urls().github_to_render,
            "https://render.example/hook"
        );
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = GhostToml::default();
        config.apply_env_with(env(&[("N8N_API_KEY", "  "), ("N8N_API_BASE_URL", "")]));
        assert!(config.upstream.api_key.is_none());
        assert_eq!(config.upstream.base_url, "http://localhost:5678");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = GhostToml::default();
        config.upstream.api_key = Some("super-secret-key".into());
        config.dashboard.webhook_secret = Some("hook-secret".into());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret-key"));
        assert!(!rendered.contains("hook-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_save_never_writes_secrets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ghost.toml");
        let mut config = GhostToml::default();
        config.upstream.api_key = Some("super-secret-key".into());
        config.dashboard.webhook_secret = Some("hook-secret".into());
        config.save(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("super-secret-key"));
        assert!(!written.contains("hook-secret"));

        let reloaded = GhostToml::load(&path).unwrap();
        assert_eq!(reloaded.proxy.port, 8787);
    }

    #[test]
    fn test_validate_warns_about_missing_secrets() {
        let warnings = GhostToml::default().validate();
        assert!(warnings.iter().any(|w| w.contains("N8N_API_KEY")));
        assert!(warnings.iter().any(|w| w.contains("WEBHOOK_SECRET_KEY")));
    }

    #[test]
    fn test_validate_flags_zero_timeout_and_bad_url() {
        let mut config = GhostToml::default();
        config.upstream.base_url = "n8n.example.com".into();
        config.timeouts.deploy_secs = 0;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("not an http(s) URL")));
        assert!(warnings.iter().any(|w| w.contains("timeouts.deploy_secs")));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let config = GhostToml::load_or_default(dir.path()).unwrap();
        assert_eq!(config.dashboard.port, 3141);
    }

    #[test]
    fn test_db_path_resolved_against_project_dir() {
        let dir = tempdir().unwrap();
        let config = GhostConfig {
            project_dir: dir.path().to_path_buf(),
            ghost_dir: dir.path().join(".ghost"),
            toml: GhostToml::default(),
        };
        assert_eq!(config.db_path(), dir.path().join(".ghost/ghost.db"));
    }
}
