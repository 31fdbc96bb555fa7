//! Client configuration.
//!
//! Settings come from `trellis.toml` (default `<config_dir>/trellis/trellis.toml`),
//! then `TRELLIS_*` environment variables (a `.env` file is honoured), then
//! CLI flags. Later layers win.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! api_url = "https://tracker.example.com"
//! ws_url = "wss://tracker.example.com/ws"
//!
//! [credentials]
//! path = "/home/me/.local/share/trellis/token"
//!
//! [http]
//! read_retries = 1
//! user_agent = "trellis/0.1"
//!
//! [realtime]
//! initial_delay_ms = 500
//! max_delay_ms = 30000
//! multiplier = 2.0
//! max_attempts = 10
//!
//! [logging]
//! level = "warn"
//! format = "text"
//! file = "/tmp/trellis.log"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::credential::FileCredentialStore;
use crate::http::ReadPolicy;
use crate::realtime::ReconnectPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

pub const ENV_API_URL: &str = "TRELLIS_API_URL";
pub const ENV_WS_URL: &str = "TRELLIS_WS_URL";
pub const ENV_TOKEN_PATH: &str = "TRELLIS_TOKEN_PATH";
pub const ENV_LOG: &str = "TRELLIS_LOG";
pub const ENV_RUST_LOG: &str = "RUST_LOG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}. Use text or json", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialsSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_read_retries() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSection {
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            read_retries: default_read_retries(),
            user_agent: None,
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSection {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Zero disables reconnects.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RealtimeSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RealtimeSection {
    pub fn to_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            max_attempts: self.max_attempts,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Contents of `trellis.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrellisToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub realtime: RealtimeSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl TrellisToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse trellis.toml")
    }

    /// Defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize trellis.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// `<config_dir>/trellis/trellis.toml`, falling back to the working directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trellis")
            .join("trellis.toml")
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(api_url) = &self.server.api_url
            && let Some(warning) = check_url("api_url", api_url, &["http", "https"])
        {
            warnings.push(warning);
        }
        if let Some(ws_url) = &self.server.ws_url
            && let Some(warning) = check_url("ws_url", ws_url, &["ws", "wss"])
        {
            warnings.push(warning);
        }

        let realtime = &self.realtime;
        if realtime.multiplier < 1.0 {
            warnings.push(format!(
                "realtime.multiplier is {}: delays will not grow (use 1.0 or more)",
                realtime.multiplier
            ));
        }
        if realtime.initial_delay_ms == 0 {
            warnings.push("realtime.initial_delay_ms is 0: reconnects will not back off".into());
        }
        if realtime.max_delay_ms < realtime.initial_delay_ms {
            warnings.push(format!(
                "realtime.max_delay_ms ({}) is below initial_delay_ms ({})",
                realtime.max_delay_ms, realtime.initial_delay_ms
            ));
        }
        if self.http.read_retries > 3 {
            warnings.push(format!(
                "http.read_retries is {}: reads retry immediately, keep this small",
                self.http.read_retries
            ));
        }
        if !is_valid_log_level(&self.logging.level) {
            warnings.push(format!(
                "Invalid logging.level '{}': use trace, debug, info, warn, error or a filter directive",
                self.logging.level
            ));
        }

        warnings
    }
}

fn check_url(key: &str, value: &str, schemes: &[&str]) -> Option<String> {
    match Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => None,
        Ok(url) => Some(format!(
            "server.{} '{}' has scheme '{}', expected {}",
            key,
            value,
            url.scheme(),
            schemes.join(" or ")
        )),
        Err(e) => Some(format!("Invalid server.{} '{}': {}", key, value, e)),
    }
}

fn is_valid_log_level(level: &str) -> bool {
    let level = level.trim();
    if level.contains('=') {
        return true;
    }
    matches!(
        level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    )
}

/// Derive the realtime endpoint from the REST base: same host, `ws`/`wss`
/// scheme, path `/ws`.
pub fn derive_ws_url(api_url: &str) -> Result<String> {
    let mut url =
        Url::parse(api_url).with_context(|| format!("Invalid API URL: {}", api_url))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("Cannot derive websocket URL from {}", api_url))?;
    url.set_path("/ws");
    url.set_query(None);
    Ok(url.to_string())
}

/// Load `.env` from the working directory if one exists.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
}

/// Fully resolved configuration (file → environment → CLI).
#[derive(Debug, Clone)]
pub struct TrellisConfig {
    pub config_path: PathBuf,
    pub toml: TrellisToml,
    pub verbose: bool,
    env: HashMap<String, String>,
    cli_api_url: Option<String>,
    cli_ws_url: Option<String>,
    cli_token_path: Option<PathBuf>,
}

impl TrellisConfig {
    /// Read the file at `config_path` (or the default location) and snapshot
    /// the `TRELLIS_*` environment.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(TrellisToml::default_path);
        let toml = TrellisToml::load_or_default(&config_path)?;
        let env = std::env::vars()
            .filter(|(key, _)| key.starts_with("TRELLIS_") || key == ENV_RUST_LOG)
            .collect();
        Ok(Self::from_parts(config_path, toml, env))
    }

    pub fn from_parts(
        config_path: PathBuf,
        toml: TrellisToml,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            config_path,
            toml,
            verbose: false,
            env,
            cli_api_url: None,
            cli_ws_url: None,
            cli_token_path: None,
        }
    }

    pub fn with_cli_args(
        mut self,
        api_url: Option<String>,
        ws_url: Option<String>,
        token_path: Option<PathBuf>,
        verbose: bool,
    ) -> Self {
        self.cli_api_url = api_url;
        self.cli_ws_url = ws_url;
        self.cli_token_path = token_path;
        self.verbose = verbose;
        self
    }

    fn env(&self, key: &str) -> Option<String> {
        self.env
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// REST base URL (CLI → env → file → default).
    pub fn api_url(&self) -> String {
        self.cli_api_url
            .clone()
            .or_else(|| self.env(ENV_API_URL))
            .or_else(|| self.toml.server.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Realtime URL (CLI → env → file → derived from the API URL).
    pub fn ws_url(&self) -> Result<String> {
        if let Some(url) = self
            .cli_ws_url
            .clone()
            .or_else(|| self.env(ENV_WS_URL))
            .or_else(|| self.toml.server.ws_url.clone())
        {
            return Ok(url);
        }
        derive_ws_url(&self.api_url())
    }

    /// Token file (CLI → env → file → default).
    pub fn token_path(&self) -> PathBuf {
        self.cli_token_path
            .clone()
            .or_else(|| self.env(ENV_TOKEN_PATH).map(PathBuf::from))
            .or_else(|| self.toml.credentials.path.clone())
            .unwrap_or_else(FileCredentialStore::default_path)
    }

    /// Log filter directive (`-v` → `TRELLIS_LOG` → `RUST_LOG` → file).
    pub fn log_filter(&self) -> String {
        if self.verbose {
            return "debug".to_string();
        }
        self.env(ENV_LOG)
            .or_else(|| self.env(ENV_RUST_LOG))
            .unwrap_or_else(|| self.toml.logging.level.clone())
    }

    pub fn read_policy(&self) -> ReadPolicy {
        ReadPolicy {
            retries: self.toml.http.read_retries,
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        self.toml.realtime.to_policy()
    }

    pub fn user_agent(&self) -> Option<String> {
        self.toml.http.user_agent.clone()
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if let Some(warning) = check_url("api_url", &self.api_url(), &["http", "https"])
            && self.toml.server.api_url.as_deref() != Some(self.api_url().as_str())
        {
            warnings.push(warning);
        }
        if let Err(e) = self.ws_url() {
            warnings.push(e.to_string());
        }
        warnings
    }
}
