//! Configuration loading and oracle credential resolution
//!
//! Bootstrap configuration lives in a TOML file. Settings sources priority:
//! 1. Command-line arguments (applied by the binary)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! A missing TOML file is not an error: defaults are used and a warning logged.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the oracle API key
pub const ORACLE_API_KEY_ENV: &str = "AVM_ORACLE_API_KEY";

/// Legacy environment variable accepted as a fallback for the oracle API key
pub const LEGACY_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TomlConfig {
    /// Path to the candidate metadata file (JSONL)
    #[serde(default)]
    pub metadata_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Oracle client configuration
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Tournament tuning
    #[serde(default)]
    pub tournament: TournamentConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Oracle (vision model) client configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OracleConfig {
    /// API key; prefer the environment variable over storing it here
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the generateContent REST API
    #[serde(default = "default_oracle_base_url")]
    pub base_url: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum oracle requests per second across all comparator tasks
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_oracle_base_url(),
            timeout_secs: default_oracle_timeout_secs(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl OracleConfig {
    /// Per-call timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject a zero call timeout or request rate
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(Error::Config("oracle timeout_secs must be at least 1".to_string()));
        }
        if self.requests_per_second == 0 {
            return Err(Error::Config("oracle requests_per_second must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Tournament tuning parameters
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TournamentConfig {
    /// Batch capacity B (candidates compared per oracle call)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum simultaneous asset fetches during prefetch
    #[serde(default = "default_concurrency")]
    pub max_fetch_concurrency: usize,

    /// Maximum simultaneous comparator tasks per round
    #[serde(default = "default_concurrency")]
    pub max_compare_concurrency: usize,

    /// Per-asset fetch timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Pause between rounds in milliseconds
    #[serde(default = "default_inter_round_delay_ms")]
    pub inter_round_delay_ms: u64,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_fetch_concurrency: default_concurrency(),
            max_compare_concurrency: default_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            inter_round_delay_ms: default_inter_round_delay_ms(),
        }
    }
}

impl TournamentConfig {
    /// Per-asset fetch timeout as Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Inter-round pause as Duration
    pub fn inter_round_delay(&self) -> Duration {
        Duration::from_millis(self.inter_round_delay_ms)
    }

    /// Reject settings the tournament cannot run with
    ///
    /// A batch of one can never eliminate anybody, so B must be at least 2.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size < 2 {
            return Err(Error::Config(format!(
                "batch_size must be at least 2 (got {})",
                self.batch_size
            )));
        }
        if self.max_fetch_concurrency == 0 {
            return Err(Error::Config("max_fetch_concurrency must be at least 1".to_string()));
        }
        if self.max_compare_concurrency == 0 {
            return Err(Error::Config("max_compare_concurrency must be at least 1".to_string()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(Error::Config("fetch_timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Bind address for `serve`
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_oracle_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_oracle_timeout_secs() -> u64 {
    60
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_batch_size() -> usize {
    6
}

fn default_concurrency() -> usize {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_inter_round_delay_ms() -> u64 {
    1000
}

fn default_bind() -> String {
    "127.0.0.1:5760".to_string()
}

/// Default configuration file path for the platform
///
/// `~/.config/avm/avm-matcher.toml` on Linux, the platform config dir elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("avm").join("avm-matcher.toml"))
}

/// Load TOML configuration from a path
///
/// Missing file → defaults with a warning. A file that exists but cannot be
/// parsed is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve the oracle API key
///
/// **Priority:** ENV (`AVM_ORACLE_API_KEY`, then `GEMINI_API_KEY`) → TOML
pub fn resolve_oracle_api_key(toml_config: &TomlConfig) -> Result<String> {
    let mut sources = Vec::new();

    let env_key = std::env::var(ORACLE_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k))
        .or_else(|| std::env::var(LEGACY_API_KEY_ENV).ok().filter(|k| is_valid_key(k)));
    if env_key.is_some() {
        sources.push("environment");
    }

    let toml_key = toml_config
        .oracle
        .api_key
        .as_ref()
        .filter(|k| is_valid_key(k));
    if toml_key.is_some() {
        sources.push("TOML");
    }

    if sources.len() > 1 {
        warn!(
            "Oracle API key found in multiple sources: {}. Using environment (highest priority).",
            sources.join(", ")
        );
    }

    if let Some(key) = env_key {
        info!("Oracle API key loaded from environment variable");
        return Ok(key);
    }

    if let Some(key) = toml_key {
        info!("Oracle API key loaded from TOML config");
        return Ok(key.clone());
    }

    Err(Error::Config(format!(
        "Oracle API key not configured. Set {} or [oracle] api_key in the TOML config.",
        ORACLE_API_KEY_ENV
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = TomlConfig::default();
        assert_eq!(config.tournament.batch_size, 6);
        assert_eq!(config.tournament.max_fetch_concurrency, 10);
        assert_eq!(config.tournament.max_compare_concurrency, 10);
        assert_eq!(config.tournament.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.tournament.inter_round_delay(), Duration::from_millis(1000));
        assert_eq!(config.logging.level, "info");
        assert!(config.oracle.api_key.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [tournament]
            batch_size = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.tournament.batch_size, 3);
        assert_eq!(config.tournament.max_fetch_concurrency, 10);
        assert_eq!(config.oracle.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_validate_rejects_batch_size_below_two() {
        let mut tournament = TournamentConfig::default();
        tournament.batch_size = 1;
        assert!(tournament.validate().is_err());
        tournament.batch_size = 2;
        assert!(tournament.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let tournament = TournamentConfig {
            max_compare_concurrency: 0,
            ..TournamentConfig::default()
        };
        assert!(tournament.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let tournament = TournamentConfig {
            fetch_timeout_secs: 0,
            ..TournamentConfig::default()
        };
        assert!(tournament.validate().is_err());

        let oracle = OracleConfig {
            timeout_secs: 0,
            ..OracleConfig::default()
        };
        assert!(oracle.validate().is_err());
        assert!(OracleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key("abc"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }
}
