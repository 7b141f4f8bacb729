//! Configuration loading for the Intel Relay CLI.
//!
//! Settings come from an optional YAML file and are then overridden by
//! environment variables. The API key is only required by commands that talk
//! to the API.

use anyhow::{bail, Context, Result};
use ir_connectors::{
    AuthConfig, ConnectorConfig, InthreatConfig, SecureString, DEFAULT_BASE_URL,
    DEFAULT_COLLECTION,
};
use ir_core::{SweepConfig, DEFAULT_PAGE_LIMIT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

const REDACTED: &str = "***REDACTED***";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// SEKOIA.IO API settings.
    #[serde(default)]
    pub sekoia: SekoiaSettings,

    /// Polling and output settings.
    #[serde(default)]
    pub connector: RunnerSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Loads the effective configuration.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
    /// read if present and defaults are used otherwise. Environment values
    /// from `lookup` are applied last.
    pub fn resolve<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load(&fallback)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Applies environment overrides. Unset or empty variables are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SEKOIA_BASE_URL") {
            self.sekoia.base_url = v;
        }
        if let Some(v) = get("SEKOIA_COLLECTION") {
            self.sekoia.collection = v;
        }
        if let Some(v) = get("SEKOIA_API_KEY") {
            self.sekoia.api_key = Some(SecureString::new(v));
        }
        if let Some(v) = get("SEKOIA_PAGE_LIMIT") {
            self.sekoia.page_limit = parse_var("SEKOIA_PAGE_LIMIT", &v)?;
        }
        if let Some(v) = get("SEKOIA_TIMEOUT_SECS") {
            self.sekoia.timeout_secs = parse_var("SEKOIA_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("SEKOIA_MAX_RETRIES") {
            self.sekoia.max_retries = parse_var("SEKOIA_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("SEKOIA_REQUESTS_PER_MINUTE") {
            self.sekoia.requests_per_minute = Some(parse_var("SEKOIA_REQUESTS_PER_MINUTE", &v)?);
        }
        if let Some(v) = get("CONNECTOR_POLL_INTERVAL_SECS") {
            self.connector.poll_interval_secs = parse_var("CONNECTOR_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("CONNECTOR_STATE_PATH") {
            self.connector.state_path = PathBuf::from(v);
        }
        if let Some(v) = get("CONNECTOR_OUTPUT_DIR") {
            self.connector.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("LOG_JSON") {
            self.logging.json_format = parse_flag("LOG_JSON", &v)?;
        }

        Ok(())
    }

    /// Checks the settings needed to talk to the API.
    pub fn validate(&self) -> Result<()> {
        if self.api_key().is_none() {
            bail!("SEKOIA_API_KEY is required (set it in the environment or under sekoia.api_key)");
        }
        if self.sekoia.page_limit == 0 {
            bail!("sekoia.page_limit must be at least 1");
        }
        if self.sekoia.collection.trim().is_empty() {
            bail!("sekoia.collection must not be empty");
        }
        if self.sekoia.requests_per_minute == Some(0) {
            bail!("sekoia.requests_per_minute must be at least 1 when set");
        }
        Ok(())
    }

    fn api_key(&self) -> Option<&SecureString> {
        self.sekoia.api_key.as_ref().filter(|key| !key.is_empty())
    }

    /// Builds the connector configuration. Fails without an API key.
    pub fn inthreat_config(&self) -> Result<InthreatConfig> {
        self.validate()?;
        let token = self
            .api_key()
            .cloned()
            .context("SEKOIA_API_KEY is required")?;

        Ok(InthreatConfig {
            connector: ConnectorConfig {
                name: "sekoia-inthreat".to_string(),
                base_url: self.sekoia.base_url.clone(),
                auth: AuthConfig::BearerToken { token },
                timeout_secs: self.sekoia.timeout_secs,
                max_retries: self.sekoia.max_retries,
                verify_tls: true,
                headers: HashMap::new(),
            },
            collection: self.sekoia.collection.clone(),
            requests_per_minute: self.sekoia.requests_per_minute,
        })
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            page_limit: self.sekoia.page_limit,
            ..Default::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.connector.poll_interval_secs)
    }

    /// Creates a copy with secrets redacted.
    pub fn redact_secrets(&self) -> Self {
        let mut config = self.clone();
        if config.api_key().is_some() {
            config.sekoia.api_key = Some(SecureString::from(REDACTED));
        }
        config
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {:?} ({})", name, value, e))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("Invalid value for {}: {:?} (expected true or false)", name, value),
    }
}

/// SEKOIA.IO API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SekoiaSettings {
    /// API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Collection uuid to poll.
    #[serde(default = "default_collection")]
    pub collection: String,

    /// API key, sent as a bearer token.
    #[serde(default)]
    pub api_key: Option<SecureString>,

    /// Records per page.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Extra attempts on transport failures.
    #[serde(default)]
    pub max_retries: u32,

    /// Client-side request budget.
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_page_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

fn default_timeout() -> u64 {
    30
}

impl Default for SekoiaSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            collection: default_collection(),
            api_key: None,
            page_limit: default_page_limit(),
            timeout_secs: default_timeout(),
            max_retries: 0,
            requests_per_minute: None,
        }
    }
}

/// Polling and output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Pause between sweeps.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Where the last committed cursor is kept.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Directory bundles are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("bundles")
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            state_path: default_state_path(),
            output_dir: default_output_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format.
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.sekoia.base_url, "https://api.sekoia.io");
        assert_eq!(config.sekoia.collection, DEFAULT_COLLECTION);
        assert_eq!(config.sekoia.page_limit, 20);
        assert_eq!(config.connector.poll_interval_secs, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let config = AppConfig::default();
        let err = config.inthreat_config().unwrap_err();
        assert!(err.to_string().contains("SEKOIA_API_KEY"));

        let mut blank = AppConfig::default();
        blank.sekoia.api_key = Some(SecureString::from("   "));
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                ("SEKOIA_API_KEY", "secret-key"),
                ("SEKOIA_COLLECTION", "c1"),
                ("SEKOIA_PAGE_LIMIT", "50"),
                ("SEKOIA_REQUESTS_PER_MINUTE", "120"),
                ("CONNECTOR_OUTPUT_DIR", "/tmp/out"),
                ("LOG_JSON", "true"),
                ("LOG_LEVEL", ""),
            ]))
            .unwrap();

        assert_eq!(config.sekoia.collection, "c1");
        assert_eq!(config.sekoia.page_limit, 50);
        assert_eq!(config.sekoia.requests_per_minute, Some(120));
        assert_eq!(config.connector.output_dir, PathBuf::from("/tmp/out"));
        assert!(config.logging.json_format);
        assert_eq!(config.logging.level, "info");

        let inthreat = config.inthreat_config().unwrap();
        match inthreat.connector.auth {
            AuthConfig::BearerToken { token } => assert_eq!(token.expose_secret(), "secret-key"),
            other => panic!("unexpected auth: {:?}", other),
        }
        assert_eq!(inthreat.collection, "c1");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(env(&[("SEKOIA_PAGE_LIMIT", "twenty")]))
            .unwrap_err();
        assert!(err.to_string().contains("SEKOIA_PAGE_LIMIT"));

        let err = config
            .apply_overrides(env(&[("LOG_JSON", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("LOG_JSON"));
    }

    #[test]
    fn test_redact_secrets() {
        let mut config = AppConfig::default();
        config.sekoia.api_key = Some(SecureString::from("secret-key"));

        let redacted = config.redact_secrets();
        assert_eq!(
            redacted.sekoia.api_key.as_ref().map(|k| k.expose_secret()),
            Some("***REDACTED***")
        );
        assert!(!serde_yaml::to_string(&redacted)
            .unwrap()
            .contains("secret-key"));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
sekoia:
  api_key: from-file
  page_limit: 10
  max_retries: 2
connector:
  poll_interval_secs: 300
  state_path: /var/lib/intel-relay/state.json
logging:
  level: debug
"#;

        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sekoia.page_limit, 10);
        assert_eq!(config.sekoia.max_retries, 2);
        assert_eq!(config.sekoia.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.poll_interval(), Duration::from_secs(300));
        assert_eq!(config.connector.output_dir, PathBuf::from("bundles"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.sweep_config().page_limit, 10);
    }

    #[test]
    fn test_resolve_file_then_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.yml");
        std::fs::write(&path, "sekoia:\n  api_key: from-file\n  page_limit: 10\n").unwrap();

        let config =
            AppConfig::resolve(Some(&path), env(&[("SEKOIA_API_KEY", "from-env")])).unwrap();
        assert_eq!(config.sekoia.page_limit, 10);
        assert_eq!(
            config.sekoia.api_key.as_ref().map(|k| k.expose_secret()),
            Some("from-env")
        );
    }

    #[test]
    fn test_resolve_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let result = AppConfig::resolve(Some(&dir.path().join("absent.yml")), env(&[]));
        assert!(result.is_err());
    }
}
