//! Configuration management for ledgersync
//!
//! This module handles loading and validation of the YAML profile that
//! tells the client which server to talk to and how.

pub mod error;

use ledgersync_parser::ApiSetting;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use error::{ConfigError, ConfigResult};

// ==================== Configuration Types ====================

/// Remote server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the ledger server
    #[serde(default)]
    pub url: String,
    /// Basic authentication (optional)
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// `auto`, `html` or a specific API version
    #[serde(default)]
    pub api_version: ApiSetting,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth: None,
            api_version: ApiSetting::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Basic authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

/// Retrieval and submission behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Name under which retrieved data is stored
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Directory of the file-backed store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Submit nothing, fail at random instead
    #[serde(default = "default_false")]
    pub simulate: bool,
    #[serde(default = "default_failure_rate")]
    pub simulate_failure_rate: f64,
    /// Pause before a simulated submission completes
    #[serde(default = "default_simulate_delay_ms")]
    pub simulate_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            data_dir: default_data_dir(),
            simulate: false,
            simulate_failure_rate: default_failure_rate(),
            simulate_delay_ms: default_simulate_delay_ms(),
        }
    }
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_false() -> bool {
    false
}

fn default_failure_rate() -> f64 {
    0.3
}

fn default_simulate_delay_ms() -> u64 {
    1500
}

/// Journal display settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisplayConfig {
    /// Account whose running total is shown next to each transaction
    #[serde(default)]
    pub accumulate_account: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        log::debug!(target: "ledgersync::config", "loaded {}", path.display());
        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_yaml::from_str(content).map_err(|e| ConfigError::InvalidYaml {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        let url = self.server.url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingField {
                field: "server.url".to_string(),
            });
        }
        let host = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"))
            .ok_or_else(|| ConfigError::InvalidServerUrl {
                url: url.to_string(),
                reason: "URL must start with http:// or https://".to_string(),
            })?;
        if host.is_empty() || host.starts_with('/') {
            return Err(ConfigError::InvalidServerUrl {
                url: url.to_string(),
                reason: "URL must name a host".to_string(),
            });
        }

        if self.server.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_secs".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.sync.simulate_failure_rate) {
            return Err(ConfigError::InvalidValue {
                field: "sync.simulate_failure_rate".to_string(),
                reason: "Failure rate must be between 0.0 and 1.0".to_string(),
            });
        }

        if self.sync.profile.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sync.profile".to_string(),
                reason: "Profile name must not be empty".to_string(),
            });
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!("Log level must be one of {}", LOG_LEVELS.join(", ")),
            });
        }

        Ok(())
    }

    /// Generate a default configuration file
    pub fn generate_default() -> &'static str {
        include_str!("../templates/default_config.yaml")
    }

    /// Directory holding the stored data of the configured profile
    pub fn profile_dir(&self) -> PathBuf {
        self.sync.data_dir.join(&self.sync.profile)
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use error::ConfigErrorCode;
    use ledgersync_parser::ApiVersion;
    use std::io::Write;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_yaml("server:\n  url: http://ledger.local/\n").unwrap();
        assert_eq!(config.server.api_version, ApiSetting::Auto);
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.sync.profile, "default");
        assert!(!config.sync.simulate);
        assert_eq!(config.sync.simulate_failure_rate, 0.3);
        assert_eq!(config.sync.simulate_delay_ms, 1500);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.display.accumulate_account, None);
    }

    #[test]
    fn test_pinned_api_version() {
        let yaml = "server:\n  url: https://ledger.local\n  api_version: \"1.23\"\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.api_version, ApiSetting::Pinned(ApiVersion::V1_23));
    }

    #[test]
    fn test_unknown_api_version_is_rejected() {
        let yaml = "server:\n  url: https://ledger.local\n  api_version: \"0.9\"\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert_eq!(err.code(), ConfigErrorCode::InvalidYaml);
        assert!(err.to_details().to_string().contains("auto, html"));
    }

    #[test]
    fn test_missing_url() {
        let err = Config::from_yaml("logging:\n  level: debug\n").unwrap_err();
        assert_eq!(err.code(), ConfigErrorCode::MissingField);
        assert!(err.to_details().to_string().contains("server.url"));
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_yaml("server:\n  url: ftp://x\n").unwrap_err();
        assert_eq!(err.code(), ConfigErrorCode::InvalidServerUrl);
        assert!(err.to_details().to_string().contains("http://localhost:5000/"));

        let err = Config::from_yaml("server:\n  url: http://x\n  timeout_secs: 0\n").unwrap_err();
        assert_eq!(err.code(), ConfigErrorCode::InvalidValue);
        assert_eq!(err.to_details().field.as_deref(), Some("server.timeout_secs"));

        let err = Config::from_yaml("server:\n  url: http://x\nsync:\n  simulate_failure_rate: 1.5\n").unwrap_err();
        assert!(err.to_string().contains("simulate_failure_rate"));

        let err = Config::from_yaml("server:\n  url: http://x\nlogging:\n  level: loud\n").unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_default_template_parses() {
        let config = Config::from_yaml(Config::generate_default()).unwrap();
        assert_eq!(config.server.url, "http://localhost:5000/");
        assert_eq!(config.profile_dir(), PathBuf::from("./data/default"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  url: http://127.0.0.1:5000\n  auth:\n    username: me\n    password: pw").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.auth.unwrap().username, "me");

        let err = Config::load("/nonexistent/ledgersync.yaml").unwrap_err();
        assert_eq!(err.code(), ConfigErrorCode::FileNotFound);
    }
}
