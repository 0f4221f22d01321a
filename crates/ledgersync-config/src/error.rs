//! Error types for ledgersync-config

use ledgersync_parser::ApiVersion;
use thiserror::Error;

/// Values accepted by `server.api_version`, oldest structured version first
fn api_version_choices() -> String {
    let mut choices = vec!["auto", "html"];
    choices.extend(ApiVersion::NEWEST_FIRST.iter().rev().map(|v| v.as_str()));
    choices.join(", ")
}

/// Error codes for configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorCode {
    FileNotFound,
    InvalidYaml,
    MissingField,
    InvalidServerUrl,
    InvalidValue,
    IoError,
}

impl std::fmt::Display for ConfigErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ConfigErrorCode::FileNotFound => "CONFIG_NOT_FOUND",
            ConfigErrorCode::InvalidYaml => "CONFIG_SYNTAX",
            ConfigErrorCode::MissingField => "CONFIG_MISSING",
            ConfigErrorCode::InvalidServerUrl => "SERVER_URL",
            ConfigErrorCode::InvalidValue => "CONFIG_VALUE",
            ConfigErrorCode::IoError => "CONFIG_IO",
        };
        f.write_str(code)
    }
}

/// Whether the client can still talk to the server with this problem present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorSeverity {
    /// Only local behaviour (display, logging, simulation) is affected
    Warning,
    /// No request can be made
    Error,
}

impl std::fmt::Display for ConfigErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigErrorSeverity::Warning => write!(f, "warning"),
            ConfigErrorSeverity::Error => write!(f, "error"),
        }
    }
}

/// A configuration problem with hints for fixing the profile
#[derive(Debug, Clone)]
pub struct ConfigErrorDetails {
    pub code: ConfigErrorCode,
    pub severity: ConfigErrorSeverity,
    pub message: String,
    /// Dotted path of the offending key, e.g. `server.url`
    pub field: Option<String>,
    pub hints: Vec<String>,
}

impl std::fmt::Display for ConfigErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(field) = &self.field {
            write!(f, " (at {})", field)?;
        }
        for hint in &self.hints {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid YAML: {message}")]
    InvalidYaml { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid server URL '{url}': {reason}")]
    InvalidServerUrl { url: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Cannot read configuration: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConfigError {
    pub fn code(&self) -> ConfigErrorCode {
        match self {
            ConfigError::FileNotFound { .. } => ConfigErrorCode::FileNotFound,
            ConfigError::InvalidYaml { .. } => ConfigErrorCode::InvalidYaml,
            ConfigError::MissingField { .. } => ConfigErrorCode::MissingField,
            ConfigError::InvalidServerUrl { .. } => ConfigErrorCode::InvalidServerUrl,
            ConfigError::InvalidValue { .. } => ConfigErrorCode::InvalidValue,
            ConfigError::IoError(_) => ConfigErrorCode::IoError,
        }
    }

    /// Bad server settings stop every request; other sections only change local behaviour
    pub fn severity(&self) -> ConfigErrorSeverity {
        match self {
            ConfigError::InvalidValue { field, .. } if !field.starts_with("server.") => ConfigErrorSeverity::Warning,
            _ => ConfigErrorSeverity::Error,
        }
    }

    /// The offending key, when there is one
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::MissingField { field } | ConfigError::InvalidValue { field, .. } => Some(field.as_str()),
            ConfigError::InvalidServerUrl { .. } => Some("server.url"),
            _ => None,
        }
    }

    pub fn to_details(&self) -> ConfigErrorDetails {
        let mut hints: Vec<String> = match self {
            ConfigError::FileNotFound { .. } => vec![
                "pass another file with --config".to_string(),
                "or write a fresh one with `ledgersync default-config > config.yaml`".to_string(),
            ],
            // unknown api_version strings surface through serde
            ConfigError::InvalidYaml { message } if message.contains("Invalid API version") => {
                vec![format!("server.api_version accepts {}", api_version_choices())]
            }
            ConfigError::InvalidYaml { .. } => vec!["compare with `ledgersync default-config`".to_string()],
            _ => Vec::new(),
        };
        if let Some(field) = self.field() {
            hints.extend(field_hints(field).iter().map(|h| h.to_string()));
        }

        ConfigErrorDetails {
            code: self.code(),
            severity: self.severity(),
            message: self.to_string(),
            field: self.field().map(str::to_string),
            hints,
        }
    }
}

fn field_hints(field: &str) -> &'static [&'static str] {
    match field {
        "server.url" => &["use the address hledger-web serves on, e.g. http://localhost:5000/"],
        "server.timeout_secs" => &["a whole number of seconds, e.g. 30"],
        "sync.simulate_failure_rate" => &["0.0 never fails, 1.0 always fails"],
        "sync.profile" => &["any non-empty name; each profile is stored in its own directory"],
        "logging.level" => &["RUST_LOG overrides this setting"],
        _ => &[],
    }
}

/// Result type with ConfigError
pub type ConfigResult<T> = Result<T, ConfigError>;

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_problems_are_errors() {
        let url = ConfigError::InvalidServerUrl {
            url: "ftp://x".to_string(),
            reason: "URL must start with http:// or https://".to_string(),
        };
        assert_eq!(url.severity(), ConfigErrorSeverity::Error);
        let timeout = ConfigError::InvalidValue {
            field: "server.timeout_secs".to_string(),
            reason: "Timeout must be greater than 0".to_string(),
        };
        assert_eq!(timeout.severity(), ConfigErrorSeverity::Error);
        let level = ConfigError::InvalidValue {
            field: "logging.level".to_string(),
            reason: "unknown".to_string(),
        };
        assert_eq!(level.severity(), ConfigErrorSeverity::Warning);
    }

    #[test]
    fn test_details_carry_field_hints() {
        let err = ConfigError::InvalidServerUrl {
            url: "localhost".to_string(),
            reason: "URL must start with http:// or https://".to_string(),
        };
        let details = err.to_details();
        assert_eq!(details.code, ConfigErrorCode::InvalidServerUrl);
        assert_eq!(details.field.as_deref(), Some("server.url"));
        assert!(details.to_string().contains("http://localhost:5000/"));
    }

    #[test]
    fn test_api_version_hint() {
        let err = ConfigError::InvalidYaml {
            message: "server.api_version: Invalid API version: 2.0".to_string(),
        };
        assert!(err.to_details().hints[0].contains("1.19.1"));
    }
}
