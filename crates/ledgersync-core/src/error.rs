//! Error types for ledgersync-core
//!
//! Every failure of a retrieval pass or a submission ends up as a
//! [`SyncError`]. Each variant carries an error code and severity and can be
//! expanded into [`ErrorDetails`] with suggestions for the user.

use ledgersync_config::ConfigError;
use ledgersync_parser::{ApiVersion, ParseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidUrl,
    TransportError,
    HttpError,
    FormatError,
    ApiNotSupported,
    ParseError,
    SubmissionRejected,
    RetriesExhausted,
    SimulatedFailure,
    StorageError,
    ConfigError,
    Cancelled,
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::InvalidUrl => write!(f, "INVALID_URL"),
            ErrorCode::TransportError => write!(f, "TRANSPORT_ERROR"),
            ErrorCode::HttpError => write!(f, "HTTP_ERROR"),
            ErrorCode::FormatError => write!(f, "FORMAT_ERROR"),
            ErrorCode::ApiNotSupported => write!(f, "API_NOT_SUPPORTED"),
            ErrorCode::ParseError => write!(f, "PARSE_ERROR"),
            ErrorCode::SubmissionRejected => write!(f, "SUBMISSION_REJECTED"),
            ErrorCode::RetriesExhausted => write!(f, "RETRIES_EXHAUSTED"),
            ErrorCode::SimulatedFailure => write!(f, "SIMULATED_FAILURE"),
            ErrorCode::StorageError => write!(f, "STORAGE_ERROR"),
            ErrorCode::ConfigError => write!(f, "CONFIG_ERROR"),
            ErrorCode::Cancelled => write!(f, "CANCELLED"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// Detailed error information for user-facing reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ErrorDetails {
    pub fn new(code: ErrorCode, message: String) -> Self {
        Self {
            code,
            message,
            details: None,
            suggestions: vec![],
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.details = Some(detail);
        self
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestions.push(suggestion);
        self
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, "\nDetails: {}", details)?;
        }
        if !self.suggestions.is_empty() {
            write!(f, "\nSuggestions:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n  - {}", suggestion)?;
            }
        }
        Ok(())
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Informational
    Info,
    /// Warning - operation may be affected
    Warning,
    /// Error - operation failed
    Error,
    /// Critical - nothing can work until fixed
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "info"),
            ErrorSeverity::Warning => write!(f, "warning"),
            ErrorSeverity::Error => write!(f, "error"),
            ErrorSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Main error type for ledgersync-core
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid server URL: {url}")]
    InvalidUrl { url: String },

    #[error("Network error: {message}")]
    Transport { message: String },

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Unexpected response format for API {version}: {message}")]
    Format { version: ApiVersion, message: String },

    #[error("Server version not supported")]
    ApiNotSupported,

    #[error("Parse error: {0}")]
    Parse(ParseError),

    #[error("Server rejected the transaction: {message}")]
    Submission { message: String },

    #[error("gave up after {tries} tries")]
    RetriesExhausted { tries: u32 },

    #[error("Simulated test exception")]
    Simulated,

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Get the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            SyncError::Transport { .. } => ErrorCode::TransportError,
            SyncError::Http { .. } => ErrorCode::HttpError,
            SyncError::Format { .. } => ErrorCode::FormatError,
            SyncError::ApiNotSupported => ErrorCode::ApiNotSupported,
            SyncError::Parse(_) => ErrorCode::ParseError,
            SyncError::Submission { .. } => ErrorCode::SubmissionRejected,
            SyncError::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,
            SyncError::Simulated => ErrorCode::SimulatedFailure,
            SyncError::Storage { .. } => ErrorCode::StorageError,
            SyncError::Config(_) => ErrorCode::ConfigError,
            SyncError::Cancelled => ErrorCode::Cancelled,
            SyncError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Get the severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SyncError::Cancelled => ErrorSeverity::Info,
            SyncError::Format { .. } | SyncError::Simulated => ErrorSeverity::Warning,
            SyncError::InvalidUrl { .. } | SyncError::Config(_) | SyncError::Internal { .. } => {
                ErrorSeverity::Critical
            }
            _ => ErrorSeverity::Error,
        }
    }

    /// A failure that only rules out one API version during a cascade
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, SyncError::Format { .. })
    }

    /// Convert to detailed error info
    pub fn to_details(&self) -> ErrorDetails {
        let mut details = ErrorDetails::new(self.code(), self.to_string());

        match self {
            SyncError::InvalidUrl { .. } => {
                details = details.with_suggestion("Check server.url in your config file.".to_string());
            }
            SyncError::Transport { .. } => {
                details = details
                    .with_suggestion("Check that the server is running and reachable.".to_string());
            }
            SyncError::Http { status, .. } => {
                details = details.with_detail(serde_json::json!({ "status": status }));
                if *status == 401 || *status == 403 {
                    details = details
                        .with_suggestion("Check server.auth credentials in your config file.".to_string());
                }
            }
            SyncError::Format { version, message } => {
                details = details.with_detail(serde_json::json!({
                    "api_version": version.to_string(),
                    "message": message,
                }));
            }
            SyncError::ApiNotSupported => {
                details = details
                    .with_suggestion("Set server.api_version to \"html\" to use the report page.".to_string())
                    .with_suggestion("Run `ledgersync version` to see what the server reports.".to_string());
            }
            SyncError::Parse(e) => {
                details = details.with_detail(serde_json::json!({ "parse_message": e.to_string() }));
            }
            SyncError::RetriesExhausted { tries } => {
                details = details.with_detail(serde_json::json!({ "tries": tries }));
            }
            _ => {}
        }

        details
    }
}

impl From<ParseError> for SyncError {
    fn from(error: ParseError) -> Self {
        match error {
            ParseError::Cancelled => SyncError::Cancelled,
            ParseError::Format { version, message } => SyncError::Format { version, message },
            other => SyncError::Parse(other),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        SyncError::Transport {
            message: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return SyncError::Http {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("").to_string(),
            };
        }
        if error.is_builder() {
            return SyncError::InvalidUrl {
                url: error.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        SyncError::Transport {
            message: error.to_string(),
        }
    }
}

/// Result type with SyncError
pub type SyncResult<T> = Result<T, SyncError>;

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::ApiNotSupported.to_string(), "API_NOT_SUPPORTED");
        assert_eq!(ErrorCode::RetriesExhausted.to_string(), "RETRIES_EXHAUSTED");
    }

    #[test]
    fn test_retry_message_carries_count() {
        let error = SyncError::RetriesExhausted { tries: 2 };
        assert_eq!(error.to_string(), "gave up after 2 tries");
        assert_eq!(error.to_details().details.unwrap()["tries"], 2);
    }

    #[test]
    fn test_parse_error_conversion() {
        assert!(matches!(SyncError::from(ParseError::Cancelled), SyncError::Cancelled));

        let format = SyncError::from(ParseError::format(ApiVersion::V1_40, "bad"));
        assert!(format.is_version_mismatch());
        assert_eq!(format.severity(), ErrorSeverity::Warning);

        let grammar = SyncError::from(ParseError::MissingTransactionId);
        assert_eq!(grammar.code(), ErrorCode::ParseError);
        assert!(!grammar.is_version_mismatch());
    }

    #[test]
    fn test_http_details() {
        let error = SyncError::Http {
            status: 401,
            message: "Unauthorized".to_string(),
        };
        let details = error.to_details();
        assert_eq!(details.code, ErrorCode::HttpError);
        assert_eq!(error.to_string(), "HTTP error 401: Unauthorized");
        assert!(!details.suggestions.is_empty());
    }

    #[test]
    fn test_api_not_supported_message() {
        let error = SyncError::ApiNotSupported;
        assert_eq!(error.to_string(), "Server version not supported");
        assert_eq!(error.to_details().suggestions.len(), 2);
    }
}
