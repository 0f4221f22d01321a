//! Error types for ledgersync-parser

use crate::version::ApiVersion;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Syntax error at line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("Can't parse transaction {id} details: {text}")]
    InvalidPosting { id: u64, text: String },

    #[error("Transaction {id} has no postings")]
    EmptyTransaction { id: u64 },

    #[error("Transaction id is 0 while expecting description")]
    MissingTransactionId,

    #[error("Invalid number: {value}")]
    InvalidNumber { value: String },

    #[error("Error parsing date '{value}'")]
    InvalidDate { value: String },

    #[error("Unexpected {version} format: {message}")]
    Format { version: ApiVersion, message: String },

    #[error("Parsing cancelled")]
    Cancelled,
}

impl ParseError {
    /// Build a structured-format error for `version`
    pub fn format(version: ApiVersion, message: impl Into<String>) -> Self {
        ParseError::Format {
            version,
            message: message.into(),
        }
    }

    /// True for errors that only rule out one API version
    pub fn is_format(&self) -> bool {
        matches!(self, ParseError::Format { .. })
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
