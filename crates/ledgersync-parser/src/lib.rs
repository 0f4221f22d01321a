//! Ledger server response parsers
//!
//! Turns whatever the server sends, legacy HTML report pages or one of the
//! versioned JSON formats, into a single domain model of accounts and
//! transactions.

pub mod arena;
pub mod cancel;
pub mod decimal;
pub mod error;
pub mod json;
pub mod legacy;
pub mod types;
pub mod version;

pub use arena::{AccountArena, Materialized};
pub use cancel::CancellationToken;
pub use decimal::{normalize_decimal, parse_amount};
pub use error::{ParseError, ParseResult};
pub use json::{
    AccountStream, JsonParser, ParsedAccount, StructuredParser, StructuredParserRef, TransactionStream,
};
pub use legacy::{JournalPhase, JournalScraper, ScrapeEvent};
pub use types::{
    is_descendant, parent_name, sort_newest_first, Account, Transaction, TransactionLine, ACCOUNT_SEPARATOR,
};
pub use version::{ApiSetting, ApiVersion};
