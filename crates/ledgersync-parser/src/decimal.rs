//! Decimal-separator disambiguation for scraped amounts.
//!
//! The server renders numbers in the ledger's own locale, so `1.234,56` and
//! `1,234.56` can both show up. The rule is a heuristic on the trailing
//! digits: a separator followed by one or two digits at the very end is the
//! decimal mark. A three-digit tail such as `1,234` is therefore read as a
//! thousands group and left alone. This is a known limitation.

use crate::error::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

static DECIMAL_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\d\d?$").unwrap());
static DECIMAL_POINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\d\d?$").unwrap());

/// Rewrite `token` so that `.` is the only decimal separator.
///
/// Tokens matching neither pattern pass through unchanged.
pub fn normalize_decimal(token: &str) -> String {
    let mut value = token.to_string();
    if DECIMAL_COMMA.is_match(&value) {
        value = value.replace('.', "").replace(',', ".");
    }
    if DECIMAL_POINT.is_match(&value) {
        value = value.replace([',', ' '], "");
    }
    value
}

/// Parse an already normalized token
pub fn parse_decimal(value: &str) -> Result<Decimal, ParseError> {
    let trimmed = value.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    Decimal::from_str(unsigned).map_err(|_| ParseError::InvalidNumber {
        value: value.to_string(),
    })
}

/// Normalize then parse
pub fn parse_amount(token: &str) -> Result<Decimal, ParseError> {
    parse_decimal(&normalize_decimal(token))
}
