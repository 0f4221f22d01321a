//! Structured (JSON) responses of the ledger server.
//!
//! Each API version ships a slightly different JSON shape. The retriever only
//! sees the [`StructuredParser`] capability; [`JsonParser`] is the default
//! implementation for hledger-web.

mod accounts;
mod save;
mod transactions;

pub use accounts::parse_account;
pub use save::transaction_save_request;
pub use transactions::parse_transaction;

use crate::error::ParseError;
use crate::types::Transaction;
use crate::version::ApiVersion;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

/// One entry of the `accounts` list
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAccount {
    pub name: String,
    /// `(currency, amount)` pairs, the empty currency meaning "none"
    pub amounts: Vec<(String, Decimal)>,
    /// Postings the server counted for this account
    pub posting_count: u64,
}

pub type AccountStream = Box<dyn Iterator<Item = Result<ParsedAccount, ParseError>> + Send>;
pub type TransactionStream = Box<dyn Iterator<Item = Result<Transaction, ParseError>> + Send>;

/// Parser reference type
pub type StructuredParserRef = Arc<dyn StructuredParser>;

/// Parser for the structured responses of one API version.
///
/// The stream methods fail up front when the body is not a JSON list and
/// yield one item at a time afterwards; a shape mismatch is reported as
/// [`ParseError::Format`].
pub trait StructuredParser: Send + Sync {
    fn accounts(&self, version: ApiVersion, body: &str) -> Result<AccountStream, ParseError>;

    fn transactions(&self, version: ApiVersion, body: &str) -> Result<TransactionStream, ParseError>;

    /// JSON body for `PUT add`
    fn save_request(&self, version: ApiVersion, transaction: &Transaction) -> Result<String, ParseError>;
}

/// hledger-web JSON implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl StructuredParser for JsonParser {
    fn accounts(&self, version: ApiVersion, body: &str) -> Result<AccountStream, ParseError> {
        let items = parse_list(version, body)?;
        Ok(Box::new(items.into_iter().map(move |item| parse_account(version, &item))))
    }

    fn transactions(&self, version: ApiVersion, body: &str) -> Result<TransactionStream, ParseError> {
        let items = parse_list(version, body)?;
        Ok(Box::new(
            items.into_iter().map(move |item| parse_transaction(version, &item)),
        ))
    }

    fn save_request(&self, version: ApiVersion, transaction: &Transaction) -> Result<String, ParseError> {
        let body = transaction_save_request(version, transaction)?;
        serde_json::to_string(&body).map_err(|e| ParseError::format(version, e.to_string()))
    }
}

fn parse_list(version: ApiVersion, body: &str) -> Result<Vec<Value>, ParseError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(ParseError::format(version, "expected a JSON list")),
        Err(e) => Err(ParseError::format(version, e.to_string())),
    }
}

// ==================== Field helpers ====================

pub(crate) fn field<'a>(version: ApiVersion, obj: &'a Value, name: &str) -> Result<&'a Value, ParseError> {
    obj.get(name)
        .ok_or_else(|| ParseError::format(version, format!("missing field '{}'", name)))
}

pub(crate) fn str_field<'a>(version: ApiVersion, obj: &'a Value, name: &str) -> Result<&'a str, ParseError> {
    field(version, obj, name)?
        .as_str()
        .ok_or_else(|| ParseError::format(version, format!("field '{}' is not a string", name)))
}

pub(crate) fn array_field<'a>(version: ApiVersion, obj: &'a Value, name: &str) -> Result<&'a Vec<Value>, ParseError> {
    field(version, obj, name)?
        .as_array()
        .ok_or_else(|| ParseError::format(version, format!("field '{}' is not a list", name)))
}

pub(crate) fn u64_field(version: ApiVersion, obj: &Value, name: &str) -> Result<u64, ParseError> {
    field(version, obj, name)?
        .as_u64()
        .ok_or_else(|| ParseError::format(version, format!("field '{}' is not a number", name)))
}

/// `{"acommodity": "EUR", "aquantity": {"decimalMantissa": 1250, "decimalPlaces": 2}}`
pub(crate) fn parse_amount_object(version: ApiVersion, amount: &Value) -> Result<(String, Decimal), ParseError> {
    let currency = str_field(version, amount, "acommodity")?.to_string();
    let quantity = field(version, amount, "aquantity")?;
    let mantissa = field(version, quantity, "decimalMantissa")?
        .as_i64()
        .ok_or_else(|| ParseError::format(version, "decimalMantissa is not an integer"))?;
    let places = u64_field(version, quantity, "decimalPlaces")?;
    let places = u32::try_from(places).map_err(|_| ParseError::format(version, "decimalPlaces out of range"))?;
    let value = Decimal::try_new(mantissa, places)
        .map_err(|e| ParseError::format(version, format!("bad quantity: {}", e)))?;
    Ok((currency, value))
}
