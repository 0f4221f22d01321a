use super::{array_field, parse_amount_object, str_field, u64_field};
use crate::error::ParseError;
use crate::types::{normalize_comment, Transaction, TransactionLine};
use crate::version::ApiVersion;
use chrono::NaiveDate;
use serde_json::Value;

/// Decode one element of the `transactions` list
pub fn parse_transaction(version: ApiVersion, item: &Value) -> Result<Transaction, ParseError> {
    let id = u64_field(version, item, "tindex")?;
    let date_str = str_field(version, item, "tdate")?;
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| ParseError::format(version, format!("bad tdate '{}'", date_str)))?;
    let description = str_field(version, item, "tdescription")?;
    let comment = item.get("tcomment").and_then(Value::as_str);

    if let Some(pos) = item.get("tsourcepos") {
        let shape_ok = if version.period_balances() {
            pos.is_array()
        } else {
            pos.is_object()
        };
        if !shape_ok {
            return Err(ParseError::format(version, "unexpected tsourcepos shape"));
        }
    }

    let mut transaction = Transaction::new(id, date, description).with_comment(comment);
    for posting in array_field(version, item, "tpostings")? {
        transaction.add_line(parse_posting(version, posting)?);
    }
    Ok(transaction)
}

fn parse_posting(version: ApiVersion, posting: &Value) -> Result<TransactionLine, ParseError> {
    if let Some(tx_ref) = posting.get("ptransaction_") {
        let shape_ok = if version.string_transaction_ids() {
            tx_ref.is_string()
        } else {
            tx_ref.is_number()
        };
        if !shape_ok {
            return Err(ParseError::format(version, "unexpected ptransaction_ type"));
        }
    }

    let account = str_field(version, posting, "paccount")?;
    let (amount, currency) = match array_field(version, posting, "pamount")?.first() {
        Some(amount) => {
            let (currency, value) = parse_amount_object(version, amount)?;
            (Some(value), Some(currency).filter(|c| !c.is_empty()))
        }
        None => (None, None),
    };
    let comment = normalize_comment(posting.get("pcomment").and_then(Value::as_str));

    Ok(TransactionLine::new(account, amount, currency).with_comment(comment))
}
