use crate::error::ParseError;
use crate::types::{Transaction, TransactionLine};
use crate::version::ApiVersion;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{json, Map, Value};

const PRECISION: u32 = 2;

/// Build the `PUT add` body for `version`
pub fn transaction_save_request(version: ApiVersion, transaction: &Transaction) -> Result<Value, ParseError> {
    let postings = transaction
        .lines
        .iter()
        .map(|line| posting(version, line))
        .collect::<Result<Vec<Value>, ParseError>>()?;

    Ok(json!({
        "tcode": "",
        "tcomment": transaction.comment.clone().unwrap_or_default(),
        "tdate": transaction.date.format("%Y-%m-%d").to_string(),
        "tdate2": Value::Null,
        "tdescription": transaction.description,
        "tindex": transaction.id,
        "tpostings": postings,
        "tprecedingcomment": "",
        "tsourcepos": source_position(version),
        "tstatus": "Unmarked",
        "ttags": [],
    }))
}

fn posting(version: ApiVersion, line: &TransactionLine) -> Result<Value, ParseError> {
    let amounts: Vec<Value> = match line.amount {
        Some(value) => vec![amount(version, line.currency_key(), value)?],
        None => Vec::new(),
    };
    let tx_ref = if version.string_transaction_ids() {
        json!("0")
    } else {
        json!(0)
    };

    Ok(json!({
        "paccount": line.account_name,
        "pamount": amounts,
        "pbalanceassertion": Value::Null,
        "pcomment": line.comment.clone().unwrap_or_default(),
        "pdate": Value::Null,
        "pdate2": Value::Null,
        "poriginal": Value::Null,
        "pstatus": "Unmarked",
        "ptags": [],
        "ptransaction_": tx_ref,
        "ptype": "RegularPosting",
    }))
}

fn amount(version: ApiVersion, currency: &str, value: Decimal) -> Result<Value, ParseError> {
    let rounded = value.round_dp_with_strategy(PRECISION, RoundingStrategy::MidpointAwayFromZero);
    let mantissa = rounded
        .checked_mul(Decimal::from(100))
        .and_then(|cents| cents.trunc().to_i64())
        .ok_or_else(|| ParseError::format(version, format!("amount {} is out of range", value)))?;

    Ok(json!({
        "acommodity": currency,
        "aismultiplier": false,
        "aprice": Value::Null,
        "aquantity": {
            "decimalMantissa": mantissa,
            "decimalPlaces": PRECISION,
            "floatingPoint": rounded.to_f64().unwrap_or(0.0),
        },
        "astyle": style(version),
    }))
}

fn style(version: ApiVersion) -> Value {
    let mut style = Map::new();
    style.insert("ascommodityside".into(), json!("L"));
    style.insert("ascommodityspaced".into(), json!(false));
    style.insert("asdigitgroups".into(), Value::Null);
    if version >= ApiVersion::V1_32 {
        style.insert("asdecimalmark".into(), json!("."));
        style.insert("asprecision".into(), json!(PRECISION));
        style.insert("asrounding".into(), json!("NoRounding"));
    } else if version == ApiVersion::V1_19_1 {
        style.insert("asdecimalpoint".into(), json!("."));
        style.insert("asprecision".into(), json!({"tag": "Precision", "contents": PRECISION}));
    } else {
        style.insert("asdecimalpoint".into(), json!("."));
        style.insert("asprecision".into(), json!(PRECISION));
    }
    Value::Object(style)
}

fn source_position(version: ApiVersion) -> Value {
    let pos = json!({"sourceName": "", "sourceLine": 1, "sourceColumn": 1});
    if version.period_balances() {
        json!([pos.clone(), pos])
    } else {
        pos
    }
}
