use super::{array_field, field, parse_amount_object, str_field, ParsedAccount};
use crate::error::ParseError;
use crate::version::ApiVersion;
use serde_json::Value;

/// Decode one element of the `accounts` list.
///
/// Up to 1.40 balances sit in `aibalance`; 1.50 moved them to
/// `adata.pdperiods[0][1].bdincludingsubs`.
pub fn parse_account(version: ApiVersion, item: &Value) -> Result<ParsedAccount, ParseError> {
    let name = str_field(version, item, "aname")?.to_string();

    let (balances, posting_count) = if version.period_balances() {
        let data = field(version, item, "adata")?;
        let periods = array_field(version, data, "pdperiods")?;
        match periods.first() {
            Some(period) => {
                let balance = period
                    .as_array()
                    .and_then(|entry| entry.get(1))
                    .ok_or_else(|| ParseError::format(version, "pdperiods entry is not a [date, balance] pair"))?;
                let amounts = array_field(version, balance, "bdincludingsubs")?;
                let count = balance.get("bdnumpostings").and_then(Value::as_u64).unwrap_or(0);
                (amounts.as_slice(), count)
            }
            None => (&[][..], 0),
        }
    } else {
        if item.get("adata").is_some() {
            return Err(ParseError::format(version, "unexpected 'adata' field"));
        }
        let amounts = array_field(version, item, "aibalance")?;
        let count = item.get("anumpostings").and_then(Value::as_u64).unwrap_or(0);
        (amounts.as_slice(), count)
    };

    let amounts = balances
        .iter()
        .map(|amount| parse_amount_object(version, amount))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedAccount {
        name,
        amounts,
        posting_count,
    })
}
