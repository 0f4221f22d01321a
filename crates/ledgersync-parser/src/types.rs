//! Domain model shared by the legacy and structured parsers

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator between account name segments
pub const ACCOUNT_SEPARATOR: char = ':';

/// Ledger account with per-currency balances.
///
/// The empty currency key stands for "no currency".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub depth: usize,
    #[serde(default)]
    pub amounts: BTreeMap<String, Decimal>,
}

impl Account {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let depth = name.matches(ACCOUNT_SEPARATOR).count();
        Self {
            name,
            depth,
            amounts: BTreeMap::new(),
        }
    }

    /// Add `value` to the running balance in `currency`
    pub fn add_amount(&mut self, currency: &str, value: Decimal) {
        *self.amounts.entry(currency.to_string()).or_insert(Decimal::ZERO) += value;
    }

    pub fn amount(&self, currency: &str) -> Option<Decimal> {
        self.amounts.get(currency).copied()
    }

    pub fn parent_name(&self) -> Option<&str> {
        parent_name(&self.name)
    }
}

/// Name of the parent account, `None` for top-level names
pub fn parent_name(name: &str) -> Option<&str> {
    name.rfind(ACCOUNT_SEPARATOR).map(|idx| &name[..idx])
}

/// True when `child` lies below `parent` in the hierarchy
pub fn is_descendant(parent: &str, child: &str) -> bool {
    child.len() > parent.len()
        && child.starts_with(parent)
        && child[parent.len()..].starts_with(ACCOUNT_SEPARATOR)
}

/// One posting of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLine {
    pub account_name: String,
    /// Absent when the ledger balances the posting
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub comment: Option<String>,
}

impl TransactionLine {
    pub fn new(account_name: impl Into<String>, amount: Option<Decimal>, currency: Option<String>) -> Self {
        Self {
            account_name: account_name.into(),
            amount,
            currency,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    /// Currency key used for balance maps
    pub fn currency_key(&self) -> &str {
        self.currency.as_deref().unwrap_or("")
    }
}

/// Ledger transaction as reported by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Server-side sequence number
    pub id: u64,
    pub date: NaiveDate,
    pub description: String,
    pub comment: Option<String>,
    pub lines: Vec<TransactionLine>,
}

impl Transaction {
    pub fn new(id: u64, date: NaiveDate, description: impl Into<String>) -> Self {
        Self {
            id,
            date,
            description: description.into(),
            comment: None,
            lines: Vec::new(),
        }
    }

    /// Set the comment; whitespace-only comments are dropped
    pub fn with_comment(mut self, comment: Option<&str>) -> Self {
        self.comment = normalize_comment(comment);
        self
    }

    pub fn add_line(&mut self, line: TransactionLine) {
        self.lines.push(line);
    }
}

/// Trim a comment and turn an empty result into `None`
pub fn normalize_comment(comment: Option<&str>) -> Option<String> {
    comment
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

/// Newest first; equal dates put the larger id first
pub fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
}
