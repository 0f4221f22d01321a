//! Display sequence for the transaction list.
//!
//! Transactions are fed oldest first so running totals grow in time order;
//! [`TransactionAccumulator::items`] hands the sequence out newest first,
//! with a date delimiter above each group of same-date transactions.

use chrono::{Datelike, NaiveDate};
use ledgersync_parser::{is_descendant, Transaction, TransactionLine};
use ledgersync_utils::{format_amount, format_number};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;

/// One entry of the display sequence
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayItem {
    /// Always first
    Header,
    DateDelimiter {
        date: NaiveDate,
        /// The month (or year) differs from the neighbouring newer group
        month_boundary: bool,
    },
    Transaction(TransactionItem),
}

impl DisplayItem {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            DisplayItem::Header => None,
            DisplayItem::DateDelimiter { date, .. } => Some(*date),
            DisplayItem::Transaction(item) => Some(item.date),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionItem {
    pub id: u64,
    pub date: NaiveDate,
    pub description: String,
    pub comment: Option<String>,
    pub lines: Vec<TransactionLine>,
    /// Balance of the tracked account after this transaction, one line per currency
    pub running_total: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionAccumulator {
    accumulate_account: Option<String>,
    /// Oldest first, header excluded
    items: Vec<DisplayItem>,
    running_total: BTreeMap<String, Decimal>,
    earliest_date: Option<NaiveDate>,
    latest_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
    transaction_count: usize,
}

impl TransactionAccumulator {
    /// `accumulate_account` selects the account (with its sub-accounts)
    /// whose running total accompanies each transaction
    pub fn new(accumulate_account: Option<String>) -> Self {
        Self {
            accumulate_account,
            ..Self::default()
        }
    }

    /// Build from a retrieved list, which is newest first
    pub fn from_retrieved(accumulate_account: Option<String>, transactions: &[Transaction]) -> Self {
        let mut accumulator = Self::new(accumulate_account);
        for transaction in transactions.iter().rev() {
            accumulator.put(transaction);
        }
        accumulator
    }

    /// Add the next transaction, which must not be older than the previous one
    pub fn put(&mut self, transaction: &Transaction) {
        let date = transaction.date;
        self.transaction_count += 1;
        if self.earliest_date.is_none() {
            self.earliest_date = Some(date);
        }
        self.latest_date = Some(date);

        if let Some(last) = self.last_date {
            if last != date {
                self.items.push(DisplayItem::DateDelimiter {
                    date: last,
                    month_boundary: month_changed(last, date),
                });
            }
        }

        let running_total = match self.accumulate_account.as_deref() {
            Some(account) => {
                for line in &transaction.lines {
                    if line.account_name == account || is_descendant(account, &line.account_name) {
                        let amount = line
                            .amount
                            .unwrap_or(Decimal::ZERO)
                            .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
                        *self
                            .running_total
                            .entry(line.currency_key().to_string())
                            .or_insert(Decimal::ZERO) += amount;
                    }
                }
                Some(summarize(&self.running_total))
            }
            None => None,
        };

        self.items.push(DisplayItem::Transaction(TransactionItem {
            id: transaction.id,
            date,
            description: transaction.description.clone(),
            comment: transaction.comment.clone(),
            lines: transaction.lines.clone(),
            running_total,
        }));
        self.last_date = Some(date);
    }

    /// Header first, then newest to oldest.
    ///
    /// When the newest transaction is not from `today`, its group still gets
    /// a delimiter, flagged as a month boundary relative to `today`.
    pub fn items(&self, today: NaiveDate) -> Vec<DisplayItem> {
        let mut result = Vec::with_capacity(self.items.len() + 2);
        result.push(DisplayItem::Header);
        if let Some(last) = self.last_date {
            if last != today {
                result.push(DisplayItem::DateDelimiter {
                    date: last,
                    month_boundary: month_changed(last, today),
                });
            }
        }
        result.extend(self.items.iter().rev().cloned());
        result
    }

    /// Forget everything but the tracked account
    pub fn reset(&mut self) {
        *self = Self::new(self.accumulate_account.take());
    }

    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.earliest_date
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.latest_date
    }

    pub fn transaction_count(&self) -> usize {
        self.transaction_count
    }
}

fn month_changed(a: NaiveDate, b: NaiveDate) -> bool {
    a.month() != b.month() || a.year() != b.year()
}

/// `"EUR 12.50\nUSD -3.00"`; amounts without a currency get no prefix
fn summarize(totals: &BTreeMap<String, Decimal>) -> String {
    totals
        .iter()
        .map(|(currency, value)| {
            let amount = format_number(format_amount(*value));
            if currency.is_empty() {
                amount
            } else {
                format!("{} {}", currency, amount)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx(id: u64, on: NaiveDate, lines: &[(&str, &str, &str)]) -> Transaction {
        let mut t = Transaction::new(id, on, format!("tx {}", id));
        for (account, amount, currency) in lines {
            let currency = (!currency.is_empty()).then(|| currency.to_string());
            t.add_line(TransactionLine::new(*account, Some(Decimal::from_str(amount).unwrap()), currency));
        }
        t
    }

    fn totals(items: &[DisplayItem]) -> Vec<Option<String>> {
        items
            .iter()
            .filter_map(|item| match item {
                DisplayItem::Transaction(t) => Some(t.running_total.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_empty_is_header_only() {
        let acc = TransactionAccumulator::new(None);
        assert_eq!(acc.items(date(2024, 1, 1)), vec![DisplayItem::Header]);
    }

    #[test]
    fn test_running_totals_newest_first() {
        let mut acc = TransactionAccumulator::new(Some("expenses:food".to_string()));
        acc.put(&tx(1, date(2026, 1, 15), &[("expenses:food", "25.00", ""), ("assets:cash", "-25", "")]));
        acc.put(&tx(2, date(2026, 1, 16), &[("expenses:food", "35.50", ""), ("assets:cash", "-35.5", "")]));

        let items = acc.items(date(2026, 1, 16));
        assert_eq!(totals(&items), vec![Some("60.50".to_string()), Some("25.00".to_string())]);
    }

    #[test]
    fn test_descendants_count_and_thousands() {
        let mut acc = TransactionAccumulator::new(Some("expenses".to_string()));
        acc.put(&tx(1, date(2026, 1, 15), &[("expenses:food", "1234.56", ""), ("expensesx", "7", "")]));
        let items = acc.items(date(2026, 1, 15));
        assert_eq!(totals(&items), vec![Some("1,234.56".to_string())]);
    }

    #[test]
    fn test_multiple_currencies() {
        let mut acc = TransactionAccumulator::new(Some("assets:cash".to_string()));
        acc.put(&tx(
            1,
            date(2026, 1, 15),
            &[("assets:cash", "100", "USD"), ("assets:cash", "50", "EUR"), ("income", "-150", "")],
        ));
        let items = acc.items(date(2026, 1, 15));
        assert_eq!(totals(&items), vec![Some("EUR 50.00\nUSD 100.00".to_string())]);
    }

    #[test]
    fn test_banker_rounding_per_posting() {
        let mut acc = TransactionAccumulator::new(Some("a".to_string()));
        acc.put(&tx(1, date(2026, 1, 15), &[("a", "0.125", ""), ("a", "0.135", "")]));
        // 0.12 + 0.14
        assert_eq!(totals(&acc.items(date(2026, 1, 15))), vec![Some("0.26".to_string())]);
    }

    #[test]
    fn test_no_tracked_account_means_no_total() {
        let mut acc = TransactionAccumulator::new(None);
        acc.put(&tx(1, date(2026, 1, 15), &[("a", "1", "")]));
        assert_eq!(totals(&acc.items(date(2026, 1, 15))), vec![None]);
    }

    #[test]
    fn test_delimiters() {
        let mut acc = TransactionAccumulator::new(None);
        acc.put(&tx(1, date(2024, 1, 31), &[("a", "1", "")]));
        acc.put(&tx(2, date(2024, 2, 1), &[("a", "1", "")]));
        acc.put(&tx(3, date(2024, 2, 1), &[("a", "1", "")]));
        acc.put(&tx(4, date(2024, 2, 5), &[("a", "1", "")]));

        let items = acc.items(date(2024, 3, 2));
        let kinds: Vec<String> = items
            .iter()
            .map(|item| match item {
                DisplayItem::Header => "H".to_string(),
                DisplayItem::DateDelimiter { date, month_boundary } => {
                    format!("D{}{}", date.format("%m%d"), if *month_boundary { "!" } else { "" })
                }
                DisplayItem::Transaction(t) => format!("T{}", t.id),
            })
            .collect();
        assert_eq!(kinds, vec!["H", "D0205!", "T4", "D0201", "T3", "T2", "D0131!", "T1"]);
    }

    #[test]
    fn test_no_final_delimiter_for_today() {
        let mut acc = TransactionAccumulator::new(None);
        acc.put(&tx(1, date(2024, 2, 5), &[("a", "1", "")]));
        let items = acc.items(date(2024, 2, 5));
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], DisplayItem::Transaction(_)));
    }

    #[test]
    fn test_counters() {
        let newest_first = vec![
            tx(2, date(2026, 1, 20), &[("a", "1", "")]),
            tx(1, date(2026, 1, 15), &[("a", "1", "")]),
        ];
        let acc = TransactionAccumulator::from_retrieved(None, &newest_first);
        assert_eq!(acc.transaction_count(), 2);
        assert_eq!(acc.earliest_date(), Some(date(2026, 1, 15)));
        assert_eq!(acc.latest_date(), Some(date(2026, 1, 20)));
    }

    #[test]
    fn test_reset_replays_identically() {
        let newest_first = vec![
            tx(3, date(2024, 3, 1), &[("assets:cash", "-5", "EUR")]),
            tx(2, date(2024, 2, 28), &[("assets:cash", "10.005", "EUR")]),
            tx(1, date(2024, 2, 28), &[("assets:cash", "20", "")]),
        ];
        let today = date(2024, 3, 10);

        let mut acc = TransactionAccumulator::new(Some("assets".to_string()));
        for t in newest_first.iter().rev() {
            acc.put(t);
        }
        let first = acc.items(today);

        acc.reset();
        assert_eq!(acc.transaction_count(), 0);
        for t in newest_first.iter().rev() {
            acc.put(t);
        }
        assert_eq!(acc.items(today), first);
        assert_eq!(
            first,
            TransactionAccumulator::from_retrieved(Some("assets".to_string()), &newest_first).items(today)
        );
    }
}
