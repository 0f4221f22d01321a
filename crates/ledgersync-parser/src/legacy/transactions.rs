//! Journal region of the legacy report page

use super::{
    is_comment, ScrapeEvent, RE_END, RE_TRANSACTION_DESCRIPTION, RE_TRANSACTION_DETAILS,
    RE_TRANSACTION_START,
};
use crate::cancel::CancellationToken;
use crate::decimal::{normalize_decimal, parse_decimal};
use crate::error::ParseError;
use crate::types::{Transaction, TransactionLine};
use chrono::NaiveDate;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    ExpectingTransaction,
    ExpectingTransactionDescription,
    ExpectingTransactionDetails,
}

/// Three-state scraper: header row, description row, posting lines
#[derive(Debug)]
pub struct TransactionScraper {
    state: TransactionState,
    transaction_id: u64,
    current: Option<Transaction>,
    transactions: Vec<Transaction>,
    done: bool,
    token: CancellationToken,
}

impl TransactionScraper {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            state: TransactionState::ExpectingTransaction,
            transaction_id: 0,
            current: None,
            transactions: Vec::new(),
            done: false,
            token,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn feed(&mut self, line: &str) -> Result<ScrapeEvent, ParseError> {
        self.token.check()?;
        if self.done {
            return Ok(ScrapeEvent::EndOfJournal);
        }
        if is_comment(line) {
            return Ok(ScrapeEvent::None);
        }

        match self.state {
            TransactionState::ExpectingTransaction => {
                if line.starts_with(' ') {
                    return Ok(ScrapeEvent::None);
                }
                if RE_END.is_match(line) {
                    log::debug!(target: "ledgersync::legacy", "--- transaction value complete ---");
                    self.done = true;
                    return Ok(ScrapeEvent::EndOfJournal);
                }
                let Some(caps) = RE_TRANSACTION_START.captures(line) else {
                    return Ok(ScrapeEvent::None);
                };
                let id = caps[1].parse::<u64>().map_err(|_| ParseError::InvalidNumber {
                    value: caps[1].to_string(),
                })?;
                self.transaction_id = id;
                self.state = TransactionState::ExpectingTransactionDescription;
                log::trace!(target: "ledgersync::legacy", "found transaction {} → expecting description", id);
                Ok(ScrapeEvent::TransactionStarted(id))
            }
            TransactionState::ExpectingTransactionDescription => {
                if line.starts_with(' ') {
                    return Ok(ScrapeEvent::None);
                }
                let Some(caps) = RE_TRANSACTION_DESCRIPTION.captures(line) else {
                    return Ok(ScrapeEvent::None);
                };
                if self.transaction_id == 0 {
                    return Err(ParseError::MissingTransactionId);
                }

                let date_token = &caps[1];
                let date_token = match date_token.find('=') {
                    Some(idx) => &date_token[idx + 1..],
                    None => date_token,
                };
                let date = parse_ledger_date(date_token)?;
                let description = &caps[2];
                log::trace!(
                    target: "ledgersync::legacy",
                    "transaction {} created for {} ({}) → expecting details",
                    self.transaction_id,
                    date,
                    description
                );
                self.current = Some(Transaction::new(self.transaction_id, date, description));
                self.state = TransactionState::ExpectingTransactionDetails;
                Ok(ScrapeEvent::None)
            }
            TransactionState::ExpectingTransactionDetails => {
                if line.is_empty() {
                    let id = self.complete_current()?;
                    self.state = TransactionState::ExpectingTransaction;
                    return Ok(ScrapeEvent::TransactionCompleted(id));
                }

                let posting = parse_posting_line(line).ok_or_else(|| ParseError::InvalidPosting {
                    id: self.transaction_id,
                    text: line.to_string(),
                })?;
                if let Some(tx) = self.current.as_mut() {
                    log::trace!(
                        target: "ledgersync::legacy",
                        "{}: {} = {:?}",
                        tx.id,
                        posting.account_name,
                        posting.amount
                    );
                    tx.add_line(posting);
                }
                Ok(ScrapeEvent::None)
            }
        }
    }

    /// Consume the scraper. A transaction cut off by the end of input is
    /// kept when it already has postings.
    pub fn finish(mut self) -> Result<Vec<Transaction>, ParseError> {
        if self.state == TransactionState::ExpectingTransactionDetails {
            self.complete_current()?;
        }
        Ok(self.transactions)
    }

    fn complete_current(&mut self) -> Result<u64, ParseError> {
        let tx = self.current.take().ok_or(ParseError::MissingTransactionId)?;
        if tx.lines.is_empty() {
            return Err(ParseError::EmptyTransaction { id: tx.id });
        }
        let id = tx.id;
        self.transactions.push(tx);
        log::trace!(target: "ledgersync::legacy", "transaction {} parsed → expecting transaction", id);
        Ok(id)
    }
}

/// Parse a date as rendered by the report page
pub fn parse_ledger_date(value: &str) -> Result<NaiveDate, ParseError> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .ok_or_else(|| ParseError::InvalidDate {
            value: value.to_string(),
        })
}

/// Parse one posting line: `[status] account  [currency] amount [currency]`.
///
/// Returns `None` when the line does not fit the grammar, including the case
/// of a currency on both sides of the amount.
pub fn parse_posting_line(line: &str) -> Option<TransactionLine> {
    let caps = RE_TRANSACTION_DETAILS.captures(line)?;
    let account_name = caps.get(2)?.as_str();
    let currency_pre = caps.get(3).map(|m| m.as_str()).filter(|s| !s.is_empty());
    let currency_post = caps.get(5).map(|m| m.as_str()).filter(|s| !s.is_empty());

    let currency = match (currency_pre, currency_post) {
        (Some(_), Some(_)) => return None,
        (Some(c), None) | (None, Some(c)) => Some(c.to_string()),
        (None, None) => None,
    };

    let amount = normalize_decimal(caps.get(4)?.as_str()).replace(',', ".");
    let amount = parse_decimal(&amount).ok()?;
    Some(TransactionLine::new(account_name, Some(amount), currency))
}
