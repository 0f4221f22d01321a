//! Legacy HTML report scraping.
//!
//! Old servers only offer the `journal` report page: an accounts region
//! followed by a "General Journal" region. Both are scraped line by line
//! with push-style state machines; the patterns below have to match the
//! server's markup exactly.

pub mod accounts;
pub mod transactions;

pub use accounts::{AccountScraper, AccountState};
pub use transactions::{parse_posting_line, TransactionScraper, TransactionState};

use crate::cancel::CancellationToken;
use crate::error::ParseError;
use crate::types::{Account, Transaction};
use once_cell::sync::Lazy;
use regex::Regex;

/// Exact line that separates the accounts region from the journal region
pub const JOURNAL_HEADING: &str = "<h2>General Journal</h2>";

pub(crate) static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*;").unwrap());
pub(crate) static RE_ACCOUNT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"/register\?q=inacct%3A([a-zA-Z0-9%]+)""#).unwrap());
pub(crate) static RE_ACCOUNT_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span class="[^"]*\bamount\b[^"]*">\s*([-+]?[\d.,]+)(?:\s+(\S+))?</span>"#).unwrap()
});
pub(crate) static RE_TRANSACTION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<tr class="title" id="transaction-(\d+)"><td class="date"[^"]*>([\d.-]+)</td>"#).unwrap()
});
pub(crate) static RE_TRANSACTION_DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<tr class="posting" title="(\S+)\s(.+)"#).unwrap());
pub(crate) static RE_TRANSACTION_DETAILS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s+([!*]\s+)?(\S[\S\s]+\S)\s\s+(?:([^\d\s+\-]+)\s*)?([-+]?\d[\d,.]*)(?:\s*([^\d\s+\-]+)\s*$)?")
        .unwrap()
});
pub(crate) static RE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bid="addmodal""#).unwrap());

/// Lines starting with `;` (after optional whitespace) carry no data
pub fn is_comment(line: &str) -> bool {
    RE_COMMENT.is_match(line)
}

/// What a single fed line meant to the scraper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeEvent {
    /// Nothing observable happened
    None,
    /// The accounts region is over
    AccountsEnd,
    /// A transaction header with this id was seen
    TransactionStarted(u64),
    /// The transaction with this id got all of its postings
    TransactionCompleted(u64),
    /// No more data follows
    EndOfJournal,
}

/// Region of the report page currently being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalPhase {
    Accounts,
    Transactions,
    Done,
}

/// Scraper for the combined accounts + journal page
#[derive(Debug)]
pub struct JournalScraper {
    accounts: AccountScraper,
    transactions: TransactionScraper,
    phase: JournalPhase,
    line_no: usize,
    token: CancellationToken,
}

impl JournalScraper {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            accounts: AccountScraper::new(token.clone()),
            transactions: TransactionScraper::new(token.clone()),
            phase: JournalPhase::Accounts,
            line_no: 0,
            token,
        }
    }

    pub fn phase(&self) -> JournalPhase {
        self.phase
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transactions.state()
    }

    pub fn feed(&mut self, line: &str) -> Result<ScrapeEvent, ParseError> {
        self.token.check()?;
        self.line_no += 1;

        let result = match self.phase {
            JournalPhase::Accounts => self.accounts.feed(line),
            JournalPhase::Transactions => self.transactions.feed(line),
            JournalPhase::Done => return Ok(ScrapeEvent::EndOfJournal),
        };

        let event = result.map_err(|e| {
            log::debug!(target: "ledgersync::legacy", "line {}: {}", self.line_no, e);
            e
        })?;

        match event {
            ScrapeEvent::AccountsEnd => {
                log::debug!(target: "ledgersync::legacy", "→ expecting transaction");
                self.phase = JournalPhase::Transactions;
            }
            ScrapeEvent::EndOfJournal => {
                log::debug!(target: "ledgersync::legacy", "journal complete at line {}", self.line_no);
                self.phase = JournalPhase::Done;
            }
            _ => {}
        }
        Ok(event)
    }

    /// Consume the scraper, returning accounts and transactions in page order
    pub fn finish(self) -> Result<(Vec<Account>, Vec<Transaction>), ParseError> {
        self.token.check()?;
        let transactions = self.transactions.finish()?;
        Ok((self.accounts.finish(), transactions))
    }
}

/// Scrape just the accounts region
pub fn parse_accounts<'a, I>(lines: I, token: &CancellationToken) -> Result<Vec<Account>, ParseError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scraper = AccountScraper::new(token.clone());
    for line in lines {
        if scraper.feed(line)? == ScrapeEvent::AccountsEnd {
            break;
        }
    }
    Ok(scraper.finish())
}

/// Scrape just the journal region
pub fn parse_transactions<'a, I>(lines: I, token: &CancellationToken) -> Result<Vec<Transaction>, ParseError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scraper = TransactionScraper::new(token.clone());
    for line in lines {
        if scraper.feed(line)? == ScrapeEvent::EndOfJournal {
            break;
        }
    }
    scraper.finish()
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const PAGE: &str = r#"<html>
<table class="balancereport">
<tr><td class="account"><a href="/register?q=inacct%3Aassets%3Abank%3Achecking" title="Show transactions">assets:bank:checking</a></td>
<td class="amount"><span class="positive amount">1.234,56 EUR</span></td></tr>
<tr><td class="account"><a href="/register?q=inacct%3Aexpenses%3Afood" title="Show transactions">expenses:food</a></td>
<td class="amount"><span class="positive amount">12.50 EUR</span></td></tr>
</table>
<h2>General Journal</h2>
<table class="journalreport">
<tr class="title" id="transaction-1"><td class="date">2024-01-05</td>
<tr class="posting" title="2024-01-05 Groceries
    expenses:food  12.50 EUR
    assets:bank:checking  -12.50 EUR

">
<tr class="title" id="transaction-2"><td class="date">2024-01-06</td>
<tr class="posting" title="2024-01-06=2024-01-07 Salary
    assets:bank:checking  EUR 1247.06
    income:salary  EUR -1247.06

">
</table>
<div id="addmodal" class="modal"></div>
<tr class="title" id="transaction-99"><td class="date">2024-02-01</td>
</html>"#;

    #[test]
    fn test_journal_scraper_full_page() {
        let mut scraper = JournalScraper::new(CancellationToken::new());
        let mut started = Vec::new();
        for line in PAGE.lines() {
            match scraper.feed(line).unwrap() {
                ScrapeEvent::TransactionStarted(id) => started.push(id),
                ScrapeEvent::EndOfJournal => break,
                _ => {}
            }
        }
        assert_eq!(scraper.phase(), JournalPhase::Done);
        assert_eq!(started, vec![1, 2]);

        let (accounts, transactions) = scraper.finish().unwrap();
        let names: Vec<&str> = accounts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["assets", "assets:bank", "assets:bank:checking", "expenses", "expenses:food"]
        );
        let assets = &accounts[0];
        assert_eq!(assets.amount("EUR"), Some(Decimal::from_str("1234.56").unwrap()));

        assert_eq!(transactions.len(), 2);
        let salary = &transactions[1];
        assert_eq!(salary.id, 2);
        assert_eq!(salary.date.to_string(), "2024-01-07");
        assert_eq!(salary.description, "Salary");
        assert_eq!(salary.lines[0].currency.as_deref(), Some("EUR"));
        assert_eq!(salary.lines[1].amount, Some(Decimal::from_str("-1247.06").unwrap()));
    }

    #[test]
    fn test_heading_only_input() {
        let lines = [JOURNAL_HEADING];
        let accounts = parse_accounts(lines, &CancellationToken::new()).unwrap();
        assert!(accounts.is_empty());

        let mut scraper = JournalScraper::new(CancellationToken::new());
        assert_eq!(scraper.feed(JOURNAL_HEADING).unwrap(), ScrapeEvent::AccountsEnd);
        assert_eq!(scraper.phase(), JournalPhase::Transactions);
        assert_eq!(scraper.transaction_state(), TransactionState::ExpectingTransaction);
        let (accounts, transactions) = scraper.finish().unwrap();
        assert!(accounts.is_empty());
        assert!(transactions.is_empty());
    }

    #[test]
    fn test_comment_lines_are_skipped() {
        assert!(is_comment("; a comment"));
        assert!(is_comment("   ;indented"));
        assert!(!is_comment("a ; trailing"));
    }

    #[test]
    fn test_cancelled_scraper_stops() {
        let token = CancellationToken::new();
        let mut scraper = JournalScraper::new(token.clone());
        scraper.feed("<html>").unwrap();
        token.cancel();
        assert!(matches!(scraper.feed(JOURNAL_HEADING), Err(ParseError::Cancelled)));
    }
}
