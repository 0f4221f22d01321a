//! Accounts region of the legacy report page

use super::{is_comment, ScrapeEvent, JOURNAL_HEADING, RE_ACCOUNT_NAME, RE_ACCOUNT_VALUE};
use crate::arena::AccountArena;
use crate::cancel::CancellationToken;
use crate::decimal::parse_amount;
use crate::error::ParseError;
use crate::types::{parent_name, Account};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    ExpectingAccount,
    ExpectingAccountAmount,
}

/// Two-state scraper: an account link line, then its amount spans
#[derive(Debug)]
pub struct AccountScraper {
    arena: AccountArena,
    state: AccountState,
    current: Option<usize>,
    /// Ancestors synthesized for `current`; they receive its amounts
    synthetic: Vec<usize>,
    /// Lines fed so far; the region starts at the top of the page
    line_no: usize,
    token: CancellationToken,
}

impl AccountScraper {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            arena: AccountArena::new(),
            state: AccountState::ExpectingAccount,
            current: None,
            synthetic: Vec::new(),
            line_no: 0,
            token,
        }
    }

    pub fn state(&self) -> AccountState {
        self.state
    }

    pub fn arena(&self) -> &AccountArena {
        &self.arena
    }

    pub fn feed(&mut self, line: &str) -> Result<ScrapeEvent, ParseError> {
        self.token.check()?;
        self.line_no += 1;
        if is_comment(line) {
            return Ok(ScrapeEvent::None);
        }

        match self.state {
            AccountState::ExpectingAccount => self.expect_account(line),
            AccountState::ExpectingAccountAmount => self.expect_amount(line),
        }
    }

    pub fn finish(self) -> Vec<Account> {
        self.arena.into_accounts()
    }

    fn expect_account(&mut self, line: &str) -> Result<ScrapeEvent, ParseError> {
        if line == JOURNAL_HEADING {
            return Ok(ScrapeEvent::AccountsEnd);
        }
        let Some(caps) = RE_ACCOUNT_NAME.captures(line) else {
            return Ok(ScrapeEvent::None);
        };

        let encoded = &caps[1];
        let name = urlencoding::decode(encoded)
            .map_err(|_| ParseError::SyntaxError {
                line: self.line_no,
                message: format!("account name '{}' is not valid UTF-8", encoded),
            })?
            .replace('"', "");
        log::trace!(target: "ledgersync::legacy", "found account: {}", name);

        if self.arena.contains(&name) {
            log::debug!(target: "ledgersync::legacy", "ignoring duplicate account '{}'", name);
            return Ok(ScrapeEvent::None);
        }

        self.synthetic = match parent_name(&name) {
            Some(parent) => self.arena.ensure(parent).created,
            None => Vec::new(),
        };
        self.current = self.arena.insert(Account::new(name));
        self.state = AccountState::ExpectingAccountAmount;
        log::trace!(target: "ledgersync::legacy", "→ expecting account amount");
        Ok(ScrapeEvent::None)
    }

    fn expect_amount(&mut self, line: &str) -> Result<ScrapeEvent, ParseError> {
        if line == JOURNAL_HEADING {
            // The amount line never came; keep what was collected so far.
            log::warn!(
                target: "ledgersync::legacy",
                "accounts region ended while expecting an amount for {:?}",
                self.current.map(|idx| self.arena.account(idx).name.clone())
            );
            self.synthetic.clear();
            self.current = None;
            self.state = AccountState::ExpectingAccount;
            return Ok(ScrapeEvent::AccountsEnd);
        }

        let Some(current) = self.current else {
            self.state = AccountState::ExpectingAccount;
            return Ok(ScrapeEvent::None);
        };

        let mut matched = false;
        for caps in RE_ACCOUNT_VALUE.captures_iter(line) {
            self.token.check()?;
            matched = true;

            let value = parse_amount(&caps[1])?;
            let currency = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            log::trace!(target: "ledgersync::legacy", "curr={}, value={}", currency, value);
            self.arena.add_amount(current, &self.synthetic, currency, value);
        }

        if matched {
            self.synthetic.clear();
            self.state = AccountState::ExpectingAccount;
            log::trace!(target: "ledgersync::legacy", "→ expecting account");
        }
        Ok(ScrapeEvent::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::parse_accounts;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn link(name: &str) -> String {
        format!(
            r#"<td><a href="/register?q=inacct%3A{}" class="account">x</a></td>"#,
            name.replace(':', "%3A")
        )
    }

    fn amount(value: &str, currency: &str) -> String {
        format!(r#"<span class="positive amount">{} {}</span>"#, value, currency)
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_synthesized_ancestors_carry_amounts() {
        let lines = vec![link("assets:bank:checking"), amount("100.25", "USD")];
        let accounts = parse_accounts(lines.iter().map(String::as_str), &CancellationToken::new()).unwrap();

        assert_eq!(accounts.len(), 3);
        for name in ["assets", "assets:bank", "assets:bank:checking"] {
            let account = accounts.iter().find(|a| a.name == name).unwrap();
            assert_eq!(account.amount("USD"), Some(dec("100.25")), "{}", name);
        }
    }

    #[test]
    fn test_every_ancestor_present() {
        let lines = vec![
            link("expenses:food:groceries"),
            amount("5", "EUR"),
            link("liabilities:card:visa:main"),
            amount("-20", "EUR"),
            link("equity"),
            amount("0", "EUR"),
        ];
        let accounts = parse_accounts(lines.iter().map(String::as_str), &CancellationToken::new()).unwrap();
        for account in &accounts {
            let mut name = account.name.as_str();
            while let Some(parent) = parent_name(name) {
                assert!(accounts.iter().any(|a| a.name == parent), "missing {}", parent);
                name = parent;
            }
        }
        assert_eq!(accounts.len(), 8);
    }

    #[test]
    fn test_multiple_currencies_on_one_line() {
        let line = format!("{}{}", amount("1,234.50", "USD"), amount("3", "EUR"));
        let lines = vec![link("assets:cash"), line];
        let accounts = parse_accounts(lines.iter().map(String::as_str), &CancellationToken::new()).unwrap();
        let cash = accounts.iter().find(|a| a.name == "assets:cash").unwrap();
        assert_eq!(cash.amount("USD"), Some(dec("1234.50")));
        assert_eq!(cash.amount("EUR"), Some(dec("3")));
        let assets = accounts.iter().find(|a| a.name == "assets").unwrap();
        assert_eq!(assets.amounts, cash.amounts);
    }

    #[test]
    fn test_missing_currency_is_empty_key() {
        let lines = vec![
            link("assets"),
            r#"<span class="amount">42</span>"#.to_string(),
        ];
        let accounts = parse_accounts(lines.iter().map(String::as_str), &CancellationToken::new()).unwrap();
        assert_eq!(accounts[0].amount(""), Some(dec("42")));
    }

    #[test]
    fn test_duplicate_account_is_idempotent() {
        let lines = vec![
            link("assets:cash"),
            amount("10", "USD"),
            link("assets:cash"),
            amount("10", "USD"),
        ];
        let accounts = parse_accounts(lines.iter().map(String::as_str), &CancellationToken::new()).unwrap();
        let cash: Vec<&Account> = accounts.iter().filter(|a| a.name == "assets:cash").collect();
        assert_eq!(cash.len(), 1);
        assert_eq!(cash[0].amount("USD"), Some(dec("10")));
    }

    #[test]
    fn test_percent_decoding_and_quotes() {
        let lines = vec![
            r#"<a href="/register?q=inacct%3Aexpenses%3Acaf%C3%A9%22" >"#.to_string(),
            amount("3.50", "EUR"),
        ];
        let accounts = parse_accounts(lines.iter().map(String::as_str), &CancellationToken::new()).unwrap();
        assert!(accounts.iter().any(|a| a.name == "expenses:café"));
    }

    #[test]
    fn test_undecodable_name_reports_its_line() {
        let lines = vec![
            link("assets"),
            amount("1", "USD"),
            r#"<a href="/register?q=inacct%3Aexpenses%3A%FF" >"#.to_string(),
        ];
        let err = parse_accounts(lines.iter().map(String::as_str), &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, ParseError::SyntaxError { line: 3, .. }), "{:?}", err);
    }

    #[test]
    fn test_heading_while_expecting_amount_keeps_partial_result() {
        let mut scraper = AccountScraper::new(CancellationToken::new());
        scraper.feed(&link("assets:bank")).unwrap();
        assert_eq!(scraper.state(), AccountState::ExpectingAccountAmount);
        assert_eq!(scraper.feed(JOURNAL_HEADING).unwrap(), ScrapeEvent::AccountsEnd);

        let accounts = scraper.finish();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.amounts.is_empty()));
    }

    #[test]
    fn test_comment_line_does_not_consume_amount_state() {
        let mut scraper = AccountScraper::new(CancellationToken::new());
        scraper.feed(&link("assets")).unwrap();
        scraper.feed("  ; <span class=\"amount\">99 USD</span>").unwrap();
        assert_eq!(scraper.state(), AccountState::ExpectingAccountAmount);
        scraper.feed(&amount("1", "USD")).unwrap();
        assert_eq!(scraper.state(), AccountState::ExpectingAccount);
        assert_eq!(scraper.finish()[0].amount("USD"), Some(dec("1")));
    }
}
