//! Version-cascading retrieval of accounts and transactions.
//!
//! A pass first tries the structured endpoints (`accounts`, then
//! `transactions`). With the `auto` setting every known API version is tried
//! newest first; a response that does not fit a version's shape only rules
//! that version out. When the server has no structured endpoints (404) or
//! the profile asks for `html`, the legacy `journal` page is scraped instead.

use crate::client::{require_ok, LedgerClient};
use crate::error::{SyncError, SyncResult};
use crate::progress::{NullSink, Progress, ProgressSink};
use ledgersync_parser::{
    sort_newest_first, Account, AccountArena, ApiSetting, ApiVersion, CancellationToken, JournalScraper,
    JsonParser, ParseError, ScrapeEvent, StructuredParserRef, Transaction,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

/// Name hledger gives to the implicit top of the account tree
const ROOT_ACCOUNT: &str = "root";

/// Everything one successful pass retrieved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub accounts: Vec<Account>,
    /// Newest first
    pub transactions: Vec<Transaction>,
}

/// How a retrieval pass ended
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(LedgerSnapshot),
    /// Stopped on request; not an error
    Cancelled,
    Failed(String),
}

impl SyncOutcome {
    /// Message for the user, `None` on success and on cancellation
    pub fn error(&self) -> Option<&str> {
        match self {
            SyncOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }

    pub fn snapshot(&self) -> Option<&LedgerSnapshot> {
        match self {
            SyncOutcome::Completed(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// Runs one retrieval pass against a server
pub struct Retriever {
    client: Arc<LedgerClient>,
    parser: StructuredParserRef,
    setting: ApiSetting,
    token: CancellationToken,
    sink: Arc<dyn ProgressSink>,
}

impl Retriever {
    pub fn new(client: Arc<LedgerClient>, setting: ApiSetting) -> Self {
        Self {
            client,
            parser: Arc::new(JsonParser),
            setting,
            token: CancellationToken::new(),
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_parser(mut self, parser: StructuredParserRef) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run the pass and publish exactly one FINISHED update
    pub fn run(&self) -> SyncOutcome {
        self.sink.publish(Progress::starting());

        let outcome = match self.retrieve() {
            Ok(snapshot) => {
                log::info!(
                    target: "ledgersync::retrieve",
                    "retrieved {} accounts and {} transactions",
                    snapshot.accounts.len(),
                    snapshot.transactions.len()
                );
                SyncOutcome::Completed(snapshot)
            }
            Err(SyncError::Cancelled) => {
                log::debug!(target: "ledgersync::retrieve", "retrieval was cancelled");
                SyncOutcome::Cancelled
            }
            Err(e) => {
                log::warn!(target: "ledgersync::retrieve", "[{}] {}", e.code(), e);
                SyncOutcome::Failed(e.to_string())
            }
        };

        self.sink
            .publish(Progress::finished(outcome.error().map(str::to_string)));
        outcome
    }

    /// Retrieve accounts and transactions, structured first
    pub fn retrieve(&self) -> SyncResult<LedgerSnapshot> {
        self.token.check()?;

        let structured = match self.setting {
            ApiSetting::Html => {
                log::debug!(target: "ledgersync::retrieve", "declining structured API for the html setting");
                None
            }
            ApiSetting::Pinned(version) => self.retrieve_structured(&[version], false)?,
            ApiSetting::Auto => self.retrieve_structured(&ApiVersion::NEWEST_FIRST, true)?,
        };

        match structured {
            Some(snapshot) => Ok(snapshot),
            None => self.retrieve_legacy(),
        }
    }

    /// `None` when the server lacks one of the structured endpoints
    fn retrieve_structured(&self, versions: &[ApiVersion], cascading: bool) -> SyncResult<Option<LedgerSnapshot>> {
        let Some((version, (accounts, expected_postings))) =
            self.cascade("accounts", versions, cascading, |v| self.accounts_for_version(v))?
        else {
            return Ok(None);
        };

        // versions newer than the one that read the accounts are already ruled out
        let from = versions.iter().position(|v| *v == version).unwrap_or(0);
        let Some((_, transactions)) = self.cascade("transactions", &versions[from..], cascading, |v| {
            self.transactions_for_version(v, expected_postings)
        })?
        else {
            return Ok(None);
        };

        Ok(Some(LedgerSnapshot { accounts, transactions }))
    }

    /// Try `attempt` for each version in order.
    ///
    /// While cascading, a format mismatch moves on to the next version and
    /// running out of versions is [`SyncError::ApiNotSupported`]. Any other
    /// failure ends the pass.
    fn cascade<T>(
        &self,
        what: &str,
        versions: &[ApiVersion],
        cascading: bool,
        mut attempt: impl FnMut(ApiVersion) -> SyncResult<Option<T>>,
    ) -> SyncResult<Option<(ApiVersion, T)>> {
        for &version in versions {
            log::debug!(target: "ledgersync::retrieve", "fetching {} using API {}", what, version);
            match attempt(version) {
                Ok(Some(value)) => {
                    log::debug!(target: "ledgersync::retrieve", "{}: API {} accepted", what, version);
                    return Ok(Some((version, value)));
                }
                Ok(None) => {
                    log::info!(target: "ledgersync::retrieve", "{}: no structured endpoint, using the journal page", what);
                    return Ok(None);
                }
                Err(e) if cascading && e.is_version_mismatch() => {
                    log::debug!(target: "ledgersync::retrieve", "{}: API {} rejected: {}", what, version, e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(SyncError::ApiNotSupported)
    }

    /// Accounts plus the number of postings the server says they carry
    fn accounts_for_version(&self, version: ApiVersion) -> SyncResult<Option<(Vec<Account>, u64)>> {
        self.sink.publish(Progress::indeterminate());
        let response = self.client.get("accounts")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = require_ok(response)?;

        self.token.check()?;
        let body = response.text()?;
        self.token.check()?;

        let mut arena = AccountArena::new();
        let mut reported: HashSet<String> = HashSet::new();
        let mut expected_postings = 0u64;

        for parsed in self.parser.accounts(version, &body)? {
            self.token.check()?;
            let parsed = parsed?;
            if parsed.name.eq_ignore_ascii_case(ROOT_ACCOUNT) {
                continue;
            }
            expected_postings += parsed.posting_count;

            if !reported.insert(parsed.name.clone()) {
                return Err(ParseError::format(version, format!("Account '{}' already present", parsed.name)).into());
            }

            if let Some(idx) = arena.position(&parsed.name) {
                // synthesized for an earlier child; the server's inclusive balance replaces the propagated one
                let account = arena.account_mut(idx);
                account.amounts.clear();
                for (currency, value) in &parsed.amounts {
                    account.add_amount(currency, *value);
                }
                continue;
            }

            let materialized = arena.ensure(&parsed.name);
            let ancestors = &materialized.created[..materialized.created.len().saturating_sub(1)];
            for (currency, value) in &parsed.amounts {
                arena.add_amount(materialized.index, ancestors, currency, *value);
            }
        }
        self.token.check()?;

        log::info!(
            target: "ledgersync::retrieve",
            "got {} accounts using API {}",
            arena.len(),
            version
        );
        Ok(Some((arena.into_accounts(), expected_postings)))
    }

    fn transactions_for_version(
        &self,
        version: ApiVersion,
        expected_postings: u64,
    ) -> SyncResult<Option<Vec<Transaction>>> {
        let mut progress = Progress::indeterminate();
        progress.set_total(i64::try_from(expected_postings).unwrap_or(i64::MAX));

        self.sink.publish(progress.clone());
        let response = self.client.get("transactions")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = require_ok(response)?;

        self.token.check()?;
        let body = response.text()?;
        self.token.check()?;

        let mut transactions = Vec::new();
        let mut processed_postings = 0u64;
        for item in self.parser.transactions(version, &body)? {
            self.token.check()?;
            let transaction = item?;
            self.token.check()?;

            processed_postings += transaction.lines.len() as u64;
            progress.set_current(processed_postings);
            self.sink.publish(progress.clone());
            transactions.push(transaction);
        }
        self.token.check()?;

        log::info!(
            target: "ledgersync::retrieve",
            "got {} transactions using API {}",
            transactions.len(),
            version
        );

        // the server answers in file order
        sort_newest_first(&mut transactions);
        Ok(Some(transactions))
    }

    /// Scrape the combined accounts + journal page
    fn retrieve_legacy(&self) -> SyncResult<LedgerSnapshot> {
        let mut progress = Progress::indeterminate();

        self.sink.publish(progress.clone());
        let response = self.client.get("journal")?;
        let response = require_ok(response)?;

        let mut scraper = JournalScraper::new(self.token.clone());
        let mut processed = 0u64;
        for raw in BufReader::new(response).split(b'\n') {
            let line = decode_line(&raw?);
            self.token.check()?;
            match scraper.feed(&line)? {
                ScrapeEvent::TransactionStarted(id) => {
                    processed += 1;
                    progress.set_current(processed);
                    // ids count down from the newest, so the first one bounds the total
                    progress.raise_total(id);
                    self.sink.publish(progress.clone());
                }
                ScrapeEvent::EndOfJournal => break,
                _ => {}
            }
        }

        let (accounts, transactions) = scraper.finish()?;
        log::info!(
            target: "ledgersync::retrieve",
            "scraped {} accounts and {} transactions from the journal page",
            accounts.len(),
            transactions.len()
        );
        Ok(LedgerSnapshot { accounts, transactions })
    }
}

/// Invalid UTF-8 becomes U+FFFD instead of failing the page
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

// ==================== Tests ====================
