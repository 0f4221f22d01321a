//! Submission of new transactions.
//!
//! Structured servers take a JSON body on `PUT add`. Older servers only have
//! the HTML add form, which is emulated with a `POST add`: the first post
//! usually comes back as a re-rendered form carrying a fresh `_token` and
//! session cookie, and the second post with those is accepted with a `303`.

use crate::client::{status_error, LedgerClient, SESSION_COOKIE};
use crate::error::{SyncError, SyncResult};
use ledgersync_parser::{ApiSetting, ApiVersion, CancellationToken, JsonParser, StructuredParserRef, Transaction};
use ledgersync_utils::{format_amount, FormBody};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use reqwest::header::SET_COOKIE;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// Form posts made before giving up on the legacy handshake
pub const MAX_LEGACY_TRIES: u32 = 2;

const FORM_ID: &str = "identify-add";
const REJECTION_LINES: usize = 6;

static RE_SESSION_COOKIE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{}=([^;]+);.*$", SESSION_COOKIE)).unwrap());
static RE_TOKEN_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^<input type="hidden" name="_token" value="([^"]+)">$"#).unwrap());

/// Fake submissions: no network, a pause and a random failure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Simulation {
    /// Probability of failing, 0.0 to 1.0
    pub failure_rate: f64,
    pub delay: Duration,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            failure_rate: 0.3,
            delay: Duration::from_millis(1500),
        }
    }
}

enum Attempt {
    Accepted,
    /// The server does not understand this version's body
    Unsupported(String),
}

/// Sends transactions to one server.
///
/// Keeps the legacy session cookie and form token between posts.
pub struct Submitter {
    client: Arc<LedgerClient>,
    parser: StructuredParserRef,
    setting: ApiSetting,
    simulation: Option<Simulation>,
    token: CancellationToken,
    retry_delay: Duration,
    session: Option<String>,
    form_token: Option<String>,
}

impl Submitter {
    pub fn new(client: Arc<LedgerClient>, setting: ApiSetting) -> Self {
        Self {
            client,
            parser: Arc::new(JsonParser),
            setting,
            simulation: None,
            token: CancellationToken::new(),
            retry_delay: Duration::from_millis(100),
            session: None,
            form_token: None,
        }
    }

    pub fn with_parser(mut self, parser: StructuredParserRef) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_simulation(mut self, simulation: Option<Simulation>) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn form_token(&self) -> Option<&str> {
        self.form_token.as_deref()
    }

    /// Send one transaction
    pub fn submit(&mut self, transaction: &Transaction) -> SyncResult<()> {
        self.token.check()?;

        if let Some(simulation) = self.simulation {
            return simulate(&simulation, transaction);
        }

        match self.setting {
            ApiSetting::Html => self.send_legacy_with_retry(transaction),
            ApiSetting::Pinned(version) => match self.send_structured(version, transaction)? {
                Attempt::Accepted => Ok(()),
                Attempt::Unsupported(message) => Err(SyncError::Submission { message }),
            },
            ApiSetting::Auto => {
                for version in ApiVersion::NEWEST_FIRST {
                    self.token.check()?;
                    log::debug!(target: "ledgersync::submit", "trying API {}", version);
                    match self.send_structured(version, transaction)? {
                        Attempt::Accepted => {
                            log::debug!(target: "ledgersync::submit", "API {} request succeeded", version);
                            return Ok(());
                        }
                        Attempt::Unsupported(message) => {
                            log::debug!(target: "ledgersync::submit", "API {} not supported: {}", version, message);
                        }
                    }
                }
                log::debug!(target: "ledgersync::submit", "trying HTML form emulation");
                self.send_legacy_with_retry(transaction)
            }
        }
    }

    fn send_structured(&self, version: ApiVersion, transaction: &Transaction) -> SyncResult<Attempt> {
        let body = self.parser.save_request(version, transaction)?;
        log::trace!(target: "ledgersync::submit", "request body: {}", body);

        let response = self.client.put_json("add", body)?;
        let status = response.status();
        match status.as_u16() {
            200 | 201 => Ok(Attempt::Accepted),
            400 | 405 => {
                let text = response.text().unwrap_or_default();
                let message = text.lines().take(REJECTION_LINES).collect::<Vec<_>>().join("\n");
                Ok(Attempt::Unsupported(message))
            }
            _ => Err(status_error(status)),
        }
    }

    fn send_legacy_with_retry(&mut self, transaction: &Transaction) -> SyncResult<()> {
        let mut tried = 0;
        while !self.send_legacy(transaction)? {
            tried += 1;
            if tried >= MAX_LEGACY_TRIES {
                log::warn!(target: "ledgersync::submit", "form handshake failed after {} tries", tried);
                return Err(SyncError::RetriesExhausted { tries: tried });
            }
            log::debug!(target: "ledgersync::submit", "retrying with a fresh token");
            std::thread::sleep(self.retry_delay);
            self.token.check()?;
        }
        Ok(())
    }

    /// `true` when the server accepted the form, `false` when it wants a retry
    fn send_legacy(&mut self, transaction: &Transaction) -> SyncResult<bool> {
        let form = self.legacy_form(transaction);
        let response = self.client.post_form("add", &form, self.session.as_deref())?;

        match response.status() {
            StatusCode::SEE_OTHER => Ok(true),
            StatusCode::OK => {
                match response.headers().get(SET_COOKIE).and_then(|v| v.to_str().ok()) {
                    Some(cookie) => match RE_SESSION_COOKIE.captures(cookie) {
                        Some(caps) => {
                            self.session = Some(caps[1].to_string());
                            log::debug!(target: "ledgersync::submit", "new session received");
                        }
                        None => log::warn!(target: "ledgersync::submit", "Set-Cookie is not a {} one", SESSION_COOKIE),
                    },
                    None => log::warn!(target: "ledgersync::submit", "response has no Set-Cookie header"),
                }

                let body = response.text()?;
                let token = body
                    .lines()
                    .find_map(|line| RE_TOKEN_INPUT.captures(line.trim()).map(|caps| caps[1].to_string()));
                match token {
                    Some(token) => {
                        log::debug!(target: "ledgersync::submit", "form token updated");
                        self.form_token = Some(token);
                        Ok(false)
                    }
                    None => Err(SyncError::Submission {
                        message: "Can't find _token string".to_string(),
                    }),
                }
            }
            other => Err(status_error(other)),
        }
    }

    /// Url-encoded body of the add form
    pub fn legacy_form(&self, transaction: &Transaction) -> FormBody {
        let mut form = FormBody::new();
        form.add_pair("_formid", FORM_ID);
        if let Some(token) = &self.form_token {
            form.add_pair("_token", token);
        }
        form.add_pair("date", &transaction.date.format("%Y/%m/%d").to_string())
            .add_pair("description", &transaction.description);
        for line in &transaction.lines {
            let amount = line.amount.map(format_amount).unwrap_or_default();
            form.add_pair("account", &line.account_name).add_pair("amount", &amount);
        }
        form
    }
}

fn simulate(simulation: &Simulation, transaction: &Transaction) -> SyncResult<()> {
    log::debug!(
        target: "ledgersync::submit",
        "simulating submission of '{}' ({} postings)",
        transaction.description,
        transaction.lines.len()
    );
    std::thread::sleep(simulation.delay);
    let rate = if simulation.failure_rate.is_nan() {
        0.0
    } else {
        simulation.failure_rate.clamp(0.0, 1.0)
    };
    if rand::thread_rng().gen_bool(rate) {
        return Err(SyncError::Simulated);
    }
    Ok(())
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgersync_parser::TransactionLine;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn submitter(setting: ApiSetting) -> Submitter {
        let client = LedgerClient::new("http://127.0.0.1:9/", None, Duration::from_secs(1)).unwrap();
        Submitter::new(Arc::new(client), setting)
    }

    fn groceries() -> Transaction {
        let mut tx = Transaction::new(0, NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(), "Groceries & more");
        tx.add_line(TransactionLine::new(
            "expenses:food",
            Some(Decimal::from_str("12.5").unwrap()),
            Some("EUR".to_string()),
        ));
        tx.add_line(TransactionLine::new("assets:cash", None, None));
        tx
    }

    #[test]
    fn test_legacy_form_fields() {
        let form = submitter(ApiSetting::Html).legacy_form(&groceries());
        assert_eq!(form.values("_formid"), vec!["identify-add"]);
        assert!(form.values("_token").is_empty());
        assert_eq!(form.values("date"), vec!["2024/03/07"]);
        assert_eq!(form.values("account"), vec!["expenses:food", "assets:cash"]);
        assert_eq!(form.values("amount"), vec!["12.50", ""]);
        assert!(form.encode().contains("description=Groceries%20%26%20more"));
    }

    #[test]
    fn test_legacy_form_carries_token() {
        let mut submitter = submitter(ApiSetting::Html);
        submitter.form_token = Some("abc".to_string());
        let form = submitter.legacy_form(&groceries());
        assert_eq!(form.values("_token"), vec!["abc"]);
    }

    #[test]
    fn test_simulation_outcomes() {
        let never = Simulation {
            failure_rate: 0.0,
            delay: Duration::ZERO,
        };
        let always = Simulation {
            failure_rate: 1.0,
            ..never
        };

        let mut ok = submitter(ApiSetting::Auto).with_simulation(Some(never));
        assert!(ok.submit(&groceries()).is_ok());

        let mut failing = submitter(ApiSetting::Auto).with_simulation(Some(always));
        let err = failing.submit(&groceries()).unwrap_err();
        assert_eq!(err.to_string(), "Simulated test exception");
    }

    #[test]
    fn test_token_pattern() {
        let line = r#"  <input type="hidden" name="_token" value="k3y">  "#;
        let caps = RE_TOKEN_INPUT.captures(line.trim()).unwrap();
        assert_eq!(&caps[1], "k3y");
        assert!(RE_SESSION_COOKIE.captures("_SESSION=xyz; Path=/; HttpOnly").is_some());
        assert!(RE_SESSION_COOKIE.captures("other=xyz; Path=/").is_none());
    }
}
