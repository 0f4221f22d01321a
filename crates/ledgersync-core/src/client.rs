//! Blocking HTTP client for the ledger server.
//!
//! Every path is resolved against the configured base URL. Redirects are
//! never followed: the legacy form handshake has to observe the `303`.

use crate::error::{SyncError, SyncResult};
use ledgersync_config::{AuthConfig, ServerConfig};
use ledgersync_utils::FormBody;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::{StatusCode, Url};
use std::time::Duration;

/// Name of the session cookie used by the legacy add form
pub const SESSION_COOKIE: &str = "_SESSION";

#[derive(Debug, Clone)]
pub struct LedgerClient {
    http: Client,
    base: Url,
    auth: Option<AuthConfig>,
}

impl LedgerClient {
    pub fn new(base_url: &str, auth: Option<AuthConfig>, timeout: Duration) -> SyncResult<Self> {
        let base = parse_base_url(base_url)?;
        let http = Client::builder()
            .user_agent(concat!("ledgersync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { http, base, auth })
    }

    pub fn from_config(server: &ServerConfig) -> SyncResult<Self> {
        Self::new(
            &server.url,
            server.auth.clone(),
            Duration::from_secs(server.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Resolve `path` against the base URL
    pub fn url(&self, path: &str) -> SyncResult<Url> {
        self.base.join(path).map_err(|_| SyncError::InvalidUrl {
            url: format!("{}{}", self.base, path),
        })
    }

    /// `GET path`, whatever the status
    pub fn get(&self, path: &str) -> SyncResult<Response> {
        let url = self.url(path)?;
        log::debug!(target: "ledgersync::http", "GET {}", url);
        let response = self.with_auth(self.http.get(url)).send()?;
        log::debug!(target: "ledgersync::http", "← {}", response.status());
        Ok(response)
    }

    /// `PUT path` with a JSON body, whatever the status
    pub fn put_json(&self, path: &str, body: String) -> SyncResult<Response> {
        let url = self.url(path)?;
        log::debug!(target: "ledgersync::http", "PUT {} ({} bytes)", url, body.len());
        let response = self
            .with_auth(self.http.put(url))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()?;
        log::debug!(target: "ledgersync::http", "← {}", response.status());
        Ok(response)
    }

    /// `POST path` with a url-encoded form, carrying the session cookie when known
    pub fn post_form(&self, path: &str, form: &FormBody, session: Option<&str>) -> SyncResult<Response> {
        let url = self.url(path)?;
        log::debug!(target: "ledgersync::http", "POST {} ({} fields)", url, form.len());
        let mut request = self
            .with_auth(self.http.post(url))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form.encode());
        if let Some(session) = session {
            request = request.header(COOKIE, format!("{}={}", SESSION_COOKIE, session));
        }
        let response = request.send()?;
        log::debug!(target: "ledgersync::http", "← {}", response.status());
        Ok(response)
    }

    fn with_auth(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.auth {
            Some(auth) => request.basic_auth(&auth.username, Some(&auth.password)),
            None => request,
        }
    }
}

/// Pass a `200 OK` response through, turn anything else into [`SyncError::Http`]
pub fn require_ok(response: Response) -> SyncResult<Response> {
    if response.status() == StatusCode::OK {
        Ok(response)
    } else {
        Err(status_error(response.status()))
    }
}

pub fn status_error(status: StatusCode) -> SyncError {
    SyncError::Http {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("").to_string(),
    }
}

/// Parse the server base URL, making sure relative paths land below it
fn parse_base_url(raw: &str) -> SyncResult<Url> {
    let trimmed = raw.trim();
    let invalid = || SyncError::InvalidUrl { url: raw.to_string() };

    let mut url = Url::parse(trimmed).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> SyncResult<LedgerClient> {
        LedgerClient::new(url, None, Duration::from_secs(5))
    }

    #[test]
    fn test_paths_resolve_below_base() {
        let nested = client("http://ledger.local/hledger").unwrap();
        assert_eq!(nested.url("journal").unwrap().as_str(), "http://ledger.local/hledger/journal");

        let top = client("http://ledger.local/").unwrap();
        assert_eq!(top.url("accounts").unwrap().as_str(), "http://ledger.local/accounts");
    }

    #[test]
    fn test_invalid_urls() {
        for url in ["", "not a url", "ftp://ledger.local/", "http://"] {
            let err = client(url).unwrap_err();
            assert!(matches!(err, SyncError::InvalidUrl { .. }), "{}", url);
            assert!(err.to_string().starts_with("Invalid server URL"));
        }
    }

    #[test]
    fn test_status_error_message() {
        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "HTTP error 500: Internal Server Error");
    }
}
