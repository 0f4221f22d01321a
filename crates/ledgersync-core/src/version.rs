//! Server version probe (`GET version`)

use crate::client::{require_ok, LedgerClient};
use crate::error::SyncResult;
use ledgersync_parser::ApiVersion;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;

static RE_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"?(\d+)\.(\d+)(?:\.(\d+))?"?$"#).unwrap());

/// Version reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerVersion {
    /// The server has no `version` endpoint, which appeared in 1.20
    Pre1_20,
    Known { major: u32, minor: u32, patch: Option<u32> },
}

impl ServerVersion {
    /// Parse `"1.23.1"`, `"1.23"` or the same without quotes
    pub fn parse(text: &str) -> Option<Self> {
        let caps = RE_VERSION.captures(text.trim())?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        let patch = match caps.get(3) {
            Some(p) => Some(p.as_str().parse().ok()?),
            None => None,
        };
        Some(ServerVersion::Known { major, minor, patch })
    }

    /// Newest structured API the server understands
    pub fn suggested_api(&self) -> Option<ApiVersion> {
        match self {
            // 1.14 through 1.19 lack the endpoint; 1.14 is the safe floor
            ServerVersion::Pre1_20 => Some(ApiVersion::V1_14),
            ServerVersion::Known { major, minor, .. } => ApiVersion::for_server(*major, *minor),
        }
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerVersion::Pre1_20 => write!(f, "(before 1.20)"),
            ServerVersion::Known { major, minor, patch: Some(patch) } => {
                write!(f, "{}.{}.{}", major, minor, patch)
            }
            ServerVersion::Known { major, minor, patch: None } => write!(f, "{}.{}", major, minor),
        }
    }
}

/// Ask the server for its version
pub fn probe(client: &LedgerClient) -> SyncResult<Option<ServerVersion>> {
    let response = client.get("version")?;
    if response.status() == StatusCode::NOT_FOUND {
        log::info!(target: "ledgersync::version", "no version endpoint, assuming a server before 1.20");
        return Ok(Some(ServerVersion::Pre1_20));
    }
    let body = require_ok(response)?.text()?;
    let version = ServerVersion::parse(&body);
    match &version {
        Some(v) => log::info!(target: "ledgersync::version", "server version {}", v),
        None => log::warn!(target: "ledgersync::version", "unrecognised version string {:?}", body.trim()),
    }
    Ok(version)
}

// ==================== Tests ====================
