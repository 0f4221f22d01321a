//! Structured API versions and the per-profile API setting

use serde::{Deserialize, Serialize};

/// A machine-readable protocol revision of the ledger server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApiVersion {
    V1_14,
    V1_15,
    V1_19_1,
    V1_23,
    V1_32,
    V1_40,
    V1_50,
}

impl ApiVersion {
    /// Cascade order, newest first
    pub const NEWEST_FIRST: [ApiVersion; 7] = [
        ApiVersion::V1_50,
        ApiVersion::V1_40,
        ApiVersion::V1_32,
        ApiVersion::V1_23,
        ApiVersion::V1_19_1,
        ApiVersion::V1_15,
        ApiVersion::V1_14,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1_14 => "1.14",
            ApiVersion::V1_15 => "1.15",
            ApiVersion::V1_19_1 => "1.19.1",
            ApiVersion::V1_23 => "1.23",
            ApiVersion::V1_32 => "1.32",
            ApiVersion::V1_40 => "1.40",
            ApiVersion::V1_50 => "1.50",
        }
    }

    /// `ptransaction_` is a string from 1.32 on
    pub fn string_transaction_ids(&self) -> bool {
        *self >= ApiVersion::V1_32
    }

    /// Balances live under `adata.pdperiods` from 1.50 on
    pub fn period_balances(&self) -> bool {
        *self >= ApiVersion::V1_50
    }

    /// Newest API version a server reporting `major.minor` understands
    pub fn for_server(major: u32, minor: u32) -> Option<ApiVersion> {
        if major > 1 {
            return Some(ApiVersion::V1_50);
        }
        if major < 1 {
            return None;
        }
        match minor {
            m if m >= 50 => Some(ApiVersion::V1_50),
            m if m >= 40 => Some(ApiVersion::V1_40),
            m if m >= 32 => Some(ApiVersion::V1_32),
            m if m >= 23 => Some(ApiVersion::V1_23),
            m if m >= 19 => Some(ApiVersion::V1_19_1),
            m if m >= 15 => Some(ApiVersion::V1_15),
            m if m >= 14 => Some(ApiVersion::V1_14),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApiVersion {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches(['v', 'V']).replace('_', ".");
        ApiVersion::NEWEST_FIRST
            .iter()
            .copied()
            .find(|v| v.as_str() == normalized)
            .ok_or_else(|| format!("Invalid API version: {}", s))
    }
}

/// Which protocol a profile talks to its server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ApiSetting {
    /// Try every structured version, newest first, then fall back to HTML
    Auto,
    /// Legacy HTML scraping only
    Html,
    /// One specific structured version
    Pinned(ApiVersion),
}

impl Default for ApiSetting {
    fn default() -> Self {
        ApiSetting::Auto
    }
}

impl std::str::FromStr for ApiSetting {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ApiSetting::Auto),
            "html" => Ok(ApiSetting::Html),
            other => other
                .parse::<ApiVersion>()
                .map(ApiSetting::Pinned)
                .map_err(|_| format!("Invalid API setting: {}", s)),
        }
    }
}

impl std::fmt::Display for ApiSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiSetting::Auto => write!(f, "auto"),
            ApiSetting::Html => write!(f, "html"),
            ApiSetting::Pinned(version) => write!(f, "{}", version),
        }
    }
}

impl TryFrom<String> for ApiSetting {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApiSetting> for String {
    fn from(value: ApiSetting) -> Self {
        value.to_string()
    }
}
