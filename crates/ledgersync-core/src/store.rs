//! Persistence of retrieved data.
//!
//! The retriever never writes anything itself. After a successful pass the
//! snapshot is handed to [`spawn_saver`], which carries the per-account UI
//! flags of already stored accounts over to the new list and writes
//! everything through a [`LedgerStore`].

use crate::error::{SyncError, SyncResult};
use crate::retrieve::LedgerSnapshot;
use chrono::{DateTime, Utc};
use ledgersync_parser::{Account, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Presentation flags kept across retrievals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUiState {
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub amounts_expanded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub account: Account,
    #[serde(default)]
    pub ui: AccountUiState,
}

/// Everything stored for one profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredLedger {
    pub accounts: Vec<StoredAccount>,
    pub transactions: Vec<Transaction>,
    pub last_sync: Option<DateTime<Utc>>,
}

impl StoredLedger {
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            accounts: self.accounts.iter().map(|a| a.account.clone()).collect(),
            transactions: self.transactions.clone(),
        }
    }
}

/// Storage for accounts and transactions, one namespace per profile
pub trait LedgerStore: Send + Sync {
    /// UI flags of the stored accounts, by account name
    fn account_states(&self, profile: &str) -> SyncResult<HashMap<String, AccountUiState>>;

    /// Replace the stored account list
    fn store_accounts(&self, profile: &str, accounts: Vec<StoredAccount>) -> SyncResult<()>;

    /// Replace the stored transaction list
    fn store_transactions(&self, profile: &str, transactions: Vec<Transaction>) -> SyncResult<()>;

    fn record_last_sync(&self, profile: &str, at: DateTime<Utc>) -> SyncResult<()>;

    /// Everything stored for `profile`; empty when nothing was stored yet
    fn load(&self, profile: &str) -> SyncResult<StoredLedger>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;

/// Write a snapshot, keeping the UI flags of accounts that already exist
pub fn save_snapshot(store: &dyn LedgerStore, profile: &str, snapshot: LedgerSnapshot) -> SyncResult<()> {
    log::debug!(target: "ledgersync::store", "preparing account list");
    let states = store.account_states(profile)?;
    let accounts: Vec<StoredAccount> = snapshot
        .accounts
        .into_iter()
        .map(|account| {
            let ui = states.get(&account.name).copied().unwrap_or_default();
            StoredAccount { account, ui }
        })
        .collect();

    let account_count = accounts.len();
    store.store_accounts(profile, accounts)?;
    log::debug!(target: "ledgersync::store", "{} accounts stored", account_count);

    let transaction_count = snapshot.transactions.len();
    store.store_transactions(profile, snapshot.transactions)?;
    log::debug!(target: "ledgersync::store", "{} transactions stored", transaction_count);

    store.record_last_sync(profile, Utc::now())
}

/// Save a snapshot on a separate thread
pub fn spawn_saver(
    store: LedgerStoreRef,
    profile: String,
    snapshot: LedgerSnapshot,
) -> SyncResult<JoinHandle<SyncResult<()>>> {
    let handle = std::thread::Builder::new()
        .name("ledgersync-saver".to_string())
        .spawn(move || {
            let result = save_snapshot(store.as_ref(), &profile, snapshot);
            if let Err(e) = &result {
                log::warn!(target: "ledgersync::store", "[{}] saving profile '{}' failed: {}", e.code(), profile, e);
            }
            result
        })
        .map_err(storage_error)?;
    Ok(handle)
}

fn storage_error(error: impl std::fmt::Display) -> SyncError {
    SyncError::Storage {
        message: error.to_string(),
    }
}

// ==================== In-memory store ====================

#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: Mutex<HashMap<String, StoredLedger>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the UI flags of a stored account
    pub fn set_account_state(&self, profile: &str, name: &str, state: AccountUiState) -> SyncResult<bool> {
        self.with_profile(profile, |ledger| {
            match ledger.accounts.iter_mut().find(|a| a.account.name == name) {
                Some(stored) => {
                    stored.ui = state;
                    true
                }
                None => false,
            }
        })
    }

    fn with_profile<T>(&self, profile: &str, f: impl FnOnce(&mut StoredLedger) -> T) -> SyncResult<T> {
        let mut profiles = self
            .profiles
            .lock()
            .map_err(|_| storage_error("store lock poisoned"))?;
        Ok(f(profiles.entry(profile.to_string()).or_default()))
    }
}

impl LedgerStore for MemoryStore {
    fn account_states(&self, profile: &str) -> SyncResult<HashMap<String, AccountUiState>> {
        self.with_profile(profile, |ledger| {
            ledger
                .accounts
                .iter()
                .map(|a| (a.account.name.clone(), a.ui))
                .collect()
        })
    }

    fn store_accounts(&self, profile: &str, accounts: Vec<StoredAccount>) -> SyncResult<()> {
        self.with_profile(profile, |ledger| ledger.accounts = accounts)
    }

    fn store_transactions(&self, profile: &str, transactions: Vec<Transaction>) -> SyncResult<()> {
        self.with_profile(profile, |ledger| ledger.transactions = transactions)
    }

    fn record_last_sync(&self, profile: &str, at: DateTime<Utc>) -> SyncResult<()> {
        self.with_profile(profile, |ledger| ledger.last_sync = Some(at))
    }

    fn load(&self, profile: &str) -> SyncResult<StoredLedger> {
        self.with_profile(profile, |ledger| ledger.clone())
    }
}

// ==================== JSON file store ====================

const ACCOUNTS_FILE: &str = "accounts.json";
const TRANSACTIONS_FILE: &str = "transactions.json";
const STATE_FILE: &str = "state.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileState {
    last_sync: Option<DateTime<Utc>>,
}

/// One directory per profile holding `accounts.json`, `transactions.json`
/// and `state.json`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn profile_dir(&self, profile: &str) -> PathBuf {
        self.root.join(profile)
    }

    fn read<T: DeserializeOwned + Default>(&self, profile: &str, file: &str) -> SyncResult<T> {
        let path = self.profile_dir(profile).join(file);
        if !path.exists() {
            return Ok(T::default());
        }
        let content = std::fs::read_to_string(&path).map_err(storage_error)?;
        serde_json::from_str(&content).map_err(|e| storage_error(format!("{}: {}", path.display(), e)))
    }

    fn write<T: Serialize>(&self, profile: &str, file: &str, value: &T) -> SyncResult<()> {
        let dir = self.profile_dir(profile);
        std::fs::create_dir_all(&dir).map_err(storage_error)?;
        let content = serde_json::to_string_pretty(value).map_err(storage_error)?;
        write_replacing(&dir.join(file), &content)
    }
}

/// Write through a temporary file so readers never see half a file
fn write_replacing(path: &Path, content: &str) -> SyncResult<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).map_err(storage_error)?;
    std::fs::rename(&tmp, path).map_err(storage_error)?;
    log::trace!(target: "ledgersync::store", "wrote {}", path.display());
    Ok(())
}

impl LedgerStore for JsonFileStore {
    fn account_states(&self, profile: &str) -> SyncResult<HashMap<String, AccountUiState>> {
        let accounts: Vec<StoredAccount> = self.read(profile, ACCOUNTS_FILE)?;
        Ok(accounts.into_iter().map(|a| (a.account.name, a.ui)).collect())
    }

    fn store_accounts(&self, profile: &str, accounts: Vec<StoredAccount>) -> SyncResult<()> {
        self.write(profile, ACCOUNTS_FILE, &accounts)
    }

    fn store_transactions(&self, profile: &str, transactions: Vec<Transaction>) -> SyncResult<()> {
        self.write(profile, TRANSACTIONS_FILE, &transactions)
    }

    fn record_last_sync(&self, profile: &str, at: DateTime<Utc>) -> SyncResult<()> {
        self.write(profile, STATE_FILE, &ProfileState { last_sync: Some(at) })
    }

    fn load(&self, profile: &str) -> SyncResult<StoredLedger> {
        let state: ProfileState = self.read(profile, STATE_FILE)?;
        Ok(StoredLedger {
            accounts: self.read(profile, ACCOUNTS_FILE)?,
            transactions: self.read(profile, TRANSACTIONS_FILE)?,
            last_sync: state.last_sync,
        })
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn snapshot() -> LedgerSnapshot {
        let mut checking = Account::new("assets:checking");
        checking.add_amount("EUR", Decimal::new(1250, 2));
        LedgerSnapshot {
            accounts: vec![Account::new("assets"), checking],
            transactions: vec![Transaction::new(
                7,
                NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                "Rent",
            )],
        }
    }

    #[test]
    fn test_saver_keeps_ui_flags() {
        let store = Arc::new(MemoryStore::new());
        save_snapshot(store.as_ref(), "home", snapshot()).unwrap();
        let flags = AccountUiState {
            expanded: true,
            amounts_expanded: true,
        };
        assert!(store.set_account_state("home", "assets", flags).unwrap());

        let handle = spawn_saver(store.clone(), "home".to_string(), snapshot()).unwrap();
        handle.join().unwrap().unwrap();

        let states = store.account_states("home").unwrap();
        assert_eq!(states["assets"], flags);
        assert_eq!(states["assets:checking"], AccountUiState::default());
        assert!(store.load("home").unwrap().last_sync.is_some());
    }

    #[test]
    fn test_profiles_are_separate() {
        let store = MemoryStore::new();
        save_snapshot(&store, "home", snapshot()).unwrap();
        assert!(store.load("work").unwrap().accounts.is_empty());
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert_eq!(store.load("home").unwrap(), StoredLedger::default());

        save_snapshot(&store, "home", snapshot()).unwrap();
        assert!(store.profile_dir("home").join("accounts.json").exists());

        let loaded = store.load("home").unwrap();
        assert_eq!(loaded.snapshot(), snapshot());
        assert!(loaded.last_sync.is_some());
    }

    #[test]
    fn test_json_store_reports_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        std::fs::create_dir_all(store.profile_dir("home")).unwrap();
        std::fs::write(store.profile_dir("home").join("accounts.json"), "{").unwrap();

        let err = store.load("home").unwrap_err();
        assert!(matches!(err, SyncError::Storage { .. }));
    }
}
