//! Synchronization engine for ledger servers
//!
//! Retrieval passes, transaction submission, persistence hand-off and the
//! display helpers built on top of retrieved data.

pub mod accumulate;
pub mod client;
pub mod error;
pub mod locate;
pub mod progress;
pub mod retrieve;
pub mod store;
pub mod submit;
pub mod task;
pub mod version;

pub use accumulate::{DisplayItem, TransactionAccumulator, TransactionItem};
pub use client::LedgerClient;
pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, SyncError, SyncResult};
pub use locate::{compare_items, locate, search};
pub use progress::{progress_channel, NullSink, Progress, ProgressSink, ProgressState, RecordingSink};
pub use retrieve::{LedgerSnapshot, Retriever, SyncOutcome};
pub use store::{
    save_snapshot, spawn_saver, AccountUiState, JsonFileStore, LedgerStore, LedgerStoreRef, MemoryStore,
    StoredAccount, StoredLedger,
};
pub use submit::{Simulation, Submitter, MAX_LEGACY_TRIES};
pub use task::{spawn_task, TaskHandle};
pub use version::ServerVersion;

use ledgersync_config::Config;
use ledgersync_parser::{ApiSetting, CancellationToken, JsonParser, StructuredParserRef, Transaction};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Entry point tying a server, a store and a profile together
pub struct SyncEngine {
    client: Arc<LedgerClient>,
    parser: StructuredParserRef,
    setting: ApiSetting,
    simulation: Option<Simulation>,
    store: LedgerStoreRef,
    profile: String,
    pending_saves: Arc<Mutex<Vec<JoinHandle<SyncResult<()>>>>>,
}

impl SyncEngine {
    pub fn new(client: LedgerClient, setting: ApiSetting, store: LedgerStoreRef, profile: impl Into<String>) -> Self {
        Self {
            client: Arc::new(client),
            parser: Arc::new(JsonParser),
            setting,
            simulation: None,
            store,
            profile: profile.into(),
            pending_saves: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Engine for the configured server, storing into the configured data directory
    pub fn from_config(config: &Config) -> SyncResult<Self> {
        let client = LedgerClient::from_config(&config.server)?;
        let store = Arc::new(JsonFileStore::new(&config.sync.data_dir));
        let simulation = config.sync.simulate.then(|| Simulation {
            failure_rate: config.sync.simulate_failure_rate,
            delay: Duration::from_millis(config.sync.simulate_delay_ms),
        });
        Ok(Self::new(client, config.server.api_version, store, &config.sync.profile).with_simulation(simulation))
    }

    pub fn with_parser(mut self, parser: StructuredParserRef) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_simulation(mut self, simulation: Option<Simulation>) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn client(&self) -> &LedgerClient {
        &self.client
    }

    pub fn store(&self) -> &LedgerStoreRef {
        &self.store
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn retriever(&self, token: CancellationToken, sink: Arc<dyn ProgressSink>) -> Retriever {
        Retriever::new(self.client.clone(), self.setting)
            .with_parser(self.parser.clone())
            .with_token(token)
            .with_sink(sink)
    }

    pub fn submitter(&self, token: CancellationToken) -> Submitter {
        Submitter::new(self.client.clone(), self.setting)
            .with_parser(self.parser.clone())
            .with_simulation(self.simulation)
            .with_token(token)
    }

    /// Start a retrieval pass in the background.
    ///
    /// A completed pass is handed to the saver before `on_complete` runs;
    /// [`SyncEngine::wait_for_saves`] waits for the writes.
    pub fn start_sync<C>(&self, sink: Arc<dyn ProgressSink>, on_complete: C) -> SyncResult<TaskHandle<SyncOutcome>>
    where
        C: FnOnce(&SyncOutcome) + Send + 'static,
    {
        let token = CancellationToken::new();
        let retriever = self.retriever(token.clone(), sink);
        let store = self.store.clone();
        let profile = self.profile.clone();
        let pending_saves = self.pending_saves.clone();

        spawn_task(
            "sync",
            token,
            move |_| {
                let outcome = retriever.run();
                if let SyncOutcome::Completed(snapshot) = &outcome {
                    match spawn_saver(store, profile, snapshot.clone()) {
                        Ok(handle) => {
                            if let Ok(mut pending) = pending_saves.lock() {
                                pending.push(handle);
                            }
                        }
                        Err(e) => log::warn!(target: "ledgersync::engine", "cannot start saver: {}", e),
                    }
                }
                outcome
            },
            on_complete,
        )
    }

    /// Submit one transaction in the background
    pub fn start_submit<C>(&self, transaction: Transaction, on_complete: C) -> SyncResult<TaskHandle<SyncResult<()>>>
    where
        C: FnOnce(&SyncResult<()>) + Send + 'static,
    {
        let token = CancellationToken::new();
        let mut submitter = self.submitter(token.clone());
        spawn_task(
            "submit",
            token,
            move |_| {
                let result = submitter.submit(&transaction);
                if let Err(e) = &result {
                    log::warn!(target: "ledgersync::engine", "[{}] sending transaction failed: {}", e.code(), e);
                }
                result
            },
            on_complete,
        )
    }

    /// Ask the server for its version
    pub fn probe_version(&self) -> SyncResult<Option<ServerVersion>> {
        version::probe(&self.client)
    }

    /// Block until every saver started so far has finished
    pub fn wait_for_saves(&self) -> SyncResult<()> {
        let handles: Vec<_> = match self.pending_saves.lock() {
            Ok(mut pending) => pending.drain(..).collect(),
            Err(_) => {
                return Err(SyncError::Internal {
                    message: "saver list lock poisoned".to_string(),
                })
            }
        };
        for handle in handles {
            handle.join().map_err(|_| SyncError::Internal {
                message: "saver panicked".to_string(),
            })??;
        }
        Ok(())
    }
}
