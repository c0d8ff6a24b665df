// Application state.
//
// One mutex serializes every reconstruct-then-append sequence, which is
// all the concurrency control the engine needs: batch appends are atomic,
// so no half-applied trade or resolution is ever observable.

use std::fs;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::directory::UserDirectory;
use crate::ledger::{Ledger, LedgerError};
use crate::market::MarketBook;
use crate::notify::Notifier;

pub type SharedState = Arc<Mutex<AppState>>;

pub struct AppState {
    pub config: EngineConfig,
    pub ledger: Ledger,
    pub markets: MarketBook,
    pub directory: UserDirectory,
}

/// Market metadata and user directory snapshot. The ledger itself is not
/// part of this: the JSONL log is already durable on its own.
#[derive(Serialize, Deserialize)]
struct StateSnapshot {
    markets: MarketBook,
    directory: UserDirectory,
}

impl AppState {
    /// Open the ledger file and load the metadata snapshot if one exists.
    pub fn new(config: EngineConfig) -> Result<Self, LedgerError> {
        let ledger = Ledger::open(&config.ledger_path, config.initial_balance)?;
        let mut state = Self {
            config,
            ledger,
            markets: MarketBook::new(),
            directory: UserDirectory::new(),
        };

        match state.load_from_disk() {
            Ok(()) => info!(
                markets = state.markets.len(),
                users = state.directory.len(),
                "state snapshot loaded"
            ),
            Err(e) => info!("no state snapshot loaded ({}), starting fresh", e),
        }

        Ok(state)
    }

    /// Fully in-memory state for tests and embedded use.
    pub fn in_memory(config: EngineConfig) -> Self {
        let ledger = Ledger::in_memory(config.initial_balance);
        Self {
            config,
            ledger,
            markets: MarketBook::new(),
            directory: UserDirectory::new(),
        }
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    pub fn notifier(&self) -> Notifier {
        Notifier::new(self.config.webhook_url.clone())
    }

    pub fn save_to_disk(&self) -> Result<(), String> {
        if self.config.state_path.as_os_str().is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.config.state_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
        }

        let snapshot = StateSnapshot {
            markets: self.markets.clone(),
            directory: self.directory.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| format!("Failed to serialize state: {}", e))?;
        fs::write(&self.config.state_path, json)
            .map_err(|e| format!("Failed to write state file: {}", e))?;
        Ok(())
    }

    /// Persist the snapshot, logging instead of failing: the ledger is the
    /// source of truth, a missed snapshot only loses metadata edits.
    pub fn save_to_disk_best_effort(&self) {
        if let Err(e) = self.save_to_disk() {
            warn!(error = %e, "state snapshot save failed");
        }
    }

    fn load_from_disk(&mut self) -> Result<(), String> {
        if self.config.state_path.as_os_str().is_empty() {
            return Err("no state path configured".to_string());
        }
        let json = fs::read_to_string(&self.config.state_path)
            .map_err(|_| "no state file found".to_string())?;
        let snapshot: StateSnapshot = serde_json::from_str(&json)
            .map_err(|e| format!("failed to deserialize state: {}", e))?;

        self.markets = snapshot.markets;
        self.directory = snapshot.directory;
        Ok(())
    }
}
