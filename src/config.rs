// Engine configuration.
//
// Everything the engine used to reach for as a global constant (initial
// balance, API token, file locations) is read once at startup and passed
// in explicitly.

use std::path::PathBuf;

use tracing::info;

/// Balance granted to a user with no ledger history.
pub const DEFAULT_INITIAL_BALANCE: f64 = 10_000.0;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Starting balance for users with no transactions.
    pub initial_balance: f64,
    /// Bearer token required on mutating API routes. Empty disables the
    /// check (local development).
    pub api_token: String,
    /// JSONL transaction log, the source of truth.
    pub ledger_path: PathBuf,
    /// Snapshot file for market metadata and the user directory.
    pub state_path: PathBuf,
    /// Listen address for the HTTP server.
    pub bind_addr: String,
    /// Optional webhook for trade/resolution announcements.
    pub webhook_url: Option<String>,
}

impl EngineConfig {
    /// Read configuration from the environment (a `.env` file is honored).
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let initial_balance = std::env::var("INITIAL_BALANCE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(DEFAULT_INITIAL_BALANCE);

        let config = Self {
            initial_balance,
            api_token: std::env::var("API_TOKEN").unwrap_or_default(),
            ledger_path: std::env::var("LEDGER_PATH")
                .unwrap_or_else(|_| "data/ledger.jsonl".to_string())
                .into(),
            state_path: std::env::var("STATE_PATH")
                .unwrap_or_else(|_| "data/state.json".to_string())
                .into(),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:4150".to_string()),
            webhook_url: std::env::var("WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
        };

        info!(
            ledger = %config.ledger_path.display(),
            bind = %config.bind_addr,
            auth = !config.api_token.is_empty(),
            webhook = config.webhook_url.is_some(),
            "configuration loaded"
        );
        config
    }

    /// Configuration for in-process tests: no files, no auth, no webhook.
    pub fn for_tests() -> Self {
        Self {
            initial_balance: DEFAULT_INITIAL_BALANCE,
            api_token: String::new(),
            ledger_path: PathBuf::new(),
            state_path: PathBuf::new(),
            bind_addr: "127.0.0.1:0".to_string(),
            webhook_url: None,
        }
    }
}
