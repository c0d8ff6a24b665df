// Append-only transaction ledger.
//
// The ledger is the sole source of truth: balances and positions are never
// stored, they are reconstructed by scanning this log (see `reconstruct`).
// Rows are immutable once appended; corrections happen through compensating
// rows, so the full history always replays to the current state.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod reconstruct;

pub use reconstruct::{MarketShares, SharePosition};

/// Which side of a binary market a row touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShareType {
    Yes,
    No,
}

impl ShareType {
    /// Parse from the API wire form ("Yes"/"No", case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "yes" => Some(ShareType::Yes),
            "no" => Some(ShareType::No),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShareType::Yes => "Yes",
            ShareType::No => "No",
        }
    }
}

impl fmt::Display for ShareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of ledger row kinds. The serde strings are the wire format
/// of the transaction log and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxType {
    #[serde(rename = "user trade")]
    UserTrade,
    #[serde(rename = "resolved yes")]
    ResolvedYes,
    #[serde(rename = "resolved no")]
    ResolvedNo,
    #[serde(rename = "unresolve")]
    Unresolve,
}

impl TxType {
    /// Settlement rows are the ones written by market resolution and are
    /// the targets of an unresolve reversal.
    pub fn is_settlement(&self) -> bool {
        matches!(self, TxType::ResolvedYes | TxType::ResolvedNo)
    }
}

/// One immutable ledger row.
///
/// `quantity` is signed: positive acquires shares, negative relinquishes
/// them. `total_cost` is signed the other way around: positive cash leaves
/// the balance, negative cash enters it (a payout). `prev_balance` and
/// `new_balance` denormalize the per-user balance chain for audit and fast
/// lookup; `new_balance == prev_balance - total_cost` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
    pub market_id: i64,
    pub user_email: String,
    pub share_type: ShareType,
    pub quantity: f64,
    pub total_cost: f64,
    pub prev_balance: f64,
    pub new_balance: f64,
    #[serde(rename = "transactionType")]
    pub tx_type: TxType,
}

/// A row waiting to be appended. Ids, timestamps and the balance chain are
/// filled in by [`Ledger::append`].
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub user_id: i64,
    pub market_id: i64,
    pub user_email: String,
    pub share_type: ShareType,
    pub quantity: f64,
    pub total_cost: f64,
    pub tx_type: TxType,
}

#[derive(Debug)]
pub enum LedgerError {
    Io(String),
    Encode(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Io(msg) => write!(f, "Ledger I/O error: {}", msg),
            LedgerError::Encode(msg) => write!(f, "Ledger encoding error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

/// The append-only transaction log, persisted one JSON row per line.
#[derive(Debug)]
pub struct Ledger {
    entries: Vec<Transaction>,
    file: Option<PathBuf>,
    initial_balance: f64,
}

impl Ledger {
    /// Open (or create) a JSONL-backed ledger. Unparsable lines are skipped
    /// with a warning so one corrupt row cannot brick the whole exchange.
    pub fn open(path: &Path, initial_balance: f64) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| LedgerError::Io(e.to_string()))?;
            }
        }

        let mut entries = Vec::new();
        if path.exists() {
            let text = fs::read_to_string(path).map_err(|e| LedgerError::Io(e.to_string()))?;
            for (line_no, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Transaction>(line) {
                    Ok(tx) => entries.push(tx),
                    Err(e) => warn!(line = line_no + 1, error = %e, "skipping corrupt ledger row"),
                }
            }
        } else {
            fs::File::create(path).map_err(|e| LedgerError::Io(e.to_string()))?;
        }

        info!(rows = entries.len(), path = %path.display(), "ledger opened");

        Ok(Self {
            entries,
            file: Some(path.to_path_buf()),
            initial_balance,
        })
    }

    /// A ledger with no backing file. Used by tests and embedded callers.
    pub fn in_memory(initial_balance: f64) -> Self {
        Self {
            entries: Vec::new(),
            file: None,
            initial_balance,
        }
    }

    pub fn entries(&self) -> &[Transaction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Default balance for users with no ledger history.
    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Next row id: last id + 1, falling back to the row count when the
    /// tail id is unusable (e.g. a hand-edited file).
    pub fn next_id(&self) -> i64 {
        match self.entries.last() {
            Some(tx) if tx.id >= 0 => tx.id + 1,
            _ => self.entries.len() as i64,
        }
    }

    /// Append a batch of drafts as one atomic write.
    ///
    /// Drafts are processed strictly in order. Each user's balance chain is
    /// seeded from their current reconstructed balance and threaded through
    /// the batch, so a user appearing multiple times chains correctly. All
    /// rows hit the backing file in a single write; on I/O failure nothing
    /// is committed, in memory or on disk.
    pub fn append(&mut self, drafts: &[TransactionDraft]) -> Result<Vec<Transaction>, LedgerError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let users: Vec<i64> = drafts
            .iter()
            .map(|d| d.user_id)
            .collect::<BTreeSet<i64>>()
            .into_iter()
            .collect();
        let mut running: HashMap<i64, f64> = self.current_balances(&users);

        let now = Utc::now();
        let mut id = self.next_id();
        let mut rows = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let prev = *running.get(&draft.user_id).unwrap_or(&self.initial_balance);
            let new = prev - draft.total_cost;
            rows.push(Transaction {
                id,
                timestamp: now,
                user_id: draft.user_id,
                market_id: draft.market_id,
                user_email: draft.user_email.clone(),
                share_type: draft.share_type,
                quantity: draft.quantity,
                total_cost: draft.total_cost,
                prev_balance: prev,
                new_balance: new,
                tx_type: draft.tx_type,
            });
            running.insert(draft.user_id, new);
            id += 1;
        }

        self.persist(&rows)?;
        self.entries.extend(rows.iter().cloned());
        Ok(rows)
    }

    /// Write all rows with one `write_all`. Batch semantics: either every
    /// row of a logical operation becomes visible or none do.
    fn persist(&self, rows: &[Transaction]) -> Result<(), LedgerError> {
        let path = match &self.file {
            Some(p) => p,
            None => return Ok(()),
        };

        let mut buf = String::new();
        for row in rows {
            let line =
                serde_json::to_string(row).map_err(|e| LedgerError::Encode(e.to_string()))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| LedgerError::Io(e.to_string()))?;
        file.write_all(buf.as_bytes())
            .map_err(|e| LedgerError::Io(e.to_string()))?;
        file.flush().map_err(|e| LedgerError::Io(e.to_string()))?;
        Ok(())
    }
}
