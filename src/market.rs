// Market metadata.
//
// Markets carry the question, the LMSR liquidity parameter and the
// lifecycle status. Outstanding share counts are never stored here: the
// pricing engine reads them from the ledger (`Ledger::market_shares`).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{ShareType, TxType};

/// Market lifecycle status. The serde strings are the status wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Open,
    Closed,
    #[serde(rename = "Resolved Yes")]
    ResolvedYes,
    #[serde(rename = "Resolved No")]
    ResolvedNo,
}

impl MarketStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(MarketStatus::Open),
            "closed" => Some(MarketStatus::Closed),
            "resolved yes" => Some(MarketStatus::ResolvedYes),
            "resolved no" => Some(MarketStatus::ResolvedNo),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, MarketStatus::ResolvedYes | MarketStatus::ResolvedNo)
    }

    /// The outcome this status settles to, if it is a resolved status.
    pub fn resolution(&self) -> Option<Resolution> {
        match self {
            MarketStatus::ResolvedYes => Some(Resolution::Yes),
            MarketStatus::ResolvedNo => Some(Resolution::No),
            _ => None,
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketStatus::Open => "Open",
            MarketStatus::Closed => "Closed",
            MarketStatus::ResolvedYes => "Resolved Yes",
            MarketStatus::ResolvedNo => "Resolved No",
        };
        f.write_str(s)
    }
}

/// A market outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Yes,
    No,
}

impl Resolution {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "yes" => Some(Resolution::Yes),
            "no" => Some(Resolution::No),
            _ => None,
        }
    }

    pub fn status(&self) -> MarketStatus {
        match self {
            Resolution::Yes => MarketStatus::ResolvedYes,
            Resolution::No => MarketStatus::ResolvedNo,
        }
    }

    pub fn settlement_tx_type(&self) -> TxType {
        match self {
            Resolution::Yes => TxType::ResolvedYes,
            Resolution::No => TxType::ResolvedNo,
        }
    }

    /// Does a side of the book win under this outcome?
    pub fn pays(&self, share_type: ShareType) -> bool {
        matches!(
            (self, share_type),
            (Resolution::Yes, ShareType::Yes) | (Resolution::No, ShareType::No)
        )
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Yes => f.write_str("Yes"),
            Resolution::No => f.write_str("No"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: i64,
    pub question: String,
    /// Longer resolution criteria shown in trade previews.
    #[serde(default)]
    pub detailed_criteria: String,
    /// LMSR liquidity parameter b, must be positive.
    pub liquidity: f64,
    pub status: MarketStatus,
    pub created_at: DateTime<Utc>,
}

/// In-memory market registry, persisted as part of the state snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketBook {
    markets: BTreeMap<i64, Market>,
    next_id: i64,
}

impl MarketBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        question: String,
        detailed_criteria: String,
        liquidity: f64,
    ) -> Result<&Market, String> {
        if question.trim().is_empty() {
            return Err("Market question must not be empty".to_string());
        }
        if !(liquidity > 0.0) || !liquidity.is_finite() {
            return Err(format!("Market liquidity must be positive, got {}", liquidity));
        }

        let id = self.next_id;
        self.next_id += 1;
        let market = Market {
            id,
            question,
            detailed_criteria,
            liquidity,
            status: MarketStatus::Open,
            created_at: Utc::now(),
        };
        self.markets.insert(id, market);
        Ok(&self.markets[&id])
    }

    pub fn get(&self, id: i64) -> Option<&Market> {
        self.markets.get(&id)
    }

    pub fn get_mut(&mut self, id: i64) -> Option<&mut Market> {
        self.markets.get_mut(&id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}
