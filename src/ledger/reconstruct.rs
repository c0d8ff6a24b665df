// Balance and position reconstruction.
//
// Nothing here mutates the ledger: every query is a scan over the row
// history. Balances come from the most recent row per user (backward scan,
// early exit); positions are order-independent signed sums.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{Ledger, ShareType, TxType};

/// A user's derived holdings in one market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SharePosition {
    pub yes: f64,
    pub no: f64,
}

impl SharePosition {
    pub fn side(&self, share_type: ShareType) -> f64 {
        match share_type {
            ShareType::Yes => self.yes,
            ShareType::No => self.no,
        }
    }

    fn add(&mut self, share_type: ShareType, quantity: f64) {
        match share_type {
            ShareType::Yes => self.yes += quantity,
            ShareType::No => self.no += quantity,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.yes == 0.0 && self.no == 0.0
    }
}

/// Aggregate outstanding shares of a market, as seen by the pricing engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketShares {
    pub yes: f64,
    pub no: f64,
}

impl MarketShares {
    pub fn volume(&self) -> f64 {
        self.yes + self.no
    }
}

impl Ledger {
    /// Current cash balance for one user: `new_balance` of their most
    /// recent row, or the configured initial balance if they have none.
    pub fn current_balance(&self, user_id: i64) -> f64 {
        self.entries()
            .iter()
            .rev()
            .find(|tx| tx.user_id == user_id)
            .map(|tx| tx.new_balance)
            .unwrap_or(self.initial_balance())
    }

    /// Batched balance lookup. One backward scan serves every requested
    /// user; the scan stops as soon as all of them have been seen.
    pub fn current_balances(&self, user_ids: &[i64]) -> HashMap<i64, f64> {
        let mut remaining: HashSet<i64> = user_ids.iter().copied().collect();
        let mut balances = HashMap::with_capacity(remaining.len());

        for tx in self.entries().iter().rev() {
            if remaining.remove(&tx.user_id) {
                balances.insert(tx.user_id, tx.new_balance);
                if remaining.is_empty() {
                    break;
                }
            }
        }
        for user_id in remaining {
            balances.insert(user_id, self.initial_balance());
        }
        balances
    }

    /// Derived position of one user in one market. Every row type counts:
    /// settlement and unresolve rows are ordinary share deltas.
    pub fn position(&self, user_id: i64, market_id: i64) -> SharePosition {
        let mut position = SharePosition::default();
        for tx in self.entries() {
            if tx.user_id == user_id && tx.market_id == market_id {
                position.add(tx.share_type, tx.quantity);
            }
        }
        position
    }

    /// All non-zero positions in a market, keyed by user id (sorted, so
    /// settlement batches are deterministic).
    pub fn positions(&self, market_id: i64) -> BTreeMap<i64, SharePosition> {
        let mut positions: BTreeMap<i64, SharePosition> = BTreeMap::new();
        for tx in self.entries() {
            if tx.market_id == market_id {
                positions
                    .entry(tx.user_id)
                    .or_default()
                    .add(tx.share_type, tx.quantity);
            }
        }
        positions.retain(|_, p| !p.is_empty());
        positions
    }

    /// Aggregate outstanding shares for pricing.
    ///
    /// Only `UserTrade` rows count: settlement rows and their unresolve
    /// reversals cancel in user positions but must leave the market-level
    /// share count (and therefore prices) untouched across a
    /// resolve/unresolve cycle.
    pub fn market_shares(&self, market_id: i64) -> MarketShares {
        let mut shares = MarketShares::default();
        for tx in self.entries() {
            if tx.market_id == market_id && tx.tx_type == TxType::UserTrade {
                match tx.share_type {
                    ShareType::Yes => shares.yes += tx.quantity,
                    ShareType::No => shares.no += tx.quantity,
                }
            }
        }
        shares
    }

    /// Markets a user has ever touched, for portfolio listings.
    pub fn markets_for_user(&self, user_id: i64) -> Vec<i64> {
        let mut seen = HashSet::new();
        let mut markets = Vec::new();
        for tx in self.entries() {
            if tx.user_id == user_id && seen.insert(tx.market_id) {
                markets.push(tx.market_id);
            }
        }
        markets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionDraft;

    fn trade(user_id: i64, market_id: i64, share_type: ShareType, quantity: f64, cost: f64) -> TransactionDraft {
        TransactionDraft {
            user_id,
            market_id,
            user_email: String::new(),
            share_type,
            quantity,
            total_cost: cost,
            tx_type: TxType::UserTrade,
        }
    }

    #[test]
    fn unknown_user_gets_the_initial_balance() {
        let ledger = Ledger::in_memory(10_000.0);
        assert_eq!(ledger.current_balance(42), 10_000.0);

        let balances = ledger.current_balances(&[1, 2]);
        assert_eq!(balances[&1], 10_000.0);
        assert_eq!(balances[&2], 10_000.0);
    }

    #[test]
    fn most_recent_row_wins_for_balance() {
        let mut ledger = Ledger::in_memory(10_000.0);
        ledger
            .append(&[
                trade(1, 1, ShareType::Yes, 10.0, 500.0),
                trade(1, 1, ShareType::Yes, -10.0, -400.0),
            ])
            .unwrap();
        assert_eq!(ledger.current_balance(1), 9_900.0);
    }

    #[test]
    fn positions_sum_every_row_type() {
        let mut ledger = Ledger::in_memory(10_000.0);
        ledger
            .append(&[
                trade(1, 5, ShareType::Yes, 10.0, 500.0),
                trade(1, 5, ShareType::No, 4.0, 180.0),
                // Settlement row zeroes the Yes side and must be counted.
                TransactionDraft {
                    user_id: 1,
                    market_id: 5,
                    user_email: String::new(),
                    share_type: ShareType::Yes,
                    quantity: -10.0,
                    total_cost: -1_000.0,
                    tx_type: TxType::ResolvedYes,
                },
            ])
            .unwrap();

        let position = ledger.position(1, 5);
        assert_eq!(position.yes, 0.0);
        assert_eq!(position.no, 4.0);
    }

    #[test]
    fn positions_ignore_other_markets() {
        let mut ledger = Ledger::in_memory(10_000.0);
        ledger
            .append(&[
                trade(1, 5, ShareType::Yes, 10.0, 500.0),
                trade(1, 6, ShareType::Yes, 3.0, 150.0),
            ])
            .unwrap();
        assert_eq!(ledger.position(1, 5).yes, 10.0);
        assert_eq!(ledger.position(1, 6).yes, 3.0);
    }

    #[test]
    fn market_shares_count_trades_only() {
        let mut ledger = Ledger::in_memory(10_000.0);
        ledger
            .append(&[
                trade(1, 5, ShareType::Yes, 10.0, 500.0),
                trade(2, 5, ShareType::No, 6.0, 280.0),
                TransactionDraft {
                    user_id: 1,
                    market_id: 5,
                    user_email: String::new(),
                    share_type: ShareType::Yes,
                    quantity: -10.0,
                    total_cost: -1_000.0,
                    tx_type: TxType::ResolvedYes,
                },
            ])
            .unwrap();

        let shares = ledger.market_shares(5);
        assert_eq!(shares.yes, 10.0);
        assert_eq!(shares.no, 6.0);
        assert_eq!(shares.volume(), 16.0);
    }

    #[test]
    fn zero_positions_are_dropped_from_the_market_view() {
        let mut ledger = Ledger::in_memory(10_000.0);
        ledger
            .append(&[
                trade(1, 5, ShareType::Yes, 10.0, 500.0),
                trade(1, 5, ShareType::Yes, -10.0, -480.0),
                trade(2, 5, ShareType::No, 2.0, 90.0),
            ])
            .unwrap();

        let positions = ledger.positions(5);
        assert!(!positions.contains_key(&1));
        assert_eq!(positions[&2].no, 2.0);
    }
}
