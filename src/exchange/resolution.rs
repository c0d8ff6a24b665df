// Market resolution and its exact reversal.
//
// Settlement and unresolution are expressed purely as ledger appends, so
// replaying the log always reproduces them. Every status transition writes
// its rows in one atomic batch; a transition with nothing to settle or
// reverse is a safe no-op.

use std::collections::HashSet;

use tracing::info;

use crate::ledger::{Ledger, LedgerError, ShareType, Transaction, TransactionDraft};
use crate::market::{Market, MarketStatus, Resolution};
use crate::pricing::PRICE_SCALE;

/// Ledger rows written by one status transition.
#[derive(Debug)]
pub struct StatusChange {
    pub from: MarketStatus,
    pub to: MarketStatus,
    /// Settlement rows appended by a resolve step.
    pub settled: Vec<Transaction>,
    /// Reversal rows appended by an unresolve step.
    pub reversed: Vec<Transaction>,
}

/// Settle a market: close out every non-zero position and credit winners.
///
/// Per user and per non-zero side, one row with `quantity = -held` and
/// `total_cost = -payout`, where payout is `held * 100` on the winning side
/// and zero on the losing one. Holders are visited in user-id order so the
/// batch is deterministic.
pub fn resolve(
    ledger: &mut Ledger,
    market_id: i64,
    resolution: Resolution,
) -> Result<Vec<Transaction>, LedgerError> {
    let mut drafts = Vec::new();
    for (user_id, position) in ledger.positions(market_id) {
        for share_type in [ShareType::Yes, ShareType::No] {
            let held = position.side(share_type);
            if held == 0.0 {
                continue;
            }
            let payout = if resolution.pays(share_type) {
                held * PRICE_SCALE
            } else {
                0.0
            };
            drafts.push(TransactionDraft {
                user_id,
                market_id,
                user_email: String::new(),
                share_type,
                quantity: -held,
                total_cost: -payout,
                tx_type: resolution.settlement_tx_type(),
            });
        }
    }

    let rows = ledger.append(&drafts)?;
    info!(
        market = market_id,
        outcome = %resolution,
        rows = rows.len(),
        "market resolved"
    );
    Ok(rows)
}

/// Reverse the most recent settlement of a market.
///
/// Backward scan; the first settlement row found per `(user, share type)`
/// pair wins and older rows for that pair are superseded. Each found row is
/// inverted exactly (`quantity` and `total_cost` negated), restoring the
/// pre-resolution position and balance.
pub fn unresolve(ledger: &mut Ledger, market_id: i64) -> Result<Vec<Transaction>, LedgerError> {
    let mut seen: HashSet<(i64, ShareType)> = HashSet::new();
    let mut drafts = Vec::new();

    for tx in ledger.entries().iter().rev() {
        if tx.market_id != market_id || !tx.tx_type.is_settlement() {
            continue;
        }
        if !seen.insert((tx.user_id, tx.share_type)) {
            continue;
        }
        drafts.push(TransactionDraft {
            user_id: tx.user_id,
            market_id,
            user_email: String::new(),
            share_type: tx.share_type,
            quantity: -tx.quantity,
            total_cost: -tx.total_cost,
            tx_type: crate::ledger::TxType::Unresolve,
        });
    }

    let rows = ledger.append(&drafts)?;
    info!(market = market_id, rows = rows.len(), "market unresolved");
    Ok(rows)
}

/// Drive the market status state machine.
///
/// Open <-> Closed is metadata-only. Entering a resolved status settles;
/// leaving one reverses the settlement first. Moving directly between the
/// two resolved statuses always unresolves and then re-resolves with the
/// new outcome, never applies a payout delta.
pub fn change_status(
    ledger: &mut Ledger,
    market: &mut Market,
    new_status: MarketStatus,
) -> Result<StatusChange, LedgerError> {
    let from = market.status;
    let mut change = StatusChange {
        from,
        to: new_status,
        settled: Vec::new(),
        reversed: Vec::new(),
    };
    if from == new_status {
        return Ok(change);
    }

    if from.is_resolved() {
        change.reversed = unresolve(ledger, market.id)?;
    }
    if let Some(resolution) = new_status.resolution() {
        change.settled = resolve(ledger, market.id, resolution)?;
    }

    market.status = new_status;
    info!(market = market.id, from = %from, to = %new_status, "market status changed");
    Ok(change)
}
