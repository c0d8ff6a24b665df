// Trade execution.
//
// The executor is deliberately decoupled from any transport: it validates a
// request against reconstructed ledger state and appends at most one row.
// Callers (HTTP handlers, bots, tests) provide the market status and the
// priced cost; the executor owns the validation order and the write.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ledger::{Ledger, LedgerError, ShareType, Transaction, TransactionDraft, TxType};
use crate::market::MarketStatus;

pub mod resolution;

/// Slack applied to sell-size and balance comparisons so float dust never
/// rejects an exact full-position sell or exact-balance spend.
pub const FLOAT_TOLERANCE: f64 = 1e-9;

/// A proposed trade as it arrives from the outside world. Identity fields
/// are optional because the boundary cannot guarantee them; the executor
/// turns their absence into structured errors.
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub user_id: Option<i64>,
    pub market_id: Option<i64>,
    pub market_status: MarketStatus,
    pub share_type: Option<ShareType>,
    pub quantity: f64,
    pub total_cost: f64,
    pub user_email: String,
}

/// Why a trade was refused. Validation failures and business-rule
/// violations are both non-fatal: the engine stays usable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeError {
    MissingUser,
    MissingMarket,
    MarketNotOpen(MarketStatus),
    InvalidShareType,
    InvalidQuantity(f64),
    CostNotFinite,
    InsufficientShares { requested: f64, owned: f64 },
    InsufficientBalance { cost: f64, balance: f64 },
    Ledger(String),
}

impl fmt::Display for TradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeError::MissingUser => write!(f, "Missing user id"),
            TradeError::MissingMarket => write!(f, "Missing market id"),
            TradeError::MarketNotOpen(status) => {
                write!(f, "Market is not open for trading (status: {})", status)
            }
            TradeError::InvalidShareType => write!(f, "Share type must be Yes or No"),
            TradeError::InvalidQuantity(q) => write!(f, "Invalid quantity: {}", q),
            TradeError::CostNotFinite => write!(f, "Trade cost is not a finite number"),
            TradeError::InsufficientShares { requested, owned } => {
                write!(f, "Cannot sell {} shares, only {} owned", requested, owned)
            }
            TradeError::InsufficientBalance { cost, balance } => {
                write!(f, "Insufficient balance: cost {} exceeds {}", cost, balance)
            }
            TradeError::Ledger(msg) => write!(f, "Ledger append failed: {}", msg),
        }
    }
}

impl std::error::Error for TradeError {}

impl From<LedgerError> for TradeError {
    fn from(e: LedgerError) -> Self {
        TradeError::Ledger(e.to_string())
    }
}

/// Outcome of a successful execution.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeOutcome {
    /// Zero-quantity request: reported as success, nothing written.
    Noop,
    Executed(Transaction),
}

impl TradeOutcome {
    pub fn message(&self) -> String {
        match self {
            TradeOutcome::Noop => "No-op: zero quantity, nothing traded".to_string(),
            TradeOutcome::Executed(tx) => {
                let action = if tx.quantity >= 0.0 { "Bought" } else { "Sold" };
                format!(
                    "{} {} {} share(s) for {:.2}; balance {:.2} -> {:.2}",
                    action,
                    tx.quantity.abs(),
                    tx.share_type,
                    tx.total_cost,
                    tx.prev_balance,
                    tx.new_balance,
                )
            }
        }
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            TradeOutcome::Noop => None,
            TradeOutcome::Executed(tx) => Some(tx),
        }
    }
}

/// Validate and execute a trade. First failing check wins; a zero quantity
/// short-circuits to success without touching the ledger.
pub fn execute(ledger: &mut Ledger, request: &TradeRequest) -> Result<TradeOutcome, TradeError> {
    let user_id = request.user_id.ok_or(TradeError::MissingUser)?;
    let market_id = request.market_id.ok_or(TradeError::MissingMarket)?;

    if request.market_status != MarketStatus::Open {
        return Err(TradeError::MarketNotOpen(request.market_status));
    }

    let share_type = request.share_type.ok_or(TradeError::InvalidShareType)?;

    if !request.quantity.is_finite() {
        return Err(TradeError::InvalidQuantity(request.quantity));
    }
    if request.quantity == 0.0 {
        return Ok(TradeOutcome::Noop);
    }

    if !request.total_cost.is_finite() {
        return Err(TradeError::CostNotFinite);
    }

    if request.quantity < 0.0 {
        let owned = ledger.position(user_id, market_id).side(share_type);
        if -request.quantity > owned + FLOAT_TOLERANCE {
            return Err(TradeError::InsufficientShares {
                requested: -request.quantity,
                owned,
            });
        }
    }

    if request.total_cost > 0.0 {
        let balance = ledger.current_balance(user_id);
        if request.total_cost > balance + FLOAT_TOLERANCE {
            return Err(TradeError::InsufficientBalance {
                cost: request.total_cost,
                balance,
            });
        }
    }

    let rows = ledger.append(&[TransactionDraft {
        user_id,
        market_id,
        user_email: request.user_email.clone(),
        share_type,
        quantity: request.quantity,
        total_cost: request.total_cost,
        tx_type: TxType::UserTrade,
    }])?;

    let tx = match rows.into_iter().next() {
        Some(tx) => tx,
        None => return Err(TradeError::Ledger("append returned no rows".to_string())),
    };
    info!(
        user = user_id,
        market = market_id,
        side = %tx.share_type,
        quantity = tx.quantity,
        cost = tx.total_cost,
        "trade executed"
    );
    Ok(TradeOutcome::Executed(tx))
}

/// Serializable summary of an executed trade for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeReceipt {
    pub transaction_id: i64,
    pub share_type: ShareType,
    pub quantity: f64,
    pub total_cost: f64,
    pub new_balance: f64,
}

impl From<&Transaction> for TradeReceipt {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            share_type: tx.share_type,
            quantity: tx.quantity,
            total_cost: tx.total_cost,
            new_balance: tx.new_balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TradeRequest {
        TradeRequest {
            user_id: Some(1),
            market_id: Some(5),
            market_status: MarketStatus::Open,
            share_type: Some(ShareType::Yes),
            quantity: 10.0,
            total_cost: 512.49,
            user_email: "alice@example.org".to_string(),
        }
    }

    #[test]
    fn happy_path_appends_one_user_trade_row() {
        let mut ledger = Ledger::in_memory(10_000.0);
        let outcome = execute(&mut ledger, &request()).unwrap();

        let tx = outcome.transaction().unwrap();
        assert_eq!(tx.tx_type, TxType::UserTrade);
        assert_eq!(tx.quantity, 10.0);
        assert_eq!(tx.total_cost, 512.49);
        assert_eq!(tx.prev_balance, 10_000.0);
        assert!((tx.new_balance - 9_487.51).abs() < 1e-9);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn missing_identity_fields_fail_first() {
        let mut ledger = Ledger::in_memory(10_000.0);

        let mut r = request();
        r.user_id = None;
        r.market_id = None; // user check must win
        assert_eq!(execute(&mut ledger, &r), Err(TradeError::MissingUser));

        let mut r = request();
        r.market_id = None;
        assert_eq!(execute(&mut ledger, &r), Err(TradeError::MissingMarket));
        assert!(ledger.is_empty());
    }

    #[test]
    fn closed_and_resolved_markets_refuse_trades() {
        let mut ledger = Ledger::in_memory(10_000.0);
        for status in [
            MarketStatus::Closed,
            MarketStatus::ResolvedYes,
            MarketStatus::ResolvedNo,
        ] {
            let mut r = request();
            r.market_status = status;
            assert_eq!(execute(&mut ledger, &r), Err(TradeError::MarketNotOpen(status)));
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn invalid_share_type_beats_quantity_checks() {
        let mut ledger = Ledger::in_memory(10_000.0);
        let mut r = request();
        r.share_type = None;
        r.quantity = f64::NAN;
        assert_eq!(execute(&mut ledger, &r), Err(TradeError::InvalidShareType));
    }

    #[test]
    fn non_finite_quantity_is_rejected() {
        let mut ledger = Ledger::in_memory(10_000.0);
        for q in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut r = request();
            r.quantity = q;
            assert!(matches!(
                execute(&mut ledger, &r),
                Err(TradeError::InvalidQuantity(_))
            ));
        }
    }

    #[test]
    fn zero_quantity_succeeds_without_a_ledger_row() {
        let mut ledger = Ledger::in_memory(10_000.0);
        let mut r = request();
        r.quantity = 0.0;
        r.total_cost = f64::NAN; // must not even be inspected
        assert!(matches!(execute(&mut ledger, &r), Ok(TradeOutcome::Noop)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn nan_cost_is_rejected_for_real_trades() {
        let mut ledger = Ledger::in_memory(10_000.0);
        let mut r = request();
        r.total_cost = f64::NAN;
        assert_eq!(execute(&mut ledger, &r), Err(TradeError::CostNotFinite));
    }

    #[test]
    fn cannot_sell_more_than_owned() {
        let mut ledger = Ledger::in_memory(10_000.0);

        // Buy 10 Yes first.
        execute(&mut ledger, &request()).unwrap();

        let mut r = request();
        r.quantity = -11.0;
        r.total_cost = -500.0;
        let err = execute(&mut ledger, &r).unwrap_err();
        assert!(matches!(err, TradeError::InsufficientShares { .. }));
        assert_eq!(ledger.len(), 1);

        // Selling exactly what is owned is fine.
        let mut r = request();
        r.quantity = -10.0;
        r.total_cost = -500.0;
        execute(&mut ledger, &r).unwrap();
        assert_eq!(ledger.position(1, 5).yes, 0.0);
    }

    #[test]
    fn owned_shares_on_the_other_side_do_not_cover_a_sale() {
        let mut ledger = Ledger::in_memory(10_000.0);
        execute(&mut ledger, &request()).unwrap(); // 10 Yes

        let mut r = request();
        r.share_type = Some(ShareType::No);
        r.quantity = -1.0;
        r.total_cost = -10.0;
        assert!(matches!(
            execute(&mut ledger, &r),
            Err(TradeError::InsufficientShares { .. })
        ));
    }

    #[test]
    fn insufficient_balance_rejects_and_writes_nothing() {
        let mut ledger = Ledger::in_memory(0.0);
        let mut r = request();
        r.total_cost = 50.0;
        let err = execute(&mut ledger, &r).unwrap_err();
        assert!(matches!(err, TradeError::InsufficientBalance { .. }));
        assert!(ledger.is_empty());
    }

    #[test]
    fn spending_the_exact_balance_is_allowed() {
        let mut ledger = Ledger::in_memory(512.49);
        let outcome = execute(&mut ledger, &request()).unwrap();
        assert!((outcome.transaction().unwrap().new_balance).abs() < 1e-9);
    }

    #[test]
    fn payouts_never_hit_the_balance_check() {
        // A sale has negative cost; even a broke user may sell.
        let mut ledger = Ledger::in_memory(10_000.0);
        execute(&mut ledger, &request()).unwrap();

        // Drain the balance with an expensive buy on another market.
        let mut r = request();
        r.market_id = Some(6);
        r.total_cost = 9_487.51;
        execute(&mut ledger, &r).unwrap();
        assert!(ledger.current_balance(1).abs() < 1e-9);

        let mut r = request();
        r.quantity = -10.0;
        r.total_cost = -480.0;
        execute(&mut ledger, &r).unwrap();
        assert!((ledger.current_balance(1) - 480.0).abs() < 1e-9);
    }
}
