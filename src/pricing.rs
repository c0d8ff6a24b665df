// LMSR pricing engine.
//
// Pure functions only: the engine never touches the ledger. Cost is the
// difference of the LMSR cost function C(y, n) = b * ln(e^(y/b) + e^(n/b))
// scaled by 100 so a share pays out 100 currency units at resolution and
// prices live in [0, 100].

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::ledger::ShareType;

/// Scales the probability-space cost function into currency units; also the
/// per-share payout of a winning side at resolution.
pub const PRICE_SCALE: f64 = 100.0;

/// Round to cents, half away from zero.
pub fn round_cents(x: f64) -> f64 {
    match Decimal::from_f64(x) {
        Some(d) => d
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .to_f64()
            .unwrap_or(x),
        // NaN / infinity pass through so sentinels survive rounding.
        None => x,
    }
}

/// ln(e^a + e^b) without overflowing for large arguments.
fn log_sum_exp(a: f64, b: f64) -> f64 {
    let m = a.max(b);
    if m.is_infinite() {
        return m;
    }
    m + ((a - m).exp() + (b - m).exp()).ln()
}

/// LMSR cost function C(y, n), unscaled.
fn score(liquidity: f64, yes_shares: f64, no_shares: f64) -> f64 {
    liquidity * log_sum_exp(yes_shares / liquidity, no_shares / liquidity)
}

/// Signed cost of trading `quantity` shares of `share_type` against the
/// current pool, rounded to cents. Positive quantity buys (cash out),
/// negative sells (cash in, cost is negative).
///
/// Returns `f64::NAN` when `liquidity <= 0`; callers must treat that as a
/// hard validation error, never a price.
pub fn trade_cost(
    liquidity: f64,
    yes_shares: f64,
    no_shares: f64,
    share_type: ShareType,
    quantity: f64,
) -> f64 {
    if !(liquidity > 0.0) || !liquidity.is_finite() {
        return f64::NAN;
    }

    let (new_yes, new_no) = match share_type {
        ShareType::Yes => (yes_shares + quantity, no_shares),
        ShareType::No => (yes_shares, no_shares + quantity),
    };

    let cost = PRICE_SCALE * (score(liquidity, new_yes, new_no) - score(liquidity, yes_shares, no_shares));
    round_cents(cost)
}

/// Current probability of Yes, in [0, 100].
pub fn yes_price(liquidity: f64, yes_shares: f64, no_shares: f64) -> f64 {
    if !(liquidity > 0.0) || !liquidity.is_finite() {
        return f64::NAN;
    }

    let a = yes_shares / liquidity;
    let c = no_shares / liquidity;
    let m = a.max(c);
    let ey = (a - m).exp();
    let en = (c - m).exp();
    // Clamp out-of-bounds roundoff.
    let price = (ey / (ey + en)).clamp(0.0, 1.0);
    PRICE_SCALE * price
}

pub fn no_price(liquidity: f64, yes_shares: f64, no_shares: f64) -> f64 {
    PRICE_SCALE - yes_price(liquidity, yes_shares, no_shares)
}

/// Read-only simulation of a trade: cost plus prices before and after.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TradePreview {
    pub cost: f64,
    pub yes_price_before: f64,
    pub no_price_before: f64,
    pub yes_price_after: f64,
    pub no_price_after: f64,
}

pub fn preview(
    liquidity: f64,
    yes_shares: f64,
    no_shares: f64,
    share_type: ShareType,
    quantity: f64,
) -> TradePreview {
    let (new_yes, new_no) = match share_type {
        ShareType::Yes => (yes_shares + quantity, no_shares),
        ShareType::No => (yes_shares, no_shares + quantity),
    };

    TradePreview {
        cost: trade_cost(liquidity, yes_shares, no_shares, share_type, quantity),
        yes_price_before: yes_price(liquidity, yes_shares, no_shares),
        no_price_before: no_price(liquidity, yes_shares, no_shares),
        yes_price_after: yes_price(liquidity, new_yes, new_no),
        no_price_after: no_price(liquidity, new_yes, new_no),
    }
}

/// Proceeds from unwinding a whole position at current market depth: the
/// Yes legs are sold first, then the No legs against the moved pool. Each
/// leg is rounded like a real trade so the figure matches what sequential
/// sells would credit.
pub fn liquidation_proceeds(
    liquidity: f64,
    yes_shares: f64,
    no_shares: f64,
    user_yes: f64,
    user_no: f64,
) -> f64 {
    if !(liquidity > 0.0) || !liquidity.is_finite() {
        return 0.0;
    }

    let sell_yes = user_yes.max(0.0);
    let sell_no = user_no.max(0.0);

    let mut pool_yes = yes_shares;
    let mut proceeds = 0.0;
    if sell_yes > 0.0 {
        proceeds += -trade_cost(liquidity, pool_yes, no_shares, ShareType::Yes, -sell_yes);
        pool_yes -= sell_yes;
    }
    if sell_no > 0.0 {
        proceeds += -trade_cost(liquidity, pool_yes, no_shares, ShareType::No, -sell_no);
    }
    round_cents(proceeds)
}
