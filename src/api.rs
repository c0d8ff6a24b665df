// Request API operations.
//
// One function per boundary operation, all working on `AppState` and
// returning either a JSON data payload or a typed `ApiError`. The HTTP
// layer (handlers) only translates: success -> `{ok: true, data}`,
// failure -> 4xx with `{ok: false, message}`. Keeping the operations off
// axum means tests drive the exact same code paths in-process.

use std::fmt;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::exchange::{self, resolution, TradeError, TradeReceipt, TradeRequest};
use crate::ledger::ShareType;
use crate::market::{Market, MarketStatus, Resolution};
use crate::pricing;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    UnknownUser(String),
    UnknownUserId(i64),
    UnknownMarket(i64),
    InvalidShareType(String),
    InvalidResolution(String),
    NotResolved(i64),
    Pricing(String),
    Trade(TradeError),
    Invalid(String),
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Invalid or missing API token"),
            ApiError::UnknownUser(handle) => write!(f, "Unknown user handle: {}", handle),
            ApiError::UnknownUserId(id) => write!(f, "Unknown user id: {}", id),
            ApiError::UnknownMarket(id) => write!(f, "Unknown market id: {}", id),
            ApiError::InvalidShareType(s) => {
                write!(f, "Invalid share type '{}', expected Yes or No", s)
            }
            ApiError::InvalidResolution(s) => {
                write!(f, "Invalid resolution '{}', expected Yes or No", s)
            }
            ApiError::NotResolved(id) => write!(f, "Market {} is not resolved", id),
            ApiError::Pricing(msg) => write!(f, "Pricing error: {}", msg),
            ApiError::Trade(e) => write!(f, "{}", e),
            ApiError::Invalid(msg) => write!(f, "{}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApiError::UnknownUser(_) | ApiError::UnknownUserId(_) | ApiError::UnknownMarket(_)
        )
    }
}

impl From<TradeError> for ApiError {
    fn from(e: TradeError) -> Self {
        ApiError::Trade(e)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeParams {
    pub user_id: Option<i64>,
    pub market_id: Option<i64>,
    pub share_type: String,
    pub quantity: f64,
    #[serde(default)]
    pub user_email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMarketParams {
    pub question: String,
    #[serde(default)]
    pub detailed_criteria: String,
    pub liquidity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterParams {
    pub handle: String,
    #[serde(default)]
    pub email: String,
}

/// Guard against the LMSR degeneracy up front: a non-positive liquidity
/// would otherwise surface as a NaN cost.
fn check_liquidity(market: &Market) -> Result<(), ApiError> {
    if !(market.liquidity > 0.0) || !market.liquidity.is_finite() {
        return Err(ApiError::Pricing(format!(
            "market {} has non-positive liquidity {}",
            market.id, market.liquidity
        )));
    }
    Ok(())
}

fn market_view(state: &AppState, market: &Market) -> Value {
    let shares = state.ledger.market_shares(market.id);
    json!({
        "id": market.id,
        "question": market.question,
        "detailedCriteria": market.detailed_criteria,
        "liquidity": market.liquidity,
        "status": market.status,
        "pYes": pricing::yes_price(market.liquidity, shares.yes, shares.no),
        "pNo": pricing::no_price(market.liquidity, shares.yes, shares.no),
        "yesShares": shares.yes,
        "noShares": shares.no,
        "volume": shares.volume(),
    })
}

/// `executeTrade`: price the request against current derived shares and run
/// the executor. The cost is computed server-side; the executor re-checks
/// everything, including cost finiteness, per its validation order.
pub fn execute_trade(state: &mut AppState, params: &TradeParams) -> Result<Value, ApiError> {
    let market_id = params.market_id.ok_or(TradeError::MissingMarket)?;
    let market = state
        .markets
        .get(market_id)
        .ok_or(ApiError::UnknownMarket(market_id))?
        .clone();
    check_liquidity(&market)?;

    if let Some(user_id) = params.user_id {
        if state.directory.by_id(user_id).is_none() {
            return Err(ApiError::UnknownUserId(user_id));
        }
    }

    let side = ShareType::parse(&params.share_type);
    let shares = state.ledger.market_shares(market_id);
    let p_yes_before = pricing::yes_price(market.liquidity, shares.yes, shares.no);

    let total_cost = match side {
        Some(side) if params.quantity.is_finite() => pricing::trade_cost(
            market.liquidity,
            shares.yes,
            shares.no,
            side,
            params.quantity,
        ),
        _ => f64::NAN,
    };

    let request = TradeRequest {
        user_id: params.user_id,
        market_id: Some(market_id),
        market_status: market.status,
        share_type: side,
        quantity: params.quantity,
        total_cost,
        user_email: params.user_email.clone(),
    };
    let outcome = exchange::execute(&mut state.ledger, &request)?;

    let shares_after = state.ledger.market_shares(market_id);
    let new_balance = params
        .user_id
        .map(|id| state.ledger.current_balance(id))
        .unwrap_or_default();

    Ok(json!({
        "message": outcome.message(),
        "receipt": outcome.transaction().map(TradeReceipt::from),
        "newBalance": new_balance,
        "pYesBefore": p_yes_before,
        "pYes": pricing::yes_price(market.liquidity, shares_after.yes, shares_after.no),
        "pNo": pricing::no_price(market.liquidity, shares_after.yes, shares_after.no),
    }))
}

/// `previewTrade`: read-only cost and price simulation for a user handle.
pub fn preview_trade(
    state: &AppState,
    handle: &str,
    market_id: i64,
    share_type: &str,
    quantity: f64,
) -> Result<Value, ApiError> {
    let user = state
        .directory
        .by_handle(handle)
        .ok_or_else(|| ApiError::UnknownUser(handle.to_string()))?;
    let market = state
        .markets
        .get(market_id)
        .ok_or(ApiError::UnknownMarket(market_id))?;
    let side = ShareType::parse(share_type)
        .ok_or_else(|| ApiError::InvalidShareType(share_type.to_string()))?;
    check_liquidity(market)?;
    if !quantity.is_finite() {
        return Err(ApiError::Invalid(format!("Invalid quantity: {}", quantity)));
    }

    let shares = state.ledger.market_shares(market_id);
    let preview = pricing::preview(market.liquidity, shares.yes, shares.no, side, quantity);
    let balance = state.ledger.current_balance(user.id);
    let holdings = state.ledger.position(user.id, market_id);

    Ok(json!({
        "user": { "id": user.id, "balance": balance },
        "market": {
            "id": market.id,
            "question": market.question,
            "detailedCriteria": market.detailed_criteria,
            "status": market.status,
            "pYes": preview.yes_price_before,
            "pNo": preview.no_price_before,
            "volume": shares.volume(),
        },
        "trade": { "shareType": side, "quantity": quantity, "cost": preview.cost },
        "simulation": {
            "newBalance": balance - preview.cost,
            "newPYes": preview.yes_price_after,
            "newPNo": preview.no_price_after,
        },
        "userHoldings": { "yesShares": holdings.yes, "noShares": holdings.no },
    }))
}

/// `getBalance`: cash balance plus a per-market holdings breakdown with
/// the liquidation value of each position at current depth.
pub fn get_balance(state: &AppState, handle: &str) -> Result<Value, ApiError> {
    let user = state
        .directory
        .by_handle(handle)
        .ok_or_else(|| ApiError::UnknownUser(handle.to_string()))?;
    let balance = state.ledger.current_balance(user.id);

    let mut holdings = Vec::new();
    let mut total_market_value = 0.0;
    for market_id in state.ledger.markets_for_user(user.id) {
        let position = state.ledger.position(user.id, market_id);
        if position.is_empty() {
            continue;
        }
        let market = match state.markets.get(market_id) {
            Some(m) => m,
            None => continue,
        };
        let shares = state.ledger.market_shares(market_id);
        let market_value = pricing::liquidation_proceeds(
            market.liquidity,
            shares.yes,
            shares.no,
            position.yes,
            position.no,
        );
        total_market_value += market_value;
        holdings.push(json!({
            "marketId": market_id,
            "question": market.question,
            "pYes": pricing::yes_price(market.liquidity, shares.yes, shares.no),
            "volume": shares.volume(),
            "userYes": position.yes,
            "userNo": position.no,
            "marketValue": market_value,
        }));
    }

    Ok(json!({
        "handle": user.handle,
        "userId": user.id,
        "balance": balance,
        "holdings": holdings,
        "marketValue": pricing::round_cents(total_market_value),
        "netWorth": pricing::round_cents(balance + total_market_value),
    }))
}

/// `resolveMarket`: settle to an outcome. A market already resolved the
/// other way is unresolved first (never a payout delta).
pub fn resolve_market(
    state: &mut AppState,
    market_id: i64,
    resolution: &str,
) -> Result<Value, ApiError> {
    let resolution = Resolution::parse(resolution)
        .ok_or_else(|| ApiError::InvalidResolution(resolution.to_string()))?;
    let market = state
        .markets
        .get_mut(market_id)
        .ok_or(ApiError::UnknownMarket(market_id))?;

    let change = resolution::change_status(&mut state.ledger, market, resolution.status())
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(json!({
        "message": format!("Market {} resolved {}", market_id, resolution),
        "from": change.from,
        "to": change.to,
        "settledRows": change.settled.len(),
        "reversedRows": change.reversed.len(),
    }))
}

/// `unresolveMarket`: reverse the current settlement and park the market
/// as Closed (re-opening is an explicit, separate status change).
pub fn unresolve_market(state: &mut AppState, market_id: i64) -> Result<Value, ApiError> {
    let market = state
        .markets
        .get_mut(market_id)
        .ok_or(ApiError::UnknownMarket(market_id))?;
    if !market.status.is_resolved() {
        return Err(ApiError::NotResolved(market_id));
    }

    let change = resolution::change_status(&mut state.ledger, market, MarketStatus::Closed)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(json!({
        "message": format!("Market {} unresolved", market_id),
        "from": change.from,
        "to": change.to,
        "reversedRows": change.reversed.len(),
    }))
}

pub fn create_market(state: &mut AppState, params: &CreateMarketParams) -> Result<Value, ApiError> {
    let market = state
        .markets
        .create(
            params.question.clone(),
            params.detailed_criteria.clone(),
            params.liquidity,
        )
        .map_err(ApiError::Invalid)?
        .clone();
    Ok(market_view(state, &market))
}

pub fn register_user(state: &mut AppState, params: &RegisterParams) -> Result<Value, ApiError> {
    let profile = state
        .directory
        .register(&params.handle, &params.email)
        .map_err(ApiError::Invalid)?;
    let balance = state.ledger.current_balance(profile.id);
    Ok(json!({
        "userId": profile.id,
        "handle": profile.handle,
        "balance": balance,
    }))
}

pub fn list_markets(state: &AppState) -> Value {
    let markets: Vec<Value> = state
        .markets
        .all()
        .map(|m| market_view(state, m))
        .collect();
    json!({ "markets": markets })
}

pub fn market_detail(state: &AppState, market_id: i64) -> Result<Value, ApiError> {
    let market = state
        .markets
        .get(market_id)
        .ok_or(ApiError::UnknownMarket(market_id))?;
    let mut view = market_view(state, market);
    let positions: Vec<Value> = state
        .ledger
        .positions(market_id)
        .into_iter()
        .map(|(user_id, p)| json!({ "userId": user_id, "yes": p.yes, "no": p.no }))
        .collect();
    if let Value::Object(map) = &mut view {
        map.insert("positions".to_string(), Value::Array(positions));
    }
    Ok(view)
}
