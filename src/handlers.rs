// HTTP handlers for the market API.
//
// Thin translation layer: check the bearer token, take the state lock,
// call the api operation, wrap the result in the `{ok, data|message}`
// envelope. No business logic lives here.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{self, ApiError, CreateMarketParams, RegisterParams, TradeParams};
use crate::app_state::SharedState;
use crate::notify::{Announcement, Notifier};

/// State handed to axum: the engine behind its lock plus the announcement
/// sender, which must be usable outside the lock.
#[derive(Clone)]
pub struct ServerState {
    pub app: SharedState,
    pub notifier: Notifier,
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn ok(data: Value) -> Json<Value> {
    Json(json!({ "ok": true, "data": data }))
}

fn fail(err: ApiError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({ "ok": false, "message": err.to_string() })))
}

fn lock_poisoned() -> ApiError {
    ApiError::Internal("state lock poisoned".to_string())
}

/// Bearer-token check for mutating routes. An empty configured token
/// disables the check (local development).
fn authorize(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    if expected.is_empty() {
        return Ok(());
    }
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == expected => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

// ===== TRADING =====

pub async fn execute_trade(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(params): Json<TradeParams>,
) -> ApiResult {
    let data = {
        let mut app = state.app.lock().map_err(|_| fail(lock_poisoned()))?;
        authorize(&headers, &app.config.api_token).map_err(fail)?;
        api::execute_trade(&mut app, &params).map_err(fail)?
    };

    // Announce executed trades (not no-ops) outside the lock.
    if !data["receipt"].is_null() {
        if let (Some(market_id), Some(before), Some(after)) = (
            params.market_id,
            data["pYesBefore"].as_f64(),
            data["pYes"].as_f64(),
        ) {
            let announcement =
                Announcement::trade(market_id, params.quantity, &params.share_type, before, after);
            let notifier = state.notifier.clone();
            tokio::spawn(async move { notifier.announce(announcement).await });
        }
    }

    Ok(ok(data))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewQuery {
    pub handle: String,
    pub market_id: i64,
    pub share_type: String,
    pub quantity: f64,
}

pub async fn preview_trade(
    State(state): State<ServerState>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult {
    let app = state.app.lock().map_err(|_| fail(lock_poisoned()))?;
    let data = api::preview_trade(
        &app,
        &query.handle,
        query.market_id,
        &query.share_type,
        query.quantity,
    )
    .map_err(fail)?;
    Ok(ok(data))
}

pub async fn get_balance(
    State(state): State<ServerState>,
    Path(handle): Path<String>,
) -> ApiResult {
    let app = state.app.lock().map_err(|_| fail(lock_poisoned()))?;
    let data = api::get_balance(&app, &handle).map_err(fail)?;
    Ok(ok(data))
}

// ===== MARKETS =====

pub async fn create_market(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(params): Json<CreateMarketParams>,
) -> ApiResult {
    let mut app = state.app.lock().map_err(|_| fail(lock_poisoned()))?;
    authorize(&headers, &app.config.api_token).map_err(fail)?;
    let data = api::create_market(&mut app, &params).map_err(fail)?;
    app.save_to_disk_best_effort();
    Ok(ok(data))
}

pub async fn list_markets(State(state): State<ServerState>) -> ApiResult {
    let app = state.app.lock().map_err(|_| fail(lock_poisoned()))?;
    Ok(ok(api::list_markets(&app)))
}

pub async fn market_detail(
    State(state): State<ServerState>,
    Path(market_id): Path<i64>,
) -> ApiResult {
    let app = state.app.lock().map_err(|_| fail(lock_poisoned()))?;
    let data = api::market_detail(&app, market_id).map_err(fail)?;
    Ok(ok(data))
}

#[derive(Deserialize)]
pub struct ResolveBody {
    pub resolution: String,
}

pub async fn resolve_market(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(market_id): Path<i64>,
    Json(body): Json<ResolveBody>,
) -> ApiResult {
    let (data, question, status) = {
        let mut app = state.app.lock().map_err(|_| fail(lock_poisoned()))?;
        authorize(&headers, &app.config.api_token).map_err(fail)?;
        let data = api::resolve_market(&mut app, market_id, &body.resolution).map_err(fail)?;
        app.save_to_disk_best_effort();
        let market = app.markets.get(market_id);
        (
            data,
            market.map(|m| m.question.clone()).unwrap_or_default(),
            market.map(|m| m.status.to_string()).unwrap_or_default(),
        )
    };

    let announcement = Announcement::status_change(market_id, &question, &status);
    let notifier = state.notifier.clone();
    tokio::spawn(async move { notifier.announce(announcement).await });

    Ok(ok(data))
}

pub async fn unresolve_market(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(market_id): Path<i64>,
) -> ApiResult {
    let mut app = state.app.lock().map_err(|_| fail(lock_poisoned()))?;
    authorize(&headers, &app.config.api_token).map_err(fail)?;
    let data = api::unresolve_market(&mut app, market_id).map_err(fail)?;
    app.save_to_disk_best_effort();
    Ok(ok(data))
}

// ===== USERS =====

pub async fn register_user(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(params): Json<RegisterParams>,
) -> ApiResult {
    let mut app = state.app.lock().map_err(|_| fail(lock_poisoned()))?;
    authorize(&headers, &app.config.api_token).map_err(fail)?;
    let data = api::register_user(&mut app, &params).map_err(fail)?;
    app.save_to_disk_best_effort();
    Ok(ok(data))
}

// ===== HEALTH =====

pub async fn health_check() -> &'static str {
    "almanac-market - online"
}
