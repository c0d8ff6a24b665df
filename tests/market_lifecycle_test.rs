// End-to-end flows through the api operations, in-process.
//
// Every scenario runs against an in-memory state so the suite needs no
// running server; the handlers add nothing but transport on top of these
// code paths.

use almanac_market::api::{self, ApiError, TradeParams};
use almanac_market::{AppState, EngineConfig, TradeError};

fn fresh_state() -> AppState {
    AppState::in_memory(EngineConfig::for_tests())
}

fn register(state: &mut AppState, handle: &str) -> i64 {
    state
        .directory
        .register(handle, &format!("{}@example.org", handle))
        .unwrap()
        .id
}

fn create_market(state: &mut AppState, question: &str, liquidity: f64) -> i64 {
    state
        .markets
        .create(question.to_string(), String::new(), liquidity)
        .unwrap()
        .id
}

fn trade(state: &mut AppState, user_id: i64, market_id: i64, share_type: &str, quantity: f64) -> serde_json::Value {
    api::execute_trade(
        state,
        &TradeParams {
            user_id: Some(user_id),
            market_id: Some(market_id),
            share_type: share_type.to_string(),
            quantity,
            user_email: String::new(),
        },
    )
    .unwrap()
}

#[test]
fn full_market_lifecycle_with_reresolution() {
    let mut state = fresh_state();
    let alice = register(&mut state, "alice");
    let bob = register(&mut state, "bob");
    let market = create_market(&mut state, "Will the rocket land?", 100.0);

    // Alice buys 10 Yes on a fresh book: the canonical 512.49.
    let data = trade(&mut state, alice, market, "Yes", 10.0);
    let alice_cost = data["receipt"]["totalCost"].as_f64().unwrap();
    assert!((alice_cost - 512.49).abs() < 0.005);
    assert!((data["newBalance"].as_f64().unwrap() - 9_487.51).abs() < 0.005);

    // Bob takes the other side.
    let data = trade(&mut state, bob, market, "No", 5.0);
    let bob_cost = data["receipt"]["totalCost"].as_f64().unwrap();
    assert!(bob_cost > 0.0);
    let bob_after_trade = 10_000.0 - bob_cost;

    // Resolve Yes: Alice's 10 shares pay 1000, Bob's No side pays nothing
    // but his position is closed out too.
    let data = api::resolve_market(&mut state, market, "Yes").unwrap();
    assert_eq!(data["settledRows"].as_u64().unwrap(), 2);
    assert_eq!(data["reversedRows"].as_u64().unwrap(), 0);

    assert!((state.ledger.current_balance(alice) - (9_487.51 + 1_000.0)).abs() < 0.005);
    assert!((state.ledger.current_balance(bob) - bob_after_trade).abs() < 1e-9);
    assert!(state.ledger.position(alice, market).is_empty());
    assert!(state.ledger.position(bob, market).is_empty());

    // Unresolve: both balances and positions return exactly.
    let data = api::unresolve_market(&mut state, market).unwrap();
    assert_eq!(data["reversedRows"].as_u64().unwrap(), 2);
    assert!((state.ledger.current_balance(alice) - 9_487.51).abs() < 0.005);
    assert!((state.ledger.current_balance(bob) - bob_after_trade).abs() < 1e-9);
    assert_eq!(state.ledger.position(alice, market).yes, 10.0);
    assert_eq!(state.ledger.position(bob, market).no, 5.0);

    // Trading stays closed after an unresolve until explicitly reopened.
    let err = api::execute_trade(
        &mut state,
        &TradeParams {
            user_id: Some(alice),
            market_id: Some(market),
            share_type: "Yes".to_string(),
            quantity: 1.0,
            user_email: String::new(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ApiError::Trade(TradeError::MarketNotOpen(_))));

    // The market is Closed after the unresolve, so resolving to the
    // opposite outcome settles the restored positions directly.
    let data = api::resolve_market(&mut state, market, "No").unwrap();
    assert_eq!(data["settledRows"].as_u64().unwrap(), 2);
    assert!((state.ledger.current_balance(alice) - 9_487.51).abs() < 0.005);
    assert!((state.ledger.current_balance(bob) - (bob_after_trade + 500.0)).abs() < 0.005);
}

#[test]
fn flipping_a_resolved_market_unresolves_first() {
    let mut state = fresh_state();
    let alice = register(&mut state, "alice");
    let bob = register(&mut state, "bob");
    let market = create_market(&mut state, "Will it rain?", 100.0);

    trade(&mut state, alice, market, "Yes", 10.0);
    trade(&mut state, bob, market, "No", 10.0);
    let alice_traded = state.ledger.current_balance(alice);
    let bob_traded = state.ledger.current_balance(bob);

    api::resolve_market(&mut state, market, "Yes").unwrap();
    assert!((state.ledger.current_balance(alice) - (alice_traded + 1_000.0)).abs() < 1e-9);

    // Direct flip Resolved Yes -> Resolved No: reversal rows first, then a
    // fresh settlement; Alice's payout is clawed back, Bob is paid once.
    let data = api::resolve_market(&mut state, market, "No").unwrap();
    assert_eq!(data["reversedRows"].as_u64().unwrap(), 2);
    assert_eq!(data["settledRows"].as_u64().unwrap(), 2);

    assert!((state.ledger.current_balance(alice) - alice_traded).abs() < 1e-9);
    assert!((state.ledger.current_balance(bob) - (bob_traded + 1_000.0)).abs() < 1e-9);

    // Flipping twice more still never double-pays.
    api::resolve_market(&mut state, market, "Yes").unwrap();
    assert!((state.ledger.current_balance(alice) - (alice_traded + 1_000.0)).abs() < 1e-9);
    assert!((state.ledger.current_balance(bob) - bob_traded).abs() < 1e-9);
}

#[test]
fn selling_more_than_owned_fails_and_writes_nothing() {
    let mut state = fresh_state();
    let alice = register(&mut state, "alice");
    let market = create_market(&mut state, "Will it rain?", 100.0);

    trade(&mut state, alice, market, "Yes", 10.0);
    let rows_before = state.ledger.len();

    let err = api::execute_trade(
        &mut state,
        &TradeParams {
            user_id: Some(alice),
            market_id: Some(market),
            share_type: "Yes".to_string(),
            quantity: -11.0,
            user_email: String::new(),
        },
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ApiError::Trade(TradeError::InsufficientShares { .. })
    ));
    assert_eq!(state.ledger.len(), rows_before);
}

#[test]
fn zero_quantity_trade_is_a_successful_noop() {
    let mut state = fresh_state();
    let alice = register(&mut state, "alice");
    let market = create_market(&mut state, "Will it rain?", 100.0);

    let data = trade(&mut state, alice, market, "Yes", 0.0);
    assert!(data["receipt"].is_null());
    assert!(state.ledger.is_empty());
    assert_eq!(data["newBalance"].as_f64().unwrap(), 10_000.0);
}

#[test]
fn broke_user_cannot_buy() {
    let mut config = EngineConfig::for_tests();
    config.initial_balance = 0.0;
    let mut state = AppState::in_memory(config);

    let alice = register(&mut state, "alice");
    let market = create_market(&mut state, "Will it rain?", 100.0);

    let err = api::execute_trade(
        &mut state,
        &TradeParams {
            user_id: Some(alice),
            market_id: Some(market),
            share_type: "Yes".to_string(),
            quantity: 1.0,
            user_email: String::new(),
        },
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ApiError::Trade(TradeError::InsufficientBalance { .. })
    ));
    assert!(state.ledger.is_empty());
}

#[test]
fn selling_after_a_price_rise_books_a_profit() {
    let mut state = fresh_state();
    let alice = register(&mut state, "alice");
    let bob = register(&mut state, "bob");
    let market = create_market(&mut state, "Will it rain?", 100.0);

    trade(&mut state, alice, market, "Yes", 10.0);
    let alice_cost = 10_000.0 - state.ledger.current_balance(alice);

    // Bob pushes the Yes price up.
    trade(&mut state, bob, market, "Yes", 50.0);

    // Alice sells into the rally for more than she paid.
    let data = trade(&mut state, alice, market, "Yes", -10.0);
    let proceeds = -data["receipt"]["totalCost"].as_f64().unwrap();
    assert!(proceeds > alice_cost);
    assert!(state.ledger.current_balance(alice) > 10_000.0);
}

#[test]
fn preview_matches_subsequent_execution() {
    let mut state = fresh_state();
    let alice = register(&mut state, "alice");
    let market = create_market(&mut state, "Will it rain?", 100.0);

    let preview = api::preview_trade(&state, "alice", market, "No", 7.0).unwrap();
    let quoted_cost = preview["trade"]["cost"].as_f64().unwrap();
    let quoted_balance = preview["simulation"]["newBalance"].as_f64().unwrap();
    let quoted_p_yes = preview["simulation"]["newPYes"].as_f64().unwrap();

    let data = trade(&mut state, alice, market, "No", 7.0);
    assert!((data["receipt"]["totalCost"].as_f64().unwrap() - quoted_cost).abs() < 1e-9);
    assert!((data["newBalance"].as_f64().unwrap() - quoted_balance).abs() < 1e-9);
    assert!((data["pYes"].as_f64().unwrap() - quoted_p_yes).abs() < 1e-9);
}

#[test]
fn portfolio_reflects_positions_across_markets() {
    let mut state = fresh_state();
    let alice = register(&mut state, "alice");
    let rain = create_market(&mut state, "Will it rain?", 100.0);
    let launch = create_market(&mut state, "Will the launch slip?", 50.0);

    trade(&mut state, alice, rain, "Yes", 10.0);
    trade(&mut state, alice, launch, "No", 4.0);

    let data = api::get_balance(&state, "alice").unwrap();
    let holdings = data["holdings"].as_array().unwrap();
    assert_eq!(holdings.len(), 2);
    let total_value = data["marketValue"].as_f64().unwrap();
    assert!(total_value > 0.0);
    assert!(
        (data["netWorth"].as_f64().unwrap()
            - (data["balance"].as_f64().unwrap() + total_value))
            .abs()
            < 0.01
    );
}
