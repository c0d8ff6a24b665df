// Almanac ledger-derived prediction market
// Exports all modules for use as a library crate

pub mod api;
pub mod app_state;
pub mod config;
pub mod directory;
pub mod exchange;
pub mod handlers;
pub mod ledger;
pub mod market;
pub mod notify;
pub mod pricing;

pub use app_state::{AppState, SharedState};
pub use config::{EngineConfig, DEFAULT_INITIAL_BALANCE};
pub use directory::{UserDirectory, UserProfile};
pub use exchange::resolution::{change_status, resolve, unresolve, StatusChange};
pub use exchange::{execute, TradeError, TradeOutcome, TradeReceipt, TradeRequest};
pub use ledger::{
    Ledger, LedgerError, MarketShares, SharePosition, ShareType, Transaction, TransactionDraft,
    TxType,
};
pub use market::{Market, MarketBook, MarketStatus, Resolution};
pub use notify::{Announcement, Notifier};
pub use pricing::{
    liquidation_proceeds, no_price, preview, round_cents, trade_cost, yes_price, TradePreview,
    PRICE_SCALE,
};
