pub mod builder;
pub mod endpoints;
pub mod market;
pub mod rest;
pub mod schemas;
pub mod types;
pub mod user_data;

// Re-export main types for easier importing
pub use builder::{build_market, build_market_with, build_spot, build_usd_futures};
pub use endpoints::{EventClassifier, MarketKind, MarketProfile};
pub use market::Market;
pub use rest::{BinanceRest, QueryWindow};
pub use types::{
    AccountUpdate, MarginCall, NewOrder, OrderRef, OrderSide, OrderType, OrderUpdate, TimeInForce,
    UserEvent,
};
pub use user_data::{classify_futures_event, classify_spot_event, UserDataHandler};
