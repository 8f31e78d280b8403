pub mod core;
pub mod exchanges;

pub use crate::core::config::{ApiAccess, CallType, ExchangeConfig, RestSettings};
pub use crate::core::errors::ExchangeError;
pub use crate::core::handler::MarketCallback;
pub use crate::core::types::*;
pub use crate::exchanges::binance::{Market, MarketKind, UserEvent};
