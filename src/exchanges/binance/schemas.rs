//! Field schemas of the market-data streams.
//!
//! Each schema is built once per `Market` and shared by every session of
//! that stream kind.

use crate::core::types::JsonKeys;
use std::sync::Arc;

/// Key that groups the elements of array streams
pub const SYMBOL_KEY: &str = "s";

pub fn mini_ticker_keys() -> JsonKeys {
    JsonKeys::new().scalars(&["e", "E", "s", "c", "o", "h", "l", "v", "q"])
}

pub fn all_mini_tickers_keys() -> JsonKeys {
    JsonKeys::new().nested(SYMBOL_KEY, &["E", "s", "c", "o", "h", "l", "v", "q"])
}

pub fn book_ticker_keys() -> JsonKeys {
    JsonKeys::new().scalars(&["u", "s", "b", "B", "a", "A"])
}

pub fn kline_keys() -> JsonKeys {
    JsonKeys::new().scalars(&["e", "E", "s"]).nested(
        "k",
        &["t", "T", "s", "i", "o", "c", "h", "l", "v", "n", "x", "q", "V", "Q"],
    )
}

pub fn all_mark_prices_keys() -> JsonKeys {
    JsonKeys::new().nested(SYMBOL_KEY, &["E", "s", "p", "i", "P", "r", "T"])
}

/// The shared schema set of one market
#[derive(Debug, Clone)]
pub struct StreamSchemas {
    pub mini_ticker: Arc<JsonKeys>,
    pub all_mini_tickers: Arc<JsonKeys>,
    pub book_ticker: Arc<JsonKeys>,
    pub kline: Arc<JsonKeys>,
    pub all_mark_prices: Arc<JsonKeys>,
}

impl Default for StreamSchemas {
    fn default() -> Self {
        Self {
            mini_ticker: Arc::new(mini_ticker_keys()),
            all_mini_tickers: Arc::new(all_mini_tickers_keys()),
            book_ticker: Arc::new(book_ticker_keys()),
            kline: Arc::new(kline_keys()),
            all_mark_prices: Arc::new(all_mark_prices_keys()),
        }
    }
}
