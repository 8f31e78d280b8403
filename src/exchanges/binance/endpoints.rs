use crate::core::config::CallType;
use crate::core::types::KlineInterval;
use crate::exchanges::binance::user_data::{classify_futures_event, classify_spot_event};
use crate::exchanges::binance::types::UserEvent;
use serde_json::Value;
use std::time::Duration;

pub type EventClassifier = fn(&Value) -> UserEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketKind {
    Spot,
    SpotTestnet,
    UsdFutures,
    UsdFuturesTestnet,
}

impl MarketKind {
    pub const fn is_futures(self) -> bool {
        matches!(self, Self::UsdFutures | Self::UsdFuturesTestnet)
    }

    pub const fn is_testnet(self) -> bool {
        matches!(self, Self::SpotTestnet | Self::UsdFuturesTestnet)
    }

    /// The testnet counterpart of a production market, and vice versa
    pub const fn with_testnet(self, testnet: bool) -> Self {
        match (self.is_futures(), testnet) {
            (false, false) => Self::Spot,
            (false, true) => Self::SpotTestnet,
            (true, false) => Self::UsdFutures,
            (true, true) => Self::UsdFuturesTestnet,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Spot => "binance",
            Self::SpotTestnet => "binance_testnet",
            Self::UsdFutures => "binance_usdm",
            Self::UsdFuturesTestnet => "binance_usdm_testnet",
        }
    }
}

/// REST paths of one market family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTable {
    pub order: &'static str,
    pub all_orders: &'static str,
    pub account: &'static str,
    /// Spot has no balance endpoint; balances come from the account call
    pub balance: Option<&'static str>,
    pub klines: &'static str,
    pub taker_buy_sell_volume: Option<&'static str>,
    pub listen_key: &'static str,
    pub time: &'static str,
}

impl EndpointTable {
    pub const SPOT: Self = Self {
        order: "/api/v3/order",
        all_orders: "/api/v3/allOrders",
        account: "/api/v3/account",
        balance: None,
        klines: "/api/v3/klines",
        taker_buy_sell_volume: None,
        listen_key: "/api/v3/userDataStream",
        time: "/api/v3/time",
    };

    pub const USD_FUTURES: Self = Self {
        order: "/fapi/v1/order",
        all_orders: "/fapi/v1/allOrders",
        account: "/fapi/v2/account",
        balance: Some("/fapi/v2/balance"),
        klines: "/fapi/v1/klines",
        taker_buy_sell_volume: Some("/futures/data/takerlongshortRatio"),
        listen_key: "/fapi/v1/listenKey",
        time: "/fapi/v1/time",
    };

    pub fn path(&self, call: CallType) -> Option<&'static str> {
        match call {
            CallType::NewOrder | CallType::CancelOrder => Some(self.order),
            CallType::AllOrders => Some(self.all_orders),
            CallType::AccountInformation => Some(self.account),
            CallType::AccountBalance => self.balance,
            CallType::Klines => Some(self.klines),
            CallType::TakerBuySellVolume => self.taker_buy_sell_volume,
            CallType::ListenKey => Some(self.listen_key),
            CallType::ServerTime => Some(self.time),
        }
    }
}

/// Everything that distinguishes one market variant from another.
#[derive(Debug, Clone)]
pub struct MarketProfile {
    pub kind: MarketKind,
    pub rest_base_url: String,
    pub ws_base_url: String,
    pub endpoints: EndpointTable,
    pub keepalive_interval: Duration,
    /// Spot renews by `listenKey` query parameter; futures renews the caller's key implicitly
    pub listen_key_in_query: bool,
    pub classify_event: EventClassifier,
}

const KEEPALIVE_PRODUCTION: Duration = Duration::from_secs(45 * 60);
const KEEPALIVE_TESTNET: Duration = Duration::from_secs(45);

impl MarketProfile {
    pub fn new(kind: MarketKind) -> Self {
        let (rest_base_url, ws_base_url) = match kind {
            MarketKind::Spot => ("https://api.binance.com", "wss://stream.binance.com:9443"),
            MarketKind::SpotTestnet => (
                "https://testnet.binance.vision",
                "wss://testnet.binance.vision",
            ),
            MarketKind::UsdFutures => ("https://fapi.binance.com", "wss://fstream.binance.com"),
            MarketKind::UsdFuturesTestnet => (
                "https://testnet.binancefuture.com",
                "wss://stream.binancefuture.com",
            ),
        };

        let (endpoints, classify_event): (EndpointTable, EventClassifier) = if kind.is_futures() {
            (
                EndpointTable::USD_FUTURES,
                classify_futures_event as EventClassifier,
            )
        } else {
            (EndpointTable::SPOT, classify_spot_event as EventClassifier)
        };

        Self {
            kind,
            rest_base_url: rest_base_url.to_string(),
            ws_base_url: ws_base_url.to_string(),
            endpoints,
            keepalive_interval: if kind.is_testnet() {
                KEEPALIVE_TESTNET
            } else {
                KEEPALIVE_PRODUCTION
            },
            listen_key_in_query: !kind.is_futures(),
            classify_event,
        }
    }

    #[must_use]
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// `{ws_base}/ws/{stream}`
    pub fn stream_url(&self, stream: &str) -> String {
        format!("{}/ws/{}", self.ws_base_url.trim_end_matches('/'), stream)
    }
}

pub fn all_mini_tickers_stream() -> String {
    "!miniTicker@arr".to_string()
}

pub fn mini_ticker_stream(symbol: &str) -> String {
    format!("{}@miniTicker", symbol.to_lowercase())
}

pub fn book_ticker_stream(symbol: &str) -> String {
    format!("{}@bookTicker", symbol.to_lowercase())
}

pub fn kline_stream(symbol: &str, interval: KlineInterval) -> String {
    format!("{}@kline_{}", symbol.to_lowercase(), interval.as_str())
}

pub fn all_mark_prices_stream() -> String {
    "!markPrice@arr@1s".to_string()
}
