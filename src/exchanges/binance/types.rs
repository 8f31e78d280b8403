use crate::core::types::FlatRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One event from the authenticated user-data stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    MarginCall(MarginCall),
    OrderUpdate(OrderUpdate),
    AccountUpdate(AccountUpdate),
    /// Event type not handled by the market's classifier
    Unknown(String),
}

impl UserEvent {
    pub fn event_type(&self) -> &str {
        match self {
            Self::MarginCall(_) => "MARGIN_CALL",
            Self::OrderUpdate(_) => "ORDER_TRADE_UPDATE",
            Self::AccountUpdate(_) => "ACCOUNT_UPDATE",
            Self::Unknown(event_type) => event_type,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginCall {
    pub event_time: String,
    pub cross_wallet_balance: String,
    /// One record per position at risk
    pub positions: Vec<FlatRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub event_time: String,
    pub transaction_time: String,
    pub order: FlatRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub event_time: String,
    pub transaction_time: String,
    pub reason: String,
    /// Balance records keyed by asset
    pub balances: BTreeMap<String, FlatRecord>,
    pub positions: Vec<FlatRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    StopLossLimit,
    TakeProfit,
    TakeProfitLimit,
    StopMarket,
    TakeProfitMarket,
}

impl OrderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::StopLoss => "STOP_LOSS",
            Self::StopLossLimit => "STOP_LOSS_LIMIT",
            Self::TakeProfit => "TAKE_PROFIT",
            Self::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
            Self::StopMarket => "STOP_MARKET",
            Self::TakeProfitMarket => "TAKE_PROFIT_MARKET",
        }
    }

    pub const fn needs_time_in_force(self) -> bool {
        matches!(
            self,
            Self::Limit | Self::StopLossLimit | Self::TakeProfitLimit
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GTC,
    IOC,
    FOK,
}

impl TimeInForce {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GTC => "GTC",
            Self::IOC => "IOC",
            Self::FOK => "FOK",
        }
    }
}

/// Parameters for a new order. Quantities and prices are passed through as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: String,
    pub price: Option<String>,
    pub stop_price: Option<String>,
    pub time_in_force: Option<TimeInForce>,
    pub client_order_id: Option<String>,
    pub reduce_only: Option<bool>,
}

impl NewOrder {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity: quantity.into(),
            price: None,
            stop_price: None,
            time_in_force: None,
            client_order_id: None,
            reduce_only: None,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: impl Into<String>,
        price: impl Into<String>,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price.into()),
            time_in_force: Some(TimeInForce::GTC),
            ..Self::market(symbol, side, quantity)
        }
    }

    #[must_use]
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_stop_price(mut self, stop_price: impl Into<String>) -> Self {
        self.stop_price = Some(stop_price.into());
        self
    }

    #[must_use]
    pub const fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = Some(tif);
        self
    }

    #[must_use]
    pub const fn reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = Some(reduce_only);
        self
    }

    /// Query parameters in the order Binance documents them
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", self.symbol.to_uppercase()),
            ("side", self.side.as_str().to_string()),
            ("type", self.order_type.as_str().to_string()),
        ];

        if let Some(tif) = self.time_in_force {
            params.push(("timeInForce", tif.as_str().to_string()));
        } else if self.order_type.needs_time_in_force() {
            params.push(("timeInForce", TimeInForce::GTC.as_str().to_string()));
        }

        params.push(("quantity", self.quantity.clone()));

        if let Some(price) = &self.price {
            params.push(("price", price.clone()));
        }
        if let Some(stop_price) = &self.stop_price {
            params.push(("stopPrice", stop_price.clone()));
        }
        if let Some(id) = &self.client_order_id {
            params.push(("newClientOrderId", id.clone()));
        }
        if let Some(reduce_only) = self.reduce_only {
            params.push(("reduceOnly", reduce_only.to_string()));
        }

        params
    }
}

/// Identifies an order to cancel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    OrderId(u64),
    ClientOrderId(String),
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrderId(id) => write!(f, "{}", id),
            Self::ClientOrderId(id) => f.write_str(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_order_params() {
        let order = NewOrder::limit("btcusdt", OrderSide::Buy, "0.001", "30000.10")
            .with_client_order_id("my-order");
        let params = order.to_params();

        let rendered: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        assert_eq!(
            rendered,
            vec![
                "symbol=BTCUSDT",
                "side=BUY",
                "type=LIMIT",
                "timeInForce=GTC",
                "quantity=0.001",
                "price=30000.10",
                "newClientOrderId=my-order",
            ]
        );
    }

    #[test]
    fn test_market_order_has_no_time_in_force() {
        let params = NewOrder::market("ETHUSDT", OrderSide::Sell, "1").to_params();
        assert!(params.iter().all(|(k, _)| *k != "timeInForce"));
        assert!(params.iter().all(|(k, _)| *k != "price"));
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(
            UserEvent::OrderUpdate(OrderUpdate::default()).event_type(),
            "ORDER_TRADE_UPDATE"
        );
        assert_eq!(UserEvent::Unknown("listenKeyExpired".into()).event_type(), "listenKeyExpired");
    }
}
