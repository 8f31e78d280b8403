use crate::core::config::{CallType, RestSettings};
use crate::core::errors::ExchangeError;
use crate::core::extractor::{extract_listed, value_text};
use crate::core::kernel::{RequestAuth, RestClient};
use crate::core::types::{FlatRecord, KlineInterval};
use crate::exchanges::binance::endpoints::MarketProfile;
use crate::exchanges::binance::types::{NewOrder, OrderRef};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

const ORDER_FIELDS: &[&str] = &[
    "symbol",
    "orderId",
    "orderListId",
    "clientOrderId",
    "transactTime",
    "updateTime",
    "price",
    "avgPrice",
    "origQty",
    "executedQty",
    "cummulativeQuoteQty",
    "cumQuote",
    "status",
    "timeInForce",
    "type",
    "side",
    "stopPrice",
    "reduceOnly",
    "positionSide",
];

const ACCOUNT_FIELDS: &[&str] = &[
    "makerCommission",
    "takerCommission",
    "canTrade",
    "canWithdraw",
    "canDeposit",
    "accountType",
    "feeTier",
    "totalWalletBalance",
    "totalUnrealizedProfit",
    "totalMarginBalance",
    "totalInitialMargin",
    "totalMaintMargin",
    "availableBalance",
    "maxWithdrawAmount",
    "updateTime",
];

const FUTURES_BALANCE_FIELDS: &[&str] = &[
    "accountAlias",
    "asset",
    "balance",
    "crossWalletBalance",
    "crossUnPnl",
    "availableBalance",
    "maxWithdrawAmount",
    "updateTime",
];

const SPOT_BALANCE_FIELDS: &[&str] = &["asset", "free", "locked"];

const TAKER_VOLUME_FIELDS: &[&str] = &["buySellRatio", "buyVol", "sellVol", "timestamp"];

fn records(value: &Value, fields: &[&str]) -> Result<Vec<FlatRecord>, ExchangeError> {
    let items = value
        .as_array()
        .ok_or_else(|| ExchangeError::Other(format!("Expected JSON array, got {}", value)))?;
    Ok(items.iter().map(|item| extract_listed(item, fields)).collect())
}

/// Kline rows are positional arrays; every cell becomes text.
fn kline_rows(value: &Value) -> Result<Vec<Vec<String>>, ExchangeError> {
    let rows = value
        .as_array()
        .ok_or_else(|| ExchangeError::Other(format!("Expected kline array, got {}", value)))?;

    Ok(rows
        .iter()
        .filter_map(Value::as_array)
        .map(|row| row.iter().map(|cell| value_text(cell).unwrap_or_default()).collect())
        .collect())
}

/// Optional time/limit window shared by list endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryWindow {
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub limit: Option<u32>,
}

impl QueryWindow {
    pub const fn limit(limit: u32) -> Self {
        Self {
            start_time: None,
            end_time: None,
            limit: Some(limit),
        }
    }

    #[must_use]
    pub const fn between(mut self, start_time: u64, end_time: u64) -> Self {
        self.start_time = Some(start_time);
        self.end_time = Some(end_time);
        self
    }

    fn push_params(&self, params: &mut Vec<(&'static str, String)>) {
        if let Some(start_time) = self.start_time {
            params.push(("startTime", start_time.to_string()));
        }
        if let Some(end_time) = self.end_time {
            params.push(("endTime", end_time.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
    }
}

/// One-shot REST calls of a market profile.
///
/// Responses are reduced to allow-listed fields rendered as text.
pub struct BinanceRest<R: RestClient> {
    client: R,
    profile: Arc<MarketProfile>,
    settings: RestSettings,
}

impl<R: RestClient> BinanceRest<R> {
    pub fn new(client: R, profile: Arc<MarketProfile>, settings: RestSettings) -> Self {
        Self {
            client,
            profile,
            settings,
        }
    }

    pub fn client(&self) -> &R {
        &self.client
    }

    pub fn profile(&self) -> &MarketProfile {
        &self.profile
    }

    pub fn settings(&self) -> &RestSettings {
        &self.settings
    }

    fn path(&self, call: CallType) -> Result<&'static str, ExchangeError> {
        self.profile.endpoints.path(call).ok_or_else(|| {
            ExchangeError::NotSupported(format!(
                "{:?} is not available on {}",
                call,
                self.profile.kind.name()
            ))
        })
    }

    fn signed(&self, call: CallType) -> RequestAuth {
        RequestAuth::Signed {
            recv_window: self.settings.recv_window(call),
        }
    }

    /// Place an order and return the acknowledged order record
    #[instrument(skip(self, order), fields(market = self.profile.kind.name(), symbol = %order.symbol))]
    pub async fn new_order(&self, order: &NewOrder) -> Result<FlatRecord, ExchangeError> {
        let path = self.path(CallType::NewOrder)?;
        let params = order.to_params();
        let response = self
            .client
            .post(path, &params, self.signed(CallType::NewOrder))
            .await?;
        Ok(extract_listed(&response, ORDER_FIELDS))
    }

    #[instrument(skip(self), fields(market = self.profile.kind.name()))]
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order: &OrderRef,
    ) -> Result<FlatRecord, ExchangeError> {
        let path = self.path(CallType::CancelOrder)?;
        let mut params = vec![("symbol", symbol.to_uppercase())];
        match order {
            OrderRef::OrderId(id) => params.push(("orderId", id.to_string())),
            OrderRef::ClientOrderId(id) => params.push(("origClientOrderId", id.clone())),
        }

        let response = self
            .client
            .delete(path, &params, self.signed(CallType::CancelOrder))
            .await?;
        Ok(extract_listed(&response, ORDER_FIELDS))
    }

    /// All orders of a symbol, oldest first
    #[instrument(skip(self), fields(market = self.profile.kind.name()))]
    pub async fn all_orders(
        &self,
        symbol: &str,
        window: QueryWindow,
    ) -> Result<Vec<FlatRecord>, ExchangeError> {
        let path = self.path(CallType::AllOrders)?;
        let mut params = vec![("symbol", symbol.to_uppercase())];
        window.push_params(&mut params);

        let response = self
            .client
            .get(path, &params, self.signed(CallType::AllOrders))
            .await?;
        records(&response, ORDER_FIELDS)
    }

    #[instrument(skip(self), fields(market = self.profile.kind.name()))]
    pub async fn account_information(&self) -> Result<FlatRecord, ExchangeError> {
        let path = self.path(CallType::AccountInformation)?;
        let response = self
            .client
            .get(path, &[], self.signed(CallType::AccountInformation))
            .await?;
        Ok(extract_listed(&response, ACCOUNT_FIELDS))
    }

    /// Per-asset balances. Spot derives them from the account call.
    #[instrument(skip(self), fields(market = self.profile.kind.name()))]
    pub async fn account_balance(&self) -> Result<Vec<FlatRecord>, ExchangeError> {
        if let Some(path) = self.profile.endpoints.path(CallType::AccountBalance) {
            let response = self
                .client
                .get(path, &[], self.signed(CallType::AccountBalance))
                .await?;
            return records(&response, FUTURES_BALANCE_FIELDS);
        }

        let path = self.path(CallType::AccountInformation)?;
        let response = self
            .client
            .get(path, &[], self.signed(CallType::AccountBalance))
            .await?;
        match response.get("balances") {
            Some(balances) => records(balances, SPOT_BALANCE_FIELDS),
            None => Ok(Vec::new()),
        }
    }

    /// Candles as positional rows: open time, open, high, low, close, volume, ...
    #[instrument(skip(self), fields(market = self.profile.kind.name()))]
    pub async fn klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        window: QueryWindow,
    ) -> Result<Vec<Vec<String>>, ExchangeError> {
        let path = self.path(CallType::Klines)?;
        let mut params = vec![
            ("symbol", symbol.to_uppercase()),
            ("interval", interval.as_str().to_string()),
        ];
        window.push_params(&mut params);

        let response = self.client.get(path, &params, RequestAuth::None).await?;
        kline_rows(&response)
    }

    /// Taker buy/sell volume ratio. USD-M futures only.
    #[instrument(skip(self), fields(market = self.profile.kind.name()))]
    pub async fn taker_buy_sell_volume(
        &self,
        symbol: &str,
        period: KlineInterval,
        window: QueryWindow,
    ) -> Result<Vec<FlatRecord>, ExchangeError> {
        let path = self.path(CallType::TakerBuySellVolume)?;
        let mut params = vec![
            ("symbol", symbol.to_uppercase()),
            ("period", period.as_str().to_string()),
        ];
        window.push_params(&mut params);

        let response = self.client.get(path, &params, RequestAuth::None).await?;
        records(&response, TAKER_VOLUME_FIELDS)
    }

    /// Open a user-data stream and return its listen key
    #[instrument(skip(self), fields(market = self.profile.kind.name()))]
    pub async fn create_listen_key(&self) -> Result<String, ExchangeError> {
        let path = self.path(CallType::ListenKey)?;
        let response = self.client.post(path, &[], RequestAuth::ApiKey).await?;

        response
            .get("listenKey")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ExchangeError::Other(format!("Listen key missing from response: {}", response))
            })
    }

    /// Extend the validity of a listen key
    #[instrument(skip(self, listen_key), fields(market = self.profile.kind.name()))]
    pub async fn renew_listen_key(&self, listen_key: &str) -> Result<(), ExchangeError> {
        let path = self.path(CallType::ListenKey)?;
        let params = self.listen_key_params(listen_key);
        self.client.put(path, &params, RequestAuth::ApiKey).await?;
        Ok(())
    }

    #[instrument(skip(self, listen_key), fields(market = self.profile.kind.name()))]
    pub async fn close_listen_key(&self, listen_key: &str) -> Result<(), ExchangeError> {
        let path = self.path(CallType::ListenKey)?;
        let params = self.listen_key_params(listen_key);
        self.client.delete(path, &params, RequestAuth::ApiKey).await?;
        Ok(())
    }

    fn listen_key_params(&self, listen_key: &str) -> Vec<(&'static str, String)> {
        if self.profile.listen_key_in_query {
            vec![("listenKey", listen_key.to_string())]
        } else {
            Vec::new()
        }
    }

    /// Exchange clock in milliseconds
    #[instrument(skip(self), fields(market = self.profile.kind.name()))]
    pub async fn server_time(&self) -> Result<u64, ExchangeError> {
        let path = self.path(CallType::ServerTime)?;
        let response = self.client.get(path, &[], RequestAuth::None).await?;

        response
            .get("serverTime")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                ExchangeError::Other(format!("Server time missing from response: {}", response))
            })
    }
}
