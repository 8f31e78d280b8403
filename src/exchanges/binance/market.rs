use crate::core::config::RestSettings;
use crate::core::errors::ExchangeError;
use crate::core::handler::{ExtractHandler, MarketCallback};
use crate::core::kernel::{IntervalTimer, ReqwestRest, RestClient, WsConfig};
use crate::core::registry::{Companion, Registry};
use crate::core::types::{FlatRecord, JsonKeys, KlineInterval, MonitorToken, MultiRecord};
use crate::exchanges::binance::endpoints::{
    all_mark_prices_stream, all_mini_tickers_stream, book_ticker_stream, kline_stream,
    mini_ticker_stream, MarketKind, MarketProfile,
};
use crate::exchanges::binance::rest::BinanceRest;
use crate::exchanges::binance::schemas::{StreamSchemas, SYMBOL_KEY};
use crate::exchanges::binance::types::UserEvent;
use crate::exchanges::binance::user_data::{UserCallback, UserDataHandler};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

struct UserStream {
    token: MonitorToken,
    listen_key: String,
}

/// User-data slot. `Opening` is held while the listen key is created and
/// the stream connects, without keeping the lock across those calls.
#[derive(Default)]
enum UserSlot {
    #[default]
    Idle,
    Opening,
    Active(UserStream),
}

/// Returns an `Opening` slot to `Idle` unless the open completed.
struct OpeningGuard<'a> {
    slot: &'a Mutex<UserSlot>,
    armed: bool,
}

impl OpeningGuard<'_> {
    fn commit(mut self, stream: UserStream) {
        *lock_slot(self.slot) = UserSlot::Active(stream);
        self.armed = false;
    }
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut slot = lock_slot(self.slot);
            if matches!(*slot, UserSlot::Opening) {
                *slot = UserSlot::Idle;
            }
        }
    }
}

fn lock_slot(slot: &Mutex<UserSlot>) -> MutexGuard<'_, UserSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Entry point for one market: streaming monitors plus REST calls.
///
/// Monitors are owned by an internal registry; callers keep only the
/// returned [`MonitorToken`]. At most one user-data stream is active at a time.
pub struct Market<R: RestClient + 'static = ReqwestRest> {
    profile: Arc<MarketProfile>,
    rest: Arc<BinanceRest<R>>,
    registry: Registry,
    schemas: StreamSchemas,
    user_stream: Mutex<UserSlot>,
}

impl<R: RestClient + 'static> Market<R> {
    pub fn new(profile: MarketProfile, client: R, settings: RestSettings, ws_config: WsConfig) -> Self {
        let profile = Arc::new(profile);
        Self {
            rest: Arc::new(BinanceRest::new(client, profile.clone(), settings)),
            profile,
            registry: Registry::new(ws_config),
            schemas: StreamSchemas::default(),
            user_stream: Mutex::new(UserSlot::Idle),
        }
    }

    pub fn kind(&self) -> MarketKind {
        self.profile.kind
    }

    pub fn profile(&self) -> &MarketProfile {
        &self.profile
    }

    /// REST calls of this market
    pub fn rest(&self) -> &BinanceRest<R> {
        &self.rest
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn schemas(&self) -> &StreamSchemas {
        &self.schemas
    }

    /// Subscribe to any stream of this market with a caller-supplied schema.
    ///
    /// `array_key` groups the elements of array frames and is ignored for
    /// flat callbacks.
    #[instrument(skip(self, schema, callback), fields(market = self.profile.kind.name()))]
    pub async fn monitor_stream(
        &self,
        stream: &str,
        schema: Arc<JsonKeys>,
        array_key: Option<&str>,
        callback: MarketCallback,
    ) -> Result<MonitorToken, ExchangeError> {
        let uri = self.profile.stream_url(stream);
        let handler = ExtractHandler::new(schema, array_key.map(str::to_string), callback);
        self.registry.create_monitor(&uri, Arc::new(handler)).await
    }

    /// Mini tickers of every symbol, grouped by symbol
    pub async fn monitor_mini_tickers<F>(&self, callback: F) -> Result<MonitorToken, ExchangeError>
    where
        F: Fn(MultiRecord) + Send + Sync + 'static,
    {
        self.monitor_stream(
            &all_mini_tickers_stream(),
            self.schemas.all_mini_tickers.clone(),
            Some(SYMBOL_KEY),
            MarketCallback::multi(callback),
        )
        .await
    }

    pub async fn monitor_mini_ticker<F>(
        &self,
        symbol: &str,
        callback: F,
    ) -> Result<MonitorToken, ExchangeError>
    where
        F: Fn(FlatRecord) + Send + Sync + 'static,
    {
        self.monitor_stream(
            &mini_ticker_stream(symbol),
            self.schemas.mini_ticker.clone(),
            None,
            MarketCallback::flat(callback),
        )
        .await
    }

    pub async fn monitor_book_ticker<F>(
        &self,
        symbol: &str,
        callback: F,
    ) -> Result<MonitorToken, ExchangeError>
    where
        F: Fn(FlatRecord) + Send + Sync + 'static,
    {
        self.monitor_stream(
            &book_ticker_stream(symbol),
            self.schemas.book_ticker.clone(),
            None,
            MarketCallback::flat(callback),
        )
        .await
    }

    /// Candle updates; the candle fields arrive under the `"k"` key
    pub async fn monitor_klines<F>(
        &self,
        symbol: &str,
        interval: KlineInterval,
        callback: F,
    ) -> Result<MonitorToken, ExchangeError>
    where
        F: Fn(MultiRecord) + Send + Sync + 'static,
    {
        self.monitor_stream(
            &kline_stream(symbol, interval),
            self.schemas.kline.clone(),
            None,
            MarketCallback::multi(callback),
        )
        .await
    }

    /// Mark prices of every symbol, once per second. USD-M futures only.
    pub async fn monitor_mark_prices<F>(&self, callback: F) -> Result<MonitorToken, ExchangeError>
    where
        F: Fn(MultiRecord) + Send + Sync + 'static,
    {
        if !self.profile.kind.is_futures() {
            return Err(ExchangeError::NotSupported(format!(
                "mark price stream is not available on {}",
                self.profile.kind.name()
            )));
        }

        self.monitor_stream(
            &all_mark_prices_stream(),
            self.schemas.all_mark_prices.clone(),
            Some(SYMBOL_KEY),
            MarketCallback::multi(callback),
        )
        .await
    }

    /// Open the authenticated account stream.
    ///
    /// Obtains a listen key, connects to it and renews the key on the
    /// profile's keepalive period until the monitor is cancelled. A previous
    /// stream whose connection already ended is torn down first.
    #[instrument(skip(self, callback), fields(market = self.profile.kind.name()))]
    pub async fn monitor_user_data<F>(&self, callback: F) -> Result<MonitorToken, ExchangeError>
    where
        F: Fn(UserEvent) + Send + Sync + 'static,
    {
        let (guard, stale) = self.claim_user_slot().await?;
        if let Some(stale) = stale {
            info!(token = %stale.token, "replacing ended user-data stream");
            self.registry.cancel_monitor(stale.token).await;
            self.close_listen_key(&stale.listen_key).await;
        }

        let listen_key = self.rest.create_listen_key().await?;
        let uri = self.profile.stream_url(&listen_key);
        let callback: UserCallback = Arc::new(callback);
        let handler = UserDataHandler::new(self.profile.classify_event, callback);

        match self
            .registry
            .create_monitor_with(&uri, Arc::new(handler), Some(self.keepalive(listen_key.clone())))
            .await
        {
            Ok(token) => {
                info!(token = %token, "user-data stream started");
                guard.commit(UserStream { token, listen_key });
                Ok(token)
            }
            Err(e) => {
                self.close_listen_key(&listen_key).await;
                Err(e)
            }
        }
    }

    /// Move the slot to `Opening`. Yields the previous stream when its
    /// connection has ended, and fails while another stream is live or opening.
    async fn claim_user_slot(&self) -> Result<(OpeningGuard<'_>, Option<UserStream>), ExchangeError> {
        let active = match &*lock_slot(&self.user_stream) {
            UserSlot::Idle => None,
            UserSlot::Opening => return Err(user_stream_busy("being opened")),
            UserSlot::Active(active) => Some(active.token),
        };

        if let Some(token) = active {
            if self.registry.is_receiving(token).await {
                return Err(user_stream_busy(&format!("already active as {}", token)));
            }
        }

        let mut slot = lock_slot(&self.user_stream);
        let stale = match std::mem::replace(&mut *slot, UserSlot::Opening) {
            UserSlot::Idle => None,
            UserSlot::Active(stale) if Some(stale.token) == active => Some(stale),
            other => {
                // raced with another open
                *slot = other;
                return Err(user_stream_busy("being opened"));
            }
        };
        drop(slot);

        let guard = OpeningGuard {
            slot: &self.user_stream,
            armed: true,
        };
        Ok((guard, stale))
    }

    /// Take the user-data stream out of the slot if `token` names it
    fn take_user_stream(&self, token: Option<MonitorToken>) -> Option<UserStream> {
        let mut slot = lock_slot(&self.user_stream);
        match &*slot {
            UserSlot::Active(active) if token.is_none() || token == Some(active.token) => {}
            _ => return None,
        }
        match std::mem::take(&mut *slot) {
            UserSlot::Active(active) => Some(active),
            _ => None,
        }
    }

    fn keepalive(&self, listen_key: String) -> Companion {
        let rest = self.rest.clone();
        let period = self.profile.keepalive_interval;

        Box::new(move |cancel: CancellationToken| {
            IntervalTimer::start(period, cancel, move || {
                let rest = rest.clone();
                let listen_key = listen_key.clone();
                async move {
                    if let Err(e) = rest.renew_listen_key(&listen_key).await {
                        warn!("listen key renewal failed: {}", e);
                    }
                }
            })
        })
    }

    async fn close_listen_key(&self, listen_key: &str) {
        if let Err(e) = self.rest.close_listen_key(listen_key).await {
            warn!("failed to close listen key: {}", e);
        }
    }

    /// Cancel one monitor. Unknown or already cancelled tokens are a no-op
    /// and return `false`.
    pub async fn cancel_monitor(&self, token: MonitorToken) -> bool {
        // detach the listen key first so a concurrent open never loses it
        let user_stream = self.take_user_stream(Some(token));
        let cancelled = self.registry.cancel_monitor(token).await;

        if let Some(active) = user_stream {
            self.close_listen_key(&active.listen_key).await;
        }

        cancelled
    }

    /// Stop the user-data stream and delete its listen key
    pub async fn close_user_data(&self) -> bool {
        match self.user_data_token() {
            Some(token) => self.cancel_monitor(token).await,
            None => false,
        }
    }

    /// Cancel every monitor of this market
    pub async fn cancel_monitors(&self) {
        let user_stream = self.take_user_stream(None);
        self.registry.cancel_monitors().await;

        if let Some(active) = user_stream {
            self.close_listen_key(&active.listen_key).await;
        }
    }

    pub async fn is_monitoring(&self, token: MonitorToken) -> bool {
        self.registry.contains(token).await
    }

    /// Tokens of live monitors in creation order
    pub async fn monitors(&self) -> Vec<MonitorToken> {
        self.registry.tokens().await
    }

    /// Whether the receive loop of `token` is still running
    pub async fn is_receiving(&self, token: MonitorToken) -> bool {
        self.registry.is_receiving(token).await
    }

    /// Token of the active user-data stream, if any
    pub fn user_data_token(&self) -> Option<MonitorToken> {
        match &*lock_slot(&self.user_stream) {
            UserSlot::Active(active) => Some(active.token),
            UserSlot::Idle | UserSlot::Opening => None,
        }
    }
}

fn user_stream_busy(state: &str) -> ExchangeError {
    ExchangeError::InvalidParameters(format!("user-data stream {}", state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::{RestClientBuilder, RestClientConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn market(server: &MockServer, kind: MarketKind) -> Market {
        let client = RestClientBuilder::new(RestClientConfig::new(
            server.uri(),
            kind.name().to_string(),
        ))
        .build()
        .unwrap();
        let profile = MarketProfile::new(kind)
            .with_rest_base_url(server.uri())
            .with_ws_base_url("ws://127.0.0.1:1");
        Market::new(
            profile,
            client,
            RestSettings::default(),
            WsConfig {
                connect_timeout_ms: 1_000,
                ..WsConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_mark_prices_rejected_on_spot() {
        let server = MockServer::start().await;
        let market = market(&server, MarketKind::Spot);
        let result = market.monitor_mark_prices(|_| {}).await;
        assert!(matches!(result, Err(ExchangeError::NotSupported(_))));
        assert!(market.monitors().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_monitor_leaves_nothing_behind() {
        let server = MockServer::start().await;
        let market = market(&server, MarketKind::UsdFutures);
        assert!(market.monitor_book_ticker("BTCUSDT", |_| {}).await.is_err());
        assert!(market.monitors().await.is_empty());
    }

    #[tokio::test]
    async fn test_user_data_without_credentials_fails_before_connecting() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fapi/v1/listenKey"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"listenKey":"k"}"#))
            .expect(0)
            .mount(&server)
            .await;

        let market = market(&server, MarketKind::UsdFutures);
        let result = market.monitor_user_data(|_| {}).await;
        assert!(matches!(result, Err(ExchangeError::AuthError(_))));
        assert!(market.user_data_token().is_none());

        // the failed open released its claim on the slot
        let retry = market.monitor_user_data(|_| {}).await;
        assert!(matches!(retry, Err(ExchangeError::AuthError(_))));
    }
}
