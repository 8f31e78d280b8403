mod common;

use binance_monitor::core::config::{ExchangeConfig, RestSettings};
use binance_monitor::core::kernel::WsConfig;
use binance_monitor::core::types::MonitorToken;
use binance_monitor::exchanges::binance::{build_market_with, Market, MarketKind};
use common::StreamServer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const MINI_TICKERS: &str = r#"[
    {"e":"24hrMiniTicker","E":1672515782136,"s":"BTCUSDT","c":"16500.12000000","o":"16400.00","h":"16600.00","l":"16300.00","v":"1200.5","q":"19800000.1"},
    {"e":"24hrMiniTicker","E":1672515782136,"s":"ETHUSDT","c":"1200.50","o":"1190.00","h":"1210.00","l":"1180.00","v":"50000","q":"60000000"}
]"#;

const BOOK_TICKER: &str =
    r#"{"u":400900217,"s":"BNBUSDT","b":"25.35190000","B":"31.21000000","a":"25.36520000","A":"40.66000000"}"#;

fn market_for(server: &StreamServer, kind: MarketKind) -> Market {
    let config = ExchangeConfig::read_only()
        .base_url("http://127.0.0.1:1".to_string())
        .ws_base_url(server.ws_base_url());
    build_market_with(
        kind,
        &config,
        RestSettings::default(),
        WsConfig {
            connect_timeout_ms: 2_000,
            close_timeout_ms: 1_000,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_monitor_lifecycle() {
    let server = StreamServer::start(vec![MINI_TICKERS.to_string()]).await;
    let market = market_for(&server, MarketKind::Spot);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let token = market
        .monitor_mini_tickers(move |tickers| {
            let _ = tx.send(tickers);
        })
        .await
        .unwrap();

    assert!(token.is_valid());
    assert!(market.is_monitoring(token).await);
    assert_eq!(market.monitors().await, vec![token]);

    let tickers = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no ticker frame delivered")
        .unwrap();
    assert_eq!(tickers.len(), 2);
    assert_eq!(tickers["BTCUSDT"]["c"], "16500.12000000");
    assert_eq!(tickers["ETHUSDT"]["q"], "60000000");
    assert!(!tickers["ETHUSDT"].contains_key("e"));

    assert_eq!(server.paths(), vec!["/ws/!miniTicker@arr".to_string()]);

    assert!(market.cancel_monitor(token).await);
    assert!(!market.is_monitoring(token).await);
    assert!(market.monitors().await.is_empty());

    // second cancel is a no-op
    assert!(!market.cancel_monitor(token).await);
    assert!(server.wait_for_closed(1).await);
}

#[tokio::test]
async fn test_error_envelope_never_reaches_callback() {
    let server = StreamServer::start(vec![
        r#"{"code":-1,"msg":"x"}"#.to_string(),
        String::new(),
        "not json".to_string(),
        BOOK_TICKER.to_string(),
    ])
    .await;
    let market = market_for(&server, MarketKind::UsdFutures);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let token = market
        .monitor_book_ticker("BNBUSDT", move |ticker| {
            let _ = tx.send(ticker);
        })
        .await
        .unwrap();

    let ticker = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no book ticker delivered")
        .unwrap();
    assert_eq!(ticker["s"], "BNBUSDT");
    assert_eq!(ticker["u"], "400900217");
    assert_eq!(ticker["A"], "40.66000000");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    assert_eq!(server.paths(), vec!["/ws/bnbusdt@bookTicker".to_string()]);
    assert!(market.cancel_monitor(token).await);
}

#[tokio::test]
async fn test_cancel_monitors_tears_down_everything() {
    let server = StreamServer::start(Vec::new()).await;
    let market = market_for(&server, MarketKind::UsdFutures);

    let mut tokens = Vec::new();
    tokens.push(market.monitor_mini_ticker("BTCUSDT", |_| {}).await.unwrap());
    tokens.push(market.monitor_book_ticker("ETHUSDT", |_| {}).await.unwrap());
    tokens.push(market.monitor_mark_prices(|_| {}).await.unwrap());

    // ids are never reused
    assert!(tokens.windows(2).all(|pair| pair[0].id() < pair[1].id()));
    assert_eq!(market.monitors().await, tokens);

    market.cancel_monitors().await;

    assert!(market.monitors().await.is_empty());
    for token in &tokens {
        assert!(!market.is_monitoring(*token).await);
        assert!(!market.cancel_monitor(*token).await);
    }
    assert!(server.wait_for_closed(3).await);

    let next = market.monitor_mini_ticker("BTCUSDT", |_| {}).await.unwrap();
    assert!(next.id() > tokens[2].id());
    market.cancel_monitors().await;
}

#[tokio::test]
async fn test_failed_connect_returns_error() {
    let config = ExchangeConfig::read_only().ws_base_url("ws://127.0.0.1:1".to_string());
    let market = build_market_with(
        MarketKind::Spot,
        &config,
        RestSettings::default(),
        WsConfig {
            connect_timeout_ms: 1_000,
            ..WsConfig::default()
        },
    )
    .unwrap();

    assert!(market.monitor_mini_tickers(|_| {}).await.is_err());
    assert!(market.monitors().await.is_empty());
    assert!(!market.cancel_monitor(MonitorToken::INVALID).await);
}

#[tokio::test]
async fn test_panicking_callback_keeps_stream_alive() {
    let server = StreamServer::start(vec![
        BOOK_TICKER.to_string(),
        BOOK_TICKER.to_string(),
        BOOK_TICKER.to_string(),
    ])
    .await;
    let market = market_for(&server, MarketKind::UsdFutures);

    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let seen = calls.clone();
    let token = market
        .monitor_book_ticker("BNBUSDT", move |ticker| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first update rejected");
            }
            let _ = tx.send(ticker);
        })
        .await
        .unwrap();

    for _ in 0..2 {
        let ticker = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("stream stopped after a callback panic")
            .unwrap();
        assert_eq!(ticker["s"], "BNBUSDT");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(market.is_receiving(token).await);

    assert!(market.cancel_monitor(token).await);
    assert!(server.wait_for_closed(1).await);
}

#[tokio::test]
async fn test_dropping_market_stops_receive_loops() {
    let server = StreamServer::start_repeating(BOOK_TICKER.to_string(), Duration::from_millis(20)).await;
    let market = market_for(&server, MarketKind::Spot);

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    market
        .monitor_book_ticker("BNBUSDT", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(calls.load(Ordering::SeqCst) > 0);

    drop(market);
    assert!(server.wait_for_closed(1).await);

    let after_drop = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_drop);
}
