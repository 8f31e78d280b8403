use binance_monitor::core::config::{ConfigError, ExchangeConfig};
use binance_monitor::exchanges::binance::{build_usd_futures, UserEvent};
use tracing::{info, warn};

fn load_config() -> Result<ExchangeConfig, ConfigError> {
    #[cfg(feature = "env-file")]
    {
        ExchangeConfig::from_env_file("BINANCE")
    }
    #[cfg(not(feature = "env-file"))]
    {
        ExchangeConfig::from_env("BINANCE")
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // BINANCE_API_KEY / BINANCE_SECRET_KEY enable the user-data stream
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            warn!("{}; continuing with public streams only", e);
            ExchangeConfig::read_only()
        }
    };

    let market = build_usd_futures(&config)?;
    let server_time = market.rest().server_time().await?;
    info!(server_time, market = market.kind().name(), "connected");

    market
        .monitor_mini_tickers(|tickers| {
            for (symbol, ticker) in tickers.iter().take(3) {
                info!(%symbol, close = ?ticker.get("c"), "mini ticker");
            }
        })
        .await?;

    if config.has_credentials() {
        market
            .monitor_user_data(|event: UserEvent| info!(event = event.event_type(), "user data"))
            .await?;
    }

    tokio::signal::ctrl_c().await?;
    market.cancel_monitors().await;
    Ok(())
}
