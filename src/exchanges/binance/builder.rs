use crate::core::config::{ExchangeConfig, RestSettings};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{HmacSigner, ReqwestRest, RestClientBuilder, RestClientConfig, WsConfig};
use crate::exchanges::binance::endpoints::{MarketKind, MarketProfile};
use crate::exchanges::binance::market::Market;
use std::sync::Arc;

/// Resolve the market profile for `kind`, honouring the testnet flag and
/// any URL overrides of the configuration.
pub fn build_profile(kind: MarketKind, config: &ExchangeConfig) -> MarketProfile {
    let kind = kind.with_testnet(config.testnet || kind.is_testnet());
    let mut profile = MarketProfile::new(kind);

    if let Some(base_url) = &config.base_url {
        profile = profile.with_rest_base_url(base_url.clone());
    }
    if let Some(ws_base_url) = &config.ws_base_url {
        profile = profile.with_ws_base_url(ws_base_url.clone());
    }

    profile
}

/// Build the HTTP transport of a profile; credentials enable signing
pub fn build_rest_client(
    profile: &MarketProfile,
    config: &ExchangeConfig,
    settings: &RestSettings,
) -> Result<ReqwestRest, ExchangeError> {
    let rest_config = RestClientConfig::new(
        profile.rest_base_url.clone(),
        profile.kind.name().to_string(),
    )
    .with_settings(settings);

    let mut rest_builder = RestClientBuilder::new(rest_config);

    if config.has_credentials() {
        rest_builder = rest_builder.with_signer(Arc::new(HmacSigner::new(config.access.clone())));
    }

    rest_builder.build()
}

/// Create a market with default REST settings and WebSocket timeouts
pub fn build_market(kind: MarketKind, config: &ExchangeConfig) -> Result<Market, ExchangeError> {
    build_market_with(kind, config, RestSettings::default(), WsConfig::default())
}

pub fn build_market_with(
    kind: MarketKind,
    config: &ExchangeConfig,
    settings: RestSettings,
    ws_config: WsConfig,
) -> Result<Market, ExchangeError> {
    let profile = build_profile(kind, config);
    let rest = build_rest_client(&profile, config, &settings)?;
    Ok(Market::new(profile, rest, settings, ws_config))
}

pub fn build_spot(config: &ExchangeConfig) -> Result<Market, ExchangeError> {
    build_market(MarketKind::Spot, config)
}

pub fn build_usd_futures(config: &ExchangeConfig) -> Result<Market, ExchangeError> {
    build_market(MarketKind::UsdFutures, config)
}
