use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

/// API key / secret key pair used for signed calls.
#[derive(Clone)]
pub struct ApiAccess {
    api_key: Secret<String>,
    secret_key: Secret<String>,
}

impl ApiAccess {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            secret_key: Secret::new(secret_key.into()),
        }
    }

    /// Credentials for public-only usage
    pub fn empty() -> Self {
        Self::new(String::new(), String::new())
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

impl fmt::Debug for ApiAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiAccess")
            .field("api_key", &"[REDACTED]")
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub access: ApiAccess,
    pub testnet: bool,
    pub base_url: Option<String>,
    pub ws_base_url: Option<String>,
}

// Never expose secrets in serialization
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeConfig", 5)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("testnet", &self.testnet)?;
        state.serialize_field("base_url", &self.base_url)?;
        state.serialize_field("ws_base_url", &self.ws_base_url)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            api_key: String,
            secret_key: String,
            #[serde(default)]
            testnet: bool,
            base_url: Option<String>,
            ws_base_url: Option<String>,
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            access: ApiAccess::new(helper.api_key, helper.secret_key),
            testnet: helper.testnet,
            base_url: helper.base_url,
            ws_base_url: helper.ws_base_url,
        })
    }
}

impl ExchangeConfig {
    /// Create a new configuration with API credentials
    #[must_use]
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            access: ApiAccess::new(api_key, secret_key),
            testnet: false,
            base_url: None,
            ws_base_url: None,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY` (e.g., `BINANCE_API_KEY`)
    /// - `{PREFIX}_SECRET_KEY` (e.g., `BINANCE_SECRET_KEY`)
    /// - `{PREFIX}_TESTNET` (optional, defaults to false)
    /// - `{PREFIX}_BASE_URL` (optional)
    /// - `{PREFIX}_WS_BASE_URL` (optional)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);
        let secret_key_var = format!("{}_SECRET_KEY", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;
        let secret_key = env::var(&secret_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_key_var))?;

        let testnet = env::var(format!("{}_TESTNET", prefix))
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        Ok(Self {
            access: ApiAccess::new(api_key, secret_key),
            testnet,
            base_url: env::var(format!("{}_BASE_URL", prefix)).ok(),
            ws_base_url: env::var(format!("{}_WS_BASE_URL", prefix)).ok(),
        })
    }

    /// Create configuration from a .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            // a missing file falls back to the process environment
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    /// Configuration for market data only; signed calls will be rejected
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            access: ApiAccess::empty(),
            testnet: false,
            base_url: None,
            ws_base_url: None,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.access.is_complete()
    }

    #[must_use]
    pub const fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    /// Override the REST base URL
    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Override the WebSocket base URL
    #[must_use]
    pub fn ws_base_url(mut self, ws_base_url: String) -> Self {
        self.ws_base_url = Some(ws_base_url);
        self
    }

    pub fn api_key(&self) -> &str {
        self.access.api_key()
    }

    pub fn secret_key(&self) -> &str {
        self.access.secret_key()
    }
}

/// REST call kinds, used to look up the receive window sent with a signed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    NewOrder,
    CancelOrder,
    AllOrders,
    AccountInformation,
    AccountBalance,
    Klines,
    TakerBuySellVolume,
    ListenKey,
    ServerTime,
}

pub const DEFAULT_RECV_WINDOW_MS: u64 = 5_000;

/// Immutable settings for the REST façade.
#[derive(Debug, Clone)]
pub struct RestSettings {
    pub timeout: Duration,
    pub user_agent: String,
    default_recv_window: u64,
    recv_windows: HashMap<CallType, u64>,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("binance-monitor/{}", env!("CARGO_PKG_VERSION")),
            default_recv_window: DEFAULT_RECV_WINDOW_MS,
            recv_windows: HashMap::new(),
        }
    }
}

impl RestSettings {
    /// Override the receive window for one call type
    #[must_use]
    pub fn with_recv_window(mut self, call: CallType, millis: u64) -> Self {
        self.recv_windows.insert(call, millis);
        self
    }

    /// Change the receive window used by call types without an override
    #[must_use]
    pub fn with_default_recv_window(mut self, millis: u64) -> Self {
        self.default_recv_window = millis;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn recv_window(&self, call: CallType) -> u64 {
        self.recv_windows
            .get(&call)
            .copied()
            .unwrap_or(self.default_recv_window)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_redacts_secrets() {
        let config = ExchangeConfig::new("my_key".to_string(), "my_secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("my_key"));
        assert!(!json.contains("my_secret"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let access = ApiAccess::new("my_key", "my_secret");
        let rendered = format!("{:?}", access);
        assert!(!rendered.contains("my_secret"));
    }

    #[test]
    fn test_read_only_has_no_credentials() {
        assert!(!ExchangeConfig::read_only().has_credentials());
        assert!(ExchangeConfig::new("k".to_string(), "s".to_string()).has_credentials());
    }

    #[test]
    fn test_recv_window_override_is_per_call() {
        let settings = RestSettings::default().with_recv_window(CallType::NewOrder, 7000);
        assert_eq!(settings.recv_window(CallType::NewOrder), 7000);
        assert_eq!(
            settings.recv_window(CallType::CancelOrder),
            DEFAULT_RECV_WINDOW_MS
        );
    }

    #[test]
    fn test_from_env_missing_key() {
        let err = ExchangeConfig::from_env("BINANCE_MONITOR_UNSET_PREFIX").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvironmentVariable(_)));
    }
}
