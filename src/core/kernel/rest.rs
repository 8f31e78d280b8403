use crate::core::config::RestSettings;
use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::{build_query_string, get_timestamp, Signer};
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, trace, warn};

/// How a request is authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAuth {
    /// Public endpoint
    None,
    /// API key header only (listen-key management)
    ApiKey,
    /// API key header plus `recvWindow`, `timestamp` and `signature`
    Signed { recv_window: u64 },
}

/// REST client trait for making HTTP requests
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Send a request and return the parsed JSON body of a successful response
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `endpoint` - The API endpoint path
    /// * `params` - Query parameters in the order they are rendered
    /// * `auth` - Authentication applied to the request
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        auth: RequestAuth,
    ) -> Result<Value, ExchangeError>;

    async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        auth: RequestAuth,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::GET, endpoint, params, auth).await
    }

    async fn post(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        auth: RequestAuth,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::POST, endpoint, params, auth).await
    }

    async fn put(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        auth: RequestAuth,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::PUT, endpoint, params, auth).await
    }

    async fn delete(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        auth: RequestAuth,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::DELETE, endpoint, params, auth).await
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Client identifier sent as the user agent
    pub user_agent: String,
}

impl RestClientConfig {
    pub fn new(base_url: String, exchange_name: String) -> Self {
        let defaults = RestSettings::default();
        Self {
            base_url,
            exchange_name,
            timeout_seconds: defaults.timeout.as_secs(),
            user_agent: defaults.user_agent,
        }
    }

    /// Take timeout and client identifier from façade settings
    pub fn with_settings(mut self, settings: &RestSettings) -> Self {
        self.timeout_seconds = settings.timeout.as_secs().max(1);
        self.user_agent = settings.user_agent.clone();
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Set the signer for keyed and signed requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            signer: self.signer,
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    fn signer(&self) -> Result<&Arc<dyn Signer>, ExchangeError> {
        self.signer.as_ref().ok_or_else(|| {
            ExchangeError::AuthError("Authentication required but no credentials set".to_string())
        })
    }

    /// Render the final query string and the auth headers for a request
    fn prepare_query(
        &self,
        params: &[(&str, String)],
        auth: RequestAuth,
    ) -> Result<(String, HashMap<String, String>), ExchangeError> {
        let query = build_query_string(params);

        match auth {
            RequestAuth::None => Ok((query, HashMap::new())),
            RequestAuth::ApiKey => Ok((query, self.signer()?.api_key_headers())),
            RequestAuth::Signed { recv_window } => {
                let timestamp = get_timestamp()?;
                let (headers, signed) =
                    self.signer()?
                        .sign_request(&query, recv_window, timestamp)?;
                Ok((signed, headers))
            }
        }
    }

    fn build_url(&self, endpoint: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query)
        }
    }

    #[instrument(skip(self, response), fields(exchange = %self.config.exchange_name, status = %response.status()))]
    async fn handle_response(&self, response: Response) -> Result<Value, ExchangeError> {
        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to read response body: {}", e))
        })?;

        trace!("Response body: {}", response_text);

        if status.is_success() {
            if response_text.trim().is_empty() {
                return Ok(Value::Null);
            }
            Ok(serde_json::from_str(&response_text)?)
        } else {
            warn!("request rejected: {}", response_text);
            Err(ExchangeError::ApiError {
                code: i32::from(status.as_u16()),
                message: response_text,
            })
        }
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(skip(self, params), fields(exchange = %self.config.exchange_name, method = %method, endpoint = %endpoint, param_count = params.len()))]
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        auth: RequestAuth,
    ) -> Result<Value, ExchangeError> {
        let (query, headers) = self.prepare_query(params, auth)?;
        let url = self.build_url(endpoint, &query);

        let mut request = self
            .client
            .request(method, &url)
            .header("Content-Type", "application/json");
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("Request failed: {}", e)))?;

        self.handle_response(response).await
    }
}
