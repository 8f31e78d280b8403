use crate::core::config::ApiAccess;
use crate::core::errors::ExchangeError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Result type for signing operations: (headers, signed query string)
pub type SignatureResult = Result<(HashMap<String, String>, String), ExchangeError>;

/// Signer trait for request authentication
pub trait Signer: Send + Sync {
    /// Headers identifying the caller, sent with keyed and signed calls
    fn api_key_headers(&self) -> HashMap<String, String>;

    /// Append receive window, timestamp and signature to a query string
    ///
    /// # Arguments
    /// * `query_string` - Query string (without leading '?')
    /// * `recv_window` - Receive window in milliseconds
    /// * `timestamp` - Request timestamp in milliseconds
    fn sign_request(&self, query_string: &str, recv_window: u64, timestamp: u64)
        -> SignatureResult;
}

/// HMAC-SHA256 signer for Binance-style query signing
pub struct HmacSigner {
    access: ApiAccess,
}

impl HmacSigner {
    pub fn new(access: ApiAccess) -> Self {
        Self { access }
    }
}

impl Signer for HmacSigner {
    fn api_key_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(API_KEY_HEADER.to_string(), self.access.api_key().to_string());
        headers
    }

    fn sign_request(
        &self,
        query_string: &str,
        recv_window: u64,
        timestamp: u64,
    ) -> SignatureResult {
        let unsigned = append_query(
            query_string,
            &format!("recvWindow={}&timestamp={}", recv_window, timestamp),
        );
        let signature = generate_signature(self.access.secret_key(), &unsigned)?;
        let signed = format!("{}&signature={}", unsigned, signature);

        Ok((self.api_key_headers(), signed))
    }
}

/// Lowercase-hex HMAC-SHA256 of `query_string` keyed by `secret`
pub fn generate_signature(secret: &str, query_string: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::AuthError(format!("Failed to create HMAC: {}", e)))?;
    mac.update(query_string.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn get_timestamp() -> Result<u64, ExchangeError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .map_err(|e| ExchangeError::Other(format!("System time error: {}", e)))
}

#[must_use]
pub fn build_query_string<V: AsRef<str>>(params: &[(&str, V)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v.as_ref()))
        .collect::<Vec<_>>()
        .join("&")
}

fn append_query(query_string: &str, suffix: &str) -> String {
    if query_string.is_empty() {
        suffix.to_string()
    } else {
        format!("{}&{}", query_string, suffix)
    }
}
