use crate::core::errors::ExchangeError;
use crate::core::extractor::{document_from_frame, extract_flat, extract_multi};
use crate::core::kernel::FrameHandler;
use crate::core::types::{FlatRecord, JsonKeys, MultiRecord};
use std::fmt;
use std::sync::Arc;

pub type FlatCallback = Arc<dyn Fn(FlatRecord) + Send + Sync>;
pub type MultiCallback = Arc<dyn Fn(MultiRecord) + Send + Sync>;

/// The callback attached to a market-data session; exactly one shape per session.
#[derive(Clone)]
pub enum MarketCallback {
    Flat(FlatCallback),
    Multi(MultiCallback),
}

impl MarketCallback {
    pub fn flat<F>(f: F) -> Self
    where
        F: Fn(FlatRecord) + Send + Sync + 'static,
    {
        Self::Flat(Arc::new(f))
    }

    pub fn multi<F>(f: F) -> Self
    where
        F: Fn(MultiRecord) + Send + Sync + 'static,
    {
        Self::Multi(Arc::new(f))
    }
}

impl fmt::Debug for MarketCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat(_) => f.write_str("MarketCallback::Flat"),
            Self::Multi(_) => f.write_str("MarketCallback::Multi"),
        }
    }
}

/// Frame handler that runs the extractor and hands the result to the callback.
pub struct ExtractHandler {
    schema: Arc<JsonKeys>,
    array_key: Option<String>,
    callback: MarketCallback,
}

impl ExtractHandler {
    pub fn new(schema: Arc<JsonKeys>, array_key: Option<String>, callback: MarketCallback) -> Self {
        Self {
            schema,
            array_key,
            callback,
        }
    }
}

impl FrameHandler for ExtractHandler {
    fn handle_text(&self, text: &str) -> Result<(), ExchangeError> {
        let Some(document) = document_from_frame(text) else {
            return Ok(());
        };

        match &self.callback {
            MarketCallback::Flat(callback) => {
                callback(extract_flat(&document, &self.schema));
            }
            MarketCallback::Multi(callback) => {
                callback(extract_multi(
                    &document,
                    &self.schema,
                    self.array_key.as_deref(),
                ));
            }
        }

        Ok(())
    }
}
