//! Authenticated account stream: event classification and dispatch.

use crate::core::errors::ExchangeError;
use crate::core::extractor::{document_from_frame, extract_listed, value_text};
use crate::core::kernel::FrameHandler;
use crate::core::types::FlatRecord;
use crate::exchanges::binance::endpoints::EventClassifier;
use crate::exchanges::binance::types::{AccountUpdate, MarginCall, OrderUpdate, UserEvent};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub type UserCallback = Arc<dyn Fn(UserEvent) + Send + Sync>;

const MARGIN_CALL_POSITION_FIELDS: &[&str] = &["s", "ps", "pa", "mt", "iw", "mp", "up", "mm"];

const FUTURES_ORDER_FIELDS: &[&str] = &[
    "s", "c", "S", "o", "f", "q", "p", "ap", "sp", "x", "X", "i", "l", "z", "L", "N", "n", "T",
    "t", "b", "a", "m", "R", "wt", "ot", "ps", "cp", "rp",
];

const FUTURES_BALANCE_FIELDS: &[&str] = &["a", "wb", "cw", "bc"];

const FUTURES_POSITION_FIELDS: &[&str] = &["s", "pa", "ep", "cr", "up", "mt", "iw", "ps"];

const SPOT_ORDER_FIELDS: &[&str] = &[
    "s", "c", "S", "o", "f", "q", "p", "P", "x", "X", "r", "i", "l", "z", "L", "n", "N", "T",
    "t", "w", "m", "O", "Z", "Y", "Q",
];

const SPOT_BALANCE_FIELDS: &[&str] = &["a", "f", "l"];

fn text_field(document: &Value, key: &str) -> String {
    document.get(key).and_then(value_text).unwrap_or_default()
}

fn records(array: Option<&Value>, fields: &[&str]) -> Vec<FlatRecord> {
    array
        .and_then(Value::as_array)
        .map(|items| items.iter().map(|item| extract_listed(item, fields)).collect())
        .unwrap_or_default()
}

fn records_by(array: Option<&Value>, key: &str, fields: &[&str]) -> BTreeMap<String, FlatRecord> {
    array
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let outer = item.get(key).and_then(value_text)?;
                    Some((outer, extract_listed(item, fields)))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Classify a USD-M futures user-data event by its `"e"` field.
pub fn classify_futures_event(document: &Value) -> UserEvent {
    let event_type = text_field(document, "e");

    match event_type.as_str() {
        "MARGIN_CALL" => UserEvent::MarginCall(MarginCall {
            event_time: text_field(document, "E"),
            cross_wallet_balance: text_field(document, "cw"),
            positions: records(document.get("p"), MARGIN_CALL_POSITION_FIELDS),
        }),
        "ORDER_TRADE_UPDATE" => UserEvent::OrderUpdate(OrderUpdate {
            event_time: text_field(document, "E"),
            transaction_time: text_field(document, "T"),
            order: document
                .get("o")
                .map(|order| extract_listed(order, FUTURES_ORDER_FIELDS))
                .unwrap_or_default(),
        }),
        "ACCOUNT_UPDATE" => {
            let account = document.get("a");
            UserEvent::AccountUpdate(AccountUpdate {
                event_time: text_field(document, "E"),
                transaction_time: text_field(document, "T"),
                reason: account.map(|a| text_field(a, "m")).unwrap_or_default(),
                balances: records_by(account.and_then(|a| a.get("B")), "a", FUTURES_BALANCE_FIELDS),
                positions: records(account.and_then(|a| a.get("P")), FUTURES_POSITION_FIELDS),
            })
        }
        _ => UserEvent::Unknown(event_type),
    }
}

/// Classify a spot user-data event by its `"e"` field.
pub fn classify_spot_event(document: &Value) -> UserEvent {
    let event_type = text_field(document, "e");

    match event_type.as_str() {
        "executionReport" => UserEvent::OrderUpdate(OrderUpdate {
            event_time: text_field(document, "E"),
            transaction_time: text_field(document, "T"),
            order: extract_listed(document, SPOT_ORDER_FIELDS),
        }),
        "outboundAccountPosition" => UserEvent::AccountUpdate(AccountUpdate {
            event_time: text_field(document, "E"),
            transaction_time: text_field(document, "u"),
            reason: event_type.clone(),
            balances: records_by(document.get("B"), "a", SPOT_BALANCE_FIELDS),
            positions: Vec::new(),
        }),
        _ => UserEvent::Unknown(event_type),
    }
}

/// Frame handler for the user-data stream.
pub struct UserDataHandler {
    classify: EventClassifier,
    callback: UserCallback,
}

impl UserDataHandler {
    pub fn new(classify: EventClassifier, callback: UserCallback) -> Self {
        Self { classify, callback }
    }
}

impl FrameHandler for UserDataHandler {
    fn handle_text(&self, text: &str) -> Result<(), ExchangeError> {
        let Some(document) = document_from_frame(text) else {
            return Ok(());
        };

        match (self.classify)(&document) {
            UserEvent::Unknown(event_type) => {
                debug!(event_type = %event_type, "ignoring user-data event");
            }
            event => (self.callback)(event),
        }

        Ok(())
    }
}
