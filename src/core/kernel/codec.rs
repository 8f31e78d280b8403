use crate::core::errors::ExchangeError;
use tokio_tungstenite::tungstenite::Message;

/// Consumer of inbound text frames for one session.
///
/// Control frames (ping, pong, close) never reach the handler; they are
/// handled by the receive loop. Returning an error logs it and the loop
/// moves on to the next frame.
pub trait FrameHandler: Send + Sync + 'static {
    fn handle_text(&self, text: &str) -> Result<(), ExchangeError>;
}

/// Extract the text payload of a data frame.
///
/// - `Ok(Some(text))` - text or UTF-8 binary payload
/// - `Ok(None)` - not a data frame
/// - `Err(error)` - binary payload that is not UTF-8
pub fn frame_text(message: Message) -> Result<Option<String>, ExchangeError> {
    match message {
        Message::Text(text) => Ok(Some(text)),
        Message::Binary(data) => String::from_utf8(data).map(Some).map_err(|e| {
            ExchangeError::WebSocketError(format!("Invalid UTF-8 in binary message: {}", e))
        }),
        _ => Ok(None),
    }
}
