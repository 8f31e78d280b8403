use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{frame_text, FrameHandler};
use futures_util::{SinkExt, StreamExt};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket session configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Handshake timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Upper bound on the close handshake in milliseconds
    pub close_timeout_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            close_timeout_ms: 5_000,
        }
    }
}

/// One WebSocket connection with its cancellation signal and receive task.
pub struct Session {
    id: u64,
    uri: String,
    stream: Option<WsStream>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Option<WsStream>>>,
    config: WsConfig,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("uri", &self.uri)
            .field("connected", &self.is_connected())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Perform the WebSocket handshake.
    ///
    /// A failed handshake is logged and returns a session with
    /// `is_connected() == false` instead of an error.
    #[instrument(skip(config), fields(uri = %uri))]
    pub async fn connect(uri: &str, config: &WsConfig) -> Self {
        let timeout = Duration::from_millis(config.connect_timeout_ms);

        let stream = match tokio::time::timeout(timeout, connect_async(uri)).await {
            Ok(Ok((stream, _))) => Some(stream),
            Ok(Err(e)) => {
                error!("WebSocket connection failed: {}", e);
                None
            }
            Err(_) => {
                error!("WebSocket connection timed out after {:?}", timeout);
                None
            }
        };

        Self {
            id: 0,
            uri: uri.to_string(),
            connected: Arc::new(AtomicBool::new(stream.is_some())),
            stream,
            cancel: CancellationToken::new(),
            task: None,
            config: config.clone(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: u64) {
        self.id = id;
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Token observed by the receive loop and any helper tasks of this session
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal cooperative cancellation; the socket stays open until `close`
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_receiving(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Hand the connection to a background receive loop feeding `handler`.
    pub fn start(&mut self, handler: Arc<dyn FrameHandler>) -> Result<(), ExchangeError> {
        if self.task.is_some() {
            return Err(ExchangeError::WebSocketError(format!(
                "receive loop already running for {}",
                self.uri
            )));
        }

        let stream = self.stream.take().ok_or_else(|| {
            ExchangeError::WebSocketError(format!("not connected to {}", self.uri))
        })?;

        self.task = Some(tokio::spawn(receive_loop(
            stream,
            self.cancel.clone(),
            handler,
            self.connected.clone(),
            self.uri.clone(),
        )));

        Ok(())
    }

    /// Wait for the receive loop to exit and take the connection back.
    pub async fn join(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        if task.is_finished() {
            debug!(uri = %self.uri, "receive loop already exited");
        }

        match task.await {
            Ok(stream) => self.stream = stream,
            Err(e) => error!(uri = %self.uri, "receive loop terminated abnormally: {}", e),
        }
    }

    /// Close the transport. Call only after `join`.
    #[instrument(skip(self), fields(id = self.id, uri = %self.uri))]
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let timeout = Duration::from_millis(self.config.close_timeout_ms);
            match tokio::time::timeout(timeout, stream.close(None)).await {
                Ok(Ok(())) => debug!("WebSocket closed"),
                Ok(Err(e)) => debug!("WebSocket close handshake failed: {}", e),
                Err(_) => warn!("WebSocket close handshake timed out"),
            }
        }
        self.connected.store(false, Ordering::Release);
    }

    /// Cancel, wait for the loop, then close
    pub async fn shutdown(&mut self) {
        self.cancel();
        self.join().await;
        self.close().await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // a detached receive loop must not outlive its owner
        self.cancel.cancel();
    }
}

async fn receive_loop(
    mut stream: WsStream,
    cancel: CancellationToken,
    handler: Arc<dyn FrameHandler>,
    connected: Arc<AtomicBool>,
    uri: String,
) -> Option<WsStream> {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(uri = %uri, "receive loop cancelled");
                return Some(stream);
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(Message::Ping(data))) => {
                if let Err(e) = stream.send(Message::Pong(data)).await {
                    warn!(uri = %uri, "Failed to send pong response: {}", e);
                }
            }
            Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                info!(uri = %uri, ?frame, "server closed the stream");
                break;
            }
            Some(Ok(message)) => match frame_text(message) {
                Ok(Some(text)) => dispatch(handler.as_ref(), &text, &uri),
                Ok(None) => {}
                Err(e) => warn!(uri = %uri, "dropping frame: {}", e),
            },
            Some(Err(e)) => {
                // errors raised while we are shutting down are expected
                if !cancel.is_cancelled() {
                    error!(uri = %uri, "WebSocket error: {}", e);
                }
                break;
            }
            None => {
                debug!(uri = %uri, "stream ended");
                break;
            }
        }
    }

    // the stream is gone: stop every helper task bound to this session
    connected.store(false, Ordering::Release);
    cancel.cancel();
    None
}

/// Feed one frame to the handler. Errors and panics are logged so one bad
/// frame or callback never ends the loop.
fn dispatch(handler: &dyn FrameHandler, text: &str, uri: &str) {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle_text(text))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(uri = %uri, "failed to handle message: {}", e),
        Err(payload) => error!(
            uri = %uri,
            "message handler panicked: {}",
            panic_message(payload.as_ref())
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullHandler;

    impl FrameHandler for NullHandler {
        fn handle_text(&self, _text: &str) -> Result<(), ExchangeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_connect_failure_is_not_connected() {
        let config = WsConfig {
            connect_timeout_ms: 1_000,
            ..WsConfig::default()
        };
        let mut session = Session::connect("ws://127.0.0.1:1/ws/none", &config).await;

        assert!(!session.is_connected());
        assert!(session.start(Arc::new(NullHandler)).is_err());
        assert!(!session.is_receiving());

        // shutting down a session that never connected is harmless
        session.shutdown().await;
    }

    struct PanickingHandler;

    impl FrameHandler for PanickingHandler {
        fn handle_text(&self, text: &str) -> Result<(), ExchangeError> {
            panic!("callback failed on {}", text);
        }
    }

    #[test]
    fn test_dispatch_contains_handler_panic() {
        dispatch(&PanickingHandler, "{}", "ws://test");
        dispatch(&NullHandler, "{}", "ws://test");
    }

    #[test]
    fn test_panic_message() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(text.as_ref()), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(owned.as_ref()), "owned boom");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn test_dropping_session_cancels_token() {
        let session = Session::connect("ws://127.0.0.1:1/ws/none", &WsConfig {
            connect_timeout_ms: 1_000,
            ..WsConfig::default()
        })
        .await;
        let token = session.cancel_token();
        assert!(!token.is_cancelled());
        drop(session);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_uri() {
        let session = Session::connect("not a uri", &WsConfig::default()).await;
        assert!(!session.is_connected());
        assert_eq!(session.uri(), "not a uri");
    }
}
