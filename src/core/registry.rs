use crate::core::errors::ExchangeError;
use crate::core::kernel::{FrameHandler, IntervalTimer, Session, WsConfig};
use crate::core::types::MonitorToken;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Work to run next to a session's receive loop, bound to its cancellation token.
pub type Companion = Box<dyn FnOnce(CancellationToken) -> IntervalTimer + Send>;

struct Entry {
    session: Session,
    timer: Option<IntervalTimer>,
}

#[derive(Default)]
struct Sessions {
    by_id: HashMap<u64, Entry>,
    order: Vec<u64>,
}

impl Sessions {
    fn insert(&mut self, id: u64, entry: Entry) {
        self.by_id.insert(id, entry);
        self.order.push(id);
    }

    fn remove(&mut self, id: u64) -> Option<Entry> {
        let entry = self.by_id.remove(&id)?;
        self.order.retain(|existing| *existing != id);
        Some(entry)
    }

    fn drain(&mut self) -> Vec<(u64, Entry)> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|id| self.by_id.remove(&id).map(|entry| (id, entry)))
            .collect()
    }
}

/// Owns every live session and hands out monitor tokens.
///
/// Ids come from a counter that starts at 1 and is never reused, so a stale
/// token can only miss.
pub struct Registry {
    sessions: Mutex<Sessions>,
    next_id: AtomicU64,
    ws_config: WsConfig,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(WsConfig::default())
    }
}

impl Registry {
    pub fn new(ws_config: WsConfig) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            next_id: AtomicU64::new(1),
            ws_config,
        }
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Connect to `uri`, start its receive loop and register the session.
    ///
    /// Nothing is registered unless the receive loop started.
    #[instrument(skip(self, handler), fields(uri = %uri))]
    pub async fn create_monitor(
        &self,
        uri: &str,
        handler: Arc<dyn FrameHandler>,
    ) -> Result<MonitorToken, ExchangeError> {
        self.create_monitor_with(uri, handler, None).await
    }

    /// Like [`Registry::create_monitor`], also starting a companion timer
    /// that is stopped when the monitor is cancelled.
    pub async fn create_monitor_with(
        &self,
        uri: &str,
        handler: Arc<dyn FrameHandler>,
        companion: Option<Companion>,
    ) -> Result<MonitorToken, ExchangeError> {
        let mut session = Session::connect(uri, &self.ws_config).await;
        if !session.is_connected() {
            return Err(ExchangeError::WebSocketError(format!(
                "failed to connect to {}",
                uri
            )));
        }

        if let Err(e) = session.start(handler) {
            session.close().await;
            return Err(e);
        }

        let timer = companion.map(|start| start(session.cancel_token()));

        let id = self.allocate_id();
        session.assign_id(id);
        self.sessions
            .lock()
            .await
            .insert(id, Entry { session, timer });

        info!(id, "monitor started");
        Ok(MonitorToken::new(id))
    }

    /// Cancel one monitor. Returns `false` if the token is unknown.
    #[instrument(skip(self), fields(token = %token))]
    pub async fn cancel_monitor(&self, token: MonitorToken) -> bool {
        let entry = self.sessions.lock().await.remove(token.id());
        match entry {
            Some(entry) => {
                disconnect(token.id(), entry).await;
                true
            }
            None => {
                debug!("no live monitor for token");
                false
            }
        }
    }

    /// Cancel every monitor concurrently and wait for all of them.
    #[instrument(skip(self))]
    pub async fn cancel_monitors(&self) {
        let entries = self.sessions.lock().await.drain();
        if entries.is_empty() {
            return;
        }

        let count = entries.len();
        let handles: Vec<_> = entries
            .into_iter()
            .map(|(id, entry)| tokio::spawn(disconnect(id, entry)))
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("disconnect task failed: {}", e);
            }
        }

        info!(count, "all monitors cancelled");
    }

    pub async fn contains(&self, token: MonitorToken) -> bool {
        self.sessions.lock().await.by_id.contains_key(&token.id())
    }

    /// Tokens of live monitors in creation order
    pub async fn tokens(&self) -> Vec<MonitorToken> {
        self.sessions
            .lock()
            .await
            .order
            .iter()
            .map(|id| MonitorToken::new(*id))
            .collect()
    }

    /// Whether the session behind `token` still has a running receive loop
    pub async fn is_receiving(&self, token: MonitorToken) -> bool {
        self.sessions
            .lock()
            .await
            .by_id
            .get(&token.id())
            .is_some_and(|entry| entry.session.is_receiving())
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn disconnect(id: u64, mut entry: Entry) {
    entry.session.cancel();
    if let Some(timer) = entry.timer.take() {
        timer.stop().await;
    }
    entry.session.join().await;
    entry.session.close().await;
    debug!(id, "monitor disconnected");
}
