#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

type HandshakeResult = Result<Response, ErrorResponse>;

/// What a connection does once the fixed frames are sent
#[derive(Clone, Copy)]
enum Ending {
    /// Stay open until the client closes
    Hold,
    /// Send a Close frame right away
    Close,
    /// Keep resending the frames on this period until the client goes away
    Repeat(Duration),
}

/// Local WebSocket endpoint that replays fixed frames to every client.
pub struct StreamServer {
    addr: SocketAddr,
    paths: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

impl StreamServer {
    /// Connections stay open until the client closes them
    pub async fn start(frames: Vec<String>) -> Self {
        Self::launch(frames, Ending::Hold).await
    }

    /// The server closes each connection after sending the frames
    pub async fn start_closing(frames: Vec<String>) -> Self {
        Self::launch(frames, Ending::Close).await
    }

    /// Each connection receives `frame` every `period`
    pub async fn start_repeating(frame: String, period: Duration) -> Self {
        Self::launch(vec![frame], Ending::Repeat(period)).await
    }

    async fn launch(frames: Vec<String>, ending: Ending) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let paths = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicUsize::new(0));
        let frames = Arc::new(frames);

        let server_paths = paths.clone();
        let server_closed = closed.clone();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let paths = server_paths.clone();
                let closed = server_closed.clone();
                let frames = frames.clone();

                tokio::spawn(async move {
                    let callback = move |request: &Request, response: Response| -> HandshakeResult {
                        paths.lock().unwrap().push(request.uri().path().to_string());
                        Ok(response)
                    };
                    let Ok(mut ws) = accept_hdr_async(tcp, callback).await else {
                        return;
                    };

                    for frame in frames.iter() {
                        if ws.send(Message::Text(frame.clone())).await.is_err() {
                            return;
                        }
                    }

                    match ending {
                        Ending::Hold => {}
                        Ending::Close => {
                            let _ = ws.close(None).await;
                        }
                        Ending::Repeat(period) => {
                            let mut ticker = tokio::time::interval(period);
                            loop {
                                tokio::select! {
                                    _ = ticker.tick() => {
                                        let frame = frames[0].clone();
                                        if ws.send(Message::Text(frame)).await.is_err() {
                                            break;
                                        }
                                    }
                                    message = ws.next() => match message {
                                        Some(Ok(message)) if !message.is_close() => {}
                                        _ => break,
                                    },
                                }
                            }
                            closed.fetch_add(1, Ordering::SeqCst);
                            return;
                        }
                    }

                    while let Some(Ok(message)) = ws.next().await {
                        if message.is_close() {
                            break;
                        }
                    }
                    closed.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            addr,
            paths,
            closed,
        }
    }

    pub fn ws_base_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Request paths of every accepted handshake, in arrival order
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    pub fn closed_connections(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Poll until `count` clients have closed their connection
    pub async fn wait_for_closed(&self, count: usize) -> bool {
        for _ in 0..50 {
            if self.closed_connections() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}
