/// Transport layer shared by every market profile.
///
/// - `Session`: one WebSocket connection plus its receive loop
/// - `FrameHandler`: consumer of inbound text frames
/// - `RestClient` / `ReqwestRest`: HTTP transport with optional signing
/// - `Signer` / `HmacSigner`: query-string signing
/// - `IntervalTimer`: periodic background work (listen-key keepalive)
///
/// The kernel holds no exchange endpoint knowledge; paths and stream names
/// come from `exchanges::binance::endpoints`.
pub mod codec;
pub mod rest;
pub mod signer;
pub mod timer;
pub mod ws;

pub use codec::{frame_text, FrameHandler};
pub use rest::{ReqwestRest, RequestAuth, RestClient, RestClientBuilder, RestClientConfig};
pub use signer::{HmacSigner, SignatureResult, Signer};
pub use timer::IntervalTimer;
pub use ws::{Session, WsConfig, WsStream};
