//! # websockets-monoio-codec
//!
//! A WebSocket protocol engine for the [`monoio`] async runtime. It speaks
//! RFC 6455 and the older drafts still seen in the wild: hybi-07, hybi-08 and
//! hixie-76/hybi-00 (with a hixie-75 fallback on the server side).
//!
//! ## Features
//!
//! - **Streaming frame codec**: incremental decoding of arbitrarily split
//!   input, masking, minimal length checks and fragment aggregation
//! - **Opening handshakes**: client and server for every supported version,
//!   including the draft-76 MD5 challenge and subprotocol negotiation
//! - **Close handshake**: one close frame per connection, a forced-close
//!   timer, and protocol violations answered with the right status code
//! - **Sans-IO core**: [`Connection`] does no I/O; [`WebSocketStream`] drives
//!   it over any monoio-compatible stream, and [`WsClient`] adds `ws://` and
//!   `wss://` transports
//!
//! ## Basic Example
//!
//! ```no_run
//! use websockets_monoio_codec::{CloseCode, Opcode, WsClient};
//!
//! #[monoio::main(timer_enabled = true)]
//! async fn main() -> anyhow::Result<()> {
//!     let mut client = WsClient::connect("ws://127.0.0.1:9001/echo", &[]).await?;
//!
//!     client.ws.send_text("Hello, WebSocket!").await?;
//!
//!     if let Some(frame) = client.ws.recv().await? {
//!         match frame.opcode {
//!             Opcode::Text => println!("Received: {}", std::str::from_utf8(&frame.payload)?),
//!             Opcode::Close => println!("Closed: {:?}", frame.status_code()),
//!             _ => {}
//!         }
//!     }
//!
//!     client.ws.close(CloseCode::NORMAL, "bye").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Legacy Versions
//!
//! ```no_run
//! use websockets_monoio_codec::{ClientHandshaker, WebSocketConfig, WebSocketVersion, WsClient};
//!
//! # #[monoio::main(timer_enabled = true)]
//! # async fn main() -> anyhow::Result<()> {
//! let handshaker = ClientHandshaker::new("ws://legacy.example.com/feed")?
//!     .version(WebSocketVersion::V00)
//!     .subprotocols(["chat"]);
//! let client = WsClient::connect_with(handshaker, WebSocketConfig::default()).await?;
//! assert_eq!(client.ws.version(), Some(WebSocketVersion::V00));
//! # Ok(())
//! # }
//! ```
//!
//! Timeouts rely on monoio's timer, so runtimes must be built with it
//! enabled (`timer_enabled = true`, or `RuntimeBuilder::enable_timer`).
//!
//! [`monoio`]: https://docs.rs/monoio

pub mod aggregator;
pub mod client;
pub mod close;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod http_upgrade;
pub mod mask;
pub mod server;
pub mod stream;
pub mod tls;
pub mod url;
pub mod utf8;
pub mod violation;

pub use client::{WsClient, WsStream};
pub use close::{CloseFailure, CloseHandle};
pub use codec::{DecoderConfig, FrameCodec, Role};
pub use config::WebSocketConfig;
pub use connection::{Connection, Event, Outbound, Transmit, WriteId};
pub use error::{HandshakeError, WsError};
pub use frame::{CloseCode, Frame, Opcode};
pub use handshake::{ClientHandshaker, ServerHandshaker, WebSocketVersion};
pub use server::{WsServer, accept};
pub use stream::WebSocketStream;
pub use url::{WsUrl, parse_ws_or_wss};
