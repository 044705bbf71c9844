use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::Result;
use monoio::net::TcpStream;
use monoio_compat::StreamWrapper;
use tracing::debug;

use crate::config::WebSocketConfig;
use crate::handshake::ClientHandshaker;
use crate::stream::WebSocketStream;
use crate::tls::{connect_wss, default_connector};
use crate::url::Scheme;

/// A unified IO stream that can be plain TCP or TLS over TCP, both wrapped
/// in `monoio_compat::StreamWrapper` to provide AsyncRead/AsyncWrite.
#[allow(clippy::large_enum_variant)]
pub enum AnyStream {
    Plain(StreamWrapper<TcpStream>),
    Tls(StreamWrapper<monoio_rustls::ClientTlsStream<TcpStream>>),
}

macro_rules! delegate {
    ($self:ident, $inner:ident => $call:expr) => {
        match $self.get_mut() {
            AnyStream::Plain($inner) => $call,
            AnyStream::Tls($inner) => $call,
        }
    };
}

impl monoio_compat::AsyncRead for AnyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        delegate!(self, s => Pin::new(s).poll_read(cx, buf))
    }
}

impl monoio_compat::AsyncWrite for AnyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        delegate!(self, s => Pin::new(s).poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        delegate!(self, s => Pin::new(s).poll_flush(cx))
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        delegate!(self, s => Pin::new(s).poll_shutdown(cx))
    }
}

/// Exposed stream type used by `WsClient`.
pub type WsStream = WebSocketStream<AnyStream>;

pub struct WsClient {
    pub ws: WsStream,
}

impl WsClient {
    /// Connect to a `ws://` or `wss://` URL and complete an RFC 6455
    /// handshake with default settings.
    pub async fn connect(url: &str, extra_headers: &[(&str, &str)]) -> Result<Self> {
        let mut handshaker = ClientHandshaker::new(url)?;
        for (name, value) in extra_headers {
            handshaker = handshaker.header(name, value)?;
        }
        Self::connect_with(handshaker, WebSocketConfig::default()).await
    }

    /// Connect using a configured handshaker, e.g. to pick a protocol
    /// version or offer subprotocols.
    pub async fn connect_with(handshaker: ClientHandshaker, config: WebSocketConfig) -> Result<Self> {
        let url = handshaker.url().clone();

        // Establish underlying transport (TCP or TLS over TCP)
        let stream = match url.scheme {
            Scheme::Ws => {
                let tcp = TcpStream::connect((url.host.as_str(), url.port)).await?;
                AnyStream::Plain(StreamWrapper::new(tcp))
            }
            Scheme::Wss => {
                let tls = connect_wss(&url, default_connector()).await?;
                AnyStream::Tls(StreamWrapper::new(tls))
            }
        };
        debug!(%url, version = ?handshaker.protocol_version(), "websocket transport connected");

        let ws = WebSocketStream::client_handshake(stream, handshaker, config).await?;
        Ok(Self { ws })
    }

    pub fn into_inner(self) -> WsStream {
        self.ws
    }
}
