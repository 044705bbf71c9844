use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use monoio::net::{TcpListener, TcpStream};
use monoio_compat::StreamWrapper;
use tracing::debug;

use crate::config::WebSocketConfig;
use crate::error::WsError;
use crate::handshake::ServerHandshaker;
use crate::stream::WebSocketStream;

pub type ServerStream = WebSocketStream<StreamWrapper<TcpStream>>;

/// Runs the server handshake on an accepted TCP connection.
pub async fn accept(
    tcp: TcpStream,
    handshaker: ServerHandshaker,
    config: WebSocketConfig,
) -> Result<ServerStream, WsError> {
    WebSocketStream::server_handshake(StreamWrapper::new(tcp), handshaker, config).await
}

/// TCP listener handing out connections that still need their handshake.
pub struct WsServer {
    listener: TcpListener,
    handshaker: ServerHandshaker,
    config: WebSocketConfig,
}

impl WsServer {
    pub fn bind(
        addr: impl ToSocketAddrs,
        handshaker: ServerHandshaker,
        config: WebSocketConfig,
    ) -> io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
            handshaker,
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection. Run [`PendingUpgrade::handshake`]
    /// on its own task so a slow client does not hold up the listener.
    pub async fn accept(&self) -> io::Result<(PendingUpgrade, SocketAddr)> {
        let (tcp, peer) = self.listener.accept().await?;
        debug!(%peer, "accepted websocket transport");
        Ok((
            PendingUpgrade {
                tcp,
                handshaker: self.handshaker.clone(),
                config: self.config.clone(),
            },
            peer,
        ))
    }
}

pub struct PendingUpgrade {
    tcp: TcpStream,
    handshaker: ServerHandshaker,
    config: WebSocketConfig,
}

impl PendingUpgrade {
    pub async fn handshake(self) -> Result<ServerStream, WsError> {
        accept(self.tcp, self.handshaker, self.config).await
    }
}
