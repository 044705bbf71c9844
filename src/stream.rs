//! Async driver running a [`Connection`] over a monoio-compatible stream.

use std::future::Future;
use std::io;
use std::time::{Duration, Instant};

use bytes::Bytes;
use monoio_compat::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::config::WebSocketConfig;
use crate::connection::{Connection, Event, Outbound};
use crate::error::{HandshakeError, WsError};
use crate::frame::{CloseCode, Frame};
use crate::handshake::{ClientHandshaker, ServerHandshaker, WebSocketVersion};
use crate::http_upgrade;

const READ_BUF_LEN: usize = 8 * 1024;

/// An open WebSocket over `S`.
///
/// Pings are answered and peer close frames echoed while [`recv`] runs, so
/// keep a reader going for the lifetime of the connection.
///
/// [`recv`]: WebSocketStream::recv
pub struct WebSocketStream<S> {
    io: S,
    conn: Connection,
    read_buf: Vec<u8>,
}

impl<S> std::fmt::Debug for WebSocketStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketStream")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

async fn with_deadline<F, T>(timeout: Option<Duration>, fut: F) -> Result<T, WsError>
where
    F: Future<Output = Result<T, WsError>>,
{
    match timeout {
        Some(timeout) => monoio::time::timeout(timeout, fut)
            .await
            .map_err(|_| WsError::Handshake(HandshakeError::Timeout))?,
        None => fut.await,
    }
}

impl<S> WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn from_parts(io: S, conn: Connection) -> Self {
        Self {
            io,
            conn,
            read_buf: vec![0; READ_BUF_LEN],
        }
    }

    /// Runs the client handshake over `io`.
    pub async fn client_handshake(
        io: S,
        handshaker: ClientHandshaker,
        config: WebSocketConfig,
    ) -> Result<Self, WsError> {
        let timeout = config.handshake_timeout;
        let conn = Connection::client(handshaker, config, Instant::now())?;
        let mut stream = Self::from_parts(io, conn);
        with_deadline(timeout, async {
            stream.flush().await?;
            let body_len = stream.conn.expected_response_body_len();
            let (response, leftover) = http_upgrade::read_response(&mut stream.io, body_len).await?;
            stream.conn.handle_handshake_response(&response, Instant::now())?;
            stream.conn.handle_read(&leftover, Instant::now())?;
            Ok::<(), WsError>(())
        })
        .await?;
        Ok(stream)
    }

    /// Runs the server handshake over `io`. A rejected request is answered
    /// with an error response before this returns the error.
    pub async fn server_handshake(
        io: S,
        handshaker: ServerHandshaker,
        config: WebSocketConfig,
    ) -> Result<Self, WsError> {
        let timeout = config.handshake_timeout;
        let conn = Connection::server(handshaker, config, Instant::now());
        let mut stream = Self::from_parts(io, conn);
        with_deadline(timeout, async {
            let (request, leftover) = http_upgrade::read_request(&mut stream.io).await?;
            let accepted = stream.conn.handle_handshake_request(&request);
            stream.conn.handle_read(&leftover, Instant::now())?;
            stream.flush().await?;
            accepted
        })
        .await?;
        Ok(stream)
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.conn.subprotocol()
    }

    #[must_use]
    pub fn version(&self) -> Option<WebSocketVersion> {
        self.conn.version()
    }

    pub fn get_ref(&self) -> &S {
        &self.io
    }

    pub fn into_inner(self) -> S {
        self.io
    }

    /// Sends one frame.
    pub async fn send(&mut self, frame: Frame) -> Result<(), WsError> {
        self.conn.send(frame, Instant::now())?;
        self.flush().await
    }

    pub async fn send_text(&mut self, text: impl Into<Bytes>) -> Result<(), WsError> {
        self.send(Frame::text(text)).await
    }

    pub async fn send_binary(&mut self, data: impl Into<Bytes>) -> Result<(), WsError> {
        self.send(Frame::binary(data)).await
    }

    /// Sends a close frame and waits until it is written or the
    /// forced-close timer fires.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), WsError> {
        let handle = self.conn.close(code, reason, Instant::now())?;
        self.flush().await?;
        match handle.outcome() {
            Some(Err(failure)) => Err(failure.into()),
            _ => Ok(()),
        }
    }

    /// Next message, or `None` once the transport has closed.
    pub async fn recv(&mut self) -> Result<Option<Frame>, WsError> {
        loop {
            if let Some(frame) = self.conn.poll_frame() {
                return Ok(Some(frame));
            }
            self.flush().await?;
            if !self.conn.is_transport_open() {
                return Ok(None);
            }

            let read = match self.conn.poll_timeout() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match monoio::time::timeout(wait, self.io.read(&mut self.read_buf)).await {
                        Ok(read) => read,
                        Err(_) => {
                            self.conn.handle_timeout(Instant::now());
                            continue;
                        }
                    }
                }
                None => self.io.read(&mut self.read_buf).await,
            };

            match read {
                Ok(0) => self.conn.handle_transport_closed(),
                Ok(n) => {
                    if let Err(err) = self.conn.handle_read(&self.read_buf[..n], Instant::now()) {
                        // Best effort: deliver the close frame the violation queued.
                        if let Err(flush_err) = self.flush().await {
                            debug!(error = %flush_err, "failed to flush after protocol violation");
                        }
                        return Err(err);
                    }
                }
                Err(err) => {
                    self.conn.handle_transport_closed();
                    return Err(err.into());
                }
            }
        }
    }

    /// Writes every queued transmit and applies the resulting events.
    /// Keeps draining after a failure and returns the first error.
    async fn flush(&mut self) -> Result<(), WsError> {
        let mut first_err: Option<WsError> = None;
        while let Some(transmit) = self.conn.poll_transmit() {
            let write = write_outbound(&mut self.io, transmit.data);
            let result = match self.conn.poll_timeout() {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match monoio::time::timeout(wait, write).await {
                        Ok(result) => result,
                        Err(_) => {
                            self.conn.handle_timeout(Instant::now());
                            Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"))
                        }
                    }
                }
                None => write.await,
            };
            if let Err(err) = self.conn.handle_write_complete(transmit.id, &result, Instant::now()) {
                first_err.get_or_insert(err);
            }
            if let Err(err) = result {
                first_err.get_or_insert(err.into());
            }
        }

        while let Some(event) = self.conn.poll_event() {
            match event {
                Event::CloseTransport => {
                    trace!("shutting websocket transport down");
                    if let Err(err) = self.io.shutdown().await {
                        debug!(error = %err, "websocket transport shutdown failed");
                    }
                }
                other => trace!(event = ?other, "websocket event"),
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn write_outbound<S>(io: &mut S, data: Outbound) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    match data {
        Outbound::Frame(bytes) => io.write_all(&bytes).await?,
        Outbound::Request(request) => io.write_all(&http_upgrade::encode_request(&request)).await?,
        Outbound::Response(response) => io.write_all(&http_upgrade::encode_response(&response)).await?,
    }
    io.flush().await
}
