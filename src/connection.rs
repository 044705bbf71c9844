//! Sans-IO WebSocket connection.
//!
//! [`Connection`] performs no I/O and reads no clock. The driver feeds it
//! inbound bytes and write completions, and drains what it produces:
//!
//! * [`Connection::poll_transmit`] yields requests, responses and encoded
//!   frames to write. Every write is reported back with
//!   [`Connection::handle_write_complete`].
//! * [`Connection::poll_frame`] yields received messages.
//! * [`Connection::poll_event`] yields handshake and transport events.
//! * [`Connection::poll_timeout`] / [`Connection::handle_timeout`] drive the
//!   handshake deadline and the forced-close timer.

use std::collections::VecDeque;
use std::io;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use http::{Request, Response};
use tracing::{debug, trace, warn};

use crate::aggregator::FrameAggregator;
use crate::close::{CloseCoordinator, CloseHandle};
use crate::codec::{Decoder, Encoder, FrameCodec, Role};
use crate::config::WebSocketConfig;
use crate::error::{HandshakeError, WsError};
use crate::frame::{CloseCode, Frame, Opcode};
use crate::handshake::{ClientHandshaker, HandshakeState, Negotiated, ServerHandshaker, WebSocketVersion};
use crate::utf8::Utf8Validator;
use crate::violation::{ProtocolViolationHandler, ViolationResponse};

/// Identifies one queued write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriteId(u64);

impl WriteId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Something to put on the wire.
#[derive(Debug)]
pub enum Outbound {
    Request(Request<Bytes>),
    Response(Response<Bytes>),
    /// Encoded frame bytes.
    Frame(Bytes),
}

#[derive(Debug)]
pub struct Transmit {
    pub id: WriteId,
    pub data: Outbound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    HandshakeComplete {
        version: WebSocketVersion,
        subprotocol: Option<String>,
    },
    HandshakeTimedOut,
    /// The driver should shut the transport down.
    CloseTransport,
}

#[derive(Debug)]
enum Handshaker {
    Client(ClientHandshaker),
    Server(ServerHandshaker),
}

#[derive(Debug)]
enum Stage {
    /// Waiting for the peer's request or response.
    Handshake,
    /// The 101 response is queued. Frames are buffered until it is written.
    Upgrading {
        response: WriteId,
        codec: FrameCodec,
        negotiated: Negotiated,
    },
    Open(FrameCodec),
    Failed,
}

#[derive(Debug)]
pub struct Connection {
    role: Role,
    config: WebSocketConfig,
    handshaker: Handshaker,
    handshake: HandshakeState,
    stage: Stage,
    version: Option<WebSocketVersion>,
    inbound: BytesMut,
    frames: VecDeque<Frame>,
    transmits: VecDeque<Transmit>,
    events: VecDeque<Event>,
    next_write: u64,
    handshake_deadline: Option<Instant>,
    handshake_timed_out: bool,
    close: CloseCoordinator,
    violations: ProtocolViolationHandler,
    aggregator: FrameAggregator,
    utf8: Utf8Validator,
    transport_open: bool,
    close_transport_after: Option<WriteId>,
}

impl Connection {
    /// Client connection with its upgrade request already queued.
    pub fn client(
        mut handshaker: ClientHandshaker,
        config: WebSocketConfig,
        now: Instant,
    ) -> Result<Self, HandshakeError> {
        let request = handshaker.new_request()?;
        let mut conn = Self::new(Role::Client, Handshaker::Client(handshaker), config, now);
        conn.queue(Outbound::Request(request));
        Ok(conn)
    }

    /// Server connection waiting for an upgrade request.
    #[must_use]
    pub fn server(handshaker: ServerHandshaker, config: WebSocketConfig, now: Instant) -> Self {
        Self::new(Role::Server, Handshaker::Server(handshaker), config, now)
    }

    fn new(role: Role, handshaker: Handshaker, config: WebSocketConfig, now: Instant) -> Self {
        Self {
            role,
            handshaker,
            handshake: HandshakeState::default(),
            stage: Stage::Handshake,
            version: None,
            inbound: BytesMut::new(),
            frames: VecDeque::new(),
            transmits: VecDeque::new(),
            events: VecDeque::new(),
            next_write: 0,
            handshake_deadline: config.handshake_timeout.map(|timeout| now + timeout),
            handshake_timed_out: false,
            close: CloseCoordinator::new(config.forced_close_timeout),
            violations: ProtocolViolationHandler::new(config.close_on_protocol_violation),
            aggregator: FrameAggregator::new(config.max_message_len),
            utf8: Utf8Validator::new(),
            transport_open: true,
            close_transport_after: None,
            config,
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Negotiated version, once the handshake has completed.
    #[must_use]
    pub fn version(&self) -> Option<WebSocketVersion> {
        self.version
    }

    #[must_use]
    pub fn is_handshake_complete(&self) -> bool {
        self.handshake.is_complete()
    }

    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.handshake.selected_subprotocol()
    }

    /// Whether frames can be exchanged.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.stage, Stage::Open(_)) && self.transport_open
    }

    #[must_use]
    pub fn is_transport_open(&self) -> bool {
        self.transport_open
    }

    /// Handle of the close this end initiated, if any.
    #[must_use]
    pub fn close_handle(&self) -> Option<CloseHandle> {
        self.close.handle()
    }

    /// Body bytes expected after the response head, for client drivers.
    #[must_use]
    pub fn expected_response_body_len(&self) -> usize {
        match &self.handshaker {
            Handshaker::Client(client) => client.expected_response_body_len(),
            Handshaker::Server(_) => 0,
        }
    }

    /// Client side: validates the server's response and opens the
    /// connection.
    pub fn handle_handshake_response(
        &mut self,
        response: &Response<Bytes>,
        now: Instant,
    ) -> Result<(), WsError> {
        self.check_handshake_pending()?;
        let result = match &self.handshaker {
            Handshaker::Client(client) => client.finish(response),
            Handshaker::Server(_) => Err(HandshakeError::NoRequest),
        };
        match result {
            Ok(negotiated) => {
                let codec = FrameCodec::new(
                    negotiated.version,
                    self.role,
                    self.config.decoder_config(self.role),
                );
                self.open(codec, negotiated);
                self.decode_inbound(now)
            }
            Err(err) => {
                warn!(error = %err, "websocket client handshake failed");
                self.fail_handshake();
                Err(err.into())
            }
        }
    }

    /// Server side: validates the upgrade request and queues the response.
    /// A rejected request gets a 426 or 400 and the transport is closed
    /// once that is written.
    pub fn handle_handshake_request(&mut self, request: &Request<Bytes>) -> Result<(), WsError> {
        self.check_handshake_pending()?;
        let result = match &self.handshaker {
            Handshaker::Server(server) => server.handshake(request),
            Handshaker::Client(_) => Err(HandshakeError::NoRequest),
        };
        match result {
            Ok(accepted) => {
                let codec = FrameCodec::new(
                    accepted.version,
                    self.role,
                    self.config.decoder_config(self.role),
                );
                let response = self.queue(Outbound::Response(accepted.response));
                self.stage = Stage::Upgrading {
                    response,
                    codec,
                    negotiated: Negotiated {
                        version: accepted.version,
                        subprotocol: accepted.subprotocol,
                    },
                };
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "rejecting websocket upgrade");
                let response = self.queue(Outbound::Response(ServerHandshaker::reject(&err)));
                self.close_transport_after = Some(response);
                self.stage = Stage::Failed;
                self.handshake_deadline = None;
                Err(err.into())
            }
        }
    }

    /// Feeds bytes read from the transport.
    pub fn handle_read(&mut self, data: &[u8], now: Instant) -> Result<(), WsError> {
        if !self.transport_open || matches!(self.stage, Stage::Failed) {
            return Ok(());
        }
        self.inbound.extend_from_slice(data);
        self.decode_inbound(now)
    }

    /// The peer closed the transport.
    pub fn handle_transport_closed(&mut self) {
        if self.transport_open {
            debug!("websocket transport closed by peer");
            self.transport_open = false;
            self.transmits.clear();
            self.close.abandon();
        }
    }

    /// Next received message.
    pub fn poll_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Queues a frame. A close frame starts the close handshake; anything
    /// sent after that fails with [`WsError::ChannelClosed`] and is dropped.
    pub fn send(&mut self, frame: Frame, now: Instant) -> Result<(), WsError> {
        if !self.transport_open {
            return Err(WsError::ChannelClosed);
        }
        self.close.check_writable()?;
        if frame.opcode == Opcode::Close {
            self.begin_close(frame, now)?;
            return Ok(());
        }
        self.write_frame(frame)?;
        Ok(())
    }

    /// Starts the close handshake, once. Later calls return the same handle.
    pub fn close(&mut self, code: CloseCode, reason: &str, now: Instant) -> Result<CloseHandle, WsError> {
        if let Some(handle) = self.close.handle() {
            return Ok(handle);
        }
        if !self.is_open() {
            self.close_transport();
            return Ok(CloseHandle::resolved(Ok(())));
        }
        self.begin_close(Frame::close(code, reason), now)
    }

    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.transmits.pop_front()
    }

    /// Reports the outcome of a write taken from [`Connection::poll_transmit`].
    pub fn handle_write_complete(
        &mut self,
        id: WriteId,
        result: &io::Result<()>,
        now: Instant,
    ) -> Result<(), WsError> {
        if let Err(err) = result {
            warn!(?id, error = %err, "websocket write failed");
        }

        match std::mem::replace(&mut self.stage, Stage::Failed) {
            Stage::Upgrading {
                response,
                codec,
                negotiated,
            } if response == id => {
                if result.is_err() {
                    self.fail_handshake();
                    return Ok(());
                }
                self.open(codec, negotiated);
                return self.decode_inbound(now);
            }
            stage => self.stage = stage,
        }

        let close_written = self.close.on_write_complete(id, result);
        if self.close_transport_after == Some(id) {
            self.close_transport_after = None;
            self.close_transport();
        } else if close_written || result.is_err() {
            self.close_transport();
        }
        Ok(())
    }

    /// Earliest deadline the driver should wake up for.
    #[must_use]
    pub fn poll_timeout(&self) -> Option<Instant> {
        [self.handshake_deadline, self.close.deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn handle_timeout(&mut self, now: Instant) {
        if let Some(deadline) = self.handshake_deadline {
            if now >= deadline && !self.handshake.is_complete() {
                warn!("websocket handshake timed out");
                self.handshake_timed_out = true;
                self.fail_handshake();
                self.events.push_back(Event::HandshakeTimedOut);
            }
        }
        if self.close.on_timeout(now) {
            self.close_transport();
        }
    }

    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    fn queue(&mut self, data: Outbound) -> WriteId {
        let id = WriteId(self.next_write);
        self.next_write += 1;
        self.transmits.push_back(Transmit { id, data });
        id
    }

    fn write_frame(&mut self, frame: Frame) -> Result<WriteId, WsError> {
        let Stage::Open(codec) = &mut self.stage else {
            return Err(WsError::NotOpen);
        };
        let mut buf = BytesMut::with_capacity(frame.payload.len() + 14);
        codec.encode(frame, &mut buf)?;
        Ok(self.queue(Outbound::Frame(buf.freeze())))
    }

    fn begin_close(&mut self, frame: Frame, now: Instant) -> Result<CloseHandle, WsError> {
        if let Some(handle) = self.close.handle() {
            return Ok(handle);
        }
        let id = self.write_frame(frame)?;
        Ok(self.close.close_sent(id, now))
    }

    fn open(&mut self, codec: FrameCodec, negotiated: Negotiated) {
        debug!(
            role = ?self.role,
            version = ?negotiated.version,
            subprotocol = ?negotiated.subprotocol,
            "websocket handshake complete"
        );
        self.handshake_deadline = None;
        self.version = Some(negotiated.version);
        self.handshake.complete(negotiated.subprotocol.clone());
        self.events.push_back(Event::HandshakeComplete {
            version: negotiated.version,
            subprotocol: negotiated.subprotocol,
        });
        self.stage = Stage::Open(codec);
    }

    fn check_handshake_pending(&self) -> Result<(), HandshakeError> {
        match self.stage {
            Stage::Handshake => Ok(()),
            Stage::Failed if self.handshake_timed_out => Err(HandshakeError::Timeout),
            Stage::Failed => Err(HandshakeError::Failed),
            Stage::Upgrading { .. } | Stage::Open(_) => Err(HandshakeError::AlreadyComplete),
        }
    }

    fn fail_handshake(&mut self) {
        self.stage = Stage::Failed;
        self.handshake_deadline = None;
        self.close_transport();
    }

    fn close_transport(&mut self) {
        if !self.transport_open {
            return;
        }
        trace!("closing websocket transport");
        self.transport_open = false;
        self.transmits.clear();
        self.close.abandon();
        self.events.push_back(Event::CloseTransport);
    }

    fn decode_inbound(&mut self, now: Instant) -> Result<(), WsError> {
        loop {
            let Stage::Open(codec) = &mut self.stage else {
                return Ok(());
            };
            let frame = match codec.decode(&mut self.inbound) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(err) => return Err(self.on_violation(err, now)),
            };
            trace!(
                opcode = ?frame.opcode,
                fin = frame.fin,
                len = frame.payload.len(),
                "websocket frame received"
            );
            if let Err(err) = self.on_frame(frame, now) {
                return Err(self.on_violation(err, now));
            }
        }
    }

    fn on_frame(&mut self, frame: Frame, now: Instant) -> Result<(), WsError> {
        match frame.opcode {
            Opcode::Ping => {
                if !self.close.is_close_sent() {
                    self.write_frame(Frame::pong(frame.payload))?;
                }
                Ok(())
            }
            Opcode::Pong => {
                if !self.config.drop_pong_frames {
                    self.frames.push_back(frame);
                }
                Ok(())
            }
            Opcode::Close => {
                self.on_peer_close(frame, now);
                Ok(())
            }
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                self.check_utf8(&frame)?;
                if let Some(message) = self.aggregator.push(frame)? {
                    self.frames.push_back(message);
                }
                Ok(())
            }
        }
    }

    fn on_peer_close(&mut self, frame: Frame, now: Instant) {
        debug!(
            status = ?frame.status_code(),
            reason = frame.reason_text(),
            "websocket close frame received"
        );
        let reply = match frame.status_code() {
            Some(code) => Frame::close(code, ""),
            None => Frame::close_empty(),
        };
        self.frames.push_back(frame);
        if !self.close.is_close_sent() {
            if let Err(err) = self.begin_close(reply, now) {
                warn!(error = %err, "failed to answer close frame");
                self.close_transport();
            }
        }
    }

    fn check_utf8(&mut self, frame: &Frame) -> Result<(), WsError> {
        if !self.config.utf8_validation {
            return Ok(());
        }
        let continues_text = frame.opcode == Opcode::Continuation && self.utf8.is_checking();
        if frame.opcode == Opcode::Text {
            self.utf8.reset();
        } else if !continues_text {
            return Ok(());
        }
        self.utf8.check(&frame.payload)?;
        if frame.fin {
            self.utf8.finish()?;
        }
        Ok(())
    }

    fn on_violation(&mut self, err: WsError, now: Instant) -> WsError {
        if !err.is_protocol_violation() {
            return err;
        }
        let Stage::Open(codec) = &mut self.stage else {
            return err;
        };
        let response = self.violations.handle(
            &err,
            codec.decoder_mut(),
            self.transport_open,
            self.close.is_close_sent(),
        );
        self.inbound.clear();
        self.aggregator.reset();
        self.utf8.reset();

        match response {
            ViolationResponse::Ignore => {}
            ViolationResponse::CloseTransport => match self.close.pending_write() {
                // Our close frame is still queued; it goes out first.
                Some(write) => self.close_transport_after = Some(write),
                None => self.close_transport(),
            },
            ViolationResponse::SendClose(frame) => {
                if self.begin_close(frame, now).is_err() {
                    self.close_transport();
                }
            }
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::HybiEncoder;
    use http::header::{CONNECTION, HOST, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE};

    fn upgrade_request() -> Request<Bytes> {
        Request::builder()
            .uri("/")
            .header(HOST, "localhost")
            .header(UPGRADE, "websocket")
            .header(CONNECTION, "Upgrade")
            .header(SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .header(SEC_WEBSOCKET_VERSION, "13")
            .body(Bytes::new())
            .unwrap()
    }

    fn client_frame(frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        HybiEncoder::new(true)
            .encode_with_mask(frame, Some([9, 8, 7, 6]), &mut buf)
            .unwrap();
        buf
    }

    fn open_server(now: Instant) -> Connection {
        let mut conn = Connection::server(ServerHandshaker::new(), WebSocketConfig::default(), now);
        conn.handle_handshake_request(&upgrade_request()).unwrap();
        let transmit = conn.poll_transmit().unwrap();
        assert!(matches!(transmit.data, Outbound::Response(_)));
        conn.handle_write_complete(transmit.id, &Ok(()), now).unwrap();
        assert!(conn.is_open());
        conn
    }

    fn written(conn: &mut Connection) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(transmit) = conn.poll_transmit() {
            if let Outbound::Frame(bytes) = transmit.data {
                out.push(bytes);
            }
        }
        out
    }

    #[test]
    fn frames_buffered_until_upgrade_written() {
        let now = Instant::now();
        let mut conn = Connection::server(ServerHandshaker::new(), WebSocketConfig::default(), now);
        conn.handle_handshake_request(&upgrade_request()).unwrap();
        conn.handle_read(&client_frame(Frame::text("early")), now).unwrap();
        assert!(conn.poll_frame().is_none());
        assert!(!conn.is_handshake_complete());

        let transmit = conn.poll_transmit().unwrap();
        conn.handle_write_complete(transmit.id, &Ok(()), now).unwrap();
        assert_eq!(conn.poll_frame().unwrap(), Frame::text("early"));
        assert_eq!(
            conn.poll_event(),
            Some(Event::HandshakeComplete {
                version: WebSocketVersion::V13,
                subprotocol: None
            })
        );
    }

    #[test]
    fn ping_answered_with_pong() {
        let now = Instant::now();
        let mut conn = open_server(now);
        conn.handle_read(&client_frame(Frame::ping("hb")), now).unwrap();
        assert!(conn.poll_frame().is_none());
        let out = written(&mut conn);
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], &[0x8A, 0x02, b'h', b'b']);
    }

    #[test]
    fn pong_surfaced_when_not_dropped() {
        let now = Instant::now();
        let config = WebSocketConfig::default().drop_pong_frames(false);
        let mut conn = Connection::server(ServerHandshaker::new(), config, now);
        conn.handle_handshake_request(&upgrade_request()).unwrap();
        let transmit = conn.poll_transmit().unwrap();
        conn.handle_write_complete(transmit.id, &Ok(()), now).unwrap();
        conn.handle_read(&client_frame(Frame::pong("x")), now).unwrap();
        assert_eq!(conn.poll_frame().unwrap().opcode, Opcode::Pong);
    }

    #[test]
    fn peer_close_echoed_then_transport_closed() {
        let now = Instant::now();
        let mut conn = open_server(now);
        conn.poll_event();
        conn.handle_read(&client_frame(Frame::close(CloseCode::NORMAL, "bye")), now)
            .unwrap();
        let received = conn.poll_frame().unwrap();
        assert_eq!(received.reason_text(), "bye");

        let transmit = conn.poll_transmit().unwrap();
        let Outbound::Frame(bytes) = &transmit.data else {
            panic!("expected a frame");
        };
        assert_eq!(&bytes[..], &[0x88, 0x02, 0x03, 0xE8]);
        assert!(conn.close_handle().is_some());
        conn.handle_write_complete(transmit.id, &Ok(()), now).unwrap();
        assert_eq!(conn.poll_event(), Some(Event::CloseTransport));
        assert!(!conn.is_transport_open());
    }

    #[test]
    fn invalid_utf8_closes_with_1007() {
        let now = Instant::now();
        let mut conn = open_server(now);
        let err = conn
            .handle_read(&client_frame(Frame::text(vec![0xC0u8, 0x80])), now)
            .unwrap_err();
        assert_eq!(err.close_status(), Some(CloseCode::INVALID_PAYLOAD_DATA));
        let out = written(&mut conn);
        assert_eq!(&out[0][..4], &[0x88, 0x15, 0x03, 0xEF]);
    }

    #[test]
    fn utf8_checked_across_fragments() {
        let now = Instant::now();
        let mut conn = open_server(now);
        let text = "κόσμε".as_bytes();
        let mut wire = client_frame(Frame::new(Opcode::Text, false, 0, text[..3].to_vec()));
        wire.extend_from_slice(&client_frame(Frame::continuation(true, text[3..].to_vec())));
        conn.handle_read(&wire, now).unwrap();
        assert_eq!(conn.poll_frame().unwrap(), Frame::text("κόσμε"));
    }

    #[test]
    fn violation_without_auto_close_leaves_transport_open() {
        let now = Instant::now();
        let config = WebSocketConfig::default().close_on_protocol_violation(false);
        let mut conn = Connection::server(ServerHandshaker::new(), config, now);
        conn.handle_handshake_request(&upgrade_request()).unwrap();
        let transmit = conn.poll_transmit().unwrap();
        conn.handle_write_complete(transmit.id, &Ok(()), now).unwrap();

        // Unmasked frame from a client.
        assert!(conn.handle_read(&[0x81, 0x00], now).is_err());
        assert!(conn.is_transport_open());
        assert!(conn.poll_transmit().is_none());
        // Corrupt: even valid frames are now ignored.
        conn.handle_read(&client_frame(Frame::text("x")), now).unwrap();
        assert!(conn.poll_frame().is_none());
    }

    #[test]
    fn handshake_timeout_fires() {
        let now = Instant::now();
        let mut conn = Connection::server(ServerHandshaker::new(), WebSocketConfig::default(), now);
        let deadline = conn.poll_timeout().unwrap();
        conn.handle_timeout(deadline - std::time::Duration::from_millis(1));
        assert!(conn.poll_event().is_none());
        conn.handle_timeout(deadline);
        assert_eq!(conn.poll_event(), Some(Event::CloseTransport));
        assert_eq!(conn.poll_event(), Some(Event::HandshakeTimedOut));
        assert!(conn.poll_timeout().is_none());
    }

    #[test]
    fn violation_after_local_close_keeps_queued_close_frame() {
        let now = Instant::now();
        let mut conn = open_server(now);
        while conn.poll_event().is_some() {}
        let handle = conn.close(CloseCode::NORMAL, "bye", now).unwrap();

        // RSV1 without a negotiated extension.
        assert!(conn.handle_read(&[0xC1, 0x80, 1, 2, 3, 4], now).is_err());
        assert!(conn.is_transport_open());
        assert_eq!(handle.outcome(), None);

        let transmit = conn.poll_transmit().unwrap();
        let Outbound::Frame(bytes) = &transmit.data else {
            panic!("expected a frame");
        };
        assert_eq!(&bytes[..], &[0x88, 0x05, 0x03, 0xE8, b'b', b'y', b'e']);
        assert!(conn.poll_transmit().is_none());

        conn.handle_write_complete(transmit.id, &Ok(()), now).unwrap();
        assert_eq!(handle.outcome(), Some(Ok(())));
        assert_eq!(conn.poll_event(), Some(Event::CloseTransport));
        assert!(!conn.is_transport_open());
    }

    #[test]
    fn late_response_after_timeout_reports_timeout() {
        let now = Instant::now();
        let handshaker = ClientHandshaker::new("ws://localhost/").unwrap();
        let mut conn = Connection::client(handshaker, WebSocketConfig::default(), now).unwrap();
        let deadline = conn.poll_timeout().unwrap();
        conn.handle_timeout(deadline);

        let response = Response::builder().status(101).body(Bytes::new()).unwrap();
        let err = conn.handle_handshake_response(&response, deadline).unwrap_err();
        assert!(matches!(err, WsError::Handshake(HandshakeError::Timeout)));
    }

    #[test]
    fn second_request_after_rejection_reports_failure() {
        let now = Instant::now();
        let mut conn = Connection::server(ServerHandshaker::new(), WebSocketConfig::default(), now);
        let mut request = upgrade_request();
        request.headers_mut().remove(SEC_WEBSOCKET_KEY);
        assert!(conn.handle_handshake_request(&request).is_err());

        let err = conn.handle_handshake_request(&upgrade_request()).unwrap_err();
        assert!(matches!(err, WsError::Handshake(HandshakeError::Failed)));
    }

    #[test]
    fn send_before_open_fails() {
        let now = Instant::now();
        let mut conn = Connection::server(ServerHandshaker::new(), WebSocketConfig::default(), now);
        assert!(matches!(conn.send(Frame::text("x"), now), Err(WsError::NotOpen)));
    }
}
