//! Reaction to protocol violations: corrupt the decoder, pick a close
//! status, and decide whether the transport goes down.

use tracing::debug;

use crate::codec::FrameDecoder;
use crate::error::WsError;
use crate::frame::{CloseCode, Frame};

/// What the connection should do after a protocol violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationResponse {
    /// Leave the transport alone; the error still reaches the caller.
    Ignore,
    /// Close the transport without writing anything.
    CloseTransport,
    /// Write this close frame, then close the transport.
    SendClose(Frame),
}

/// Turns decoder and validation failures into a close reaction.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolViolationHandler {
    close_on_violation: bool,
}

impl ProtocolViolationHandler {
    #[must_use]
    pub fn new(close_on_violation: bool) -> Self {
        Self { close_on_violation }
    }

    /// Marks `decoder` corrupt and decides how to answer `err`.
    ///
    /// `close_in_progress` is true when either side already sent a close
    /// frame; the peer then gets no second one.
    pub fn handle(
        &self,
        err: &WsError,
        decoder: &mut FrameDecoder,
        transport_open: bool,
        close_in_progress: bool,
    ) -> ViolationResponse {
        decoder.mark_corrupt();
        debug!(error = %err, "websocket protocol violation");

        if !transport_open || !self.close_on_violation {
            return ViolationResponse::Ignore;
        }
        if close_in_progress || decoder.received_close() {
            return ViolationResponse::CloseTransport;
        }
        let status = err.close_status().unwrap_or(CloseCode::PROTOCOL_ERROR);
        ViolationResponse::SendClose(Frame::close(status, &err.to_string()))
    }
}
