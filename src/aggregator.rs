//! Joins fragmented messages into one final frame.

use bytes::BytesMut;
use tracing::debug;

use crate::error::WsError;
use crate::frame::{Frame, Opcode};

#[derive(Debug)]
struct PendingMessage {
    opcode: Opcode,
    rsv: u8,
    buf: BytesMut,
}

/// Accumulates a Text or Binary start frame and its continuations.
///
/// Control frames and complete single-frame messages pass straight through,
/// so pings interleaved inside a fragmented message are not delayed.
#[derive(Debug)]
pub struct FrameAggregator {
    max_message_len: usize,
    pending: Option<PendingMessage>,
    discarding: bool,
}

impl FrameAggregator {
    #[must_use]
    pub fn new(max_message_len: usize) -> Self {
        Self {
            max_message_len,
            pending: None,
            discarding: false,
        }
    }

    /// Whether a fragmented message is being collected.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.pending.is_some()
    }

    /// Drops any partial message.
    pub fn reset(&mut self) {
        self.pending = None;
        self.discarding = false;
    }

    /// Feeds one frame. Returns a frame once a whole message is available.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Frame>, WsError> {
        match frame.opcode {
            Opcode::Close | Opcode::Ping | Opcode::Pong => Ok(Some(frame)),
            Opcode::Text | Opcode::Binary => {
                if self.pending.is_some() || self.discarding {
                    return Err(WsError::protocol(
                        "new message started before the previous one completed",
                    ));
                }
                if frame.fin {
                    return Ok(Some(frame));
                }
                if frame.payload.len() > self.max_message_len {
                    self.discarding = true;
                    return Err(self.too_big());
                }
                let mut buf = BytesMut::with_capacity(frame.payload.len());
                buf.extend_from_slice(&frame.payload);
                self.pending = Some(PendingMessage {
                    opcode: frame.opcode,
                    rsv: frame.rsv,
                    buf,
                });
                Ok(None)
            }
            Opcode::Continuation => {
                if self.discarding {
                    if frame.fin {
                        self.discarding = false;
                    }
                    return Ok(None);
                }
                let Some(pending) = self.pending.as_mut() else {
                    return Err(WsError::protocol(
                        "continuation frame without a message in progress",
                    ));
                };
                if pending.buf.len() + frame.payload.len() > self.max_message_len {
                    debug!(
                        buffered = pending.buf.len(),
                        incoming = frame.payload.len(),
                        "dropping oversized fragmented message"
                    );
                    self.pending = None;
                    self.discarding = !frame.fin;
                    return Err(self.too_big());
                }
                pending.buf.extend_from_slice(&frame.payload);
                if !frame.fin {
                    return Ok(None);
                }
                let Some(done) = self.pending.take() else {
                    return Ok(None);
                };
                Ok(Some(Frame::new(done.opcode, true, done.rsv, done.buf.freeze())))
            }
        }
    }

    fn too_big(&self) -> WsError {
        WsError::too_big(format!(
            "fragmented message exceeds {} bytes",
            self.max_message_len
        ))
    }
}
