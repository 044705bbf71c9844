//! WebSocket frame model shared by every wire version.

use bytes::{BufMut, Bytes, BytesMut};

/// Largest close reason that still fits a control frame next to the 2-byte
/// status code.
pub const MAX_CLOSE_REASON_LEN: usize = 123;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD_LEN: usize = 125;

/// Frame opcodes (RFC 6455 section 5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Maps a raw 4-bit opcode. Reserved values yield `None`.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_control(self) -> bool {
        (self as u8) & 0x08 != 0
    }

    #[must_use]
    pub const fn is_data(self) -> bool {
        !self.is_control()
    }
}

/// Close status code. Any `u16` can be carried; [`CloseCode::is_valid`]
/// tells whether a peer is allowed to send it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(u16);

impl CloseCode {
    pub const NORMAL: Self = Self(1000);
    pub const GOING_AWAY: Self = Self(1001);
    pub const PROTOCOL_ERROR: Self = Self(1002);
    pub const UNSUPPORTED_DATA: Self = Self(1003);
    pub const NO_STATUS_RECEIVED: Self = Self(1005);
    pub const ABNORMAL: Self = Self(1006);
    pub const INVALID_PAYLOAD_DATA: Self = Self(1007);
    pub const POLICY_VIOLATION: Self = Self(1008);
    pub const MESSAGE_TOO_BIG: Self = Self(1009);
    pub const MANDATORY_EXTENSION: Self = Self(1010);
    pub const INTERNAL_ERROR: Self = Self(1011);

    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Whether the code may appear on the wire.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self.0, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }

    /// Default reason text for well-known codes.
    #[must_use]
    pub const fn reason_text(self) -> &'static str {
        match self.0 {
            1000 => "Bye",
            1001 => "Endpoint unavailable",
            1002 => "Protocol error",
            1003 => "Invalid message type",
            1007 => "Invalid payload data",
            1008 => "Policy violation",
            1009 => "Message too big",
            1010 => "Mandatory extension",
            1011 => "Internal server error",
            1012 => "Service Restart",
            1013 => "Try Again Later",
            1014 => "Bad Gateway",
            _ => "",
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One WebSocket frame as seen by the application.
///
/// Payloads are reference-counted [`Bytes`]; cloning a frame shares the
/// buffer and dropping the last clone releases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub fin: bool,
    /// RSV1..RSV3 as a 3-bit value.
    pub rsv: u8,
    pub payload: Bytes,
}

impl Frame {
    #[must_use]
    pub fn new(opcode: Opcode, fin: bool, rsv: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            fin,
            rsv,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Text, true, 0, payload)
    }

    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, true, 0, payload)
    }

    #[must_use]
    pub fn continuation(fin: bool, payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Continuation, fin, 0, payload)
    }

    #[must_use]
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, true, 0, payload)
    }

    #[must_use]
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, true, 0, payload)
    }

    /// Close frame with a status code and a reason, truncated to
    /// [`MAX_CLOSE_REASON_LEN`] bytes on a character boundary.
    #[must_use]
    pub fn close(code: CloseCode, reason: &str) -> Self {
        let reason = truncate_reason(reason);
        let mut buf = BytesMut::with_capacity(2 + reason.len());
        buf.put_u16(code.as_u16());
        buf.put_slice(reason.as_bytes());
        Self::new(Opcode::Close, true, 0, buf.freeze())
    }

    /// Close frame without a body.
    #[must_use]
    pub fn close_empty() -> Self {
        Self::new(Opcode::Close, true, 0, Bytes::new())
    }

    #[must_use]
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Status code of a close frame, `None` for an empty body or any other
    /// opcode.
    #[must_use]
    pub fn status_code(&self) -> Option<CloseCode> {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return None;
        }
        Some(CloseCode(u16::from_be_bytes([
            self.payload[0],
            self.payload[1],
        ])))
    }

    /// Reason of a close frame. Empty when absent or not UTF-8.
    #[must_use]
    pub fn reason_text(&self) -> &str {
        if self.opcode != Opcode::Close || self.payload.len() <= 2 {
            return "";
        }
        std::str::from_utf8(&self.payload[2..]).unwrap_or_default()
    }
}

/// Cuts `reason` to at most [`MAX_CLOSE_REASON_LEN`] bytes without splitting
/// a character.
#[must_use]
pub fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON_LEN {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON_LEN;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}
