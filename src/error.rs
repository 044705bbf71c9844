use std::borrow::Cow;

use crate::frame::CloseCode;

/// Failures surfaced by the codec, the connection state machine and the
/// async stream driver.
#[derive(thiserror::Error, Debug)]
pub enum WsError {
    /// The peer violated the framing rules. `status` is the close code the
    /// connection answers with.
    #[error("{reason}")]
    CorruptedFrame {
        status: CloseCode,
        reason: Cow<'static, str>,
    },
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    /// An outbound frame that the active wire format cannot carry.
    #[error("frame too long: {0}")]
    TooLongFrame(Cow<'static, str>),
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(Cow<'static, str>),
    #[error("websocket handshake has not completed")]
    NotOpen,
    #[error("channel closed")]
    ChannelClosed,
    #[error("close handshake timed out")]
    CloseTimeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WsError {
    pub(crate) fn protocol(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::CorruptedFrame {
            status: CloseCode::PROTOCOL_ERROR,
            reason: reason.into(),
        }
    }

    pub(crate) fn too_big(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::CorruptedFrame {
            status: CloseCode::MESSAGE_TOO_BIG,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_payload(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::CorruptedFrame {
            status: CloseCode::INVALID_PAYLOAD_DATA,
            reason: reason.into(),
        }
    }

    /// Close status to report to the peer, for protocol violations.
    pub fn close_status(&self) -> Option<CloseCode> {
        match self {
            Self::CorruptedFrame { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::CorruptedFrame { .. })
    }
}

/// Opening handshake failures, on either side.
#[derive(thiserror::Error, Debug)]
pub enum HandshakeError {
    #[error("unexpected status {0} (expected 101 Switching Protocols)")]
    Status(u16),
    #[error("invalid request method {0} (expected GET)")]
    Method(String),
    #[error("invalid handshake response upgrade: {0:?}")]
    Upgrade(Option<String>),
    #[error("invalid handshake response connection: {0:?}")]
    Connection(Option<String>),
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("invalid challenge: expected {expected}, got {actual:?}")]
    Accept {
        expected: String,
        actual: Option<String>,
    },
    #[error("invalid challenge response")]
    ChallengeMismatch,
    #[error("invalid challenge key {0:?}")]
    ChallengeKey(String),
    #[error("invalid subprotocol. actual: {actual}. expected one of: {expected:?}")]
    InvalidSubprotocol {
        actual: String,
        expected: Vec<String>,
    },
    #[error("unsupported websocket version {0:?}")]
    UnsupportedVersion(Option<String>),
    #[error("no handshake request has been issued")]
    NoRequest,
    #[error("handshake already completed")]
    AlreadyComplete,
    #[error("handshake already failed")]
    Failed,
    #[error("handshake timed out")]
    Timeout,
    #[error("eof during handshake")]
    Eof,
    #[error("oversized handshake")]
    Oversized,
    #[error("malformed http message: {0}")]
    Parse(#[from] httparse::Error),
    #[error(transparent)]
    Http(#[from] http::Error),
    #[error(transparent)]
    Url(#[from] crate::url::UrlError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<http::header::InvalidHeaderValue> for HandshakeError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::Http(err.into())
    }
}

impl From<http::header::InvalidHeaderName> for HandshakeError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::Http(err.into())
    }
}
