//! Opening handshakes for every supported protocol version.
//!
//! Requests and responses are plain [`http`] types with a [`bytes::Bytes`] body; the
//! body is only non-empty for the draft-76 challenge. Serialising them to the
//! wire is left to the transport (see [`crate::http_upgrade`]).

use std::borrow::Cow;

use base64::{Engine as _, engine::general_purpose::STANDARD as b64};
use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use rand::RngCore;
use sha1::{Digest, Sha1};

mod client;
mod legacy;
mod server;

pub use client::{ClientHandshaker, Negotiated};
pub use server::{Accepted, ServerHandshaker};

pub(crate) const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub(crate) static ORIGIN: HeaderName = HeaderName::from_static("origin");
pub(crate) static SEC_WEBSOCKET_ORIGIN: HeaderName = HeaderName::from_static("sec-websocket-origin");
pub(crate) static SEC_WEBSOCKET_KEY1: HeaderName = HeaderName::from_static("sec-websocket-key1");
pub(crate) static SEC_WEBSOCKET_KEY2: HeaderName = HeaderName::from_static("sec-websocket-key2");
pub(crate) static SEC_WEBSOCKET_LOCATION: HeaderName = HeaderName::from_static("sec-websocket-location");
pub(crate) static WEBSOCKET_ORIGIN: HeaderName = HeaderName::from_static("websocket-origin");
pub(crate) static WEBSOCKET_LOCATION: HeaderName = HeaderName::from_static("websocket-location");
pub(crate) static WEBSOCKET_PROTOCOL: HeaderName = HeaderName::from_static("websocket-protocol");

/// Protocol revision negotiated by the opening handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebSocketVersion {
    /// hixie-75/76, also known as hybi-00.
    V00,
    /// hybi-07.
    V07,
    /// hybi-08.
    V08,
    /// RFC 6455.
    V13,
}

impl WebSocketVersion {
    /// Value of `Sec-WebSocket-Version`; draft 00 sends none.
    #[must_use]
    pub const fn header_value(self) -> Option<&'static str> {
        match self {
            Self::V00 => None,
            Self::V07 => Some("7"),
            Self::V08 => Some("8"),
            Self::V13 => Some("13"),
        }
    }

    /// Maps a request's `Sec-WebSocket-Version`. A missing header means
    /// draft 00; unknown values yield `None`.
    #[must_use]
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        match value.map(str::trim) {
            None => Some(Self::V00),
            Some("13") => Some(Self::V13),
            Some("8") => Some(Self::V08),
            Some("7") => Some(Self::V07),
            Some(_) => None,
        }
    }

    /// Header carrying the origin in a client request.
    pub(crate) fn origin_header(self) -> &'static HeaderName {
        match self {
            Self::V07 | Self::V08 => &SEC_WEBSOCKET_ORIGIN,
            Self::V00 | Self::V13 => &ORIGIN,
        }
    }
}

/// Status line reason carried as a response extension, for peers that
/// expect a specific phrase such as "WebSocket Protocol Handshake".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonPhrase(pub Cow<'static, str>);

/// Per-connection handshake outcome. Completion is set once and never
/// reverts.
#[derive(Debug, Clone, Default)]
pub struct HandshakeState {
    complete: bool,
    selected_subprotocol: Option<String>,
}

impl HandshakeState {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn selected_subprotocol(&self) -> Option<&str> {
        self.selected_subprotocol.as_deref()
    }

    /// Records completion. Returns `false` if it was already complete.
    pub fn complete(&mut self, subprotocol: Option<String>) -> bool {
        if self.complete {
            return false;
        }
        self.complete = true;
        self.selected_subprotocol = subprotocol;
        true
    }
}

/// `Sec-WebSocket-Accept` for a client key.
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    b64.encode(sha1.finalize())
}

/// Fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
#[must_use]
pub fn generate_client_key() -> String {
    let mut nonce = [0u8; 16];
    rand::rng().fill_bytes(&mut nonce);
    b64.encode(nonce)
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub(crate) fn header_has_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// Comma separated header value, trimmed and without empty entries.
pub(crate) fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn header_value(value: &str) -> Result<HeaderValue, crate::error::HandshakeError> {
    Ok(HeaderValue::from_str(value)?)
}
