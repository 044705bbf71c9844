use base64::{Engine as _, engine::general_purpose::STANDARD as b64};
use bytes::Bytes;
use http::header::{
    CONNECTION, HOST, HeaderName, HeaderValue, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION, UPGRADE,
};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use tracing::debug;

use super::legacy::{challenge_response, generate_key, generate_key3};
use super::{
    SEC_WEBSOCKET_KEY1, SEC_WEBSOCKET_KEY2, WebSocketVersion, compute_accept_key, header_has_token,
    header_str,
};
use crate::error::HandshakeError;
use crate::url::{WsUrl, parse_ws_or_wss};

/// What a successful client handshake settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub version: WebSocketVersion,
    pub subprotocol: Option<String>,
}

#[derive(Debug, Clone)]
enum Expected {
    None,
    Accept(String),
    Challenge([u8; 16]),
}

/// Builds the upgrade request and validates the server's answer.
///
/// ```
/// use websockets_monoio_codec::{ClientHandshaker, WebSocketVersion};
///
/// let mut handshaker = ClientHandshaker::new("ws://localhost:9001/chat")?
///     .version(WebSocketVersion::V13)
///     .subprotocols(["chat", "superchat"]);
/// let request = handshaker.new_request()?;
/// assert_eq!(request.uri(), "/chat");
/// # Ok::<(), websockets_monoio_codec::HandshakeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ClientHandshaker {
    url: WsUrl,
    version: WebSocketVersion,
    subprotocols: Vec<String>,
    origin: Option<String>,
    headers: HeaderMap,
    expected: Expected,
}

impl ClientHandshaker {
    pub fn new(url: &str) -> Result<Self, HandshakeError> {
        Ok(Self::from_url(parse_ws_or_wss(url)?))
    }

    #[must_use]
    pub fn from_url(url: WsUrl) -> Self {
        Self {
            url,
            version: WebSocketVersion::V13,
            subprotocols: Vec::new(),
            origin: None,
            headers: HeaderMap::new(),
            expected: Expected::None,
        }
    }

    #[must_use]
    pub fn version(mut self, version: WebSocketVersion) -> Self {
        self.version = version;
        self
    }

    /// Subprotocols offered, in preference order.
    #[must_use]
    pub fn subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Extra header sent with the request.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, HandshakeError> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        self.headers.append(name, HeaderValue::from_str(value)?);
        Ok(self)
    }

    #[must_use]
    pub fn url(&self) -> &WsUrl {
        &self.url
    }

    #[must_use]
    pub fn protocol_version(&self) -> WebSocketVersion {
        self.version
    }

    /// Body length of the expected 101 response: 16 challenge bytes for
    /// draft 00, nothing otherwise.
    #[must_use]
    pub fn expected_response_body_len(&self) -> usize {
        match self.version {
            WebSocketVersion::V00 => 16,
            _ => 0,
        }
    }

    /// Builds a request with fresh nonces and remembers what the server must
    /// answer.
    pub fn new_request(&mut self) -> Result<Request<Bytes>, HandshakeError> {
        let mut nonce = [0u8; 16];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut nonce);
        self.new_request_with_nonce(nonce)
    }

    /// Same as [`ClientHandshaker::new_request`] with a caller supplied
    /// 16-byte nonce for the `Sec-WebSocket-Key`. Draft 00 ignores it.
    pub fn new_request_with_nonce(&mut self, nonce: [u8; 16]) -> Result<Request<Bytes>, HandshakeError> {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(self.url.path_and_query.as_str())
            .header(HOST, self.url.host_header());

        let body = match self.version {
            WebSocketVersion::V00 => {
                let mut rng = rand::rng();
                let key1 = generate_key(&mut rng);
                let key2 = generate_key(&mut rng);
                let key3 = generate_key3(&mut rng);
                self.expected =
                    Expected::Challenge(challenge_response(key1.number, key2.number, &key3));
                builder = builder
                    .header(UPGRADE, "WebSocket")
                    .header(CONNECTION, "Upgrade")
                    .header(&SEC_WEBSOCKET_KEY1, key1.key)
                    .header(&SEC_WEBSOCKET_KEY2, key2.key);
                Bytes::copy_from_slice(&key3)
            }
            _ => {
                let key = b64.encode(nonce);
                self.expected = Expected::Accept(compute_accept_key(&key));
                builder = builder
                    .header(UPGRADE, "websocket")
                    .header(CONNECTION, "Upgrade")
                    .header(SEC_WEBSOCKET_KEY, key);
                Bytes::new()
            }
        };

        let origin = self.origin.clone().unwrap_or_else(|| self.url.origin());
        builder = builder.header(self.version.origin_header(), origin);
        if !self.subprotocols.is_empty() {
            builder = builder.header(SEC_WEBSOCKET_PROTOCOL, self.subprotocols.join(", "));
        }
        if let Some(version) = self.version.header_value() {
            builder = builder.header(SEC_WEBSOCKET_VERSION, version);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }

        debug!(url = %self.url, version = ?self.version, "websocket client handshake request");
        Ok(builder.body(body)?)
    }

    /// Validates the server's response to the last request.
    pub fn finish(&self, response: &Response<Bytes>) -> Result<Negotiated, HandshakeError> {
        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            return Err(HandshakeError::Status(response.status().as_u16()));
        }
        let headers = response.headers();

        // Draft 00 servers answer "WebSocket".
        let upgrade = header_str(headers, &UPGRADE);
        if !upgrade.is_some_and(|u| u.eq_ignore_ascii_case("websocket")) {
            return Err(HandshakeError::Upgrade(upgrade.map(str::to_owned)));
        }
        if !header_has_token(headers, &CONNECTION, "upgrade") {
            return Err(HandshakeError::Connection(
                header_str(headers, &CONNECTION).map(str::to_owned),
            ));
        }

        match &self.expected {
            Expected::Accept(expected) => {
                let actual = header_str(headers, &SEC_WEBSOCKET_ACCEPT);
                if actual != Some(expected.as_str()) {
                    return Err(HandshakeError::Accept {
                        expected: expected.clone(),
                        actual: actual.map(str::to_owned),
                    });
                }
            }
            Expected::Challenge(expected) => {
                if response.body().as_ref() != expected.as_slice() {
                    return Err(HandshakeError::ChallengeMismatch);
                }
            }
            Expected::None => return Err(HandshakeError::NoRequest),
        }

        let subprotocol = self.check_subprotocol(headers)?;
        Ok(Negotiated {
            version: self.version,
            subprotocol,
        })
    }

    fn check_subprotocol(&self, headers: &HeaderMap) -> Result<Option<String>, HandshakeError> {
        let name = match self.version {
            WebSocketVersion::V00 => &super::WEBSOCKET_PROTOCOL,
            _ => &SEC_WEBSOCKET_PROTOCOL,
        };
        // Draft 00 servers may use either spelling.
        let value = header_str(headers, name)
            .or_else(|| header_str(headers, &SEC_WEBSOCKET_PROTOCOL))
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let Some(selected) = value else {
            return Ok(None);
        };
        if self.subprotocols.iter().any(|offered| offered == selected) {
            return Ok(Some(selected.to_owned()));
        }
        Err(HandshakeError::InvalidSubprotocol {
            actual: selected.to_owned(),
            expected: self.subprotocols.clone(),
        })
    }
}
