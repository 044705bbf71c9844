use std::borrow::Cow;

use bytes::Bytes;
use http::header::{
    CONNECTION, HOST, HeaderValue, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use http::{Method, Request, Response, StatusCode};
use tracing::debug;

use super::legacy::{challenge_response, key_number};
use super::{
    ORIGIN, ReasonPhrase, SEC_WEBSOCKET_KEY1, SEC_WEBSOCKET_KEY2, SEC_WEBSOCKET_LOCATION,
    SEC_WEBSOCKET_ORIGIN, WEBSOCKET_LOCATION, WEBSOCKET_ORIGIN, WEBSOCKET_PROTOCOL,
    WebSocketVersion, compute_accept_key, header_has_token, header_str, header_value, split_list,
};
use crate::error::HandshakeError;

const SUB_PROTOCOL_WILDCARD: &str = "*";

/// A request the server agreed to upgrade.
#[derive(Debug)]
pub struct Accepted {
    pub response: Response<Bytes>,
    pub version: WebSocketVersion,
    pub subprotocol: Option<String>,
}

/// Validates upgrade requests and produces the matching 101 response.
#[derive(Debug, Clone, Default)]
pub struct ServerHandshaker {
    subprotocols: Vec<String>,
    secure: bool,
}

impl ServerHandshaker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subprotocols this server speaks. `"*"` accepts whatever the client
    /// asks for first.
    #[must_use]
    pub fn subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Whether connections arrive over TLS; only affects the draft 00
    /// location header.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Picks the first protocol from the client's comma separated offer
    /// that this server supports.
    #[must_use]
    pub fn select_subprotocol(&self, requested: &str) -> Option<String> {
        split_list(requested).find_map(|offered| {
            self.subprotocols
                .iter()
                .any(|supported| supported == SUB_PROTOCOL_WILDCARD || supported == offered)
                .then(|| offered.to_owned())
        })
    }

    /// Protocol version a request asks for.
    pub fn request_version<B>(request: &Request<B>) -> Result<WebSocketVersion, HandshakeError> {
        let value = header_str(request.headers(), &SEC_WEBSOCKET_VERSION);
        if request.headers().contains_key(SEC_WEBSOCKET_VERSION) && value.is_none() {
            return Err(HandshakeError::UnsupportedVersion(None));
        }
        WebSocketVersion::from_header(value)
            .ok_or_else(|| HandshakeError::UnsupportedVersion(value.map(str::to_owned)))
    }

    /// Body bytes that follow the request head: the 8-byte key3 of a
    /// draft-76 request, nothing otherwise.
    #[must_use]
    pub fn expected_request_body_len<B>(request: &Request<B>) -> usize {
        let headers = request.headers();
        if headers.contains_key(&SEC_WEBSOCKET_KEY1) && headers.contains_key(&SEC_WEBSOCKET_KEY2) {
            8
        } else {
            0
        }
    }

    pub fn handshake(&self, request: &Request<Bytes>) -> Result<Accepted, HandshakeError> {
        let version = Self::request_version(request)?;
        if request.method() != Method::GET {
            return Err(HandshakeError::Method(request.method().to_string()));
        }
        let headers = request.headers();
        if !header_has_token(headers, &CONNECTION, "upgrade") {
            return Err(HandshakeError::Connection(
                header_str(headers, &CONNECTION).map(str::to_owned),
            ));
        }
        let upgrade = header_str(headers, &UPGRADE);
        if !upgrade.is_some_and(|u| u.eq_ignore_ascii_case("websocket")) {
            return Err(HandshakeError::Upgrade(upgrade.map(str::to_owned)));
        }

        let accepted = match version {
            WebSocketVersion::V00 => self.handshake_legacy(request)?,
            _ => self.handshake_hybi(request, version)?,
        };
        debug!(
            version = ?accepted.version,
            subprotocol = ?accepted.subprotocol,
            "websocket server handshake accepted"
        );
        Ok(accepted)
    }

    fn handshake_hybi(
        &self,
        request: &Request<Bytes>,
        version: WebSocketVersion,
    ) -> Result<Accepted, HandshakeError> {
        let headers = request.headers();
        let key = header_str(headers, &SEC_WEBSOCKET_KEY)
            .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Key"))?;

        let mut response = Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header(UPGRADE, "websocket")
            .header(CONNECTION, "Upgrade")
            .header(SEC_WEBSOCKET_ACCEPT, compute_accept_key(key.trim()));

        let subprotocol = self.negotiate(header_str(headers, &SEC_WEBSOCKET_PROTOCOL));
        if let Some(selected) = &subprotocol {
            response = response.header(SEC_WEBSOCKET_PROTOCOL, header_value(selected)?);
        }

        Ok(Accepted {
            response: response.body(Bytes::new())?,
            version,
            subprotocol,
        })
    }

    fn handshake_legacy(&self, request: &Request<Bytes>) -> Result<Accepted, HandshakeError> {
        let headers = request.headers();
        let host = header_str(headers, &HOST).ok_or(HandshakeError::MissingHeader("Host"))?;
        let path = request.uri().path_and_query().map_or("/", |p| p.as_str());
        let scheme = if self.secure { "wss" } else { "ws" };
        let location = format!("{scheme}://{host}{path}");
        let origin = header_str(headers, &ORIGIN);
        let requested = header_str(headers, &SEC_WEBSOCKET_PROTOCOL)
            .or_else(|| header_str(headers, &WEBSOCKET_PROTOCOL));
        let subprotocol = self.negotiate(requested);

        let hixie76 = headers.contains_key(&SEC_WEBSOCKET_KEY1) && headers.contains_key(&SEC_WEBSOCKET_KEY2);
        let mut response = Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header(UPGRADE, "WebSocket")
            .header(CONNECTION, "Upgrade");

        let body = if hixie76 {
            response = response.extension(ReasonPhrase(Cow::Borrowed("WebSocket Protocol Handshake")));
            if let Some(origin) = origin {
                response = response.header(&SEC_WEBSOCKET_ORIGIN, header_value(origin)?);
            }
            response = response.header(&SEC_WEBSOCKET_LOCATION, header_value(&location)?);
            if let Some(selected) = &subprotocol {
                response = response.header(SEC_WEBSOCKET_PROTOCOL, header_value(selected)?);
            }

            let key1 = header_str(headers, &SEC_WEBSOCKET_KEY1).unwrap_or_default();
            let key2 = header_str(headers, &SEC_WEBSOCKET_KEY2).unwrap_or_default();
            let key3 = request.body();
            if key3.len() != 8 {
                return Err(HandshakeError::ChallengeKey(format!(
                    "expected 8 bytes of key3, got {}",
                    key3.len()
                )));
            }
            let answer = challenge_response(key_number(key1)?, key_number(key2)?, key3);
            Bytes::copy_from_slice(&answer)
        } else {
            response = response.extension(ReasonPhrase(Cow::Borrowed("Web Socket Protocol Handshake")));
            if let Some(origin) = origin {
                response = response.header(&WEBSOCKET_ORIGIN, header_value(origin)?);
            }
            response = response.header(&WEBSOCKET_LOCATION, header_value(&location)?);
            if let Some(selected) = &subprotocol {
                response = response.header(&WEBSOCKET_PROTOCOL, header_value(selected)?);
            }
            Bytes::new()
        };

        Ok(Accepted {
            response: response.body(body)?,
            version: WebSocketVersion::V00,
            subprotocol,
        })
    }

    fn negotiate(&self, requested: Option<&str>) -> Option<String> {
        let requested = requested?;
        let selected = self.select_subprotocol(requested);
        if selected.is_none() {
            debug!(requested, "requested subprotocol(s) not supported");
        }
        selected
    }

    /// Response for a request that cannot be upgraded: 426 with the
    /// supported version for an unknown version, 400 otherwise.
    #[must_use]
    pub fn reject(err: &HandshakeError) -> Response<Bytes> {
        let mut response = Response::new(Bytes::new());
        match err {
            HandshakeError::UnsupportedVersion(_) => {
                *response.status_mut() = StatusCode::UPGRADE_REQUIRED;
                response
                    .headers_mut()
                    .insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
            }
            _ => *response.status_mut() = StatusCode::BAD_REQUEST,
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::ClientHandshaker;

    fn request(version: Option<&str>) -> http::request::Builder {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri("/chat")
            .header(HOST, "server.example.com")
            .header(UPGRADE, "websocket")
            .header(CONNECTION, "Upgrade")
            .header(SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==");
        if let Some(version) = version {
            builder = builder.header(SEC_WEBSOCKET_VERSION, version);
        }
        builder
    }

    #[test]
    fn test_rfc_sample_handshake() {
        let server = ServerHandshaker::new().subprotocols(["chat"]);
        let req = request(Some("13"))
            .header(SEC_WEBSOCKET_PROTOCOL, "chat, superchat")
            .body(Bytes::new())
            .unwrap();
        let accepted = server.handshake(&req).unwrap();
        assert_eq!(accepted.version, WebSocketVersion::V13);
        assert_eq!(accepted.subprotocol.as_deref(), Some("chat"));
        let headers = accepted.response.headers();
        assert_eq!(accepted.response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(headers[SEC_WEBSOCKET_ACCEPT], "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert_eq!(headers[SEC_WEBSOCKET_PROTOCOL], "chat");
    }

    #[test]
    fn test_subprotocol_selection_follows_client_order() {
        let server = ServerHandshaker::new().subprotocols(["superchat", "chat"]);
        assert_eq!(server.select_subprotocol("chat, superchat").as_deref(), Some("chat"));
        assert_eq!(server.select_subprotocol("mqtt"), None);

        let any = ServerHandshaker::new().subprotocols(["*"]);
        assert_eq!(any.select_subprotocol(" mqtt , chat").as_deref(), Some("mqtt"));
    }

    #[test]
    fn test_unsupported_subprotocol_omitted() {
        let server = ServerHandshaker::new().subprotocols(["chat"]);
        let req = request(Some("13"))
            .header(SEC_WEBSOCKET_PROTOCOL, "mqtt")
            .body(Bytes::new())
            .unwrap();
        let accepted = server.handshake(&req).unwrap();
        assert!(accepted.subprotocol.is_none());
        assert!(!accepted.response.headers().contains_key(SEC_WEBSOCKET_PROTOCOL));
    }

    #[test]
    fn test_draft_versions_accepted() {
        for (header, version) in [("7", WebSocketVersion::V07), ("8", WebSocketVersion::V08)] {
            let req = request(Some(header)).body(Bytes::new()).unwrap();
            assert_eq!(ServerHandshaker::new().handshake(&req).unwrap().version, version);
        }
    }

    #[test]
    fn test_unknown_version_gets_426() {
        let req = request(Some("12")).body(Bytes::new()).unwrap();
        let err = ServerHandshaker::new().handshake(&req).unwrap_err();
        assert!(matches!(err, HandshakeError::UnsupportedVersion(Some(ref v)) if v == "12"));
        let response = ServerHandshaker::reject(&err);
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        assert_eq!(response.headers()[SEC_WEBSOCKET_VERSION], "13");
    }

    #[test]
    fn test_malformed_request_gets_400() {
        let mut req = request(Some("13")).body(Bytes::new()).unwrap();
        req.headers_mut().remove(SEC_WEBSOCKET_KEY);
        let err = ServerHandshaker::new().handshake(&req).unwrap_err();
        assert!(matches!(err, HandshakeError::MissingHeader(_)));
        assert_eq!(ServerHandshaker::reject(&err).status(), StatusCode::BAD_REQUEST);

        let req = request(Some("13")).method(Method::POST).body(Bytes::new()).unwrap();
        assert!(matches!(
            ServerHandshaker::new().handshake(&req),
            Err(HandshakeError::Method(_))
        ));
    }

    #[test]
    fn test_draft76_round_trip_with_client() {
        let mut client = ClientHandshaker::new("ws://example.com/demo")
            .unwrap()
            .version(WebSocketVersion::V00)
            .origin("http://example.com");
        let req = client.new_request().unwrap();
        assert_eq!(ServerHandshaker::expected_request_body_len(&req), 8);

        let accepted = ServerHandshaker::new().handshake(&req).unwrap();
        assert_eq!(accepted.version, WebSocketVersion::V00);
        let response = accepted.response;
        assert_eq!(response.body().len(), 16);
        assert_eq!(response.headers()["sec-websocket-location"], "ws://example.com/demo");
        assert_eq!(response.headers()["sec-websocket-origin"], "http://example.com");
        assert_eq!(
            response.extensions().get::<ReasonPhrase>().map(|r| r.0.as_ref()),
            Some("WebSocket Protocol Handshake")
        );

        let negotiated = client.finish(&response).unwrap();
        assert_eq!(negotiated.version, WebSocketVersion::V00);
    }

    #[test]
    fn test_draft75_fallback() {
        let req = Request::builder()
            .uri("/demo")
            .header(HOST, "example.com")
            .header(UPGRADE, "WebSocket")
            .header(CONNECTION, "Upgrade")
            .header("origin", "http://example.com")
            .header("websocket-protocol", "sample")
            .body(Bytes::new())
            .unwrap();
        let server = ServerHandshaker::new().subprotocols(["sample"]).secure(true);
        let accepted = server.handshake(&req).unwrap();
        let headers = accepted.response.headers();
        assert_eq!(headers["websocket-location"], "wss://example.com/demo");
        assert_eq!(headers["websocket-origin"], "http://example.com");
        assert_eq!(headers["websocket-protocol"], "sample");
        assert!(accepted.response.body().is_empty());
    }
}
