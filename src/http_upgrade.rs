//! HTTP/1.1 framing for the opening handshake.
//!
//! Requests and responses travel as `http` types everywhere else; this module
//! turns them into bytes and back.

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{Request, Response};
use httparse::Status;
use memchr::memmem::Finder;
use monoio_compat::AsyncReadExt;
use smallvec::SmallVec;

use crate::error::HandshakeError;
use crate::handshake::{ReasonPhrase, ServerHandshaker};

/// Largest request or response head accepted.
pub const MAX_HEAD_LEN: usize = 16 * 1024;
const MAX_HEADERS: usize = 32;
const CRLF: &[u8] = b"\r\n";
const HEADER_SEPARATOR: &[u8] = b": ";

pub type Encoded = SmallVec<[u8; 512]>;

fn put_headers(buffer: &mut Encoded, headers: &http::HeaderMap) {
    for (name, value) in headers {
        buffer.extend_from_slice(name.as_str().as_bytes());
        buffer.extend_from_slice(HEADER_SEPARATOR);
        buffer.extend_from_slice(value.as_bytes());
        buffer.extend_from_slice(CRLF);
    }
    buffer.extend_from_slice(CRLF);
}

/// Serializes a request line, headers and body.
pub fn encode_request(request: &Request<Bytes>) -> Encoded {
    let target = request
        .uri()
        .path_and_query()
        .map_or("/", |path| path.as_str());

    let mut buffer = Encoded::new();
    buffer.extend_from_slice(request.method().as_str().as_bytes());
    buffer.push(b' ');
    buffer.extend_from_slice(target.as_bytes());
    buffer.extend_from_slice(b" HTTP/1.1\r\n");
    put_headers(&mut buffer, request.headers());
    buffer.extend_from_slice(request.body());
    buffer
}

/// Serializes a status line, headers and body. A [`ReasonPhrase`] extension
/// overrides the canonical reason.
pub fn encode_response(response: &Response<Bytes>) -> Encoded {
    let status = response.status();
    let reason = response
        .extensions()
        .get::<ReasonPhrase>()
        .map(|reason| reason.0.as_ref())
        .or_else(|| status.canonical_reason())
        .unwrap_or("");

    let mut buffer = Encoded::new();
    buffer.extend_from_slice(b"HTTP/1.1 ");
    buffer.extend_from_slice(status.as_str().as_bytes());
    buffer.push(b' ');
    buffer.extend_from_slice(reason.as_bytes());
    buffer.extend_from_slice(CRLF);
    put_headers(&mut buffer, response.headers());
    buffer.extend_from_slice(response.body());
    buffer
}

fn copy_headers(
    parsed: &[httparse::Header<'_>],
    headers: &mut http::HeaderMap,
) -> Result<(), HandshakeError> {
    for header in parsed {
        headers.append(
            HeaderName::from_bytes(header.name.as_bytes())?,
            HeaderValue::from_bytes(header.value)?,
        );
    }
    Ok(())
}

/// Parses a response head. Returns `None` until the head is complete,
/// otherwise the response (with an empty body) and the head length.
pub fn parse_response(buf: &[u8]) -> Result<Option<(Response<Bytes>, usize)>, HandshakeError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut headers);
    let head_len = match parsed.parse(buf)? {
        Status::Complete(len) => len,
        Status::Partial => return Ok(None),
    };

    let mut builder = Response::builder().status(parsed.code.unwrap_or_default());
    if let Some(reason) = parsed.reason.filter(|reason| !reason.is_empty()) {
        builder = builder.extension(ReasonPhrase(reason.to_owned().into()));
    }
    let mut response = builder.body(Bytes::new())?;
    copy_headers(parsed.headers, response.headers_mut())?;
    Ok(Some((response, head_len)))
}

/// Parses a request head. Returns `None` until the head is complete,
/// otherwise the request (with an empty body) and the head length.
pub fn parse_request(buf: &[u8]) -> Result<Option<(Request<Bytes>, usize)>, HandshakeError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    let head_len = match parsed.parse(buf)? {
        Status::Complete(len) => len,
        Status::Partial => return Ok(None),
    };

    let mut request = Request::builder()
        .method(parsed.method.unwrap_or_default())
        .uri(parsed.path.unwrap_or("/"))
        .body(Bytes::new())?;
    copy_headers(parsed.headers, request.headers_mut())?;
    Ok(Some((request, head_len)))
}

/// Reads until `buf` holds a complete head and returns its length.
async fn read_head<S>(stream: &mut S, buf: &mut BytesMut) -> Result<usize, HandshakeError>
where
    S: AsyncReadExt + Unpin,
{
    let finder = Finder::new(b"\r\n\r\n");
    let mut chunk = [0u8; 1024];
    let mut scan_pos = 0;

    loop {
        if let Some(pos) = finder.find(&buf[scan_pos..]) {
            return Ok(scan_pos + pos + 4);
        }

        scan_pos = buf.len().saturating_sub(3);
        if buf.len() > MAX_HEAD_LEN {
            return Err(HandshakeError::Oversized);
        }

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::Eof);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Reads until `buf` holds at least `len` bytes.
async fn fill<S>(stream: &mut S, buf: &mut BytesMut, len: usize) -> Result<(), HandshakeError>
where
    S: AsyncReadExt + Unpin,
{
    let mut chunk = [0u8; 1024];
    while buf.len() < len {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::Eof);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}

/// Reads the server's response head plus `body_len` body bytes. Returns the
/// response and whatever was read past it.
pub async fn read_response<S>(
    stream: &mut S,
    body_len: usize,
) -> Result<(Response<Bytes>, BytesMut), HandshakeError>
where
    S: AsyncReadExt + Unpin,
{
    let mut buf = BytesMut::with_capacity(2048);
    read_head(stream, &mut buf).await?;
    let (mut response, head_len) = parse_response(&buf)?.ok_or(HandshakeError::Eof)?;

    fill(stream, &mut buf, head_len + body_len).await?;
    let _head = buf.split_to(head_len);
    *response.body_mut() = buf.split_to(body_len).freeze();
    Ok((response, buf))
}

/// Reads the client's upgrade request, including the draft-76 key body when
/// the headers call for one. Returns the request and whatever was read past
/// it.
pub async fn read_request<S>(stream: &mut S) -> Result<(Request<Bytes>, BytesMut), HandshakeError>
where
    S: AsyncReadExt + Unpin,
{
    let mut buf = BytesMut::with_capacity(2048);
    read_head(stream, &mut buf).await?;
    let (mut request, head_len) = parse_request(&buf)?.ok_or(HandshakeError::Eof)?;

    let body_len = ServerHandshaker::expected_request_body_len(&request);
    fill(stream, &mut buf, head_len + body_len).await?;
    let _head = buf.split_to(head_len);
    *request.body_mut() = buf.split_to(body_len).freeze();
    Ok((request, buf))
}
