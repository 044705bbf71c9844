//! Draft 00 (hixie-75/76) framing.
//!
//! Text frames are `0x00 <utf-8> 0xFF`; binary frames are a type byte with
//! the high bit set followed by a base-128 length and the payload. The only
//! close signal is the `0xFF 0x00` pair.

use bytes::{Buf, BufMut, BytesMut};
use memchr::memchr;

use super::{Decoder, Encoder};
use crate::error::WsError;
use crate::frame::{Frame, Opcode};

const FRAME_END: u8 = 0xFF;
const CLOSE_TYPE: u8 = 0xFF;
const MAX_LENGTH_FIELD_BYTES: usize = 8;

#[derive(Debug)]
pub struct HixieDecoder {
    max_frame_size: usize,
    received_close: bool,
    corrupt: bool,
}

impl HixieDecoder {
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            received_close: false,
            corrupt: false,
        }
    }

    #[must_use]
    pub fn received_close(&self) -> bool {
        self.received_close
    }

    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        self.corrupt
    }

    pub fn mark_corrupt(&mut self) {
        self.corrupt = true;
    }

    fn too_long(&mut self, src: &mut BytesMut) -> WsError {
        self.corrupt = true;
        src.clear();
        WsError::too_big("frame too long")
    }

    fn decode_binary(&mut self, frame_type: u8, src: &mut BytesMut) -> Result<Option<Frame>, WsError> {
        let mut len: u64 = 0;
        let mut pos = 1;
        loop {
            let Some(&b) = src.get(pos) else {
                return Ok(None);
            };
            pos += 1;
            len = (len << 7) | u64::from(b & 0x7F);
            if len > self.max_frame_size as u64 || pos - 1 > MAX_LENGTH_FIELD_BYTES {
                return Err(self.too_long(src));
            }
            if b & 0x80 == 0 {
                break;
            }
        }
        // Bounded by max_frame_size above.
        let len = len as usize;

        if frame_type == CLOSE_TYPE && len == 0 {
            src.advance(pos);
            self.received_close = true;
            return Ok(Some(Frame::close_empty()));
        }

        if src.len() < pos + len {
            return Ok(None);
        }
        src.advance(pos);
        Ok(Some(Frame::binary(src.split_to(len).freeze())))
    }

    fn decode_text(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WsError> {
        let Some(end) = memchr(FRAME_END, &src[1..]) else {
            if src.len() - 1 > self.max_frame_size {
                return Err(self.too_long(src));
            }
            return Ok(None);
        };
        if end > self.max_frame_size {
            return Err(self.too_long(src));
        }

        src.advance(1);
        let payload = src.split_to(end).freeze();
        src.advance(1);
        Ok(Some(Frame::text(payload)))
    }
}

impl Decoder for HixieDecoder {
    type Item = Frame;
    type Error = WsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WsError> {
        if self.received_close || self.corrupt {
            src.clear();
            return Ok(None);
        }
        let Some(&frame_type) = src.first() else {
            return Ok(None);
        };
        if frame_type & 0x80 == 0x80 {
            self.decode_binary(frame_type, src)
        } else {
            self.decode_text(src)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HixieEncoder;

impl Encoder<Frame> for HixieEncoder {
    type Error = WsError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), WsError> {
        match frame.opcode {
            Opcode::Text => {
                if memchr(FRAME_END, &frame.payload).is_some() {
                    return Err(WsError::UnsupportedFrame(
                        "text payload contains the 0xFF frame terminator".into(),
                    ));
                }
                dst.reserve(frame.payload.len() + 2);
                dst.put_u8(0x00);
                dst.put_slice(&frame.payload);
                dst.put_u8(FRAME_END);
            }
            Opcode::Binary => {
                let len = frame.payload.len();
                dst.reserve(len + 1 + MAX_LENGTH_FIELD_BYTES);
                dst.put_u8(0x80);
                put_length(len as u64, dst);
                dst.put_slice(&frame.payload);
            }
            Opcode::Close => {
                dst.put_u8(CLOSE_TYPE);
                dst.put_u8(0x00);
            }
            other => {
                return Err(WsError::UnsupportedFrame(
                    format!("{other:?} frames are not part of draft 00 framing").into(),
                ));
            }
        }
        Ok(())
    }
}

/// Base-128 length, most significant group first, continuation bit set on
/// every byte but the last.
fn put_length(len: u64, dst: &mut BytesMut) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    let mut rest = len;
    loop {
        groups[n] = (rest & 0x7F) as u8;
        n += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        dst.put_u8(groups[i] | continuation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_text_frame() {
        let mut buf = BytesMut::from(&b"\x00hello\xff\x00wor"[..]);
        let mut decoder = HixieDecoder::new(1024);
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), Frame::text("hello"));
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"\x00wor");
        buf.extend_from_slice(b"ld\xff");
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), Frame::text("world"));
    }

    #[test]
    fn test_binary_frame_multi_byte_length() {
        let payload = vec![0xABu8; 200];
        let mut buf = BytesMut::new();
        HixieEncoder.encode(Frame::binary(payload.clone()), &mut buf).unwrap();
        assert_eq!(&buf[..3], &[0x80, 0x81, 0x48]);

        let mut decoder = HixieDecoder::new(1024);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload, Bytes::from(payload));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_close_pair() {
        let mut buf = BytesMut::new();
        HixieEncoder.encode(Frame::close_empty(), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0xFF, 0x00]);
        buf.extend_from_slice(b"\x00ignored\xff");

        let mut decoder = HixieDecoder::new(1024);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.opcode, Opcode::Close);
        assert!(decoder.received_close());
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unterminated_text_too_long() {
        let mut buf = BytesMut::from(&b"\x00abcdefgh"[..]);
        let mut decoder = HixieDecoder::new(4);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert_eq!(err.to_string(), "frame too long");
        assert!(decoder.is_corrupt());
    }

    #[test]
    fn test_binary_length_limit() {
        let mut buf = BytesMut::from(&[0x80, 0x81, 0x00][..]);
        let err = HixieDecoder::new(100).decode(&mut buf).unwrap_err();
        assert_eq!(err.to_string(), "frame too long");
    }

    #[test]
    fn test_ping_not_encodable() {
        let mut buf = BytesMut::new();
        let err = HixieEncoder.encode(Frame::ping("x"), &mut buf).unwrap_err();
        assert!(matches!(err, WsError::UnsupportedFrame(_)));
    }

    #[test]
    fn test_length_encoding() {
        for (len, expected) in [
            (0u64, vec![0x00u8]),
            (127, vec![0x7F]),
            (128, vec![0x81, 0x00]),
            (16384, vec![0x81, 0x80, 0x00]),
        ] {
            let mut buf = BytesMut::new();
            put_length(len, &mut buf);
            assert_eq!(&buf[..], &expected[..], "len {len}");
        }
    }
}
