//! RFC 6455 framing, also used by drafts 07 and 08.

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use super::{Decoder, DecoderConfig, Encoder};
use crate::error::WsError;
use crate::frame::{CloseCode, Frame, MAX_CONTROL_PAYLOAD_LEN, Opcode};
use crate::mask::{apply_mask, generate_mask_key};
use crate::utf8::Utf8Validator;

/// Where the decoder is inside the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    ReadingFirst,
    ReadingSecond,
    ReadingSize,
    MaskingKey,
    Payload,
    /// A violation was seen; all further input is discarded.
    Corrupt,
}

#[derive(Debug)]
pub struct HybiDecoder {
    config: DecoderConfig,
    state: DecoderState,
    fin: bool,
    rsv: u8,
    raw_opcode: u8,
    opcode: Opcode,
    masked: bool,
    len_marker: u8,
    payload_len: usize,
    mask_key: [u8; 4],
    fragmented_frames: usize,
    received_close: bool,
}

impl HybiDecoder {
    #[must_use]
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            state: DecoderState::ReadingFirst,
            fin: false,
            rsv: 0,
            raw_opcode: 0,
            opcode: Opcode::Continuation,
            masked: false,
            len_marker: 0,
            payload_len: 0,
            mask_key: [0; 4],
            fragmented_frames: 0,
            received_close: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> DecoderState {
        self.state
    }

    #[must_use]
    pub fn received_close(&self) -> bool {
        self.received_close
    }

    pub fn mark_corrupt(&mut self) {
        self.state = DecoderState::Corrupt;
    }

    fn violation(&mut self, src: &mut BytesMut, err: WsError) -> WsError {
        trace!(error = %err, "websocket frame rejected");
        self.state = DecoderState::Corrupt;
        src.clear();
        err
    }

    /// Checks the header fields gathered from the first two bytes.
    fn check_header(&mut self) -> Result<(), WsError> {
        let raw_opcode = self.raw_opcode;
        if self.rsv != 0 && !self.config.allow_extensions {
            return Err(WsError::protocol(format!(
                "RSV set without negotiated extension, RSV: {}",
                self.rsv
            )));
        }
        if !self.config.allow_mask_mismatch && self.config.expect_masked_frames != self.masked {
            return Err(WsError::protocol("received a frame that is not masked as expected"));
        }

        if raw_opcode & 0x08 != 0 {
            if !self.fin {
                return Err(WsError::protocol("fragmented control frame"));
            }
            if usize::from(self.len_marker) > MAX_CONTROL_PAYLOAD_LEN {
                return Err(WsError::protocol("control frame payload too big"));
            }
            let Some(opcode) = Opcode::from_u8(raw_opcode) else {
                return Err(WsError::protocol(format!(
                    "control frame using reserved opcode {raw_opcode}"
                )));
            };
            if opcode == Opcode::Close && self.len_marker == 1 {
                return Err(WsError::protocol("received close control frame with payload len 1"));
            }
            self.opcode = opcode;
        } else {
            let Some(opcode) = Opcode::from_u8(raw_opcode) else {
                return Err(WsError::protocol(format!(
                    "data frame using reserved opcode {raw_opcode}"
                )));
            };
            if self.fragmented_frames == 0 && opcode == Opcode::Continuation {
                return Err(WsError::protocol(
                    "received continuation data frame outside fragmented message",
                ));
            }
            if self.fragmented_frames != 0 && opcode != Opcode::Continuation {
                return Err(WsError::protocol(
                    "received non-continuation data frame while inside fragmented message",
                ));
            }
            self.opcode = opcode;
        }
        Ok(())
    }

    fn check_length(&self, len: usize) -> Result<(), WsError> {
        if len > self.config.max_frame_payload_len {
            return Err(WsError::too_big(format!(
                "max frame length of {} has been exceeded",
                self.config.max_frame_payload_len
            )));
        }
        Ok(())
    }

    fn finish_frame(&mut self, mut payload: BytesMut) -> Result<Frame, WsError> {
        self.state = DecoderState::ReadingFirst;
        if self.masked {
            apply_mask(&mut payload, self.mask_key);
        }

        match self.opcode {
            Opcode::Ping | Opcode::Pong => {}
            Opcode::Close => {
                check_close_body(&payload)?;
                self.received_close = true;
            }
            _ => {
                if self.fin {
                    self.fragmented_frames = 0;
                } else {
                    self.fragmented_frames += 1;
                }
            }
        }

        Ok(Frame::new(self.opcode, self.fin, self.rsv, payload.freeze()))
    }
}

impl Decoder for HybiDecoder {
    type Item = Frame;
    type Error = WsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WsError> {
        // Nothing after a close frame is meaningful.
        if self.received_close {
            src.clear();
            return Ok(None);
        }

        loop {
            match self.state {
                DecoderState::ReadingFirst => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    self.payload_len = 0;
                    let b = src.get_u8();
                    self.fin = b & 0x80 != 0;
                    self.rsv = (b & 0x70) >> 4;
                    self.raw_opcode = b & 0x0F;
                    self.state = DecoderState::ReadingSecond;
                }
                DecoderState::ReadingSecond => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let b = src.get_u8();
                    self.masked = b & 0x80 != 0;
                    self.len_marker = b & 0x7F;
                    if let Err(err) = self.check_header() {
                        return Err(self.violation(src, err));
                    }
                    self.state = DecoderState::ReadingSize;
                }
                DecoderState::ReadingSize => {
                    let len = match self.len_marker {
                        126 => {
                            if src.len() < 2 {
                                return Ok(None);
                            }
                            let len = usize::from(src.get_u16());
                            if len < 126 {
                                return Err(self.violation(src, non_minimal_length()));
                            }
                            len
                        }
                        127 => {
                            if src.len() < 8 {
                                return Ok(None);
                            }
                            let len = src.get_u64();
                            if len < 65536 {
                                return Err(self.violation(src, non_minimal_length()));
                            }
                            match usize::try_from(len) {
                                Ok(len) if len <= i64::MAX as usize => len,
                                _ => {
                                    let err = WsError::too_big("frame length exceeds representable size");
                                    return Err(self.violation(src, err));
                                }
                            }
                        }
                        len => usize::from(len),
                    };
                    if let Err(err) = self.check_length(len) {
                        return Err(self.violation(src, err));
                    }
                    self.payload_len = len;
                    self.state = DecoderState::MaskingKey;
                }
                DecoderState::MaskingKey => {
                    if self.masked {
                        if src.len() < 4 {
                            return Ok(None);
                        }
                        src.copy_to_slice(&mut self.mask_key);
                    }
                    self.state = DecoderState::Payload;
                }
                DecoderState::Payload => {
                    if src.len() < self.payload_len {
                        return Ok(None);
                    }
                    let payload = src.split_to(self.payload_len);
                    return match self.finish_frame(payload) {
                        Ok(frame) => Ok(Some(frame)),
                        Err(err) => Err(self.violation(src, err)),
                    };
                }
                DecoderState::Corrupt => {
                    src.clear();
                    return Ok(None);
                }
            }
        }
    }
}

fn non_minimal_length() -> WsError {
    WsError::protocol("invalid data frame length (not using minimal length encoding)")
}

fn check_close_body(body: &[u8]) -> Result<(), WsError> {
    match body.len() {
        0 => Ok(()),
        1 => Err(WsError::protocol("invalid close frame body")),
        _ => {
            let code = CloseCode::new(u16::from_be_bytes([body[0], body[1]]));
            if !code.is_valid() {
                return Err(WsError::protocol(format!(
                    "invalid close frame status code: {code}"
                )));
            }
            let mut validator = Utf8Validator::new();
            validator.check(&body[2..])?;
            validator.finish()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HybiEncoder {
    mask_payload: bool,
}

impl HybiEncoder {
    #[must_use]
    pub fn new(mask_payload: bool) -> Self {
        Self { mask_payload }
    }

    /// Encodes with an explicit masking key, or unmasked when `mask_key` is
    /// `None`.
    pub fn encode_with_mask(
        &self,
        frame: Frame,
        mask_key: Option<[u8; 4]>,
        dst: &mut BytesMut,
    ) -> Result<(), WsError> {
        let len = frame.payload.len();
        if frame.opcode.is_control() {
            if !frame.fin {
                return Err(WsError::UnsupportedFrame("fragmented control frame".into()));
            }
            if len > MAX_CONTROL_PAYLOAD_LEN {
                return Err(WsError::TooLongFrame(
                    format!("control frame payload of {len} bytes exceeds 125").into(),
                ));
            }
        }
        if frame.rsv > 7 {
            return Err(WsError::UnsupportedFrame(format!("RSV {} out of range", frame.rsv).into()));
        }

        let header_len = 2
            + match len {
                0..=125 => 0,
                126..=65535 => 2,
                _ => 8,
            }
            + if mask_key.is_some() { 4 } else { 0 };
        dst.reserve(header_len + len);

        dst.put_u8(((frame.fin as u8) << 7) | (frame.rsv << 4) | frame.opcode as u8);
        let mask_bit = if mask_key.is_some() { 0x80 } else { 0 };
        match len {
            0..=125 => dst.put_u8(mask_bit | len as u8),
            126..=65535 => {
                dst.put_u8(mask_bit | 126);
                dst.put_u16(len as u16);
            }
            _ => {
                dst.put_u8(mask_bit | 127);
                dst.put_u64(len as u64);
            }
        }

        match mask_key {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&frame.payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(&frame.payload),
        }
        Ok(())
    }
}

impl Encoder<Frame> for HybiEncoder {
    type Error = WsError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), WsError> {
        let mask_key = self.mask_payload.then(generate_mask_key);
        self.encode_with_mask(frame, mask_key, dst)
    }
}
