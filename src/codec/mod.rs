//! Frame encoding and decoding for every supported wire version.
//!
//! Decoders are incremental: they consume what they can from a `BytesMut`
//! and return `Ok(None)` when more input is needed, keeping partial state
//! between calls.

use bytes::BytesMut;

use crate::error::WsError;
use crate::frame::Frame;
use crate::handshake::WebSocketVersion;

pub mod hixie;
pub mod hybi;

pub use hixie::{HixieDecoder, HixieEncoder};
pub use hybi::{DecoderState, HybiDecoder, HybiEncoder};

/// Incremental decoder over a byte buffer.
pub trait Decoder {
    type Item;
    type Error;

    /// Decodes one item from `src`, consuming its bytes. Returns `Ok(None)`
    /// when `src` does not hold a complete item yet.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error>;
}

/// Encoder appending items to a byte buffer.
pub trait Encoder<Item> {
    type Error;

    fn encode(&mut self, item: Item, dst: &mut BytesMut) -> Result<(), Self::Error>;
}

/// Which end of the connection this codec serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Clients mask outbound frames; servers never do.
    #[must_use]
    pub const fn masks_outbound(self) -> bool {
        matches!(self, Self::Client)
    }

    /// Servers require masked inbound frames.
    #[must_use]
    pub const fn expects_masked_inbound(self) -> bool {
        matches!(self, Self::Server)
    }
}

/// Decoder limits and leniency switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    pub max_frame_payload_len: usize,
    pub expect_masked_frames: bool,
    pub allow_mask_mismatch: bool,
    pub allow_extensions: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_frame_payload_len: 65536,
            expect_masked_frames: true,
            allow_mask_mismatch: false,
            allow_extensions: false,
        }
    }
}

impl DecoderConfig {
    #[must_use]
    pub fn max_frame_payload_len(mut self, len: usize) -> Self {
        self.max_frame_payload_len = len;
        self
    }

    #[must_use]
    pub fn expect_masked_frames(mut self, expect: bool) -> Self {
        self.expect_masked_frames = expect;
        self
    }

    #[must_use]
    pub fn allow_mask_mismatch(mut self, allow: bool) -> Self {
        self.allow_mask_mismatch = allow;
        self
    }

    #[must_use]
    pub fn allow_extensions(mut self, allow: bool) -> Self {
        self.allow_extensions = allow;
        self
    }
}

/// Version-specific frame decoder.
#[derive(Debug)]
pub enum FrameDecoder {
    Hybi(HybiDecoder),
    Hixie(HixieDecoder),
}

impl FrameDecoder {
    #[must_use]
    pub fn for_version(version: WebSocketVersion, config: DecoderConfig) -> Self {
        match version {
            WebSocketVersion::V00 => Self::Hixie(HixieDecoder::new(config.max_frame_payload_len)),
            _ => Self::Hybi(HybiDecoder::new(config)),
        }
    }

    /// Discards all further input.
    pub fn mark_corrupt(&mut self) {
        match self {
            Self::Hybi(d) => d.mark_corrupt(),
            Self::Hixie(d) => d.mark_corrupt(),
        }
    }

    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        match self {
            Self::Hybi(d) => d.state() == DecoderState::Corrupt,
            Self::Hixie(d) => d.is_corrupt(),
        }
    }

    /// Whether a close frame has been decoded.
    #[must_use]
    pub fn received_close(&self) -> bool {
        match self {
            Self::Hybi(d) => d.received_close(),
            Self::Hixie(d) => d.received_close(),
        }
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = WsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WsError> {
        match self {
            Self::Hybi(d) => d.decode(src),
            Self::Hixie(d) => d.decode(src),
        }
    }
}

/// Version-specific frame encoder.
#[derive(Debug)]
pub enum FrameEncoder {
    Hybi(HybiEncoder),
    Hixie(HixieEncoder),
}

impl FrameEncoder {
    #[must_use]
    pub fn for_version(version: WebSocketVersion, mask_payload: bool) -> Self {
        match version {
            WebSocketVersion::V00 => Self::Hixie(HixieEncoder),
            _ => Self::Hybi(HybiEncoder::new(mask_payload)),
        }
    }
}

impl Encoder<Frame> for FrameEncoder {
    type Error = WsError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), WsError> {
        match self {
            Self::Hybi(e) => e.encode(frame, dst),
            Self::Hixie(e) => e.encode(frame, dst),
        }
    }
}

/// Decoder and encoder pair installed once a handshake settles the version.
#[derive(Debug)]
pub struct FrameCodec {
    version: WebSocketVersion,
    decoder: FrameDecoder,
    encoder: FrameEncoder,
}

impl FrameCodec {
    /// Codec for `role`. `config.expect_masked_frames` is taken as given, so
    /// callers derive it from the role first when they want the default.
    #[must_use]
    pub fn new(version: WebSocketVersion, role: Role, config: DecoderConfig) -> Self {
        Self {
            version,
            decoder: FrameDecoder::for_version(version, config),
            encoder: FrameEncoder::for_version(version, role.masks_outbound()),
        }
    }

    #[must_use]
    pub fn version(&self) -> WebSocketVersion {
        self.version
    }

    #[must_use]
    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut FrameDecoder {
        &mut self.decoder
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = WsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, WsError> {
        self.decoder.decode(src)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = WsError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), WsError> {
        self.encoder.encode(frame, dst)
    }
}
