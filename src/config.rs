use std::time::Duration;

use crate::codec::{DecoderConfig, Role};

/// Connection-wide settings.
///
/// ```
/// use std::time::Duration;
/// use websockets_monoio_codec::WebSocketConfig;
///
/// let config = WebSocketConfig::default()
///     .max_message_len(4 * 1024 * 1024)
///     .forced_close_timeout(Some(Duration::from_secs(3)));
/// assert!(config.utf8_validation);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Largest single frame payload accepted.
    pub max_frame_payload_len: usize,
    /// Largest reassembled fragmented message.
    pub max_message_len: usize,
    /// Whether inbound frames must be masked. `None` follows the role:
    /// servers expect masked frames, clients unmasked ones.
    pub expect_masked_frames: Option<bool>,
    pub allow_mask_mismatch: bool,
    /// Accept non-zero RSV bits.
    pub allow_extensions: bool,
    /// Answer protocol violations with a close frame and drop the transport.
    pub close_on_protocol_violation: bool,
    /// Deadline for the opening handshake. `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// How long to wait for our close frame to be written before the
    /// transport is closed regardless. `None` disables the timer.
    pub forced_close_timeout: Option<Duration>,
    /// Swallow pong frames instead of surfacing them.
    pub drop_pong_frames: bool,
    /// Validate text messages as UTF-8.
    pub utf8_validation: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_frame_payload_len: 65536,
            max_message_len: 1 << 20,
            expect_masked_frames: None,
            allow_mask_mismatch: false,
            allow_extensions: false,
            close_on_protocol_violation: true,
            handshake_timeout: Some(Duration::from_secs(10)),
            forced_close_timeout: Some(Duration::from_secs(10)),
            drop_pong_frames: true,
            utf8_validation: true,
        }
    }
}

impl WebSocketConfig {
    #[must_use]
    pub fn max_frame_payload_len(mut self, len: usize) -> Self {
        self.max_frame_payload_len = len;
        self
    }

    #[must_use]
    pub fn max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    #[must_use]
    pub fn expect_masked_frames(mut self, expect: bool) -> Self {
        self.expect_masked_frames = Some(expect);
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

    #[must_use]
    pub fn close_on_protocol_violation(mut self, close: bool) -> Self {
        self.close_on_protocol_violation = close;
        self
    }

    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn forced_close_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.forced_close_timeout = timeout;
        self
    }

    #[must_use]
    pub fn drop_pong_frames(mut self, drop: bool) -> Self {
        self.drop_pong_frames = drop;
        self
    }

    #[must_use]
    pub fn utf8_validation(mut self, validate: bool) -> Self {
        self.utf8_validation = validate;
        self
    }

    /// Decoder settings for one end of a connection.
    #[must_use]
    pub fn decoder_config(&self, role: Role) -> DecoderConfig {
        DecoderConfig {
            max_frame_payload_len: self.max_frame_payload_len,
            expect_masked_frames: self
                .expect_masked_frames
                .unwrap_or(role.expects_masked_inbound()),
            allow_mask_mismatch: self.allow_mask_mismatch,
            allow_extensions: self.allow_extensions,
        }
    }
}
