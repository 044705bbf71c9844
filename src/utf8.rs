//! Incremental UTF-8 validation for text messages that arrive in pieces.
//!
//! A byte-class/state DFA in the style of Bjoern Hoehrmann's decoder: every
//! byte maps to one of 12 classes, and the state table is indexed by
//! `state * CLASSES + class`. State 0 accepts, state 1 rejects for good.

use crate::error::WsError;

const ACCEPT: u8 = 0;
const REJECT: u8 = 1;
const CLASSES: usize = 12;

const BYTE_CLASS: [u8; 256] = build_byte_classes();

const fn byte_class(b: u8) -> u8 {
    match b {
        0x00..=0x7F => 0,
        0x80..=0x8F => 1,
        0x90..=0x9F => 9,
        0xA0..=0xBF => 7,
        0xC0 | 0xC1 => 8,
        0xC2..=0xDF => 2,
        0xE0 => 10,
        0xE1..=0xEC | 0xEE | 0xEF => 3,
        0xED => 4,
        0xF0 => 11,
        0xF1..=0xF3 => 6,
        0xF4 => 5,
        0xF5..=0xFF => 8,
    }
}

const fn build_byte_classes() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = byte_class(i as u8);
        i += 1;
    }
    table
}

// States: 0 accept, 1 reject, 2 one continuation left, 3 two left,
// 4 after E0 (needs A0..BF), 5 after ED (needs 80..9F), 6 after F0
// (needs 90..BF), 7 after F1..F3, 8 after F4 (needs 80..8F).
#[rustfmt::skip]
const TRANSITIONS: [u8; 9 * CLASSES] = [
    // 0  1  2  3  4  5  6  7  8  9 10 11
       0, 1, 2, 3, 5, 8, 7, 1, 1, 1, 4, 6, // 0
       1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 1
       1, 0, 1, 1, 1, 1, 1, 0, 1, 0, 1, 1, // 2
       1, 2, 1, 1, 1, 1, 1, 2, 1, 2, 1, 1, // 3
       1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, // 4
       1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, // 5
       1, 1, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, // 6
       1, 3, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, // 7
       1, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 8
];

/// Validates one message across any number of chunks. A rejected message
/// leaves the validator rejecting until [`Utf8Validator::reset`].
#[derive(Debug, Clone, Default)]
pub struct Utf8Validator {
    state: u8,
    checking: bool,
}

impl Utf8Validator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ACCEPT,
            checking: false,
        }
    }

    /// Feeds the next chunk of the current message.
    pub fn check(&mut self, bytes: &[u8]) -> Result<(), WsError> {
        self.checking = true;
        let mut state = self.state;
        for &b in bytes {
            // Stay on the cheap path for ASCII runs between sequences.
            if state == ACCEPT && b < 0x80 {
                continue;
            }
            state = TRANSITIONS[state as usize * CLASSES + BYTE_CLASS[b as usize] as usize];
            if state == REJECT {
                break;
            }
        }
        self.state = state;
        if state == REJECT {
            self.checking = false;
            return Err(invalid());
        }
        Ok(())
    }

    /// Ends the current message. Fails if it stopped inside a sequence.
    pub fn finish(&mut self) -> Result<(), WsError> {
        self.checking = false;
        if self.state != ACCEPT {
            return Err(invalid());
        }
        Ok(())
    }

    /// Whether a message is in progress.
    #[must_use]
    pub const fn is_checking(&self) -> bool {
        self.checking
    }

    pub fn reset(&mut self) {
        self.state = ACCEPT;
        self.checking = false;
    }
}

fn invalid() -> WsError {
    WsError::invalid_payload("bytes are not UTF-8")
}
