//! Draft-76 challenge keys.
//!
//! Each `Sec-WebSocket-Key{1,2}` hides a number: the decimal digits of the
//! key divided by the count of spaces in it. The expected answer is the MD5
//! of both numbers (big-endian) followed by the 8-byte `key3` body.

use md5::{Digest, Md5};
use rand::{Rng, RngCore};

use crate::error::HandshakeError;

/// One generated key and the number it encodes.
#[derive(Debug, Clone)]
pub(crate) struct LegacyKey {
    pub key: String,
    pub number: u32,
}

/// Non-digit printable characters allowed as key noise.
const NOISE_LOW: std::ops::RangeInclusive<u8> = 0x21..=0x2F;
const NOISE_HIGH: std::ops::RangeInclusive<u8> = 0x3A..=0x7E;

pub(crate) fn generate_key(rng: &mut impl Rng) -> LegacyKey {
    let spaces = rng.random_range(1..=12u32);
    let number = rng.random_range(0..=u32::MAX / spaces);
    let product = number * spaces;

    let mut key: Vec<u8> = product.to_string().into_bytes();

    let noise = rng.random_range(1..=12);
    let low_count = (NOISE_LOW.end() - NOISE_LOW.start() + 1) as usize;
    let high_count = (NOISE_HIGH.end() - NOISE_HIGH.start() + 1) as usize;
    for _ in 0..noise {
        let pick = rng.random_range(0..low_count + high_count);
        let ch = if pick < low_count {
            NOISE_LOW.start() + pick as u8
        } else {
            NOISE_HIGH.start() + (pick - low_count) as u8
        };
        let pos = rng.random_range(0..=key.len());
        key.insert(pos, ch);
    }

    // Never first or last.
    for _ in 0..spaces {
        let pos = rng.random_range(1..key.len());
        key.insert(pos, b' ');
    }

    LegacyKey {
        key: String::from_utf8_lossy(&key).into_owned(),
        number,
    }
}

pub(crate) fn generate_key3(rng: &mut impl RngCore) -> [u8; 8] {
    let mut key3 = [0u8; 8];
    rng.fill_bytes(&mut key3);
    key3
}

/// Recovers the number hidden in a received key.
pub(crate) fn key_number(key: &str) -> Result<u32, HandshakeError> {
    let invalid = || HandshakeError::ChallengeKey(key.to_owned());
    let spaces = key.bytes().filter(|&b| b == b' ').count() as u64;
    if spaces == 0 {
        return Err(invalid());
    }
    let digits: String = key.chars().filter(char::is_ascii_digit).collect();
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    if value % spaces != 0 {
        return Err(invalid());
    }
    u32::try_from(value / spaces).map_err(|_| invalid())
}

pub(crate) fn challenge_response(number1: u32, number2: u32, key3: &[u8]) -> [u8; 16] {
    let mut md5 = Md5::new();
    md5.update(number1.to_be_bytes());
    md5.update(number2.to_be_bytes());
    md5.update(key3);
    md5.finalize().into()
}
