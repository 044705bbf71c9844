use rand::RngCore;

/// XORs `buf` in place with the 4-byte masking key. Applying it twice
/// restores the input.
#[inline]
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    let key_word = u32::from_ne_bytes(key);
    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ key_word;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

/// Fresh masking key for an outbound client frame.
pub fn generate_mask_key() -> [u8; 4] {
    let mut key = [0u8; 4];
    rand::rng().fill_bytes(&mut key);
    key
}
