//! Persisted key layout
//!
//! Payload entries live under 8-byte big-endian slot keys, so byte order and
//! numeric order agree and the engine's sorted iteration is FIFO order. The
//! transactional backend additionally keeps its head pointer under
//! [`HEAD_POINTER_KEY`], which can never be mistaken for a slot because of
//! its length.

use crate::error::{Error, Result};

pub const SLOT_KEY_LEN: usize = 8;

/// Reserved metadata key holding the persisted head pointer
pub const HEAD_POINTER_KEY: &[u8] = b"_head_pointer";

pub fn encode_slot(slot: u64) -> [u8; SLOT_KEY_LEN] {
    slot.to_be_bytes()
}

pub fn decode_slot(bytes: &[u8]) -> Result<u64> {
    let buf: [u8; SLOT_KEY_LEN] = bytes.try_into().map_err(|_| {
        Error::CorruptKey(format!(
            "expected {} bytes for slot key, got {}",
            SLOT_KEY_LEN,
            bytes.len()
        ))
    })?;
    Ok(u64::from_be_bytes(buf))
}

pub fn is_slot_key(bytes: &[u8]) -> bool {
    bytes.len() == SLOT_KEY_LEN
}

pub fn encode_head_pointer(head: u64) -> [u8; 8] {
    head.to_be_bytes()
}

pub fn decode_head_pointer(bytes: &[u8]) -> Result<u64> {
    let buf: [u8; 8] = bytes.try_into().map_err(|_| {
        Error::CorruptKey(format!(
            "expected 8 bytes for head pointer, got {}",
            bytes.len()
        ))
    })?;
    Ok(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_keys_sort_numerically() {
        let slots = [0u64, 1, 255, 256, 65_535, 1 << 40, u64::MAX];
        for pair in slots.windows(2) {
            assert!(encode_slot(pair[0]) < encode_slot(pair[1]));
        }
    }

    #[test]
    fn test_slot_key_layout() {
        assert_eq!(encode_slot(1), [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(decode_slot(&encode_slot(0xDEAD_BEEF)).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_head_pointer_key_is_not_a_slot() {
        assert!(!is_slot_key(HEAD_POINTER_KEY));
        assert!(decode_slot(HEAD_POINTER_KEY).is_err());
    }

    #[test]
    fn test_bad_head_pointer_rejected() {
        assert!(matches!(
            decode_head_pointer(&[1, 2, 3]),
            Err(Error::CorruptKey(_))
        ));
    }
}
