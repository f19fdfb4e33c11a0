//! Offset rewrite transform
//!
//! Adds a single-byte scalar into an 8-byte payload as if the payload were
//! one little-endian integer: the offset lands in byte 0 and the carry
//! walks up through byte 7. Carry out of byte 7 is discarded; it never
//! wraps back into byte 0. Non-cryptographic — this backs the generic
//! rewrite path, not the rolling credential.

/// Length of the raw payload the transform operates on.
pub const OFFSET_PAYLOAD_LEN: usize = 8;

pub struct OffsetCipher;

impl OffsetCipher {
    /// Add `offset` into the payload with carry propagation.
    pub fn apply(
        payload: [u8; OFFSET_PAYLOAD_LEN],
        offset: u8,
    ) -> [u8; OFFSET_PAYLOAD_LEN] {
        let mut out = payload;
        let mut carry = u16::from(offset);
        for byte in out.iter_mut() {
            let sum = u16::from(*byte) + carry;
            *byte = (sum & 0xFF) as u8;
            carry = u16::from(sum > 0xFF);
        }
        out
    }

    /// Subtract `offset` back out with borrow propagation. Inverse of
    /// [`OffsetCipher::apply`] for any payload and offset.
    pub fn invert(
        payload: [u8; OFFSET_PAYLOAD_LEN],
        offset: u8,
    ) -> [u8; OFFSET_PAYLOAD_LEN] {
        let mut out = payload;
        let mut borrow = i16::from(offset);
        for byte in out.iter_mut() {
            let diff = i16::from(*byte) - borrow;
            *byte = (diff & 0xFF) as u8;
            borrow = i16::from(diff < 0);
        }
        out
    }
}
