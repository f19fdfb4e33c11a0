//! Credential record and tag payload codecs
//!
//! One [`HashChainRecord`] per physical card: the identifier, the chain
//! position currently expected on the tag, and the full chain. The record
//! serializes to a fixed 402 bytes (id, index, then 100 values
//! little-endian) and must round-trip exactly.
//!
//! The 5-byte [`TagPayload`] is what actually travels to the tag: the
//! identifier byte followed by the chain value, little-endian.

use crate::chain::CHAIN_LEN;
use crate::{Error, Result};

/// Serialized record size: id + index + 100 chain values.
pub const RECORD_LEN: usize = 2 + CHAIN_LEN * 4;

/// Chain-path payload size: identifier byte + chain value.
pub const TAG_PAYLOAD_LEN: usize = 5;

/// Highest valid chain position; a record here is exhausted.
pub const MAX_CHAIN_INDEX: u8 = (CHAIN_LEN - 1) as u8;

/// Durable state for one card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashChainRecord {
    /// Card identifier, 1..=255; 0 is the reserved sentinel.
    pub card_id: u8,
    /// Chain position currently expected on the tag. Only ever increases.
    pub current_index: u8,
    /// The full chain, consumed from index 0 upward.
    pub chain: [u32; CHAIN_LEN],
}

impl HashChainRecord {
    /// New record at chain position 0.
    pub fn new(card_id: u8, chain: [u32; CHAIN_LEN]) -> Result<Self> {
        if card_id == 0 {
            return Err(Error::ReservedCardId);
        }
        Ok(Self {
            card_id,
            current_index: 0,
            chain,
        })
    }

    /// The value currently expected on the tag.
    pub fn current_value(&self) -> u32 {
        self.chain[self.current_index as usize]
    }

    /// Whether the chain has no further position to advance into.
    pub fn is_exhausted(&self) -> bool {
        self.current_index >= MAX_CHAIN_INDEX
    }

    /// Payload for the position currently expected on the tag.
    pub fn current_payload(&self) -> TagPayload {
        TagPayload::new(self.card_id, self.current_value())
    }

    pub fn serialize(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0] = self.card_id;
        out[1] = self.current_index;
        for (i, value) in self.chain.iter().enumerate() {
            let at = 2 + i * 4;
            out[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RECORD_LEN {
            return Err(Error::RecordLength {
                expected: RECORD_LEN,
                got: bytes.len(),
            });
        }
        let card_id = bytes[0];
        if card_id == 0 {
            return Err(Error::ReservedCardId);
        }
        let current_index = bytes[1];
        if current_index > MAX_CHAIN_INDEX {
            return Err(Error::IndexOutOfRange(current_index));
        }
        let mut chain = [0u32; CHAIN_LEN];
        for (i, value) in chain.iter_mut().enumerate() {
            let at = 2 + i * 4;
            *value = u32::from_le_bytes([
                bytes[at],
                bytes[at + 1],
                bytes[at + 2],
                bytes[at + 3],
            ]);
        }
        Ok(Self {
            card_id,
            current_index,
            chain,
        })
    }
}

/// What travels to the tag on the chain path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagPayload {
    pub card_id: u8,
    pub value: u32,
}

impl TagPayload {
    pub fn new(card_id: u8, value: u32) -> Self {
        Self { card_id, value }
    }

    pub fn encode(&self) -> [u8; TAG_PAYLOAD_LEN] {
        let mut out = [0u8; TAG_PAYLOAD_LEN];
        out[0] = self.card_id;
        out[1..].copy_from_slice(&self.value.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != TAG_PAYLOAD_LEN {
            return Err(Error::PayloadLength {
                expected: TAG_PAYLOAD_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self {
            card_id: bytes[0],
            value: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        })
    }
}
