//! Fixed-width frame header.
//!
//! The header is four big-endian 64-bit words. Each word packs two or three
//! logical fields:
//!
//! ```text
//! word0 = version(18)  << 46 | sender(46)
//! word1 = node_id(18)  << 46 | receiver(46)
//! word2 = type(12)     << 52 | extension_length(6) << 46 | timestamp(46)
//! word3 = payload_length(14) << 50 | seq_num(50)
//! ```
//!
//! Encoding never masks silently: a value wider than its field is rejected
//! with [`CodecError::FieldOverflow`].

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};
use crate::types::{AccountId, MsgType, Position};

/// Header width in bytes.
pub const HEAD_LEN: usize = 32;

/// Bit widths of each header field.
pub mod widths {
    pub const VERSION: u32 = 18;
    pub const ID: u32 = 46;
    pub const NODE_ID: u32 = 18;
    pub const TYPE: u32 = 12;
    pub const EXTENSION_LENGTH: u32 = 6;
    pub const TIMESTAMP: u32 = 46;
    pub const PAYLOAD_LENGTH: u32 = 14;
    pub const SEQ_NUM: u32 = 50;
}

/// Largest value representable in `bits` bits.
pub const fn max_value(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

/// Largest extension a frame can carry.
pub const MAX_EXTENSION_LEN: usize = max_value(widths::EXTENSION_LENGTH) as usize;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD_LEN: usize = max_value(widths::PAYLOAD_LENGTH) as usize;

/// Largest sequence number the wire can express.
pub const MAX_SEQ_NUM: u64 = max_value(widths::SEQ_NUM);

const ID_SHIFT: u32 = widths::ID;
const TYPE_SHIFT: u32 = widths::EXTENSION_LENGTH + widths::TIMESTAMP;
const PAYLOAD_LENGTH_SHIFT: u32 = widths::SEQ_NUM;

/// Decoded frame header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    /// Protocol version tag.
    pub version: u32,
    /// Sending account or group.
    pub sender: AccountId,
    /// Server node owning the sender's connection.
    pub node_id: u32,
    /// Receiving account or group; `0` resolves to the local account.
    pub receiver: AccountId,
    /// Message kind.
    pub typ: MsgType,
    /// Extension length in bytes.
    pub extension_length: u8,
    /// Milliseconds, in the sender's authoritative clock.
    pub timestamp: u64,
    /// Payload length in bytes.
    pub payload_length: u16,
    /// Per-channel sequence number; `0` while unassigned.
    pub seq_num: u64,
}

impl Head {
    /// Where this message sits in its channel.
    pub fn position(&self) -> Position {
        Position::from_wire(self.seq_num, self.timestamp)
    }

    /// Check every field against its bit width.
    pub fn validate(&self) -> Result<()> {
        check("version", self.version as u64, widths::VERSION)?;
        check("sender", self.sender, widths::ID)?;
        check("node_id", self.node_id as u64, widths::NODE_ID)?;
        check("receiver", self.receiver, widths::ID)?;
        check("type", self.typ.to_u16() as u64, widths::TYPE)?;
        check(
            "extension_length",
            self.extension_length as u64,
            widths::EXTENSION_LENGTH,
        )?;
        check("timestamp", self.timestamp, widths::TIMESTAMP)?;
        check(
            "payload_length",
            self.payload_length as u64,
            widths::PAYLOAD_LENGTH,
        )?;
        check("seq_num", self.seq_num, widths::SEQ_NUM)?;
        Ok(())
    }

    /// Pack the header into `buf`, failing on any out-of-range field.
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        self.validate()?;

        let word0 = (self.version as u64) << ID_SHIFT | self.sender;
        let word1 = (self.node_id as u64) << ID_SHIFT | self.receiver;
        let word2 = (self.typ.to_u16() as u64) << TYPE_SHIFT
            | (self.extension_length as u64) << widths::TIMESTAMP
            | self.timestamp;
        let word3 = (self.payload_length as u64) << PAYLOAD_LENGTH_SHIFT | self.seq_num;

        buf.put_u64(word0);
        buf.put_u64(word1);
        buf.put_u64(word2);
        buf.put_u64(word3);
        Ok(())
    }

    /// Pack the header into a fresh array.
    pub fn to_bytes(&self) -> Result<[u8; HEAD_LEN]> {
        let mut out = [0u8; HEAD_LEN];
        self.encode_into(&mut &mut out[..])?;
        Ok(out)
    }

    /// Unpack a header from the first [`HEAD_LEN`] bytes of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEAD_LEN {
            return Err(CodecError::Truncated { len: bytes.len() });
        }

        let mut buf = &bytes[..HEAD_LEN];
        let word0 = buf.get_u64();
        let word1 = buf.get_u64();
        let word2 = buf.get_u64();
        let word3 = buf.get_u64();

        let code = (word2 >> TYPE_SHIFT) as u16;
        let typ = MsgType::from_u16(code).ok_or(CodecError::UnknownType(code))?;

        Ok(Self {
            version: (word0 >> ID_SHIFT) as u32,
            sender: word0 & max_value(widths::ID),
            node_id: (word1 >> ID_SHIFT) as u32,
            receiver: word1 & max_value(widths::ID),
            typ,
            extension_length: ((word2 >> widths::TIMESTAMP) & max_value(widths::EXTENSION_LENGTH))
                as u8,
            timestamp: word2 & max_value(widths::TIMESTAMP),
            payload_length: (word3 >> PAYLOAD_LENGTH_SHIFT) as u16,
            seq_num: word3 & max_value(widths::SEQ_NUM),
        })
    }

    /// Total frame length this header declares.
    pub fn frame_len(&self) -> usize {
        HEAD_LEN + self.payload_length as usize + self.extension_length as usize
    }
}

fn check(field: &'static str, value: u64, bits: u32) -> Result<()> {
    if value > max_value(bits) {
        return Err(CodecError::FieldOverflow { field, value, bits });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Head {
        Head {
            version: 1,
            sender: 1,
            node_id: 3,
            receiver: 2,
            typ: MsgType::Text,
            extension_length: 0,
            timestamp: 1_700_000_000_000,
            payload_length: 5,
            seq_num: 42,
        }
    }

    fn max_head() -> Head {
        Head {
            version: max_value(widths::VERSION) as u32,
            sender: max_value(widths::ID),
            node_id: max_value(widths::NODE_ID) as u32,
            receiver: max_value(widths::ID),
            typ: MsgType::Compressed,
            extension_length: MAX_EXTENSION_LEN as u8,
            timestamp: max_value(widths::TIMESTAMP),
            payload_length: MAX_PAYLOAD_LEN as u16,
            seq_num: MAX_SEQ_NUM,
        }
    }

    #[test]
    fn test_head_roundtrip() {
        let head = sample();
        let bytes = head.to_bytes().unwrap();
        assert_eq!(Head::decode(&bytes).unwrap(), head);
    }

    #[test]
    fn test_head_roundtrip_field_maxima() {
        let head = max_head();
        let bytes = head.to_bytes().unwrap();
        assert_eq!(Head::decode(&bytes).unwrap(), head);
    }

    #[test]
    fn test_head_word_layout() {
        let bytes = sample().to_bytes().unwrap();
        let word0 = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let word2 = u64::from_be_bytes(bytes[16..24].try_into().unwrap());
        let word3 = u64::from_be_bytes(bytes[24..32].try_into().unwrap());

        assert_eq!(word0, 1 << 46 | 1);
        assert_eq!(word2 >> 52, MsgType::Text.to_u16() as u64);
        assert_eq!(word3 >> 50, 5);
        assert_eq!(word3 & max_value(50), 42);
    }

    #[test]
    fn test_overflow_rejected_not_wrapped() {
        let mut head = sample();
        head.sender = 1 << 46;
        assert_eq!(
            head.to_bytes(),
            Err(CodecError::FieldOverflow {
                field: "sender",
                value: 1 << 46,
                bits: 46
            })
        );

        let mut head = sample();
        head.extension_length = 64;
        assert!(matches!(
            head.to_bytes(),
            Err(CodecError::FieldOverflow { field: "extension_length", .. })
        ));

        let mut head = sample();
        head.seq_num = MAX_SEQ_NUM + 1;
        assert!(matches!(
            head.to_bytes(),
            Err(CodecError::FieldOverflow { field: "seq_num", .. })
        ));
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = sample().to_bytes().unwrap();
        assert_eq!(
            Head::decode(&bytes[..31]),
            Err(CodecError::Truncated { len: 31 })
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        let mut bytes = sample().to_bytes().unwrap();
        // type 0xFFF lives in the top 12 bits of word2
        bytes[16] = 0xFF;
        bytes[17] |= 0xF0;
        assert_eq!(Head::decode(&bytes), Err(CodecError::UnknownType(0xFFF)));
    }

    #[test]
    fn test_frame_len() {
        let mut head = sample();
        head.extension_length = 8;
        assert_eq!(head.frame_len(), HEAD_LEN + 5 + 8);
    }
}
