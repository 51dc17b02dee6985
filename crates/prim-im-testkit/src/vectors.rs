//! Golden frames for deterministic verification.
//!
//! Each vector pins the exact wire bytes of one message. Any client that
//! speaks the protocol must encode these inputs to the same hex.

use bytes::Bytes;

use prim_im_core::{AccountId, Msg, MsgType};

/// A golden frame.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub version: u32,
    pub sender: AccountId,
    pub node_id: u32,
    pub receiver: AccountId,
    pub typ: MsgType,
    pub timestamp: u64,
    pub seq_num: u64,
    pub payload: &'static [u8],
    pub extension: &'static [u8],
    /// Expected wire bytes (hex).
    pub expected_hex: &'static str,
}

/// Get all golden frames.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "pending text",
            version: 0,
            sender: 1,
            node_id: 0,
            receiver: 2,
            typ: MsgType::Text,
            timestamp: 1000,
            seq_num: 0,
            payload: b"hi",
            extension: b"",
            expected_hex: "0000000000000001000000000000000202000000000003e800080000000000006869",
        },
        GoldenVector {
            name: "sequenced text with extension and widest sender",
            version: 1,
            sender: (1 << 46) - 1,
            node_id: 3,
            receiver: 7,
            typ: MsgType::Text,
            timestamp: 1_736_870_400_000,
            seq_num: 42,
            payload: b"hello",
            extension: b"xy",
            expected_hex: "00007fffffffffff0000c0000000000702008194658b1000001400000000002a68656c6c6f7879",
        },
        GoldenVector {
            name: "ack carrying minted timestamp",
            version: 0,
            sender: 1,
            node_id: 0,
            receiver: 2,
            typ: MsgType::Ack,
            timestamp: 2000,
            seq_num: 42,
            payload: b"1000",
            extension: b"",
            expected_hex: "0000000000000001000000000000000200100000000007d0001000000000002a31303030",
        },
        GoldenVector {
            name: "sync completion sentinel",
            version: 0,
            sender: 2,
            node_id: 0,
            receiver: 1,
            typ: MsgType::Sync,
            timestamp: 0,
            seq_num: 0,
            payload: &[0; 8],
            extension: b"",
            expected_hex: "00000000000000020000000000000001067000000000000000200000000000000000000000000000",
        },
        GoldenVector {
            name: "image to group",
            version: 0,
            sender: 5,
            node_id: 0,
            receiver: (1 << 36) + 7,
            typ: MsgType::Image,
            timestamp: 1_736_870_400_000,
            seq_num: 9,
            payload: &[0x89, 0x50, 0x4e, 0x47],
            extension: b"",
            expected_hex: "0000000000000005000000100000000702300194658b1000001000000000000989504e47",
        },
    ]
}

/// Build the message described by a golden frame.
pub fn msg_from_vector(vector: &GoldenVector) -> Msg {
    let mut msg = Msg::build(
        vector.typ,
        vector.sender,
        vector.receiver,
        vector.node_id,
        vector.timestamp,
        Bytes::from_static(vector.payload),
        Bytes::from_static(vector.extension),
    )
    .expect("golden fields fit the header");
    msg.head.version = vector.version;
    msg.head.seq_num = vector.seq_num;
    msg
}

/// Encode every golden frame and compare against its expected hex.
///
/// Returns `(name, matches, actual_hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let hex = msg_from_vector(v)
                .encode()
                .map(|bytes| hex::encode(&bytes))
                .unwrap_or_else(|e| format!("encode failed: {e}"));
            let matches = hex == v.expected_hex;
            (v.name.to_string(), matches, hex)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prim_im_core::CodecError;

    #[test]
    fn test_vectors_match() {
        for (name, matches, hex) in verify_all_vectors() {
            assert!(matches, "vector '{name}' encoded to {hex}");
        }
    }

    #[test]
    fn test_vectors_decode_to_inputs() {
        for vector in all_vectors() {
            let bytes = hex::decode(vector.expected_hex).unwrap();
            let msg = Msg::decode(&bytes).unwrap();
            assert_eq!(msg, msg_from_vector(&vector), "vector '{}'", vector.name);
        }
    }

    #[test]
    fn test_sentinel_vector_reads_as_done() {
        let vector = all_vectors()
            .into_iter()
            .find(|v| v.typ == MsgType::Sync)
            .unwrap();
        let msg = msg_from_vector(&vector);
        assert_eq!(msg.sync_remaining().unwrap(), 0);
        assert!(prim_im_sync::is_sync_done(&msg));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut bytes = hex::decode(all_vectors()[0].expected_hex).unwrap();
        // type 0x7ff in the top 12 bits of word2
        bytes[16] = 0x7f;
        bytes[17] |= 0xf0;
        assert!(matches!(
            Msg::decode(&bytes).unwrap_err(),
            CodecError::UnknownType(0x7ff)
        ));
    }
}
