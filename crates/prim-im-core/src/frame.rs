//! Complete frames: header, payload and extension.
//!
//! The wire layout is `[header:32][payload][extension]`. Decoding is strict:
//! the buffer must hold exactly the number of bytes the header declares.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::channel::ChannelKey;
use crate::error::{CodecError, Result};
use crate::header::{max_value, widths, Head, HEAD_LEN};
use crate::types::{is_group, AccountId, MsgType, Position};

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A decoded message frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Msg {
    pub head: Head,
    pub payload: Bytes,
    pub extension: Bytes,
}

impl Msg {
    /// Build a frame, deriving both length fields from the attached sections.
    pub fn build(
        typ: MsgType,
        sender: AccountId,
        receiver: AccountId,
        node_id: u32,
        timestamp: u64,
        payload: Bytes,
        extension: Bytes,
    ) -> Result<Self> {
        let payload_length = section_len("payload_length", payload.len(), widths::PAYLOAD_LENGTH)?;
        let extension_length =
            section_len("extension_length", extension.len(), widths::EXTENSION_LENGTH)?;

        let head = Head {
            version: 0,
            sender,
            node_id,
            receiver,
            typ,
            extension_length: extension_length as u8,
            timestamp,
            payload_length: payload_length as u16,
            seq_num: 0,
        };
        head.validate()?;

        Ok(Self {
            head,
            payload,
            extension,
        })
    }

    /// A text message, unsequenced until the server acknowledges it.
    pub fn text(
        sender: AccountId,
        receiver: AccountId,
        node_id: u32,
        timestamp: u64,
        text: &str,
    ) -> Result<Self> {
        Self::build(
            MsgType::Text,
            sender,
            receiver,
            node_id,
            timestamp,
            Bytes::copy_from_slice(text.as_bytes()),
            Bytes::new(),
        )
    }

    /// Server acknowledgement of a message minted at `minted_ts`.
    ///
    /// The header carries the original sender and receiver, the assigned
    /// sequence number and the authoritative server timestamp.
    pub fn ack(
        sender: AccountId,
        receiver: AccountId,
        node_id: u32,
        server_ts: u64,
        seq_num: u64,
        minted_ts: u64,
    ) -> Result<Self> {
        let mut msg = Self::build(
            MsgType::Ack,
            sender,
            receiver,
            node_id,
            server_ts,
            Bytes::from(minted_ts.to_string()),
            Bytes::new(),
        )?;
        msg.head.seq_num = seq_num;
        msg.head.validate()?;
        Ok(msg)
    }

    /// Authentication request carrying the session token.
    pub fn auth(account: AccountId, node_id: u32, timestamp: u64, token: &str) -> Result<Self> {
        Self::build(
            MsgType::Auth,
            account,
            0,
            node_id,
            timestamp,
            Bytes::copy_from_slice(token.as_bytes()),
            Bytes::new(),
        )
    }

    /// Keep-alive probe.
    pub fn ping(account: AccountId, node_id: u32, timestamp: u64) -> Result<Self> {
        Self::build(
            MsgType::Ping,
            account,
            0,
            node_id,
            timestamp,
            Bytes::new(),
            Bytes::new(),
        )
    }

    /// Backfill progress for the channel `(sender, receiver)`.
    pub fn sync_progress(
        sender: AccountId,
        receiver: AccountId,
        timestamp: u64,
        remaining: u64,
    ) -> Result<Self> {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_u64(remaining);
        Self::build(
            MsgType::Sync,
            sender,
            receiver,
            0,
            timestamp,
            payload.freeze(),
            Bytes::new(),
        )
    }

    /// Sentinel closing a backfill: nothing remains.
    pub fn sync_done(sender: AccountId, receiver: AccountId, timestamp: u64) -> Result<Self> {
        Self::sync_progress(sender, receiver, timestamp, 0)
    }

    /// Roster request; the server answers with a `Box` frame.
    pub fn box_request(account: AccountId, node_id: u32, timestamp: u64) -> Result<Self> {
        Self::build(
            MsgType::Box,
            account,
            0,
            node_id,
            timestamp,
            Bytes::new(),
            Bytes::new(),
        )
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Result<Bytes> {
        if self.payload.len() != self.head.payload_length as usize {
            return Err(CodecError::LengthMismatch {
                section: "payload",
                declared: self.head.payload_length as usize,
                actual: self.payload.len(),
            });
        }
        if self.extension.len() != self.head.extension_length as usize {
            return Err(CodecError::LengthMismatch {
                section: "extension",
                declared: self.head.extension_length as usize,
                actual: self.extension.len(),
            });
        }

        let mut buf = BytesMut::with_capacity(self.head.frame_len());
        self.head.encode_into(&mut buf)?;
        buf.put_slice(&self.payload);
        buf.put_slice(&self.extension);
        Ok(buf.freeze())
    }

    /// Parse wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let head = Head::decode(bytes)?;
        let declared = head.frame_len();
        if bytes.len() < declared {
            return Err(CodecError::Overrun {
                declared,
                available: bytes.len(),
            });
        }
        if bytes.len() > declared {
            return Err(CodecError::TrailingBytes {
                declared,
                available: bytes.len(),
            });
        }

        let payload_end = HEAD_LEN + head.payload_length as usize;
        Ok(Self {
            payload: Bytes::copy_from_slice(&bytes[HEAD_LEN..payload_end]),
            extension: Bytes::copy_from_slice(&bytes[payload_end..declared]),
            head,
        })
    }

    /// Payload as UTF-8 text.
    pub fn payload_text(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| CodecError::MalformedPayload(format!("payload is not utf-8: {e}")))
    }

    /// Where the message sits in its channel.
    pub fn position(&self) -> Position {
        self.head.position()
    }

    /// Receiver with `0` resolved to the local account.
    pub fn resolved_receiver(&self, me: AccountId) -> AccountId {
        if self.head.receiver == 0 {
            me
        } else {
            self.head.receiver
        }
    }

    /// Channel this message belongs to, from the local account's view.
    pub fn channel_key(&self, me: AccountId) -> ChannelKey {
        ChannelKey::new(self.head.sender, self.resolved_receiver(me))
    }

    /// The other party of the conversation: the group for group traffic,
    /// otherwise whichever side is not `me`.
    pub fn peer_of(&self, me: AccountId) -> AccountId {
        let receiver = self.resolved_receiver(me);
        if is_group(receiver) || self.head.sender == me {
            receiver
        } else {
            self.head.sender
        }
    }

    /// Minted timestamp echoed in an `Ack` payload.
    pub fn ack_minted_timestamp(&self) -> Result<u64> {
        let text = self.payload_text()?;
        text.trim()
            .parse()
            .map_err(|_| CodecError::MalformedPayload(format!("ack timestamp {text:?}")))
    }

    /// Remaining count carried by a `Sync` frame.
    pub fn sync_remaining(&self) -> Result<u64> {
        let raw: [u8; 8] = self.payload[..].try_into().map_err(|_| {
            CodecError::MalformedPayload(format!(
                "sync payload is {} bytes, expected 8",
                self.payload.len()
            ))
        })?;
        Ok(u64::from_be_bytes(raw))
    }
}

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}->{} seq={} ts={} payload={}",
            self.head.typ,
            self.head.sender,
            self.head.receiver,
            self.head.seq_num,
            self.head.timestamp,
            hex::encode(&self.payload)
        )
    }
}

fn section_len(field: &'static str, len: usize, bits: u32) -> Result<usize> {
    if len as u64 > max_value(bits) {
        return Err(CodecError::FieldOverflow {
            field,
            value: len as u64,
            bits,
        });
    }
    Ok(len)
}
