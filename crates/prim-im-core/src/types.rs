//! Message kinds, identifiers and delivery positions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account or group identifier as carried in the 46-bit header fields.
pub type AccountId = u64;

/// Identifiers at or above this value address a group rather than a user.
pub const GROUP_ID_THRESHOLD: AccountId = 1 << 36;

/// Whether the identifier addresses a group.
pub fn is_group(id: AccountId) -> bool {
    id >= GROUP_ID_THRESHOLD
}

/// The kind of a frame, determining how payload and extension are read.
///
/// Codes are grouped in ranges of 32: content, control, logic, business,
/// and internal server traffic that never reaches a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum MsgType {
    NA = 0,
    /// Confirms the sequence number assigned to a previously sent message.
    Ack = 1,

    // Content (32..=37)
    Text = 32,
    Meme = 33,
    File = 34,
    Image = 35,
    Video = 36,
    Audio = 37,

    // Control (64..=65)
    Edit = 64,
    Withdraw = 65,

    // Logic (96..)
    Auth = 96,
    Ping = 97,
    Pong = 98,
    Echo = 99,
    Error = 100,
    BeOffline = 101,
    InternalError = 102,
    /// Backfill progress; payload is the remaining count.
    Sync = 103,
    /// Roster snapshot of `[peer_id, last_activity]` pairs.
    Box = 104,

    // Business (128..)
    SystemMessage = 128,
    AddFriend = 129,
    RemoveFriend = 130,
    JoinGroup = 131,
    LeaveGroup = 132,
    RemoteInvoke = 133,
    SetRelationship = 134,

    // Internal (160..)
    Noop = 160,
    Close = 161,
    Compressed = 162,
}

impl MsgType {
    /// Convert to the 12-bit wire code.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Try to parse from a wire code.
    pub fn from_u16(value: u16) -> Option<Self> {
        let typ = match value {
            0 => Self::NA,
            1 => Self::Ack,
            32 => Self::Text,
            33 => Self::Meme,
            34 => Self::File,
            35 => Self::Image,
            36 => Self::Video,
            37 => Self::Audio,
            64 => Self::Edit,
            65 => Self::Withdraw,
            96 => Self::Auth,
            97 => Self::Ping,
            98 => Self::Pong,
            99 => Self::Echo,
            100 => Self::Error,
            101 => Self::BeOffline,
            102 => Self::InternalError,
            103 => Self::Sync,
            104 => Self::Box,
            128 => Self::SystemMessage,
            129 => Self::AddFriend,
            130 => Self::RemoveFriend,
            131 => Self::JoinGroup,
            132 => Self::LeaveGroup,
            133 => Self::RemoteInvoke,
            134 => Self::SetRelationship,
            160 => Self::Noop,
            161 => Self::Close,
            162 => Self::Compressed,
            _ => return None,
        };
        Some(typ)
    }

    /// User-visible content that belongs in a channel timeline.
    pub fn is_content(self) -> bool {
        (32..=37).contains(&self.to_u16())
    }

    /// Edits and withdrawals of earlier content.
    pub fn is_control(self) -> bool {
        (64..=95).contains(&self.to_u16())
    }

    /// Session-level traffic between client and server.
    pub fn is_logic(self) -> bool {
        (96..=127).contains(&self.to_u16())
    }

    /// Relationship and system notifications.
    pub fn is_business(self) -> bool {
        (128..=159).contains(&self.to_u16())
    }

    /// Server-to-server traffic; never surfaced to a user.
    pub fn is_internal(self) -> bool {
        self.to_u16() >= 160
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.to_u16())
    }
}

/// Where a message sits in its channel.
///
/// On the wire an unassigned sequence number is `0`; in memory that case is
/// a distinct variant ordered by its minting timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    /// Locally authored, not yet acknowledged by the server.
    Pending { timestamp: u64 },
    /// Server-assigned sequence number.
    Confirmed { seq_num: u64 },
}

impl Position {
    /// Build from wire values.
    pub fn from_wire(seq_num: u64, timestamp: u64) -> Self {
        if seq_num == 0 {
            Position::Pending { timestamp }
        } else {
            Position::Confirmed { seq_num }
        }
    }

    /// Check if the message still awaits acknowledgement.
    pub fn is_pending(&self) -> bool {
        matches!(self, Position::Pending { .. })
    }

    /// The confirmed sequence number, if any.
    pub fn seq_num(&self) -> Option<u64> {
        match self {
            Position::Confirmed { seq_num } => Some(*seq_num),
            Position::Pending { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_code_roundtrip() {
        for code in 0u16..=200 {
            if let Some(typ) = MsgType::from_u16(code) {
                assert_eq!(typ.to_u16(), code);
            }
        }
        assert_eq!(MsgType::from_u16(2), None);
        assert_eq!(MsgType::from_u16(4095), None);
    }

    #[test]
    fn test_msg_type_categories() {
        assert!(MsgType::Text.is_content());
        assert!(MsgType::Audio.is_content());
        assert!(!MsgType::Ack.is_content());
        assert!(MsgType::Withdraw.is_control());
        assert!(MsgType::Sync.is_logic());
        assert!(MsgType::Box.is_logic());
        assert!(MsgType::AddFriend.is_business());
        assert!(MsgType::Compressed.is_internal());
    }

    #[test]
    fn test_position_from_wire() {
        assert_eq!(
            Position::from_wire(0, 1000),
            Position::Pending { timestamp: 1000 }
        );
        assert_eq!(
            Position::from_wire(42, 1000),
            Position::Confirmed { seq_num: 42 }
        );
        assert!(Position::from_wire(0, 5).is_pending());
        assert_eq!(Position::from_wire(7, 5).seq_num(), Some(7));
    }

    #[test]
    fn test_group_threshold() {
        assert!(!is_group(GROUP_ID_THRESHOLD - 1));
        assert!(is_group(GROUP_ID_THRESHOLD));
    }

    #[test]
    fn test_msg_type_serde() {
        let json = serde_json::to_string(&MsgType::Text).unwrap();
        let back: MsgType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MsgType::Text);
    }
}
