//! Order-independent conversation keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;
use crate::types::AccountId;

/// Key identifying the conversation between two parties.
///
/// Both ids are packed into a single `u128` as `min << 64 | max`, so
/// `new(a, b) == new(b, a)` and distinct pairs never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey(u128);

impl ChannelKey {
    pub fn new(a: AccountId, b: AccountId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self((lo as u128) << 64 | hi as u128)
    }

    /// Key for the conversation between the local account and `peer`.
    pub fn for_peer(me: AccountId, peer: AccountId) -> Self {
        Self::new(me, peer)
    }

    /// The smaller party id.
    pub fn low(&self) -> AccountId {
        (self.0 >> 64) as AccountId
    }

    /// The larger party id.
    pub fn high(&self) -> AccountId {
        self.0 as AccountId
    }

    /// The party that is not `me`. A self-conversation returns `me`.
    pub fn other(&self, me: AccountId) -> AccountId {
        if self.low() == me {
            self.high()
        } else {
            self.low()
        }
    }

    /// Check if `id` is one of the two parties.
    pub fn contains(&self, id: AccountId) -> bool {
        self.low() == id || self.high() == id
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low(), self.high())
    }
}

impl FromStr for ChannelKey {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CodecError::MalformedPayload(format!("channel key {s:?}"));
        let (a, b) = s.split_once('-').ok_or_else(malformed)?;
        let a = a.parse().map_err(|_| malformed())?;
        let b = b.parse().map_err(|_| malformed())?;
        Ok(Self::new(a, b))
    }
}

/// The local account, holding the id every channel lookup resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
}

impl Account {
    pub fn new(id: AccountId) -> Self {
        Self { id }
    }

    pub fn channel_with(&self, peer: AccountId) -> ChannelKey {
        ChannelKey::for_peer(self.id, peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_display() {
        assert_eq!(ChannelKey::new(9, 3).to_string(), "3-9");
        assert_eq!("3-9".parse::<ChannelKey>().unwrap(), ChannelKey::new(3, 9));
        assert!("3_9".parse::<ChannelKey>().is_err());
        assert!("a-9".parse::<ChannelKey>().is_err());
    }

    #[test]
    fn test_no_string_concatenation_collision() {
        // "1"+"23" and "12"+"3" must stay distinct
        assert_ne!(ChannelKey::new(1, 23), ChannelKey::new(12, 3));
    }

    #[test]
    fn test_other_party() {
        let key = ChannelKey::new(1, 2);
        assert_eq!(key.other(1), 2);
        assert_eq!(key.other(2), 1);
        assert!(key.contains(2));
        assert!(!key.contains(3));
        assert_eq!(ChannelKey::new(5, 5).other(5), 5);
    }

    #[test]
    fn test_account_channel() {
        let account = Account::new(1);
        assert_eq!(account.channel_with(2), ChannelKey::new(2, 1));
    }

    proptest! {
        #[test]
        fn prop_key_symmetry(a in any::<u64>(), b in any::<u64>()) {
            prop_assert_eq!(ChannelKey::new(a, b), ChannelKey::new(b, a));
        }

        #[test]
        fn prop_key_injective(a in any::<u64>(), b in any::<u64>(), c in any::<u64>(), d in any::<u64>()) {
            let same_pair = (a.min(b), a.max(b)) == (c.min(d), c.max(d));
            prop_assert_eq!(ChannelKey::new(a, b) == ChannelKey::new(c, d), same_pair);
        }
    }
}
