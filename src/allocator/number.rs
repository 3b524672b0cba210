//! Bridge number type

use serde::{Deserialize, Serialize};
use std::fmt;

/// A bridge number in `1..=255`
///
/// Zero is never issued, so a `BridgeNum` can only be built from a non-zero
/// value. Lookups that may come up empty return `Option<BridgeNum>` instead of
/// a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BridgeNum(u8);

impl BridgeNum {
    /// Lowest number ever handed out
    pub const MIN: BridgeNum = BridgeNum(1);
    /// Highest number the presence set can track
    pub const MAX: BridgeNum = BridgeNum(u8::MAX);

    /// Create a bridge number, rejecting zero
    pub fn new(value: u8) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Validate a number read from persisted records
    pub fn from_persisted(value: u32) -> Option<Self> {
        u8::try_from(value).ok().and_then(Self::new)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for BridgeNum {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "bridge number 0 is reserved".to_string())
    }
}

impl From<BridgeNum> for u8 {
    fn from(num: BridgeNum) -> u8 {
        num.0
    }
}

impl From<BridgeNum> for u32 {
    fn from(num: BridgeNum) -> u32 {
        num.0 as u32
    }
}

impl fmt::Display for BridgeNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
