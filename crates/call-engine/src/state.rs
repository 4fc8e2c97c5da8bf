//! Strongly-typed call state flags.
//!
//! The transport reports per-call capability and lifecycle as a bitmask
//! with positional meaning. `CallStateFlags` gives every bit a name so the
//! engine never tests raw integers.

use serde::{Deserialize, Serialize};

/// Flag set describing what a call is currently doing.
///
/// An empty set means the call is still ringing; `ERROR` and `FINISHED`
/// are terminal and never combined with the capability flags by the
/// transport.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallStateFlags(u32);

impl CallStateFlags {
    /// The call ended because of a transport-level error
    pub const ERROR: CallStateFlags = CallStateFlags(1);
    /// The peer ended the call
    pub const FINISHED: CallStateFlags = CallStateFlags(2);
    /// The peer is sending audio
    pub const SENDING_AUDIO: CallStateFlags = CallStateFlags(4);
    /// The peer is sending video
    pub const SENDING_VIDEO: CallStateFlags = CallStateFlags(8);
    /// The peer accepts audio from us
    pub const ACCEPTING_AUDIO: CallStateFlags = CallStateFlags(16);
    /// The peer accepts video from us
    pub const ACCEPTING_VIDEO: CallStateFlags = CallStateFlags(32);

    const ALL: u32 = 63;

    /// The empty set (ringing, nothing negotiated yet)
    pub const fn empty() -> Self {
        CallStateFlags(0)
    }

    /// Build from a transport bitmask, dropping unknown bits.
    pub const fn from_bits(bits: u32) -> Self {
        CallStateFlags(bits & Self::ALL)
    }

    /// Raw bit value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every flag in `other` is set in `self`
    pub const fn contains(self, other: CallStateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the given flags
    pub fn insert(&mut self, other: CallStateFlags) {
        self.0 |= other.0;
    }

    /// Clear the given flags
    pub fn remove(&mut self, other: CallStateFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for CallStateFlags {
    type Output = CallStateFlags;

    fn bitor(self, rhs: CallStateFlags) -> CallStateFlags {
        CallStateFlags(self.0 | rhs.0)
    }
}

impl std::fmt::Debug for CallStateFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "CallStateFlags(ringing)");
        }
        let names = [
            (Self::ERROR, "ERROR"),
            (Self::FINISHED, "FINISHED"),
            (Self::SENDING_AUDIO, "SENDING_AUDIO"),
            (Self::SENDING_VIDEO, "SENDING_VIDEO"),
            (Self::ACCEPTING_AUDIO, "ACCEPTING_AUDIO"),
            (Self::ACCEPTING_VIDEO, "ACCEPTING_VIDEO"),
        ];
        let mut first = true;
        write!(f, "CallStateFlags(")?;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        write!(f, ")")
    }
}
