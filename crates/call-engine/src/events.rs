//! Outward notifications to the application layer.
//!
//! Events are pushed over an unbounded channel whose receiver the
//! application takes exactly once. Handlers routinely call straight back
//! into the engine (a UI "hang up" button firing from an `Ended` handler),
//! so the engine only ever sends after its registry guard is released.

use serde::{Deserialize, Serialize};

use crate::call::{FriendId, GroupId, PeerId};

/// Notifications emitted by the call engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvEvent {
    /// A friend is calling us
    Invited {
        /// Calling friend
        friend: FriendId,
        /// True when the invite includes video
        video: bool,
    },

    /// A call we participate in was fully established
    Started {
        /// Peer of the established call
        friend: FriendId,
        /// True when video was negotiated
        video: bool,
    },

    /// A call ended, by the peer, by us, or through an error
    Ended {
        /// Peer of the ended call
        friend: FriendId,
        /// True when the call died of a transport error
        error: bool,
    },

    /// A group peer's audio is being played
    GroupPeerAudio {
        /// Group the audio belongs to
        group: GroupId,
        /// Speaking peer
        peer: PeerId,
    },
}
