//! Call identities and per-call session state.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::AudioSink;
use crate::state::CallStateFlags;
use crate::video::VideoSource;

/// Numeric identifier of a friend within the transport's contact list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FriendId(pub u32);

impl fmt::Display for FriendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric identifier of a group conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public-key identity of a peer inside a group call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer id from its printable public-key form
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Printable form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media state shared by both call variants.
#[derive(Debug)]
pub struct CallMedia {
    /// Fully established (as opposed to ringing or pending answer)
    pub active: bool,
    /// Local microphone muted
    pub mute_mic: bool,
    /// Local playback muted
    pub mute_vol: bool,
}

impl CallMedia {
    fn new() -> Self {
        Self {
            active: false,
            mute_mic: false,
            mute_vol: false,
        }
    }
}

/// One-to-one call session with a friend.
pub struct FriendCall {
    /// Shared mute/active state
    pub media: CallMedia,
    /// Video was negotiated for this call
    pub video_enabled: bool,
    /// Last transport-reported state; empty while ringing
    pub state: CallStateFlags,
    /// Outbound video bitrate was zeroed to signal "not sending video".
    /// Flipped from the shared-lock send path, hence atomic.
    pub null_video_bitrate: AtomicBool,
    /// Display-facing sink for the peer's video frames
    pub video_source: Arc<VideoSource>,
    /// Playback sink for the peer's audio
    pub audio_sink: Arc<dyn AudioSink>,
}

impl FriendCall {
    /// Create a ringing session.
    pub fn new(video_enabled: bool, audio_sink: Arc<dyn AudioSink>) -> Self {
        Self {
            media: CallMedia::new(),
            video_enabled,
            state: CallStateFlags::empty(),
            null_video_bitrate: AtomicBool::new(false),
            video_source: Arc::new(VideoSource::new()),
            audio_sink,
        }
    }

    /// Whether the outbound video bitrate is currently zeroed
    pub fn video_suspended(&self) -> bool {
        self.null_video_bitrate.load(Ordering::Acquire)
    }
}

impl fmt::Debug for FriendCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FriendCall")
            .field("media", &self.media)
            .field("video_enabled", &self.video_enabled)
            .field("state", &self.state)
            .field("video_suspended", &self.video_suspended())
            .finish()
    }
}

/// Group call session: audio fan-out over every participating peer.
pub struct GroupCall {
    /// Shared mute/active state
    pub media: CallMedia,
    /// Per-peer playback sources, allocated lazily as peers speak
    pub sources: HashMap<PeerId, Arc<dyn AudioSink>>,
}

impl GroupCall {
    /// Create a group session; group calls are active from the start.
    pub fn new() -> Self {
        let mut media = CallMedia::new();
        media.active = true;
        Self {
            media,
            sources: HashMap::new(),
        }
    }

    /// Drop the audio source of a peer that left the group.
    pub fn remove_peer(&mut self, peer: &PeerId) {
        self.sources.remove(peer);
    }
}

impl fmt::Debug for GroupCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupCall")
            .field("media", &self.media)
            .field("peers", &self.sources.len())
            .finish()
    }
}
