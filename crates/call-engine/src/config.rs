//! Settings consumed by the engine.
//!
//! Settings are owned by the application and polled read-only per relevant
//! operation; the engine never caches them beyond the filter chain's
//! documented lazy-reconfiguration points.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};
use std::sync::RwLock;

use crate::call::PeerId;

/// Audio and video preferences polled by the engine.
pub trait AudioSettings: Send + Sync {
    /// Preferred outgoing audio bitrate in bit/s
    fn audio_bitrate(&self) -> u32;

    /// Preferred video frame rate; also selects the video bitrate tier
    /// (30/25 force a fixed high-quality band, 20 selects constrained
    /// auto-bitrate, anything else leaves the encoder alone)
    fn video_fps(&self) -> u32;

    /// Whether echo cancellation is enabled
    fn echo_cancellation(&self) -> bool;

    /// Capture-to-playback latency hint in milliseconds
    fn echo_latency_ms(&self) -> u16;

    /// Echo canceller aggressiveness, 0..=4
    fn echo_mode(&self) -> u8;

    /// Noise suppression aggressiveness, 0..=3
    fn noise_suppression_mode(&self) -> u8;
}

/// Group conversation preferences polled by the engine.
pub trait GroupSettings: Send + Sync {
    /// Whether audio from this peer must not be played
    fn is_peer_blocked(&self, peer: &PeerId) -> bool;
}

/// In-memory settings, useful for tests, demos and simple embedders.
#[derive(Debug)]
pub struct StaticSettings {
    /// Outgoing audio bitrate in bit/s
    pub audio_bitrate: AtomicU32,
    /// Preferred video frame rate
    pub video_fps: AtomicU32,
    /// Echo cancellation enabled
    pub echo_cancellation: AtomicBool,
    /// Echo latency hint in milliseconds
    pub echo_latency_ms: AtomicU16,
    /// Echo canceller mode
    pub echo_mode: AtomicU8,
    /// Noise suppression mode
    pub noise_suppression_mode: AtomicU8,
    /// Peers whose group audio is dropped
    pub blocked_peers: RwLock<Vec<PeerId>>,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            audio_bitrate: AtomicU32::new(64),
            video_fps: AtomicU32::new(25),
            echo_cancellation: AtomicBool::new(true),
            echo_latency_ms: AtomicU16::new(80),
            echo_mode: AtomicU8::new(3),
            noise_suppression_mode: AtomicU8::new(1),
            blocked_peers: RwLock::new(Vec::new()),
        }
    }
}

impl AudioSettings for StaticSettings {
    fn audio_bitrate(&self) -> u32 {
        self.audio_bitrate.load(Ordering::Relaxed)
    }

    fn video_fps(&self) -> u32 {
        self.video_fps.load(Ordering::Relaxed)
    }

    fn echo_cancellation(&self) -> bool {
        self.echo_cancellation.load(Ordering::Relaxed)
    }

    fn echo_latency_ms(&self) -> u16 {
        self.echo_latency_ms.load(Ordering::Relaxed)
    }

    fn echo_mode(&self) -> u8 {
        self.echo_mode.load(Ordering::Relaxed)
    }

    fn noise_suppression_mode(&self) -> u8 {
        self.noise_suppression_mode.load(Ordering::Relaxed)
    }
}

impl GroupSettings for StaticSettings {
    fn is_peer_blocked(&self, peer: &PeerId) -> bool {
        match self.blocked_peers.read() {
            Ok(blocked) => blocked.iter().any(|p| p == peer),
            Err(_) => false,
        }
    }
}
