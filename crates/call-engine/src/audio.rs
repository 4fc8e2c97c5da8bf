//! Audio output seam.
//!
//! The playback device lives outside this crate; the engine only needs a
//! way to allocate a playback source per call (or per group-call peer) and
//! push PCM at it. The [`NullAudioBackend`] stands in where no device is
//! wired up, such as in tests and headless operation.

use std::sync::Arc;

/// A playback sink accepting PCM frames.
pub trait AudioSink: Send + Sync {
    /// Queue one PCM frame for playback.
    fn play(&self, pcm: &[i16], channels: u8, rate: u32);
}

/// Factory for playback sinks.
pub trait AudioBackend: Send + Sync {
    /// Allocate a new playback source on the output device.
    fn create_source(&self) -> Arc<dyn AudioSink>;
}

/// Discards all audio. Placeholder backend for tests and headless use.
#[derive(Debug, Default)]
pub struct NullAudioBackend;

impl AudioBackend for NullAudioBackend {
    fn create_source(&self) -> Arc<dyn AudioSink> {
        Arc::new(NullSink)
    }
}

/// Sink of [`NullAudioBackend`]
#[derive(Debug)]
struct NullSink;

impl AudioSink for NullSink {
    fn play(&self, _pcm: &[i16], _channels: u8, _rate: u32) {}
}
