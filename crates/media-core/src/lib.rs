//! Real-time audio processing for the peercall engine.
//!
//! This crate is the DSP leaf layer underneath the call engine. It owns the
//! pieces of the audio path that run on every captured and every received
//! frame:
//!
//! - fixed-ratio sample-rate conversion between the 48 kHz native rate and
//!   the 16 kHz rate the filters operate at ([`processing::format`]),
//! - acoustic echo cancellation with far-end reference buffering
//!   ([`processing::audio::aec`]),
//! - spectral noise suppression ([`processing::audio::noise`]),
//! - the capture-side filter chain that ties them together
//!   ([`processing::audio::AudioProcessor`]).
//!
//! Everything here is synchronous and allocation-light; concurrency control
//! is the caller's job (the call engine guards one `AudioProcessor` with a
//! dedicated mutex, separate from its call registry lock).

pub mod error;
pub mod processing;
pub mod types;

pub use error::{Error, Result};
pub use processing::audio::{
    AudioProcessor, EchoCanceller, EchoCancellerConfig, FilterSettings, NoiseSuppressor,
    ProcessorStats,
};
pub use processing::format::Resampler;
pub use types::{
    AudioFrame, FAREND_FRAME_SAMPLES, FILTER_SAMPLE_RATE, NATIVE_SAMPLE_RATE, RATE_FACTOR,
    SUBFRAME_MS, SUBFRAME_SAMPLES,
};
