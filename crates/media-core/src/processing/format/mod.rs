//! Audio format conversion.

pub mod resampler;

pub use resampler::Resampler;
