//! Audio filtering: echo cancellation, noise suppression, and the shared
//! capture filter chain.

pub mod aec;
pub mod noise;
pub mod processor;

pub use aec::{EchoCanceller, EchoCancellerConfig};
pub use noise::NoiseSuppressor;
pub use processor::{AudioProcessor, FilterSettings, ProcessorStats};
