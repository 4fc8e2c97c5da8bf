//! The capture-side audio filter chain.
//!
//! One `AudioProcessor` is shared by every call: it owns the two persistent
//! resampler instances, the echo canceller, the noise suppressor and the
//! capture high-pass pre-filter. The caller serializes access (the call
//! engine keeps it behind a dedicated mutex, separate from the call
//! registry lock).
//!
//! Capture direction: high-pass -> downsample to the filter rate -> per
//! 10 ms sub-frame noise suppression then echo cancellation -> upsample ->
//! rewrite the caller's buffer in place. Playback direction: eligible
//! frames are downsampled and queued as the echo canceller's far-end
//! reference without modifying the played audio.

use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type, Q_BUTTERWORTH_F32};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::processing::audio::aec::{EchoCanceller, EchoCancellerConfig};
use crate::processing::audio::noise::NoiseSuppressor;
use crate::processing::format::Resampler;
use crate::types::{
    FAREND_FRAME_SAMPLES, FILTER_SAMPLE_RATE, NATIVE_SAMPLE_RATE, SUBFRAME_SAMPLES,
};

/// Samples per 10 ms sub-frame at the native rate.
const NATIVE_SUBFRAME_SAMPLES: usize = crate::types::NATIVE_SUBFRAME_SAMPLES;

/// Cutoff of the capture high-pass pre-filter (Hz).
const HIGHPASS_CUTOFF_HZ: f32 = 80.0;

/// Filter configuration polled from user settings.
///
/// The processor caches the last applied values and reconfigures the
/// engines only when a value changes, so the cost of reconfiguration is
/// bound to setting-change events rather than the per-frame hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSettings {
    /// Capture-to-playback latency hint in milliseconds
    pub echo_latency_ms: u16,
    /// Echo canceller aggressiveness, 0..=4
    pub echo_mode: u8,
    /// Noise suppression aggressiveness, 0..=3
    pub noise_mode: u8,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            echo_latency_ms: 80,
            echo_mode: 3,
            noise_mode: 1,
        }
    }
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessorStats {
    /// Capture frames that completed the whole chain
    pub frames_filtered: u64,
    /// Playback frames accepted as far-end reference
    pub farend_frames: u64,
    /// Individual stage failures that fell back to unfiltered audio
    pub stage_failures: u64,
    /// Times a setting change forced an engine reconfiguration
    pub reconfigurations: u64,
}

/// The shared capture filter chain.
pub struct AudioProcessor {
    downsampler: Resampler,
    upsampler: Resampler,
    aec: EchoCanceller,
    ns: NoiseSuppressor,
    highpass: DirectForm1<f32>,
    cached: FilterSettings,
    stats: ProcessorStats,
}

impl AudioProcessor {
    /// Create the chain with default filter settings.
    pub fn new() -> Result<Self> {
        let cached = FilterSettings::default();
        let aec = EchoCanceller::new(EchoCancellerConfig {
            echo_mode: cached.echo_mode,
            ..EchoCancellerConfig::default()
        })?;
        let ns = NoiseSuppressor::new(cached.noise_mode)?;
        let coeffs = Coefficients::<f32>::from_params(
            Type::HighPass,
            (NATIVE_SAMPLE_RATE as f32).hz(),
            HIGHPASS_CUTOFF_HZ.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| Error::InvalidParameter(format!("high-pass design failed: {:?}", e)))?;

        Ok(Self {
            downsampler: Resampler::new(NATIVE_SAMPLE_RATE, FILTER_SAMPLE_RATE)?,
            upsampler: Resampler::new(FILTER_SAMPLE_RATE, NATIVE_SAMPLE_RATE)?,
            aec,
            ns,
            highpass: DirectForm1::<f32>::new(coeffs),
            cached,
            stats: ProcessorStats::default(),
        })
    }

    /// Diagnostic counters
    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    /// Run the capture chain over a frame, rewriting it in place.
    ///
    /// Returns `Ok(true)` when the buffer was filtered. Frames the chain
    /// does not apply to (non-mono, non-native rate, length not a whole
    /// number of 10 ms sub-frames) and frames where a stage failed are left
    /// unmodified and reported as `Ok(false)`; a frame is never lost to a
    /// filter failure.
    pub fn process_capture_frame(
        &mut self,
        pcm: &mut [i16],
        channels: u8,
        rate: u32,
        settings: &FilterSettings,
    ) -> Result<bool> {
        if channels != 1 || rate != NATIVE_SAMPLE_RATE {
            return Ok(false);
        }
        if pcm.is_empty() || pcm.len() % NATIVE_SUBFRAME_SAMPLES != 0 {
            return Ok(false);
        }

        self.reconfigure(settings);

        // High-pass into a scratch buffer so a later stage failure leaves
        // the caller's audio untouched.
        let filtered: Vec<i16> = pcm
            .iter()
            .map(|&s| {
                let y = self.highpass.run(s as f32);
                y.clamp(i16::MIN as f32, i16::MAX as f32) as i16
            })
            .collect();

        let low = match self.downsampler.process(&filtered) {
            Ok(low) => low,
            Err(e) => {
                warn!("capture downsample failed, sending unfiltered: {}", e);
                self.stats.stage_failures += 1;
                return Ok(false);
            }
        };

        let frame_ms = (pcm.len() as u32 * 1000 / NATIVE_SAMPLE_RATE) as u16;
        let delay_ms = self.cached.echo_latency_ms + frame_ms;

        let mut processed = Vec::with_capacity(low.len());
        for sub in low.chunks_exact(SUBFRAME_SAMPLES) {
            let clean = match self.ns.process(sub) {
                Ok(clean) => clean,
                Err(e) => {
                    warn!("noise suppression failed, using raw sub-frame: {}", e);
                    self.stats.stage_failures += 1;
                    sub.to_vec()
                }
            };
            let cancelled = match self.aec.process(sub, &clean, delay_ms) {
                Ok(cancelled) => cancelled,
                Err(e) => {
                    warn!("echo cancellation failed, using suppressed sub-frame: {}", e);
                    self.stats.stage_failures += 1;
                    clean
                }
            };
            processed.extend_from_slice(&cancelled);
        }

        let high = match self.upsampler.process(&processed) {
            Ok(high) => high,
            Err(e) => {
                warn!("capture upsample failed, sending unfiltered: {}", e);
                self.stats.stage_failures += 1;
                return Ok(false);
            }
        };

        pcm.copy_from_slice(&high);
        self.stats.frames_filtered += 1;
        Ok(true)
    }

    /// Queue a playback frame as the echo canceller's far-end reference.
    ///
    /// Only mono frames at the native rate with one of the accepted
    /// playback lengths are eligible; anything else is ignored. The played
    /// audio itself is never modified here.
    pub fn buffer_playback_frame(&mut self, pcm: &[i16], channels: u8, rate: u32) {
        if channels != 1 || rate != NATIVE_SAMPLE_RATE {
            return;
        }
        if !FAREND_FRAME_SAMPLES.contains(&pcm.len()) {
            return;
        }
        match self.downsampler.process(pcm) {
            Ok(low) => {
                self.aec.buffer_farend(&low);
                self.stats.farend_frames += 1;
            }
            Err(e) => {
                warn!("far-end downsample failed, reference dropped: {}", e);
                self.stats.stage_failures += 1;
            }
        }
    }

    fn reconfigure(&mut self, settings: &FilterSettings) {
        if *settings == self.cached {
            return;
        }
        if settings.echo_latency_ms != self.cached.echo_latency_ms {
            debug!("filter delay set to {} ms", settings.echo_latency_ms);
        }
        if settings.echo_mode != self.cached.echo_mode {
            self.aec.set_echo_mode(settings.echo_mode);
        }
        if settings.noise_mode != self.cached.noise_mode {
            self.ns.set_mode(settings.noise_mode);
        }
        self.cached = *settings;
        self.stats.reconfigurations += 1;
    }
}

impl std::fmt::Debug for AudioProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioProcessor")
            .field("cached", &self.cached)
            .field("stats", &self.stats)
            .finish()
    }
}
