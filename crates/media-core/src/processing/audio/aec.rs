//! Acoustic echo cancellation.
//!
//! Time-domain NLMS adaptive filter operating on 10 ms mono sub-frames at
//! the filter rate. The playback path feeds the canceller its far-end
//! reference via [`EchoCanceller::buffer_farend`]; the capture path then
//! calls [`EchoCanceller::process`] with the raw and noise-suppressed
//! near-end sub-frames. Buffering the reference never alters played audio,
//! it only primes the canceller for the next send-direction frame.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{FILTER_SAMPLE_RATE, SUBFRAME_SAMPLES};

/// Scale factor between i16 PCM and the internal f32 domain.
const PCM_SCALE: f32 = 1.0 / 32_768.0;

/// Geigel double-talk threshold: near-end louder than half the recent
/// far-end peak is treated as double-talk.
const DOUBLE_TALK_RATIO: f32 = 0.5;

/// Residual suppression gain per echo mode (0 = mild .. 4 = aggressive).
const SUPPRESSION_GAIN: [f32; 5] = [1.0, 0.93, 0.85, 0.75, 0.6];

/// Echo canceller configuration
#[derive(Debug, Clone)]
pub struct EchoCancellerConfig {
    /// Residual suppression aggressiveness, 0..=4
    pub echo_mode: u8,
    /// Adaptive filter length in samples at the filter rate
    pub filter_taps: usize,
    /// NLMS step size (normalized)
    pub step_size: f32,
    /// Regularization added to the power normalization
    pub regularization: f32,
    /// Depth of the far-end reference queue in milliseconds
    pub max_farend_ms: usize,
}

impl Default for EchoCancellerConfig {
    fn default() -> Self {
        Self {
            echo_mode: 3,
            filter_taps: 320, // 20 ms echo tail at 16 kHz
            step_size: 0.3,
            regularization: 1e-4,
            max_farend_ms: 500,
        }
    }
}

/// NLMS acoustic echo canceller with far-end reference queue.
pub struct EchoCanceller {
    config: EchoCancellerConfig,
    /// Adaptive FIR coefficients
    weights: Vec<f32>,
    /// Far-end samples queued by the playback path, not yet consumed
    pending: VecDeque<i16>,
    /// Tail of already-consumed reference, convolution history
    ref_tail: Vec<f32>,
    /// Peak magnitude of recently consumed reference, double-talk detector
    ref_peak: f32,
    /// Residual suppression gain derived from the echo mode
    suppression: f32,
    /// Echo return loss enhancement of the last processed sub-frame, in dB
    last_erle_db: f32,
}

impl EchoCanceller {
    /// Create a new echo canceller
    pub fn new(config: EchoCancellerConfig) -> Result<Self> {
        if config.filter_taps == 0 {
            return Err(Error::InvalidParameter("filter_taps must be non-zero".into()));
        }
        if config.echo_mode > 4 {
            return Err(Error::InvalidParameter(format!(
                "echo mode {} out of range 0..=4",
                config.echo_mode
            )));
        }
        let taps = config.filter_taps;
        let suppression = SUPPRESSION_GAIN[config.echo_mode as usize];
        Ok(Self {
            config,
            weights: vec![0.0; taps],
            pending: VecDeque::new(),
            ref_tail: vec![0.0; taps],
            ref_peak: 0.0,
            suppression,
            last_erle_db: 0.0,
        })
    }

    /// Change the residual suppression aggressiveness (0..=4).
    pub fn set_echo_mode(&mut self, mode: u8) {
        let mode = mode.min(4);
        self.config.echo_mode = mode;
        self.suppression = SUPPRESSION_GAIN[mode as usize];
        debug!("echo canceller mode set to {}", mode);
    }

    /// Current echo mode
    pub fn echo_mode(&self) -> u8 {
        self.config.echo_mode
    }

    /// ERLE of the last processed sub-frame, in dB
    pub fn last_erle_db(&self) -> f32 {
        self.last_erle_db
    }

    /// Queue far-end (playback) samples at the filter rate.
    ///
    /// The queue is bounded by `max_farend_ms`; the oldest reference is
    /// discarded on overflow.
    pub fn buffer_farend(&mut self, samples: &[i16]) {
        self.pending.extend(samples.iter().copied());
        let cap = self.config.max_farend_ms * FILTER_SAMPLE_RATE as usize / 1000;
        while self.pending.len() > cap {
            self.pending.pop_front();
        }
    }

    /// Number of queued far-end samples
    pub fn farend_queued(&self) -> usize {
        self.pending.len()
    }

    /// Cancel echo from one 10 ms near-end sub-frame.
    ///
    /// `near_raw` is the unprocessed capture signal; `near_clean` is the
    /// noise-suppressed version of the same sub-frame. The raw signal drives
    /// the double-talk detector, the clean signal is what the echo estimate
    /// is subtracted from. `delay_ms` is the capture-to-playback latency
    /// hint; it is advisory and only bounds adaptation expectations.
    ///
    /// Without a queued reference the sub-frame passes through unchanged.
    pub fn process(
        &mut self,
        near_raw: &[i16],
        near_clean: &[i16],
        _delay_ms: u16,
    ) -> Result<Vec<i16>> {
        if near_raw.len() != SUBFRAME_SAMPLES || near_clean.len() != SUBFRAME_SAMPLES {
            return Err(Error::InvalidFormat(format!(
                "echo canceller expects {} samples per sub-frame, got {}/{}",
                SUBFRAME_SAMPLES,
                near_raw.len(),
                near_clean.len()
            )));
        }

        // No reference buffered: nothing to cancel.
        if self.pending.len() < SUBFRAME_SAMPLES {
            self.last_erle_db = 0.0;
            return Ok(near_clean.to_vec());
        }

        let taps = self.config.filter_taps;
        let block: Vec<f32> = self
            .pending
            .drain(..SUBFRAME_SAMPLES)
            .map(|s| s as f32 * PCM_SCALE)
            .collect();

        // Extended reference: previous tail followed by the current block.
        let mut ext = Vec::with_capacity(taps + SUBFRAME_SAMPLES);
        ext.extend_from_slice(&self.ref_tail);
        ext.extend_from_slice(&block);

        let block_peak = block.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        self.ref_peak = self.ref_peak.max(block_peak) * 0.9 + block_peak * 0.1;

        let raw_peak = near_raw
            .iter()
            .fold(0.0f32, |m, &s| m.max((s as f32 * PCM_SCALE).abs()));
        let double_talk = raw_peak > DOUBLE_TALK_RATIO * self.ref_peak.max(1e-6);

        let ref_power: f32 =
            block.iter().map(|&s| s * s).sum::<f32>() / SUBFRAME_SAMPLES as f32;
        let norm = ref_power * taps as f32 + self.config.regularization;

        let mut out = vec![0i16; SUBFRAME_SAMPLES];
        let mut raw_power = 0.0f32;
        let mut out_power = 0.0f32;

        for n in 0..SUBFRAME_SAMPLES {
            let base = taps + n;
            let mut estimate = 0.0f32;
            for k in 0..taps {
                estimate += self.weights[k] * ext[base - k];
            }

            let clean = near_clean[n] as f32 * PCM_SCALE;
            let raw = near_raw[n] as f32 * PCM_SCALE;
            let mut err = clean - estimate;

            if !double_talk {
                // NLMS coefficient update against the cancelled signal.
                let mu = self.config.step_size * err / norm;
                for k in 0..taps {
                    self.weights[k] += mu * ext[base - k];
                }
                if ref_power > 1e-8 {
                    err *= self.suppression;
                }
            }

            raw_power += raw * raw;
            out_power += err * err;
            out[n] = (err / PCM_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }

        self.last_erle_db = if out_power > 1e-12 && raw_power > 1e-12 {
            10.0 * (raw_power / out_power).log10()
        } else {
            0.0
        };

        // Keep the last `taps` reference samples for the next sub-frame.
        let keep = ext.len() - taps;
        self.ref_tail.copy_from_slice(&ext[keep..]);

        Ok(out)
    }

    /// Drop adaptation state and any queued reference.
    pub fn reset(&mut self) {
        self.weights.iter_mut().for_each(|w| *w = 0.0);
        self.ref_tail.iter_mut().for_each(|s| *s = 0.0);
        self.pending.clear();
        self.ref_peak = 0.0;
        self.last_erle_db = 0.0;
    }
}

impl std::fmt::Debug for EchoCanceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoCanceller")
            .field("config", &self.config)
            .field("farend_queued", &self.pending.len())
            .field("last_erle_db", &self.last_erle_db)
            .finish()
    }
}
