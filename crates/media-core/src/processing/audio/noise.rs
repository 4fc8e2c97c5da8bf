//! Spectral noise suppression.
//!
//! Short-time spectral subtraction over 20 ms hann-windowed analysis frames
//! with 50% overlap-add, consuming and producing the engine's 10 ms
//! sub-frames at the filter rate. A per-bin noise floor is tracked with an
//! asymmetric estimator (fast decay, slow rise) and subtracted with a
//! mode-dependent oversubtraction factor and gain floor.

use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::SUBFRAME_SAMPLES;

/// Scale factor between i16 PCM and the internal f32 domain.
const PCM_SCALE: f32 = 1.0 / 32_768.0;

/// Analysis window length: two sub-frames, 50% overlap.
const WINDOW_SAMPLES: usize = SUBFRAME_SAMPLES * 2;

/// Oversubtraction factor and gain floor per suppression mode
/// (0 = mild .. 3 = aggressive).
const MODE_PARAMS: [(f32, f32); 4] = [(1.0, 0.35), (1.5, 0.25), (2.0, 0.15), (3.0, 0.08)];

/// Initial per-bin noise floor in the normalized magnitude domain.
const NOISE_FLOOR_INIT: f32 = 1e-4;

/// Spectral-subtraction noise suppressor.
pub struct NoiseSuppressor {
    mode: u8,
    oversubtraction: f32,
    gain_floor: f32,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Smoothed per-bin noise magnitude estimate
    noise_floor: Vec<f32>,
    /// Previous input sub-frame, first half of the analysis window
    prev_input: Vec<f32>,
    /// Synthesis overlap carried into the next output sub-frame
    overlap: Vec<f32>,
}

impl NoiseSuppressor {
    /// Create a suppressor with the given mode (0 = mild .. 3 = aggressive).
    pub fn new(mode: u8) -> Result<Self> {
        if mode > 3 {
            return Err(Error::InvalidParameter(format!(
                "noise suppression mode {} out of range 0..=3",
                mode
            )));
        }
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(WINDOW_SAMPLES);
        let inverse = planner.plan_fft_inverse(WINDOW_SAMPLES);
        let window: Vec<f32> = apodize::hanning_iter(WINDOW_SAMPLES)
            .map(|w| w as f32)
            .collect();
        let (oversubtraction, gain_floor) = MODE_PARAMS[mode as usize];
        Ok(Self {
            mode,
            oversubtraction,
            gain_floor,
            forward,
            inverse,
            window,
            noise_floor: vec![NOISE_FLOOR_INIT; WINDOW_SAMPLES],
            prev_input: vec![0.0; SUBFRAME_SAMPLES],
            overlap: vec![0.0; SUBFRAME_SAMPLES],
        })
    }

    /// Change the suppression mode.
    pub fn set_mode(&mut self, mode: u8) {
        let mode = mode.min(3);
        self.mode = mode;
        let (oversubtraction, gain_floor) = MODE_PARAMS[mode as usize];
        self.oversubtraction = oversubtraction;
        self.gain_floor = gain_floor;
        debug!("noise suppression mode set to {}", mode);
    }

    /// Current suppression mode
    pub fn mode(&self) -> u8 {
        self.mode
    }

    /// Suppress noise in one 10 ms sub-frame.
    ///
    /// Output lags the input by one sub-frame because of the overlap-add
    /// analysis window.
    pub fn process(&mut self, frame: &[i16]) -> Result<Vec<i16>> {
        if frame.len() != SUBFRAME_SAMPLES {
            return Err(Error::InvalidFormat(format!(
                "noise suppressor expects {} samples per sub-frame, got {}",
                SUBFRAME_SAMPLES,
                frame.len()
            )));
        }

        let current: Vec<f32> = frame.iter().map(|&s| s as f32 * PCM_SCALE).collect();

        // Windowed analysis frame: previous sub-frame followed by this one.
        let mut spectrum: Vec<Complex<f32>> = self
            .prev_input
            .iter()
            .chain(current.iter())
            .zip(self.window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        self.forward.process(&mut spectrum);

        for (bin, value) in spectrum.iter_mut().enumerate() {
            let mag = value.norm();
            let floor = &mut self.noise_floor[bin];
            if mag < *floor {
                *floor = 0.5 * *floor + 0.5 * mag;
            } else {
                *floor = (*floor * 1.05).min(mag);
            }

            let gain = if mag > 1e-9 {
                (1.0 - self.oversubtraction * *floor / mag).max(self.gain_floor)
            } else {
                self.gain_floor
            };
            *value *= gain;
        }

        self.inverse.process(&mut spectrum);
        let scale = 1.0 / WINDOW_SAMPLES as f32;

        // Overlap-add: the hann window sums to one at 50% overlap.
        let mut out = vec![0i16; SUBFRAME_SAMPLES];
        for n in 0..SUBFRAME_SAMPLES {
            let sample = self.overlap[n] + spectrum[n].re * scale;
            out[n] = (sample / PCM_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            self.overlap[n] = spectrum[SUBFRAME_SAMPLES + n].re * scale;
        }

        self.prev_input.copy_from_slice(&current);
        Ok(out)
    }

    /// Drop the noise estimate and overlap state.
    pub fn reset(&mut self) {
        self.noise_floor.iter_mut().for_each(|b| *b = NOISE_FLOOR_INIT);
        self.prev_input.iter_mut().for_each(|s| *s = 0.0);
        self.overlap.iter_mut().for_each(|s| *s = 0.0);
    }
}

impl std::fmt::Debug for NoiseSuppressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseSuppressor")
            .field("mode", &self.mode)
            .field("window_samples", &WINDOW_SAMPLES)
            .finish()
    }
}
