//! Fixed-ratio sample-rate conversion between the native and filter rates.
//!
//! The engine only ever converts between 48 kHz and 16 kHz, so the resampler
//! is specialized for an integer factor of [`RATE_FACTOR`] in either
//! direction. Two persistent instances (one per direction) live inside the
//! capture filter chain; the interface itself is stateless apart from the
//! one-sample interpolation carry.

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::RATE_FACTOR;

/// Fixed-ratio linear resampler.
///
/// Decimates by averaging each group of [`RATE_FACTOR`] input samples, and
/// interpolates linearly when upsampling. The sample-count contract is
/// exact: `n` input samples produce `n / RATE_FACTOR` output samples when
/// downsampling and `n * RATE_FACTOR` when upsampling.
#[derive(Debug)]
pub struct Resampler {
    /// Source sample rate in Hz
    source_rate: u32,
    /// Target sample rate in Hz
    target_rate: u32,
    /// Last input sample of the previous call, interpolation carry
    carry: i16,
}

impl Resampler {
    /// Create a resampler for the given rate pair.
    ///
    /// Only the fixed native/filter ratio is supported; any other pair is
    /// rejected with [`Error::InvalidParameter`].
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        let factor = RATE_FACTOR as u32;
        let supported = source_rate == target_rate * factor || target_rate == source_rate * factor;
        if !supported {
            return Err(Error::InvalidParameter(format!(
                "unsupported resampling ratio {}Hz -> {}Hz",
                source_rate, target_rate
            )));
        }
        debug!("resampler {}Hz -> {}Hz", source_rate, target_rate);
        Ok(Self {
            source_rate,
            target_rate,
            carry: 0,
        })
    }

    /// Source sample rate in Hz
    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// Target sample rate in Hz
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Number of output samples produced for `input_len` input samples
    pub fn output_len(&self, input_len: usize) -> usize {
        if self.source_rate > self.target_rate {
            input_len / RATE_FACTOR
        } else {
            input_len * RATE_FACTOR
        }
    }

    /// Resample one block of mono PCM.
    ///
    /// When downsampling, the input length must be a multiple of
    /// [`RATE_FACTOR`].
    pub fn process(&mut self, input: &[i16]) -> Result<Vec<i16>> {
        if input.is_empty() {
            return Err(Error::InvalidFormat("empty input block".into()));
        }
        if self.source_rate > self.target_rate {
            self.decimate(input)
        } else {
            self.interpolate(input)
        }
    }

    /// Reset the interpolation carry.
    pub fn reset(&mut self) {
        self.carry = 0;
    }

    fn decimate(&mut self, input: &[i16]) -> Result<Vec<i16>> {
        if input.len() % RATE_FACTOR != 0 {
            return Err(Error::InvalidFormat(format!(
                "downsample input length {} is not a multiple of {}",
                input.len(),
                RATE_FACTOR
            )));
        }
        let out = input
            .chunks_exact(RATE_FACTOR)
            .map(|group| {
                let sum: i32 = group.iter().map(|&s| s as i32).sum();
                (sum / RATE_FACTOR as i32) as i16
            })
            .collect();
        if let Some(&last) = input.last() {
            self.carry = last;
        }
        Ok(out)
    }

    fn interpolate(&mut self, input: &[i16]) -> Result<Vec<i16>> {
        let mut out = Vec::with_capacity(input.len() * RATE_FACTOR);
        let mut prev = self.carry as i32;
        for &sample in input {
            let cur = sample as i32;
            for step in 1..=RATE_FACTOR as i32 {
                out.push((prev + (cur - prev) * step / RATE_FACTOR as i32) as i16);
            }
            prev = cur;
        }
        self.carry = prev as i16;
        Ok(out)
    }
}
