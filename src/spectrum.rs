//! Forward magnitude transform: fixed-size time window → half-length dB spectrum.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Floor added before the log so silence maps to a deep but finite dB value.
const DB_EPSILON: f32 = 1e-12;

/// Wraps a forward FFT of a fixed power-of-two size. Applies a Hann window
/// to reduce spectral leakage and reports per-bin magnitude in dB.
///
/// The dB scale is uncalibrated but stable across calls, so fixed detection
/// thresholds stay meaningful for the lifetime of the analyzer.
///
/// All buffers are allocated at construction; `magnitude_db` allocates
/// nothing.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    /// `size` must be a power of two — anything else is a configuration
    /// error, not something to paper over at runtime.
    pub fn new(size: usize) -> Result<Self, String> {
        if size < 2 || !size.is_power_of_two() {
            return Err(format!(
                "transform size must be a power of two >= 2, got {}",
                size
            ));
        }
        let window: Vec<f32> = (0..size)
            .map(|i| {
                0.5 * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32 / (size as f32 - 1.0)).cos())
            })
            .collect();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch_len = fft.get_inplace_scratch_len();
        Ok(Self {
            fft,
            size,
            window,
            buffer: vec![Complex::new(0.0, 0.0); size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of output bins (half the transform size; bin `i` maps to
    /// `i * sample_rate / size` Hz).
    pub fn bins(&self) -> usize {
        self.size / 2
    }

    /// Transform `window` (length `size`) into dB magnitudes in
    /// `out` (length `size / 2`).
    pub fn magnitude_db(&mut self, window: &[f32], out: &mut [f32]) {
        debug_assert_eq!(window.len(), self.size);
        debug_assert_eq!(out.len(), self.size / 2);

        for (i, (slot, &sample)) in self.buffer.iter_mut().zip(window).enumerate() {
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (slot, c) in out.iter_mut().zip(&self.buffer) {
            *slot = 20.0 * (c.norm() + DB_EPSILON).log10();
        }
    }
}
