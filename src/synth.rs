use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Sine-wave generator for the playback probe tone.
///
/// Phase lives in `[0, 1)` wrapped turns: each sample emits
/// `amplitude * sin(2π·phase)` and then advances the phase by
/// `frequency / sample_rate`, subtracting 1.0 once it exceeds 1.0. The
/// subtract-wrap (rather than a modulo) keeps the accumulator's long-run
/// drift behavior exactly as shipped.
///
/// Frequency is shared through an atomic cell so a control thread can
/// retune while the audio callback owns the generator; a change takes
/// effect on the very next sample, with no smoothing or ramp.
pub struct SineSynth {
    phase: f32,
    amplitude: f32,
    sample_rate: f32,
    frequency_bits: Arc<AtomicU32>,
}

/// Cheap cloneable handle for retuning a [`SineSynth`] from another thread.
#[derive(Clone)]
pub struct SineControl {
    bits: Arc<AtomicU32>,
}

impl SineControl {
    pub fn set_frequency(&self, hz: f32) {
        self.bits.store(hz.to_bits(), Ordering::Relaxed);
    }

    pub fn frequency(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl SineSynth {
    pub fn new(frequency_hz: f32, amplitude: f32, sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            amplitude,
            sample_rate,
            frequency_bits: Arc::new(AtomicU32::new(frequency_hz.to_bits())),
        }
    }

    /// Handle for retuning from outside the audio callback.
    pub fn control(&self) -> SineControl {
        SineControl {
            bits: Arc::clone(&self.frequency_bits),
        }
    }

    /// Align the generator with the rate the output device actually opened
    /// at. Call before the first sample; retuning mid-stream shifts pitch.
    pub fn set_sample_rate(&mut self, hz: f32) {
        self.sample_rate = hz;
    }

    /// Produce one sample and advance the phase.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let frequency = f32::from_bits(self.frequency_bits.load(Ordering::Relaxed));
        let sample = self.amplitude * (2.0 * std::f32::consts::PI * self.phase).sin();
        self.phase += frequency / self.sample_rate;
        if self.phase > 1.0 {
            self.phase -= 1.0;
        }
        sample
    }

    /// Fill an interleaved output buffer, duplicating each frame's sample
    /// across all channels (no per-channel phase offset).
    pub fn fill(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let sample = self.next_sample();
            for slot in frame.iter_mut() {
                *slot = sample;
            }
        }
    }
}
