use crate::types::MotionState;
use log::trace;
use std::collections::VecDeque;

/// Classifies motion towards or away from the microphone from the Doppler
/// shift of a reflected probe tone.
///
/// # How it works
///
/// Each tick, the dominant bin of the spectrum (lowest index on ties) is
/// converted to Hz and appended to a bounded FIFO history. Once the history
/// is full, the change between its oldest and newest entries is compared to
/// `threshold_hz`:
///
///   - rising beyond the threshold → reflector approaching (`Towards`)
///   - falling beyond it → receding (`Away`)
///   - otherwise → `Still`
///
/// Until the history fills, the state is `Insufficient` — callers can tell
/// warm-up from genuine stillness.
///
/// # Limitations
///
/// The detector tracks whatever bin dominates the spectrum. It assumes the
/// probe tone (and its reflections) dominate; a louder environmental tone
/// will be tracked just the same.
pub struct MotionDetector {
    sample_rate: f32,
    fft_size: usize,
    history: VecDeque<f32>,
    history_len: usize,
    threshold_hz: f32,
    /// Minimum µs between classifications. Between evaluations the previous
    /// state is reported. 0 = classify every tick.
    cooldown_us: u64,
    last_classify_us: Option<u64>,
    state: MotionState,
}

impl MotionDetector {
    pub fn new(
        sample_rate: u32,
        fft_size: usize,
        history_len: usize,
        threshold_hz: f32,
        cooldown_ms: u64,
    ) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            fft_size,
            history: VecDeque::with_capacity(history_len + 1),
            history_len,
            threshold_hz,
            cooldown_us: cooldown_ms * 1000,
            last_classify_us: None,
            state: MotionState::Insufficient,
        }
    }

    /// Observe one spectrum. Called once per tick with the tick timestamp.
    pub fn observe(&mut self, spectrum: &[f32], now_us: u64) -> MotionState {
        // Dominant bin; first occurrence wins ties.
        let mut peak_bin = 0usize;
        let mut peak_mag = f32::NEG_INFINITY;
        for (bin, &mag) in spectrum.iter().enumerate() {
            if mag > peak_mag {
                peak_mag = mag;
                peak_bin = bin;
            }
        }
        let peak_hz = peak_bin as f32 * self.sample_rate / self.fft_size as f32;

        self.history.push_back(peak_hz);
        if self.history.len() > self.history_len {
            self.history.pop_front();
        }

        if self.history.len() < self.history_len {
            self.state = MotionState::Insufficient;
            return self.state;
        }

        // Rate-limit classification with a plain timestamp comparison;
        // the history itself keeps advancing every tick.
        if let Some(last) = self.last_classify_us {
            if now_us.saturating_sub(last) < self.cooldown_us {
                return self.state;
            }
        }
        self.last_classify_us = Some(now_us);

        let (Some(&first), Some(&last)) = (self.history.front(), self.history.back()) else {
            return self.state;
        };
        let delta = last - first;

        self.state = if delta > self.threshold_hz {
            MotionState::Towards
        } else if delta < -self.threshold_hz {
            MotionState::Away
        } else {
            MotionState::Still
        };

        trace!(
            "motion: peak={:.1} Hz delta={:+.1} Hz -> {}",
            peak_hz,
            delta,
            self.state
        );
        self.state
    }

    /// Current peak history length (for diagnostics).
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Reset all state (e.g., on session restart).
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_classify_us = None;
        self.state = MotionState::Insufficient;
    }
}
