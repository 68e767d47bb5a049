use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Analysis modes ─────────────────────────────────────────────────────────

/// What the engine listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineMode {
    /// Extract the two strongest, sufficiently separated tones per tick.
    Tones,
    /// Track the dominant peak over time and classify Doppler motion.
    Motion,
}

// ─── Detection results ──────────────────────────────────────────────────────

/// One spectral peak candidate: bin index, its dB magnitude, and the
/// frequency the bin maps to (`bin * sample_rate / fft_size`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TonePeak {
    pub bin: usize,
    pub magnitude_db: f32,
    pub frequency_hz: f32,
}

/// The two dominant tones of one spectrum, strongest first.
/// Present only when both peaks cleared the threshold and separation policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TonePair {
    pub freq1_hz: f32,
    pub freq2_hz: f32,
}

/// Doppler motion classification.
///
/// `Insufficient` means the peak history has not filled yet — it is a
/// distinct value so consumers can tell "no data yet" from a real
/// "nothing is moving" reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionState {
    Insufficient,
    Still,
    Towards,
    Away,
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MotionState::Insufficient => "---",
            MotionState::Still => "still",
            MotionState::Towards => "TOWARDS",
            MotionState::Away => "AWAY",
        };
        write!(f, "{}", s)
    }
}

/// Per-tick analysis snapshot published by the engine.
/// Exactly one of `tones`/`motion` is populated, depending on the mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFrame {
    /// Microseconds since session start
    pub timestamp_us: u64,
    pub tones: Option<TonePair>,
    pub motion: Option<MotionState>,
}

impl fmt::Display for AnalysisFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={:>10}µs", self.timestamp_us)?;
        match self.tones {
            Some(p) => write!(f, "  tones=({:.1}, {:.1}) Hz", p.freq1_hz, p.freq2_hz)?,
            None => {}
        }
        match self.motion {
            Some(m) => write!(f, "  motion={}", m)?,
            None => {}
        }
        Ok(())
    }
}

// ─── Engine configuration ───────────────────────────────────────────────────

/// Everything the analysis pipeline needs to know, validated up front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mode: EngineMode,
    /// Analysis window size in samples. Must be a power of two.
    pub buffer_size: usize,
    /// Capture/playback sample rate (Hz)
    pub sample_rate: u32,
    /// Analysis ticks per second
    pub tick_hz: u32,
    /// Minimum dB magnitude for a bin to count as a tone
    pub tone_threshold_db: f32,
    /// Minimum frequency separation between the two reported tones (Hz)
    pub min_separation_hz: f32,
    /// Reuse the last detected pair for up to this many missed ticks.
    /// None disables the cache entirely.
    pub cache_ticks: Option<u32>,
    /// Doppler peak history length (ticks)
    pub history_len: usize,
    /// Frequency change across the history that counts as motion (Hz)
    pub motion_threshold_hz: f32,
    /// Minimum interval between motion classifications (ms). 0 = every tick.
    pub motion_cooldown_ms: u64,
    /// Probe/playback sine frequency (Hz)
    pub probe_frequency_hz: f32,
    /// Probe amplitude, 0.0–1.0
    pub probe_amplitude: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Tones,
            buffer_size: 1024,
            sample_rate: 44100,
            tick_hz: 20,
            tone_threshold_db: 20.0,
            min_separation_hz: 50.0,
            cache_ticks: None,
            history_len: 5,
            motion_threshold_hz: 10.0,
            motion_cooldown_ms: 0,
            probe_frequency_hz: 17000.0,
            probe_amplitude: 0.8,
        }
    }
}

impl EngineConfig {
    /// Reject misconfigurations before any audio flows. Per-tick conditions
    /// (underrun, no detection) are absorbed at runtime; these are not.
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_size < 2 || !self.buffer_size.is_power_of_two() {
            return Err(format!(
                "buffer size must be a power of two >= 2, got {}",
                self.buffer_size
            ));
        }
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.tick_hz == 0 {
            return Err("tick rate must be positive".into());
        }
        if self.history_len < 2 {
            return Err(format!(
                "motion history must hold at least 2 entries, got {}",
                self.history_len
            ));
        }
        if !(0.0..=1.0).contains(&self.probe_amplitude) {
            return Err(format!(
                "probe amplitude must be within 0.0–1.0, got {}",
                self.probe_amplitude
            ));
        }
        Ok(())
    }

    /// Width of one FFT bin in Hz.
    pub fn hz_per_bin(&self) -> f32 {
        self.sample_rate as f32 / self.buffer_size as f32
    }
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for the capture session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
