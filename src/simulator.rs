use crate::ring_buffer::SampleRing;
use crate::types::EngineMode;
use crossbeam_channel::{Receiver, TryRecvError};
use log::info;
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

/// Generates synthetic audio that exercises the full analysis pipeline
/// without any hardware.
///
/// In `Tones` mode it plays two steady tones (1000 and 2000 Hz). In
/// `Motion` mode it plays the probe tone plus a louder "reflection" whose
/// frequency drifts up, holds, drifts back down and holds again — the
/// dashboard should read TOWARDS / still / AWAY / still in a loop.
pub struct Simulator {
    ring: SampleRing,
    sample_rate: u32,
    /// Monotonic sample counter for phase-continuous generation. Uses
    /// sample count instead of wall-clock time to avoid phase
    /// discontinuities from OS scheduling jitter.
    sample_counter: u64,
}

/// Samples generated per chunk (~23ms at 44.1kHz).
const CHUNK_SIZE: usize = 1024;

/// Motion scenario timing (seconds) and depth (Hz).
const DRIFT_RAMP_SECS: f64 = 1.5;
const DRIFT_HOLD_SECS: f64 = 2.0;
const DRIFT_DEPTH_HZ: f64 = 90.0;

impl Simulator {
    pub fn new(ring: SampleRing, sample_rate: u32) -> Self {
        Self {
            ring,
            sample_rate,
            sample_counter: 0,
        }
    }

    /// Generate until `stop` fires or disconnects. Blocks the calling thread.
    pub fn run(&mut self, mode: EngineMode, probe_hz: f32, stop: Receiver<()>) {
        info!("Simulator running ({:?} scenario)", mode);
        let chunk_dur = Duration::from_secs_f64(CHUNK_SIZE as f64 / self.sample_rate as f64);
        let mut chunk = vec![0.0f32; CHUNK_SIZE];

        loop {
            match stop.try_recv() {
                Ok(_) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match mode {
                EngineMode::Tones => self.fill_tones(&mut chunk),
                EngineMode::Motion => self.fill_motion(&mut chunk, probe_hz as f64),
            }
            self.ring.write_frames(&chunk, 1);
            thread::sleep(chunk_dur);
        }

        info!("Simulator stopped.");
    }

    /// Two steady tones, both comfortably above the default threshold.
    fn fill_tones(&mut self, chunk: &mut [f32]) {
        let sr = self.sample_rate as f64;
        for slot in chunk.iter_mut() {
            let t = self.sample_counter as f64 / sr;
            *slot = (0.4 * (2.0 * PI * 1000.0 * t).sin()
                + 0.4 * (2.0 * PI * 2000.0 * t).sin()) as f32;
            self.sample_counter += 1;
        }
    }

    /// Probe tone plus a dominant drifting "reflection".
    fn fill_motion(&mut self, chunk: &mut [f32], probe_hz: f64) {
        let sr = self.sample_rate as f64;
        for slot in chunk.iter_mut() {
            let t = self.sample_counter as f64 / sr;
            let reflected_hz = probe_hz + drift_at(t);
            *slot = (0.2 * (2.0 * PI * probe_hz * t).sin()
                + 0.6 * (2.0 * PI * reflected_hz * t).sin()) as f32;
            self.sample_counter += 1;
        }
    }
}

/// Doppler offset at time `t`: ramp up, hold, ramp down, hold, repeat.
fn drift_at(t: f64) -> f64 {
    let period = 2.0 * (DRIFT_RAMP_SECS + DRIFT_HOLD_SECS);
    let phase = t % period;
    if phase < DRIFT_RAMP_SECS {
        DRIFT_DEPTH_HZ * phase / DRIFT_RAMP_SECS
    } else if phase < DRIFT_RAMP_SECS + DRIFT_HOLD_SECS {
        DRIFT_DEPTH_HZ
    } else if phase < 2.0 * DRIFT_RAMP_SECS + DRIFT_HOLD_SECS {
        let down = phase - (DRIFT_RAMP_SECS + DRIFT_HOLD_SECS);
        DRIFT_DEPTH_HZ * (1.0 - down / DRIFT_RAMP_SECS)
    } else {
        0.0
    }
}
