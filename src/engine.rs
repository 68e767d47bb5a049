use crate::motion_detector::MotionDetector;
use crate::ring_buffer::SampleRing;
use crate::spectrum::SpectrumAnalyzer;
use crate::tone_detector::DualToneDetector;
use crate::types::*;
use crossbeam_channel::{select, tick, Receiver, Sender};
use log::{debug, info, trace};
use std::time::Duration;

/// The analysis engine drives the periodic pipeline:
/// fetch window → transform → detect → publish.
///
/// It owns the sample window and spectrum buffers plus the detector for its
/// mode, and receives its collaborators (ring, analyzer, output channels)
/// already constructed — a misconfigured engine fails at `new`, never
/// mid-stream.
///
/// Scheduling is the caller's business: [`tick`](Self::tick) runs one
/// pipeline pass and can be driven by anything (a timer thread, a test
/// harness); [`run`](Self::run) is the stock loop over a fixed-rate ticker.
pub struct AnalysisEngine {
    ring: SampleRing,
    analyzer: SpectrumAnalyzer,
    detector: Detector,
    window: Vec<f32>,
    spectrum: Vec<f32>,
    tick_hz: u32,
    clock: SessionClock,
    frame_txs: Vec<Sender<AnalysisFrame>>,
    ticks: u64,
    underruns: u64,
}

enum Detector {
    Tones(DualToneDetector),
    Motion(MotionDetector),
}

impl AnalysisEngine {
    pub fn new(
        config: &EngineConfig,
        ring: SampleRing,
        analyzer: SpectrumAnalyzer,
        frame_txs: Vec<Sender<AnalysisFrame>>,
        clock: SessionClock,
    ) -> Result<Self, String> {
        config.validate()?;
        if analyzer.size() != config.buffer_size {
            return Err(format!(
                "analyzer size {} does not match configured buffer size {}",
                analyzer.size(),
                config.buffer_size
            ));
        }
        if ring.capacity() < config.buffer_size {
            return Err(format!(
                "ring capacity {} cannot hold one {}-sample window",
                ring.capacity(),
                config.buffer_size
            ));
        }

        let detector = match config.mode {
            EngineMode::Tones => {
                let mut det = DualToneDetector::new(
                    config.sample_rate,
                    config.buffer_size,
                    config.tone_threshold_db,
                    config.min_separation_hz,
                );
                if let Some(age) = config.cache_ticks {
                    det = det.with_cache(age);
                }
                Detector::Tones(det)
            }
            EngineMode::Motion => Detector::Motion(MotionDetector::new(
                config.sample_rate,
                config.buffer_size,
                config.history_len,
                config.motion_threshold_hz,
                config.motion_cooldown_ms,
            )),
        };

        Ok(Self {
            ring,
            analyzer,
            detector,
            window: vec![0.0f32; config.buffer_size],
            spectrum: vec![0.0f32; config.buffer_size / 2],
            tick_hz: config.tick_hz,
            clock,
            frame_txs,
            ticks: 0,
            underruns: 0,
        })
    }

    /// Run one pipeline pass. Returns `None` when the ring holds less than
    /// a full window — the tick is skipped and the previous window buffer
    /// is left intact.
    pub fn tick(&mut self, now_us: u64) -> Option<AnalysisFrame> {
        if !self.ring.fetch_latest(&mut self.window) {
            self.underruns += 1;
            trace!("tick skipped: ring underrun ({} total)", self.underruns);
            return None;
        }

        self.analyzer.magnitude_db(&self.window, &mut self.spectrum);

        let frame = match &mut self.detector {
            Detector::Tones(det) => AnalysisFrame {
                timestamp_us: now_us,
                tones: det.detect(&self.spectrum),
                motion: None,
            },
            Detector::Motion(det) => AnalysisFrame {
                timestamp_us: now_us,
                tones: None,
                motion: Some(det.observe(&self.spectrum, now_us)),
            },
        };

        self.ticks += 1;
        if self.ticks % 200 == 0 {
            debug!("engine: {} ticks, {} underruns", self.ticks, self.underruns);
            trace!("latest: {}", frame);
        }
        Some(frame)
    }

    /// Tick at the configured rate until `stop` fires (or disconnects), or
    /// until every frame consumer has hung up. Blocks the calling thread.
    pub fn run(&mut self, stop: Receiver<()>) {
        info!("Analysis engine running at {} Hz", self.tick_hz);
        let ticker = tick(Duration::from_secs_f64(1.0 / self.tick_hz as f64));

        loop {
            select! {
                recv(ticker) -> _ => {
                    let now = self.clock.now_us();
                    if let Some(frame) = self.tick(now) {
                        let mut delivered = false;
                        for tx in &self.frame_txs {
                            if tx.send(frame).is_ok() {
                                delivered = true;
                            }
                        }
                        if !self.frame_txs.is_empty() && !delivered {
                            info!("All frame consumers gone — engine stopping");
                            break;
                        }
                    }
                }
                recv(stop) -> _ => break,
            }
        }

        info!(
            "Analysis engine stopped after {} ticks ({} underruns)",
            self.ticks, self.underruns
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::test_helpers::{multi_sine, sine_wave};

    const SR: u32 = 44100;
    const N: usize = 1024;

    fn engine(mode: EngineMode, ring: SampleRing) -> AnalysisEngine {
        let config = EngineConfig {
            mode,
            ..Default::default()
        };
        AnalysisEngine::new(
            &config,
            ring,
            SpectrumAnalyzer::new(N).unwrap(),
            Vec::new(),
            SessionClock::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_construction_rejects_bad_config() {
        let config = EngineConfig {
            buffer_size: 1000,
            ..Default::default()
        };
        let result = AnalysisEngine::new(
            &config,
            SampleRing::new(4096),
            SpectrumAnalyzer::new(N).unwrap(),
            Vec::new(),
            SessionClock::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_construction_rejects_mismatched_analyzer() {
        let config = EngineConfig::default(); // buffer_size 1024
        let result = AnalysisEngine::new(
            &config,
            SampleRing::new(4096),
            SpectrumAnalyzer::new(2048).unwrap(),
            Vec::new(),
            SessionClock::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_construction_rejects_undersized_ring() {
        let config = EngineConfig::default();
        let result = AnalysisEngine::new(
            &config,
            SampleRing::new(512),
            SpectrumAnalyzer::new(N).unwrap(),
            Vec::new(),
            SessionClock::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_underrun_skips_tick() {
        let ring = SampleRing::new(N * 4);
        ring.write_frames(&vec![0.1f32; N - 1], 1);
        let mut eng = engine(EngineMode::Tones, ring);
        assert_eq!(eng.tick(0), None);
    }

    #[test]
    fn test_tick_detects_injected_tones() {
        let ring = SampleRing::new(N * 4);
        ring.write_frames(&multi_sine(&[1000.0, 2000.0], 0.5, SR, N), 1);

        let mut eng = engine(EngineMode::Tones, ring);
        let frame = eng.tick(42).expect("window available");
        assert_eq!(frame.timestamp_us, 42);
        assert!(frame.motion.is_none());

        let pair = frame.tones.expect("two tones present");
        let hz_per_bin = SR as f32 / N as f32;
        let mut freqs = [pair.freq1_hz, pair.freq2_hz];
        freqs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(
            (freqs[0] - 1000.0).abs() <= hz_per_bin,
            "{:.1} Hz should be within one bin of 1000",
            freqs[0]
        );
        assert!(
            (freqs[1] - 2000.0).abs() <= hz_per_bin,
            "{:.1} Hz should be within one bin of 2000",
            freqs[1]
        );
    }

    #[test]
    fn test_motion_mode_reports_insufficient_then_still() {
        let ring = SampleRing::new(N * 4);
        let mut eng = engine(EngineMode::Motion, ring.clone());

        for i in 0..4 {
            ring.write_frames(&sine_wave(5000.0, 0.6, SR, N), 1);
            let frame = eng.tick(i).unwrap();
            assert_eq!(frame.motion, Some(MotionState::Insufficient));
            assert!(frame.tones.is_none());
        }
        ring.write_frames(&sine_wave(5000.0, 0.6, SR, N), 1);
        assert_eq!(eng.tick(4).unwrap().motion, Some(MotionState::Still));
    }
}
