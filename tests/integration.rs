//! End-to-end integration tests for the tone-capture pipeline.
//!
//! These tests exercise the full data flow:
//!   sample ring → spectral transform → detector → AnalysisFrame
//!
//! Synthetic audio is written straight into the ring (standing in for the
//! capture callback), and the engine is ticked either directly or through
//! its timer-driven run loop.

use crossbeam_channel::bounded;
use std::thread;
use std::time::Duration;

use tone_capture::engine::AnalysisEngine;
use tone_capture::ring_buffer::SampleRing;
use tone_capture::spectrum::SpectrumAnalyzer;
use tone_capture::types::*;

const SR: u32 = 44100;
const N: usize = 1024;
const HZ_PER_BIN: f32 = SR as f32 / N as f32;

// ─── Helpers ───────────────────────────────────────────────────────────────

/// Generate a mix of sine waves at equal amplitude per voice.
fn multi_sine(freqs: &[f64], amp_per_voice: f64, n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let t = i as f64 / SR as f64;
            freqs
                .iter()
                .map(|&f| amp_per_voice * (2.0 * std::f64::consts::PI * f * t).sin())
                .sum::<f64>() as f32
        })
        .collect()
}

fn tones_config() -> EngineConfig {
    EngineConfig {
        mode: EngineMode::Tones,
        ..Default::default()
    }
}

fn motion_config() -> EngineConfig {
    EngineConfig {
        mode: EngineMode::Motion,
        ..Default::default()
    }
}

fn build_engine(
    config: &EngineConfig,
    ring: SampleRing,
    frame_txs: Vec<crossbeam_channel::Sender<AnalysisFrame>>,
) -> AnalysisEngine {
    AnalysisEngine::new(
        config,
        ring,
        SpectrumAnalyzer::new(config.buffer_size).unwrap(),
        frame_txs,
        SessionClock::new(),
    )
    .unwrap()
}

// ─── Integration Tests ─────────────────────────────────────────────────────

#[test]
fn test_two_tone_scenario_end_to_end() {
    // 1000 Hz + 2000 Hz at equal amplitude, no noise: both tones must be
    // recovered within one bin width.
    let ring = SampleRing::new(N * 4);
    ring.write_frames(&multi_sine(&[1000.0, 2000.0], 0.5, N * 2), 1);

    let mut engine = build_engine(&tones_config(), ring, Vec::new());
    let frame = engine.tick(0).expect("full window buffered");
    let pair = frame.tones.expect("two tones detected");

    let mut freqs = [pair.freq1_hz, pair.freq2_hz];
    freqs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert!(
        (freqs[0] - 1000.0).abs() <= HZ_PER_BIN,
        "low tone {:.1} Hz should be within one bin of 1000",
        freqs[0]
    );
    assert!(
        (freqs[1] - 2000.0).abs() <= HZ_PER_BIN,
        "high tone {:.1} Hz should be within one bin of 2000",
        freqs[1]
    );
}

#[test]
fn test_single_tone_yields_no_pair_end_to_end() {
    // One strong tone, threshold set so only its center bin qualifies:
    // a lone peak with no valid partner reports nothing.
    let tone = 35.0 * SR as f64 / N as f64; // ≈ 1507 Hz, exactly bin 35
    let ring = SampleRing::new(N * 4);
    ring.write_frames(&multi_sine(&[tone], 0.7, N), 1);

    // Center bin lands at ~45 dB on this scale, the ±1-bin shoulders at
    // ~39 dB; a 42 dB threshold admits exactly the center bin.
    let config = EngineConfig {
        tone_threshold_db: 42.0,
        ..tones_config()
    };
    let mut engine = build_engine(&config, ring, Vec::new());
    let frame = engine.tick(0).expect("full window buffered");
    assert_eq!(frame.tones, None);
}

#[test]
fn test_silence_yields_no_pair() {
    let ring = SampleRing::new(N * 4);
    ring.write_frames(&vec![0.0f32; N], 1);

    let mut engine = build_engine(&tones_config(), ring, Vec::new());
    assert_eq!(engine.tick(0).unwrap().tones, None);
}

#[test]
fn test_underrun_skips_tick_then_recovers() {
    let ring = SampleRing::new(N * 4);
    ring.write_frames(&multi_sine(&[1000.0, 2000.0], 0.5, N - 1), 1);

    let mut engine = build_engine(&tones_config(), ring.clone(), Vec::new());
    assert_eq!(engine.tick(0), None, "partial window must skip the tick");

    // One more sample completes the window; the next tick succeeds.
    ring.write_frames(&[0.0], 1);
    assert!(engine.tick(1).is_some());
}

#[test]
fn test_doppler_approach_and_recede_end_to_end() {
    // A dominant tone stepping up 2 bins per tick (~86 Hz) simulates a
    // reflector approaching; stepping down simulates receding.
    let config = motion_config();
    let ring = SampleRing::new(N * 4);
    let mut engine = build_engine(&config, ring.clone(), Vec::new());

    let mut now_us = 0u64;
    let mut tick = |engine: &mut AnalysisEngine, ring: &SampleRing, freq: f64| {
        ring.write_frames(&multi_sine(&[freq], 0.6, N), 1);
        now_us += 50_000;
        engine.tick(now_us).unwrap().motion.unwrap()
    };

    // Warm-up: first K-1 observations are explicitly "insufficient".
    let base = 5000.0;
    let mut state = MotionState::Still;
    for i in 0..config.history_len {
        state = tick(&mut engine, &ring, base + i as f64 * 2.0 * HZ_PER_BIN as f64);
        if i < config.history_len - 1 {
            assert_eq!(state, MotionState::Insufficient, "tick {}", i);
        }
    }
    assert_eq!(state, MotionState::Towards, "rising peak = approaching");

    // Drift back down across a full history length.
    for i in (0..config.history_len).rev() {
        state = tick(&mut engine, &ring, base + i as f64 * 2.0 * HZ_PER_BIN as f64);
    }
    assert_eq!(state, MotionState::Away, "falling peak = receding");

    // Hold steady: trend settles to Still.
    for _ in 0..config.history_len {
        state = tick(&mut engine, &ring, base);
    }
    assert_eq!(state, MotionState::Still);
}

#[test]
fn test_run_loop_publishes_frames_and_stops() {
    let config = EngineConfig {
        mode: EngineMode::Tones,
        tick_hz: 100,
        ..Default::default()
    };
    let ring = SampleRing::new(N * 4);
    ring.write_frames(&multi_sine(&[1000.0, 2000.0], 0.5, N), 1);

    let (frame_tx, frame_rx) = bounded::<AnalysisFrame>(64);
    let (stop_tx, stop_rx) = bounded::<()>(1);

    let mut engine = build_engine(&config, ring, vec![frame_tx]);
    let handle = thread::Builder::new()
        .name("test-engine".into())
        .spawn(move || engine.run(stop_rx))
        .unwrap();

    let frame = frame_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("run loop should publish frames");
    assert!(frame.tones.is_some());

    stop_tx.send(()).unwrap();
    handle.join().unwrap();
}

#[test]
fn test_run_loop_stops_when_consumers_hang_up() {
    let config = EngineConfig {
        mode: EngineMode::Tones,
        tick_hz: 100,
        ..Default::default()
    };
    let ring = SampleRing::new(N * 4);
    ring.write_frames(&multi_sine(&[1000.0, 2000.0], 0.5, N), 1);

    let (frame_tx, frame_rx) = bounded::<AnalysisFrame>(4);
    // Never read and drop immediately: the engine must notice and exit
    // rather than spin forever.
    drop(frame_rx);

    let (_stop_tx, stop_rx) = bounded::<()>(1);
    let mut engine = build_engine(&config, ring, vec![frame_tx]);
    let handle = thread::Builder::new()
        .name("test-engine".into())
        .spawn(move || engine.run(stop_rx))
        .unwrap();

    handle.join().expect("engine should stop on its own");
}

#[test]
fn test_frame_json_roundtrip() {
    // Frames cross into the presentation layer as JSON lines.
    let frame = AnalysisFrame {
        timestamp_us: 1_234_567,
        tones: Some(TonePair {
            freq1_hz: 2000.4,
            freq2_hz: 1000.2,
        }),
        motion: None,
    };
    let json = serde_json::to_string(&frame).unwrap();
    assert!(json.contains("\"timestamp_us\":1234567"));
    assert!(json.contains("\"freq1_hz\":2000.4"));

    let decoded: AnalysisFrame = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, frame);

    let motion_frame = AnalysisFrame {
        timestamp_us: 42,
        tones: None,
        motion: Some(MotionState::Towards),
    };
    let json = serde_json::to_string(&motion_frame).unwrap();
    assert!(json.contains("\"Towards\""));
    let decoded: AnalysisFrame = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, motion_frame);
}

#[test]
fn test_large_window_configuration() {
    // A 16384-sample window shrinks the bin width to ~2.7 Hz, so two
    // tones 50 Hz apart resolve cleanly.
    let config = EngineConfig {
        mode: EngineMode::Tones,
        buffer_size: 16384,
        ..Default::default()
    };
    let hz_per_bin = config.hz_per_bin();
    let ring = SampleRing::new(config.buffer_size * 4);
    ring.write_frames(&multi_sine(&[1000.0, 1050.0], 0.5, config.buffer_size), 1);

    let mut engine = build_engine(&config, ring, Vec::new());
    let pair = engine.tick(0).unwrap().tones.expect("50 Hz apart resolves");

    let mut freqs = [pair.freq1_hz, pair.freq2_hz];
    freqs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert!((freqs[0] - 1000.0).abs() <= hz_per_bin * 2.0);
    assert!((freqs[1] - 1050.0).abs() <= hz_per_bin * 2.0);
}
