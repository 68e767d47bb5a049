#[cfg(feature = "audio")]
use tone_capture::audio_io::AudioDuplex;
use tone_capture::console_display::ConsoleDisplay;
use tone_capture::engine::AnalysisEngine;
use tone_capture::ring_buffer::SampleRing;
use tone_capture::simulator::Simulator;
use tone_capture::spectrum::SpectrumAnalyzer;
#[cfg(feature = "audio")]
use tone_capture::synth::SineSynth;
use tone_capture::types::*;
use tone_capture::wav_player::WavPlayer;

use clap::Parser;
use crossbeam_channel::bounded;
use log::{error, info};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Ring capacity in analysis windows — absorbs irregular callback chunk
/// sizes between ticks.
const RING_WINDOWS: usize = 4;

#[derive(Parser)]
#[command(name = "tone-capture")]
#[command(about = "Real-time dual-tone and Doppler motion detection from a microphone")]
struct Cli {
    /// Analysis mode: "tones" (two strongest separated tones) or
    /// "motion" (Doppler trend over the probe tone)
    #[arg(long, default_value = "tones")]
    mode: String,

    /// Analysis window size in samples (power of two)
    #[arg(long, default_value_t = 1024)]
    buffer_size: usize,

    /// Capture/playback sample rate (Hz)
    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    /// Analysis ticks per second
    #[arg(long, default_value_t = 20)]
    fps: u32,

    /// Probe/playback sine frequency (Hz)
    #[arg(long, default_value_t = 17000.0)]
    probe_freq: f32,

    /// Probe amplitude, 0.0-1.0
    #[arg(long, default_value_t = 0.8)]
    amplitude: f32,

    /// Tone magnitude threshold (dB)
    #[arg(long, default_value_t = 20.0)]
    threshold_db: f32,

    /// Minimum tone separation (Hz)
    #[arg(long, default_value_t = 50.0)]
    min_separation: f32,

    /// Reuse the last detected tone pair for up to this many missed ticks
    /// (0 = no caching)
    #[arg(long, default_value_t = 0)]
    cache_ticks: u32,

    /// Doppler peak history length (ticks)
    #[arg(long, default_value_t = 5)]
    history: usize,

    /// Doppler frequency-change threshold (Hz)
    #[arg(long, default_value_t = 10.0)]
    motion_threshold: f32,

    /// Minimum interval between motion classifications (ms, 0 = every tick)
    #[arg(long, default_value_t = 0)]
    motion_cooldown_ms: u64,

    /// Run against synthetic audio instead of the microphone
    #[arg(long)]
    simulate: bool,

    /// Stream a WAV file into the pipeline instead of the microphone
    #[arg(long)]
    audio_file: Option<PathBuf>,

    /// Live console dashboard (default unless --json is given)
    #[arg(long)]
    console: bool,

    /// Console refresh rate (Hz)
    #[arg(long, default_value_t = 10)]
    display_hz: u32,

    /// Print each analysis frame as a JSON line to stdout
    #[arg(long)]
    json: bool,

    /// Stop after this many seconds (0 = run until Ctrl+C)
    #[arg(long, default_value_t = 0)]
    duration: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mode = match cli.mode.as_str() {
        "tones" => EngineMode::Tones,
        "motion" => EngineMode::Motion,
        other => {
            error!("Unknown mode {:?} — use \"tones\" or \"motion\"", other);
            std::process::exit(1);
        }
    };

    let config = EngineConfig {
        mode,
        buffer_size: cli.buffer_size,
        sample_rate: cli.sample_rate,
        tick_hz: cli.fps,
        tone_threshold_db: cli.threshold_db,
        min_separation_hz: cli.min_separation,
        cache_ticks: (cli.cache_ticks > 0).then_some(cli.cache_ticks),
        history_len: cli.history,
        motion_threshold_hz: cli.motion_threshold,
        motion_cooldown_ms: cli.motion_cooldown_ms,
        probe_frequency_hz: cli.probe_freq,
        probe_amplitude: cli.amplitude,
    };
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let source = if cli.audio_file.is_some() {
        "WAV FILE"
    } else if cli.simulate {
        "SIMULATOR"
    } else {
        "MICROPHONE"
    };

    info!("═══════════════════════════════════════════════");
    info!("  TONE CAPTURE v{}", env!("CARGO_PKG_VERSION"));
    info!("  Mode: {:?}   Source: {}", mode, source);
    info!(
        "  Window: {} samples @ {} Hz ({:.1} Hz/bin), {} ticks/s",
        config.buffer_size,
        config.sample_rate,
        config.hz_per_bin(),
        config.tick_hz
    );
    if mode == EngineMode::Motion {
        info!("  Probe: {:.0} Hz", config.probe_frequency_hz);
    }
    info!("═══════════════════════════════════════════════");

    let ring = SampleRing::new(config.buffer_size * RING_WINDOWS);
    let clock = SessionClock::new();

    // Stop channels: one for the engine, one for the simulator.
    let (stop_tx, stop_rx) = bounded::<()>(2);
    let (sim_stop_tx, sim_stop_rx) = bounded::<()>(1);

    // Channels: engine → consumers
    let mut frame_txs: Vec<crossbeam_channel::Sender<AnalysisFrame>> = Vec::new();
    let mut handles = Vec::new();

    // ─── Console dashboard (default output) ─────────────────────────
    if cli.console || !cli.json {
        let (tx, rx) = bounded::<AnalysisFrame>(256);
        frame_txs.push(tx);
        let display_hz = cli.display_hz;
        let tick_hz = config.tick_hz;
        handles.push(
            thread::Builder::new()
                .name("display".into())
                .spawn(move || {
                    ConsoleDisplay::new(rx, display_hz, tick_hz).run();
                })
                .unwrap(),
        );
    }

    // ─── JSON line output ───────────────────────────────────────────
    if cli.json {
        let (tx, rx) = bounded::<AnalysisFrame>(1024);
        frame_txs.push(tx);
        handles.push(
            thread::Builder::new()
                .name("json".into())
                .spawn(move || {
                    for frame in rx.iter() {
                        match serde_json::to_string(&frame) {
                            Ok(line) => println!("{}", line),
                            Err(e) => error!("JSON encode failed: {}", e),
                        }
                    }
                })
                .unwrap(),
        );
    }

    // ─── Analysis engine ────────────────────────────────────────────
    let analyzer = match SpectrumAnalyzer::new(config.buffer_size) {
        Ok(a) => a,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let mut engine = match AnalysisEngine::new(
        &config,
        ring.clone(),
        analyzer,
        frame_txs,
        clock.clone(),
    ) {
        Ok(e) => e,
        Err(e) => {
            error!("Engine construction failed: {}", e);
            std::process::exit(1);
        }
    };
    handles.push(
        thread::Builder::new()
            .name("engine".into())
            .spawn(move || {
                engine.run(stop_rx);
            })
            .unwrap(),
    );

    // ─── Input source ───────────────────────────────────────────────
    // Kept alive until main exits; dropping it stops the cpal streams.
    #[cfg(feature = "audio")]
    let mut _audio: Option<AudioDuplex> = None;

    if let Some(path) = cli.audio_file {
        let wav_ring = ring.clone();
        let wav_stop = stop_tx.clone();
        let expected_rate = config.sample_rate;
        handles.push(
            thread::Builder::new()
                .name("wav-player".into())
                .spawn(move || {
                    WavPlayer::new(path, wav_ring, expected_rate).run();
                    // File exhausted — wind the engine down.
                    let _ = wav_stop.send(());
                })
                .unwrap(),
        );
    } else if cli.simulate {
        let sim_ring = ring.clone();
        let sample_rate = config.sample_rate;
        let probe_hz = config.probe_frequency_hz;
        handles.push(
            thread::Builder::new()
                .name("simulator".into())
                .spawn(move || {
                    Simulator::new(sim_ring, sample_rate).run(mode, probe_hz, sim_stop_rx);
                })
                .unwrap(),
        );
    } else {
        #[cfg(feature = "audio")]
        {
            let synth = SineSynth::new(
                config.probe_frequency_hz,
                config.probe_amplitude,
                config.sample_rate as f32,
            );
            match AudioDuplex::start(ring.clone(), synth, config.sample_rate) {
                Ok(duplex) => _audio = Some(duplex),
                Err(e) => {
                    error!("Audio I/O unavailable: {}", e);
                    std::process::exit(1);
                }
            }
        }
        #[cfg(not(feature = "audio"))]
        {
            error!(
                "Live capture requires the 'audio' feature. \
                 Falling back to the simulator."
            );
            let sim_ring = ring.clone();
            let sample_rate = config.sample_rate;
            let probe_hz = config.probe_frequency_hz;
            handles.push(
                thread::Builder::new()
                    .name("simulator".into())
                    .spawn(move || {
                        Simulator::new(sim_ring, sample_rate).run(mode, probe_hz, sim_stop_rx);
                    })
                    .unwrap(),
            );
        }
    }

    // ─── Timed shutdown ─────────────────────────────────────────────
    // With no duration the stop senders stay alive in main so the workers
    // run until Ctrl+C.
    let _keepalive = if cli.duration > 0 {
        let secs = cli.duration;
        handles.push(
            thread::Builder::new()
                .name("shutdown-timer".into())
                .spawn(move || {
                    thread::sleep(Duration::from_secs(secs));
                    info!("Run duration elapsed — stopping.");
                    let _ = stop_tx.send(());
                    let _ = sim_stop_tx.send(());
                })
                .unwrap(),
        );
        None
    } else {
        info!("Running. Press Ctrl+C to stop.");
        Some((stop_tx, sim_stop_tx))
    };

    for h in handles {
        let _ = h.join();
    }
}
