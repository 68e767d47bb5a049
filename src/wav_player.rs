use crate::ring_buffer::SampleRing;
use hound::{SampleFormat, WavReader};
use log::{error, info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Reads a WAV file and streams it into the sample ring at real-time pace.
///
/// Intended for microphone-free testing: record a session (two tones, a
/// probe with reflections) and pipe the audio through the full analysis
/// pipeline to validate thresholds before touching live hardware.
///
/// Typical use: `--audio-file session.wav`
pub struct WavPlayer {
    path: PathBuf,
    ring: SampleRing,
    expected_rate: u32,
}

/// Samples written per chunk. ~23ms at 44.1kHz — fine-grained enough that
/// the analysis tick never waits long for fresh data.
const CHUNK_SIZE: usize = 1024;

impl WavPlayer {
    pub fn new(path: PathBuf, ring: SampleRing, expected_rate: u32) -> Self {
        Self {
            path,
            ring,
            expected_rate,
        }
    }

    /// Stream the file once. Blocks the calling thread until done.
    pub fn run(&self) {
        let reader = match WavReader::open(&self.path) {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to open WAV file {:?}: {}", self.path, e);
                return;
            }
        };

        let spec = reader.spec();
        let sample_rate = spec.sample_rate;
        let channels = spec.channels as usize;

        info!(
            "WAV: {:?}  {} Hz  {} ch  {:?}  {} bit",
            self.path.file_name().unwrap_or_default(),
            sample_rate,
            channels,
            spec.sample_format,
            spec.bits_per_sample,
        );

        if sample_rate != self.expected_rate {
            warn!(
                "WAV sample rate is {} Hz; analysis assumes {} Hz. \
                 Detected frequencies will be scaled — resample before use.",
                sample_rate, self.expected_rate
            );
        }

        // Read all samples as f32
        let samples_f32: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .filter_map(|s| s.ok())
                .collect(),
            SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .filter_map(|s| s.ok())
                    .map(|s| s as f32 / max)
                    .collect()
            }
        };

        // Keep channel 0, matching the live capture path.
        let mono: Vec<f32> = if channels == 1 {
            samples_f32
        } else {
            samples_f32
                .chunks(channels)
                .map(|frame| frame[0])
                .collect()
        };

        let total_samples = mono.len();
        let duration_secs = total_samples as f64 / sample_rate as f64;
        info!(
            "WAV: {:.2}s, {} samples → streaming at real-time pace",
            duration_secs, total_samples
        );

        let chunk_dur = Duration::from_secs_f64(CHUNK_SIZE as f64 / sample_rate as f64);
        let start = Instant::now();

        for (i, chunk) in mono.chunks(CHUNK_SIZE).enumerate() {
            // Pace to real time: wait until this chunk's expected send time
            let target = chunk_dur * i as u32;
            let elapsed = start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
            self.ring.write_frames(chunk, 1);
        }

        info!("WAV playback complete.");
    }
}
