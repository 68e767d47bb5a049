use crate::types::{AnalysisFrame, MotionState};
use crossbeam_channel::Receiver;
use std::io::{self, Write};

/// Renders a live ASCII dashboard of the analysis output.
pub struct ConsoleDisplay {
    rx: Receiver<AnalysisFrame>,
    update_hz: u32,
    tick_hz: u32,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<AnalysisFrame>, update_hz: u32, tick_hz: u32) -> Self {
        Self {
            rx,
            update_hz,
            tick_hz,
        }
    }

    /// Consume frames until the channel closes. Blocks the calling thread.
    pub fn run(&self) {
        // Frames arrive at the tick rate; render every skip-th one.
        let update_hz = self.update_hz.max(1);
        let skip = (self.tick_hz / update_hz).max(1) as u64;
        let mut count: u64 = 0;
        let mut stdout = io::stdout();

        for frame in self.rx.iter() {
            count += 1;
            if count % skip != 0 {
                continue;
            }

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");

            println!("╔══════════════════════════════════════════════════════════╗");
            println!("║  TONE CAPTURE — Live Monitor                             ║");
            println!("╠══════════════════════════════════════════════════════════╣");

            let secs = frame.timestamp_us as f64 / 1_000_000.0;
            println!("║  Time: {:>8.2}s                                         ║", secs);
            println!("║                                                          ║");

            if let Some(motion) = frame.motion {
                let (arrow, label) = match motion {
                    MotionState::Insufficient => ("        ", "warming up..."),
                    MotionState::Still => ("   ·    ", "still"),
                    MotionState::Towards => ("  ◀◀◀   ", "TOWARDS"),
                    MotionState::Away => ("  ▶▶▶   ", "AWAY"),
                };
                println!("║  Motion: {} {:<38}║", arrow, label);
            } else {
                match frame.tones {
                    Some(pair) => {
                        println!(
                            "║  Tone 1: {:>8.1} Hz  ({:>6})                          ║",
                            pair.freq1_hz,
                            hz_to_note_name(pair.freq1_hz as f64)
                        );
                        println!(
                            "║  Tone 2: {:>8.1} Hz  ({:>6})                          ║",
                            pair.freq2_hz,
                            hz_to_note_name(pair.freq2_hz as f64)
                        );
                    }
                    None => {
                        println!("║  Tones: --- (no tone pair detected)                      ║");
                        println!("║                                                          ║");
                    }
                }
            }

            println!("╚══════════════════════════════════════════════════════════╝");
            let _ = stdout.flush();
        }
    }
}

fn hz_to_note_name(hz: f64) -> String {
    if hz < 20.0 {
        return "---".to_string();
    }
    let midi = 69.0 + 12.0 * (hz / 440.0).log2();
    let note_num = midi.round() as i32;
    let cents = ((midi - note_num as f64) * 100.0).round() as i32;

    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let name = note_names[((note_num % 12 + 12) % 12) as usize];
    let octave = (note_num / 12) - 1;

    if cents == 0 {
        format!("{}{}", name, octave)
    } else if cents > 0 {
        format!("{}{}+{}", name, octave, cents)
    } else {
        format!("{}{}{}", name, octave, cents)
    }
}
