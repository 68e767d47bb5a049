pub mod console_display;
pub mod engine;
pub mod motion_detector;
pub mod ring_buffer;
pub mod simulator;
pub mod spectrum;
pub mod synth;
pub mod tone_detector;
pub mod types;
pub mod wav_player;

#[cfg(feature = "audio")]
pub mod audio_io;
