use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use log::{error, info, warn};

use crate::ring_buffer::SampleRing;
use crate::synth::SineSynth;

/// Live microphone capture plus probe-tone playback via cpal.
///
/// Holds both cpal `Stream`s alive. Drop this to stop processing — stream
/// teardown joins the callbacks, so no writes to the ring or reads from the
/// synth happen after the drop returns.
///
/// The input callback pushes channel 0 of each frame straight into the
/// ring; the output callback is filled by the synth. Neither allocates.
pub struct AudioDuplex {
    _input: Stream,
    _output: Stream,
}

impl AudioDuplex {
    /// Open the default input and output devices and start streaming.
    /// Returns immediately — audio flows on cpal's real-time threads.
    ///
    /// A missing device or unsupported format is an error here, before any
    /// processing starts; it is never absorbed into silent no-ops.
    pub fn start(
        ring: SampleRing,
        synth: SineSynth,
        preferred_rate: u32,
    ) -> Result<Self, String> {
        let host = cpal::default_host();
        let input = start_input(&host, ring, preferred_rate)?;
        let output = start_output(&host, synth, preferred_rate)?;
        Ok(Self {
            _input: input,
            _output: output,
        })
    }
}

fn start_input(host: &cpal::Host, ring: SampleRing, preferred_rate: u32) -> Result<Stream, String> {
    let device = host
        .default_input_device()
        .ok_or_else(|| "No default audio input device found".to_string())?;

    info!(
        "Audio input: {}",
        device.name().unwrap_or_else(|_| "unknown".into())
    );

    let supported = device
        .default_input_config()
        .map_err(|e| format!("No supported input config: {e}"))?;

    // Prefer the configured analysis rate — the bin→Hz mapping assumes it.
    // Fall back to the device default if no supported range covers it.
    let preferred = cpal::SampleRate(preferred_rate);
    let preferred_cfg = device.supported_input_configs().ok().and_then(|configs| {
        configs
            .filter(|c| {
                c.channels() == supported.channels()
                    && c.min_sample_rate() <= preferred
                    && c.max_sample_rate() >= preferred
            })
            .max_by_key(|c| c.max_sample_rate())
            .map(|c| c.with_sample_rate(preferred))
    });

    let (config, sample_rate, format): (StreamConfig, u32, SampleFormat) =
        if let Some(cfg) = preferred_cfg {
            let sr = cfg.sample_rate().0;
            let fmt = cfg.sample_format();
            (cfg.into(), sr, fmt)
        } else {
            let sr = supported.sample_rate().0;
            let fmt = supported.sample_format();
            (supported.into(), sr, fmt)
        };

    let channels = config.channels as usize;
    info!(
        "Capture config: {}Hz  {} ch  {:?}",
        sample_rate, channels, format
    );
    if sample_rate != preferred_rate {
        warn!(
            "Capture runs at {} Hz but analysis assumes {} Hz — reported \
             frequencies will be scaled accordingly",
            sample_rate, preferred_rate
        );
    }

    let err_fn = |e: cpal::StreamError| error!("Audio input stream error: {e}");

    let stream = match format {
        SampleFormat::F32 => device
            .build_input_stream(
                &config,
                move |data: &[f32], _| ring.write_frames(data, channels),
                err_fn,
                None,
            )
            .map_err(|e| e.to_string())?,
        SampleFormat::I16 => device
            .build_input_stream(
                &config,
                move |data: &[i16], _| ring.write_frames_i16(data, channels),
                err_fn,
                None,
            )
            .map_err(|e| e.to_string())?,
        SampleFormat::U16 => device
            .build_input_stream(
                &config,
                move |data: &[u16], _| ring.write_frames_u16(data, channels),
                err_fn,
                None,
            )
            .map_err(|e| e.to_string())?,
        fmt => {
            return Err(format!(
                "Unsupported input sample format {fmt:?}. Use an F32 or I16 device."
            ))
        }
    };

    stream.play().map_err(|e| e.to_string())?;
    Ok(stream)
}

fn start_output(
    host: &cpal::Host,
    mut synth: SineSynth,
    preferred_rate: u32,
) -> Result<Stream, String> {
    let device = host
        .default_output_device()
        .ok_or_else(|| "No default audio output device found".to_string())?;

    info!(
        "Audio output: {}",
        device.name().unwrap_or_else(|_| "unknown".into())
    );

    let supported = device
        .default_output_config()
        .map_err(|e| format!("No supported output config: {e}"))?;

    let preferred = cpal::SampleRate(preferred_rate);
    let preferred_cfg = device.supported_output_configs().ok().and_then(|configs| {
        configs
            .filter(|c| {
                c.channels() == supported.channels()
                    && c.min_sample_rate() <= preferred
                    && c.max_sample_rate() >= preferred
            })
            .max_by_key(|c| c.max_sample_rate())
            .map(|c| c.with_sample_rate(preferred))
    });

    let (config, sample_rate, format): (StreamConfig, u32, SampleFormat) =
        if let Some(cfg) = preferred_cfg {
            let sr = cfg.sample_rate().0;
            let fmt = cfg.sample_format();
            (cfg.into(), sr, fmt)
        } else {
            let sr = supported.sample_rate().0;
            let fmt = supported.sample_format();
            (supported.into(), sr, fmt)
        };

    let channels = config.channels as usize;
    info!(
        "Playback config: {}Hz  {} ch  {:?}",
        sample_rate, channels, format
    );

    // The synth's phase increment depends on the real output rate.
    synth.set_sample_rate(sample_rate as f32);

    let err_fn = |e: cpal::StreamError| error!("Audio output stream error: {e}");

    let stream = match format {
        SampleFormat::F32 => device
            .build_output_stream(
                &config,
                move |out: &mut [f32], _| synth.fill(out, channels),
                err_fn,
                None,
            )
            .map_err(|e| e.to_string())?,
        SampleFormat::I16 => device
            .build_output_stream(
                &config,
                move |out: &mut [i16], _| {
                    for frame in out.chunks_mut(channels) {
                        let sample = (synth.next_sample() * i16::MAX as f32) as i16;
                        for slot in frame.iter_mut() {
                            *slot = sample;
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| e.to_string())?,
        SampleFormat::U16 => device
            .build_output_stream(
                &config,
                move |out: &mut [u16], _| {
                    for frame in out.chunks_mut(channels) {
                        let sample =
                            ((synth.next_sample() * 0.5 + 0.5) * u16::MAX as f32) as u16;
                        for slot in frame.iter_mut() {
                            *slot = sample;
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| e.to_string())?,
        fmt => {
            return Err(format!(
                "Unsupported output sample format {fmt:?}. Use an F32 or I16 device."
            ))
        }
    };

    stream.play().map_err(|e| e.to_string())?;
    Ok(stream)
}
