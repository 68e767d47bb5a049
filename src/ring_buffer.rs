use std::sync::{Arc, Mutex};

/// Shared sample ring between the audio callback and the analysis tick.
///
/// Single writer (the capture callback), single reader (the engine).
/// The interior lock is held only for a bounded copy — never across I/O,
/// allocation, or anything else that could stall the real-time context.
/// All storage is allocated once at construction.
///
/// Multi-channel input keeps channel 0 of each frame; the remaining
/// channels are discarded before storage.
#[derive(Clone)]
pub struct SampleRing {
    inner: Arc<Mutex<RingState>>,
    capacity: usize,
}

struct RingState {
    buf: Box<[f32]>,
    write_pos: usize,
    /// Total samples ever written — lets the reader distinguish "not enough
    /// history yet" from a wrapped-but-full buffer.
    total_written: u64,
}

impl SampleRing {
    /// Allocate a ring holding `capacity` mono samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RingState {
                buf: vec![0.0f32; capacity].into_boxed_slice(),
                write_pos: 0,
                total_written: 0,
            })),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append interleaved f32 frames, keeping channel 0. Overwrites the
    /// oldest samples when full. Callback chunk sizes may be anything —
    /// they need not divide the analysis window.
    pub fn write_frames(&self, interleaved: &[f32], channels: usize) {
        let channels = channels.max(1);
        let mut state = self.inner.lock().unwrap();
        for frame in interleaved.chunks(channels) {
            state.push(frame[0]);
        }
    }

    /// Append interleaved i16 frames, converting channel 0 to f32 in place.
    pub fn write_frames_i16(&self, interleaved: &[i16], channels: usize) {
        const SCALE: f32 = i16::MAX as f32;
        let channels = channels.max(1);
        let mut state = self.inner.lock().unwrap();
        for frame in interleaved.chunks(channels) {
            state.push(frame[0] as f32 / SCALE);
        }
    }

    /// Append interleaved u16 frames. U16: 0 = -1.0, 32768 = 0.0, 65535 = +1.0
    pub fn write_frames_u16(&self, interleaved: &[u16], channels: usize) {
        const MID: f32 = 32768.0;
        const SCALE: f32 = 32768.0;
        let channels = channels.max(1);
        let mut state = self.inner.lock().unwrap();
        for frame in interleaved.chunks(channels) {
            state.push((frame[0] as f32 - MID) / SCALE);
        }
    }

    /// Copy the freshest `out.len()` samples into `out`, oldest first.
    ///
    /// Non-consuming: repeated fetches re-read the latest window, so an
    /// analysis tick always sees the most recent audio regardless of how
    /// much arrived since the last tick.
    ///
    /// Returns `false` (underrun) and leaves `out` untouched when fewer
    /// samples than requested have been written so far.
    pub fn fetch_latest(&self, out: &mut [f32]) -> bool {
        let n = out.len();
        if n > self.capacity {
            return false;
        }
        let state = self.inner.lock().unwrap();
        if state.total_written < n as u64 {
            return false;
        }
        let start = (state.write_pos + self.capacity - n) % self.capacity;
        let first_len = n.min(self.capacity - start);
        out[..first_len].copy_from_slice(&state.buf[start..start + first_len]);
        if first_len < n {
            out[first_len..].copy_from_slice(&state.buf[..n - first_len]);
        }
        true
    }
}

impl RingState {
    #[inline]
    fn push(&mut self, sample: f32) {
        self.buf[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buf.len();
        self.total_written += 1;
    }
}
