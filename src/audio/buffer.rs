use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::audio::params::SampleEncoding;

struct RingState {
    samples: VecDeque<f32>,
    closed: bool,
}

/// Bounded sample queue between the writer thread and the output callback.
///
/// Writers block while the ring is full; the callback never blocks.
pub struct SampleRing {
    state: Mutex<RingState>,
    space_available: Condvar,
    capacity: usize,
    channels: u16,
    underrun_count: AtomicUsize,
}

impl SampleRing {
    /// Create a ring holding `capacity_frames` interleaved frames
    pub fn new(capacity_frames: usize, channels: u16) -> Self {
        let capacity = capacity_frames.max(1) * channels.max(1) as usize;
        Self {
            state: Mutex::new(RingState {
                samples: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            space_available: Condvar::new(),
            capacity,
            channels: channels.max(1),
            underrun_count: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples queued and not yet consumed
    pub fn available_read(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.available_read() == 0
    }

    /// Queue as many samples as fit, waiting up to `timeout` for space.
    ///
    /// Returns the number queued; 0 means timed out or closed.
    pub fn write_timeout(&self, data: &[f32], timeout: Duration) -> usize {
        if data.is_empty() {
            return 0;
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        while !state.closed && state.samples.len() >= self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return 0;
            }
            state = self
                .space_available
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }

        if state.closed {
            return 0;
        }

        let to_write = data.len().min(self.capacity - state.samples.len());
        state.samples.extend(&data[..to_write]);
        to_write
    }

    /// Fill `out` from the queue without blocking. Returns samples read;
    /// the caller pads the rest with silence.
    pub fn read(&self, out: &mut [f32]) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let to_read = out.len().min(state.samples.len());
        for (slot, sample) in out.iter_mut().zip(state.samples.drain(..to_read)) {
            *slot = sample;
        }
        drop(state);

        if to_read > 0 {
            self.space_available.notify_all();
        }
        to_read
    }

    /// Drop everything queued
    pub fn clear(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).samples.clear();
        self.space_available.notify_all();
    }

    /// Wake and refuse all writers from now on
    pub fn close(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).closed = true;
        self.space_available.notify_all();
    }

    pub fn record_underrun(&self) {
        self.underrun_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

/// Converts interleaved PCM bytes to f32 frames for the output stream.
///
/// Bytes that do not complete a frame are carried into the next call.
/// When the output has fewer channels than the source, trailing source
/// channels are dropped; when it has more, they are filled with silence.
pub struct PcmConverter {
    encoding: SampleEncoding,
    source_channels: usize,
    output_channels: usize,
    carry: Vec<u8>,
}

impl PcmConverter {
    pub fn new(encoding: SampleEncoding, source_channels: u16, output_channels: u16) -> Self {
        Self {
            encoding,
            source_channels: source_channels.max(1) as usize,
            output_channels: output_channels.max(1) as usize,
            carry: Vec::new(),
        }
    }

    pub fn frame_bytes(&self) -> usize {
        self.source_channels * self.encoding.bytes_per_sample()
    }

    /// Bytes held back waiting for the rest of their frame
    pub fn carried(&self) -> usize {
        self.carry.len()
    }

    pub fn reset(&mut self) {
        self.carry.clear();
    }

    /// Append converted samples for every complete frame in `carry + bytes`
    pub fn convert(&mut self, bytes: &[u8], out: &mut Vec<f32>) {
        let frame_bytes = self.frame_bytes();
        let mut input = std::mem::take(&mut self.carry);
        input.extend_from_slice(bytes);

        let whole = input.len() - input.len() % frame_bytes;
        let sample_bytes = self.encoding.bytes_per_sample();
        out.reserve(whole / frame_bytes * self.output_channels);

        for frame in input[..whole].chunks_exact(frame_bytes) {
            for channel in 0..self.output_channels {
                if channel < self.source_channels {
                    let start = channel * sample_bytes;
                    out.push(decode_sample(self.encoding, &frame[start..start + sample_bytes]));
                } else {
                    out.push(0.0);
                }
            }
        }

        input.drain(..whole);
        self.carry = input;
    }
}

/// Decode one little-endian sample to the range [-1.0, 1.0)
pub fn decode_sample(encoding: SampleEncoding, bytes: &[u8]) -> f32 {
    match encoding {
        SampleEncoding::Pcm8 => (bytes[0] as f32 - 128.0) / 128.0,
        SampleEncoding::Pcm16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32_768.0,
        SampleEncoding::Pcm24Packed => {
            // Sign-extend by placing the 24 bits in the top of an i32
            let value = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
            value as f32 / 8_388_608.0
        }
        SampleEncoding::Pcm32 => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_ring_creation() {
        let ring = SampleRing::new(1024, 2);

        assert_eq!(ring.capacity(), 2048);
        assert_eq!(ring.channels(), 2);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_ring_write_read() {
        let ring = SampleRing::new(100, 2);
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        assert_eq!(ring.write_timeout(&data, Duration::from_millis(10)), 6);
        assert_eq!(ring.available_read(), 6);

        let mut out = vec![0.0; 8];
        assert_eq!(ring.read(&mut out), 6);
        assert_eq!(&out[..6], &data[..]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_ring_full_times_out() {
        let ring = SampleRing::new(2, 1);
        assert_eq!(ring.write_timeout(&[0.1, 0.2, 0.3], Duration::from_millis(5)), 2);
        assert_eq!(ring.write_timeout(&[0.4], Duration::from_millis(5)), 0);
        assert_eq!(ring.available_read(), 2);
    }

    #[test]
    fn test_blocked_writer_resumes_after_read() {
        let ring = Arc::new(SampleRing::new(4, 1));
        assert_eq!(ring.write_timeout(&[0.0; 4], Duration::from_millis(5)), 4);

        let writer_ring = Arc::clone(&ring);
        let writer = thread::spawn(move || writer_ring.write_timeout(&[1.0, 1.0], Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(20));
        let mut out = [0.0; 2];
        assert_eq!(ring.read(&mut out), 2);

        assert_eq!(writer.join().unwrap(), 2);
    }

    #[test]
    fn test_close_wakes_writer() {
        let ring = Arc::new(SampleRing::new(1, 1));
        ring.write_timeout(&[0.0], Duration::from_millis(5));

        let writer_ring = Arc::clone(&ring);
        let writer = thread::spawn(move || writer_ring.write_timeout(&[1.0], Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(20));
        ring.close();
        assert_eq!(writer.join().unwrap(), 0);
    }

    #[test]
    fn test_decode_sample_ranges() {
        assert_eq!(decode_sample(SampleEncoding::Pcm8, &[0]), -1.0);
        assert_eq!(decode_sample(SampleEncoding::Pcm8, &[128]), 0.0);
        assert_eq!(decode_sample(SampleEncoding::Pcm16, &i16::MIN.to_le_bytes()), -1.0);
        assert_eq!(decode_sample(SampleEncoding::Pcm16, &[0, 0]), 0.0);
        assert_eq!(decode_sample(SampleEncoding::Pcm24Packed, &[0x00, 0x00, 0x80]), -1.0);
        assert_eq!(decode_sample(SampleEncoding::Pcm24Packed, &[0x00, 0x00, 0x40]), 0.5);
        assert_eq!(decode_sample(SampleEncoding::Pcm32, &i32::MIN.to_le_bytes()), -1.0);
    }

    #[test]
    fn test_converter_carries_partial_frames() {
        let mut converter = PcmConverter::new(SampleEncoding::Pcm16, 2, 2);
        let mut out = Vec::new();

        // One and a half frames
        converter.convert(&[0, 0x40, 0, 0xC0, 0, 0x40], &mut out);
        assert_eq!(out, vec![0.5, -0.5]);
        assert_eq!(converter.carried(), 2);

        converter.convert(&[0, 0xC0], &mut out);
        assert_eq!(out, vec![0.5, -0.5, 0.5, -0.5]);
        assert_eq!(converter.carried(), 0);
    }

    #[test]
    fn test_converter_maps_channels() {
        // Three source channels played on a stereo output
        let mut converter = PcmConverter::new(SampleEncoding::Pcm8, 3, 2);
        let mut out = Vec::new();
        converter.convert(&[192, 64, 128, 128, 128, 255], &mut out);
        assert_eq!(out, vec![0.5, -0.5, 0.0, 0.0]);

        // Mono source on a stereo output gets a silent right channel
        let mut converter = PcmConverter::new(SampleEncoding::Pcm8, 1, 2);
        let mut out = Vec::new();
        converter.convert(&[192], &mut out);
        assert_eq!(out, vec![0.5, 0.0]);
    }
}
