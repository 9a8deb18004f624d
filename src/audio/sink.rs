use crate::audio::params::{ChannelMask, SampleEncoding};
use crate::config::{AudioAttributes, PerformanceMode, TransferMode};
use crate::error::PlayerError;

/// Everything a device needs to open an output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub sample_rate: u32,
    pub channel_mask: ChannelMask,
    /// Channels actually interleaved in the written bytes
    pub source_channels: u16,
    pub encoding: SampleEncoding,
    /// Sink buffer size in bytes
    pub buffer_size: usize,
    pub attributes: AudioAttributes,
    pub transfer_mode: TransferMode,
    pub performance_mode: PerformanceMode,
}

impl FormatSpec {
    /// Bytes per interleaved frame of source data
    pub fn frame_size(&self) -> usize {
        self.source_channels as usize * self.encoding.bytes_per_sample()
    }
}

/// An open output stream that accepts interleaved PCM bytes
pub trait DeviceSink: Send {
    /// Write bytes, blocking until at least part of them is accepted.
    /// Returns the number of bytes taken.
    fn write(&mut self, data: &[u8]) -> Result<usize, PlayerError>;

    fn set_volume(&mut self, volume: f32);

    fn play(&mut self) -> Result<(), PlayerError>;

    fn pause(&mut self);

    fn stop(&mut self);

    /// Free the device. Nothing may be called afterwards.
    fn release(&mut self);

    /// Bytes written but not yet rendered
    fn pending_bytes(&self) -> usize {
        0
    }
}

/// Factory for sinks, plus the device's buffer constraints
pub trait DeviceBackend: Send + Sync {
    /// Smallest buffer in bytes the device accepts for `spec`, or `None`
    /// when the device rejects the parameters
    fn minimum_buffer_size(&self, spec: &FormatSpec) -> Option<usize>;

    fn open(&self, spec: &FormatSpec) -> Result<Box<dyn DeviceSink>, PlayerError>;
}
