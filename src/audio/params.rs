use std::fmt;

use log::{info, warn};

use crate::audio::wave::WaveHeader;
use crate::config::PerformanceMode;
use crate::error::PlayerError;

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;
pub const MAX_CHANNELS: u16 = 16;
pub const SUPPORTED_BIT_DEPTHS: [u16; 4] = [8, 16, 24, 32];

/// Speaker layout understood by the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMask {
    Mono,
    Stereo,
    Quad,
    Surround5_1,
    Surround7_1,
    Surround5_1_4,
    Surround7_1_4,
}

impl ChannelMask {
    pub fn channel_count(&self) -> u16 {
        match self {
            ChannelMask::Mono => 1,
            ChannelMask::Stereo => 2,
            ChannelMask::Quad => 4,
            ChannelMask::Surround5_1 => 6,
            ChannelMask::Surround7_1 => 8,
            ChannelMask::Surround5_1_4 => 10,
            ChannelMask::Surround7_1_4 => 12,
        }
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelMask::Mono => "mono",
            ChannelMask::Stereo => "stereo",
            ChannelMask::Quad => "quad",
            ChannelMask::Surround5_1 => "5.1",
            ChannelMask::Surround7_1 => "7.1",
            ChannelMask::Surround5_1_4 => "5.1.4",
            ChannelMask::Surround7_1_4 => "7.1.4",
        };
        f.write_str(name)
    }
}

/// PCM sample encoding handed to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    /// Unsigned 8-bit
    Pcm8,
    /// Signed 16-bit little endian
    Pcm16,
    /// Signed 24-bit little endian, three bytes per sample
    Pcm24Packed,
    /// Signed 32-bit little endian
    Pcm32,
}

impl SampleEncoding {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleEncoding::Pcm8 => 1,
            SampleEncoding::Pcm16 => 2,
            SampleEncoding::Pcm24Packed => 3,
            SampleEncoding::Pcm32 => 4,
        }
    }

    pub fn bits(&self) -> u16 {
        self.bytes_per_sample() as u16 * 8
    }
}

/// Map a channel count onto a named layout, falling back to stereo.
///
/// The fallback only picks a layout; downmixing is left to the caller.
pub fn channel_mask(channel_count: u16) -> ChannelMask {
    match channel_count {
        1 => ChannelMask::Mono,
        2 => ChannelMask::Stereo,
        4 => ChannelMask::Quad,
        6 => ChannelMask::Surround5_1,
        8 => ChannelMask::Surround7_1,
        10 => ChannelMask::Surround5_1_4,
        12 => ChannelMask::Surround7_1_4,
        other => {
            warn!("Unsupported channel count: {}, using stereo playback", other);
            ChannelMask::Stereo
        }
    }
}

/// Map a bit depth onto a sample encoding, falling back to 16-bit
pub fn sample_format(bits_per_sample: u16) -> SampleEncoding {
    match bits_per_sample {
        8 => SampleEncoding::Pcm8,
        16 => SampleEncoding::Pcm16,
        24 => SampleEncoding::Pcm24Packed,
        32 => SampleEncoding::Pcm32,
        other => {
            warn!("Unsupported bit depth: {}, using 16-bit", other);
            SampleEncoding::Pcm16
        }
    }
}

/// `max(device_min * multiplier, floor)`; saturates instead of overflowing
pub fn resolve_buffer_size(device_min: usize, multiplier: u32, floor: usize) -> usize {
    device_min.saturating_mul(multiplier as usize).max(floor)
}

/// Check parsed WAV parameters against what the engine can play
pub fn validate_parameters(header: &WaveHeader) -> Result<(), PlayerError> {
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&header.sample_rate) {
        return Err(PlayerError::Param(format!(
            "sample rate {}Hz outside {}-{}Hz",
            header.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
        )));
    }

    if header.channel_count == 0 || header.channel_count > MAX_CHANNELS {
        return Err(PlayerError::Param(format!(
            "channel count {} outside 1-{}",
            header.channel_count, MAX_CHANNELS
        )));
    }

    if !SUPPORTED_BIT_DEPTHS.contains(&header.bits_per_sample) {
        return Err(PlayerError::Param(format!(
            "bit depth {} not one of {:?}",
            header.bits_per_sample, SUPPORTED_BIT_DEPTHS
        )));
    }

    match header.channel_count {
        12 => {
            info!("Detected 7.1.4 audio configuration (12 channels)");
            info!("7.1.4 format: includes 4 height channels (Ltf Rtf Ltb Rtb)");
        }
        n if n > 12 => warn!(
            "High channel count: {} channels, may not be supported by all devices",
            n
        ),
        _ => {}
    }

    Ok(())
}

/// Size of each device write, as a fraction of the sink buffer.
///
/// Rounded down to whole frames, never less than one frame.
pub fn write_chunk_size(buffer_size: usize, mode: PerformanceMode, frame_size: usize) -> usize {
    let divisor = match mode {
        PerformanceMode::LowLatency => 4,
        PerformanceMode::PowerSaving => 2,
        PerformanceMode::None => 3,
    };
    let frame = frame_size.max(1);
    let chunk = buffer_size / divisor;
    (chunk - chunk % frame).max(frame)
}
