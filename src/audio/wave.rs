use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::PlayerError;

/// Size of the canonical PCM WAV header
pub const WAV_HEADER_SIZE: usize = 44;

const RIFF_TAG_OFFSET: usize = 0;
const RIFF_SIZE_OFFSET: usize = 4;
const WAVE_TAG_OFFSET: usize = 8;
const AUDIO_FORMAT_OFFSET: usize = 20;
const CHANNEL_COUNT_OFFSET: usize = 22;
const SAMPLE_RATE_OFFSET: usize = 24;
const BYTE_RATE_OFFSET: usize = 28;
const BLOCK_ALIGN_OFFSET: usize = 32;
const BITS_PER_SAMPLE_OFFSET: usize = 34;
const DATA_SIZE_OFFSET: usize = 40;

/// Data sizes that mean "length unknown, read to end of file"
const UNKNOWN_DATA_SIZES: [u32; 2] = [0, u32::MAX];

/// Parsed canonical RIFF/WAVE header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveHeader {
    pub riff_tag: [u8; 4],
    pub riff_size: u32,
    pub wave_tag: [u8; 4],
    pub audio_format: u16,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

fn read_u16_le(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_tag(bytes: &[u8], offset: usize) -> [u8; 4] {
    [
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ]
}

impl WaveHeader {
    /// Decode the first 44 bytes of a WAV file.
    ///
    /// Tags are checked before any field so that a non-WAV file is reported
    /// as a format problem rather than as bad parameters.
    pub fn parse(bytes: &[u8]) -> Result<Self, PlayerError> {
        if bytes.len() < WAV_HEADER_SIZE {
            return Err(PlayerError::Format(format!(
                "header is {} bytes, expected {}",
                bytes.len(),
                WAV_HEADER_SIZE
            )));
        }

        let riff_tag = read_tag(bytes, RIFF_TAG_OFFSET);
        let wave_tag = read_tag(bytes, WAVE_TAG_OFFSET);
        if &riff_tag != b"RIFF" {
            return Err(PlayerError::Format("missing RIFF tag".to_string()));
        }
        if &wave_tag != b"WAVE" {
            return Err(PlayerError::Format("missing WAVE tag".to_string()));
        }

        let header = WaveHeader {
            riff_tag,
            riff_size: read_u32_le(bytes, RIFF_SIZE_OFFSET),
            wave_tag,
            audio_format: read_u16_le(bytes, AUDIO_FORMAT_OFFSET),
            channel_count: read_u16_le(bytes, CHANNEL_COUNT_OFFSET),
            sample_rate: read_u32_le(bytes, SAMPLE_RATE_OFFSET),
            byte_rate: read_u32_le(bytes, BYTE_RATE_OFFSET),
            block_align: read_u16_le(bytes, BLOCK_ALIGN_OFFSET),
            bits_per_sample: read_u16_le(bytes, BITS_PER_SAMPLE_OFFSET),
            data_size: read_u32_le(bytes, DATA_SIZE_OFFSET),
        };

        if header.sample_rate == 0 || header.channel_count == 0 || header.bits_per_sample == 0 {
            return Err(PlayerError::Param(format!(
                "invalid audio parameters: {}Hz, {}ch, {}bit",
                header.sample_rate, header.channel_count, header.bits_per_sample
            )));
        }

        Ok(header)
    }

    /// Bytes per sample of one channel, rounded up to whole bytes
    pub fn bytes_per_sample(&self) -> u32 {
        (self.bits_per_sample as u32).div_ceil(8)
    }

    /// Bytes in one frame (one sample for every channel)
    pub fn frame_size(&self) -> usize {
        (self.channel_count as u32 * self.bytes_per_sample()) as usize
    }

    pub fn expected_byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channel_count as u64 * (self.bits_per_sample as u64 / 8)
    }

    pub fn expected_block_align(&self) -> u64 {
        self.channel_count as u64 * (self.bits_per_sample as u64 / 8)
    }

    /// True when the redundant byte-rate and block-align fields agree with
    /// rate, channels and depth
    pub fn is_consistent(&self) -> bool {
        self.byte_rate as u64 == self.expected_byte_rate()
            && self.block_align as u64 == self.expected_block_align()
    }

    /// True when the data chunk declares a usable length
    pub fn has_known_length(&self) -> bool {
        !UNKNOWN_DATA_SIZES.contains(&self.data_size)
    }

    pub fn duration(&self) -> Duration {
        let bytes_per_second = self.expected_byte_rate();
        if bytes_per_second == 0 || !self.has_known_length() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.data_size as f64 / bytes_per_second as f64)
    }

    pub fn channel_description(&self) -> String {
        match self.channel_count {
            1 => "Mono".to_string(),
            2 => "Stereo".to_string(),
            4 => "Quad".to_string(),
            6 => "5.1 Surround".to_string(),
            8 => "7.1 Surround".to_string(),
            10 => "5.1.4 Surround".to_string(),
            12 => "7.1.4 Surround".to_string(),
            n => format!("{} channels (playback as stereo)", n),
        }
    }

    /// Speaker labels in interleaving order
    pub fn channel_layout(&self) -> String {
        match self.channel_count {
            1 => "M".to_string(),
            2 => "L R".to_string(),
            4 => "L R Ls Rs".to_string(),
            6 => "L R C LFE Ls Rs".to_string(),
            8 => "L R C LFE Ls Rs Lrs Rrs".to_string(),
            10 => "L R C LFE Ls Rs Ltf Rtf Ltb Rtb".to_string(),
            12 => "L R C LFE Ls Rs Lrs Rrs Ltf Rtf Ltb Rtb".to_string(),
            n => format!("{} channels -> Stereo (L R)", n),
        }
    }
}

impl fmt::Display for WaveHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz, {}, {}bit, {:.2}s",
            self.sample_rate,
            self.channel_description(),
            self.bits_per_sample,
            self.duration().as_secs_f64()
        )
    }
}

/// Sequential reader over the PCM payload of a WAV file
#[derive(Debug)]
pub struct WaveReader {
    path: PathBuf,
    file: Option<File>,
    header: WaveHeader,
    /// Payload bytes left; `None` when the header does not declare a length
    remaining: Option<u64>,
    bytes_read: u64,
}

impl WaveReader {
    /// Open a file and parse its header. The descriptor is released on
    /// every failure path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PlayerError> {
        let path = path.as_ref();
        debug!("Opening WAV file: {}", path.display());

        let mut file = File::open(path).map_err(|e| {
            let err = PlayerError::file(path, e);
            error!("{}", err);
            err
        })?;

        let is_file = file.metadata().map(|m| m.is_file()).map_err(|e| PlayerError::file(path, e))?;
        if !is_file {
            let err = PlayerError::file(path, io::Error::new(io::ErrorKind::Other, "not a regular file"));
            error!("{}", err);
            return Err(err);
        }

        let mut header_bytes = [0u8; WAV_HEADER_SIZE];
        let filled = read_fully(&mut file, &mut header_bytes).map_err(|e| PlayerError::file(path, e))?;

        let header = WaveHeader::parse(&header_bytes[..filled])?;

        if !header.is_consistent() {
            warn!(
                "Header mismatch - ByteRate: expected={}, actual={}; BlockAlign: expected={}, actual={}",
                header.expected_byte_rate(),
                header.byte_rate,
                header.expected_block_align(),
                header.block_align
            );
        }

        let remaining = header.has_known_length().then_some(header.data_size as u64);
        if remaining.is_none() {
            debug!("Data size not declared, reading {} to end of file", path.display());
        }

        info!("WAV file opened successfully: {}", header);

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            header,
            remaining,
            bytes_read: 0,
        })
    }

    pub fn header(&self) -> &WaveHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read payload bytes. Returns `Ok(0)` only at end of stream.
    ///
    /// A failed read closes the reader.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, PlayerError> {
        let Some(file) = self.file.as_mut() else {
            return Err(PlayerError::Io(format!("{} is not open", self.path.display())));
        };

        let limit = match self.remaining {
            Some(remaining) => buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX)),
            None => buf.len(),
        };
        if limit == 0 {
            return Ok(0);
        }

        let result = loop {
            match file.read(&mut buf[..limit]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match result {
            Ok(0) => {
                if let Some(remaining) = self.remaining.take() {
                    if remaining > 0 {
                        warn!(
                            "{} is truncated: {} of {} payload bytes missing",
                            self.path.display(),
                            remaining,
                            self.header.data_size
                        );
                    }
                }
                self.remaining = Some(0);
                Ok(0)
            }
            Ok(n) => {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= n as u64;
                }
                self.bytes_read += n as u64;
                Ok(n)
            }
            Err(e) => {
                error!("Failed to read data from {}: {}", self.path.display(), e);
                self.close();
                Err(PlayerError::Io(format!("read failed: {}", e)))
            }
        }
    }

    /// Release the descriptor. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("Closing WAV file {}", self.path.display());
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// True only while open with non-zero audio parameters
    pub fn is_valid(&self) -> bool {
        self.is_open()
            && self.header.sample_rate > 0
            && self.header.channel_count > 0
            && self.header.bits_per_sample > 0
    }
}

/// Fill as much of `buf` as the source provides; short only at end of file
fn read_fully(source: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
