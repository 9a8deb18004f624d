use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::audio::focus::{FocusArbiter, FocusCallback, FocusService};
use crate::audio::sink::DeviceSink;
use crate::audio::wave::{WaveHeader, WaveReader};
use crate::config::PlaybackConfig;
use crate::error::PlayerError;

/// Resources for one play/stop cycle.
///
/// Acquired in order reader, focus, sink and released in reverse. Each
/// stage may be missing when preparation failed part way.
pub struct PlaybackSession {
    id: u64,
    config: PlaybackConfig,
    reader: Option<WaveReader>,
    focus: FocusArbiter,
    sink: Option<Box<dyn DeviceSink>>,
    chunk: Vec<u8>,
    bytes_written: u64,
    started_at: Instant,
    sink_started: bool,
    paused: bool,
    reached_eof: bool,
}

impl PlaybackSession {
    pub fn new(id: u64, config: PlaybackConfig, focus_service: Arc<dyn FocusService>) -> Self {
        Self {
            id,
            config,
            reader: None,
            focus: FocusArbiter::new(focus_service),
            sink: None,
            chunk: Vec::new(),
            bytes_written: 0,
            started_at: Instant::now(),
            sink_started: false,
            paused: false,
            reached_eof: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn open_reader(&mut self) -> Result<&WaveHeader, PlayerError> {
        let reader = WaveReader::open(&self.config.audio_file_path)?;
        Ok(self.reader.insert(reader).header())
    }

    pub fn header(&self) -> Option<&WaveHeader> {
        self.reader.as_ref().map(|r| r.header())
    }

    pub fn request_focus(&mut self, on_change: FocusCallback) -> Result<(), PlayerError> {
        self.focus.request_focus(self.config.attributes(), on_change)
    }

    pub fn has_focus(&self) -> bool {
        self.focus.state() == crate::audio::focus::FocusState::Granted
    }

    /// Take ownership of an opened sink; writes go out in `chunk_size` pieces
    pub fn attach_sink(&mut self, sink: Box<dyn DeviceSink>, chunk_size: usize) {
        self.sink = Some(sink);
        self.chunk = vec![0u8; chunk_size.max(1)];
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk.len()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn reached_eof(&self) -> bool {
        self.reached_eof
    }

    pub fn sink_started(&self) -> bool {
        self.sink_started
    }

    fn sink_mut(&mut self) -> Result<&mut Box<dyn DeviceSink>, PlayerError> {
        self.sink
            .as_mut()
            .ok_or_else(|| PlayerError::Device("device sink is not open".to_string()))
    }

    /// Start rendering on the device
    pub fn start_sink(&mut self) -> Result<(), PlayerError> {
        self.sink_mut()?.play()?;
        self.sink_started = true;
        self.started_at = Instant::now();
        Ok(())
    }

    /// Move one chunk from file to device. Returns the bytes moved, 0 at
    /// end of stream. Partial device writes are retried until the whole
    /// chunk is accepted.
    pub fn pump(&mut self) -> Result<usize, PlayerError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| PlayerError::Io("audio file is not open".to_string()))?;

        let read = reader.read(&mut self.chunk)?;
        if read == 0 {
            self.reached_eof = true;
            return Ok(0);
        }

        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| PlayerError::Device("device sink is not open".to_string()))?;

        let mut offset = 0;
        while offset < read {
            let written = sink.write(&self.chunk[offset..read])?;
            if written == 0 {
                return Err(PlayerError::Device("device accepted no data".to_string()));
            }
            offset += written;
        }

        self.bytes_written += read as u64;
        Ok(read)
    }

    pub fn pending_bytes(&self) -> usize {
        self.sink.as_ref().map(|s| s.pending_bytes()).unwrap_or(0)
    }

    pub fn set_volume(&mut self, volume: f32) {
        if let Some(sink) = self.sink.as_mut() {
            sink.set_volume(volume);
        }
    }

    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.pause();
        }
        self.paused = true;
    }

    /// Undo `pause`. A sink that was never started stays stopped.
    pub fn resume(&mut self) -> Result<(), PlayerError> {
        if !self.paused {
            return Ok(());
        }
        self.paused = false;
        if self.sink_started {
            self.sink_mut()?.play()?;
        }
        Ok(())
    }

    /// Release everything in reverse acquisition order. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            debug!("Session {}: releasing device sink", self.id);
            sink.stop();
            sink.release();
        }
        self.focus.abandon();
        if let Some(mut reader) = self.reader.take() {
            debug!(
                "Session {}: closing {} after {} payload bytes",
                self.id,
                reader.path().display(),
                reader.bytes_read()
            );
            reader.close();
        }
        self.chunk = Vec::new();
    }

    pub fn is_torn_down(&self) -> bool {
        self.sink.is_none() && self.reader.is_none() && !self.has_focus()
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if !self.is_torn_down() {
            warn!("Session {} dropped without teardown", self.id);
            self.teardown();
        }
    }
}
