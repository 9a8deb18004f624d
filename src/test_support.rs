//! Fixtures shared by unit and scenario tests: WAV builders, a scripted
//! device backend, a controllable focus service and a recording listener.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::audio::engine::PlaybackListener;
use crate::audio::focus::{FocusCallback, FocusChange, FocusGrant, FocusService};
use crate::audio::sink::{DeviceBackend, DeviceSink, FormatSpec};
use crate::config::AudioAttributes;
use crate::error::PlayerError;

/// Canonical 44-byte header followed by `payload`
pub fn wav_bytes(sample_rate: u32, channels: u16, bits: u16, payload: &[u8]) -> Vec<u8> {
    let block_align = channels as u32 * ((bits as u32 + 7) / 8);
    let byte_rate = sample_rate * block_align;

    let mut bytes = Vec::with_capacity(44 + payload.len());
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&(block_align as u16).to_le_bytes());
    bytes.extend_from_slice(&bits.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

pub fn write_wav(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Holds device writes until opened. Open by default.
pub struct WriteGate {
    state: Mutex<(bool, usize)>,
    changed: Condvar,
}

impl WriteGate {
    fn new() -> Self {
        Self {
            state: Mutex::new((true, 0)),
            changed: Condvar::new(),
        }
    }

    pub fn close(&self) {
        lock(&self.state).0 = false;
    }

    pub fn open(&self) {
        lock(&self.state).0 = true;
        self.changed.notify_all();
    }

    /// Wait until some write has reached the gate
    pub fn wait_for_writer(&self, timeout: Duration) -> bool {
        let state = lock(&self.state);
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |(_, entered)| *entered == 0)
            .unwrap();
        state.1 > 0
    }

    fn pass(&self) {
        let mut state = lock(&self.state);
        state.1 += 1;
        self.changed.notify_all();
        while !state.0 {
            state = self.changed.wait(state).unwrap();
        }
    }
}

/// Counters and captures from every sink the backend opened
#[derive(Debug, Clone, Default)]
pub struct SinkStats {
    opens: usize,
    stops: usize,
    releases: usize,
    plays: usize,
    pauses: usize,
    writes: usize,
    bytes: u64,
    writes_after_release: usize,
    bytes_before_first_play: Option<u64>,
    volumes: Vec<f32>,
    specs: Vec<FormatSpec>,
    data: Vec<u8>,
    last_play: Option<Instant>,
    playing: bool,
}

impl SinkStats {
    pub fn opens(&self) -> usize {
        self.opens
    }
    pub fn stops(&self) -> usize {
        self.stops
    }
    pub fn releases(&self) -> usize {
        self.releases
    }
    pub fn plays(&self) -> usize {
        self.plays
    }
    pub fn pauses(&self) -> usize {
        self.pauses
    }
    pub fn writes(&self) -> usize {
        self.writes
    }
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
    pub fn writes_after_release(&self) -> usize {
        self.writes_after_release
    }
    pub fn bytes_before_first_play(&self) -> Option<u64> {
        self.bytes_before_first_play
    }
    pub fn volumes(&self) -> Vec<f32> {
        self.volumes.clone()
    }
    pub fn specs(&self) -> Vec<FormatSpec> {
        self.specs.clone()
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

struct MockShared {
    stats: Mutex<SinkStats>,
    changed: Condvar,
    gate: WriteGate,
    min_buffer: Mutex<Option<usize>>,
    fail_open: AtomicBool,
    fail_after: Mutex<Option<u64>>,
    max_write: Mutex<Option<usize>>,
    write_delay: Mutex<Duration>,
    pending_hold: Mutex<Option<(usize, Duration)>>,
}

impl MockShared {
    fn update(&self, f: impl FnOnce(&mut SinkStats)) {
        f(&mut lock(&self.stats));
        self.changed.notify_all();
    }
}

/// Device backend that records everything and never touches hardware
pub struct MockBackend {
    shared: Arc<MockShared>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(MockShared {
                stats: Mutex::new(SinkStats::default()),
                changed: Condvar::new(),
                gate: WriteGate::new(),
                min_buffer: Mutex::new(Some(3840)),
                fail_open: AtomicBool::new(false),
                fail_after: Mutex::new(None),
                max_write: Mutex::new(None),
                write_delay: Mutex::new(Duration::ZERO),
                pending_hold: Mutex::new(None),
            }),
        }
    }

    pub fn gate(&self) -> &WriteGate {
        &self.shared.gate
    }

    pub fn stats(&self) -> SinkStats {
        lock(&self.shared.stats).clone()
    }

    pub fn set_minimum_buffer(&self, size: Option<usize>) {
        *lock(&self.shared.min_buffer) = size;
    }

    pub fn fail_open(&self, fail: bool) {
        self.shared.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Writes fail once this many bytes have been accepted
    pub fn fail_writes_after(&self, bytes: u64) {
        *lock(&self.shared.fail_after) = Some(bytes);
    }

    /// Accept at most `max` bytes per write
    pub fn set_max_write(&self, max: Option<usize>) {
        *lock(&self.shared.max_write) = max;
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *lock(&self.shared.write_delay) = delay;
    }

    /// Report `bytes` queued until the sink has been playing for `hold`
    /// since its most recent `play`
    pub fn set_pending_hold(&self, bytes: usize, hold: Duration) {
        *lock(&self.shared.pending_hold) = Some((bytes, hold));
    }

    pub fn wait_for(&self, condition: impl Fn(&SinkStats) -> bool, timeout: Duration) -> bool {
        let stats = lock(&self.shared.stats);
        let (stats, _) = self
            .shared
            .changed
            .wait_timeout_while(stats, timeout, |s| !condition(s))
            .unwrap();
        condition(&stats)
    }
}

impl DeviceBackend for MockBackend {
    fn minimum_buffer_size(&self, _spec: &FormatSpec) -> Option<usize> {
        *lock(&self.shared.min_buffer)
    }

    fn open(&self, spec: &FormatSpec) -> Result<Box<dyn DeviceSink>, PlayerError> {
        if self.shared.fail_open.load(Ordering::SeqCst) {
            return Err(PlayerError::Device("mock device refused to open".to_string()));
        }
        let spec = *spec;
        self.shared.update(|s| {
            s.opens += 1;
            s.specs.push(spec);
        });
        Ok(Box::new(MockSink {
            shared: Arc::clone(&self.shared),
            released: false,
        }))
    }
}

struct MockSink {
    shared: Arc<MockShared>,
    released: bool,
}

impl DeviceSink for MockSink {
    fn write(&mut self, data: &[u8]) -> Result<usize, PlayerError> {
        if self.released {
            self.shared.update(|s| s.writes_after_release += 1);
            return Err(PlayerError::Device("write after release".to_string()));
        }

        self.shared.gate.pass();
        let delay = *lock(&self.shared.write_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let limit = *lock(&self.shared.fail_after);
        if let Some(limit) = limit {
            if lock(&self.shared.stats).bytes >= limit {
                return Err(PlayerError::Device("mock write failure".to_string()));
            }
        }

        let accepted = match *lock(&self.shared.max_write) {
            Some(max) => data.len().min(max),
            None => data.len(),
        };
        self.shared.update(|s| {
            s.writes += 1;
            s.bytes += accepted as u64;
            s.data.extend_from_slice(&data[..accepted]);
        });
        Ok(accepted)
    }

    fn set_volume(&mut self, volume: f32) {
        self.shared.update(|s| s.volumes.push(volume));
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.shared.update(|s| {
            s.plays += 1;
            if s.bytes_before_first_play.is_none() {
                s.bytes_before_first_play = Some(s.bytes);
            }
            s.last_play = Some(Instant::now());
            s.playing = true;
        });
        Ok(())
    }

    fn pause(&mut self) {
        self.shared.update(|s| {
            s.pauses += 1;
            s.playing = false;
        });
    }

    fn pending_bytes(&self) -> usize {
        let Some((bytes, hold)) = *lock(&self.shared.pending_hold) else {
            return 0;
        };
        let stats = lock(&self.shared.stats);
        match stats.last_play {
            Some(at) if stats.playing && at.elapsed() >= hold => 0,
            _ => bytes,
        }
    }

    fn stop(&mut self) {
        self.shared.update(|s| s.stops += 1);
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.update(|s| s.releases += 1);
        }
    }
}

/// Focus service whose notifications are driven by the test
#[derive(Default)]
pub struct MockFocusService {
    holders: Mutex<HashMap<u64, FocusCallback>>,
    next_id: AtomicU64,
    requests: AtomicU64,
    deny: AtomicBool,
}

impl MockFocusService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Grants requested and not yet abandoned
    pub fn outstanding(&self) -> usize {
        lock(&self.holders).len()
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Deliver `change` to every current holder
    pub fn notify(&self, change: FocusChange) {
        let callbacks: Vec<FocusCallback> = lock(&self.holders).values().cloned().collect();
        for callback in callbacks {
            callback(change);
        }
    }
}

impl FocusService for MockFocusService {
    fn request(
        &self,
        _attributes: AudioAttributes,
        on_change: FocusCallback,
    ) -> Result<FocusGrant, PlayerError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(PlayerError::Device("audio focus denied".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.holders).insert(id, on_change);
        Ok(FocusGrant::new(id))
    }

    fn abandon(&self, grant: FocusGrant) {
        lock(&self.holders).remove(&grant.id());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Started,
    Stopped,
    Error(String),
    Progress(u64),
}

/// Listener that keeps every callback in order
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
    changed: Condvar,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ListenerEvent) {
        lock(&self.events).push(event);
        self.changed.notify_all();
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        lock(&self.events).clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ListenerEvent::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ListenerEvent::Progress(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &ListenerEvent) -> usize {
        lock(&self.events).iter().filter(|e| *e == event).count()
    }

    pub fn wait_for(&self, condition: impl Fn(&[ListenerEvent]) -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = lock(&self.events);
        while !condition(&events) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            events = self.changed.wait_timeout(events, deadline - now).unwrap().0;
        }
        true
    }

    pub fn wait_for_stopped(&self, count: usize, timeout: Duration) -> bool {
        self.wait_for(
            |events| events.iter().filter(|e| **e == ListenerEvent::Stopped).count() >= count,
            timeout,
        )
    }
}

impl PlaybackListener for RecordingListener {
    fn on_playback_started(&self) {
        self.push(ListenerEvent::Started);
    }

    fn on_playback_stopped(&self) {
        self.push(ListenerEvent::Stopped);
    }

    fn on_playback_error(&self, message: &str) {
        self.push(ListenerEvent::Error(message.to_string()));
    }

    fn on_playback_progress(&self, bytes_written: u64) {
        self.push(ListenerEvent::Progress(bytes_written));
    }
}
