use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, log, warn};

use crate::audio::focus::{
    FocusAction, FocusArbiter, FocusCallback, FocusChange, FocusService, TransientLossPolicy,
    FULL_VOLUME,
};
use crate::audio::params::{
    channel_mask, resolve_buffer_size, sample_format, validate_parameters, write_chunk_size,
};
use crate::audio::session::PlaybackSession;
use crate::audio::sink::{DeviceBackend, FormatSpec};
use crate::config::{PlaybackConfig, TransferMode};
use crate::error::PlayerError;
use crate::logging::{EventLog, OperationTimer, PlaybackEvent, PlaybackEventKind};
use crate::models::{EngineState, PlayerState};

/// Progress is reported each time this many more bytes reach the device
pub const PROGRESS_INTERVAL_BYTES: u64 = 1024 * 1024;

/// Largest payload accepted in STATIC transfer mode
pub const MAX_STATIC_BUFFER_BYTES: usize = 64 * 1024 * 1024;

/// Poll interval while waiting for the device to play out queued data
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Give up draining when queued data stops shrinking for this long
const DRAIN_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Receives playback lifecycle notifications.
///
/// Callbacks may arrive on the engine worker thread or on the thread that
/// called `play`/`stop`. They must not call back into the engine.
pub trait PlaybackListener: Send + Sync {
    fn on_playback_started(&self);
    fn on_playback_stopped(&self);
    /// `message` starts with a category tag such as `[FILE]`
    fn on_playback_error(&self, message: &str);
    fn on_playback_progress(&self, _bytes_written: u64) {}
}

enum EngineCommand {
    Start(PlaybackSession),
    Stop { ack: Sender<()> },
    FocusChanged { session_id: u64, change: FocusChange },
    Shutdown,
}

/// What the worker loop does next
enum Phase {
    /// Nothing to stream; block until a command arrives
    Waiting,
    Streaming,
    /// End of file reached, waiting for the device to play out
    Draining,
}

/// How a session ended on the worker
enum SessionEnd {
    Completed,
    FocusLost(FocusChange),
    Failed(PlayerError),
}

struct StateCell {
    state: EngineState,
    session_id: u64,
}

struct Shared {
    state: Mutex<StateCell>,
    listener: Mutex<Option<Arc<dyn PlaybackListener>>>,
    events: EventLog,
    bytes_written: AtomicU64,
    policy: TransientLossPolicy,
}

impl Shared {
    fn cell(&self) -> MutexGuard<'_, StateCell> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn listener(&self) -> Option<Arc<dyn PlaybackListener>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn begin_session(&self, session_id: u64) {
        let mut cell = self.cell();
        cell.state = EngineState::Preparing;
        cell.session_id = session_id;
    }

    fn set_state(&self, session_id: u64, state: EngineState) {
        let mut cell = self.cell();
        if cell.session_id == session_id {
            cell.state = state;
        }
    }

    /// Move `session_id` out of a live state. Only the caller that wins the
    /// transition notifies the listener.
    fn finish_session(&self, session_id: u64, state: EngineState) -> bool {
        let mut cell = self.cell();
        let live = matches!(cell.state, EngineState::Playing | EngineState::Stopping);
        if cell.session_id == session_id && live {
            cell.state = state;
            true
        } else {
            false
        }
    }

    fn notify_stopped(&self) {
        if let Some(listener) = self.listener() {
            listener.on_playback_stopped();
        }
    }

    fn report_error(&self, err: &PlayerError) {
        let message = err.tagged_message();
        log!(err.severity().log_level(), "Playback error: {}", err.user_message());
        self.events.record(PlaybackEventKind::Error, message.clone());
        if let Some(listener) = self.listener() {
            listener.on_playback_error(&message);
        }
    }
}

/// Streams one WAV file at a time to a device sink.
///
/// `play` and `stop` are serialized by a control lock. All file and device
/// I/O for a running session happens on the worker thread, which also
/// receives focus changes as commands.
pub struct PlaybackEngine {
    shared: Arc<Shared>,
    backend: Arc<dyn DeviceBackend>,
    focus: Arc<dyn FocusService>,
    config: Mutex<PlaybackConfig>,
    control: Mutex<u64>,
    commands: Sender<EngineCommand>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    released: AtomicBool,
}

impl PlaybackEngine {
    pub fn new(backend: Arc<dyn DeviceBackend>, focus: Arc<dyn FocusService>) -> Result<Self, PlayerError> {
        Self::with_policy(backend, focus, TransientLossPolicy::default())
    }

    pub fn with_policy(
        backend: Arc<dyn DeviceBackend>,
        focus: Arc<dyn FocusService>,
        policy: TransientLossPolicy,
    ) -> Result<Self, PlayerError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(StateCell {
                state: EngineState::Idle,
                session_id: 0,
            }),
            listener: Mutex::new(None),
            events: EventLog::default(),
            bytes_written: AtomicU64::new(0),
            policy,
        });

        let (command_tx, command_rx) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("playback-engine".to_string())
            .spawn(move || Worker::new(worker_shared, command_rx).run())
            .map_err(|e| PlayerError::Device(format!("Failed to create playback thread: {}", e)))?;

        debug!("Playback engine created (transient loss policy: {:?})", policy);

        Ok(Self {
            shared,
            backend,
            focus,
            config: Mutex::new(PlaybackConfig::default()),
            control: Mutex::new(0),
            commands: command_tx,
            worker: Mutex::new(Some(handle)),
            released: AtomicBool::new(false),
        })
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn PlaybackListener>>) {
        *self.shared.listener.lock().unwrap_or_else(|e| e.into_inner()) = listener;
    }

    /// Replace the current configuration. Rejected while a session is being
    /// prepared or is playing.
    pub fn set_config(&self, config: PlaybackConfig) -> bool {
        if let Err(e) = config.validate() {
            warn!("Rejecting configuration: {}", e);
            return false;
        }

        let cell = self.shared.cell();
        if !cell.state.accepts_config() {
            warn!(
                "Cannot change configuration while {}: '{}'",
                cell.state.as_str(),
                config.description
            );
            return false;
        }

        info!("Audio configuration updated: {}", config.description);
        debug!("{}", config.detailed_info());
        self.shared
            .events
            .record(PlaybackEventKind::ConfigChanged, config.description.clone());
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = config;
        true
    }

    pub fn config(&self) -> PlaybackConfig {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn state(&self) -> EngineState {
        self.shared.cell().state
    }

    pub fn player_state(&self) -> PlayerState {
        self.state().player_state()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == EngineState::Playing
    }

    /// Bytes handed to the device by the current or most recent session
    pub fn bytes_written(&self) -> u64 {
        self.shared.bytes_written.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.shared.events.snapshot()
    }

    /// Start playing the current configuration's file. Any running session
    /// is stopped first. Returns false when preparation failed; the error
    /// has then been reported to the listener.
    pub fn play(&self) -> bool {
        let mut next_id = self.control.lock().unwrap_or_else(|e| e.into_inner());
        if self.released.load(Ordering::Acquire) {
            warn!("play() called on a released engine");
            return false;
        }

        if self.state() == EngineState::Playing {
            info!("Already playing, stopping current session first");
            self.stop_locked();
        }

        *next_id += 1;
        let session_id = *next_id;
        self.shared.begin_session(session_id);
        self.shared.bytes_written.store(0, Ordering::Relaxed);

        let config = self.config();
        let timer = OperationTimer::new(format!("prepare session {}", session_id));
        let mut session = PlaybackSession::new(session_id, config, Arc::clone(&self.focus));

        if let Err(err) = self.prepare(&mut session) {
            self.fail_preparation(session, err);
            return false;
        }
        timer.finish_with_threshold(Duration::from_millis(500));

        self.shared.set_state(session_id, EngineState::Playing);
        self.shared.events.record(
            PlaybackEventKind::Started,
            format!(
                "{} ({})",
                session.config().audio_file_path.display(),
                session.config().description
            ),
        );
        if let Some(listener) = self.shared.listener() {
            listener.on_playback_started();
        }

        if let Err(mpsc::SendError(command)) = self.commands.send(EngineCommand::Start(session)) {
            if let EngineCommand::Start(session) = command {
                self.fail_preparation(
                    session,
                    PlayerError::Device("playback worker is not running".to_string()),
                );
            }
            return false;
        }

        true
    }

    fn prepare(&self, session: &mut PlaybackSession) -> Result<(), PlayerError> {
        let header = *session.open_reader()?;

        let on_change = self.focus_callback(session.id());
        session.request_focus(on_change)?;

        validate_parameters(&header)?;

        let config = session.config().clone();
        let mut spec = FormatSpec {
            sample_rate: header.sample_rate,
            channel_mask: channel_mask(header.channel_count),
            source_channels: header.channel_count,
            encoding: sample_format(header.bits_per_sample),
            buffer_size: 0,
            attributes: config.attributes(),
            transfer_mode: config.transfer_mode,
            performance_mode: config.performance_mode,
        };

        let device_min = self.backend.minimum_buffer_size(&spec).ok_or_else(|| {
            PlayerError::Param(format!(
                "device rejected {}Hz {} {}-bit",
                spec.sample_rate, spec.channel_mask, header.bits_per_sample
            ))
        })?;
        let mut buffer_size =
            resolve_buffer_size(device_min, config.buffer_multiplier, config.min_buffer_size);

        if config.transfer_mode == TransferMode::Static {
            if !header.has_known_length() {
                return Err(PlayerError::Param(
                    "static transfer needs a declared data size".to_string(),
                ));
            }
            let payload = header.data_size as usize;
            if payload > MAX_STATIC_BUFFER_BYTES {
                return Err(PlayerError::Param(format!(
                    "{} byte payload exceeds the {} byte static buffer limit",
                    payload, MAX_STATIC_BUFFER_BYTES
                )));
            }
            buffer_size = buffer_size.max(payload);
        }
        spec.buffer_size = buffer_size;

        let chunk_size = write_chunk_size(buffer_size, config.performance_mode, header.frame_size());
        let sink = self.backend.open(&spec)?;
        info!(
            "Device sink opened: {}Hz {} {:?}, buffer {} bytes (device minimum {}), writes of {} bytes",
            spec.sample_rate, spec.channel_mask, spec.encoding, buffer_size, device_min, chunk_size
        );
        session.attach_sink(sink, chunk_size);
        Ok(())
    }

    fn focus_callback(&self, session_id: u64) -> FocusCallback {
        let commands = self.commands.clone();
        Arc::new(move |change| {
            // The worker may already be gone during release
            let _ = commands.send(EngineCommand::FocusChanged { session_id, change });
        })
    }

    fn fail_preparation(&self, mut session: PlaybackSession, err: PlayerError) {
        session.teardown();
        self.shared.set_state(session.id(), EngineState::Error);
        self.shared.report_error(&err);
    }

    /// Stop the running session, if any, and wait until its resources are
    /// released. A no-op unless playing.
    pub fn stop(&self) {
        let _control = self.control.lock().unwrap_or_else(|e| e.into_inner());
        self.stop_locked();
    }

    fn stop_locked(&self) {
        let session_id = {
            let mut cell = self.shared.cell();
            if cell.state != EngineState::Playing {
                debug!("stop() ignored in state {}", cell.state.as_str());
                return;
            }
            cell.state = EngineState::Stopping;
            cell.session_id
        };

        let (ack_tx, ack_rx) = mpsc::channel();
        if self.commands.send(EngineCommand::Stop { ack: ack_tx }).is_ok() {
            // Resolves once the worker has torn the session down
            let _ = ack_rx.recv();
        } else {
            warn!("Playback worker is not running");
        }

        if self.shared.finish_session(session_id, EngineState::Idle) {
            self.shared
                .events
                .record(PlaybackEventKind::Stopped, format!("session {} stopped", session_id));
            self.shared.notify_stopped();
        }
    }

    /// Stop, detach the listener and shut the worker down. The engine
    /// cannot be used afterwards.
    pub fn release(&self) {
        let _control = self.control.lock().unwrap_or_else(|e| e.into_inner());
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        self.stop_locked();
        self.set_listener(None);
        let _ = self.commands.send(EngineCommand::Shutdown);

        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!("release() called from the playback worker, not joining");
            } else if handle.join().is_err() {
                error!("Playback worker panicked");
            }
        }
        info!("Playback engine released");
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owns the active session and runs the streaming loop
struct Worker {
    shared: Arc<Shared>,
    commands: Receiver<EngineCommand>,
    active: Option<PlaybackSession>,
    /// Focus changes that raced ahead of their session's Start command
    early_changes: Vec<(u64, FocusChange)>,
    next_progress: u64,
    drain_pending: usize,
    drain_since: Instant,
}

impl Worker {
    fn new(shared: Arc<Shared>, commands: Receiver<EngineCommand>) -> Self {
        Self {
            shared,
            commands,
            active: None,
            early_changes: Vec::new(),
            next_progress: PROGRESS_INTERVAL_BYTES,
            drain_pending: 0,
            drain_since: Instant::now(),
        }
    }

    fn phase(&self) -> Phase {
        match &self.active {
            None => Phase::Waiting,
            Some(session) if session.is_paused() => Phase::Waiting,
            Some(session) if session.reached_eof() => Phase::Draining,
            Some(_) => Phase::Streaming,
        }
    }

    fn run(mut self) {
        debug!("Playback worker started");
        loop {
            let command = match self.phase() {
                Phase::Waiting => self.commands.recv().ok(),
                Phase::Draining => match self.commands.recv_timeout(DRAIN_POLL_INTERVAL) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => {
                        self.poll_drain();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => None,
                },
                Phase::Streaming => match self.commands.try_recv() {
                    Ok(command) => Some(command),
                    Err(TryRecvError::Empty) => {
                        self.stream_chunk();
                        continue;
                    }
                    Err(TryRecvError::Disconnected) => None,
                },
            };

            match command {
                Some(EngineCommand::Start(session)) => self.start(session),
                Some(EngineCommand::Stop { ack }) => {
                    if let Some(mut session) = self.active.take() {
                        session.teardown();
                        info!(
                            "Session {} stopped after {} bytes",
                            session.id(),
                            session.bytes_written()
                        );
                    }
                    let _ = ack.send(());
                }
                Some(EngineCommand::FocusChanged { session_id, change }) => {
                    self.focus_changed(session_id, change)
                }
                Some(EngineCommand::Shutdown) | None => break,
            }
        }

        if let Some(mut session) = self.active.take() {
            session.teardown();
        }
        debug!("Playback worker exiting");
    }

    fn start(&mut self, mut session: PlaybackSession) {
        if let Some(mut previous) = self.active.take() {
            warn!("Session {} still active at start, tearing down", previous.id());
            previous.teardown();
        }

        self.next_progress = PROGRESS_INTERVAL_BYTES;
        let streaming = session.config().transfer_mode == TransferMode::Stream;
        if streaming {
            if let Err(err) = session.start_sink() {
                self.end_session(session, SessionEnd::Failed(err));
                return;
            }
        }

        info!(
            "Started playing {}, config: {}, write size: {} bytes",
            session
                .header()
                .map(|h| h.channel_description())
                .unwrap_or_default(),
            session.config().description,
            session.chunk_size()
        );

        let session_id = session.id();
        self.active = Some(session);

        let early: Vec<FocusChange> = self
            .early_changes
            .drain(..)
            .filter(|(id, _)| *id == session_id)
            .map(|(_, change)| change)
            .collect();
        for change in early {
            self.focus_changed(session_id, change);
        }
    }

    fn stream_chunk(&mut self) {
        let Some(session) = self.active.as_mut() else {
            return;
        };

        match session.pump() {
            Ok(0) => {
                if session.config().transfer_mode == TransferMode::Static && !session.sink_started() {
                    debug!("Static payload preloaded, starting sink");
                    if let Err(err) = session.start_sink() {
                        self.end_active(SessionEnd::Failed(err));
                        return;
                    }
                }
                self.drain_pending = session.pending_bytes();
                self.drain_since = Instant::now();
                self.poll_drain();
            }
            Ok(_) => {
                let total = session.bytes_written();
                self.shared.bytes_written.store(total, Ordering::Relaxed);
                if total >= self.next_progress {
                    let elapsed = session.elapsed();
                    while self.next_progress <= total {
                        self.next_progress += PROGRESS_INTERVAL_BYTES;
                    }
                    self.report_progress(total, elapsed);
                }
            }
            Err(err) => self.end_active(SessionEnd::Failed(err)),
        }
    }

    fn report_progress(&self, total: u64, elapsed: Duration) {
        let mib = total as f64 / (1024.0 * 1024.0);
        self.shared.events.record(
            PlaybackEventKind::Progress,
            format!("Playback progress: {:.1}MB, elapsed: {:.1}s", mib, elapsed.as_secs_f64()),
        );
        if let Some(listener) = self.shared.listener() {
            listener.on_playback_progress(total);
        }
    }

    /// Finish the session once the device has played out what it holds
    fn poll_drain(&mut self) {
        let Some(session) = self.active.as_ref() else {
            return;
        };

        let pending = session.pending_bytes();
        if pending == 0 {
            self.end_active(SessionEnd::Completed);
            return;
        }

        if pending < self.drain_pending {
            self.drain_pending = pending;
            self.drain_since = Instant::now();
        } else if self.drain_since.elapsed() >= DRAIN_STALL_TIMEOUT {
            warn!("Device stopped draining with {} bytes queued, finishing anyway", pending);
            self.end_active(SessionEnd::Completed);
        }
    }

    fn focus_changed(&mut self, session_id: u64, change: FocusChange) {
        let Some(session) = self.active.as_mut().filter(|s| s.id() == session_id) else {
            self.defer_or_ignore(session_id, change);
            return;
        };

        self.shared
            .events
            .record(PlaybackEventKind::FocusChanged, format!("{}", change));

        match FocusArbiter::action_for(change, self.shared.policy) {
            FocusAction::Restore => {
                session.set_volume(FULL_VOLUME);
                if session.is_paused() {
                    info!("Focus regained, resuming playback");
                    match session.resume() {
                        Ok(()) => {
                            // The stall window only covers time spent playing
                            self.drain_pending = session.pending_bytes();
                            self.drain_since = Instant::now();
                        }
                        Err(err) => self.end_active(SessionEnd::Failed(err)),
                    }
                }
            }
            FocusAction::Duck(volume) => {
                info!("Ducking playback to {:.0}% volume", volume * 100.0);
                session.set_volume(volume);
            }
            FocusAction::Pause => {
                info!("Transient focus loss, pausing playback");
                session.pause();
            }
            FocusAction::Stop => {
                info!("Focus lost ({}), stopping playback", change);
                self.end_active(SessionEnd::FocusLost(change));
            }
        }
    }

    /// A change can arrive before the Start command of the session it
    /// belongs to; keep it until then.
    fn defer_or_ignore(&mut self, session_id: u64, change: FocusChange) {
        let pending = {
            let cell = self.shared.cell();
            self.active.is_none()
                && cell.session_id == session_id
                && matches!(cell.state, EngineState::Preparing | EngineState::Playing)
        };
        if pending {
            debug!("Deferring {} until session {} starts", change, session_id);
            self.early_changes.push((session_id, change));
        } else {
            debug!("Ignoring {} for inactive session {}", change, session_id);
        }
    }

    fn end_active(&mut self, end: SessionEnd) {
        if let Some(session) = self.active.take() {
            self.end_session(session, end);
        }
    }

    /// Tear down first, then publish the outcome
    fn end_session(&mut self, mut session: PlaybackSession, end: SessionEnd) {
        let session_id = session.id();
        let total = session.bytes_written();
        let elapsed = session.elapsed();
        session.teardown();
        self.shared.bytes_written.store(total, Ordering::Relaxed);

        match end {
            SessionEnd::Completed => {
                let mib = total as f64 / (1024.0 * 1024.0);
                info!(
                    "Playback completed: {:.1}MB, total time: {:.1}s",
                    mib,
                    elapsed.as_secs_f64()
                );
                if self.shared.finish_session(session_id, EngineState::Idle) {
                    self.shared
                        .events
                        .record(PlaybackEventKind::Completed, format!("{} bytes", total));
                    self.shared.notify_stopped();
                }
            }
            SessionEnd::FocusLost(change) => {
                if self.shared.finish_session(session_id, EngineState::Idle) {
                    self.shared
                        .events
                        .record(PlaybackEventKind::Stopped, format!("focus lost: {}", change));
                    self.shared.notify_stopped();
                }
            }
            SessionEnd::Failed(err) => {
                if self.shared.finish_session(session_id, EngineState::Error) {
                    self.shared.report_error(&err);
                } else {
                    warn!("Error after session {} was stopped: {}", session_id, err);
                }
            }
        }
    }
}
