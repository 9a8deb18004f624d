use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Environment variable selecting the log level
pub const LOG_LEVEL_ENV: &str = "WAVPLAY_LOG_LEVEL";

/// Number of events kept per engine
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Initialize logging with the level taken from `WAVPLAY_LOG_LEVEL`
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());

    let mut builder = env_logger::Builder::new();

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}:{}] {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    });

    builder.filter_level(parse_level(&log_level));
    builder.try_init()?;

    info!("Logging initialized with level: {}", log_level);
    Ok(())
}

/// Map a level name to a filter, defaulting to Info
pub fn parse_level(level: &str) -> log::LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventKind {
    Started,
    Stopped,
    Completed,
    Error,
    FocusChanged,
    Progress,
    ConfigChanged,
}

impl PlaybackEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackEventKind::Started => "PLAYBACK_STARTED",
            PlaybackEventKind::Stopped => "PLAYBACK_STOPPED",
            PlaybackEventKind::Completed => "PLAYBACK_COMPLETED",
            PlaybackEventKind::Error => "PLAYBACK_ERROR",
            PlaybackEventKind::FocusChanged => "FOCUS_CHANGED",
            PlaybackEventKind::Progress => "PROGRESS",
            PlaybackEventKind::ConfigChanged => "CONFIG_CHANGED",
        }
    }
}

/// A playback event kept for diagnostics
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: PlaybackEventKind,
    pub details: String,
}

/// Bounded, shareable history of playback events
#[derive(Clone)]
pub struct EventLog {
    events: Arc<Mutex<VecDeque<PlaybackEvent>>>,
    max_events: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events: max_events.max(1),
        }
    }

    /// Record an event and mirror it to the log facade
    pub fn record(&self, kind: PlaybackEventKind, details: impl Into<String>) {
        let details = details.into();

        match kind {
            PlaybackEventKind::Started
            | PlaybackEventKind::Stopped
            | PlaybackEventKind::Completed
            | PlaybackEventKind::ConfigChanged => info!("[{}] {}", kind.as_str(), details),
            PlaybackEventKind::FocusChanged => info!("[{}] {}", kind.as_str(), details),
            PlaybackEventKind::Progress => debug!("[{}] {}", kind.as_str(), details),
            PlaybackEventKind::Error => error!("[{}] {}", kind.as_str(), details),
        }

        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push_back(PlaybackEvent {
            timestamp: Utc::now(),
            kind,
            details,
        });
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn snapshot(&self) -> Vec<PlaybackEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.iter().cloned().collect()
    }

    pub fn count(&self, kind: PlaybackEventKind) -> usize {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.iter().filter(|event| event.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Timer utility for measuring operation durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: impl Into<String>) -> Self {
        let operation_name = operation_name.into();
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish_with_threshold(self, threshold: Duration) -> Duration {
        let duration = self.elapsed();
        if duration > threshold {
            warn!(
                "Operation '{}' took {}ms (threshold: {}ms)",
                self.operation_name,
                duration.as_millis(),
                threshold.as_millis()
            );
        } else {
            debug!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        }
        duration
    }
}
