use log::debug;
use tokio::sync::watch;

use crate::audio::engine::PlaybackListener;
use crate::models::{PlayerSnapshot, PlayerState};

pub const STATUS_READY: &str = "Ready";
pub const STATUS_PREPARING: &str = "Preparing";
pub const STATUS_PLAYING: &str = "Playing";
pub const STATUS_STOPPED: &str = "Stopped";
pub const STATUS_FAILED: &str = "Playback failed";

/// UI-facing projection of engine callbacks.
///
/// Holds the three-state [`PlayerState`], a status line and an optional
/// error detail. The error detail survives until `clear_error` or the next
/// playback attempt.
pub struct PlayerStateMachine {
    sender: watch::Sender<PlayerSnapshot>,
}

impl Default for PlayerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerStateMachine {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(PlayerSnapshot::new(PlayerState::Idle, STATUS_READY));
        Self { sender }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.sender.borrow().clone()
    }

    pub fn state(&self) -> PlayerState {
        self.sender.borrow().state
    }

    /// Receiver that sees every subsequent snapshot
    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.sender.subscribe()
    }

    /// Leave Error for Idle and drop the error detail
    pub fn clear_error(&self) {
        self.sender.send_modify(|snapshot| {
            if snapshot.state == PlayerState::Error {
                snapshot.state = PlayerState::Idle;
                snapshot.status = STATUS_READY.to_string();
            }
            snapshot.error = None;
        });
    }

    /// A new play request clears the previous failure first
    pub fn begin_attempt(&self) {
        self.sender.send_modify(|snapshot| {
            if snapshot.state == PlayerState::Error {
                snapshot.state = PlayerState::Idle;
            }
            snapshot.error = None;
            snapshot.status = STATUS_PREPARING.to_string();
        });
    }

    /// Report a refused request without changing state
    pub fn reject(&self, status: impl Into<String>, detail: impl Into<String>) {
        let status = status.into();
        let detail = detail.into();
        debug!("Request rejected: {}", detail);
        self.sender.send_modify(|snapshot| {
            snapshot.status = status;
            snapshot.error = Some(detail);
        });
    }

    /// Replace the status line only
    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.sender.send_modify(|snapshot| snapshot.status = status);
    }

    fn transition(&self, state: PlayerState, status: &str, error: Option<String>) {
        self.sender.send_modify(|snapshot| {
            debug!("Player state: {} -> {}", snapshot.state.as_str(), state.as_str());
            snapshot.state = state;
            snapshot.status = status.to_string();
            snapshot.error = error;
        });
    }
}

impl PlaybackListener for PlayerStateMachine {
    fn on_playback_started(&self) {
        self.transition(PlayerState::Playing, STATUS_PLAYING, None);
    }

    fn on_playback_stopped(&self) {
        self.transition(PlayerState::Idle, STATUS_STOPPED, None);
    }

    fn on_playback_error(&self, message: &str) {
        self.transition(PlayerState::Error, STATUS_FAILED, Some(message.to_string()));
    }

    fn on_playback_progress(&self, bytes_written: u64) {
        let mib = bytes_written as f64 / (1024.0 * 1024.0);
        self.sender.send_modify(|snapshot| {
            if snapshot.state == PlayerState::Playing {
                snapshot.status = format!("{} ({:.1} MB)", STATUS_PLAYING, mib);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let machine = PlayerStateMachine::new();
        let snapshot = machine.snapshot();
        assert_eq!(snapshot.state, PlayerState::Idle);
        assert_eq!(snapshot.status, STATUS_READY);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn test_callbacks_drive_state() {
        let machine = PlayerStateMachine::new();

        machine.on_playback_started();
        assert_eq!(machine.state(), PlayerState::Playing);

        machine.on_playback_progress(3 * 1024 * 1024);
        assert_eq!(machine.snapshot().status, "Playing (3.0 MB)");

        machine.on_playback_stopped();
        assert_eq!(machine.state(), PlayerState::Idle);
        assert_eq!(machine.snapshot().status, STATUS_STOPPED);
    }

    #[test]
    fn test_error_sticks_until_cleared() {
        let machine = PlayerStateMachine::new();
        machine.on_playback_error("[FILE] Cannot open audio file");

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.state, PlayerState::Error);
        assert_eq!(snapshot.status, STATUS_FAILED);
        assert_eq!(snapshot.error.as_deref(), Some("[FILE] Cannot open audio file"));

        // Progress from a stale session does not touch an error
        machine.on_playback_progress(1024 * 1024);
        assert_eq!(machine.snapshot().status, STATUS_FAILED);

        machine.clear_error();
        let snapshot = machine.snapshot();
        assert_eq!(snapshot.state, PlayerState::Idle);
        assert_eq!(snapshot.status, STATUS_READY);
        assert!(!snapshot.has_error());
    }

    #[test]
    fn test_begin_attempt_clears_error() {
        let machine = PlayerStateMachine::new();
        machine.on_playback_error("[STREAM] device lost");
        machine.begin_attempt();

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.state, PlayerState::Idle);
        assert_eq!(snapshot.status, STATUS_PREPARING);
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn test_reject_keeps_state() {
        let machine = PlayerStateMachine::new();
        machine.on_playback_started();
        machine.reject("Stop playback first", "configuration locked while playing");

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.state, PlayerState::Playing);
        assert_eq!(snapshot.status, "Stop playback first");
        assert!(snapshot.has_error());
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let machine = PlayerStateMachine::new();
        let mut receiver = machine.subscribe();

        machine.on_playback_started();
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().state, PlayerState::Playing);

        machine.on_playback_error("[PARAM] bad rate");
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().state, PlayerState::Error);
    }
}
