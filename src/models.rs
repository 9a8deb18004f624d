use serde::{Deserialize, Serialize};

/// UI-facing player state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayerState {
    #[default]
    Idle,
    Playing,
    Error,
}

impl PlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "Idle",
            PlayerState::Playing => "Playing",
            PlayerState::Error => "Error",
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::Playing)
    }
}

/// Internal engine state, a refinement of [`PlayerState`] with transient phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Preparing,
    Playing,
    Stopping,
    Error,
}

impl EngineState {
    /// Projection onto the three states the UI observes
    pub fn player_state(&self) -> PlayerState {
        match self {
            EngineState::Idle | EngineState::Preparing | EngineState::Stopping => PlayerState::Idle,
            EngineState::Playing => PlayerState::Playing,
            EngineState::Error => PlayerState::Error,
        }
    }

    /// Configuration may only change when no session is being set up or running
    pub fn accepts_config(&self) -> bool {
        !matches!(self, EngineState::Preparing | EngineState::Playing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Preparing => "preparing",
            EngineState::Playing => "playing",
            EngineState::Stopping => "stopping",
            EngineState::Error => "error",
        }
    }
}

/// What the presentation layer renders
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    pub status: String,
    pub error: Option<String>,
}

impl PlayerSnapshot {
    pub fn new(state: PlayerState, status: impl Into<String>) -> Self {
        Self {
            state,
            status: status.into(),
            error: None,
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
