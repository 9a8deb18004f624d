pub mod state;

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::watch;

use crate::audio::engine::PlaybackEngine;
use crate::config::loader::ConfigLoader;
use crate::config::PlaybackConfig;
use crate::models::{PlayerSnapshot, PlayerState};

pub use state::PlayerStateMachine;

const LOCKED_WHILE_PLAYING: &str = "Stop playback before changing the configuration";

/// Ties the engine, the observable player state and the configuration list
/// together for a presentation layer.
pub struct PlayerController {
    engine: PlaybackEngine,
    state: Arc<PlayerStateMachine>,
    loader: Box<dyn ConfigLoader>,
    configs: Vec<PlaybackConfig>,
    current: Option<usize>,
}

impl PlayerController {
    /// Attach a state machine to `engine` and load the configuration list.
    /// The first loaded configuration becomes current.
    pub fn new(engine: PlaybackEngine, loader: Box<dyn ConfigLoader>) -> Self {
        let state = Arc::new(PlayerStateMachine::new());
        engine.set_listener(Some(state.clone()));

        let mut controller = Self {
            engine,
            state,
            loader,
            configs: Vec::new(),
            current: None,
        };
        controller.reload_configs();
        controller
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.state.subscribe()
    }

    pub fn available_configs(&self) -> &[PlaybackConfig] {
        &self.configs
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Configuration the next `start_playback` will use
    pub fn current_config(&self) -> PlaybackConfig {
        self.engine.config()
    }

    fn is_playing(&self) -> bool {
        self.state.state() == PlayerState::Playing || self.engine.is_playing()
    }

    /// Re-read the configuration list. Refused while playing.
    pub fn reload_configs(&mut self) -> bool {
        if self.is_playing() {
            self.state
                .reject(LOCKED_WHILE_PLAYING, "configurations cannot be reloaded while playing");
            return false;
        }

        self.configs = self.loader.load_configs();
        self.current = None;
        if self.configs.is_empty() {
            warn!("No audio configurations loaded, using the default configuration");
            return true;
        }

        info!("Loaded {} audio configurations", self.configs.len());
        self.set_config(0)
    }

    /// Make the configuration at `index` current. Refused while playing.
    pub fn set_config(&mut self, index: usize) -> bool {
        if self.is_playing() {
            self.state
                .reject(LOCKED_WHILE_PLAYING, "configuration cannot change while playing");
            return false;
        }

        let Some(config) = self.configs.get(index).cloned() else {
            warn!("No configuration at index {}", index);
            return false;
        };

        let description = config.description.clone();
        if !self.engine.set_config(config) {
            self.state
                .reject("Configuration rejected", format!("'{}' is not valid", description));
            return false;
        }

        self.current = Some(index);
        self.state.set_status(format!("Configuration: {}", description));
        true
    }

    /// Select a configuration by its description, ignoring case
    pub fn select_config(&mut self, description: &str) -> bool {
        let position = self
            .configs
            .iter()
            .position(|c| c.description.eq_ignore_ascii_case(description));
        match position {
            Some(index) => self.set_config(index),
            None => {
                warn!("No configuration named '{}'", description);
                false
            }
        }
    }

    /// Use a configuration that is not part of the loaded list
    pub fn use_config(&mut self, config: PlaybackConfig) -> bool {
        if self.is_playing() {
            self.state
                .reject(LOCKED_WHILE_PLAYING, "configuration cannot change while playing");
            return false;
        }
        if self.engine.set_config(config) {
            self.current = None;
            true
        } else {
            false
        }
    }

    pub fn start_playback(&self) -> bool {
        self.state.begin_attempt();
        self.engine.play()
    }

    pub fn stop_playback(&self) {
        self.engine.stop();
    }

    pub fn clear_error(&self) {
        self.state.clear_error();
    }

    /// Stop playback and shut the engine down
    pub fn shutdown(&self) {
        self.engine.release();
    }
}
