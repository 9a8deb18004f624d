pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod player;

#[cfg(test)]
pub(crate) mod test_support;


pub use error::{ErrorCategory, PlayerError};
pub use models::{EngineState, PlayerSnapshot, PlayerState};
