use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod status;
pub use status::StatusDisplay;

#[cfg(test)]
mod tests;

/// WAV PCM streaming player
#[derive(Debug, Parser)]
#[command(name = "wavplay")]
#[command(about = "Stream canonical PCM WAV files to an audio output device")]
#[command(version)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Play a WAV file until it ends or Ctrl-C is pressed
    Play {
        /// File to play; defaults to the selected configuration's file
        path: Option<PathBuf>,
        /// Configuration file (.toml or .json) with a `configs` list
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Pick a configuration by its description
        #[arg(short, long)]
        profile: Option<String>,
        /// Output device name; defaults to the system default output
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Print the header of a WAV file
    Info {
        /// WAV file to inspect
        path: PathBuf,
    },
    /// List the available playback configurations
    Configs {
        /// Configuration file (.toml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List audio output devices
    Devices,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand a leading `~` to the home directory
    pub fn expand_path(path: &std::path::Path) -> PathBuf {
        let Some(text) = path.to_str() else {
            return path.to_path_buf();
        };
        if let Some(rest) = text.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        } else if text == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
        path.to_path_buf()
    }
}
