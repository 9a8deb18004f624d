use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Cannot open audio file {}: {kind}", .path.display())]
    File {
        path: PathBuf,
        kind: FileErrorKind,
        #[source]
        source: io::Error,
    },

    #[error("Invalid WAV format: {0}")]
    Format(String),

    #[error("Unsupported audio parameters: {0}")]
    Param(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Stream I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Sub-kind of a file open failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorKind {
    NotFound,
    PermissionDenied,
    Other,
}

impl FileErrorKind {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => FileErrorKind::PermissionDenied,
            _ => FileErrorKind::Other,
        }
    }
}

impl fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileErrorKind::NotFound => write!(f, "file not found"),
            FileErrorKind::PermissionDenied => write!(f, "permission denied"),
            FileErrorKind::Other => write!(f, "cannot be read"),
        }
    }
}

impl PlayerError {
    /// Build a file error from the I/O failure that caused it
    pub fn file(path: &Path, source: io::Error) -> Self {
        PlayerError::File {
            path: path.to_path_buf(),
            kind: FileErrorKind::from_io(&source),
            source,
        }
    }

    /// Coarse category used to tag listener messages
    pub fn category(&self) -> ErrorCategory {
        match self {
            PlayerError::File { kind: FileErrorKind::PermissionDenied, .. } => ErrorCategory::Permission,
            PlayerError::File { .. } | PlayerError::Format(_) => ErrorCategory::File,
            PlayerError::Param(_) | PlayerError::Config(_) => ErrorCategory::Param,
            PlayerError::Device(_) | PlayerError::Io(_) => ErrorCategory::Stream,
        }
    }

    /// Error text prefixed with its category tag, e.g. `[FILE] Cannot open ...`
    pub fn tagged_message(&self) -> String {
        format!("{} {}", self.category().tag(), self)
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::File { path, kind, .. } => match kind {
                FileErrorKind::NotFound => format!("Audio file '{}' does not exist", path.display()),
                FileErrorKind::PermissionDenied => {
                    format!("Permission denied - cannot read '{}'", path.display())
                }
                FileErrorKind::Other => format!("Audio file '{}' cannot be opened", path.display()),
            },
            PlayerError::Format(msg) => format!("The file is not a playable WAV file: {}", msg),
            PlayerError::Param(msg) => format!("Audio parameters are not supported: {}", msg),
            PlayerError::Device(msg) => format!("Audio output is unavailable: {}", msg),
            PlayerError::Io(msg) => format!("Playback interrupted: {}", msg),
            PlayerError::Config(err) => err.user_message(),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlayerError::File { kind: FileErrorKind::PermissionDenied, .. } => vec![
                "Check file permissions".to_string(),
                "Ensure the file is not locked by another application".to_string(),
            ],
            PlayerError::File { .. } => vec![
                "Check that the file path is correct".to_string(),
                "Try using an absolute path instead of a relative path".to_string(),
            ],
            PlayerError::Format(_) => vec![
                "Only canonical 44-byte header PCM WAV files are supported".to_string(),
                "Re-export the file as uncompressed PCM WAV".to_string(),
            ],
            PlayerError::Param(_) => vec![
                "Supported: 8000-192000 Hz, 1-16 channels, 8/16/24/32-bit".to_string(),
                "Check that the output device supports the file's rate and channel count".to_string(),
            ],
            PlayerError::Device(_) => vec![
                "Another application may be holding the audio output".to_string(),
                "Check audio device connections and try again".to_string(),
            ],
            PlayerError::Io(_) => vec![
                "Check that the file is completely copied".to_string(),
                "Start playback again".to_string(),
            ],
            PlayerError::Config(err) => err.recovery_suggestions(),
        }
    }

    /// Check if retrying the same operation can succeed without user changes
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::File { .. } => false,
            PlayerError::Format(_) => false,
            PlayerError::Param(_) => false,
            PlayerError::Device(_) => true, // Focus or device may become available
            PlayerError::Io(_) => true,
            PlayerError::Config(err) => err.is_recoverable(),
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::File { .. } | PlayerError::Format(_) | PlayerError::Param(_) => ErrorSeverity::Error,
            PlayerError::Device(_) | PlayerError::Io(_) => ErrorSeverity::Critical,
        }
    }
}

/// Coarse error category rendered as a message tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    File,
    Stream,
    Permission,
    Param,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 4] = [
        ErrorCategory::File,
        ErrorCategory::Stream,
        ErrorCategory::Permission,
        ErrorCategory::Param,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            ErrorCategory::File => "[FILE]",
            ErrorCategory::Stream => "[STREAM]",
            ErrorCategory::Permission => "[PERMISSION]",
            ErrorCategory::Param => "[PARAM]",
        }
    }

    /// Split a tagged message into its category and the remaining text.
    ///
    /// Untagged messages yield `None`, so a presentation layer can fall back
    /// to showing the raw text.
    pub fn split_tagged(message: &str) -> Option<(ErrorCategory, &str)> {
        let trimmed = message.trim_start();
        Self::ALL.iter().find_map(|category| {
            trimmed
                .strip_prefix(category.tag())
                .map(|rest| (*category, rest.trim_start()))
        })
    }

    /// Short message suitable for a status line
    pub fn friendly_message(&self) -> &'static str {
        match self {
            ErrorCategory::File => "The audio file could not be opened",
            ErrorCategory::Stream => "Audio playback was interrupted",
            ErrorCategory::Permission => "Permission to read the audio file was denied",
            ErrorCategory::Param => "The audio format is not supported",
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("Unsupported configuration file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::Io(err) => format!("Cannot access configuration file: {}", err),
            ConfigError::TomlParse(_) | ConfigError::JsonParse(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
            ConfigError::TomlWrite(_) => "Failed to save configuration settings".to_string(),
            ConfigError::UnsupportedFormat { extension } => {
                format!("Configuration files ending in '{}' are not supported", extension)
            }
            ConfigError::Invalid(msg) => format!("Configuration is invalid: {}", msg),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::Io(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::TomlParse(_) | ConfigError::JsonParse(_) => vec![
                "The file must contain a top-level 'configs' list".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
            ConfigError::TomlWrite(_) => vec!["Try saving the configuration again".to_string()],
            ConfigError::UnsupportedFormat { .. } => {
                vec!["Use a .toml or .json configuration file".to_string()]
            }
            ConfigError::Invalid(_) => vec!["Buffer multiplier must be at least 1".to_string()],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            ConfigError::Io(_) => true, // Can retry or use defaults
            ConfigError::TomlParse(_) | ConfigError::JsonParse(_) => true, // Can use defaults
            ConfigError::TomlWrite(_) => true,
            ConfigError::UnsupportedFormat { .. } => false,
            ConfigError::Invalid(_) => false,
        }
    }
}
