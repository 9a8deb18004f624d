use std::fmt;
use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub mod loader;

pub use loader::{ConfigLoader, FileConfigLoader, StaticConfigLoader};

/// Default WAV file played when a configuration does not name one
pub const DEFAULT_AUDIO_FILE: &str = "/data/48k_2ch_16bit.wav";

/// Default buffer floor in bytes
pub const DEFAULT_MIN_BUFFER_SIZE: usize = 960;

/// Default multiplier applied to the device minimum buffer
pub const DEFAULT_BUFFER_MULTIPLIER: u32 = 4;

/// Declares a configuration enum that is written as an upper-case name and
/// parsed leniently: case-insensitive, with or without the family prefix,
/// falling back to the default variant for unknown names.
macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $name:ident, prefix = $prefix:literal, default = $default:ident {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Short upper-case name, e.g. `MEDIA`
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Fully-qualified name, e.g. `USAGE_MEDIA`
            pub fn qualified_name(&self) -> String {
                format!("{}{}", $prefix, self.name())
            }

            /// Parse a name, returning `None` when it is not recognised
            pub fn parse(value: &str) -> Option<Self> {
                let upper = value.trim().to_uppercase();
                let bare = upper.strip_prefix($prefix).unwrap_or(&upper);
                Self::ALL.iter().copied().find(|v| v.name() == bare)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::parse(&value).unwrap_or_else(|| {
                    warn!(
                        "Unknown {} value '{}', using {}",
                        stringify!($name),
                        value,
                        $name::$default.name()
                    );
                    $name::$default
                })
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.name().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.qualified_name())
            }
        }
    };
}

named_enum! {
    /// Why the stream is played; drives focus arbitration between streams
    Usage, prefix = "USAGE_", default = Media {
        Unknown => "UNKNOWN",
        Media => "MEDIA",
        VoiceCommunication => "VOICE_COMMUNICATION",
        VoiceCommunicationSignalling => "VOICE_COMMUNICATION_SIGNALLING",
        Alarm => "ALARM",
        Notification => "NOTIFICATION",
        NotificationRingtone => "NOTIFICATION_RINGTONE",
        NotificationEvent => "NOTIFICATION_EVENT",
        AssistanceAccessibility => "ASSISTANCE_ACCESSIBILITY",
        AssistanceNavigationGuidance => "ASSISTANCE_NAVIGATION_GUIDANCE",
        AssistanceSonification => "ASSISTANCE_SONIFICATION",
        Game => "GAME",
        Assistant => "ASSISTANT",
        Emergency => "EMERGENCY",
        Safety => "SAFETY",
        VehicleStatus => "VEHICLE_STATUS",
        Announcement => "ANNOUNCEMENT",
        SpeakerCleanup => "SPEAKER_CLEANUP",
    }
}

named_enum! {
    /// What kind of content the stream carries
    ContentType, prefix = "CONTENT_TYPE_", default = Music {
        Unknown => "UNKNOWN",
        Music => "MUSIC",
        Movie => "MOVIE",
        Speech => "SPEECH",
        Sonification => "SONIFICATION",
    }
}

named_enum! {
    /// STREAM pushes data incrementally, STATIC preloads the whole payload
    TransferMode, prefix = "MODE_", default = Stream {
        Stream => "STREAM",
        Static => "STATIC",
    }
}

named_enum! {
    /// Latency/power tradeoff hint used for buffer sizing
    PerformanceMode, prefix = "PERFORMANCE_MODE_", default = PowerSaving {
        LowLatency => "LOW_LATENCY",
        PowerSaving => "POWER_SAVING",
        None => "NONE",
    }
}

/// Device attribute hints passed to focus arbitration and the device sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioAttributes {
    pub usage: Usage,
    pub content_type: ContentType,
}

/// One playback scenario. Immutable once handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub usage: Usage,
    #[serde(alias = "contentType")]
    pub content_type: ContentType,
    #[serde(alias = "transferMode")]
    pub transfer_mode: TransferMode,
    #[serde(alias = "performanceMode")]
    pub performance_mode: PerformanceMode,
    #[serde(alias = "bufferMultiplier")]
    pub buffer_multiplier: u32,
    #[serde(alias = "audioFilePath")]
    pub audio_file_path: PathBuf,
    #[serde(alias = "minBufferSize")]
    pub min_buffer_size: usize,
    pub description: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            usage: Usage::Media,
            content_type: ContentType::Music,
            transfer_mode: TransferMode::Stream,
            performance_mode: PerformanceMode::PowerSaving,
            buffer_multiplier: DEFAULT_BUFFER_MULTIPLIER,
            audio_file_path: PathBuf::from(DEFAULT_AUDIO_FILE),
            min_buffer_size: DEFAULT_MIN_BUFFER_SIZE,
            description: "Default configuration (power saving mode)".to_string(),
        }
    }
}

impl PlaybackConfig {
    pub fn attributes(&self) -> AudioAttributes {
        AudioAttributes {
            usage: self.usage,
            content_type: self.content_type,
        }
    }

    /// Copy of this configuration playing a different file
    pub fn with_file(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            audio_file_path: path.into(),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_multiplier == 0 {
            return Err(ConfigError::Invalid(format!(
                "'{}': buffer multiplier must be at least 1",
                self.description
            )));
        }
        if self.audio_file_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "'{}': audio file path is empty",
                self.description
            )));
        }
        Ok(())
    }

    /// Multi-line human-readable summary
    pub fn detailed_info(&self) -> String {
        format!(
            "Configuration: {}\n\
             Usage: {}\n\
             Content Type: {}\n\
             Transfer Mode: {}\n\
             Performance Mode: {}\n\
             Buffer Multiplier: {}x\n\
             Audio File: {}\n\
             Min Buffer Size: {} bytes",
            self.description,
            self.usage,
            self.content_type,
            self.transfer_mode,
            self.performance_mode,
            self.buffer_multiplier,
            self.audio_file_path.display(),
            self.min_buffer_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_config_default() {
        let config = PlaybackConfig::default();

        assert_eq!(config.usage, Usage::Media);
        assert_eq!(config.content_type, ContentType::Music);
        assert_eq!(config.transfer_mode, TransferMode::Stream);
        assert_eq!(config.performance_mode, PerformanceMode::PowerSaving);
        assert_eq!(config.buffer_multiplier, 4);
        assert_eq!(config.min_buffer_size, 960);
        assert_eq!(config.audio_file_path, PathBuf::from(DEFAULT_AUDIO_FILE));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lenient_enum_parsing() {
        assert_eq!(Usage::parse("media"), Some(Usage::Media));
        assert_eq!(Usage::parse("USAGE_ALARM"), Some(Usage::Alarm));
        assert_eq!(PerformanceMode::parse("low_latency"), Some(PerformanceMode::LowLatency));
        assert_eq!(TransferMode::parse("MODE_STATIC"), Some(TransferMode::Static));
        assert_eq!(ContentType::parse("CONTENT_TYPE_SPEECH"), Some(ContentType::Speech));
        assert_eq!(Usage::parse("bogus"), None);
    }

    #[test]
    fn test_unknown_enum_falls_back_to_default() {
        assert_eq!(Usage::from("NOT_A_USAGE".to_string()), Usage::Media);
        assert_eq!(PerformanceMode::from(String::new()), PerformanceMode::PowerSaving);
    }

    #[test]
    fn test_toml_round_trip_uses_names() {
        let config = PlaybackConfig {
            usage: Usage::Game,
            performance_mode: PerformanceMode::LowLatency,
            buffer_multiplier: 2,
            description: "Low latency".to_string(),
            ..PlaybackConfig::default()
        };

        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("usage = \"GAME\""));
        assert!(text.contains("performance_mode = \"LOW_LATENCY\""));

        let parsed: PlaybackConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_json_camel_case_fields_accepted() {
        let json = r#"{
            "usage": "MEDIA",
            "contentType": "MOVIE",
            "transferMode": "STATIC",
            "performanceMode": "NONE",
            "bufferMultiplier": 8,
            "audioFilePath": "/tmp/a.wav",
            "minBufferSize": 1920,
            "description": "Movie"
        }"#;

        let config: PlaybackConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.content_type, ContentType::Movie);
        assert_eq!(config.transfer_mode, TransferMode::Static);
        assert_eq!(config.performance_mode, PerformanceMode::None);
        assert_eq!(config.buffer_multiplier, 8);
        assert_eq!(config.audio_file_path, PathBuf::from("/tmp/a.wav"));
        assert_eq!(config.min_buffer_size, 1920);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: PlaybackConfig = toml::from_str("description = \"Only a name\"").unwrap();
        assert_eq!(config.description, "Only a name");
        assert_eq!(config.buffer_multiplier, DEFAULT_BUFFER_MULTIPLIER);
        assert_eq!(config.usage, Usage::Media);
    }

    #[test]
    fn test_validate_rejects_zero_multiplier() {
        let config = PlaybackConfig {
            buffer_multiplier: 0,
            ..PlaybackConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_detailed_info_lists_every_field() {
        let info = PlaybackConfig::default().detailed_info();
        assert!(info.contains("USAGE_MEDIA"));
        assert!(info.contains("CONTENT_TYPE_MUSIC"));
        assert!(info.contains("MODE_STREAM"));
        assert!(info.contains("PERFORMANCE_MODE_POWER_SAVING"));
        assert!(info.contains("4x"));
        assert!(info.contains("960 bytes"));
    }

    #[test]
    fn test_with_file_keeps_other_fields() {
        let config = PlaybackConfig::default().with_file("/music/a.wav");
        assert_eq!(config.audio_file_path, PathBuf::from("/music/a.wav"));
        assert_eq!(config.description, PlaybackConfig::default().description);
    }
}
