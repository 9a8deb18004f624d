use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::device::DeviceInfo;
use crate::audio::wave::WaveHeader;
use crate::cli::{CliApp, Commands, StatusDisplay};
use crate::config::PlaybackConfig;
use crate::models::{PlayerSnapshot, PlayerState};
use crate::test_support::wav_bytes;

fn parse(args: &[&str]) -> Result<Commands, clap::Error> {
    CliApp::try_parse_from(std::iter::once("wavplay").chain(args.iter().copied())).map(|app| app.command)
}

#[test]
fn test_parse_play_without_path() {
    match parse(&["play"]).unwrap() {
        Commands::Play { path, config, profile, device } => {
            assert!(path.is_none());
            assert!(config.is_none());
            assert!(profile.is_none());
            assert!(device.is_none());
        }
        other => panic!("Expected Play command, got {:?}", other),
    }
}

#[test]
fn test_parse_play_with_options() {
    let command = parse(&[
        "play",
        "/music/48k_2ch_16bit.wav",
        "--config",
        "configs.toml",
        "--profile",
        "Low latency",
        "-d",
        "USB DAC",
    ])
    .unwrap();

    match command {
        Commands::Play { path, config, profile, device } => {
            assert_eq!(path, Some(PathBuf::from("/music/48k_2ch_16bit.wav")));
            assert_eq!(config, Some(PathBuf::from("configs.toml")));
            assert_eq!(profile.as_deref(), Some("Low latency"));
            assert_eq!(device.as_deref(), Some("USB DAC"));
        }
        other => panic!("Expected Play command, got {:?}", other),
    }
}

#[test]
fn test_parse_info_requires_path() {
    assert!(parse(&["info"]).is_err());
    match parse(&["info", "a.wav"]).unwrap() {
        Commands::Info { path } => assert_eq!(path, PathBuf::from("a.wav")),
        other => panic!("Expected Info command, got {:?}", other),
    }
}

#[test]
fn test_parse_configs_and_devices() {
    assert!(matches!(parse(&["configs"]).unwrap(), Commands::Configs { config: None }));
    assert!(matches!(
        parse(&["configs", "-c", "x.json"]).unwrap(),
        Commands::Configs { config: Some(_) }
    ));
    assert!(matches!(parse(&["devices"]).unwrap(), Commands::Devices));
}

#[test]
fn test_parse_rejects_unknown_command() {
    assert!(parse(&["pause"]).is_err());
    assert!(parse(&[]).is_err());
}

#[test]
fn test_expand_path() {
    let plain = PathBuf::from("/tmp/a.wav");
    assert_eq!(CliApp::expand_path(&plain), plain);

    if let Some(home) = dirs::home_dir() {
        assert_eq!(CliApp::expand_path(&PathBuf::from("~/a.wav")), home.join("a.wav"));
        assert_eq!(CliApp::expand_path(&PathBuf::from("~")), home);
    }
}

#[test]
fn test_render_snapshot() {
    let playing = PlayerSnapshot::new(PlayerState::Playing, "Playing");
    assert_eq!(StatusDisplay::render_snapshot(&playing), "▶ Playing | Playing");

    let failed = PlayerSnapshot {
        state: PlayerState::Error,
        status: "Playback failed".to_string(),
        error: Some("[FILE] Cannot open audio file x.wav: not found".to_string()),
    };
    let line = StatusDisplay::render_snapshot(&failed);
    assert!(line.starts_with("✗ Error | Playback failed | The audio file could not be opened"));
    assert!(!line.contains("[FILE]"));
}

#[test]
fn test_friendly_error_untagged_passthrough() {
    assert_eq!(StatusDisplay::friendly_error("something odd"), "something odd");
    assert_eq!(
        StatusDisplay::friendly_error("[PARAM]"),
        "The audio format is not supported"
    );
}

#[test]
fn test_render_header() {
    let header = WaveHeader::parse(&wav_bytes(48000, 2, 16, &[0u8; 192_000])).unwrap();
    let lines = StatusDisplay::render_header(&header);

    assert!(lines.contains(&"Sample rate: 48000 Hz".to_string()));
    assert!(lines.contains(&"Format: PCM 16-bit".to_string()));
    assert!(lines.iter().any(|l| l.starts_with("Channels: 2")));
    assert!(lines.contains(&"Duration: 00:01".to_string()));
    assert!(!lines.iter().any(|l| l.starts_with("Warning")));
}

#[test]
fn test_render_configs() {
    assert_eq!(StatusDisplay::render_configs(&[]).len(), 1);

    let lines = StatusDisplay::render_configs(&[PlaybackConfig::default()]);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with(" 1. Default configuration (power saving mode) [MEDIA / STREAM / POWER_SAVING, x4]"));
}

#[test]
fn test_render_device() {
    let device = DeviceInfo {
        name: "Speakers".to_string(),
        is_default: true,
        max_channels: 2,
        min_sample_rate: 44100,
        max_sample_rate: 96000,
    };
    assert_eq!(
        StatusDisplay::render_device(&device),
        "* Speakers (up to 2 channels, 44100-96000 Hz)"
    );
}

#[test]
fn test_format_helpers() {
    assert_eq!(StatusDisplay::format_duration(Duration::from_secs(0)), "00:00");
    assert_eq!(StatusDisplay::format_duration(Duration::from_secs(3725)), "01:02:05");
    assert_eq!(StatusDisplay::format_file_size(512), "512 B");
    assert_eq!(StatusDisplay::format_file_size(1536), "1.5 KB");
    assert_eq!(StatusDisplay::truncate("Hello, World!", 8), "Hello...");
    assert_eq!(StatusDisplay::truncate("Hi", 1), "Hi");
    assert_eq!(StatusDisplay::create_progress_bar(0.5, 10), "█████░░░░░");
    assert_eq!(StatusDisplay::create_progress_bar(2.0, 4), "████");
}

#[test]
fn test_wrap_text() {
    let lines = StatusDisplay::wrap_text("one two three four", 9);
    assert_eq!(lines, vec!["one two", "three", "four"]);
    assert!(StatusDisplay::wrap_text("", 10).is_empty());
}
