use std::time::Duration;

use crate::audio::device::DeviceInfo;
use crate::audio::wave::WaveHeader;
use crate::config::PlaybackConfig;
use crate::error::{ErrorCategory, ErrorSeverity, PlayerError};
use crate::models::{PlayerSnapshot, PlayerState};

const BOX_WIDTH: usize = 55;

/// Terminal rendering for the CLI. `render_*` build the text, `display_*`
/// print it.
pub struct StatusDisplay;

impl StatusDisplay {
    /// One line: state icon, status and error detail if any
    pub fn render_snapshot(snapshot: &PlayerSnapshot) -> String {
        let mut line = format!("{} | {}", Self::format_player_state(snapshot.state), snapshot.status);
        if let Some(error) = &snapshot.error {
            line.push_str(" | ");
            line.push_str(&Self::friendly_error(error));
        }
        line
    }

    pub fn display_snapshot(snapshot: &PlayerSnapshot) {
        println!("{}", Self::render_snapshot(snapshot));
    }

    /// Presentation text for a tagged listener message.
    ///
    /// Untagged messages are shown as they are.
    pub fn friendly_error(message: &str) -> String {
        match ErrorCategory::split_tagged(message) {
            Some((category, detail)) if !detail.is_empty() => {
                format!("{} ({})", category.friendly_message(), detail)
            }
            Some((category, _)) => category.friendly_message().to_string(),
            None => message.to_string(),
        }
    }

    pub fn render_header(header: &WaveHeader) -> Vec<String> {
        let mut lines = vec![
            format!("Format: PCM {}-bit", header.bits_per_sample),
            format!("Sample rate: {} Hz", header.sample_rate),
            format!("Channels: {} ({})", header.channel_count, header.channel_description()),
            format!("Layout: {}", header.channel_layout()),
            format!("Block align: {} bytes", header.block_align),
            format!("Byte rate: {} bytes/s", header.byte_rate),
        ];
        if header.has_known_length() {
            lines.push(format!("Data: {}", Self::format_file_size(header.data_size as u64)));
            lines.push(format!("Duration: {}", Self::format_duration(header.duration())));
        } else {
            lines.push("Data: unknown length (streamed to end of file)".to_string());
        }
        if !header.is_consistent() {
            lines.push("Warning: byte rate or block align disagrees with the format".to_string());
        }
        lines
    }

    pub fn display_header(path: &std::path::Path, header: &WaveHeader) {
        println!("┌─ {} ", Self::truncate(&path.display().to_string(), BOX_WIDTH));
        for line in Self::render_header(header) {
            println!("│ {}", line);
        }
        println!("└{}", "─".repeat(BOX_WIDTH + 2));
    }

    pub fn render_configs(configs: &[PlaybackConfig]) -> Vec<String> {
        if configs.is_empty() {
            return vec!["No configurations found, the default configuration is used".to_string()];
        }
        configs
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "{:>2}. {} [{} / {} / {}, x{}] {}",
                    i + 1,
                    c.description,
                    c.usage.name(),
                    c.transfer_mode.name(),
                    c.performance_mode.name(),
                    c.buffer_multiplier,
                    c.audio_file_path.display()
                )
            })
            .collect()
    }

    pub fn display_configs(configs: &[PlaybackConfig]) {
        for line in Self::render_configs(configs) {
            println!("{}", line);
        }
    }

    pub fn render_device(device: &DeviceInfo) -> String {
        format!(
            "{}{} (up to {} channels, {}-{} Hz)",
            if device.is_default { "* " } else { "  " },
            device.name,
            device.max_channels,
            device.min_sample_rate,
            device.max_sample_rate
        )
    }

    pub fn display_devices(devices: &[DeviceInfo]) {
        if devices.is_empty() {
            println!("No output devices found");
            return;
        }
        for device in devices {
            println!("{}", Self::render_device(device));
        }
    }

    /// Boxed error with up to three suggestions
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!("┌─ {} {} ", icon, severity.as_str());
        for line in Self::wrap_text(&error.user_message(), BOX_WIDTH) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), BOX_WIDTH - 2) {
                    eprintln!("│   {}", line);
                }
            }
        }
        eprintln!("└{}", "─".repeat(BOX_WIDTH + 2));
    }

    pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();

        for word in text.split_whitespace() {
            if current.is_empty() {
                current = word.to_string();
            } else if current.len() + word.len() < width {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_string();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }

    /// MM:SS, or HH:MM:SS from one hour
    pub fn format_duration(duration: Duration) -> String {
        let total = duration.as_secs();
        let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }

    pub fn format_file_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
        let mut value = size as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        if unit == 0 {
            format!("{} {}", size, UNITS[0])
        } else {
            format!("{:.1} {}", value, UNITS[unit])
        }
    }

    /// Cut to `max_len` characters with a trailing ellipsis
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    pub fn create_progress_bar(progress: f32, width: usize) -> String {
        let filled = ((progress.clamp(0.0, 1.0) * width as f32) as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }

    pub fn format_player_state(state: PlayerState) -> &'static str {
        match state {
            PlayerState::Idle => "⏹ Idle",
            PlayerState::Playing => "▶ Playing",
            PlayerState::Error => "✗ Error",
        }
    }
}
