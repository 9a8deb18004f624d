use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};
use tokio::sync::mpsc;

use wav_stream_player::audio::device::CpalBackend;
use wav_stream_player::audio::engine::PlaybackEngine;
use wav_stream_player::audio::focus::LocalFocusService;
use wav_stream_player::audio::wave::WaveReader;
use wav_stream_player::cli::{CliApp, Commands, StatusDisplay};
use wav_stream_player::config::loader::{ConfigLoader, FileConfigLoader};
use wav_stream_player::error::PlayerError;
use wav_stream_player::logging;
use wav_stream_player::models::PlayerState;
use wav_stream_player::player::PlayerController;

/// Options for one `play` invocation
struct PlayRequest {
    path: Option<PathBuf>,
    config: Option<PathBuf>,
    profile: Option<String>,
    device: Option<String>,
}

async fn play(request: PlayRequest) -> Result<bool, PlayerError> {
    let loader = FileConfigLoader::new(request.config.as_deref().map(CliApp::expand_path));
    let backend = Arc::new(CpalBackend::new(request.device));
    let engine = PlaybackEngine::new(backend, Arc::new(LocalFocusService::new()))?;
    let mut controller = PlayerController::new(engine, Box::new(loader));

    if let Some(profile) = &request.profile {
        if !controller.select_config(profile) {
            eprintln!("No configuration named '{}', available:", profile);
            StatusDisplay::display_configs(controller.available_configs());
            return Ok(false);
        }
    }
    if let Some(path) = &request.path {
        let config = controller.current_config().with_file(CliApp::expand_path(path));
        if !controller.use_config(config) {
            eprintln!("Could not apply the configuration for {}", path.display());
            StatusDisplay::display_snapshot(&controller.snapshot());
            controller.shutdown();
            return Ok(false);
        }
    }

    let (interrupt_tx, mut interrupt_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })
    .map_err(|e| PlayerError::Device(format!("Failed to install Ctrl-C handler: {}", e)))?;

    let mut updates = controller.subscribe();
    let config = controller.current_config();
    println!("Playing {} ({})", config.audio_file_path.display(), config.description);

    if !controller.start_playback() {
        StatusDisplay::display_snapshot(&controller.snapshot());
        controller.shutdown();
        return Ok(false);
    }

    loop {
        let snapshot = updates.borrow_and_update().clone();
        StatusDisplay::display_snapshot(&snapshot);
        if snapshot.state != PlayerState::Playing {
            break;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = interrupt_rx.recv() => {
                info!("Interrupted, stopping playback");
                tokio::task::block_in_place(|| controller.stop_playback());
            }
        }
    }

    let succeeded = controller.snapshot().state != PlayerState::Error;
    tokio::task::block_in_place(|| controller.shutdown());
    Ok(succeeded)
}

fn info(path: PathBuf) -> Result<bool, PlayerError> {
    let path = CliApp::expand_path(&path);
    let mut reader = WaveReader::open(&path)?;
    StatusDisplay::display_header(&path, reader.header());
    reader.close();
    Ok(true)
}

fn configs(config: Option<PathBuf>) -> Result<bool, PlayerError> {
    let loader = FileConfigLoader::new(config.as_deref().map(CliApp::expand_path));
    for candidate in loader.candidates() {
        println!("Searching {}", candidate.display());
    }
    StatusDisplay::display_configs(&loader.load_configs());
    Ok(true)
}

fn devices() -> Result<bool, PlayerError> {
    StatusDisplay::display_devices(&CpalBackend::list_devices()?);
    Ok(true)
}

#[tokio::main]
async fn main() {
    // Default to 'warn' so status lines are not buried in log output
    if std::env::var(logging::LOG_LEVEL_ENV).is_err() {
        std::env::set_var(logging::LOG_LEVEL_ENV, "warn");
    }
    if let Err(e) = logging::init() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let cli = CliApp::parse();
    let result = match cli.command {
        Commands::Play { path, config, profile, device } => {
            play(PlayRequest { path, config, profile, device }).await
        }
        Commands::Info { path } => info(path),
        Commands::Configs { config } => configs(config),
        Commands::Devices => devices(),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            StatusDisplay::display_error(&e);
            std::process::exit(1);
        }
    }
}
