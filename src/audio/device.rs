use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedBufferSize};
use log::{debug, error, info, warn};

use crate::audio::buffer::{PcmConverter, SampleRing};
use crate::audio::sink::{DeviceBackend, DeviceSink, FormatSpec};
use crate::error::PlayerError;

/// A write that makes no progress for this long fails the sink
pub const WRITE_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Information about an output device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub max_channels: u16,
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
}

/// Device backend on top of the system audio host
pub struct CpalBackend {
    device_name: Option<String>,
}

impl CpalBackend {
    /// Use the named output device, or the system default when `None`
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Enumerate output devices on the default host
    pub fn list_devices() -> Result<Vec<DeviceInfo>, PlayerError> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let devices = host
            .output_devices()
            .map_err(|e| PlayerError::Device(format!("Failed to enumerate devices: {}", e)))?;

        let mut infos = Vec::new();
        for device in devices {
            let name = match device.name() {
                Ok(name) => name,
                Err(e) => {
                    warn!("Skipping device without a name: {}", e);
                    continue;
                }
            };

            let mut max_channels = 0;
            let mut min_rate = u32::MAX;
            let mut max_rate = 0;
            if let Ok(configs) = device.supported_output_configs() {
                for range in configs {
                    max_channels = max_channels.max(range.channels());
                    min_rate = min_rate.min(range.min_sample_rate().0);
                    max_rate = max_rate.max(range.max_sample_rate().0);
                }
            }

            infos.push(DeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                max_channels,
                min_sample_rate: if max_rate == 0 { 0 } else { min_rate },
                max_sample_rate: max_rate,
            });
        }

        Ok(infos)
    }

    /// Select a device by name, or the default output device
    fn select_device(device_name: Option<&str>) -> Result<Device, PlayerError> {
        let host = cpal::default_host();
        match device_name {
            Some(name) => {
                let devices = host
                    .output_devices()
                    .map_err(|e| PlayerError::Device(format!("Failed to enumerate devices: {}", e)))?;
                for device in devices {
                    if device.name().map(|n| n == name).unwrap_or(false) {
                        return Ok(device);
                    }
                }
                Err(PlayerError::Device(format!("Audio device not found: {}", name)))
            }
            None => host
                .default_output_device()
                .ok_or_else(|| PlayerError::Device("No default output device available".to_string())),
        }
    }

    /// Find a supported config matching the channel layout and rate
    fn matching_config(
        device: &Device,
        spec: &FormatSpec,
    ) -> Result<(cpal::SupportedStreamConfig, SupportedBufferSize), PlayerError> {
        let channels = spec.channel_mask.channel_count();
        let configs = device
            .supported_output_configs()
            .map_err(|e| PlayerError::Device(format!("Failed to get supported configs: {}", e)))?;

        let mut best: Option<cpal::SupportedStreamConfigRange> = None;
        for range in configs {
            if range.channels() != channels
                || spec.sample_rate < range.min_sample_rate().0
                || spec.sample_rate > range.max_sample_rate().0
            {
                continue;
            }
            // Prefer float output, then whatever comes first
            let is_better = match &best {
                None => true,
                Some(current) => {
                    current.sample_format() != SampleFormat::F32 && range.sample_format() == SampleFormat::F32
                }
            };
            if is_better {
                best = Some(range);
            }
        }

        let range = best.ok_or_else(|| {
            PlayerError::Param(format!(
                "device has no {} channel output at {}Hz",
                channels, spec.sample_rate
            ))
        })?;
        let buffer_size = range.buffer_size().clone();
        Ok((range.with_sample_rate(SampleRate(spec.sample_rate)), buffer_size))
    }
}

impl DeviceBackend for CpalBackend {
    fn minimum_buffer_size(&self, spec: &FormatSpec) -> Option<usize> {
        let device = match Self::select_device(self.device_name.as_deref()) {
            Ok(device) => device,
            Err(e) => {
                error!("{}", e);
                return None;
            }
        };

        let (_, buffer_size) = match Self::matching_config(&device, spec) {
            Ok(found) => found,
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };

        let frames = match buffer_size {
            SupportedBufferSize::Range { min, .. } => min as usize,
            // Hosts that do not report a range get 10ms
            SupportedBufferSize::Unknown => (spec.sample_rate / 100) as usize,
        };
        Some(frames * spec.frame_size())
    }

    fn open(&self, spec: &FormatSpec) -> Result<Box<dyn DeviceSink>, PlayerError> {
        let sink = CpalSink::open(self.device_name.clone(), *spec)?;
        Ok(Box::new(sink))
    }
}

enum StreamCommand {
    Play,
    Pause,
    Shutdown,
}

/// State shared between the sink, its output thread and the stream callback
struct OutputShared {
    ring: SampleRing,
    volume: AtomicU32, // f32 bits
    paused: AtomicBool,
    failed: AtomicBool,
}

/// Output stream fed through a sample ring.
///
/// The cpal stream lives on its own `audio-output` thread because stream
/// handles cannot move between threads.
pub struct CpalSink {
    shared: Arc<OutputShared>,
    converter: PcmConverter,
    scratch: Vec<f32>,
    commands: Sender<StreamCommand>,
    thread: Option<thread::JoinHandle<()>>,
    source_frame_bytes: usize,
    output_channels: u16,
}

impl CpalSink {
    pub fn open(device_name: Option<String>, spec: FormatSpec) -> Result<Self, PlayerError> {
        let output_channels = spec.channel_mask.channel_count();
        let frame_bytes = spec.frame_size().max(1);
        let capacity_frames = (spec.buffer_size / frame_bytes).max(1);

        let shared = Arc::new(OutputShared {
            ring: SampleRing::new(capacity_frames, output_channels),
            volume: AtomicU32::new(1.0f32.to_bits()),
            paused: AtomicBool::new(true),
            failed: AtomicBool::new(false),
        });

        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_shared = Arc::clone(&shared);

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                raise_thread_priority();
                run_output_thread(device_name, spec, thread_shared, command_rx, ready_tx);
            })
            .map_err(|e| PlayerError::Device(format!("Failed to create audio thread: {}", e)))?;

        let opened = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(PlayerError::Device("audio thread exited during setup".to_string())));
        if let Err(e) = opened {
            let _ = handle.join();
            return Err(e);
        }

        info!(
            "Output stream opened: {}Hz, {} ({} source channels), buffer {} bytes",
            spec.sample_rate, spec.channel_mask, spec.source_channels, spec.buffer_size
        );

        Ok(Self {
            shared,
            converter: PcmConverter::new(spec.encoding, spec.source_channels, output_channels),
            scratch: Vec::new(),
            commands: command_tx,
            thread: Some(handle),
            source_frame_bytes: frame_bytes,
            output_channels,
        })
    }

    fn send(&self, command: StreamCommand) {
        if self.commands.send(command).is_err() {
            debug!("Audio output thread already stopped");
        }
    }
}

impl DeviceSink for CpalSink {
    fn write(&mut self, data: &[u8]) -> Result<usize, PlayerError> {
        if self.thread.is_none() {
            return Err(PlayerError::Device("write after release".to_string()));
        }
        if self.shared.failed.load(Ordering::Acquire) {
            return Err(PlayerError::Device("output stream failed".to_string()));
        }

        self.scratch.clear();
        self.converter.convert(data, &mut self.scratch);

        let mut offset = 0;
        let mut last_progress = Instant::now();
        while offset < self.scratch.len() {
            let waited = last_progress.elapsed();
            if waited >= WRITE_STALL_TIMEOUT {
                return Err(PlayerError::Device(format!(
                    "device write stalled for {}ms",
                    waited.as_millis()
                )));
            }

            let written = self
                .shared
                .ring
                .write_timeout(&self.scratch[offset..], WRITE_STALL_TIMEOUT - waited);
            if written > 0 {
                offset += written;
                last_progress = Instant::now();
            } else if self.shared.failed.load(Ordering::Acquire) {
                return Err(PlayerError::Device("output stream failed".to_string()));
            }
        }

        Ok(data.len())
    }

    fn set_volume(&mut self, volume: f32) {
        self.shared
            .volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        if self.shared.failed.load(Ordering::Acquire) {
            return Err(PlayerError::Device("output stream failed".to_string()));
        }
        self.shared.paused.store(false, Ordering::Release);
        self.send(StreamCommand::Play);
        Ok(())
    }

    fn pause(&mut self) {
        self.shared.paused.store(true, Ordering::Release);
        self.send(StreamCommand::Pause);
    }

    fn stop(&mut self) {
        self.shared.paused.store(true, Ordering::Release);
        self.shared.ring.clear();
        self.converter.reset();
    }

    fn release(&mut self) {
        if let Some(handle) = self.thread.take() {
            self.send(StreamCommand::Shutdown);
            self.shared.ring.close();
            if handle.join().is_err() {
                error!("Audio output thread panicked");
            }
            let underruns = self.shared.ring.underrun_count();
            if underruns > 0 {
                warn!("Output stream reported {} underruns", underruns);
            }
        }
    }

    fn pending_bytes(&self) -> usize {
        let frames = self.shared.ring.available_read() / self.output_channels.max(1) as usize;
        frames * self.source_frame_bytes + self.converter.carried()
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_output_thread(
    device_name: Option<String>,
    spec: FormatSpec,
    shared: Arc<OutputShared>,
    commands: Receiver<StreamCommand>,
    ready: Sender<Result<(), PlayerError>>,
) {
    let stream = match build_stream(device_name.as_deref(), &spec, &shared) {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while let Ok(command) = commands.recv() {
        match command {
            StreamCommand::Play => {
                if let Err(e) = stream.play() {
                    error!("Failed to start audio stream: {}", e);
                    shared.failed.store(true, Ordering::Release);
                }
            }
            StreamCommand::Pause => {
                if let Err(e) = stream.pause() {
                    warn!("Failed to pause audio stream: {}", e);
                }
            }
            StreamCommand::Shutdown => break,
        }
    }

    let _ = stream.pause();
    debug!("Audio output thread exiting");
}

fn build_stream(
    device_name: Option<&str>,
    spec: &FormatSpec,
    shared: &Arc<OutputShared>,
) -> Result<Stream, PlayerError> {
    let device = CpalBackend::select_device(device_name)?;
    let (supported, _) = CpalBackend::matching_config(&device, spec)?;

    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: SampleRate(spec.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    match supported.sample_format() {
        SampleFormat::F32 => create_stream::<f32>(&device, &config, shared),
        SampleFormat::I16 => create_stream::<i16>(&device, &config, shared),
        SampleFormat::U16 => create_stream::<u16>(&device, &config, shared),
        SampleFormat::I32 => create_stream::<i32>(&device, &config, shared),
        other => Err(PlayerError::Device(format!("Unsupported sample format: {:?}", other))),
    }
}

fn create_stream<T>(
    device: &Device,
    config: &StreamConfig,
    shared: &Arc<OutputShared>,
) -> Result<Stream, PlayerError>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let data_shared = Arc::clone(shared);
    let error_shared = Arc::clone(shared);
    let mut samples: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if data_shared.paused.load(Ordering::Acquire) {
                    for sample in data.iter_mut() {
                        *sample = cpal::Sample::from_sample(0.0f32);
                    }
                    return;
                }

                samples.resize(data.len(), 0.0);
                let read = data_shared.ring.read(&mut samples);
                if read < data.len() && read > 0 {
                    data_shared.ring.record_underrun();
                }

                let volume = f32::from_bits(data_shared.volume.load(Ordering::Relaxed));
                for (i, sample) in data.iter_mut().enumerate() {
                    let value = if i < read { samples[i] * volume } else { 0.0 };
                    *sample = cpal::Sample::from_sample(value);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_shared.failed.store(true, Ordering::Release);
                error_shared.ring.close();
            },
            None,
        )
        .map_err(|e| PlayerError::Device(format!("Failed to build output stream: {}", e)))
}

/// Best-effort real-time priority for the output thread
fn raise_thread_priority() {
    #[cfg(target_os = "macos")]
    unsafe {
        let thread = libc::pthread_self();
        let mut policy: libc::c_int = 0;
        let mut param: libc::sched_param = std::mem::zeroed();

        if libc::pthread_getschedparam(thread, &mut policy, &mut param) == 0 {
            param.sched_priority = 63;
            let _ = libc::pthread_setschedparam(thread, libc::SCHED_FIFO, &param);
        }
    }
}
