pub mod buffer;
pub mod device;
pub mod engine;
pub mod focus;
pub mod params;
pub mod session;
pub mod sink;
pub mod wave;


pub use device::{CpalBackend, DeviceInfo};
pub use engine::{PlaybackEngine, PlaybackListener};
pub use focus::{FocusArbiter, FocusChange, FocusService, LocalFocusService, TransientLossPolicy};
pub use params::{ChannelMask, SampleEncoding};
pub use sink::{DeviceBackend, DeviceSink, FormatSpec};
pub use wave::{WaveHeader, WaveReader};
