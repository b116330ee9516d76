pub mod click;
pub mod config;
pub mod error;

pub use click::{ClickEvent, ClickWaveform, PhaseSnapshot};
pub use config::MetronomeConfig;
pub use error::{DeviceError, PatternError};

/// Fixed output rate. Every pattern length and click offset is counted in
/// samples at this rate.
pub const SAMPLE_RATE: u32 = 44100;
pub const CHANNEL_COUNT: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

/// What the renderer asks of an output device when it opens one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// Requested device buffer in frames. `None` lets the device choose its minimum.
    pub min_buffer_frames: Option<u32>,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNEL_COUNT,
            min_buffer_frames: None,
        }
    }
}

/// Convert a sample count at `SAMPLE_RATE` into wall-clock time.
pub fn samples_to_duration(samples: u64) -> std::time::Duration {
    std::time::Duration::from_nanos(samples * 1_000_000_000 / SAMPLE_RATE as u64)
}
