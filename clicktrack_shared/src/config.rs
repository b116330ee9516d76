use serde::{Deserialize, Serialize};

/// Runtime settings for a metronome instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Output gain in [0, 1].
    pub volume: f32,
    /// Period of the position tracker loop.
    pub tracker_interval_ms: u64,
    /// How long the renderer sleeps when it has no pattern to play.
    pub renderer_idle_ms: u64,
    /// Override for the device buffer size. `None` uses the device minimum.
    pub device_buffer_frames: Option<u32>,
    /// Flush the device when a pattern is replaced during playback so the new
    /// pattern is heard from sample 0.
    pub seek_on_pattern_change: bool,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            tracker_interval_ms: 2,
            renderer_idle_ms: 20,
            device_buffer_frames: None,
            seek_on_pattern_change: true,
        }
    }
}
