//! Lifecycle of the renderer and tracker pair.

use std::sync::Arc;
use std::time::Duration;

use clicktrack_shared::{ClickEvent, DeviceError, MetronomeConfig, OutputSpec, PhaseSnapshot, SAMPLE_RATE};

use crate::compiler::PatternCompiler;
use crate::device::{CpalBackend, OutputBackend};
use crate::error::EngineError;
use crate::renderer::AudioRenderer;
use crate::tracker::PositionTracker;

/// Plays a looping click pattern and keeps every click's phase up to date.
///
/// A pattern can be set before or after `start`. Setting one while running swaps
/// it in immediately; setting one while stopped keeps it for the next `start`.
///
/// When `set_pattern` fails, the pattern that was active before stays active: a
/// new pattern is validated and compiled first, and only replaces the held one
/// once that has succeeded.
pub struct Metronome {
    config: MetronomeConfig,
    backend: Arc<dyn OutputBackend>,
    renderer: Option<AudioRenderer>,
    tracker: Option<PositionTracker>,
    clicks: Option<Arc<Vec<ClickEvent>>>,
    pattern_length: i64,
    volume: f32,
}

impl Metronome {
    /// A metronome playing through the default cpal output device.
    pub fn new(config: MetronomeConfig) -> Self {
        Self::with_backend(config, Arc::new(CpalBackend))
    }

    pub fn with_backend(config: MetronomeConfig, backend: Arc<dyn OutputBackend>) -> Self {
        let volume = config.volume.clamp(0.0, 1.0);
        Self {
            config,
            backend,
            renderer: None,
            tracker: None,
            clicks: None,
            pattern_length: 0,
            volume,
        }
    }

    /// Open the device and start both loops. Does nothing while already running.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if let Some(renderer) = &self.renderer {
            if renderer.is_running() {
                return Ok(());
            }
            // The previous renderer died on a device error; replace the pair
            log::warn!("[Metronome] Discarding failed renderer: {:?}", renderer.last_error());
            self.stop_loops();
        }

        let compiled = match &self.clicks {
            Some(clicks) => Some(PatternCompiler::compile(clicks, SAMPLE_RATE, self.pattern_length)?),
            None => None,
        };

        let mut renderer = AudioRenderer::new(Duration::from_millis(self.config.renderer_idle_ms));
        renderer.set_volume(self.volume);
        renderer.set_pattern(compiled);
        let spec = OutputSpec {
            min_buffer_frames: self.config.device_buffer_frames,
            ..OutputSpec::default()
        };
        renderer.start(self.backend.clone(), spec)?;

        let mut tracker = PositionTracker::new(Duration::from_millis(self.config.tracker_interval_ms));
        if let Some(clicks) = &self.clicks {
            tracker.reset(clicks.clone(), self.pattern_length);
        }
        if let Err(e) = tracker.start() {
            renderer.stop();
            return Err(DeviceError::Stream(format!("failed to spawn tracker thread: {}", e)).into());
        }

        log::info!(
            "[Metronome] Started ({} clicks, {} samples)",
            self.clicks.as_ref().map_or(0, |c| c.len()),
            self.pattern_length
        );
        self.renderer = Some(renderer);
        self.tracker = Some(tracker);
        Ok(())
    }

    /// Stop both loops and forget the held pattern. Does nothing when not started.
    pub fn finish(&mut self) {
        if self.renderer.is_none() {
            return;
        }
        self.stop_loops();
        self.clicks = None;
        self.pattern_length = 0;
        log::info!("[Metronome] Finished");
    }

    fn stop_loops(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.stop();
        }
        if let Some(mut tracker) = self.tracker.take() {
            tracker.stop();
        }
    }

    /// Replace the pattern. An empty `clicks` clears it and, while running,
    /// silences the renderer without stopping either loop.
    pub fn set_pattern(&mut self, clicks: &[ClickEvent], length: i64) -> Result<(), EngineError> {
        if clicks.is_empty() {
            self.clear_pattern();
            return Ok(());
        }

        PatternCompiler::validate(clicks, length)?;
        let clicks = Arc::new(clicks.to_vec());

        if let (Some(renderer), Some(tracker)) = (&self.renderer, &self.tracker) {
            let compiled = PatternCompiler::compile(&clicks, SAMPLE_RATE, length)?;
            renderer.set_pattern(Some(compiled));
            if self.config.seek_on_pattern_change {
                renderer.seek_to_start();
            }
            tracker.reset(clicks.clone(), length);
        }

        self.clicks = Some(clicks);
        self.pattern_length = length;
        Ok(())
    }

    pub fn clear_pattern(&mut self) {
        self.clicks = None;
        self.pattern_length = 0;
        if let Some(renderer) = &self.renderer {
            renderer.set_pattern(None);
        }
        if let Some(tracker) = &self.tracker {
            tracker.clear();
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(renderer) = &self.renderer {
            renderer.set_volume(self.volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// True while a renderer is alive.
    pub fn is_running(&self) -> bool {
        self.renderer.as_ref().is_some_and(|r| r.is_running())
    }

    pub fn clicks(&self) -> Option<Arc<Vec<ClickEvent>>> {
        self.clicks.clone()
    }

    pub fn pattern_length(&self) -> i64 {
        self.pattern_length
    }

    /// Latest phase of every click. Empty when stopped.
    pub fn phase_snapshot(&self) -> Arc<PhaseSnapshot> {
        self.tracker
            .as_ref()
            .map(|t| t.snapshot())
            .unwrap_or_default()
    }

    /// Samples the device has accepted since `start`, for comparing against the
    /// tracker's wall-clock phase.
    pub fn samples_played(&self) -> Option<u64> {
        self.renderer.as_ref().map(|r| r.samples_written())
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.finish();
    }
}
