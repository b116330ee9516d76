//! Streams the compiled pattern to the output device on its own thread.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use clicktrack_shared::{DeviceError, OutputSpec};
use crossbeam_channel::bounded;

use crate::compiler::CompiledPattern;
use crate::device::{AudioOutput, OutputBackend};

struct RendererShared {
    exit: Arc<AtomicBool>,
    running: AtomicBool,
    pattern: ArcSwapOption<Vec<i16>>,
    volume: AtomicU32,
    volume_dirty: AtomicBool,
    seek_requested: AtomicBool,
    samples_written: AtomicU64,
    last_error: Mutex<Option<DeviceError>>,
}

/// Plays the current pattern in a loop until stopped.
///
/// One instance runs at most once: `start` spawns the loop, `stop` ends it and
/// releases the device. A stopped renderer is discarded, never restarted.
pub struct AudioRenderer {
    shared: Arc<RendererShared>,
    idle: Duration,
    handle: Option<JoinHandle<()>>,
    started: bool,
}

impl AudioRenderer {
    pub fn new(idle: Duration) -> Self {
        Self {
            shared: Arc::new(RendererShared {
                exit: Arc::new(AtomicBool::new(false)),
                running: AtomicBool::new(false),
                pattern: ArcSwapOption::empty(),
                volume: AtomicU32::new(1.0f32.to_bits()),
                volume_dirty: AtomicBool::new(true),
                seek_requested: AtomicBool::new(false),
                samples_written: AtomicU64::new(0),
                last_error: Mutex::new(None),
            }),
            idle,
            handle: None,
            started: false,
        }
    }

    /// Open the device on a new thread and begin playback.
    ///
    /// Returns once the device is playing, or with the error that prevented it.
    pub fn start(&mut self, backend: Arc<dyn OutputBackend>, spec: OutputSpec) -> Result<(), DeviceError> {
        if self.started {
            log::warn!("[Renderer] start called twice, ignoring");
            return Ok(());
        }
        self.started = true;

        let shared = self.shared.clone();
        let idle = self.idle;
        let (ready_tx, ready_rx) = bounded::<Result<(), DeviceError>>(1);

        let handle = thread::Builder::new()
            .name("clicktrack-renderer".into())
            .spawn(move || {
                let mut output = match backend.open(&spec, shared.exit.clone()) {
                    Ok(o) => o,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                output.set_volume(f32::from_bits(shared.volume.load(Ordering::Acquire)));
                shared.volume_dirty.store(false, Ordering::Release);
                if let Err(e) = output.play() {
                    output.stop();
                    let _ = ready_tx.send(Err(e));
                    return;
                }

                shared.running.store(true, Ordering::Release);
                let _ = ready_tx.send(Ok(()));
                log::info!("[Renderer] Started (device buffer {} frames)", output.min_buffer_frames());

                Self::run(&shared, output.as_mut(), idle);

                output.stop();
                drop(output);
                shared.running.store(false, Ordering::Release);
                log::info!("[Renderer] Finished");
            })
            .map_err(|e| DeviceError::Stream(format!("failed to spawn renderer thread: {}", e)))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(DeviceError::Stream("renderer thread exited during start".into())));
        if ready.is_err() {
            let _ = handle.join();
            return ready;
        }
        self.handle = Some(handle);
        Ok(())
    }

    fn run(shared: &RendererShared, output: &mut dyn AudioOutput, idle: Duration) {
        while !shared.exit.load(Ordering::Acquire) {
            if shared.volume_dirty.swap(false, Ordering::AcqRel) {
                output.set_volume(f32::from_bits(shared.volume.load(Ordering::Acquire)));
            }
            if shared.seek_requested.swap(false, Ordering::AcqRel) {
                output.flush();
            }

            // The guard keeps this buffer alive for the whole write even if a new
            // pattern is swapped in meanwhile.
            match shared.pattern.load_full() {
                Some(pattern) => match output.write(&pattern) {
                    Ok(n) => {
                        shared.samples_written.fetch_add(n as u64, Ordering::AcqRel);
                    }
                    Err(e) => {
                        log::error!("[Renderer] Device write failed: {}", e);
                        if let Ok(mut slot) = shared.last_error.lock() {
                            *slot = Some(e);
                        }
                        break;
                    }
                },
                None => thread::sleep(idle),
            }
        }
    }

    /// Replace the buffer used by the next write. `None` plays silence.
    pub fn set_pattern(&self, pattern: Option<CompiledPattern>) {
        log::debug!(
            "[Renderer] Pattern set: {}",
            pattern.as_ref().map_or(0, |p| p.len())
        );
        self.shared.pattern.store(pattern);
    }

    pub fn pattern(&self) -> Option<CompiledPattern> {
        self.shared.pattern.load_full()
    }

    pub fn set_volume(&self, volume: f32) {
        self.shared.volume.store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Release);
        self.shared.volume_dirty.store(true, Ordering::Release);
    }

    /// Drop queued audio before the next write so it is heard from sample 0.
    pub fn seek_to_start(&self) {
        self.shared.seek_requested.store(true, Ordering::Release);
    }

    /// Signal the loop to exit and wait for it to release the device.
    pub fn stop(&mut self) {
        self.shared.exit.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[Renderer] Render thread panicked");
            }
        }
    }

    /// True while the loop is alive. Turns false after `stop` or a device failure.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Samples the device has accepted since start.
    pub fn samples_written(&self) -> u64 {
        self.shared.samples_written.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<DeviceError> {
        self.shared.last_error.lock().ok().and_then(|e| e.clone())
    }
}

impl Drop for AudioRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}
