//! Output device boundary.
//!
//! The renderer only needs a blocking `write`, a way to drop buffered audio, a gain
//! control and a clean stop. `OutputBackend::open` is called on the renderer thread,
//! so an `AudioOutput` is free to hold handles that are not `Send` (a cpal stream).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clicktrack_shared::{samples_to_duration, DeviceError, OutputSpec, SAMPLE_RATE};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::Sample;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Frames used when a device does not report a buffer range.
const FALLBACK_BUFFER_FRAMES: u32 = 1024;
/// How long `flush` waits for the audio callback to drop queued samples.
const FLUSH_TIMEOUT: Duration = Duration::from_millis(50);

/// An opened, exclusively owned output device.
pub trait AudioOutput {
    /// Smallest buffer the device was opened with, in frames.
    fn min_buffer_frames(&self) -> usize;
    fn play(&mut self) -> Result<(), DeviceError>;
    /// Queue `samples`, blocking until the device has accepted all of them or the
    /// output is cancelled. Returns the number of samples accepted.
    fn write(&mut self, samples: &[i16]) -> Result<usize, DeviceError>;
    /// Drop audio that was queued but not played yet.
    fn flush(&mut self);
    fn set_volume(&mut self, volume: f32);
    fn stop(&mut self);
}

/// Opens output devices. `cancel` is raised when the owning renderer stops, and
/// blocked writes must return soon after it is set.
pub trait OutputBackend: Send + Sync {
    fn open(&self, spec: &OutputSpec, cancel: Arc<AtomicBool>) -> Result<Box<dyn AudioOutput>, DeviceError>;
}

// --- cpal ---

/// Default host, default output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl OutputBackend for CpalBackend {
    fn open(&self, spec: &OutputSpec, cancel: Arc<AtomicBool>) -> Result<Box<dyn AudioOutput>, DeviceError> {
        Ok(Box::new(CpalOutput::open(spec, cancel)?))
    }
}

/// State shared between `CpalOutput` and the stream callback.
struct CallbackShared {
    gain: AtomicU32,
    flush_requested: AtomicBool,
    failed: AtomicBool,
}

pub struct CpalOutput {
    stream: cpal::Stream,
    producer: HeapProd<i16>,
    shared: Arc<CallbackShared>,
    cancel: Arc<AtomicBool>,
    min_frames: usize,
    poll_interval: Duration,
}

impl CpalOutput {
    pub fn open(spec: &OutputSpec, cancel: Arc<AtomicBool>) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| DeviceError::UnsupportedConfig(e.to_string()))?;

        let device_min = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => {
                log::info!("[CpalOutput] Device Buffer Range: {}-{}", min, max);
                *min
            }
            cpal::SupportedBufferSize::Unknown => FALLBACK_BUFFER_FRAMES,
        };
        let min_frames = spec.min_buffer_frames.unwrap_or(device_min).max(64);

        // The device keeps its own channel layout; mono is duplicated on output.
        let channels = supported.channels();
        let sample_format = supported.sample_format();
        let shared = Arc::new(CallbackShared {
            gain: AtomicU32::new(1.0f32.to_bits()),
            flush_requested: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        });

        // Some hosts refuse a fixed buffer size; fall back to the host default.
        let mut last_err = None;
        for buffer_size in [cpal::BufferSize::Fixed(min_frames), cpal::BufferSize::Default] {
            let config = cpal::StreamConfig {
                channels,
                sample_rate: spec.sample_rate,
                buffer_size,
            };
            let (producer, consumer) = HeapRb::<i16>::new(min_frames as usize * 4).split();
            let built = match sample_format {
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, shared.clone()),
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, shared.clone()),
                other => {
                    return Err(DeviceError::UnsupportedConfig(format!("sample format {:?}", other)));
                }
            };
            match built {
                Ok(stream) => {
                    log::info!("[CpalOutput] Using Config: {:?} ({:?})", config, sample_format);
                    let poll_interval = samples_to_duration(min_frames as u64 / 2).max(Duration::from_millis(1));
                    return Ok(Self {
                        stream,
                        producer,
                        shared,
                        cancel,
                        min_frames: min_frames as usize,
                        poll_interval,
                    });
                }
                Err(e) => {
                    log::warn!("[CpalOutput] {:?} rejected: {}", config.buffer_size, e);
                    last_err = Some(e);
                }
            }
        }
        Err(DeviceError::Stream(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no usable stream config".into()),
        ))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<i16>,
    shared: Arc<CallbackShared>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let channels = config.channels.max(1) as usize;
    let err_shared = shared.clone();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if shared.flush_requested.load(Ordering::Acquire) {
                while consumer.try_pop().is_some() {}
                shared.flush_requested.store(false, Ordering::Release);
            }

            let gain = f32::from_bits(shared.gain.load(Ordering::Relaxed));
            for frame in data.chunks_mut(channels) {
                let sample = consumer.try_pop().unwrap_or(0);
                let value = T::from_sample((sample as f32 * gain) as i16);
                frame.fill(value);
            }
        },
        move |err: cpal::StreamError| {
            let s = err.to_string();
            // Under/overruns are expected while the writer refills the ring
            if !s.contains("underrun") && !s.contains("overrun") {
                log::error!("[CpalOutput] Stream error: {}", s);
                err_shared.failed.store(true, Ordering::Release);
            }
        },
        None,
    )
}

impl AudioOutput for CpalOutput {
    fn min_buffer_frames(&self) -> usize {
        self.min_frames
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        self.stream.play().map_err(|e| DeviceError::Stream(e.to_string()))
    }

    fn write(&mut self, samples: &[i16]) -> Result<usize, DeviceError> {
        let mut offset = 0;
        while offset < samples.len() {
            if self.shared.failed.load(Ordering::Acquire) {
                return Err(DeviceError::Stream("stream reported an error".into()));
            }
            if self.cancel.load(Ordering::Acquire) {
                break;
            }
            offset += self.producer.push_slice(&samples[offset..]);
            if offset < samples.len() {
                thread::sleep(self.poll_interval);
            }
        }
        Ok(offset)
    }

    fn flush(&mut self) {
        self.shared.flush_requested.store(true, Ordering::Release);
        let mut waited = Duration::ZERO;
        while self.shared.flush_requested.load(Ordering::Acquire) && waited < FLUSH_TIMEOUT {
            thread::sleep(Duration::from_millis(1));
            waited += Duration::from_millis(1);
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.shared.gain.store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn stop(&mut self) {
        if let Err(e) = self.stream.pause() {
            log::warn!("[CpalOutput] pause failed: {}", e);
        }
    }
}

// --- in-memory ---

/// Everything a `MemoryOutput` observed. Shared between the backend handle kept by
/// the caller and every output it opens.
#[derive(Default)]
struct MemoryState {
    captured: Mutex<Vec<i16>>,
    total_written: AtomicUsize,
    writes: AtomicUsize,
    flushes: AtomicUsize,
    opened: AtomicUsize,
    released: AtomicUsize,
    volume: AtomicU32,
    fail_open: AtomicBool,
    fail_writes: AtomicBool,
}

/// Output that records samples instead of playing them.
///
/// Writes are paced like a real device (one pattern's duration divided by
/// `speed`); a `speed` of zero disables pacing.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<MemoryState>,
    speed: f64,
    capture_limit: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_speed(1.0)
    }

    pub fn with_speed(speed: f64) -> Self {
        let state = MemoryState::default();
        state.volume.store(1.0f32.to_bits(), Ordering::Relaxed);
        Self {
            state: Arc::new(state),
            speed,
            capture_limit: SAMPLE_RATE as usize * 10,
        }
    }

    /// Keep at most `limit` samples in the capture buffer.
    pub fn capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::Relaxed);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn captured(&self) -> Vec<i16> {
        self.state.captured.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn total_written(&self) -> usize {
        self.state.total_written.load(Ordering::Acquire)
    }

    pub fn writes(&self) -> usize {
        self.state.writes.load(Ordering::Acquire)
    }

    pub fn flushes(&self) -> usize {
        self.state.flushes.load(Ordering::Acquire)
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::Acquire)
    }

    pub fn released(&self) -> usize {
        self.state.released.load(Ordering::Acquire)
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.state.volume.load(Ordering::Acquire))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for MemoryBackend {
    fn open(&self, spec: &OutputSpec, cancel: Arc<AtomicBool>) -> Result<Box<dyn AudioOutput>, DeviceError> {
        if self.state.fail_open.load(Ordering::Relaxed) {
            return Err(DeviceError::NoDevice);
        }
        self.state.opened.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemoryOutput {
            state: self.state.clone(),
            cancel,
            speed: self.speed,
            capture_limit: self.capture_limit,
            min_frames: spec.min_buffer_frames.unwrap_or(FALLBACK_BUFFER_FRAMES) as usize,
        }))
    }
}

pub struct MemoryOutput {
    state: Arc<MemoryState>,
    cancel: Arc<AtomicBool>,
    speed: f64,
    capture_limit: usize,
    min_frames: usize,
}

impl MemoryOutput {
    fn pace(&self, samples: usize) {
        if self.speed <= 0.0 {
            return;
        }
        let total = samples_to_duration(samples as u64).div_f64(self.speed);
        let step = Duration::from_millis(1);
        let mut waited = Duration::ZERO;
        while waited < total && !self.cancel.load(Ordering::Acquire) {
            thread::sleep(step);
            waited += step;
        }
    }
}

impl AudioOutput for MemoryOutput {
    fn min_buffer_frames(&self) -> usize {
        self.min_frames
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<usize, DeviceError> {
        if self.state.fail_writes.load(Ordering::Relaxed) {
            return Err(DeviceError::Stream("write rejected".into()));
        }
        if let Ok(mut captured) = self.state.captured.lock() {
            let room = self.capture_limit.saturating_sub(captured.len());
            captured.extend_from_slice(&samples[..room.min(samples.len())]);
        }
        self.state.total_written.fetch_add(samples.len(), Ordering::AcqRel);
        self.state.writes.fetch_add(1, Ordering::AcqRel);
        self.pace(samples.len());
        Ok(samples.len())
    }

    fn flush(&mut self) {
        self.state.flushes.fetch_add(1, Ordering::AcqRel);
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.volume.store(volume.to_bits(), Ordering::Release);
    }

    fn stop(&mut self) {}
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        self.state.released.fetch_add(1, Ordering::AcqRel);
    }
}
