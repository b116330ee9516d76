//! Wall-clock phase of every click in the active pattern.
//!
//! The tracker does not look at the audio device. It assumes playback started at
//! the epoch recorded by `reset` and derives each click's phase from elapsed time
//! alone, so visual phase and audible clicks can drift apart by the device latency.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arc_swap::{ArcSwap, ArcSwapOption};
use clicktrack_shared::{ClickEvent, PhaseSnapshot, SAMPLE_RATE};

/// Samples elapsed after `elapsed` wall-clock time at the fixed output rate.
pub fn elapsed_samples(elapsed: Duration) -> i64 {
    (elapsed.as_nanos() * SAMPLE_RATE as u128 / 1_000_000_000) as i64
}

/// `((length + elapsed - when) mod length) / length`
pub fn phase_ratio(elapsed: i64, when: i64, length: i64) -> f64 {
    if length <= 0 {
        return 0.0;
    }
    (length + elapsed - when).rem_euclid(length) as f64 / length as f64
}

struct TrackedPattern {
    clicks: Arc<Vec<ClickEvent>>,
    length: i64,
    epoch: Instant,
    generation: u64,
}

struct TrackerShared {
    exit: AtomicBool,
    pattern: ArcSwapOption<TrackedPattern>,
    snapshot: ArcSwap<PhaseSnapshot>,
    generation: AtomicU64,
}

impl TrackerShared {
    fn refresh_at(&self, now: Instant) {
        let Some(tracked) = self.pattern.load_full() else {
            return;
        };
        let elapsed = elapsed_samples(now.saturating_duration_since(tracked.epoch));
        let ratios: Vec<f64> = tracked
            .clicks
            .iter()
            .map(|click| {
                let ratio = phase_ratio(elapsed, click.when(), tracked.length);
                click.store_ratio(ratio);
                ratio
            })
            .collect();

        let next = Arc::new(PhaseSnapshot {
            generation: tracked.generation,
            pattern_length: tracked.length,
            ratios,
        });
        // A tick that raced with a reset must not overwrite the newer pattern's snapshot
        self.snapshot.rcu(|current| {
            if current.generation > next.generation {
                current.clone()
            } else {
                next.clone()
            }
        });
    }
}

/// Recomputes click phases every `interval` on its own thread.
pub struct PositionTracker {
    shared: Arc<TrackerShared>,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl PositionTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            shared: Arc::new(TrackerShared {
                exit: AtomicBool::new(false),
                pattern: ArcSwapOption::empty(),
                snapshot: ArcSwap::from_pointee(PhaseSnapshot::default()),
                generation: AtomicU64::new(0),
            }),
            interval,
            handle: None,
        }
    }

    pub fn start(&mut self) -> std::io::Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let shared = self.shared.clone();
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name("clicktrack-tracker".into())
            .spawn(move || {
                log::info!("[Tracker] Started ({:?} tick)", interval);
                while !shared.exit.load(Ordering::Acquire) {
                    thread::sleep(interval);
                    shared.refresh_at(Instant::now());
                }
                log::info!("[Tracker] Finished");
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Start tracking `clicks` with the current instant as time zero. Ratios are
    /// recomputed once before this returns.
    pub fn reset(&self, clicks: Arc<Vec<ClickEvent>>, length: i64) {
        self.reset_at(clicks, length, Instant::now());
    }

    pub fn reset_at(&self, clicks: Arc<Vec<ClickEvent>>, length: i64, epoch: Instant) {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!("[Tracker] Reset: {} clicks over {} samples (gen {})", clicks.len(), length, generation);
        self.shared.pattern.store(Some(Arc::new(TrackedPattern {
            clicks,
            length,
            epoch,
            generation,
        })));
        self.shared.refresh_at(epoch);
    }

    /// Stop tracking and publish an empty snapshot.
    pub fn clear(&self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.pattern.store(None);
        self.shared.snapshot.store(Arc::new(PhaseSnapshot {
            generation,
            ..PhaseSnapshot::default()
        }));
    }

    /// Recompute every ratio as of `now`.
    pub fn refresh_at(&self, now: Instant) {
        self.shared.refresh_at(now);
    }

    /// The phases published by the most recent tick.
    pub fn snapshot(&self) -> Arc<PhaseSnapshot> {
        self.shared.snapshot.load_full()
    }

    pub fn stop(&mut self) {
        self.shared.exit.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[Tracker] Tracker thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PositionTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
