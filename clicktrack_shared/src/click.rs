use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Synthesizes the waveform of a single click.
///
/// Implementations write into a caller-owned scratch buffer starting at index 0
/// and return how many samples they produced. The count may be shorter than
/// `click.length()` (trailing silence is simply not written) but must never
/// exceed `click.length()` or `buffer.len()`.
pub trait ClickWaveform: Send + Sync {
    fn write(&self, buffer: &mut [i16], sample_rate: u32, click: &ClickEvent) -> usize;

    /// Short label used in logs.
    fn label(&self) -> &str {
        "custom"
    }
}

/// One timed click inside a looping pattern.
///
/// `when` and `length` are fixed at construction. The phase ratio is the only
/// mutable part: it is written by the position tracker and may be read from any
/// thread. Clones share the same phase cell, so a copied pattern still reports
/// the phase of the events it was copied from.
#[derive(Clone)]
pub struct ClickEvent {
    when: i64,
    length: usize,
    waveform: Arc<dyn ClickWaveform>,
    ratio: Arc<AtomicU64>,
}

impl ClickEvent {
    pub fn new(when: i64, length: usize, waveform: Arc<dyn ClickWaveform>) -> Self {
        Self {
            when,
            length,
            waveform,
            ratio: Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }

    /// Sample offset of the click inside the loop.
    pub fn when(&self) -> i64 {
        self.when
    }

    /// Length of the click's own waveform in samples.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn waveform(&self) -> &Arc<dyn ClickWaveform> {
        &self.waveform
    }

    /// Normalized distance in `[0, 1)` since this click last fired. `0.0` means firing now.
    pub fn ratio(&self) -> f64 {
        f64::from_bits(self.ratio.load(Ordering::Acquire))
    }

    /// Publish a freshly computed phase. Only the position tracker calls this.
    pub fn store_ratio(&self, ratio: f64) {
        self.ratio.store(ratio.to_bits(), Ordering::Release);
    }

    /// Render this click with its own waveform.
    pub fn render_into(&self, buffer: &mut [i16], sample_rate: u32) -> usize {
        let written = self.waveform.write(buffer, sample_rate, self);
        written.min(self.length).min(buffer.len())
    }
}

impl fmt::Debug for ClickEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClickEvent")
            .field("when", &self.when)
            .field("length", &self.length)
            .field("waveform", &self.waveform.label())
            .field("ratio", &self.ratio())
            .finish()
    }
}

/// Phase of every tracked click at one tracker tick.
///
/// Published as a whole, so a reader always sees ratios that were computed
/// together for the same pattern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseSnapshot {
    /// Incremented on every tracker reset. Zero means nothing has been tracked yet.
    pub generation: u64,
    pub pattern_length: i64,
    /// `ratios[i]` belongs to the i-th click of the pattern handed to the tracker.
    pub ratios: Vec<f64>,
}

impl PhaseSnapshot {
    pub fn ratio(&self, index: usize) -> Option<f64> {
        self.ratios.get(index).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }
}
