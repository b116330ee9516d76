pub mod compiler;
pub mod config;
pub mod device;
pub mod error;
pub mod export;
pub mod measure;
pub mod metronome; // Metronome lives here
pub mod renderer;
pub mod tracker;
pub mod waveform;

// Re-exports
pub use compiler::{CompiledPattern, PatternCompiler};
pub use device::{AudioOutput, CpalBackend, MemoryBackend, OutputBackend};
pub use error::EngineError;
pub use measure::{build_measure, Measure, NoteDivision};
pub use metronome::Metronome;
pub use waveform::TwoToneClick;

#[cfg(test)]
mod tests_metronome;
