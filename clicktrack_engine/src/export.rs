//! Offline export of a compiled pattern to a WAV file.

use std::io::{Seek, Write};
use std::path::Path;

use clicktrack_shared::{ClickEvent, BITS_PER_SAMPLE, CHANNEL_COUNT, SAMPLE_RATE};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::compiler::PatternCompiler;

pub fn wav_spec() -> WavSpec {
    WavSpec {
        channels: CHANNEL_COUNT,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    }
}

/// Compile `clicks` and write `repeats` back-to-back copies as 16-bit mono PCM.
/// Returns the number of samples written.
pub fn write_pattern<W: Write + Seek>(
    writer: W,
    clicks: &[ClickEvent],
    pattern_length: i64,
    repeats: u32,
) -> Result<u64, anyhow::Error> {
    let pattern = PatternCompiler::compile(clicks, SAMPLE_RATE, pattern_length)?;

    let mut wav = WavWriter::new(writer, wav_spec())?;
    let mut written = 0u64;
    for _ in 0..repeats {
        for &s in pattern.iter() {
            wav.write_sample(s)?;
        }
        written += pattern.len() as u64;
    }
    wav.finalize()?;
    Ok(written)
}

pub fn save_wav(
    path: &Path,
    clicks: &[ClickEvent],
    pattern_length: i64,
    repeats: u32,
) -> Result<u64, anyhow::Error> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    let written = write_pattern(file, clicks, pattern_length, repeats)?;
    log::info!(
        "[Export] Wrote {} ({} samples, {} repeats)",
        path.display(),
        written,
        repeats
    );
    Ok(written)
}
