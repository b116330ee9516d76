//! Renders a set of clicks into one looping PCM buffer.

use std::sync::Arc;

use clicktrack_shared::{ClickEvent, PatternError};

/// One loop of mono 16-bit audio. Shared by reference and never mutated after
/// compilation, so a reader always holds a complete buffer.
pub type CompiledPattern = Arc<Vec<i16>>;

pub struct PatternCompiler;

impl PatternCompiler {
    /// Check a pattern without rendering it.
    pub fn validate(events: &[ClickEvent], pattern_length: i64) -> Result<(), PatternError> {
        if events.is_empty() {
            return Err(PatternError::InvalidSpec("click pattern must not be empty".into()));
        }
        if pattern_length <= 0 {
            return Err(PatternError::InvalidSpec(format!(
                "pattern length must be positive, got {}",
                pattern_length
            )));
        }
        for click in events {
            if click.when() < 0 || click.when() >= pattern_length {
                return Err(PatternError::OutOfRange {
                    when: click.when(),
                    length: pattern_length,
                });
            }
            if click.length() == 0 {
                return Err(PatternError::InvalidSpec(format!(
                    "click at sample {} has zero length",
                    click.when()
                )));
            }
        }
        Ok(())
    }

    /// Overlay every click into a zeroed buffer of `pattern_length` samples.
    ///
    /// Clicks are summed, not overwritten, and a click that runs past the end of
    /// the loop continues at index 0. The sum uses wrapping 16-bit arithmetic:
    /// loud overlapping clicks wrap around instead of clipping.
    pub fn compile(
        events: &[ClickEvent],
        sample_rate: u32,
        pattern_length: i64,
    ) -> Result<CompiledPattern, PatternError> {
        Self::validate(events, pattern_length)?;

        let len = pattern_length as usize;
        let mut pattern = vec![0i16; len];

        let max_click = events.iter().map(|c| c.length()).max().unwrap_or(0);
        let mut scratch = vec![0i16; max_click];

        for click in events {
            scratch.fill(0);
            let written = click.render_into(&mut scratch, sample_rate);
            let start = click.when() as usize;
            for (i, &sample) in scratch[..written].iter().enumerate() {
                let idx = (start + i) % len;
                pattern[idx] = pattern[idx].wrapping_add(sample);
            }
        }

        log::debug!(
            "[Compiler] {} clicks -> {} samples (scratch {})",
            events.len(),
            len,
            max_click
        );
        Ok(Arc::new(pattern))
    }
}
