//! Built-in click sounds.
//!
//! Both variants are a pair of sine partials (a fundamental and its octave) held at
//! constant amplitude for the first 20% of the click and faded linearly to zero by
//! 35%. The remaining 65% of the click is silence and is not written.

use std::f64::consts::TAU;
use std::sync::Arc;

use clicktrack_shared::{ClickEvent, ClickWaveform};

const LOW_AMPLITUDE: f64 = 12000.0;
const HIGH_AMPLITUDE: f64 = 15000.0;
const SUSTAIN_END: f64 = 0.2;
const DECAY_END: f64 = 0.35;

/// Two-partial decaying tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoToneClick {
    pub fundamental_hz: f64,
    pub octave_hz: f64,
    label: &'static str,
}

impl TwoToneClick {
    /// G4 with its octave. Used for ordinary beats.
    pub const BEAT: Self = Self {
        fundamental_hz: 391.99,
        octave_hz: 783.98,
        label: "beat",
    };

    /// E5 with its octave. Marks the downbeat (first click of a pattern).
    pub const ACCENT: Self = Self {
        fundamental_hz: 659.25,
        octave_hz: 1318.5,
        label: "accent",
    };

    pub fn new(fundamental_hz: f64, octave_hz: f64) -> Self {
        Self {
            fundamental_hz,
            octave_hz,
            label: "two-tone",
        }
    }

    /// Number of samples actually produced for a click of `length` samples.
    pub fn active_len(length: usize) -> usize {
        (length as f64 * DECAY_END) as usize
    }

    fn partial(&self, hz: f64, amplitude: f64, index: usize, sample_rate: u32, gain: f64) -> i16 {
        let phase = TAU * hz * index as f64 / sample_rate as f64;
        (phase.sin() * amplitude * gain) as i16
    }
}

impl ClickWaveform for TwoToneClick {
    fn write(&self, buffer: &mut [i16], sample_rate: u32, click: &ClickEvent) -> usize {
        let sustain = (click.length() as f64 * SUSTAIN_END) as usize;
        let end = Self::active_len(click.length()).min(buffer.len());

        for (i, sample) in buffer.iter_mut().take(end).enumerate() {
            let gain = if i < sustain {
                1.0
            } else {
                let decay_len = Self::active_len(click.length()) - sustain;
                (Self::active_len(click.length()) - i) as f64 / decay_len as f64
            };
            let low = self.partial(self.fundamental_hz, LOW_AMPLITUDE, i, sample_rate, gain);
            let high = self.partial(self.octave_hz, HIGH_AMPLITUDE, i, sample_rate, gain);
            *sample = low.wrapping_add(high);
        }
        end
    }

    fn label(&self) -> &str {
        self.label
    }
}

/// Shared handle to the ordinary beat click.
pub fn beat() -> Arc<dyn ClickWaveform> {
    Arc::new(TwoToneClick::BEAT)
}

/// Shared handle to the downbeat click.
pub fn accent() -> Arc<dyn ClickWaveform> {
    Arc::new(TwoToneClick::ACCENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clicktrack_shared::SAMPLE_RATE;

    fn render(wave: TwoToneClick, length: usize) -> (Vec<i16>, usize) {
        let click = ClickEvent::new(0, length, Arc::new(wave));
        let mut buf = vec![0i16; length];
        let n = wave.write(&mut buf, SAMPLE_RATE, &click);
        (buf, n)
    }

    #[test]
    fn test_writes_35_percent_of_length() {
        let (buf, n) = render(TwoToneClick::BEAT, 1000);
        assert_eq!(n, 350);
        assert!(buf[350..].iter().all(|&s| s == 0));
        assert!(buf[..350].iter().any(|&s| s != 0));
    }

    #[test]
    fn test_sustain_then_decay() {
        let (buf, _) = render(TwoToneClick::ACCENT, 4000);
        let peak = |range: std::ops::Range<usize>| buf[range].iter().map(|s| s.unsigned_abs()).max().unwrap();
        // Sustained section reaches close to the combined amplitude, tail is quieter
        assert!(peak(0..800) > 20000);
        assert!(peak(1300..1400) < peak(0..800) / 2);
    }

    #[test]
    fn test_first_sample_is_silent() {
        let (buf, _) = render(TwoToneClick::BEAT, 100);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn test_respects_short_buffer() {
        let click = ClickEvent::new(0, 1000, beat());
        let mut buf = vec![0i16; 100];
        assert_eq!(TwoToneClick::BEAT.write(&mut buf, SAMPLE_RATE, &click), 100);
    }

    #[test]
    fn test_variants_differ() {
        let (low, _) = render(TwoToneClick::BEAT, 2000);
        let (high, _) = render(TwoToneClick::ACCENT, 2000);
        assert_ne!(low, high);
        assert_eq!(TwoToneClick::ACCENT.label(), "accent");
    }
}
