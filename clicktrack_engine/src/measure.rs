//! Builds one measure of clicks from a tempo and a note division.

use clicktrack_shared::{ClickEvent, PatternError, SAMPLE_RATE};

use crate::waveform;

/// How each beat of a measure is subdivided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteDivision {
    /// One click per beat.
    Quarter,
    /// Clicks on the beat and halfway through it.
    Eighth,
}

impl NoteDivision {
    /// Click positions as fractions of one beat.
    pub fn offsets(self) -> &'static [f64] {
        match self {
            NoteDivision::Quarter => &[0.0],
            NoteDivision::Eighth => &[0.0, 0.5],
        }
    }

    /// Click length as a fraction of one beat.
    pub fn click_fraction(self) -> f64 {
        1.0 / 8.0
    }
}

/// A ready-to-play pattern.
#[derive(Debug, Clone)]
pub struct Measure {
    pub clicks: Vec<ClickEvent>,
    pub pattern_length: i64,
}

pub fn samples_per_beat(bpm: f64) -> Result<i64, PatternError> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(PatternError::InvalidSpec(format!("tempo must be positive, got {}", bpm)));
    }
    let samples = (60.0 * SAMPLE_RATE as f64 / bpm) as i64;
    if samples <= 0 {
        return Err(PatternError::InvalidSpec(format!("tempo {} is too fast", bpm)));
    }
    Ok(samples)
}

/// Lay out `beats` beats at `bpm`. The first click of the measure uses the accent
/// sound; every other click uses the ordinary beat sound.
pub fn build_measure(bpm: f64, beats: u32, division: NoteDivision) -> Result<Measure, PatternError> {
    if beats == 0 {
        return Err(PatternError::InvalidSpec("a measure needs at least one beat".into()));
    }
    let beat_len = samples_per_beat(bpm)?;
    let click_len = ((division.click_fraction() * beat_len as f64) as usize).max(1);

    let accent = waveform::accent();
    let beat = waveform::beat();

    let mut clicks = Vec::with_capacity(beats as usize * division.offsets().len());
    for index in 0..beats as i64 {
        for (sub, offset) in division.offsets().iter().enumerate() {
            let when = (offset * beat_len as f64) as i64 + beat_len * index;
            let sound = if index == 0 && sub == 0 { accent.clone() } else { beat.clone() };
            clicks.push(ClickEvent::new(when, click_len, sound));
        }
    }

    Ok(Measure {
        clicks,
        pattern_length: beat_len * beats as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_samples_per_beat() {
        assert_eq!(samples_per_beat(120.0).unwrap(), 22050);
        assert_eq!(samples_per_beat(60.0).unwrap(), 44100);
        assert_eq!(samples_per_beat(7.0).unwrap(), 378000);
        assert!(samples_per_beat(0.0).is_err());
        assert!(samples_per_beat(f64::NAN).is_err());
        assert!(samples_per_beat(-10.0).is_err());
    }

    #[test]
    fn test_quarter_measure() {
        let m = build_measure(120.0, 4, NoteDivision::Quarter).unwrap();
        assert_eq!(m.pattern_length, 88200);
        let whens: Vec<i64> = m.clicks.iter().map(|c| c.when()).collect();
        assert_eq!(whens, vec![0, 22050, 44100, 66150]);
        assert!(m.clicks.iter().all(|c| c.length() == 2756));
        assert_eq!(m.clicks[0].waveform().label(), "accent");
        assert!(m.clicks[1..].iter().all(|c| c.waveform().label() == "beat"));
        // Ordinary clicks share one generator
        assert!(Arc::ptr_eq(m.clicks[1].waveform(), m.clicks[2].waveform()));
    }

    #[test]
    fn test_eighth_measure() {
        let m = build_measure(60.0, 3, NoteDivision::Eighth).unwrap();
        let whens: Vec<i64> = m.clicks.iter().map(|c| c.when()).collect();
        assert_eq!(whens, vec![0, 22050, 44100, 66150, 88200, 110250]);
        assert_eq!(m.pattern_length, 132300);
        assert_eq!(m.clicks[1].waveform().label(), "beat");
    }

    #[test]
    fn test_zero_beats_rejected() {
        assert!(matches!(
            build_measure(120.0, 0, NoteDivision::Quarter),
            Err(PatternError::InvalidSpec(_))
        ));
    }
}
