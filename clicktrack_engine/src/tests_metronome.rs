use crate::device::MemoryBackend;
use crate::measure::{build_measure, NoteDivision};
use crate::waveform;
use crate::{EngineError, Metronome, PatternCompiler};
use clicktrack_shared::{ClickEvent, DeviceError, MetronomeConfig, PatternError, SAMPLE_RATE};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn config() -> MetronomeConfig {
    MetronomeConfig {
        renderer_idle_ms: 5,
        ..MetronomeConfig::default()
    }
}

fn metronome(backend: &MemoryBackend) -> Metronome {
    Metronome::with_backend(config(), Arc::new(backend.clone()))
}

fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn half_second_measure() -> (Vec<ClickEvent>, i64) {
    let length = (SAMPLE_RATE / 2) as i64;
    let click_len = (length / 32) as usize;
    let mut clicks = vec![ClickEvent::new(0, click_len, waveform::accent())];
    for i in 1..4 {
        clicks.push(ClickEvent::new(i * length / 4, click_len, waveform::beat()));
    }
    (clicks, length)
}

#[test]
fn test_finish_without_start_is_noop() {
    let backend = MemoryBackend::new();
    let mut m = metronome(&backend);
    m.finish();
    assert!(!m.is_running());
    assert_eq!(backend.opened(), 0);
}

#[test]
fn test_double_start_keeps_one_pair() {
    let backend = MemoryBackend::new();
    let mut m = metronome(&backend);
    m.start().unwrap();
    m.start().unwrap();
    assert!(m.is_running());
    assert_eq!(backend.opened(), 1);

    m.finish();
    assert!(!m.is_running());
    assert_eq!(backend.released(), 1);
}

#[test]
fn test_pattern_set_before_start_plays_on_start() {
    let backend = MemoryBackend::with_speed(20.0);
    let mut m = metronome(&backend);
    let (clicks, length) = half_second_measure();
    m.set_pattern(&clicks, length).unwrap();
    assert_eq!(backend.opened(), 0);

    m.start().unwrap();
    assert!(wait_for(|| backend.writes() >= 1));
    m.finish();

    let expected = PatternCompiler::compile(&clicks, SAMPLE_RATE, length).unwrap();
    let captured = backend.captured();
    assert_eq!(&captured[..length as usize], &expected[..]);
}

#[test]
fn test_pattern_set_while_running_swaps_and_resets() {
    let backend = MemoryBackend::with_speed(20.0);
    let mut m = metronome(&backend);
    m.start().unwrap();
    assert!(m.phase_snapshot().is_empty());

    let (clicks, length) = half_second_measure();
    m.set_pattern(&clicks, length).unwrap();
    assert!(wait_for(|| backend.writes() >= 1 && backend.flushes() == 1));

    let snap = m.phase_snapshot();
    assert_eq!(snap.ratios.len(), 4);
    assert_eq!(snap.pattern_length, length);
    assert!(snap.ratio(0).unwrap() < 0.5);
    assert_eq!(m.pattern_length(), length);
    m.finish();
}

#[test]
fn test_ratios_visible_on_original_events() {
    let backend = MemoryBackend::with_speed(20.0);
    let mut m = metronome(&backend);
    let (clicks, length) = half_second_measure();
    m.set_pattern(&clicks, length).unwrap();
    m.start().unwrap();

    thread::sleep(Duration::from_millis(60));
    let downbeat = clicks[0].ratio();
    assert!(downbeat > 0.0 && downbeat < 1.0);
    // The third click sits half a loop later, so its phase is half a loop away
    let diff = (clicks[0].ratio() - clicks[2].ratio()).rem_euclid(1.0);
    assert!((diff - 0.5).abs() < 0.05, "diff {}", diff);
    m.finish();
}

#[test]
fn test_empty_pattern_silences_without_stopping() {
    let backend = MemoryBackend::with_speed(20.0);
    let mut m = metronome(&backend);
    let (clicks, length) = half_second_measure();
    m.set_pattern(&clicks, length).unwrap();
    m.start().unwrap();
    assert!(wait_for(|| backend.writes() >= 1));

    m.set_pattern(&[], 0).unwrap();
    assert!(m.is_running());
    assert!(m.clicks().is_none());
    assert!(m.phase_snapshot().is_empty());

    // No further writes once the in-flight one has finished
    thread::sleep(Duration::from_millis(50));
    let writes = backend.writes();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(backend.writes(), writes);
    m.finish();
}

#[test]
fn test_failed_set_pattern_keeps_previous() {
    let backend = MemoryBackend::with_speed(20.0);
    let mut m = metronome(&backend);
    let (clicks, length) = half_second_measure();
    m.set_pattern(&clicks, length).unwrap();
    m.start().unwrap();

    let bad = vec![ClickEvent::new(length, 100, waveform::beat())];
    let err = m.set_pattern(&bad, length).unwrap_err();
    assert_eq!(err, EngineError::Pattern(PatternError::OutOfRange { when: length, length }));
    assert_eq!(m.clicks().unwrap().len(), 4);
    assert_eq!(m.pattern_length(), length);

    let err = m.set_pattern(&clicks, 0).unwrap_err();
    assert!(matches!(err, EngineError::Pattern(PatternError::InvalidSpec(_))));
    assert_eq!(m.phase_snapshot().ratios.len(), 4);
    m.finish();
}

#[test]
fn test_invalid_pattern_rejected_while_stopped() {
    let backend = MemoryBackend::new();
    let mut m = metronome(&backend);
    let bad = vec![ClickEvent::new(-1, 100, waveform::beat())];
    assert!(m.set_pattern(&bad, 100).is_err());
    assert!(m.clicks().is_none());
}

#[test]
fn test_finish_clears_pattern() {
    let backend = MemoryBackend::with_speed(20.0);
    let mut m = metronome(&backend);
    let (clicks, length) = half_second_measure();
    m.set_pattern(&clicks, length).unwrap();
    m.start().unwrap();
    m.finish();
    assert!(m.clicks().is_none());
    assert_eq!(m.pattern_length(), 0);

    // A restart without a new pattern plays nothing
    m.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(backend.opened(), 2);
    let writes = backend.writes();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(backend.writes(), writes);
    m.finish();
}

#[test]
fn test_device_open_failure_surfaces_from_start() {
    let backend = MemoryBackend::new();
    backend.fail_open(true);
    let mut m = metronome(&backend);
    let err = m.start().unwrap_err();
    assert_eq!(err, EngineError::Device(DeviceError::NoDevice));
    assert!(!m.is_running());

    backend.fail_open(false);
    m.start().unwrap();
    assert!(m.is_running());
    m.finish();
}

#[test]
fn test_restart_after_device_failure() {
    let backend = MemoryBackend::with_speed(0.0);
    backend.fail_writes(true);
    let mut m = metronome(&backend);
    let (clicks, length) = half_second_measure();
    m.set_pattern(&clicks, length).unwrap();
    m.start().unwrap();
    assert!(wait_for(|| !m.is_running()));

    backend.fail_writes(false);
    m.start().unwrap();
    assert!(m.is_running());
    assert_eq!(backend.opened(), 2);
    m.finish();
}

#[test]
fn test_volume_is_remembered_across_restarts() {
    let backend = MemoryBackend::with_speed(20.0);
    let mut m = metronome(&backend);
    m.set_volume(2.0);
    assert_eq!(m.volume(), 1.0);
    m.set_volume(0.25);
    m.start().unwrap();
    assert_eq!(backend.volume(), 0.25);
    m.finish();
}

#[test]
fn test_measure_plays_end_to_end() {
    let backend = MemoryBackend::with_speed(20.0);
    let mut m = metronome(&backend);
    let measure = build_measure(240.0, 4, NoteDivision::Quarter).unwrap();
    m.start().unwrap();
    m.set_pattern(&measure.clicks, measure.pattern_length).unwrap();
    assert!(wait_for(|| backend.total_written() >= measure.pattern_length as usize * 2));
    assert!(m.samples_played().unwrap() >= measure.pattern_length as u64);
    m.finish();
}
