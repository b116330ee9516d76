use clap::{Parser, ValueEnum};
use clicktrack_engine::config::load_config;
use clicktrack_engine::export::save_wav;
use clicktrack_engine::{build_measure, MemoryBackend, Metronome, NoteDivision};
use clicktrack_shared::MetronomeConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Division {
    Quarter,
    Eighth,
}

impl From<Division> for NoteDivision {
    fn from(d: Division) -> Self {
        match d {
            Division::Quarter => NoteDivision::Quarter,
            Division::Eighth => NoteDivision::Eighth,
        }
    }
}

/// Play or export a looping click track without a UI.
#[derive(Debug, Parser)]
#[command(name = "headless_click")]
struct Args {
    #[arg(long, default_value_t = 120.0)]
    bpm: f64,
    #[arg(long, default_value_t = 4)]
    beats: u32,
    #[arg(long, value_enum, default_value_t = Division::Quarter)]
    division: Division,
    /// How long to play before finishing.
    #[arg(long, default_value_t = 5.0)]
    seconds: f64,
    #[arg(long)]
    volume: Option<f32>,
    /// JSON metronome settings.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the measure to a WAV file instead of playing it.
    #[arg(long)]
    export: Option<PathBuf>,
    #[arg(long, default_value_t = 8)]
    repeats: u32,
    /// Render into memory instead of the default output device.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();
    let args = Args::parse();

    let measure = build_measure(args.bpm, args.beats, args.division.into())?;
    log::info!(
        "[Headless] {} clicks over {} samples at {} bpm",
        measure.clicks.len(),
        measure.pattern_length,
        args.bpm
    );

    if let Some(path) = &args.export {
        save_wav(path, &measure.clicks, measure.pattern_length, args.repeats)?;
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => MetronomeConfig::default(),
    };
    let mut metronome = if args.dry_run {
        Metronome::with_backend(config, Arc::new(MemoryBackend::new()))
    } else {
        Metronome::new(config)
    };
    if let Some(v) = args.volume {
        metronome.set_volume(v);
    }

    metronome.start()?;
    metronome.set_pattern(&measure.clicks, measure.pattern_length)?;

    let started = Instant::now();
    let run_for = Duration::from_secs_f64(args.seconds.max(0.0));
    while started.elapsed() < run_for {
        thread::sleep(Duration::from_millis(250));
        let snap = metronome.phase_snapshot();
        log::info!(
            "[Headless] downbeat phase {:.3}, played {} samples",
            snap.ratio(0).unwrap_or(0.0),
            metronome.samples_played().unwrap_or(0)
        );
    }

    metronome.finish();
    log::info!("[Headless] Done.");
    Ok(())
}
