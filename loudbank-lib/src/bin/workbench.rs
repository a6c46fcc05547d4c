// Copyright 2026 The Loudbank Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Workbench
//!
//! The workbench is used for engineering checks of the rotator bank and masking calibration.  It
//! prints the effective constants, the per-rotor bands, and the loudness that simple generated
//! signals produce.
//!
//! ## Usage
//!
//! ```text
//! workbench config
//! workbench bands --rotators 16
//! workbench tone --frequency 1000 --seconds 2 --amplitude 0.5
//! workbench --calibration tuned.toml silence
//! ```
//!
//! Set `RUST_LOG=debug` to see what the library logs while building banks.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use loudbank_lib::{
    self as loudbank,
    dsp::{self, Analyzer, Calibration, ChannelMatrix, Rotators, Tone, bank::log_frequencies},
};

#[derive(Parser, Debug)]
#[command(name = "workbench")]
#[command(about = "Engineering checks for the loudness filter bank.", long_about = None)]
#[command(arg_required_else_help = true)]
struct Args {
    /// TOML file overriding calibration constants
    #[arg(long, global = true)]
    calibration: Option<PathBuf>,

    /// Sample rate in Hz
    #[arg(long, global = true)]
    sample_rate: Option<f32>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, thiserror::Error)]
enum WorkbenchError {
    #[error("{0}")]
    Loudbank(#[from] loudbank::LoudbankError),
    #[error("{0}")]
    Usage(String),
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show default workbench settings and the effective calibration
    Config(ConfigArgs),
    /// Show per-rotor frequency, bandwidth, window and gain
    Bands(BandsArgs),
    /// Analyze silence and report the floor level
    Silence(SilenceArgs),
    /// Analyze a generated sine and report mean loudness per rotor
    Tone(ToneArgs),
    /// Load a calibration file and show what it changes
    Calibration(CalibrationArgs),
}

#[derive(clap::Args, Debug)]
struct ConfigArgs {}

#[derive(clap::Args, Debug)]
struct BandsArgs {
    /// Number of rotators to show, spread over the same range as the full bank
    #[arg(long, default_value_t = 16)]
    rotators: usize,
}

#[derive(clap::Args, Debug)]
struct SilenceArgs {
    /// Length of silence in seconds
    #[arg(long, default_value_t = 1.0)]
    seconds: f32,
}

#[derive(clap::Args, Debug)]
struct ToneArgs {
    /// Tone frequency in Hz
    #[arg(long, default_value_t = 1000.0)]
    frequency: f64,

    /// Length of the tone in seconds
    #[arg(long, default_value_t = 1.0)]
    seconds: f32,

    /// Peak amplitude, 1.0 is full scale
    #[arg(long, default_value_t = 0.5)]
    amplitude: f64,

    /// Print only rotors within this many dB of the loudest
    #[arg(long, default_value_t = 30.0)]
    range: f32,
}

#[derive(clap::Args, Debug)]
struct CalibrationArgs {
    #[arg(index = 1, required = true)]
    file: PathBuf,
}

fn main() -> Result<(), WorkbenchError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = WorkbenchConfig::defaults();
    if let Some(fs) = args.sample_rate {
        cfg.sample_rate = fs;
    }
    if let Some(path) = &args.calibration {
        cfg.calibration = Calibration::load(path)?;
        tracing::info!(path = %path.display(), "calibration loaded");
    }

    match args.command {
        None => Err(WorkbenchError::Usage("no command given".to_string())),
        Some(Command::Config(_)) => cmd_config(&cfg),
        Some(Command::Bands(a)) => cmd_bands(&cfg, a),
        Some(Command::Silence(a)) => cmd_silence(&cfg, a),
        Some(Command::Tone(a)) => cmd_tone(&cfg, a),
        Some(Command::Calibration(a)) => cmd_calibration(a),
    }
}

const INDENT: usize = 2;
const LABEL_W: usize = 32; // includes colon
const VALUE_W: usize = 22;

macro_rules! header {
    ($($arg:tt)*) => {{
        const WIDTH: usize = INDENT + LABEL_W + 1 + VALUE_W;
        let title = format!($($arg)*);
        println!("\n{title}");
        println!("{}", "=".repeat(WIDTH));
    }};
}

macro_rules! row {
    ($label:expr, $fmt:expr, $value:expr) => {{
        let value = format!($fmt, $value);
        println!(
            "{:indent$}{label:<label_w$} {:>value_w$}",
            "",
            value,
            indent = INDENT,
            label = format!("{}:", $label),
            label_w = LABEL_W,
            value_w = VALUE_W,
        );
    }};
}

/// Settings every command starts from.
struct WorkbenchConfig {
    sample_rate: f32,
    calibration: Calibration,
}

impl WorkbenchConfig {
    fn defaults() -> Self {
        WorkbenchConfig {
            sample_rate: 48_000.0,
            calibration: Calibration::default(),
        }
    }

    /// Samples per frame at the perceptual frame rate.
    fn downsampling(&self) -> usize {
        dsp::downsampling_for(self.sample_rate as f64, dsp::PERCEPTUAL_SAMPLE_RATE)
    }

    fn analyzer(&self) -> Result<Analyzer<{ dsp::DEFAULT_ROTATORS }>, WorkbenchError> {
        Ok(Analyzer::with_defaults(self.sample_rate, &self.calibration)?)
    }

    fn samples(&self, seconds: f32) -> Result<usize, WorkbenchError> {
        if !(seconds.is_finite() && seconds > 0.0) {
            return Err(WorkbenchError::Usage(format!(
                "seconds must be positive, got {seconds}"
            )));
        }
        Ok((seconds * self.sample_rate).round() as usize)
    }
}

fn print_calibration(calibration: &Calibration) {
    let bank = &calibration.bank;
    let masking = &calibration.masking;

    header!("Bank Calibration");
    row!("Window base", "{:.16}", bank.window_base);
    row!("Bandwidth magic", "{:.16}", bank.bandwidth_magic);
    row!("Full scale sine", "{:.6}", bank.full_scale_sine_db);
    row!("Full scale gain", "{:.6e}", bank.full_scale_gain());

    header!("Masking Calibration");
    row!("Epsilon", "{:.6e}", masking.epsilon());
    row!("Silence floor", "{:.5} dB", masking.decibel_scale().floor());
    row!("Min limit", "{:.5} dB", masking.min_limit);
    row!("Octave span", "{:.5}", masking.octave_span);
    row!("Step per octave up", "{:.3?}", masking.step_per_octave_up);
    row!("Gap up", "{:.5} dB", masking.gap_up);
    row!("Strength up", "{:.5}", masking.strength_up);
    row!("Blur up", "{:.5}", masking.blur_up);
    row!("Fraction up", "{:.5}", masking.fraction_up);
    row!("Step per octave down", "{:.5}", masking.step_per_octave_down);
    row!("Gap down", "{:.5} dB", masking.gap_down);
    row!("Strength down", "{:.5}", masking.strength_down);
    row!("Fraction down", "{:.5}", masking.fraction_down);
}

fn cmd_config(cfg: &WorkbenchConfig) -> Result<(), WorkbenchError> {
    header!("Loudbank Workbench Configured Defaults");
    row!("Min frequency", "{:.2} Hz", dsp::MIN_ROTOR_FREQ);
    row!("Max frequency", "{:.2} Hz", dsp::MAX_ROTOR_FREQ);
    row!("Rotators", "{}", dsp::DEFAULT_ROTATORS);
    row!("Sample frequency", "{} Hz", cfg.sample_rate);
    row!("Perceptual frame rate", "{} Hz", dsp::PERCEPTUAL_SAMPLE_RATE);
    row!("Downsampling", "{}", cfg.downsampling());
    row!(
        "MOS minimum bandwidth",
        "{} Hz",
        loudbank::mos::MINIMUM_BANDWIDTH_HZ
    );

    print_calibration(&cfg.calibration);
    Ok(())
}

fn cmd_bands(cfg: &WorkbenchConfig, args: BandsArgs) -> Result<(), WorkbenchError> {
    // The full bank's bands, sampled down to a readable table.
    let bank = Rotators::<{ dsp::DEFAULT_ROTATORS }>::new(
        &log_frequencies(dsp::MIN_ROTOR_FREQ, dsp::MAX_ROTOR_FREQ, dsp::DEFAULT_ROTATORS)
            .into_iter()
            .map(|f| f as f32)
            .collect::<Vec<f32>>(),
        &[1.0; dsp::DEFAULT_ROTATORS],
        cfg.sample_rate,
        &cfg.calibration.bank,
    )?;

    let shown = args.rotators.clamp(2, dsp::DEFAULT_ROTATORS);
    let last = dsp::DEFAULT_ROTATORS - 1;

    header!(
        "Rotator Bands ({shown} of {}) at {} Hz",
        dsp::DEFAULT_ROTATORS,
        bank.sample_rate()
    );
    println!(
        "{:indent$}{:>5} {:>12} {:>12} {:>14} {:>14}",
        "",
        "k",
        "center Hz",
        "bw Hz",
        "window",
        "gain",
        indent = INDENT
    );
    for i in 0..shown {
        let k = (i * last + (shown - 1) / 2) / (shown - 1);
        println!(
            "{:indent$}{:>5} {:>12.2} {:>12.3} {:>14.10} {:>14.6e}",
            "",
            k,
            bank.frequencies()[k],
            bank.bandwidth(k),
            bank.window(k),
            bank.gain(k),
            indent = INDENT
        );
    }
    Ok(())
}

fn cmd_silence(cfg: &WorkbenchConfig, args: SilenceArgs) -> Result<(), WorkbenchError> {
    let analyzer = cfg.analyzer()?;
    let signal = vec![0.0f32; cfg.samples(args.seconds)?];
    let loudness = analyzer.analyze(&signal)?;

    let (min, max) = extremes(&loudness);
    header!("Silence ({} s)", args.seconds);
    row!("Frames", "{}", loudness.frame_count());
    row!("Expected floor", "{:.5} dB", analyzer.silence_db());
    row!("Min", "{:.5} dB", min);
    row!("Max", "{:.5} dB", max);
    Ok(())
}

fn cmd_tone(cfg: &WorkbenchConfig, args: ToneArgs) -> Result<(), WorkbenchError> {
    let nyquist = cfg.sample_rate as f64 * 0.5;
    if !(args.frequency > 0.0 && args.frequency < nyquist) {
        return Err(WorkbenchError::Usage(format!(
            "frequency must lie in (0, {nyquist}) Hz, got {}",
            args.frequency
        )));
    }

    let analyzer = cfg.analyzer()?;
    let signal = Tone::new(args.frequency, cfg.sample_rate as f64, args.amplitude)
        .take_vec(cfg.samples(args.seconds)?);
    let loudness = analyzer.analyze(&signal)?;

    let mean = loudness.mean();
    let loudest = mean.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let peak = mean
        .iter()
        .position(|v| *v == loudest)
        .unwrap_or_default();

    header!(
        "Tone {:.2} Hz at {:.3} ({} frames)",
        args.frequency,
        args.amplitude,
        loudness.frame_count()
    );
    row!("Loudest rotor", "{}", peak);
    row!("Loudest center", "{:.2} Hz", analyzer.frequencies()[peak]);
    row!("Loudest level", "{:.3} dB", loudest);
    row!("Silence floor", "{:.3} dB", analyzer.silence_db());

    println!();
    for (k, (f, v)) in analyzer.frequencies().iter().zip(mean.iter()).enumerate() {
        if *v >= loudest - args.range {
            row!(format!("{k:>3} {f:>9.2} Hz"), "{:.3} dB", v);
        }
    }
    Ok(())
}

fn cmd_calibration(args: CalibrationArgs) -> Result<(), WorkbenchError> {
    let loaded = Calibration::load(&args.file)?;
    let defaults = Calibration::default();

    header!("Calibration {}", args.file.display());
    if loaded == defaults {
        println!("  no changes from defaults");
    } else {
        if loaded.bank != defaults.bank {
            println!("  [bank] overridden");
        }
        if loaded.masking != defaults.masking {
            println!("  [masking] overridden");
        }
    }
    print_calibration(&loaded);
    Ok(())
}

fn extremes<const N: usize>(loudness: &ChannelMatrix<N>) -> (f32, f32) {
    loudness
        .rows()
        .flat_map(|row| row.iter())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}
