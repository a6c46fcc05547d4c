// Copyright 2026 The Loudbank Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Perceptual loudness front end for audio quality metrics.
//!
//! A mono signal goes in, a frames by channels matrix of masked loudness in decibels comes out.
//! Two such matrices, one for a reference and one for a degraded signal, are what a perceptual
//! distance compares.  The distance itself, audio decoding and opinion-score mapping live outside
//! this crate.  [`mos`] describes the seams where they plug in.
//!
//! ```no_run
//! use loudbank_lib::dsp::{Analyzer, Calibration, Tone};
//!
//! let analyzer = Analyzer::<128>::with_defaults(48_000.0, &Calibration::default())?;
//! let signal = Tone::new(1000.0, 48_000.0, 0.5).take_vec(48_000);
//! let loudness = analyzer.analyze(&signal)?;
//! assert_eq!(loudness.frame_count(), 100);
//! # Ok::<(), loudbank_lib::LoudbankError>(())
//! ```
//!
//! Processing is single threaded and allocation free once the output matrix exists.  Independent
//! signals can be analyzed in parallel with one bank each.

pub mod dsp;
pub mod mos;

#[derive(thiserror::Error, Debug)]
pub enum LoudbankError {
    #[error("not enough {what}: need {expected}, got {actual}")]
    InsufficientChannels {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The destination matrix does not fit the signal length and downsampling factor.
    #[error("frame count mismatch: destination has {expected_frames} frames, signal filled {produced_frames}")]
    FrameCountMismatch {
        expected_frames: usize,
        produced_frames: usize,
    },

    #[error("calibration parse: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LoudbankError>;
