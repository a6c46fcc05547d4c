// Copyright 2026 The Loudbank Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Digital Signal Processing
//!
//! Loudbank turns a mono signal into a perceptual loudness matrix: one row per time frame, one
//! column per auditory channel, values in calibrated decibels.  It is the front end of a perceptual
//! audio distance.  Comparing two matrices happens downstream.
//!
//! ## Pipeline
//!
//! - [`bank`]: a bank of complex rotators, one per channel, each feeding a triple leaky
//!   integrator.  One complex multiply per channel per sample, no sample history.
//! - [`downsample`]: drives the bank over the signal and sums instantaneous energies into frames.
//! - [`masking`]: converts each finished frame to decibels and lets loud channels partially mask
//!   their quieter neighbours, first upward then downward in frequency.
//! - [`calibration`]: every fitted constant of the above, as plain values.
//!
//! [`Analyzer`] ties these together for the common case of one signal in, one matrix out.
//!
//! ## Precision
//!
//! Constants are computed in 64bit and truncated.  The per-sample loop runs in 32bit.  The rotator
//! phasors drift under rounding and are renormalized once per frame, which keeps the drift
//! bounded no matter how long the signal is.

use std::f64::consts::TAU as TAU64;

pub mod analyzer;
pub mod bank;
pub mod calibration;
pub mod downsample;
pub mod masking;

pub use analyzer::Analyzer;
pub use bank::Rotators;
pub use calibration::{BankCalibration, Calibration, DecibelScale, MaskingCalibration};
pub use downsample::ChannelMatrix;
pub use masking::{FrameView, Masking};

/// Rotor count used in production.
pub const DEFAULT_ROTATORS: usize = 128;
/// Lowest default rotor frequency.
pub const MIN_ROTOR_FREQ: f64 = 20.0;
/// Highest default rotor frequency.
pub const MAX_ROTOR_FREQ: f64 = 20_000.0;
/// Frame rate of the loudness matrix that downstream distance calibrations assume.
pub const PERCEPTUAL_SAMPLE_RATE: f64 = 100.0;

/// Samples per frame to reach `perceptual_rate` frames per second.  Never zero.
pub fn downsampling_for(sample_rate: f64, perceptual_rate: f64) -> usize {
    ((sample_rate / perceptual_rate).round() as usize).max(1)
}

/// Fixed-amplitude test tone.  Uses the same recursive rotation as the bank's phasors, computed in
/// 64bit and truncated to f32 on output.
pub struct Tone {
    re: f64,
    im: f64,
    cos: f64,
    sin: f64,
    amplitude: f64,
    fs: f64,
    f0: f64,
}

impl Tone {
    pub fn new(f0: f64, fs: f64, amplitude: f64) -> Self {
        let omega = TAU64 * f0 / fs;
        Self {
            re: 1.0,
            im: 0.0,
            cos: omega.cos(),
            sin: omega.sin(),
            amplitude,
            fs,
            f0,
        }
    }

    /// Change pitch without a phase discontinuity.
    pub fn set_frequency(&mut self, f0: f64) {
        let omega = TAU64 * f0 / self.fs;
        self.cos = omega.cos();
        self.sin = omega.sin();
        self.f0 = f0;
    }

    pub fn frequency(&self) -> f64 {
        self.f0
    }

    /// Number of samples needed to cover `nwaves` full cycles.
    pub fn nsamples(&self, nwaves: f64) -> usize {
        (self.fs / self.f0 * nwaves).ceil() as usize
    }

    /// Collect `n` samples.
    pub fn take_vec(&mut self, n: usize) -> Vec<f32> {
        self.by_ref().take(n).collect()
    }
}

impl Iterator for Tone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let out = (self.im * self.amplitude) as f32;
        let re = self.re * self.cos - self.im * self.sin;
        let im = self.re * self.sin + self.im * self.cos;
        self.re = re;
        self.im = im;
        Some(out)
    }
}
