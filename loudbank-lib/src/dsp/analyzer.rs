// Copyright 2026 The Loudbank Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Analyzer
//!
//! One signal in, one loudness matrix out.  Sizes the matrix from the signal length, builds a fresh
//! bank per signal so no state leaks between calls, and runs the downsampling driver.

use super::bank::{Rotators, log_frequencies};
use super::calibration::Calibration;
use super::downsample::ChannelMatrix;
use super::masking::Masking;
use super::{MAX_ROTOR_FREQ, MIN_ROTOR_FREQ, PERCEPTUAL_SAMPLE_RATE, downsampling_for};
use crate::{LoudbankError, Result};

/// Reusable analysis settings for `N` rotators.
#[derive(Debug, Clone)]
pub struct Analyzer<const N: usize> {
    frequencies: Vec<f32>,
    filter_gains: Vec<f32>,
    sample_rate: f32,
    downsampling: usize,
    calibration: Calibration,
    masking: Masking<N>,
}

impl<const N: usize> Analyzer<N> {
    pub fn new(
        frequencies: &[f32],
        filter_gains: &[f32],
        sample_rate: f32,
        downsampling: usize,
        calibration: &Calibration,
    ) -> Result<Self> {
        if downsampling == 0 {
            return Err(LoudbankError::InvalidParameter(
                "downsampling must be at least one sample".to_string(),
            ));
        }
        calibration.validate()?;
        let masking = Masking::new(&calibration.masking)?;

        // Constructing a bank validates the frequencies, gains and sample rate up front.
        Rotators::<N>::new(frequencies, filter_gains, sample_rate, &calibration.bank)?;

        Ok(Self {
            frequencies: frequencies[..N].to_vec(),
            filter_gains: filter_gains[..N].to_vec(),
            sample_rate,
            downsampling,
            calibration: *calibration,
            masking,
        })
    }

    /// Log-spaced rotors over the audible range, unit gains and a 100 Hz frame rate.
    pub fn with_defaults(sample_rate: f32, calibration: &Calibration) -> Result<Self> {
        if N < 2 {
            return Err(LoudbankError::InsufficientChannels {
                what: "rotators",
                expected: 2,
                actual: N,
            });
        }
        let frequencies: Vec<f32> = log_frequencies(MIN_ROTOR_FREQ, MAX_ROTOR_FREQ, N)
            .into_iter()
            .map(|f| f as f32)
            .collect();
        let downsampling = downsampling_for(sample_rate as f64, PERCEPTUAL_SAMPLE_RATE);
        Self::new(
            &frequencies,
            &[1.0; N],
            sample_rate,
            downsampling,
            calibration,
        )
    }

    /// Frames produced for `samples` input samples.  A trailing partial frame counts.
    pub fn frame_count(&self, samples: usize) -> usize {
        samples.div_ceil(self.downsampling)
    }

    pub fn analyze(&self, signal: &[f32]) -> Result<ChannelMatrix<N>> {
        let mut bank = Rotators::<N>::new(
            &self.frequencies,
            &self.filter_gains,
            self.sample_rate,
            &self.calibration.bank,
        )?;
        let mut channels = ChannelMatrix::new(self.frame_count(signal.len()));
        bank.filter_and_downsample(signal, &mut channels, self.downsampling, &self.masking)?;
        tracing::trace!(
            samples = signal.len(),
            frames = channels.frame_count(),
            "signal analyzed"
        );
        Ok(channels)
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    pub fn filter_gains(&self) -> &[f32] {
        &self.filter_gains
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn downsampling(&self) -> usize {
        self.downsampling
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Level every rotor reports for silence.
    pub fn silence_db(&self) -> f32 {
        self.masking.scale().floor().max(self.calibration.masking.min_limit)
    }
}
