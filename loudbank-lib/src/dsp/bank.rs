// Copyright 2026 The Loudbank Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Bank
//!
//! *A bank of rotators combs the signal for energy, one auditory channel at a time.*
//!
//! Each rotator is a complex phasor spinning at its channel's center frequency.  Multiplying the
//! signal by the phasor demodulates that channel down to DC, where a triple leaky integrator
//! smooths it into a windowed spectral estimate without storing any sample history.  The squared
//! magnitude of the last integrator stage is the channel's instantaneous energy.
//!
//! The phasor is advanced by one complex multiply per sample.  Rounding makes its magnitude wander
//! away from the designed gain over millions of samples, so the bank must be
//! [`renormalized`](Rotators::renormalize) periodically.  The downsampling driver does this once
//! per output frame.
//!
//! Only mono input is processed.  Multi-channel audio should be analyzed one channel at a time
//! with one bank per channel.

use aligned::{A32, Aligned};
use num_complex::Complex32;
use num_traits::{Float, Zero};

use super::calibration::BankCalibration;
use crate::{LoudbankError, Result};

/// Effective bandwidth of a channel from its own and its neighbours' center frequencies.  Sums
/// the distances from `mid` to the geometric means of each neighbouring pair.
pub fn bandwidth<T: Float>(low: T, mid: T, high: T) -> T {
    let geo_mean_low = (low * mid).sqrt();
    let geo_mean_high = (mid * high).sqrt();
    (geo_mean_high - mid).abs() + (mid - geo_mean_low).abs()
}

/// Bandwidth of channel `i` within `frequencies`.  Edge channels have only one neighbour, so it is
/// reflected to stand in for the missing one.
fn channel_bandwidth(frequencies: &[f64], i: usize) -> f64 {
    let last = frequencies.len() - 1;
    let low = if i == 0 {
        frequencies[1]
    } else {
        frequencies[i - 1]
    };
    let high = if i == last {
        frequencies[last - 1]
    } else {
        frequencies[i + 1]
    };
    bandwidth(low, frequencies[i], high)
}

/// Return `count` log-spaced center frequencies from `min` to `max` inclusive.
pub fn log_frequencies(min: f64, max: f64, count: usize) -> Vec<f64> {
    assert!(max > min);
    assert!(min > 0.0);
    assert!(count > 1);

    // Walking the log: equal ratios between neighbours rather than equal differences.  The ratio
    // max / min is chopped into count - 1 equal factors.
    let log_step = (max / min).log2() / (count - 1) as f64;
    (0..count)
        .map(|i| {
            if i == count - 1 {
                max
            } else {
                min * (log_step * i as f64).exp2()
            }
        })
        .collect()
}

/// Bank of `N` rotators with their triple leaky integrators.
///
/// Each rotator's phasor starts at its gain with zero phase.  The per-sample increment is
/// `exp(-i * 2pi * f / fs)`, so multiplying by it is a single complex multiply.
pub struct Rotators<const N: usize> {
    /// Fixed per-sample rotation.
    increment: Aligned<A32, [Complex32; N]>,
    /// Current phasor, magnitude kept near `gain` by `renormalize`.
    phasor: Aligned<A32, [Complex32; N]>,
    /// Integrator stages, first to last.
    accu: [Aligned<A32, [Complex32; N]>; 3],
    /// Leak coefficient of every integrator stage.
    window: Aligned<A32, [f32; N]>,
    /// Designed phasor magnitude.
    gain: Aligned<A32, [f32; N]>,
    frequencies: [f32; N],
    sample_rate: f32,
}

impl<const N: usize> Rotators<N> {
    /// Build the bank.  `frequencies` and `filter_gains` must each hold at least `N` entries;
    /// extra entries are ignored.
    pub fn new(
        frequencies: &[f32],
        filter_gains: &[f32],
        sample_rate: f32,
        calibration: &BankCalibration,
    ) -> Result<Self> {
        if N < 2 {
            return Err(LoudbankError::InsufficientChannels {
                what: "rotators",
                expected: 2,
                actual: N,
            });
        }
        if frequencies.len() < N {
            return Err(LoudbankError::InsufficientChannels {
                what: "frequencies",
                expected: N,
                actual: frequencies.len(),
            });
        }
        if filter_gains.len() < N {
            return Err(LoudbankError::InsufficientChannels {
                what: "filter gains",
                expected: N,
                actual: filter_gains.len(),
            });
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(LoudbankError::InvalidParameter(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        if let Some(bad) = frequencies[..N]
            .iter()
            .find(|f| !(f.is_finite() && **f > 0.0))
        {
            return Err(LoudbankError::InvalidParameter(format!(
                "center frequencies must be positive, got {bad}"
            )));
        }

        let nyquist = sample_rate * 0.5;
        if frequencies[..N].iter().any(|f| *f > nyquist) {
            tracing::warn!(nyquist, "rotator frequencies above nyquist will alias");
        }

        // Initialization is 64bit and truncates after calculating constants.
        let wide: Vec<f64> = frequencies[..N].iter().map(|f| *f as f64).collect();
        let full_scale = calibration.full_scale_gain();

        let mut window = Aligned([0.0f32; N]);
        let mut gain = Aligned([0.0f32; N]);
        let mut increment = Aligned([Complex32::zero(); N]);
        for i in 0..N {
            let bw = channel_bandwidth(&wide, i);
            // Narrower bandwidth, longer integration.
            let w = calibration.window_base.powf(bw * calibration.bandwidth_magic);
            window[i] = w as f32;
            // Cubed for the three integrator stages.
            gain[i] = (full_scale * filter_gains[i] as f64 * (1.0 - w).powi(3)) as f32;
            let omega = std::f64::consts::TAU * wide[i] / sample_rate as f64;
            increment[i] = Complex32::new(omega.cos() as f32, -omega.sin() as f32);
        }

        let mut bank = Self {
            increment,
            phasor: Aligned([Complex32::zero(); N]),
            accu: std::array::from_fn(|_| Aligned([Complex32::zero(); N])),
            window,
            gain,
            frequencies: std::array::from_fn(|i| frequencies[i]),
            sample_rate,
        };
        bank.reset();

        tracing::debug!(
            rotators = N,
            sample_rate,
            window_min = bank.window.iter().cloned().fold(f32::INFINITY, f32::min),
            window_max = bank.window.iter().cloned().fold(f32::NEG_INFINITY, f32::max),
            "rotator bank constructed"
        );

        Ok(bank)
    }

    /// Return every rotator to its freshly-constructed state.
    pub fn reset(&mut self) {
        for (phasor, gain) in self.phasor.iter_mut().zip(self.gain.iter()) {
            *phasor = Complex32::new(*gain, 0.0);
        }
        for stage in self.accu.iter_mut() {
            stage.fill(Complex32::zero());
        }
    }

    /// Advance every rotator and integrator by one input sample.
    ///
    /// Each stage leaks by the window, the second stage takes in the leaked first stage, the third
    /// takes in the updated second stage, and finally the first stage takes in the new phasor
    /// scaled by the sample.  Rotators are independent of each other.
    #[inline]
    pub fn increment_all(&mut self, sample: f32) {
        let [a0, a1, a2] = &mut self.accu;
        for i in 0..N {
            let phasor = self.phasor[i] * self.increment[i];
            self.phasor[i] = phasor;

            let w = self.window[i];
            a0[i] *= w;
            a1[i] *= w;
            a2[i] *= w;
            a1[i] += a0[i];
            a2[i] += a1[i];
            a0[i] += phasor * sample;
        }
    }

    /// Rescale each phasor to exactly its designed gain.  Phase is untouched.
    pub fn renormalize(&mut self) {
        for (phasor, gain) in self.phasor.iter_mut().zip(self.gain.iter()) {
            let norm = phasor.norm_sqr().sqrt();
            if norm > 0.0 {
                *phasor *= *gain / norm;
            }
        }
    }

    /// Instantaneous energy of rotator `i`, the squared magnitude of its last integrator stage.
    #[inline]
    pub fn energy(&self, i: usize) -> f32 {
        self.accu[2][i].norm_sqr()
    }

    /// Current phasor of rotator `i`.
    pub fn phasor(&self, i: usize) -> Complex32 {
        self.phasor[i]
    }

    /// Current phasor magnitude of rotator `i`.
    pub fn magnitude(&self, i: usize) -> f32 {
        self.phasor[i].norm_sqr().sqrt()
    }

    /// Designed phasor magnitude of rotator `i`.
    pub fn gain(&self, i: usize) -> f32 {
        self.gain[i]
    }

    /// Leak coefficient of rotator `i`.
    pub fn window(&self, i: usize) -> f32 {
        self.window[i]
    }

    /// Effective bandwidth of rotator `i` in Hz.
    pub fn bandwidth(&self, i: usize) -> f32 {
        let wide: Vec<f64> = self.frequencies.iter().map(|f| *f as f64).collect();
        channel_bandwidth(&wide, i) as f32
    }

    pub fn frequencies(&self) -> &[f32; N] {
        &self.frequencies
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}
