// Copyright 2026 The Loudbank Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Masking
//!
//! Loud energy in one channel makes quieter energy in nearby channels harder to hear.  Finalizing a
//! frame converts its accumulated energies to decibels and then runs two scans over the channels:
//!
//! 1. Upward, lowest to highest rotor.  Levels are floored, blurred into a running envelope, and
//!    any level far enough below the envelope is pulled part way up towards it.  The envelope decays
//!    by a per-rotor step that differs between the lower, middle and upper thirds of the rotors.
//! 2. Downward, highest to lowest rotor, over the upward results.  Same shape with its own
//!    threshold and strength and a single decay step, but the envelope follows the levels
//!    without blurring.  No second floor.
//!
//! Each step of a scan depends on the envelope left by the previous step, so the scans are strictly
//! sequential within a frame.  The envelope is consulted before it decays, so every channel is
//! compared against the undecayed envelope of the channels at or before it.

use aligned::{A32, Aligned};

use super::calibration::{DecibelScale, MaskingCalibration};
use crate::{LoudbankError, Result};

/// Bounded in-place view of one frame of a channel matrix.  Holds raw energies before
/// finalization and decibel loudness after.
pub struct FrameView<'a, const N: usize> {
    values: &'a mut [f32; N],
}

impl<'a, const N: usize> FrameView<'a, N> {
    pub fn new(values: &'a mut [f32; N]) -> Self {
        Self { values }
    }

    pub(crate) fn from_aligned(row: &'a mut Aligned<A32, [f32; N]>) -> Self {
        Self { values: &mut **row }
    }

    pub fn get(&self, k: usize) -> Option<f32> {
        self.values.get(k).copied()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values[..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.values[..]
    }

    pub fn len(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        N == 0
    }
}

/// Finalizer prepared for `N` rotators: decibel scale plus per-rotor envelope steps.
#[derive(Debug, Clone)]
pub struct Masking<const N: usize> {
    calibration: MaskingCalibration,
    scale: DecibelScale,
    steps_up: [f64; 3],
    step_down: f64,
}

impl<const N: usize> Masking<N> {
    pub fn new(calibration: &MaskingCalibration) -> Result<Self> {
        if N < 2 {
            return Err(LoudbankError::InsufficientChannels {
                what: "rotators",
                expected: 2,
                actual: N,
            });
        }
        let octaves_per_rot = calibration.octave_span / (N - 1) as f64;
        Ok(Self {
            calibration: *calibration,
            scale: calibration.decibel_scale(),
            steps_up: calibration.step_per_octave_up.map(|step| step * octaves_per_rot),
            step_down: calibration.step_per_octave_down * octaves_per_rot,
        })
    }

    pub fn calibration(&self) -> &MaskingCalibration {
        &self.calibration
    }

    pub fn scale(&self) -> &DecibelScale {
        &self.scale
    }

    /// Upward envelope decay after rotor `k`.
    fn step_up(&self, k: usize) -> f64 {
        if 3 * k < N {
            self.steps_up[0]
        } else if 3 * k < 2 * N {
            self.steps_up[1]
        } else {
            self.steps_up[2]
        }
    }

    /// Rewrite a frame of accumulated energies as masked loudness in decibels.  Energies are
    /// scaled by `mul` before conversion.
    pub fn finalize(&self, frame: FrameView<'_, N>, mul: f32) {
        let cal = &self.calibration;
        let values = frame.values;

        // Lower frequencies mask higher ones.
        let blur = cal.blur_up;
        let strength = cal.strength_up as f64;
        let mut masker = 0.0f64;
        let mut smooth = 0.0f32;
        for k in 0..N {
            let mut v = self.scale.to_db(mul * values[k]).max(cal.min_limit);
            smooth = if k == 0 {
                v
            } else {
                (1.0 - blur) * smooth + blur * v
            };
            masker = masker.max(smooth as f64);
            let mask = cal.fraction_up as f64 * masker - cal.gap_up;
            if (v as f64) < mask {
                v = (strength * mask + (1.0 - strength) * v as f64) as f32;
            }
            values[k] = v;
            masker -= self.step_up(k);
        }

        // Higher frequencies mask lower ones.  The envelope follows raw levels here.
        let strength = cal.strength_down as f64;
        let mut masker = 0.0f64;
        for k in (0..N).rev() {
            let mut v = values[k];
            masker = masker.max(v as f64);
            let mask = cal.fraction_down as f64 * masker - cal.gap_down;
            if (v as f64) < mask {
                v = (strength * mask + (1.0 - strength) * v as f64) as f32;
            }
            values[k] = v;
            masker -= self.step_down;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SILENCE_DB: f32 = 236.94706;
    const TOL: f32 = 1e-3;

    fn finalize<const N: usize>(cal: &MaskingCalibration, energies: &mut [f32; N], mul: f32) {
        let masking = Masking::<N>::new(cal).unwrap();
        masking.finalize(FrameView::new(energies), mul);
    }

    #[test]
    fn test_masking_silence() {
        let cal = MaskingCalibration::default();
        let mut frame = [0.0f32; 16];
        finalize(&cal, &mut frame, 1.0 / 160.0);
        for (k, v) in frame.iter().enumerate() {
            assert!((v - SILENCE_DB).abs() < TOL, "rotor {k}: {v}");
        }
    }

    #[test]
    fn test_masking_floor_clamp() {
        // A tiny epsilon drops silence far below the floor.
        let cal = MaskingCalibration {
            epsilon_factor: 1e-36,
            ..Default::default()
        };
        assert!(cal.decibels(0.0) < cal.min_limit - 10.0);

        let mut frame = [0.0f32; 4];
        finalize(&cal, &mut frame, 1.0);
        for v in frame {
            assert!((v - cal.min_limit).abs() < TOL, "{v}");
        }
    }

    #[test]
    fn test_masking_upward_only() {
        // Disable the downward blend to look at the upward scan in isolation.
        let cal = MaskingCalibration {
            strength_down: 0.0,
            ..Default::default()
        };
        let mut frame = [0.0f32; 8];
        frame[3] = 1e30;
        finalize(&cal, &mut frame, 1.0);

        let loud = cal.decibels(1e30);
        assert!((frame[3] - loud).abs() < TOL);

        // Below the masker nothing changes.
        for k in 0..3 {
            assert!((frame[k] - SILENCE_DB).abs() < TOL, "rotor {k}: {}", frame[k]);
        }

        // Right above the masker the level is pulled up, but not past the masker.
        assert!(frame[4] > SILENCE_DB + 0.5, "rotor 4: {}", frame[4]);
        assert!(frame[4] < loud);

        // Masking fades with distance.
        assert!(frame[4] >= frame[5]);
        assert!(frame[5] >= frame[7]);
    }

    #[test]
    fn test_masking_downward_only() {
        // A gentler downward decay so the envelope reaches the neighbours of only 8 rotors.
        let cal = MaskingCalibration {
            strength_up: 0.0,
            step_per_octave_down: 5.0,
            ..Default::default()
        };
        let mut frame = [0.0f32; 8];
        frame[5] = 1e30;
        finalize(&cal, &mut frame, 1.0);

        for k in 6..8 {
            assert!((frame[k] - SILENCE_DB).abs() < TOL, "rotor {k}: {}", frame[k]);
        }
        assert!(frame[4] > SILENCE_DB + 0.5, "rotor 4: {}", frame[4]);
        assert!(frame[4] >= frame[3]);
    }

    // Levels for a 32 rotor frame of silence with a single 1e36 energy at rotor 8 or 16, one
    // entry per rotor.  Rotor 8 walks the upward envelope from the first into the second third,
    // rotor 16 from the second into the last.  Both masking directions shape the neighbours.
    const LOUD_AT_8: [f32; 32] = [
        236.9471, 239.5388, 242.2224, 244.9061, 247.5898, 250.2735, 252.9571, 255.6408,
        360.0000, 248.2261, 247.5735, 246.9209, 246.0236, 245.1263, 244.2290, 243.3317,
        242.4344, 241.5371, 240.6398, 239.7426, 238.8452, 237.9480, 237.0507, 236.9471,
        236.9471, 236.9471, 236.9471, 236.9471, 236.9471, 236.9471, 236.9471, 236.9471,
    ];
    const LOUD_AT_16: [f32; 32] = [
        236.9471, 236.9471, 236.9471, 236.9471, 236.9471, 236.9471, 236.9471, 236.9471,
        236.9471, 239.5388, 242.2224, 244.9061, 247.5898, 250.2735, 252.9571, 255.6408,
        360.0000, 247.9813, 247.0840, 246.1867, 245.2894, 244.3921, 243.4948, 242.6411,
        241.7873, 240.9335, 240.0798, 239.2260, 238.3722, 237.5184, 236.9471, 236.9471,
    ];

    #[test]
    fn test_masking_golden_single_loud_rotor() {
        let cal = MaskingCalibration::default();
        let masking = Masking::<32>::new(&cal).unwrap();

        for (loud, expected) in [(8, &LOUD_AT_8), (16, &LOUD_AT_16)] {
            let mut frame = [0.0f32; 32];
            frame[loud] = 1e36;
            let view = FrameView::new(&mut frame);
            assert!(!view.is_empty());
            assert_eq!(view.get(loud), Some(1e36));
            assert_eq!(view.get(32), None);

            masking.finalize(view, 1.0);
            let view = FrameView::new(&mut frame);
            for (k, (got, want)) in view.as_slice().iter().zip(expected.iter()).enumerate() {
                assert!(
                    (got - want).abs() < 2e-3,
                    "loud {loud} rotor {k}: got {got}, expected {want}"
                );
            }
        }
    }

    #[test]
    fn test_masking_downward_envelope_is_not_blurred() {
        // Directly below a loud rotor the downward threshold comes from the loud level itself.
        let cal = MaskingCalibration {
            strength_up: 0.0,
            ..Default::default()
        };
        let masking = Masking::<32>::new(&cal).unwrap();
        let mut frame = [0.0f32; 32];
        frame[16] = 1e36;
        masking.finalize(FrameView::new(&mut frame), 1.0);

        let loud = cal.decibels(1e36) as f64;
        let silence = cal.decibels(0.0) as f64;
        let step = cal.step_per_octave_down * cal.octave_span / 31.0;
        let mask = cal.fraction_down as f64 * (loud - step) - cal.gap_down;
        let strength = cal.strength_down as f64;
        let expected = (strength * mask + (1.0 - strength) * silence) as f32;
        assert!(
            (frame[15] - expected).abs() < 2e-3,
            "got {}, expected {expected}",
            frame[15]
        );
    }

    #[test]
    fn test_masking_step_thirds() {
        let cal = MaskingCalibration::default();
        let masking = Masking::<9>::new(&cal).unwrap();
        let per_rot = cal.octave_span / 8.0;
        for k in 0..3 {
            assert_eq!(masking.step_up(k), cal.step_per_octave_up[0] * per_rot);
        }
        for k in 3..6 {
            assert_eq!(masking.step_up(k), cal.step_per_octave_up[1] * per_rot);
        }
        for k in 6..9 {
            assert_eq!(masking.step_up(k), cal.step_per_octave_up[2] * per_rot);
        }
    }

    #[test]
    fn test_masking_mul_scales_energy() {
        let cal = MaskingCalibration::default();
        let mut a = [1e30f32; 4];
        let mut b = [1e28f32; 4];
        finalize(&cal, &mut a, 0.01);
        finalize(&cal, &mut b, 1.0);
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < TOL);
        }
    }
}
