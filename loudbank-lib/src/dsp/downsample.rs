// Copyright 2026 The Loudbank Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Downsample
//!
//! Drives the rotator bank over a buffer of samples and reduces per-sample energies into frames.
//! Every group of `downsampling` samples sums into one frame, which is then finalized into masked
//! loudness.  The bank is renormalized at the start of every group.
//!
//! The destination matrix is sized by the caller.  Extra input past the last frame is ignored.
//! A short final group is finalized as-is, but only when it lands on the last frame.  Running out
//! of input anywhere else is a sizing error.

use aligned::{A32, Aligned};

use super::bank::Rotators;
use super::masking::{FrameView, Masking};
use crate::{LoudbankError, Result};

/// Time by frequency matrix of loudness values, one row of `N` rotors per frame.
pub struct ChannelMatrix<const N: usize> {
    rows: Vec<Aligned<A32, [f32; N]>>,
}

impl<const N: usize> ChannelMatrix<N> {
    /// Allocate `frames` zeroed rows.
    pub fn new(frames: usize) -> Self {
        Self {
            rows: (0..frames).map(|_| Aligned([0.0f32; N])).collect(),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rotators(&self) -> usize {
        N
    }

    pub fn row(&self, frame: usize) -> Option<&[f32; N]> {
        self.rows.get(frame).map(|row| &**row)
    }

    /// In-place view of one frame.
    pub fn frame_view(&mut self, frame: usize) -> Option<FrameView<'_, N>> {
        self.rows.get_mut(frame).map(FrameView::from_aligned)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32; N]> {
        self.rows.iter().map(|row| &**row)
    }

    /// Mean of each rotor over all frames.
    pub fn mean(&self) -> [f32; N] {
        let mut mean = [0.0f32; N];
        if self.rows.is_empty() {
            return mean;
        }
        for row in self.rows() {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += *v;
            }
        }
        let n = self.rows.len() as f32;
        mean.iter_mut().for_each(|m| *m /= n);
        mean
    }
}

impl<const N: usize> Rotators<N> {
    /// Fill `channels` with masked loudness computed from `signal`, `downsampling` samples per
    /// frame.
    ///
    /// On a sizing error the bank is reset, so it can be reused, and the matrix contents are
    /// unspecified.
    pub fn filter_and_downsample(
        &mut self,
        signal: &[f32],
        channels: &mut ChannelMatrix<N>,
        downsampling: usize,
        masking: &Masking<N>,
    ) -> Result<()> {
        if downsampling == 0 {
            return Err(LoudbankError::InvalidParameter(
                "downsampling must be at least one sample".to_string(),
            ));
        }
        let frames = channels.frame_count();
        if frames == 0 {
            return Ok(());
        }

        let mul = 1.0 / downsampling as f32;
        let mut out_ix = 0usize;
        for group in signal.chunks(downsampling) {
            self.renormalize();
            let row = &mut channels.rows[out_ix];
            for (zz, sample) in group.iter().enumerate() {
                self.increment_all(*sample);
                if zz == 0 {
                    for (k, out) in row.iter_mut().enumerate() {
                        *out = self.energy(k);
                    }
                } else {
                    for (k, out) in row.iter_mut().enumerate() {
                        *out += self.energy(k);
                    }
                }
            }
            masking.finalize(FrameView::from_aligned(row), mul);

            if group.len() < downsampling {
                // Input ran out inside this frame.
                if out_ix != frames - 1 {
                    return Err(self.mismatch(frames, out_ix + 1));
                }
                return Ok(());
            }

            out_ix += 1;
            if out_ix >= frames {
                return Ok(());
            }
        }

        // Input ran out on a frame boundary before the last frame.
        Err(self.mismatch(frames, out_ix))
    }

    fn mismatch(&mut self, expected: usize, produced: usize) -> LoudbankError {
        tracing::error!(
            expected_frames = expected,
            produced_frames = produced,
            "signal length does not match the destination frame count"
        );
        self.reset();
        LoudbankError::FrameCountMismatch {
            expected_frames: expected,
            produced_frames: produced,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dsp::calibration::Calibration;

    const SILENCE_DB: f32 = 236.94706;

    fn bank() -> (Rotators<4>, Masking<4>) {
        let cal = Calibration::default();
        let bank = Rotators::<4>::new(
            &[100.0, 430.88693, 1856.6355, 8000.0],
            &[1.0; 4],
            16_000.0,
            &cal.bank,
        )
        .unwrap();
        (bank, Masking::new(&cal.masking).unwrap())
    }

    #[test]
    fn test_matrix_views() {
        let mut m = ChannelMatrix::<4>::new(3);
        assert_eq!(m.frame_count(), 3);
        assert_eq!(m.rotators(), 4);
        assert!(m.row(3).is_none());
        assert!(m.frame_view(3).is_none());

        let mut view = m.frame_view(1).unwrap();
        assert_eq!(view.len(), 4);
        view.as_mut_slice()[2] = 7.0;
        assert_eq!(m.row(1).unwrap(), &[0.0, 0.0, 7.0, 0.0]);
        assert_eq!(m.mean(), [0.0, 0.0, 7.0 / 3.0, 0.0]);
    }

    #[test]
    fn test_downsample_silence() {
        let (mut bank, masking) = bank();
        let mut m = ChannelMatrix::<4>::new(10);
        bank.filter_and_downsample(&[0.0; 1600], &mut m, 160, &masking)
            .unwrap();
        for row in m.rows() {
            for v in row {
                assert!((v - SILENCE_DB).abs() < 1e-3, "{v}");
            }
        }
    }

    #[test]
    fn test_downsample_zero_factor() {
        let (mut bank, masking) = bank();
        let mut m = ChannelMatrix::<4>::new(1);
        assert!(matches!(
            bank.filter_and_downsample(&[0.0; 16], &mut m, 0, &masking),
            Err(LoudbankError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_downsample_empty_destination() {
        let (mut bank, masking) = bank();
        let mut m = ChannelMatrix::<4>::new(0);
        bank.filter_and_downsample(&[0.0; 16], &mut m, 4, &masking)
            .unwrap();
    }

    #[test]
    fn test_downsample_empty_signal() {
        let (mut bank, masking) = bank();
        let mut m = ChannelMatrix::<4>::new(1);
        assert!(matches!(
            bank.filter_and_downsample(&[], &mut m, 4, &masking),
            Err(LoudbankError::FrameCountMismatch {
                expected_frames: 1,
                produced_frames: 0
            })
        ));
    }

    #[test]
    fn test_downsample_short_on_boundary() {
        let (mut bank, masking) = bank();
        let mut m = ChannelMatrix::<4>::new(11);
        assert!(matches!(
            bank.filter_and_downsample(&[0.0; 1600], &mut m, 160, &masking),
            Err(LoudbankError::FrameCountMismatch {
                expected_frames: 11,
                produced_frames: 10
            })
        ));
    }

    #[test]
    fn test_downsample_error_resets_bank() {
        let (mut bank, masking) = bank();
        let mut tone = crate::dsp::Tone::new(430.88693, 16_000.0, 0.5);
        let signal: Vec<f32> = (0..1650).map(|_| tone.next().unwrap_or(0.0)).collect();

        let mut m = ChannelMatrix::<4>::new(12);
        assert!(
            bank.filter_and_downsample(&signal, &mut m, 160, &masking)
                .is_err()
        );
        for k in 0..4 {
            assert_eq!(bank.energy(k), 0.0);
        }
    }
}
