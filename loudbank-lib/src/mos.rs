// Copyright 2026 The Loudbank Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Mean Opinion Score
//!
//! Seams for the collaborators that turn loudness matrices into a quality estimate.  Neither is
//! implemented here.
//!
//! - A [`MosPredictor`] maps one perceptual distance to an approximate mean opinion score.  Its
//!   calibration assumes a downstream distance computed with channels no narrower than
//!   [`MINIMUM_BANDWIDTH_HZ`] and frames at [`PERCEPTUAL_SAMPLE_RATE`](crate::dsp::PERCEPTUAL_SAMPLE_RATE).
//!   Other settings still produce a number, but it means nothing, and nothing here can tell.
//! - A [`ModelBlob`] is an opaque byte span of serialized regression parameters.  Only byte access
//!   is needed to hand it to whatever decodes it.

/// Narrowest channel bandwidth the opinion score calibration was fitted with.
pub const MINIMUM_BANDWIDTH_HZ: f64 = 5.0;

/// Maps a perceptual distance to an approximate mean opinion score.
pub trait MosPredictor {
    fn mos(&self, distance: f32) -> f32;
}

impl<F> MosPredictor for F
where
    F: Fn(f32) -> f32,
{
    fn mos(&self, distance: f32) -> f32 {
        self(distance)
    }
}

/// Serialized model parameters, accessed only as bytes.
pub trait ModelBlob {
    fn bytes(&self) -> &[u8];

    fn len(&self) -> usize {
        self.bytes().len()
    }

    fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

impl ModelBlob for [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }
}

impl ModelBlob for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Blob compiled into the binary, for example with `include_bytes!`.
#[derive(Debug, Clone, Copy)]
pub struct StaticModel(pub &'static [u8]);

impl ModelBlob for StaticModel {
    fn bytes(&self) -> &[u8] {
        self.0
    }
}

/// Check a blob against the size its decoder expects before handing it over.
pub fn expect_len<B: ModelBlob + ?Sized>(blob: &B, expected: usize) -> crate::Result<&[u8]> {
    let bytes = blob.bytes();
    if bytes.len() != expected {
        return Err(crate::LoudbankError::InvalidParameter(format!(
            "model blob holds {} bytes, expected {expected}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    fn score(predictor: &impl MosPredictor, distance: f32) -> f32 {
        predictor.mos(distance)
    }

    #[test]
    fn test_closure_predictor() {
        let linear = |d: f32| (5.0 - 40.0 * d).clamp(1.0, 5.0);
        assert_eq!(score(&linear, 0.0), 5.0);
        assert_eq!(score(&linear, 1.0), 1.0);
        assert_eq!(score(&linear, 0.05), 3.0);
    }

    #[test]
    fn test_blob_access() {
        static MODEL: [u8; 4] = [1, 2, 3, 4];
        let owned = vec![9u8; 16];
        let borrowed: &[u8] = &owned[..8];

        assert_eq!(StaticModel(&MODEL).bytes(), &[1, 2, 3, 4]);
        assert_eq!(owned.len(), 16);
        assert_eq!(ModelBlob::len(borrowed), 8);
        assert!(!ModelBlob::is_empty(&owned));

        assert!(expect_len(&StaticModel(&MODEL), 4).is_ok());
        assert!(expect_len(borrowed, 16).is_err());
    }
}
