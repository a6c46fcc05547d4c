// Copyright 2026 The Loudbank Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Calibration
//!
//! Every constant that shapes the loudness matrix lives here: the rotator window and gain
//! constants and the decibel and masking constants.  None of them are derived from the signal.
//! They were fitted against listening tests and are applied identically to every frame.
//!
//! The values are grouped into two immutable value objects, [`BankCalibration`] for the rotator
//! bank and [`MaskingCalibration`] for the finalizer, bundled together as [`Calibration`].  The
//! defaults are the production values.  A TOML document may override any subset of them for
//! engineering work:
//!
//! ```toml
//! [bank]
//! window_base = 0.9996
//!
//! [masking]
//! min_limit = -12.0
//! step_per_octave_up = [15.0, 21.0, 20.0]
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::{LoudbankError, Result};

/// Level of a full-scale sine, in the natural-log energy domain used by the rotator gains.
/// Ideally 78.3 dB.
pub const FULL_SCALE_SINE_DB: f64 = 75.27901963526045;

/// `10 / ln(10)`.  Lets the decibel conversion use the natural log directly.
const DB_PER_NEPER_POWER: f64 = 10.0 / std::f64::consts::LN_10;

/// Constants of the rotator bank.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BankCalibration {
    /// Base of the leak coefficient.  Each rotator window is `window_base ^ (bw * bandwidth_magic)`.
    pub window_base: f64,
    /// Relates the neighbour bandwidth in Hz to the length of the triple leaky integrator.
    pub bandwidth_magic: f64,
    /// Shared with [`MaskingCalibration::full_scale_sine_db`].
    pub full_scale_sine_db: f64,
}

impl Default for BankCalibration {
    fn default() -> Self {
        Self {
            window_base: 0.9996028710680265,
            bandwidth_magic: 0.7328516996032982,
            full_scale_sine_db: FULL_SCALE_SINE_DB,
        }
    }
}

impl BankCalibration {
    /// Amplitude that a full-scale sine produces after demodulation, before filter gains.
    pub fn full_scale_gain(&self) -> f64 {
        2.0 * self.full_scale_sine_db.exp().sqrt()
    }

    fn validate(&self) -> Result<()> {
        if !(self.window_base > 0.0 && self.window_base < 1.0) {
            return Err(LoudbankError::InvalidParameter(format!(
                "window_base must lie in (0, 1), got {}",
                self.window_base
            )));
        }
        finite("bandwidth_magic", self.bandwidth_magic)?;
        finite("full_scale_sine_db", self.full_scale_sine_db)?;
        Ok(())
    }
}

/// Constants of the decibel conversion and the two directional masking scans.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaskingCalibration {
    /// See [`FULL_SCALE_SINE_DB`].
    pub full_scale_sine_db: f64,
    /// Epsilon added to every energy, relative to the full-scale sine energy.  This was the
    /// largest epsilon observed to leave loud material unaffected, around 4.95e23 absolute.
    pub epsilon_factor: f64,
    /// Floor applied to every level before the upward scan.
    pub min_limit: f32,
    /// Octaves spanned by the rotor range, `log2(20000 / 20)`.  Steps are given per octave and
    /// converted to per-rotor steps by spreading this span over `N - 1` rotors.
    pub octave_span: f64,

    /// Upward envelope decay per octave, for the first, second and last third of the rotors.
    pub step_per_octave_up: [f64; 3],
    pub gap_up: f64,
    pub strength_up: f32,
    pub blur_up: f32,
    pub fraction_up: f32,

    /// Downward envelope decay per octave, uniform over all rotors.  The downward envelope is
    /// not blurred.
    pub step_per_octave_down: f64,
    pub gap_down: f64,
    pub strength_down: f32,
    pub fraction_down: f32,
}

impl Default for MaskingCalibration {
    fn default() -> Self {
        Self {
            full_scale_sine_db: FULL_SCALE_SINE_DB,
            epsilon_factor: 1.0033294789821357e-09,
            min_limit: -11.397341001787765,
            octave_span: (20_000.0f64 / 20.0).log2(),

            step_per_octave_up: [15.892019717473835, 21.852019717473834, 20.79201971747383],
            gap_up: 19.140338374861235,
            strength_up: 0.1252262923615547,
            blur_up: 0.8738593591692092,
            fraction_up: 1.02,

            step_per_octave_down: 42.33972783112732,
            gap_down: 19.66099875393617,
            strength_down: 0.19329999999999992,
            fraction_down: 1.02,
        }
    }
}

impl MaskingCalibration {
    /// Absolute epsilon added to energies before taking the log.
    pub fn epsilon(&self) -> f64 {
        self.epsilon_factor * self.full_scale_sine_db.exp()
    }

    /// Prepare the decibel converter for these constants.
    pub fn decibel_scale(&self) -> DecibelScale {
        DecibelScale {
            epsilon: self.epsilon() as f32,
        }
    }

    /// Convert one energy to decibels.  Prefer [`DecibelScale`] in loops.
    pub fn decibels(&self, energy: f32) -> f32 {
        self.decibel_scale().to_db(energy)
    }

    fn validate(&self) -> Result<()> {
        finite("full_scale_sine_db", self.full_scale_sine_db)?;
        finite("epsilon_factor", self.epsilon_factor)?;
        if !(self.epsilon() > 0.0 && (self.epsilon() as f32).is_finite()) {
            return Err(LoudbankError::InvalidParameter(format!(
                "epsilon must be positive and representable, got {}",
                self.epsilon()
            )));
        }
        finite("octave_span", self.octave_span)?;
        finite("gap_up", self.gap_up)?;
        finite("gap_down", self.gap_down)?;
        finite("step_per_octave_down", self.step_per_octave_down)?;
        for step in self.step_per_octave_up {
            finite("step_per_octave_up", step)?;
        }
        for (name, value) in [
            ("min_limit", self.min_limit),
            ("strength_up", self.strength_up),
            ("blur_up", self.blur_up),
            ("fraction_up", self.fraction_up),
            ("strength_down", self.strength_down),
            ("fraction_down", self.fraction_down),
        ] {
            finite(name, value as f64)?;
        }
        Ok(())
    }
}

/// Energy to decibel conversion with a calibrated epsilon, so that silence maps to a fixed floor
/// rather than negative infinity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecibelScale {
    epsilon: f32,
}

impl DecibelScale {
    /// `energy` must be non-negative.  It always is, being a sum of squares.
    #[inline]
    pub fn to_db(&self, energy: f32) -> f32 {
        (DB_PER_NEPER_POWER as f32) * (energy + self.epsilon).ln()
    }

    /// Level reported for exact silence.
    pub fn floor(&self) -> f32 {
        self.to_db(0.0)
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
}

/// All calibration constants.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Calibration {
    pub bank: BankCalibration,
    pub masking: MaskingCalibration,
}

impl Calibration {
    /// Apply overrides from a TOML document on top of the defaults.  Every key is optional but
    /// unknown keys are rejected so that typos don't silently fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let calibration: Self = toml::from_str(text)?;
        calibration.validate()?;
        tracing::debug!(?calibration, "calibration overrides applied");
        Ok(calibration)
    }

    /// Read and apply a TOML calibration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.bank.validate()?;
        self.masking.validate()
    }
}

fn finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(LoudbankError::InvalidParameter(format!(
            "{name} must be finite, got {value}"
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // 10 / ln(10) * (ln(1.0033294789821357e-9) + 75.27901963526045)
    const SILENCE_DB: f32 = 236.94706;

    #[test]
    fn test_decibels_silence_floor() {
        let scale = MaskingCalibration::default().decibel_scale();
        let floor = scale.floor();
        assert!(
            (floor - SILENCE_DB).abs() < 1e-3,
            "floor = {floor}, expected = {SILENCE_DB}"
        );
        // The clamp only matters for calibrations with a much smaller epsilon.
        assert!(floor > MaskingCalibration::default().min_limit);
    }

    #[test]
    fn test_decibels_monotonic_and_finite() {
        let scale = MaskingCalibration::default().decibel_scale();
        let mut last = f32::NEG_INFINITY;
        for energy in [0.0, 1.0, 1e10, 1e20, 1e23, 1e24, 1e28, 1e32, 1e36, 1e38] {
            let db = scale.to_db(energy);
            assert!(db.is_finite(), "energy {energy} -> {db}");
            assert!(db >= last, "energy {energy}: {db} < {last}");
            last = db;
        }
    }

    #[test]
    fn test_decibels_matches_log10() {
        let scale = MaskingCalibration::default().decibel_scale();
        let energy = 1e30f32;
        let expected = 10.0 * ((energy as f64) + scale.epsilon() as f64).log10();
        assert!((scale.to_db(energy) as f64 - expected).abs() < 1e-3);
    }

    #[test]
    fn test_calibration_toml_overrides() {
        let text = r#"
            [bank]
            window_base = 0.9995

            [masking]
            min_limit = -12
            step_per_octave_up = [1.0, 2.0, 3.0]
            strength_down = 0.0
        "#;
        let calibration = Calibration::from_toml_str(text).unwrap();
        assert_eq!(calibration.bank.window_base, 0.9995);
        assert_eq!(calibration.masking.min_limit, -12.0);
        assert_eq!(calibration.masking.step_per_octave_up, [1.0, 2.0, 3.0]);
        assert_eq!(calibration.masking.strength_down, 0.0);

        // untouched values keep their defaults
        let defaults = Calibration::default();
        assert_eq!(calibration.bank.bandwidth_magic, defaults.bank.bandwidth_magic);
        assert_eq!(calibration.masking.gap_up, defaults.masking.gap_up);
    }

    #[test]
    fn test_calibration_toml_rejects_bad_input() {
        assert!(matches!(
            Calibration::from_toml_str("[masking]\nblurr_up = 0.5"),
            Err(LoudbankError::Config(_))
        ));
        assert!(matches!(
            Calibration::from_toml_str("[masking]\ngap_up = \"loud\""),
            Err(LoudbankError::Config(_))
        ));
        assert!(matches!(
            Calibration::from_toml_str("[mixing]\ngap_up = 1.0"),
            Err(LoudbankError::Config(_))
        ));
        assert!(matches!(
            Calibration::from_toml_str("[masking]\nstep_per_octave_up = [1.0]"),
            Err(LoudbankError::Config(_))
        ));
        assert!(matches!(
            Calibration::from_toml_str("[masking]\nblur_down = 0.7"),
            Err(LoudbankError::Config(_))
        ));
        assert!(matches!(
            Calibration::from_toml_str("[bank]\nwindow_base = 1.5"),
            Err(LoudbankError::InvalidParameter(_))
        ));
        assert!(matches!(
            Calibration::from_toml_str("[bank\n"),
            Err(LoudbankError::Config(_))
        ));
    }

    #[test]
    fn test_calibration_empty_toml_is_default() {
        assert_eq!(Calibration::from_toml_str("").unwrap(), Calibration::default());
    }
}
