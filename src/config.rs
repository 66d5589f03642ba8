//! Tone bank configuration, the static description of the ambient soundscape.
//!
//! The JSON shape (camelCase) mirrors what the web UI receives from
//! `default_tone_config()`, so a host can tweak and hand back a bank.

use serde::{Deserialize, Serialize};

use crate::error::ToneError;

/// Fundamental of the calming tone.
pub const BASE_FREQUENCY_HZ: f64 = 432.0;

/// Extra delay after the fade-out ramp before resources are released.
pub const TEARDOWN_MARGIN_SECONDS: f64 = 0.1;

/// Ramp window used when the volume changes while playing.
pub const VOLUME_RAMP_SECONDS: f64 = 0.1;

/// One sine partial of the summed tone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partial {
    pub frequency_hz: f64,
    /// Gain weight relative to the user volume.
    pub relative_gain: f64,
}

/// Sub-audio oscillator that swells the master gain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modulation {
    pub frequency_hz: f64,
    pub depth_weight: f64,
}

/// Static configuration of the oscillator bank and its envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneBankConfig {
    pub base_frequency_hz: f64,
    /// Ordered partials. The first entry is the fundamental and the only
    /// one that drifts.
    pub partials: Vec<Partial>,
    pub modulation: Modulation,
    pub fade_in_seconds: f64,
    pub fade_out_seconds: f64,
    pub drift_amplitude_hz: f64,
    pub drift_rate_hz: f64,
}

impl Default for ToneBankConfig {
    fn default() -> Self {
        ToneBankConfig {
            base_frequency_hz: BASE_FREQUENCY_HZ,
            partials: vec![
                // Fundamental
                Partial { frequency_hz: BASE_FREQUENCY_HZ, relative_gain: 0.5 },
                // Sub-octave
                Partial { frequency_hz: BASE_FREQUENCY_HZ / 2.0, relative_gain: 0.2 },
                // Second harmonic
                Partial { frequency_hz: BASE_FREQUENCY_HZ * 2.0, relative_gain: 0.1 },
                // Beat partial, ~8 Hz against the fundamental
                Partial { frequency_hz: BASE_FREQUENCY_HZ + 8.0, relative_gain: 0.15 },
            ],
            modulation: Modulation { frequency_hz: 0.1, depth_weight: 0.3 },
            fade_in_seconds: 3.0,
            fade_out_seconds: 2.0,
            drift_amplitude_hz: 0.5,
            drift_rate_hz: 0.3,
        }
    }
}

impl ToneBankConfig {
    /// Parse a bank from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, ToneError> {
        let config: ToneBankConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ToneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Delay between `stop()` and resource release.
    pub fn teardown_grace(&self) -> f64 {
        self.fade_out_seconds + TEARDOWN_MARGIN_SECONDS
    }

    pub fn fundamental(&self) -> Option<&Partial> {
        self.partials.first()
    }

    pub fn validate(&self) -> Result<(), ToneError> {
        if self.partials.is_empty() {
            return Err(ToneError::Config("at least one partial is required".into()));
        }
        check_frequency("baseFrequencyHz", self.base_frequency_hz)?;
        for (i, p) in self.partials.iter().enumerate() {
            check_frequency(&format!("partials[{i}].frequencyHz"), p.frequency_hz)?;
            check_non_negative(&format!("partials[{i}].relativeGain"), p.relative_gain)?;
        }
        check_frequency("modulation.frequencyHz", self.modulation.frequency_hz)?;
        check_non_negative("modulation.depthWeight", self.modulation.depth_weight)?;
        check_non_negative("fadeInSeconds", self.fade_in_seconds)?;
        check_non_negative("fadeOutSeconds", self.fade_out_seconds)?;
        check_non_negative("driftAmplitudeHz", self.drift_amplitude_hz)?;
        check_non_negative("driftRateHz", self.drift_rate_hz)?;
        Ok(())
    }
}

fn check_frequency(field: &str, value: f64) -> Result<(), ToneError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ToneError::Config(format!("{field} must be a positive frequency, got {value}")))
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ToneError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ToneError::Config(format!("{field} must be >= 0, got {value}")))
    }
}
