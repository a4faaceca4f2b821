//! Sensitivity profiles
//!
//! Every tunable threshold lives in one immutable [`ThresholdProfile`] bundle.
//! Switching profile swaps the whole bundle; no field is ever updated on its own.
//! Values are tuned for torso placement, where impacts are softer than at the
//! wrist and rotation is the most reliable fall indicator.

use crate::error::DetectorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named threshold preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityProfile {
    /// Fewer false positives, slower to confirm
    Conservative,
    #[default]
    Balanced,
    /// Maximum detection, more false positives
    Sensitive,
}

impl SensitivityProfile {
    pub const ALL: [SensitivityProfile; 3] = [
        SensitivityProfile::Conservative,
        SensitivityProfile::Balanced,
        SensitivityProfile::Sensitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensitivityProfile::Conservative => "conservative",
            SensitivityProfile::Balanced => "balanced",
            SensitivityProfile::Sensitive => "sensitive",
        }
    }

    pub fn thresholds(self) -> ThresholdProfile {
        ThresholdProfile::for_profile(self)
    }
}

impl fmt::Display for SensitivityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensitivityProfile {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" | "0" => Ok(SensitivityProfile::Conservative),
            "balanced" | "1" => Ok(SensitivityProfile::Balanced),
            "sensitive" | "2" => Ok(SensitivityProfile::Sensitive),
            other => Err(DetectorError::UnknownProfile(other.to_string())),
        }
    }
}

/// Firmware-style numeric selector: 0=Conservative, 1=Balanced, 2=Sensitive
impl TryFrom<u8> for SensitivityProfile {
    type Error = DetectorError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SensitivityProfile::Conservative),
            1 => Ok(SensitivityProfile::Balanced),
            2 => Ok(SensitivityProfile::Sensitive),
            other => Err(DetectorError::UnknownProfile(other.to_string())),
        }
    }
}

/// Complete set of thresholds consulted by the detection stages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdProfile {
    pub profile: SensitivityProfile,

    // Jerk (m/s³)
    pub jerk_high: f32,
    pub jerk_medium: f32,
    pub jerk_low: f32,

    // Signal vector magnitude (g)
    pub svm_high: f32,
    pub svm_low: f32,
    pub svm_warning: f32,
    pub svm_impact_peak: f32,

    // Angular velocity (°/s)
    pub gyro_high: f32,
    pub gyro_sustained: f32,

    // Posture (degrees, degrees per second)
    pub pitch_threshold: f32,
    pub roll_threshold: f32,
    pub posture_rapid: f32,
    pub pitch_rate_threshold: f32,
    pub roll_rate_threshold: f32,

    // Evidence counters
    pub impact_count_threshold: u8,
    pub warning_count_threshold: u8,
    pub gyro_sustained_count: u8,

    // Timing windows (ms)
    pub fall_sequence_window_ms: u32,
    pub bowing_rejection_ms: u32,
    pub fall_confirmation_window_ms: u32,
    pub recovery_window_ms: u32,
    pub immobility_sampling_interval_ms: u32,

    // Post-fall immobility
    pub immobility_accel_variance: f32,
    pub immobility_accel_stddev: f32,
    pub immobility_gyro_variance: f32,
    pub immobility_svm_range: f32,
}

impl Default for ThresholdProfile {
    fn default() -> Self {
        Self::for_profile(SensitivityProfile::default())
    }
}

impl ThresholdProfile {
    /// Build the full bundle for a preset
    pub fn for_profile(profile: SensitivityProfile) -> Self {
        let base = Self::shared(profile);
        match profile {
            SensitivityProfile::Conservative => Self {
                jerk_high: 450_000.0,
                jerk_medium: 250_000.0,
                svm_high: 2.0,
                svm_low: 0.6,
                gyro_high: 200.0,
                gyro_sustained: 140.0,
                pitch_threshold: 45.0,
                roll_threshold: 38.0,
                impact_count_threshold: 3,
                gyro_sustained_count: 4,
                ..base
            },
            SensitivityProfile::Balanced => Self {
                jerk_high: 350_000.0,
                jerk_medium: 200_000.0,
                svm_high: 1.8,
                svm_low: 0.65,
                gyro_high: 180.0,
                gyro_sustained: 120.0,
                pitch_threshold: 40.0,
                roll_threshold: 35.0,
                impact_count_threshold: 2,
                gyro_sustained_count: 3,
                ..base
            },
            SensitivityProfile::Sensitive => Self {
                jerk_high: 280_000.0,
                jerk_medium: 150_000.0,
                svm_high: 1.6,
                svm_low: 0.7,
                gyro_high: 160.0,
                gyro_sustained: 100.0,
                pitch_threshold: 35.0,
                roll_threshold: 30.0,
                impact_count_threshold: 1,
                gyro_sustained_count: 2,
                ..base
            },
        }
    }

    /// Values every preset has in common
    fn shared(profile: SensitivityProfile) -> Self {
        Self {
            profile,
            jerk_high: 450_000.0,
            jerk_medium: 300_000.0,
            jerk_low: 200_000.0,
            svm_high: 1.8,
            svm_low: 0.65,
            svm_warning: 1.4,
            svm_impact_peak: 2.2,
            gyro_high: 180.0,
            gyro_sustained: 120.0,
            pitch_threshold: 40.0,
            roll_threshold: 35.0,
            posture_rapid: 60.0,
            pitch_rate_threshold: 100.0,
            roll_rate_threshold: 80.0,
            impact_count_threshold: 2,
            warning_count_threshold: 3,
            gyro_sustained_count: 3,
            fall_sequence_window_ms: 800,
            bowing_rejection_ms: 1500,
            fall_confirmation_window_ms: 500,
            recovery_window_ms: 5000,
            immobility_sampling_interval_ms: 100,
            immobility_accel_variance: 0.005,
            immobility_accel_stddev: 0.1,
            immobility_gyro_variance: 5.0,
            immobility_svm_range: 0.1,
        }
    }
}
