//! Detector facade
//!
//! This module provides the public API for Fallwatch. A [`FallDetector`] owns
//! the active threshold bundle and the [`DetectorState`], and feeds each sample
//! through the classifier stages.

use crate::classifier::{step, DetectorState};
use crate::error::DetectorError;
use crate::posture::Calibration;
use crate::profile::{SensitivityProfile, ThresholdProfile};
use crate::types::{ActivityState, FallEvent, MotionSample};
use tracing::{info, warn};

/// Stateful fall detector for one wearer.
///
/// Call [`FallDetector::calibrate`] once with samples taken in a neutral posture,
/// then [`FallDetector::process`] once per sampling tick.
///
/// # Example
/// ```
/// use fallwatch::{FallDetector, MotionSample, SensitivityProfile, Vec3};
///
/// let mut detector = FallDetector::new(SensitivityProfile::Balanced);
/// let upright = MotionSample::new(Vec3::new(0.0, 0.0, 9.81), Vec3::ZERO, 0);
/// detector.calibrate_from_samples(&[upright]).unwrap();
///
/// let event = detector.process(&MotionSample::new(Vec3::new(0.0, 0.0, 9.81), Vec3::ZERO, 50));
/// assert!(!event.confirmed);
/// ```
#[derive(Debug, Clone)]
pub struct FallDetector {
    thresholds: ThresholdProfile,
    state: DetectorState,
}

impl Default for FallDetector {
    fn default() -> Self {
        Self::new(SensitivityProfile::default())
    }
}

impl FallDetector {
    /// Create an uncalibrated detector using a named preset
    pub fn new(profile: SensitivityProfile) -> Self {
        Self::with_thresholds(profile.thresholds())
    }

    /// Create a detector around an explicit threshold bundle
    pub fn with_thresholds(thresholds: ThresholdProfile) -> Self {
        Self {
            thresholds,
            state: DetectorState::new(),
        }
    }

    pub fn profile(&self) -> SensitivityProfile {
        self.thresholds.profile
    }

    pub fn thresholds(&self) -> &ThresholdProfile {
        &self.thresholds
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn activity_state(&self) -> ActivityState {
        self.state.activity
    }

    pub fn is_calibrated(&self) -> bool {
        self.state.posture.is_calibrated()
    }

    pub fn calibrate(&mut self, calibration: Calibration) {
        self.state.posture.calibrate(calibration);
    }

    /// Average the given samples into the posture baseline
    pub fn calibrate_from_samples(
        &mut self,
        samples: &[MotionSample],
    ) -> Result<Calibration, DetectorError> {
        let calibration = Calibration::from_samples(samples)?;
        self.calibrate(calibration);
        Ok(calibration)
    }

    /// Swap the whole threshold bundle. In-flight state is left untouched.
    pub fn set_profile(&mut self, profile: SensitivityProfile) {
        if profile != self.thresholds.profile {
            info!(from = %self.thresholds.profile, to = %profile, "sensitivity profile changed");
        }
        self.thresholds = profile.thresholds();
    }

    /// Run one tick. Non-finite sensor values are treated as zero motion.
    pub fn process(&mut self, sample: &MotionSample) -> FallEvent {
        if sample.is_finite() {
            step(&mut self.state, sample, &self.thresholds)
        } else {
            warn!(
                timestamp_ms = sample.timestamp_ms,
                "non-finite sample values replaced with zero"
            );
            step(&mut self.state, &sample.sanitized(), &self.thresholds)
        }
    }

    /// Run one tick, rejecting non-finite samples instead of sanitizing them
    pub fn try_process(&mut self, sample: &MotionSample) -> Result<FallEvent, DetectorError> {
        if !sample.is_finite() {
            return Err(DetectorError::NonFiniteSample(format!(
                "accel={:?} gyro={:?} at {} ms",
                sample.accel, sample.gyro, sample.timestamp_ms
            )));
        }
        Ok(step(&mut self.state, sample, &self.thresholds))
    }

    /// Forget all episode state, keeping calibration and profile
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Save detector state to JSON
    pub fn save_state(&self) -> Result<String, DetectorError> {
        Ok(serde_json::to_string(&self.state)?)
    }

    /// Load detector state from JSON
    pub fn load_state(&mut self, json: &str) -> Result<(), DetectorError> {
        self.state = serde_json::from_str(json)?;
        Ok(())
    }
}

/// Run a whole NDJSON recording through a fresh detector.
///
/// The first `calibration_samples` records calibrate the posture baseline and
/// produce no events. Blank lines are skipped.
pub fn detect_falls_ndjson(
    input: &str,
    profile: SensitivityProfile,
    calibration_samples: usize,
) -> Result<Vec<FallEvent>, DetectorError> {
    let mut detector = FallDetector::new(profile);
    let mut calibration = Vec::with_capacity(calibration_samples);
    let mut events = Vec::new();

    for (line_no, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let sample: MotionSample = serde_json::from_str(line)
            .map_err(|e| DetectorError::ParseError(format!("line {}: {}", line_no + 1, e)))?;

        if calibration.len() < calibration_samples {
            calibration.push(sample);
            if calibration.len() == calibration_samples {
                detector.calibrate_from_samples(&calibration)?;
            }
            continue;
        }
        events.push(detector.try_process(&sample)?);
    }

    if calibration_samples > 0 && calibration.len() < calibration_samples {
        return Err(DetectorError::InsufficientCalibration {
            required: calibration_samples,
            provided: calibration.len(),
        });
    }

    Ok(events)
}
