//! Posture tracking
//!
//! Pitch and roll come from projecting gravity onto the body axes. Each tick is
//! compared against a baseline captured at startup, both as an absolute
//! deviation and as a rate of change. A fast change points to a fall, a slow
//! one to a controlled movement such as bowing.

use crate::error::DetectorError;
use crate::profile::ThresholdProfile;
use crate::types::{MotionSample, Vec3};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Samples averaged into the baseline at startup
pub const DEFAULT_CALIBRATION_SAMPLES: usize = 20;

/// Pitch and roll in degrees from an acceleration vector
pub fn pitch_roll(accel: Vec3) -> (f32, f32) {
    let pitch = accel.y.atan2(accel.z).to_degrees();
    let roll = accel.x.atan2(accel.z).to_degrees();
    (pitch, roll)
}

/// Baseline posture captured while the wearer holds a neutral position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub baseline_pitch: f32,
    pub baseline_roll: f32,
}

impl Calibration {
    pub fn new(baseline_pitch: f32, baseline_roll: f32) -> Self {
        Self {
            baseline_pitch,
            baseline_roll,
        }
    }

    /// Average pitch and roll over a run of samples
    pub fn from_samples(samples: &[MotionSample]) -> Result<Self, DetectorError> {
        if samples.is_empty() {
            return Err(DetectorError::InsufficientCalibration {
                required: 1,
                provided: 0,
            });
        }

        let (pitch_sum, roll_sum) = samples.iter().fold((0.0f32, 0.0f32), |(p, r), s| {
            let (pitch, roll) = pitch_roll(s.accel);
            (p + pitch, r + roll)
        });
        let n = samples.len() as f32;

        Ok(Self::new(pitch_sum / n, roll_sum / n))
    }
}

/// Incremental calibration for streaming input
#[derive(Debug, Clone)]
pub struct Calibrator {
    required: usize,
    pitch_sum: f32,
    roll_sum: f32,
    count: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(DEFAULT_CALIBRATION_SAMPLES)
    }
}

impl Calibrator {
    pub fn new(required: usize) -> Self {
        Self {
            required: required.max(1),
            pitch_sum: 0.0,
            roll_sum: 0.0,
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Add a sample; returns the calibration once enough samples arrived
    pub fn push(&mut self, sample: &MotionSample) -> Option<Calibration> {
        if self.count >= self.required {
            return None;
        }
        let (pitch, roll) = pitch_roll(sample.accel);
        self.pitch_sum += pitch;
        self.roll_sum += roll;
        self.count += 1;

        (self.count == self.required).then(|| self.finish_partial())
    }

    /// Calibration from whatever has been collected so far
    pub fn finish(&self) -> Result<Calibration, DetectorError> {
        if self.count == 0 {
            return Err(DetectorError::InsufficientCalibration {
                required: self.required,
                provided: 0,
            });
        }
        Ok(self.finish_partial())
    }

    fn finish_partial(&self) -> Calibration {
        let n = self.count as f32;
        Calibration::new(self.pitch_sum / n, self.roll_sum / n)
    }
}

/// Posture evidence for one tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PostureReading {
    pub pitch: f32,
    pub roll: f32,
    pub pitch_deviation: f32,
    pub roll_deviation: f32,
    /// Degrees per second since the previous tick
    pub pitch_rate: f32,
    pub roll_rate: f32,
    /// Either deviation beyond its angle threshold
    pub changed: bool,
    /// Either deviation beyond the rapid threshold, or either rate beyond its limit
    pub rapid: bool,
}

/// Posture tracker; produces nothing until calibrated
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostureTracker {
    calibration: Option<Calibration>,
    prev: Option<(f32, f32)>,
}

impl PostureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calibrate(&mut self, calibration: Calibration) {
        info!(
            baseline_pitch = calibration.baseline_pitch,
            baseline_roll = calibration.baseline_roll,
            "posture baseline calibrated"
        );
        self.prev = Some((calibration.baseline_pitch, calibration.baseline_roll));
        self.calibration = Some(calibration);
    }

    pub fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// Evaluate posture for one tick; `None` while uncalibrated
    pub fn observe(
        &mut self,
        accel: Vec3,
        delta_seconds: f32,
        thresholds: &ThresholdProfile,
    ) -> Option<PostureReading> {
        let calibration = self.calibration?;
        let (pitch, roll) = pitch_roll(accel);

        let pitch_deviation = (pitch - calibration.baseline_pitch).abs();
        let roll_deviation = (roll - calibration.baseline_roll).abs();

        let (prev_pitch, prev_roll) = self.prev.unwrap_or((pitch, roll));
        let pitch_rate = (pitch - prev_pitch).abs() / delta_seconds;
        let roll_rate = (roll - prev_roll).abs() / delta_seconds;
        self.prev = Some((pitch, roll));

        let changed = pitch_deviation > thresholds.pitch_threshold
            || roll_deviation > thresholds.roll_threshold;
        let rapid = pitch_deviation > thresholds.posture_rapid
            || roll_deviation > thresholds.posture_rapid
            || pitch_rate > thresholds.pitch_rate_threshold
            || roll_rate > thresholds.roll_rate_threshold;

        Some(PostureReading {
            pitch,
            roll,
            pitch_deviation,
            roll_deviation,
            pitch_rate,
            roll_rate,
            changed,
            rapid,
        })
    }
}
