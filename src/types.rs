//! Core types for the Fallwatch engine
//!
//! This module defines the data that flows through one detection tick: the raw
//! motion sample coming in, the derived motion features shared between stages,
//! and the fall event handed to the transport and display collaborators.

use crate::error::DetectorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Sub};

/// Standard gravity (m/s²)
pub const GRAVITY: f32 = 9.80665;

/// Milliseconds from `since` to `now` on a wrapping u32 clock
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Three-axis vector used for both acceleration and angular rate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Replace every non-finite component with zero
    pub fn finite_or_zero(&self) -> Self {
        let clean = |v: f32| if v.is_finite() { v } else { 0.0 };
        Self::new(clean(self.x), clean(self.y), clean(self.z))
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Div<f32> for Vec3 {
    type Output = Vec3;

    fn div(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

/// One instant of 6-axis sensor data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Linear acceleration (m/s²)
    pub accel: Vec3,
    /// Angular rate (°/s)
    pub gyro: Vec3,
    /// Monotonic arrival time (milliseconds since boot, wraps at u32::MAX)
    pub timestamp_ms: u32,
}

impl MotionSample {
    pub fn new(accel: Vec3, gyro: Vec3, timestamp_ms: u32) -> Self {
        Self {
            accel,
            gyro,
            timestamp_ms,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.accel.is_finite() && self.gyro.is_finite()
    }

    /// Treat undefined sensor values as zero motion
    pub fn sanitized(&self) -> Self {
        Self {
            accel: self.accel.finite_or_zero(),
            gyro: self.gyro.finite_or_zero(),
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// Scalars derived from one sample by the feature extractor
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionFeatures {
    /// Jerk magnitude (m/s³)
    pub jerk: f32,
    /// Signal vector magnitude (g)
    pub svm: f32,
    /// Angular velocity magnitude (°/s)
    pub angular_velocity: f32,
}

/// Activity classification maintained by the fall classifier.
///
/// The discriminants are the values carried in byte 5 of the status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ActivityState {
    #[default]
    Normal = 0,
    Warning = 1,
    FallDetected = 2,
    Dangerous = 3,
    Recovery = 4,
}

impl ActivityState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Normal => "normal",
            ActivityState::Warning => "warning",
            ActivityState::FallDetected => "fall_detected",
            ActivityState::Dangerous => "dangerous",
            ActivityState::Recovery => "recovery",
        }
    }

    /// States that raise the fall bit in the status record's alert flags
    pub fn raises_fall_alert(&self) -> bool {
        matches!(self, ActivityState::FallDetected | ActivityState::Dangerous)
    }
}

impl TryFrom<u8> for ActivityState {
    type Error = DetectorError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ActivityState::Normal),
            1 => Ok(ActivityState::Warning),
            2 => Ok(ActivityState::FallDetected),
            3 => Ok(ActivityState::Dangerous),
            4 => Ok(ActivityState::Recovery),
            other => Err(DetectorError::InvalidActivityState(other)),
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence that led to a fall confirmation, captured before counters reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallEvidence {
    /// Weighted criteria score
    pub score: u8,
    /// Number of distinct criteria that fired
    pub criteria_count: u8,
    pub impact_counter: u8,
    pub warning_counter: u8,
}

/// Snapshot emitted once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallEvent {
    pub state: ActivityState,
    pub timestamp_ms: u32,
    /// Jerk magnitude (m/s³)
    pub jerk: f32,
    /// Signal vector magnitude (g)
    pub svm: f32,
    /// Angular velocity magnitude (°/s)
    pub angular_velocity: f32,
    /// Pitch in degrees, present once calibrated
    pub pitch: Option<f32>,
    /// Roll in degrees, present once calibrated
    pub roll: Option<f32>,
    /// Raw acceleration of this tick (m/s²)
    pub acceleration: Vec3,
    /// True only on the tick a fall moves from Warning to FallDetected
    pub confirmed: bool,
    /// Present only when `confirmed` is true
    pub evidence: Option<FallEvidence>,
    /// Variance of the immobility window SVM samples (g²)
    pub movement_variance: f32,
    /// Standard deviation of the immobility window SVM samples (g)
    pub movement_stddev: f32,
    pub is_immobile: bool,
    pub immobile_duration_ms: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_magnitude() {
        let v = Vec3::new(3.0, 4.0, 12.0);
        assert!((v.magnitude() - 13.0).abs() < 1e-5);
        assert_eq!(Vec3::ZERO.magnitude(), 0.0);
    }

    #[test]
    fn test_elapsed_survives_wraparound() {
        assert_eq!(elapsed_ms(1500, 1000), 500);
        assert_eq!(elapsed_ms(99, u32::MAX - 100), 200);
        assert_eq!(elapsed_ms(7, 7), 0);
    }

    #[test]
    fn test_sanitized_sample_zeroes_garbage() {
        let sample = MotionSample::new(
            Vec3::new(f32::NAN, 1.0, f32::INFINITY),
            Vec3::new(2.0, f32::NEG_INFINITY, 3.0),
            42,
        );
        assert!(!sample.is_finite());

        let clean = sample.sanitized();
        assert!(clean.is_finite());
        assert_eq!(clean.accel, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(clean.gyro, Vec3::new(2.0, 0.0, 3.0));
        assert_eq!(clean.timestamp_ms, 42);
    }

    #[test]
    fn test_activity_state_numeric_mapping() {
        for value in 0u8..5 {
            let state = ActivityState::try_from(value).unwrap();
            assert_eq!(state.as_u8(), value);
        }
        assert!(ActivityState::try_from(5).is_err());
        assert_eq!(ActivityState::Dangerous.as_u8(), 3);
    }

    #[test]
    fn test_fall_alert_states() {
        assert!(ActivityState::FallDetected.raises_fall_alert());
        assert!(ActivityState::Dangerous.raises_fall_alert());
        assert!(!ActivityState::Recovery.raises_fall_alert());
        assert!(!ActivityState::Warning.raises_fall_alert());
    }

    #[test]
    fn test_activity_state_serde() {
        let json = serde_json::to_string(&ActivityState::FallDetected).unwrap();
        assert_eq!(json, "\"fall_detected\"");
        let back: ActivityState = serde_json::from_str("\"recovery\"").unwrap();
        assert_eq!(back, ActivityState::Recovery);
    }
}
