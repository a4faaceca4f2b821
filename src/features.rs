//! Motion feature extraction
//!
//! This module derives the per-tick scalars every later stage consumes:
//! - Jerk magnitude from consecutive acceleration vectors
//! - Signal vector magnitude in g
//! - Angular velocity magnitude

use crate::types::{elapsed_ms, MotionFeatures, MotionSample, Vec3, GRAVITY};
use serde::{Deserialize, Serialize};

/// Substitute for a zero or negative sample interval (seconds)
pub const MIN_DELTA_SECONDS: f32 = 0.01;

/// Feature extractor holding the previous acceleration vector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureExtractor {
    prev_accel: Option<Vec3>,
    last_timestamp_ms: Option<u32>,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the previous sample, never zero
    pub fn delta_seconds(&self, now_ms: u32) -> f32 {
        match self.last_timestamp_ms {
            Some(last) => {
                let dt = elapsed_ms(now_ms, last) as f32 / 1000.0;
                if dt <= 0.0 {
                    MIN_DELTA_SECONDS
                } else {
                    dt
                }
            }
            None => MIN_DELTA_SECONDS,
        }
    }

    /// Derive features for one sample and remember its acceleration
    pub fn extract(&mut self, sample: &MotionSample, delta_seconds: f32) -> MotionFeatures {
        // First sample has nothing to differentiate against
        let prev = self.prev_accel.unwrap_or(sample.accel);
        let jerk = compute_jerk(sample.accel, prev, delta_seconds);

        self.prev_accel = Some(sample.accel);
        self.last_timestamp_ms = Some(sample.timestamp_ms);

        MotionFeatures {
            jerk,
            svm: compute_svm(sample.accel),
            angular_velocity: compute_angular_velocity(sample.gyro),
        }
    }
}

/// Jerk magnitude: ‖(a − a_prev) / Δt‖ in m/s³
pub fn compute_jerk(accel: Vec3, prev_accel: Vec3, delta_seconds: f32) -> f32 {
    let dt = if delta_seconds > 0.0 {
        delta_seconds
    } else {
        MIN_DELTA_SECONDS
    };
    ((accel - prev_accel) / dt).magnitude()
}

/// Signal vector magnitude in g
pub fn compute_svm(accel: Vec3) -> f32 {
    accel.magnitude() / GRAVITY
}

/// Combined angular velocity magnitude in °/s
pub fn compute_angular_velocity(gyro: Vec3) -> f32 {
    gyro.magnitude()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(accel: Vec3, t: u32) -> MotionSample {
        MotionSample::new(accel, Vec3::new(0.0, 30.0, 40.0), t)
    }

    #[test]
    fn test_svm_at_rest_is_one_g() {
        let svm = compute_svm(Vec3::new(0.0, 0.0, GRAVITY));
        assert!((svm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_jerk_from_previous_sample() {
        let mut extractor = FeatureExtractor::new();
        let first = extractor.extract(&sample(Vec3::new(0.0, 0.0, 9.8), 1000), 0.05);
        assert_eq!(first.jerk, 0.0);
        assert!((first.angular_velocity - 50.0).abs() < 1e-4);

        let dt = extractor.delta_seconds(1050);
        assert!((dt - 0.05).abs() < 1e-6);
        let second = extractor.extract(&sample(Vec3::new(0.0, 3.0, 13.8), 1050), dt);
        // ‖(0, 3, 4)‖ / 0.05 = 100
        assert!((second.jerk - 100.0).abs() < 1e-2);
    }

    #[test]
    fn test_degenerate_delta_uses_epsilon() {
        let mut extractor = FeatureExtractor::new();
        extractor.extract(&sample(Vec3::new(0.0, 0.0, 9.8), 500), 0.05);

        assert_eq!(extractor.delta_seconds(500), MIN_DELTA_SECONDS);
        let jerk = compute_jerk(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, 0.0);
        assert!(jerk.is_finite());
        assert!((jerk - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_delta_across_timer_wraparound() {
        let mut extractor = FeatureExtractor::new();
        extractor.extract(&sample(Vec3::new(0.0, 0.0, 9.8), u32::MAX - 49), 0.05);
        let dt = extractor.delta_seconds(50);
        assert!((dt - 0.1).abs() < 1e-6);
    }
}
