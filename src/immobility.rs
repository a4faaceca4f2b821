//! Post-fall immobility monitoring
//!
//! After a confirmed fall the wearer is sampled into a short trailing window.
//! Low variance and a narrow SVM range mean nobody is moving, which after a
//! fall points to possible unconsciousness.

use crate::profile::ThresholdProfile;
use crate::ring::RingBuffer;
use crate::types::{elapsed_ms, MotionFeatures};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Samples in the immobility window
pub const IMMOBILITY_WINDOW: usize = 10;

/// Criteria out of four that must agree before calling the wearer immobile
pub const IMMOBILITY_VOTES_REQUIRED: u8 = 3;

/// One (SVM, angular velocity) pair in the window
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionPair {
    pub svm: f32,
    pub angular_velocity: f32,
}

/// Window statistics and the resulting verdict
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImmobilityAssessment {
    pub svm_mean: f32,
    pub svm_variance: f32,
    pub svm_stddev: f32,
    pub gyro_mean: f32,
    pub gyro_variance: f32,
    pub svm_range: f32,
    /// How many of the four stillness criteria held
    pub criteria_met: u8,
    pub is_immobile: bool,
    pub immobile_duration_ms: u32,
}

/// Compute statistics over a window and vote on immobility
pub fn assess<'a>(
    window: impl Iterator<Item = &'a MotionPair> + Clone,
    thresholds: &ThresholdProfile,
) -> ImmobilityAssessment {
    let n = window.clone().count();
    if n == 0 {
        return ImmobilityAssessment::default();
    }
    let n_f = n as f32;

    let (svm_sum, gyro_sum, svm_min, svm_max) = window.clone().fold(
        (0.0f32, 0.0f32, f32::INFINITY, f32::NEG_INFINITY),
        |(s, g, lo, hi), pair| {
            (
                s + pair.svm,
                g + pair.angular_velocity,
                lo.min(pair.svm),
                hi.max(pair.svm),
            )
        },
    );
    let svm_mean = svm_sum / n_f;
    let gyro_mean = gyro_sum / n_f;

    let (svm_sq, gyro_sq) = window.fold((0.0f32, 0.0f32), |(s, g), pair| {
        let ds = pair.svm - svm_mean;
        let dg = pair.angular_velocity - gyro_mean;
        (s + ds * ds, g + dg * dg)
    });
    let svm_variance = svm_sq / n_f;
    let gyro_variance = gyro_sq / n_f;
    let svm_stddev = svm_variance.sqrt();
    let svm_range = svm_max - svm_min;

    let votes = [
        svm_variance < thresholds.immobility_accel_variance,
        svm_stddev < thresholds.immobility_accel_stddev,
        gyro_variance < thresholds.immobility_gyro_variance,
        svm_range < thresholds.immobility_svm_range,
    ];
    let criteria_met = votes.iter().filter(|v| **v).count() as u8;

    ImmobilityAssessment {
        svm_mean,
        svm_variance,
        svm_stddev,
        gyro_mean,
        gyro_variance,
        svm_range,
        criteria_met,
        is_immobile: criteria_met >= IMMOBILITY_VOTES_REQUIRED,
        immobile_duration_ms: 0,
    }
}

/// Rolling post-fall window plus immobility onset tracking
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImmobilityMonitor {
    buffer: RingBuffer<MotionPair, IMMOBILITY_WINDOW>,
    last_sample_at: Option<u32>,
    immobile_since: Option<u32>,
    latest: ImmobilityAssessment,
}

impl ImmobilityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The window has filled since the last clear, so verdicts are meaningful
    pub fn window_full(&self) -> bool {
        self.buffer.is_full()
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn window(&self) -> impl Iterator<Item = &MotionPair> + '_ {
        self.buffer.iter()
    }

    pub fn assessment(&self) -> &ImmobilityAssessment {
        &self.latest
    }

    pub fn is_immobile(&self) -> bool {
        self.latest.is_immobile
    }

    /// Offer one tick to the monitor. Returns false when the tick falls inside
    /// the sampling interval and was skipped.
    pub fn sample(
        &mut self,
        features: &MotionFeatures,
        now_ms: u32,
        thresholds: &ThresholdProfile,
    ) -> bool {
        if let Some(last) = self.last_sample_at {
            if elapsed_ms(now_ms, last) < thresholds.immobility_sampling_interval_ms {
                return false;
            }
        }
        self.last_sample_at = Some(now_ms);
        self.buffer.push(MotionPair {
            svm: features.svm,
            angular_velocity: features.angular_velocity,
        });

        if !self.buffer.is_full() {
            self.latest.is_immobile = false;
            debug!(
                collected = self.buffer.len(),
                window = IMMOBILITY_WINDOW,
                "collecting immobility samples"
            );
            return true;
        }

        let mut assessment = assess(self.buffer.iter(), thresholds);
        if assessment.is_immobile {
            let since = *self.immobile_since.get_or_insert(now_ms);
            assessment.immobile_duration_ms = elapsed_ms(now_ms, since);
        } else {
            self.immobile_since = None;
        }

        debug!(
            variance = assessment.svm_variance,
            stddev = assessment.svm_stddev,
            gyro_variance = assessment.gyro_variance,
            svm_range = assessment.svm_range,
            criteria = assessment.criteria_met,
            immobile = assessment.is_immobile,
            "immobility assessed"
        );
        self.latest = assessment;
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
