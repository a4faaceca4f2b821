//! Fall sequence tracking
//!
//! A real fall tends to show up as free-fall, then impact, then tumbling.
//! This module flags each of those sub-events with the time it was seen and
//! drops the flag once it is older than the sequence window, so evidence from
//! one episode never leaks into an unrelated later one.

use crate::profile::ThresholdProfile;
use crate::types::{elapsed_ms, MotionFeatures};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Saturating evidence accumulators; never negative by construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvidenceCounters {
    pub impact: u8,
    pub warning: u8,
    pub gyro_sustained: u8,
}

impl EvidenceCounters {
    pub fn add_impact(&mut self, weight: u8) {
        self.impact = self.impact.saturating_add(weight);
    }

    pub fn add_warning(&mut self) {
        self.warning = self.warning.saturating_add(1);
    }

    pub fn add_gyro(&mut self) {
        self.gyro_sustained = self.gyro_sustained.saturating_add(1);
    }

    /// Decay impact and warning evidence by one tick
    pub fn decay(&mut self) {
        self.impact = self.impact.saturating_sub(1);
        self.warning = self.warning.saturating_sub(1);
    }

    pub fn decay_gyro(&mut self) {
        self.gyro_sustained = self.gyro_sustained.saturating_sub(1);
    }

    pub fn is_idle(&self) -> bool {
        self.impact == 0 && self.warning == 0
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// What the tracker saw on the current tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceReport {
    /// An impact was flagged on this tick
    pub impact_started: bool,
    /// That impact landed inside the window of an active free-fall flag
    pub impact_after_freefall: bool,
    /// Angular velocity is above the sustained-rotation threshold
    pub sustained_rotation: bool,
}

/// Free-fall, impact and rotation flags, each stored as the time it was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequenceTracker {
    freefall_at: Option<u32>,
    impact_at: Option<u32>,
    rotation_at: Option<u32>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn freefall(&self) -> bool {
        self.freefall_at.is_some()
    }

    pub fn impact(&self) -> bool {
        self.impact_at.is_some()
    }

    pub fn rotation(&self) -> bool {
        self.rotation_at.is_some()
    }

    pub fn freefall_time(&self) -> Option<u32> {
        self.freefall_at
    }

    pub fn impact_time(&self) -> Option<u32> {
        self.impact_at
    }

    /// Free-fall, impact and rotation all flagged at once
    pub fn is_complete(&self) -> bool {
        self.freefall() && self.impact() && self.rotation()
    }

    /// The flagged impact came within `window_ms` after the flagged free-fall
    pub fn impact_followed_freefall(&self, window_ms: u32) -> bool {
        match (self.freefall_at, self.impact_at) {
            (Some(freefall), Some(impact)) => elapsed_ms(impact, freefall) < window_ms,
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Drop every flag raised more than `window_ms` ago
    pub fn expire(&mut self, now_ms: u32, window_ms: u32) {
        for flag in [
            &mut self.freefall_at,
            &mut self.impact_at,
            &mut self.rotation_at,
        ] {
            if let Some(at) = *flag {
                if elapsed_ms(now_ms, at) > window_ms {
                    *flag = None;
                }
            }
        }
    }

    /// Update flags for one tick and feed the impact and rotation counters
    pub fn observe(
        &mut self,
        features: &MotionFeatures,
        now_ms: u32,
        thresholds: &ThresholdProfile,
        counters: &mut EvidenceCounters,
    ) -> SequenceReport {
        let window = thresholds.fall_sequence_window_ms;
        self.expire(now_ms, window);

        let mut report = SequenceReport::default();

        if features.svm < thresholds.svm_low && self.freefall_at.is_none() {
            self.freefall_at = Some(now_ms);
            debug!(svm = features.svm, "free-fall phase flagged");
        }

        let impact = features.svm > thresholds.svm_high || features.jerk > thresholds.jerk_high;
        if impact && self.impact_at.is_none() {
            self.impact_at = Some(now_ms);
            report.impact_started = true;

            let after_freefall = self
                .freefall_at
                .is_some_and(|at| elapsed_ms(now_ms, at) < window);
            if after_freefall {
                // Free-fall followed by impact is the classic fall signature
                counters.add_impact(2);
                report.impact_after_freefall = true;
                debug!(svm = features.svm, "impact after free-fall");
            } else {
                counters.add_impact(1);
                debug!(svm = features.svm, jerk = features.jerk, "impact flagged");
            }
        }

        if features.angular_velocity > thresholds.gyro_sustained {
            counters.add_gyro();
            self.rotation_at = Some(now_ms);
            report.sustained_rotation = true;
            debug!(
                angular_velocity = features.angular_velocity,
                count = counters.gyro_sustained,
                "sustained rotation"
            );
        } else {
            counters.decay_gyro();
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(svm: f32, angular_velocity: f32) -> MotionFeatures {
        MotionFeatures {
            jerk: 0.0,
            svm,
            angular_velocity,
        }
    }

    #[test]
    fn test_counters_never_underflow() {
        let mut counters = EvidenceCounters::default();
        counters.decay();
        counters.decay_gyro();
        assert_eq!(counters, EvidenceCounters::default());

        counters.impact = u8::MAX;
        counters.add_impact(2);
        assert_eq!(counters.impact, u8::MAX);
    }

    #[test]
    fn test_impact_after_freefall_counts_double() {
        let thresholds = ThresholdProfile::default();
        let mut tracker = SequenceTracker::new();
        let mut counters = EvidenceCounters::default();

        tracker.observe(&features(0.3, 0.0), 1000, &thresholds, &mut counters);
        assert!(tracker.freefall());
        assert_eq!(counters.impact, 0);

        let report = tracker.observe(&features(2.5, 0.0), 1200, &thresholds, &mut counters);
        assert!(report.impact_started);
        assert!(report.impact_after_freefall);
        assert_eq!(counters.impact, 2);
        assert!(tracker.impact_followed_freefall(thresholds.fall_sequence_window_ms));
    }

    #[test]
    fn test_isolated_impact_counts_once() {
        let thresholds = ThresholdProfile::default();
        let mut tracker = SequenceTracker::new();
        let mut counters = EvidenceCounters::default();

        let report = tracker.observe(&features(2.0, 0.0), 1000, &thresholds, &mut counters);
        assert!(report.impact_started);
        assert!(!report.impact_after_freefall);
        assert_eq!(counters.impact, 1);

        // Already flagged: a second peak inside the window adds nothing here
        let report = tracker.observe(&features(2.0, 0.0), 1100, &thresholds, &mut counters);
        assert!(!report.impact_started);
        assert_eq!(counters.impact, 1);
    }

    #[test]
    fn test_flags_expire_after_window() {
        let thresholds = ThresholdProfile::default();
        let mut tracker = SequenceTracker::new();
        let mut counters = EvidenceCounters::default();

        tracker.observe(&features(0.3, 200.0), 1000, &thresholds, &mut counters);
        assert!(tracker.freefall());
        assert!(tracker.rotation());

        tracker.observe(&features(1.0, 0.0), 1800, &thresholds, &mut counters);
        assert!(tracker.freefall(), "exactly at the window edge the flag survives");

        tracker.observe(&features(1.0, 0.0), 1801, &thresholds, &mut counters);
        assert!(!tracker.freefall());
        assert!(!tracker.rotation());
    }

    #[test]
    fn test_stale_freefall_does_not_boost_impact() {
        let thresholds = ThresholdProfile::default();
        let mut tracker = SequenceTracker::new();
        let mut counters = EvidenceCounters::default();

        tracker.observe(&features(0.3, 0.0), 1000, &thresholds, &mut counters);
        let report = tracker.observe(&features(2.5, 0.0), 2000, &thresholds, &mut counters);
        assert!(!report.impact_after_freefall);
        assert_eq!(counters.impact, 1);
    }

    #[test]
    fn test_rotation_counter_rises_and_decays() {
        let thresholds = ThresholdProfile::default();
        let mut tracker = SequenceTracker::new();
        let mut counters = EvidenceCounters::default();

        for t in 0..3 {
            tracker.observe(&features(1.0, 200.0), 1000 + t * 50, &thresholds, &mut counters);
        }
        assert_eq!(counters.gyro_sustained, 3);

        tracker.observe(&features(1.0, 10.0), 1150, &thresholds, &mut counters);
        assert_eq!(counters.gyro_sustained, 2);
        assert!(tracker.rotation(), "flag outlives the counter until the window lapses");
    }
}
