//! Fall classification state machine
//!
//! [`DetectorState`] holds everything the engine remembers between ticks and
//! [`step`] is the only code allowed to change it. Each tick runs the stages
//! in a fixed order:
//!
//! 1. Feature extraction (jerk, SVM, angular velocity)
//! 2. Sequence tracking (free-fall, impact, rotation flags)
//! 3. Posture evaluation
//! 4. Intensity counters, Warning decay and Warning triggers
//! 5. Warning evaluation: bowing/jumping rejection, weighted scoring, timeout
//! 6. Post-fall handling: immobility sampling, Dangerous and Recovery

use crate::features::FeatureExtractor;
use crate::immobility::ImmobilityMonitor;
use crate::posture::{PostureReading, PostureTracker};
use crate::profile::ThresholdProfile;
use crate::sequence::{EvidenceCounters, SequenceReport, SequenceTracker};
use crate::types::{
    elapsed_ms, ActivityState, FallEvent, FallEvidence, MotionFeatures, MotionSample,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Score that confirms a fall on its own
pub const CONFIRM_SCORE: u8 = 6;
/// Lower score that confirms a fall when enough distinct criteria agree
pub const SUPPORTED_SCORE: u8 = 4;
pub const SUPPORTED_CRITERIA: u8 = 3;

/// Weighted evidence gathered while in Warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CriteriaScore {
    pub score: u8,
    pub count: u8,
}

impl CriteriaScore {
    fn add(&mut self, weight: u8) {
        self.score = self.score.saturating_add(weight);
        self.count += 1;
    }

    pub fn confirms_fall(&self) -> bool {
        self.score >= CONFIRM_SCORE
            || (self.score >= SUPPORTED_SCORE && self.count >= SUPPORTED_CRITERIA)
    }
}

/// Outcome of evaluating one Warning tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningVerdict {
    /// Slow, rotation-free episode; back to Normal
    Bowing,
    /// Enough evidence; move to FallDetected
    Confirmed(CriteriaScore),
    /// Warning outlived the sequence window without enough evidence
    TimedOut(CriteriaScore),
    /// Keep watching. `likely_jumping` flags free-fall without any rotation.
    Pending {
        score: CriteriaScore,
        likely_jumping: bool,
    },
}

/// Full mutable state of the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorState {
    pub activity: ActivityState,
    pub counters: EvidenceCounters,
    pub sequence: SequenceTracker,
    /// When the current Warning episode started
    pub warning_since: Option<u32>,
    /// Time of the last activity-state transition
    pub state_changed_at: Option<u32>,
    /// Time of the last confirmed fall
    pub last_fall_at: Option<u32>,
    pub prev_svm: f32,
    /// Whether the previous tick's posture reading was rapid
    #[serde(default)]
    pub posture_was_rapid: bool,
    pub features: FeatureExtractor,
    pub posture: PostureTracker,
    pub immobility: ImmobilityMonitor,
}

impl Default for DetectorState {
    fn default() -> Self {
        Self {
            activity: ActivityState::Normal,
            counters: EvidenceCounters::default(),
            sequence: SequenceTracker::default(),
            warning_since: None,
            state_changed_at: None,
            last_fall_at: None,
            prev_svm: 1.0,
            posture_was_rapid: false,
            features: FeatureExtractor::default(),
            posture: PostureTracker::default(),
            immobility: ImmobilityMonitor::default(),
        }
    }
}

impl DetectorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every episode while keeping calibration and trend memory
    pub fn reset(&mut self) {
        let features = std::mem::take(&mut self.features);
        let posture = std::mem::take(&mut self.posture);
        *self = Self {
            posture_was_rapid: self.posture_was_rapid,
            features,
            posture,
            ..Self::default()
        };
    }

    fn transition(&mut self, to: ActivityState, now_ms: u32) {
        if self.activity != to {
            info!(from = %self.activity, to = %to, at = now_ms, "activity state changed");
            self.activity = to;
            self.state_changed_at = Some(now_ms);
        }
    }

    /// Normal → Warning; any other state is left alone
    fn raise_warning(&mut self, now_ms: u32) {
        if self.activity == ActivityState::Normal {
            self.transition(ActivityState::Warning, now_ms);
            self.warning_since = Some(now_ms);
        }
    }

    /// Drop all Warning-phase evidence
    fn clear_evidence(&mut self) {
        self.counters.clear();
        self.sequence.clear();
        self.warning_since = None;
    }

    fn warning_duration(&self, now_ms: u32) -> u32 {
        self.warning_since
            .map(|since| elapsed_ms(now_ms, since))
            .unwrap_or(0)
    }

    /// Impact peaks and medium jerk feed the counters; quiet ticks decay them.
    ///
    /// `holding` marks a tick with sustained rotation or a rapid posture; such
    /// a tick is never quiet, so neither the counters nor the state decay.
    fn accumulate_intensity(
        &mut self,
        features: &MotionFeatures,
        holding: bool,
        now_ms: u32,
        thresholds: &ThresholdProfile,
    ) {
        if features.svm > thresholds.svm_impact_peak {
            self.counters.add_impact(2);
            self.raise_warning(now_ms);
        } else if features.jerk > thresholds.jerk_medium || features.svm > thresholds.svm_warning {
            self.counters.add_warning();
            if self.counters.warning >= thresholds.warning_count_threshold {
                self.raise_warning(now_ms);
            }
        } else if features.jerk > thresholds.jerk_low && self.activity == ActivityState::Warning {
            self.counters.add_warning();
        } else if !holding {
            self.counters.decay();
            if self.activity == ActivityState::Warning && self.counters.is_idle() {
                debug!("warning evidence decayed away");
                self.transition(ActivityState::Normal, now_ms);
                self.warning_since = None;
            }
        }
    }

    /// Weighted criteria over the current evidence
    pub fn score_criteria(
        &self,
        features: &MotionFeatures,
        posture: Option<&PostureReading>,
        thresholds: &ThresholdProfile,
    ) -> CriteriaScore {
        let mut score = CriteriaScore::default();

        if self.counters.impact >= thresholds.impact_count_threshold {
            if self
                .sequence
                .impact_followed_freefall(thresholds.fall_sequence_window_ms)
            {
                score.add(3);
            } else {
                score.add(1);
            }
        }

        if self.counters.gyro_sustained >= thresholds.gyro_sustained_count {
            score.add(3);
        } else if features.angular_velocity > thresholds.gyro_high {
            score.add(2);
        }

        match posture {
            Some(p) if p.rapid => score.add(3),
            Some(p) if p.changed => score.add(2),
            _ => {}
        }

        if features.jerk > thresholds.jerk_high {
            score.add(1);
        }

        if self.sequence.is_complete() {
            score.add(2);
        }

        score
    }

    /// Decide what a Warning tick leads to, without mutating anything
    pub fn evaluate_warning(
        &self,
        features: &MotionFeatures,
        posture: Option<&PostureReading>,
        now_ms: u32,
        thresholds: &ThresholdProfile,
    ) -> WarningVerdict {
        let duration = self.warning_duration(now_ms);
        let rapid_posture = posture.is_some_and(|p| p.rapid);

        // Bowing is slow and controlled: long Warning, no tumbling, no drop
        let likely_bowing = self.posture.is_calibrated()
            && duration > thresholds.bowing_rejection_ms
            && self.counters.gyro_sustained == 0
            && !self.sequence.freefall()
            && !rapid_posture;
        if likely_bowing {
            return WarningVerdict::Bowing;
        }

        // A jump drops into free-fall without the body rotating
        let likely_jumping = self.sequence.freefall()
            && !self.sequence.rotation()
            && self.counters.gyro_sustained == 0;

        let score = self.score_criteria(features, posture, thresholds);
        debug!(
            score = score.score,
            criteria = score.count,
            likely_jumping,
            "warning criteria"
        );

        if score.confirms_fall() {
            if likely_jumping {
                WarningVerdict::Pending {
                    score,
                    likely_jumping: true,
                }
            } else {
                WarningVerdict::Confirmed(score)
            }
        } else if duration > thresholds.fall_sequence_window_ms && score.score < SUPPORTED_SCORE {
            WarningVerdict::TimedOut(score)
        } else {
            WarningVerdict::Pending {
                score,
                likely_jumping,
            }
        }
    }

    fn confirm_fall(&mut self, score: CriteriaScore, now_ms: u32) -> FallEvidence {
        let evidence = FallEvidence {
            score: score.score,
            criteria_count: score.count,
            impact_counter: self.counters.impact,
            warning_counter: self.counters.warning,
        };
        info!(
            score = score.score,
            criteria = score.count,
            at = now_ms,
            "fall confirmed"
        );
        self.transition(ActivityState::FallDetected, now_ms);
        self.last_fall_at = Some(now_ms);
        self.clear_evidence();
        self.immobility.clear();
        evidence
    }

    /// FallDetected, Dangerous and Recovery handling
    fn follow_up(&mut self, features: &MotionFeatures, now_ms: u32, thresholds: &ThresholdProfile) {
        if self.activity == ActivityState::FallDetected {
            let since = self.state_changed_at.unwrap_or(now_ms);
            if elapsed_ms(now_ms, since) > thresholds.fall_confirmation_window_ms {
                self.immobility.sample(features, now_ms, thresholds);
                if self.immobility.window_full() {
                    if self.immobility.is_immobile() {
                        warn!(at = now_ms, "no movement after fall, possible unconsciousness");
                        self.transition(ActivityState::Dangerous, now_ms);
                    } else {
                        info!(at = now_ms, "movement detected after fall");
                        self.transition(ActivityState::Recovery, now_ms);
                    }
                }
            }
        } else if self.activity == ActivityState::Dangerous {
            self.immobility.sample(features, now_ms, thresholds);
            if !self.immobility.is_immobile() {
                info!(at = now_ms, "movement resumed");
                self.transition(ActivityState::Recovery, now_ms);
            }
        }

        if self.activity == ActivityState::Recovery {
            let since = self.last_fall_at.unwrap_or(now_ms);
            if elapsed_ms(now_ms, since) > thresholds.recovery_window_ms {
                self.transition(ActivityState::Normal, now_ms);
                self.clear_evidence();
                self.immobility.clear();
            }
        }
    }
}

/// Advance the engine by one sample
pub fn step(
    state: &mut DetectorState,
    sample: &MotionSample,
    thresholds: &ThresholdProfile,
) -> FallEvent {
    let now = sample.timestamp_ms;
    let gyro_before = state.counters.gyro_sustained;

    let delta_seconds = state.features.delta_seconds(now);
    let features = state.features.extract(sample, delta_seconds);
    let svm_trend = features.svm - state.prev_svm;
    state.prev_svm = features.svm;

    let report: SequenceReport =
        state
            .sequence
            .observe(&features, now, thresholds, &mut state.counters);
    if report.impact_started {
        state.raise_warning(now);
    }

    let posture = state.posture.observe(sample.accel, delta_seconds, thresholds);
    let rapid_posture = posture.is_some_and(|p| p.rapid);
    let rotation_sustained = state.counters.gyro_sustained >= thresholds.gyro_sustained_count;

    state.accumulate_intensity(&features, rapid_posture || rotation_sustained, now, thresholds);

    // Level signals open Warning only on the tick they first appear, so a
    // wearer lying still past the rapid angle is not re-raised after a timeout
    if rotation_sustained && gyro_before < thresholds.gyro_sustained_count {
        state.raise_warning(now);
    }
    if rapid_posture && !state.posture_was_rapid {
        state.raise_warning(now);
    }
    state.posture_was_rapid = rapid_posture;

    debug!(
        jerk = features.jerk,
        svm = features.svm,
        svm_trend,
        angular_velocity = features.angular_velocity,
        state = %state.activity,
        "tick"
    );

    let mut evidence = None;
    if state.activity == ActivityState::Warning {
        match state.evaluate_warning(&features, posture.as_ref(), now, thresholds) {
            WarningVerdict::Bowing => {
                info!(at = now, "rejected as bowing");
                state.transition(ActivityState::Normal, now);
                state.clear_evidence();
                return build_event(state, sample, &features, posture.as_ref(), None);
            }
            WarningVerdict::Confirmed(score) => {
                evidence = Some(state.confirm_fall(score, now));
            }
            WarningVerdict::TimedOut(score) => {
                info!(score = score.score, "warning timed out, insufficient evidence");
                state.transition(ActivityState::Normal, now);
                state.clear_evidence();
            }
            WarningVerdict::Pending {
                likely_jumping: true,
                score,
            } if score.confirms_fall() => {
                warn!(score = score.score, "fall score reached but likely jumping");
            }
            WarningVerdict::Pending { .. } => {}
        }
    }

    state.follow_up(&features, now, thresholds);

    build_event(state, sample, &features, posture.as_ref(), evidence)
}

fn build_event(
    state: &DetectorState,
    sample: &MotionSample,
    features: &MotionFeatures,
    posture: Option<&PostureReading>,
    evidence: Option<FallEvidence>,
) -> FallEvent {
    let immobility = state.immobility.assessment();
    FallEvent {
        state: state.activity,
        timestamp_ms: sample.timestamp_ms,
        jerk: features.jerk,
        svm: features.svm,
        angular_velocity: features.angular_velocity,
        pitch: posture.map(|p| p.pitch),
        roll: posture.map(|p| p.roll),
        acceleration: sample.accel,
        confirmed: evidence.is_some(),
        evidence,
        movement_variance: immobility.svm_variance,
        movement_stddev: immobility.svm_stddev,
        is_immobile: immobility.is_immobile,
        immobile_duration_ms: immobility.immobile_duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::immobility::IMMOBILITY_WINDOW;
    use crate::posture::Calibration;
    use crate::types::{Vec3, GRAVITY};
    use proptest::prelude::*;

    fn tilted(pitch_deg: f32, g: f32) -> Vec3 {
        let rad = pitch_deg.to_radians();
        Vec3::new(0.0, g * GRAVITY * rad.sin(), g * GRAVITY * rad.cos())
    }

    fn sample(pitch_deg: f32, g: f32, gyro: f32, t: u32) -> MotionSample {
        MotionSample::new(tilted(pitch_deg, g), Vec3::new(gyro, 0.0, 0.0), t)
    }

    fn calibrated_state() -> DetectorState {
        let mut state = DetectorState::new();
        state.posture.calibrate(Calibration::new(0.0, 0.0));
        state
    }

    fn still(state: &mut DetectorState, thresholds: &ThresholdProfile, from: u32, to: u32) {
        let mut t = from;
        while t < to {
            step(state, &sample(0.0, 1.0, 0.0, t), thresholds);
            t += 50;
        }
    }

    /// Free-fall dip, impact, then tumbling onto the side.
    /// Returns every emitted event and the time of the last tick.
    fn fall_sequence(
        state: &mut DetectorState,
        thresholds: &ThresholdProfile,
    ) -> (Vec<FallEvent>, u32) {
        still(state, thresholds, 0, 1000);
        let mut events = Vec::new();
        for t in [1000, 1050, 1100] {
            events.push(step(state, &sample(0.0, 0.3, 0.0, t), thresholds));
        }
        events.push(step(state, &sample(0.0, 2.5, 0.0, 1150), thresholds));
        for t in [1200, 1250, 1300] {
            events.push(step(state, &sample(70.0, 1.0, 200.0, t), thresholds));
        }
        (events, 1300)
    }

    #[test]
    fn test_fall_confirmation_sequence() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        let (events, _) = fall_sequence(&mut state, &thresholds);

        let states: Vec<_> = events.iter().map(|e| e.state).collect();
        assert_eq!(states[0], ActivityState::Normal);
        assert_eq!(states[3], ActivityState::Warning, "impact opens Warning");

        let confirmed: Vec<_> = events.iter().filter(|e| e.confirmed).collect();
        assert_eq!(confirmed.len(), 1);
        let confirmation = confirmed[0];
        assert_eq!(confirmation.state, ActivityState::FallDetected);
        assert_eq!(confirmation.timestamp_ms, 1200);

        let evidence = confirmation.evidence.unwrap();
        assert!(evidence.score >= CONFIRM_SCORE);
        assert!(evidence.criteria_count >= SUPPORTED_CRITERIA);
        assert!(evidence.impact_counter >= thresholds.impact_count_threshold);

        assert!(events[5..].iter().all(|e| e.state == ActivityState::FallDetected));
        assert_eq!(state.counters, EvidenceCounters { gyro_sustained: 2, ..Default::default() });
    }

    #[test]
    fn test_jump_without_rotation_is_held_back() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        still(&mut state, &thresholds, 0, 1000);

        step(&mut state, &sample(0.0, 0.3, 0.0, 1000), &thresholds);
        step(&mut state, &sample(0.0, 0.3, 0.0, 1050), &thresholds);
        let landing = step(&mut state, &sample(0.0, 2.6, 0.0, 1100), &thresholds);
        assert_eq!(landing.state, ActivityState::Warning);
        assert!(!landing.confirmed);

        let mut t = 1150;
        let mut events = Vec::new();
        while t < 3000 {
            events.push(step(&mut state, &sample(0.0, 1.0, 0.0, t), &thresholds));
            t += 50;
        }
        assert!(events.iter().all(|e| !e.confirmed));
        assert_eq!(events.last().unwrap().state, ActivityState::Normal);
    }

    #[test]
    fn test_deep_bow_is_rejected_after_bowing_time() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        still(&mut state, &thresholds, 0, 1000);

        // Moderate jolt, then a brisk bow past 60 degrees at 80 °/s with no
        // rotation, held, then straightening up
        let jolt = step(&mut state, &sample(0.0, 2.3, 0.0, 1000), &thresholds);
        assert_eq!(jolt.state, ActivityState::Warning);
        assert_eq!(state.warning_since, Some(1000));

        let mut t = 1050;
        let mut pitch = 0.0f32;
        while t <= 2500 {
            pitch = (pitch + 4.0).min(62.0);
            let event = step(&mut state, &sample(pitch, 1.5, 0.0, t), &thresholds);
            assert_eq!(event.state, ActivityState::Warning, "still bowing at {t}");
            assert_eq!(state.warning_since, Some(1000));
            t += 50;
        }

        // Back under the rapid angle once Warning is older than the bowing time
        let event = step(&mut state, &sample(58.0, 1.5, 0.0, 2550), &thresholds);
        assert_eq!(event.state, ActivityState::Normal);
        assert!(!event.confirmed);
        assert_eq!(state.counters, EvidenceCounters::default());
        assert!(!state.sequence.impact());
        assert!(state.warning_since.is_none());

        let mut t = 2600;
        let mut pitch = 58.0f32;
        while pitch > 0.0 {
            pitch = (pitch - 4.0).max(0.0);
            let event = step(&mut state, &sample(pitch, 1.0, 0.0, t), &thresholds);
            assert_eq!(event.state, ActivityState::Normal);
            t += 50;
        }
    }

    #[test]
    fn test_lying_still_past_rapid_angle_times_out() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        still(&mut state, &thresholds, 0, 1000);

        // Slow lie-down at 70 °/s to 77 degrees
        let mut events = Vec::new();
        let mut t = 1050;
        let mut pitch = 0.0f32;
        while pitch < 77.0 {
            pitch += 7.0;
            events.push(step(&mut state, &sample(pitch, 1.0, 0.0, t), &thresholds));
            t += 100;
        }
        // Then lying still
        for _ in 0..100 {
            events.push(step(&mut state, &sample(77.0, 1.0, 0.0, t), &thresholds));
            t += 100;
        }

        let raised = events
            .iter()
            .position(|e| e.state == ActivityState::Warning)
            .unwrap();
        // 63 degrees is the first reading past the rapid angle
        assert_eq!(events[raised].timestamp_ms, 1850);

        let cleared = raised
            + events[raised..]
                .iter()
                .position(|e| e.state == ActivityState::Normal)
                .unwrap();
        assert_eq!(events[cleared].timestamp_ms, 2750);
        assert!(events[cleared].timestamp_ms - 1850 > thresholds.fall_sequence_window_ms);

        assert!(events[cleared..]
            .iter()
            .all(|e| e.state == ActivityState::Normal && !e.confirmed));
        assert!(state.warning_since.is_none());
        assert_eq!(
            events
                .iter()
                .filter(|e| e.state == ActivityState::Warning)
                .count(),
            cleared - raised
        );
    }

    #[test]
    fn test_sustained_rotation_opens_warning_until_timeout() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        still(&mut state, &thresholds, 0, 1000);

        // Turning steadily in place at 150 °/s, upright and without jolts
        let mut t = 1000;
        let mut states = Vec::new();
        while t < 2000 {
            states.push(step(&mut state, &sample(0.0, 1.0, 150.0, t), &thresholds).state);
            t += 50;
        }

        // Crosses the sustained count on the third tick, at 1100
        assert_eq!(states[1], ActivityState::Normal);
        assert!(states[2..19].iter().all(|s| *s == ActivityState::Warning));
        // Rotation alone never scores enough, so Warning times out after 800 ms
        assert_eq!(states[19], ActivityState::Normal);
        assert_eq!(state.counters, EvidenceCounters::default());
    }

    #[test]
    fn test_long_quiet_warning_is_bowing() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        state.activity = ActivityState::Warning;
        state.warning_since = Some(1000);
        state.counters.impact = 5;

        let features = MotionFeatures {
            jerk: 0.0,
            svm: 1.0,
            angular_velocity: 0.0,
        };
        let posture = PostureReading {
            pitch: 50.0,
            pitch_deviation: 50.0,
            changed: true,
            ..Default::default()
        };

        let verdict = state.evaluate_warning(&features, Some(&posture), 2600, &thresholds);
        assert_eq!(verdict, WarningVerdict::Bowing);

        // Same episode with tumbling is not bowing
        state.counters.gyro_sustained = 1;
        let verdict = state.evaluate_warning(&features, Some(&posture), 2600, &thresholds);
        assert_ne!(verdict, WarningVerdict::Bowing);
    }

    #[test]
    fn test_warning_times_out_without_evidence() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        state.activity = ActivityState::Warning;
        state.warning_since = Some(1000);

        let features = MotionFeatures {
            jerk: 0.0,
            svm: 1.0,
            angular_velocity: 0.0,
        };
        let verdict = state.evaluate_warning(&features, None, 1900, &thresholds);
        assert!(matches!(verdict, WarningVerdict::TimedOut(s) if s.score == 0));

        let verdict = state.evaluate_warning(&features, None, 1700, &thresholds);
        assert!(matches!(verdict, WarningVerdict::Pending { .. }));
    }

    #[test]
    fn test_criteria_weights() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        let calm = MotionFeatures {
            jerk: 0.0,
            svm: 1.0,
            angular_velocity: 0.0,
        };
        assert_eq!(
            state.score_criteria(&calm, None, &thresholds),
            CriteriaScore::default()
        );

        let spinning = MotionFeatures {
            angular_velocity: 190.0,
            ..calm
        };
        assert_eq!(
            state.score_criteria(&spinning, None, &thresholds),
            CriteriaScore { score: 2, count: 1 }
        );

        state.counters.gyro_sustained = thresholds.gyro_sustained_count;
        state.counters.impact = thresholds.impact_count_threshold;
        let changed = PostureReading {
            changed: true,
            ..Default::default()
        };
        let score = state.score_criteria(&spinning, Some(&changed), &thresholds);
        assert_eq!(score, CriteriaScore { score: 6, count: 3 });
        assert!(score.confirms_fall());

        assert!(CriteriaScore { score: 4, count: 3 }.confirms_fall());
        assert!(!CriteriaScore { score: 5, count: 2 }.confirms_fall());
    }

    #[test]
    fn test_immobile_after_fall_becomes_dangerous_then_recovers() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        fall_sequence(&mut state, &thresholds);

        // Lying still on the side
        let mut t = 1400;
        let mut event = step(&mut state, &sample(70.0, 1.0, 0.0, t), &thresholds);
        assert_eq!(event.state, ActivityState::FallDetected);
        while event.state == ActivityState::FallDetected {
            t += 100;
            event = step(&mut state, &sample(70.0, 1.0, 0.0, t), &thresholds);
        }
        assert_eq!(event.state, ActivityState::Dangerous);
        assert!(event.is_immobile);
        // Sampling starts after the 500 ms confirmation window
        assert_eq!(t, 1200 + 600 + (IMMOBILITY_WINDOW as u32 - 1) * 100);

        for _ in 0..5 {
            t += 100;
            event = step(&mut state, &sample(70.0, 1.0, 0.0, t), &thresholds);
            assert_eq!(event.state, ActivityState::Dangerous);
        }
        assert_eq!(event.immobile_duration_ms, 500);

        // Wearer starts moving
        t += 100;
        let event = step(&mut state, &sample(20.0, 1.3, 90.0, t), &thresholds);
        assert_eq!(event.state, ActivityState::Recovery);
        assert!(!event.is_immobile);
    }

    #[test]
    fn test_moving_after_fall_goes_to_recovery_then_normal() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        fall_sequence(&mut state, &thresholds);

        let mut t = 1400;
        let mut seen_recovery_at = None;
        let mut last = ActivityState::FallDetected;
        while t <= 6400 {
            let g = if (t / 100) % 2 == 0 { 0.8 } else { 1.2 };
            let event = step(&mut state, &sample(10.0, g, 30.0, t), &thresholds);
            if event.state == ActivityState::Recovery && seen_recovery_at.is_none() {
                seen_recovery_at = Some(t);
            }
            if t <= 6200 {
                assert_ne!(event.state, ActivityState::Dangerous);
                assert_ne!(event.state, ActivityState::Normal, "refractory period holds at {t}");
            }
            last = event.state;
            t += 100;
        }

        assert!(seen_recovery_at.is_some());
        assert_eq!(last, ActivityState::Normal);
        assert_eq!(state.immobility.sample_count(), 0);
    }

    #[test]
    fn test_hard_impact_during_recovery_keeps_recovery() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        fall_sequence(&mut state, &thresholds);

        let mut t = 1400;
        while state.activity != ActivityState::Recovery && t < 4000 {
            let g = if (t / 100) % 2 == 0 { 0.8 } else { 1.2 };
            step(&mut state, &sample(10.0, g, 30.0, t), &thresholds);
            t += 100;
        }
        assert_eq!(state.activity, ActivityState::Recovery);

        let event = step(&mut state, &sample(10.0, 2.5, 30.0, t), &thresholds);
        assert_eq!(event.state, ActivityState::Recovery);
        assert!(!event.confirmed);
        assert!(state.warning_since.is_none());
        assert_eq!(state.last_fall_at, Some(1200));
    }

    #[test]
    fn test_uncalibrated_events_have_no_posture() {
        let thresholds = ThresholdProfile::default();
        let mut state = DetectorState::new();
        let event = step(&mut state, &sample(30.0, 1.0, 0.0, 0), &thresholds);
        assert!(event.pitch.is_none());
        assert!(event.roll.is_none());
        assert_eq!(event.state, ActivityState::Normal);
    }

    #[test]
    fn test_reset_keeps_calibration() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        fall_sequence(&mut state, &thresholds);
        assert_eq!(state.activity, ActivityState::FallDetected);

        state.reset();
        assert_eq!(state.activity, ActivityState::Normal);
        assert!(state.last_fall_at.is_none());
        assert_eq!(state.counters, EvidenceCounters::default());
        assert!(state.posture.is_calibrated());
    }

    #[test]
    fn test_tolerates_timer_wraparound() {
        let thresholds = ThresholdProfile::default();
        let mut state = calibrated_state();
        let start = u32::MAX - 2000;
        let mut t = start;
        for _ in 0..80 {
            let event = step(&mut state, &sample(0.0, 1.0, 0.0, t), &thresholds);
            assert_eq!(event.state, ActivityState::Normal);
            assert!(event.jerk.is_finite());
            t = t.wrapping_add(50);
        }
    }

    fn arb_sample() -> impl Strategy<Value = (f32, f32, f32, f32, u32)> {
        (
            -40.0f32..40.0,
            -40.0f32..40.0,
            -40.0f32..40.0,
            0.0f32..400.0,
            0u32..300,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_state_machine_invariants(
            ticks in prop::collection::vec(arb_sample(), 1..300),
        ) {
            let thresholds = ThresholdProfile::default();
            let mut state = calibrated_state();
            let mut t = 0u32;
            let mut prev = ActivityState::Normal;

            for (ax, ay, az, gyro, dt) in ticks {
                t = t.wrapping_add(dt);
                let s = MotionSample::new(Vec3::new(ax, ay, az), Vec3::new(0.0, gyro, 0.0), t);
                let event = step(&mut state, &s, &thresholds);

                prop_assert!(state.immobility.sample_count() <= IMMOBILITY_WINDOW);
                if event.state == ActivityState::Dangerous {
                    prop_assert!(matches!(prev, ActivityState::FallDetected | ActivityState::Dangerous));
                }
                if event.confirmed {
                    prop_assert_eq!(event.state, ActivityState::FallDetected);
                    prop_assert!(matches!(prev, ActivityState::Normal | ActivityState::Warning));
                    prop_assert!(event.evidence.is_some());
                }
                if event.state == ActivityState::Warning {
                    prop_assert!(state.warning_since.is_some());
                }
                prev = event.state;
            }
        }
    }
}
