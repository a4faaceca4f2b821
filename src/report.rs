//! Session reports
//!
//! This module summarizes a run of fall events into a JSON report with
//! producer metadata, state transitions and one entry per fall episode.

use crate::error::DetectorError;
use crate::profile::SensitivityProfile;
use crate::types::{ActivityState, FallEvent, FallEvidence};
use crate::{FALLWATCH_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current session report schema version
pub const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub at_ms: u32,
    pub from: ActivityState,
    pub to: ActivityState,
}

/// One confirmed fall and what followed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallEpisode {
    pub confirmed_at_ms: u32,
    pub evidence: Option<FallEvidence>,
    pub reached_dangerous: bool,
    /// Longest continuous immobility seen during the episode
    pub max_immobile_duration_ms: u32,
    /// When the wearer was back to Normal, if that happened
    pub resolved_at_ms: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub report_version: String,
    pub producer: Producer,
    pub generated_at_utc: String,
    pub profile: SensitivityProfile,
    pub calibrated: bool,
    pub samples_processed: u64,
    pub first_timestamp_ms: Option<u32>,
    pub last_timestamp_ms: Option<u32>,
    pub falls_confirmed: usize,
    pub dangerous_episodes: usize,
    pub final_state: ActivityState,
    pub transitions: Vec<StateTransition>,
    pub episodes: Vec<FallEpisode>,
}

/// Accumulates events into a [`SessionReport`]
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    instance_id: String,
    profile: SensitivityProfile,
    calibrated: bool,
    samples: u64,
    first_timestamp_ms: Option<u32>,
    last_timestamp_ms: Option<u32>,
    state: ActivityState,
    transitions: Vec<StateTransition>,
    episodes: Vec<FallEpisode>,
}

impl SessionRecorder {
    /// Create a recorder with a unique instance ID
    pub fn new(profile: SensitivityProfile) -> Self {
        Self::with_instance_id(profile, Uuid::new_v4().to_string())
    }

    pub fn with_instance_id(profile: SensitivityProfile, instance_id: String) -> Self {
        Self {
            instance_id,
            profile,
            calibrated: false,
            samples: 0,
            first_timestamp_ms: None,
            last_timestamp_ms: None,
            state: ActivityState::Normal,
            transitions: Vec::new(),
            episodes: Vec::new(),
        }
    }

    pub fn set_calibrated(&mut self, calibrated: bool) {
        self.calibrated = calibrated;
    }

    /// Record one event; returns the transition it caused, if any
    pub fn record(&mut self, event: &FallEvent) -> Option<StateTransition> {
        self.samples += 1;
        self.first_timestamp_ms.get_or_insert(event.timestamp_ms);
        self.last_timestamp_ms = Some(event.timestamp_ms);

        if event.confirmed {
            self.episodes.push(FallEpisode {
                confirmed_at_ms: event.timestamp_ms,
                evidence: event.evidence,
                reached_dangerous: false,
                max_immobile_duration_ms: 0,
                resolved_at_ms: None,
            });
        }

        if let Some(episode) = self
            .episodes
            .last_mut()
            .filter(|e| e.resolved_at_ms.is_none())
        {
            if event.state == ActivityState::Dangerous {
                episode.reached_dangerous = true;
            }
            episode.max_immobile_duration_ms = episode
                .max_immobile_duration_ms
                .max(event.immobile_duration_ms);
            if event.state == ActivityState::Normal {
                episode.resolved_at_ms = Some(event.timestamp_ms);
            }
        }

        if event.state == self.state {
            return None;
        }
        let transition = StateTransition {
            at_ms: event.timestamp_ms,
            from: self.state,
            to: event.state,
        };
        self.state = event.state;
        self.transitions.push(transition);
        Some(transition)
    }

    pub fn finish(&self) -> SessionReport {
        SessionReport {
            report_version: REPORT_VERSION.to_string(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: FALLWATCH_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            generated_at_utc: Utc::now().to_rfc3339(),
            profile: self.profile,
            calibrated: self.calibrated,
            samples_processed: self.samples,
            first_timestamp_ms: self.first_timestamp_ms,
            last_timestamp_ms: self.last_timestamp_ms,
            falls_confirmed: self.episodes.len(),
            dangerous_episodes: self.episodes.iter().filter(|e| e.reached_dangerous).count(),
            final_state: self.state,
            transitions: self.transitions.clone(),
            episodes: self.episodes.clone(),
        }
    }

    /// Encode the report to a JSON string
    pub fn finish_to_json(&self) -> Result<String, DetectorError> {
        serde_json::to_string_pretty(&self.finish()).map_err(DetectorError::JsonError)
    }
}
