//! Fallwatch - Streaming fall and consciousness detection for wearables
//!
//! Fallwatch classifies 6-axis motion samples into an activity state through a
//! deterministic per-tick pipeline: feature extraction → sequence tracking →
//! posture evaluation → weighted fall classification → post-fall immobility
//! monitoring.
//!
//! ## Modules
//!
//! - **Detection**: [`FallDetector`] and the [`classifier`] state machine
//! - **Wire**: fixed-layout radio records for the gateway
//! - **Reports**: JSON session summaries with producer provenance

pub mod classifier;
pub mod error;
pub mod features;
pub mod immobility;
pub mod pipeline;
pub mod posture;
pub mod profile;
pub mod report;
pub mod ring;
pub mod sequence;
pub mod types;
pub mod wire;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use classifier::DetectorState;
pub use error::DetectorError;
pub use pipeline::{detect_falls_ndjson, FallDetector};
pub use posture::{Calibration, Calibrator};
pub use profile::{SensitivityProfile, ThresholdProfile};
pub use report::{SessionRecorder, SessionReport};
pub use types::{ActivityState, FallEvent, FallEvidence, MotionSample, Vec3};
pub use wire::{decode_packet, AlertFlags, FallRecord, Packet, StatusRecord, Vitals};

/// Fallwatch version embedded in session reports
pub const FALLWATCH_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for session reports
pub const PRODUCER_NAME: &str = "fallwatch";
