//! Error types for Fallwatch
//!
//! The detection engine itself is total; these errors only surface at the
//! edges: strict sample ingestion, calibration, profile parsing and wire decoding.

use thiserror::Error;

/// Errors that can occur around the detection engine
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Non-finite motion sample: {0}")]
    NonFiniteSample(String),

    #[error("Calibration needs at least {required} samples, got {provided}")]
    InsufficientCalibration { required: usize, provided: usize },

    #[error("Unknown sensitivity profile: {0}")]
    UnknownProfile(String),

    #[error("Buffer too short: need {needed} bytes, got {actual}")]
    BufferTooShort { needed: usize, actual: usize },

    #[error("Unknown packet type: 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("Invalid activity state: {0}")]
    InvalidActivityState(u8),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}
