//! FFI bindings for Fallwatch
//!
//! This module provides C-compatible functions for driving the detector from
//! firmware or other languages. Detectors are opaque handles; per-tick results
//! are written into a caller-owned [`FallwatchEvent`]. Functions returning
//! `i32` use 0 for success and -1 for failure. Strings returned by this module
//! must be freed with `fallwatch_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::error::DetectorError;
use crate::pipeline::FallDetector;
use crate::posture::Calibration;
use crate::profile::SensitivityProfile;
use crate::types::{ActivityState, FallEvent, FallEvidence, MotionSample, Vec3};
use crate::wire::{AlertFlags, FallRecord, StatusRecord, Vitals};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// C view of a [`FallEvent`]
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FallwatchEvent {
    /// 0=Normal, 1=Warning, 2=FallDetected, 3=Dangerous, 4=Recovery
    pub state: u8,
    pub confirmed: u8,
    pub is_immobile: u8,
    /// 1 when pitch and roll are meaningful
    pub has_posture: u8,
    pub timestamp_ms: u32,
    pub jerk: f32,
    pub svm: f32,
    pub angular_velocity: f32,
    pub pitch: f32,
    pub roll: f32,
    pub accel_x: f32,
    pub accel_y: f32,
    pub accel_z: f32,
    pub movement_variance: f32,
    pub movement_stddev: f32,
    pub immobile_duration_ms: u32,
    pub score: u8,
    pub criteria_count: u8,
    pub impact_counter: u8,
    pub warning_counter: u8,
}

impl From<&FallEvent> for FallwatchEvent {
    fn from(event: &FallEvent) -> Self {
        let evidence = event.evidence.unwrap_or(FallEvidence {
            score: 0,
            criteria_count: 0,
            impact_counter: 0,
            warning_counter: 0,
        });
        Self {
            state: event.state.as_u8(),
            confirmed: event.confirmed as u8,
            is_immobile: event.is_immobile as u8,
            has_posture: event.pitch.is_some() as u8,
            timestamp_ms: event.timestamp_ms,
            jerk: event.jerk,
            svm: event.svm,
            angular_velocity: event.angular_velocity,
            pitch: event.pitch.unwrap_or(0.0),
            roll: event.roll.unwrap_or(0.0),
            accel_x: event.acceleration.x,
            accel_y: event.acceleration.y,
            accel_z: event.acceleration.z,
            movement_variance: event.movement_variance,
            movement_stddev: event.movement_stddev,
            immobile_duration_ms: event.immobile_duration_ms,
            score: evidence.score,
            criteria_count: evidence.criteria_count,
            impact_counter: evidence.impact_counter,
            warning_counter: evidence.warning_counter,
        }
    }
}

impl TryFrom<&FallwatchEvent> for FallEvent {
    type Error = DetectorError;

    fn try_from(c: &FallwatchEvent) -> Result<Self, Self::Error> {
        let confirmed = c.confirmed != 0;
        let has_posture = c.has_posture != 0;
        Ok(FallEvent {
            state: ActivityState::try_from(c.state)?,
            timestamp_ms: c.timestamp_ms,
            jerk: c.jerk,
            svm: c.svm,
            angular_velocity: c.angular_velocity,
            pitch: has_posture.then_some(c.pitch),
            roll: has_posture.then_some(c.roll),
            acceleration: Vec3::new(c.accel_x, c.accel_y, c.accel_z),
            confirmed,
            evidence: confirmed.then_some(FallEvidence {
                score: c.score,
                criteria_count: c.criteria_count,
                impact_counter: c.impact_counter,
                warning_counter: c.warning_counter,
            }),
            movement_variance: c.movement_variance,
            movement_stddev: c.movement_stddev,
            is_immobile: c.is_immobile != 0,
            immobile_duration_ms: c.immobile_duration_ms,
        })
    }
}

// ============================================================================
// Detector API
// ============================================================================

/// Opaque handle to a FallDetector
pub struct FallwatchDetectorHandle {
    detector: FallDetector,
}

/// Create a new detector for the given profile (0=Conservative, 1=Balanced, 2=Sensitive).
///
/// # Safety
/// - Returns a pointer to a newly allocated detector.
/// - Must be freed with `fallwatch_detector_free`.
/// - Returns NULL for an unknown profile; call `fallwatch_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn fallwatch_detector_new(profile: u8) -> *mut FallwatchDetectorHandle {
    clear_last_error();

    match SensitivityProfile::try_from(profile) {
        Ok(profile) => {
            let handle = Box::new(FallwatchDetectorHandle {
                detector: FallDetector::new(profile),
            });
            Box::into_raw(handle)
        }
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a detector.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `fallwatch_detector_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fallwatch_detector_free(detector: *mut FallwatchDetectorHandle) {
    if !detector.is_null() {
        drop(Box::from_raw(detector));
    }
}

/// Set the posture baseline in degrees.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `fallwatch_detector_new`.
#[no_mangle]
pub unsafe extern "C" fn fallwatch_detector_calibrate(
    detector: *mut FallwatchDetectorHandle,
    baseline_pitch: f32,
    baseline_roll: f32,
) -> i32 {
    clear_last_error();

    if detector.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }
    if !baseline_pitch.is_finite() || !baseline_roll.is_finite() {
        set_last_error("Calibration angles must be finite");
        return -1;
    }

    let handle = &mut *detector;
    handle
        .detector
        .calibrate(Calibration::new(baseline_pitch, baseline_roll));
    0
}

/// Switch sensitivity profile without touching detector state.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `fallwatch_detector_new`.
#[no_mangle]
pub unsafe extern "C" fn fallwatch_detector_set_profile(
    detector: *mut FallwatchDetectorHandle,
    profile: u8,
) -> i32 {
    clear_last_error();

    if detector.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }

    match SensitivityProfile::try_from(profile) {
        Ok(profile) => {
            (*detector).detector.set_profile(profile);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Process one motion sample and write the resulting event into `out`.
///
/// Acceleration is in m/s², angular rate in °/s.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `fallwatch_detector_new`.
/// - `out` must point to writable memory for one `FallwatchEvent`.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn fallwatch_detector_process(
    detector: *mut FallwatchDetectorHandle,
    ax: f32,
    ay: f32,
    az: f32,
    gx: f32,
    gy: f32,
    gz: f32,
    timestamp_ms: u32,
    out: *mut FallwatchEvent,
) -> i32 {
    clear_last_error();

    if detector.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }
    if out.is_null() {
        set_last_error("Null event pointer");
        return -1;
    }

    let handle = &mut *detector;
    let sample = MotionSample::new(Vec3::new(ax, ay, az), Vec3::new(gx, gy, gz), timestamp_ms);
    let event = handle.detector.process(&sample);
    *out = FallwatchEvent::from(&event);
    0
}

/// Clear all episode state, keeping calibration and profile.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `fallwatch_detector_new`.
#[no_mangle]
pub unsafe extern "C" fn fallwatch_detector_reset(detector: *mut FallwatchDetectorHandle) -> i32 {
    clear_last_error();

    if detector.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }
    (*detector).detector.reset();
    0
}

/// Save detector state to JSON.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `fallwatch_detector_new`.
/// - Returns a newly allocated string that must be freed with `fallwatch_free_string`.
/// - Returns NULL on error; call `fallwatch_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fallwatch_detector_save_state(
    detector: *mut FallwatchDetectorHandle,
) -> *mut c_char {
    clear_last_error();

    if detector.is_null() {
        set_last_error("Null detector pointer");
        return ptr::null_mut();
    }

    let handle = &*detector;

    match handle.detector.save_state() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Load detector state from JSON.
///
/// # Safety
/// - `detector` must be a valid pointer returned by `fallwatch_detector_new`.
/// - `json` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn fallwatch_detector_load_state(
    detector: *mut FallwatchDetectorHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if detector.is_null() {
        set_last_error("Null detector pointer");
        return -1;
    }

    let handle = &mut *detector;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match handle.detector.load_state(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Wire records
// ============================================================================

/// Encode the 45-byte fall record for a confirmed event.
///
/// # Safety
/// - `event` must point to a valid `FallwatchEvent`.
/// - `out` must point to at least `out_len` writable bytes.
/// - Returns the number of bytes written, or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn fallwatch_encode_fall_record(
    event: *const FallwatchEvent,
    heart_rate_bpm: i32,
    body_temp_c: f32,
    out: *mut u8,
    out_len: usize,
) -> i32 {
    clear_last_error();

    if event.is_null() || out.is_null() {
        set_last_error("Null pointer");
        return -1;
    }

    let event = match FallEvent::try_from(&*event) {
        Ok(event) => event,
        Err(e) => {
            set_last_error(&e.to_string());
            return -1;
        }
    };
    let vitals = Vitals {
        heart_rate_bpm,
        body_temp_c,
        ..Default::default()
    };
    let buf = std::slice::from_raw_parts_mut(out, out_len);

    match FallRecord::from_event(&event, &vitals).write_to(buf) {
        Ok(written) => written as i32,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Encode the 10-byte status record.
///
/// The fall bit of `alert_bits` is derived from `state`; the other bits are
/// passed through.
///
/// # Safety
/// - `out` must point to at least `out_len` writable bytes.
/// - Returns the number of bytes written, or -1 on error.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn fallwatch_encode_status_record(
    state: u8,
    heart_rate_bpm: i32,
    body_temp_c: f32,
    ambient_temp_c: f32,
    noise_db: f32,
    alert_bits: u8,
    out: *mut u8,
    out_len: usize,
) -> i32 {
    clear_last_error();

    if out.is_null() {
        set_last_error("Null output pointer");
        return -1;
    }

    let state = match ActivityState::try_from(state) {
        Ok(state) => state,
        Err(e) => {
            set_last_error(&e.to_string());
            return -1;
        }
    };
    let vitals = Vitals {
        heart_rate_bpm,
        body_temp_c,
        ambient_temp_c,
        noise_db,
    };
    let record = StatusRecord::new(state, &vitals, AlertFlags::from_bits(alert_bits));
    let buf = std::slice::from_raw_parts_mut(out, out_len);

    match record.write_to(buf) {
        Ok(written) => written as i32,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Fallwatch functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Fallwatch function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fallwatch_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Fallwatch function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn fallwatch_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the Fallwatch library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn fallwatch_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
