//! Radio wire records
//!
//! Two fixed-layout little-endian records travel from the wearable to the
//! gateway. The layouts are shared with deployed gateways and must not change.
//!
//! | Type | Name | Size | Sent |
//! |------|------|------|------|
//! | 0x01 | [`StatusRecord`] | 10 bytes | Periodically |
//! | 0x03 | [`FallRecord`] | 45 bytes | On fall confirmation |
//!
//! # Fall record (0x03)
//!
//! ```text
//! [0]      type
//! [1-4]    timestamp ms (u32)
//! [5-24]   jerk, svm, angular velocity, pitch, roll (f32 × 5)
//! [25]     impact counter
//! [26]     warning counter
//! [27]     heart rate
//! [28]     body temperature
//! [29-40]  accel x, y, z (f32 × 3)
//! [41-44]  movement variance (f32)
//! ```
//!
//! # Status record (0x01)
//!
//! ```text
//! [0] type  [1] heart rate  [2] body temp  [3] ambient temp  [4] noise dB
//! [5] activity state  [6] alert flags  [7-9] RSSI/SNR, filled by the radio
//! ```

use crate::error::DetectorError;
use crate::types::{ActivityState, FallEvent, Vec3};
use serde::{Deserialize, Serialize};

/// Record type discriminants
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketType {
    Status = 0x01,
    Fall = 0x03,
}

impl TryFrom<u8> for PacketType {
    type Error = DetectorError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(PacketType::Status),
            0x03 => Ok(PacketType::Fall),
            other => Err(DetectorError::UnknownPacketType(other)),
        }
    }
}

const TEMP_MIN_C: f32 = -20.0;
const TEMP_SPAN_C: f32 = 100.0;

/// Map −20…80 °C linearly onto 0…255
pub fn encode_temperature(celsius: f32) -> u8 {
    ((celsius - TEMP_MIN_C) / TEMP_SPAN_C * 255.0).clamp(0.0, 255.0) as u8
}

pub fn decode_temperature(byte: u8) -> f32 {
    byte as f32 / 255.0 * TEMP_SPAN_C + TEMP_MIN_C
}

fn clamp_byte(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

/// Vital signs carried alongside motion data
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vitals {
    pub heart_rate_bpm: i32,
    pub body_temp_c: f32,
    pub ambient_temp_c: f32,
    pub noise_db: f32,
}

/// Alert bits of the status record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertFlags {
    pub heart_rate: bool,
    pub temperature: bool,
    pub fall: bool,
    pub noise: bool,
}

impl AlertFlags {
    pub const HEART_RATE: u8 = 0x01;
    pub const TEMPERATURE: u8 = 0x02;
    pub const FALL: u8 = 0x04;
    pub const NOISE: u8 = 0x08;

    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.heart_rate {
            bits |= Self::HEART_RATE;
        }
        if self.temperature {
            bits |= Self::TEMPERATURE;
        }
        if self.fall {
            bits |= Self::FALL;
        }
        if self.noise {
            bits |= Self::NOISE;
        }
        bits
    }

    /// Unknown high bits are ignored
    pub fn from_bits(bits: u8) -> Self {
        Self {
            heart_rate: bits & Self::HEART_RATE != 0,
            temperature: bits & Self::TEMPERATURE != 0,
            fall: bits & Self::FALL != 0,
            noise: bits & Self::NOISE != 0,
        }
    }
}

fn check_len(buf: &[u8], needed: usize) -> Result<(), DetectorError> {
    if buf.len() < needed {
        return Err(DetectorError::BufferTooShort {
            needed,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn check_type(buf: &[u8], expected: PacketType) -> Result<(), DetectorError> {
    let found = PacketType::try_from(buf[0])?;
    if found != expected {
        return Err(DetectorError::UnknownPacketType(buf[0]));
    }
    Ok(())
}

#[inline]
fn read_f32(buf: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline]
fn write_f32(buf: &mut [u8], at: usize, value: f32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Fall record (0x03), 45 bytes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallRecord {
    pub timestamp_ms: u32,
    pub jerk: f32,
    pub svm: f32,
    pub angular_velocity: f32,
    pub pitch: f32,
    pub roll: f32,
    pub impact_counter: u8,
    pub warning_counter: u8,
    pub heart_rate: u8,
    pub body_temp: u8,
    pub acceleration: Vec3,
    pub movement_variance: f32,
}

impl FallRecord {
    pub const SIZE: usize = 45;

    /// Build the record for a confirmed fall event. Pitch and roll are zero
    /// when the detector was never calibrated.
    pub fn from_event(event: &FallEvent, vitals: &Vitals) -> Self {
        let (impact_counter, warning_counter) = event
            .evidence
            .map(|e| (e.impact_counter, e.warning_counter))
            .unwrap_or((0, 0));
        Self {
            timestamp_ms: event.timestamp_ms,
            jerk: event.jerk,
            svm: event.svm,
            angular_velocity: event.angular_velocity,
            pitch: event.pitch.unwrap_or(0.0),
            roll: event.roll.unwrap_or(0.0),
            impact_counter,
            warning_counter,
            heart_rate: clamp_byte(vitals.heart_rate_bpm as f32),
            body_temp: encode_temperature(vitals.body_temp_c),
            acceleration: event.acceleration,
            movement_variance: event.movement_variance,
        }
    }

    pub fn body_temp_c(&self) -> f32 {
        decode_temperature(self.body_temp)
    }

    /// Write into `buf`; returns bytes written
    pub fn write_to(&self, buf: &mut [u8]) -> Result<usize, DetectorError> {
        check_len(buf, Self::SIZE)?;
        buf[0] = PacketType::Fall as u8;
        buf[1..5].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        write_f32(buf, 5, self.jerk);
        write_f32(buf, 9, self.svm);
        write_f32(buf, 13, self.angular_velocity);
        write_f32(buf, 17, self.pitch);
        write_f32(buf, 21, self.roll);
        buf[25] = self.impact_counter;
        buf[26] = self.warning_counter;
        buf[27] = self.heart_rate;
        buf[28] = self.body_temp;
        write_f32(buf, 29, self.acceleration.x);
        write_f32(buf, 33, self.acceleration.y);
        write_f32(buf, 37, self.acceleration.z);
        write_f32(buf, 41, self.movement_variance);
        Ok(Self::SIZE)
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        // The array is exactly SIZE bytes
        let _ = self.write_to(&mut buf);
        buf
    }

    pub fn read_from(buf: &[u8]) -> Result<Self, DetectorError> {
        check_len(buf, Self::SIZE)?;
        check_type(buf, PacketType::Fall)?;
        Ok(Self {
            timestamp_ms: u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]),
            jerk: read_f32(buf, 5),
            svm: read_f32(buf, 9),
            angular_velocity: read_f32(buf, 13),
            pitch: read_f32(buf, 17),
            roll: read_f32(buf, 21),
            impact_counter: buf[25],
            warning_counter: buf[26],
            heart_rate: buf[27],
            body_temp: buf[28],
            acceleration: Vec3::new(read_f32(buf, 29), read_f32(buf, 33), read_f32(buf, 37)),
            movement_variance: read_f32(buf, 41),
        })
    }
}

/// Status record (0x01), 10 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub heart_rate: u8,
    pub body_temp: u8,
    pub ambient_temp: u8,
    pub noise_db: u8,
    pub state: ActivityState,
    pub alerts: AlertFlags,
}

impl StatusRecord {
    pub const SIZE: usize = 10;

    /// Build a status record. The fall alert bit follows the activity state;
    /// the other alert bits come from the caller.
    pub fn new(state: ActivityState, vitals: &Vitals, alerts: AlertFlags) -> Self {
        Self {
            heart_rate: clamp_byte(vitals.heart_rate_bpm as f32),
            body_temp: encode_temperature(vitals.body_temp_c),
            ambient_temp: encode_temperature(vitals.ambient_temp_c),
            noise_db: clamp_byte(vitals.noise_db),
            state,
            alerts: AlertFlags {
                fall: state.raises_fall_alert(),
                ..alerts
            },
        }
    }

    /// Gateway view: a fall is ongoing from FallDetected onward, Recovery included
    pub fn fall_detected(&self) -> bool {
        self.state.as_u8() >= ActivityState::FallDetected.as_u8()
    }

    pub fn body_temp_c(&self) -> f32 {
        decode_temperature(self.body_temp)
    }

    pub fn ambient_temp_c(&self) -> f32 {
        decode_temperature(self.ambient_temp)
    }

    pub fn write_to(&self, buf: &mut [u8]) -> Result<usize, DetectorError> {
        check_len(buf, Self::SIZE)?;
        buf[0] = PacketType::Status as u8;
        buf[1] = self.heart_rate;
        buf[2] = self.body_temp;
        buf[3] = self.ambient_temp;
        buf[4] = self.noise_db;
        buf[5] = self.state.as_u8();
        buf[6] = self.alerts.bits();
        buf[7..10].fill(0);
        Ok(Self::SIZE)
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let _ = self.write_to(&mut buf);
        buf
    }

    pub fn read_from(buf: &[u8]) -> Result<Self, DetectorError> {
        check_len(buf, Self::SIZE)?;
        check_type(buf, PacketType::Status)?;
        Ok(Self {
            heart_rate: buf[1],
            body_temp: buf[2],
            ambient_temp: buf[3],
            noise_db: buf[4],
            state: ActivityState::try_from(buf[5])?,
            alerts: AlertFlags::from_bits(buf[6]),
        })
    }
}

/// Any record the gateway can receive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Packet {
    Status(StatusRecord),
    Fall(FallRecord),
}

/// Decode a record by its leading type byte
pub fn decode_packet(buf: &[u8]) -> Result<Packet, DetectorError> {
    check_len(buf, 1)?;
    match PacketType::try_from(buf[0])? {
        PacketType::Status => Ok(Packet::Status(StatusRecord::read_from(buf)?)),
        PacketType::Fall => Ok(Packet::Fall(FallRecord::read_from(buf)?)),
    }
}
