//! CSI frame records used throughout the library.

use chrono::{DateTime, Local, NaiveDateTime};

use crate::errors::IngestError;

/// Receipt time of a frame, wall-clock local to the deployment.
pub type ReceiptTime = NaiveDateTime;

/// Storage and display format for receipt times.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/**
 * Radio metadata reported by the station alongside each CSI buffer
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioMetadata {
    pub rssi: i32,
    pub rate: i32,
    pub noise_floor: i32,
    pub fft_gain: i32,
    pub agc_gain: i32,
    pub channel: i32,
    /// Station-side timestamp (microseconds since station boot)
    pub device_timestamp: i64,
    pub sig_len: i32,
    pub rx_state: i32,
    pub first_word_invalid: i32,
}

/**
 * A single CSI reading from one station at one instant
 */
#[derive(Debug, Clone, PartialEq)]
pub struct CsiFrame {
    pub received_at: ReceiptTime,
    /// MAC address of the reporting station
    pub station: String,
    pub radio: RadioMetadata,
    /// Interleaved in-phase/quadrature samples
    pub samples: Vec<i32>,
}

impl CsiFrame {
    /// Creates a frame without radio metadata.
    pub fn new(received_at: ReceiptTime, station: impl Into<String>, samples: Vec<i32>) -> Self {
        Self {
            received_at,
            station: station.into(),
            radio: RadioMetadata::default(),
            samples,
        }
    }
}

/// Current local wall-clock time as a receipt time.
pub fn now() -> ReceiptTime {
    Local::now().naive_local()
}

pub fn format_timestamp(ts: &ReceiptTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored or transmitted receipt time.
///
/// Accepts `YYYY-MM-DD HH:MM:SS[.f]`, the same with a `T` separator, and
/// RFC 3339 with an offset, which is converted to local time.
pub fn parse_timestamp(raw: &str) -> Result<ReceiptTime, IngestError> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Local).naive_local())
        .map_err(|_| IngestError::InvalidTimestamp(raw.to_string()))
}
