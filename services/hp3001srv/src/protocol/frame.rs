//! HP3001 frame codec
//!
//! Builds the snapshot request and turns a raw response into typed
//! per-channel readings. Validation runs before any payload byte is
//! interpreted: exact length, then header, then trailer.

use tracing::debug;

use super::constants::{
    CHANNEL_COUNT, FRAME_HEADER, FRAME_TRAILER_0, FRAME_TRAILER_1, PAYLOAD_LEN, PAYLOAD_OFFSET,
    REQUEST_FRAME, RESPONSE_LEN, TRAILER_OFFSET,
};
use crate::error::{BridgeError, Result};

/// One probe's measurement pair
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    /// Degrees Celsius, one decimal place of resolution
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: i8,
}

impl Reading {
    /// Build a reading from the raw wire values
    #[inline]
    pub fn from_raw(decidegrees: i16, humidity: i8) -> Self {
        Self {
            temperature: f64::from(decidegrees) / 10.0,
            humidity,
        }
    }

    /// Temperature as published, always with its fractional digit ("20.0")
    pub fn temperature_text(&self) -> String {
        format!("{:.1}", self.temperature)
    }

    /// Humidity as published ("45")
    pub fn humidity_text(&self) -> String {
        self.humidity.to_string()
    }
}

/// All eight readings of one successful poll, indexed by channel (0-7)
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    readings: [Reading; CHANNEL_COUNT],
}

impl PollResult {
    pub fn new(readings: [Reading; CHANNEL_COUNT]) -> Self {
        Self { readings }
    }

    /// Reading for a zero-based channel
    pub fn channel(&self, index: usize) -> Option<&Reading> {
        self.readings.get(index)
    }

    /// Readings in channel order
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    pub fn readings(&self) -> &[Reading; CHANNEL_COUNT] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Bounds-checked big-endian reader over a fixed payload
struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes: [u8; N] = self.buf.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }

    #[inline]
    fn read_i16_be(&mut self) -> Option<i16> {
        self.take::<2>().map(i16::from_be_bytes)
    }

    #[inline]
    fn read_i8(&mut self) -> Option<i8> {
        self.take::<1>().map(i8::from_be_bytes)
    }
}

/// The snapshot request; identical on every call
#[inline]
pub fn encode_request() -> [u8; 4] {
    REQUEST_FRAME
}

/// Validate and decode one response frame
pub fn decode_response(data: &[u8]) -> Result<PollResult> {
    if data.len() != RESPONSE_LEN {
        return Err(BridgeError::FrameLength {
            expected: RESPONSE_LEN,
            actual: data.len(),
        });
    }

    if data[0] != FRAME_HEADER {
        return Err(BridgeError::FrameHeader(data[0]));
    }

    let (t0, t1) = (data[TRAILER_OFFSET], data[TRAILER_OFFSET + 1]);
    if t0 != FRAME_TRAILER_0 || t1 != FRAME_TRAILER_1 {
        return Err(BridgeError::FrameTrailer(t0, t1));
    }

    let payload = &data[PAYLOAD_OFFSET..PAYLOAD_OFFSET + PAYLOAD_LEN];
    let mut reader = FrameReader::new(payload);
    let mut readings = [Reading::default(); CHANNEL_COUNT];

    for reading in readings.iter_mut() {
        // Length was checked above, a short payload cannot happen here
        let (Some(decidegrees), Some(humidity)) = (reader.read_i16_be(), reader.read_i8()) else {
            return Err(BridgeError::FrameLength {
                expected: RESPONSE_LEN,
                actual: data.len(),
            });
        };
        *reading = Reading::from_raw(decidegrees, humidity);
    }

    debug!("Decoded response frame: {:02X?}", data);
    Ok(PollResult::new(readings))
}

/// Build a well-formed response frame from raw channel values
///
/// Tests use it to script device answers for the mock transport.
pub fn build_response(channels: &[(i16, i8); CHANNEL_COUNT]) -> [u8; RESPONSE_LEN] {
    let mut frame = [0u8; RESPONSE_LEN];
    frame[0] = FRAME_HEADER;
    for (i, (decidegrees, humidity)) in channels.iter().enumerate() {
        let offset = PAYLOAD_OFFSET + i * 3;
        frame[offset..offset + 2].copy_from_slice(&decidegrees.to_be_bytes());
        frame[offset + 2] = humidity.to_be_bytes()[0];
    }
    frame[TRAILER_OFFSET] = FRAME_TRAILER_0;
    frame[TRAILER_OFFSET + 1] = FRAME_TRAILER_1;
    frame
}
