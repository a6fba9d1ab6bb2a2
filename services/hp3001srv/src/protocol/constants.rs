//! HP3001 wire protocol constants
//!
//! The device speaks a tiny request/response protocol over two interrupt
//! endpoints. One request asks for the current snapshot of all probes and the
//! device answers with a single fixed-layout frame.

// ============================================================================
// USB identity
// ============================================================================

/// USB vendor id of the HP3001 receiver
pub const VENDOR_ID: u16 = 0x0483;

/// USB product id of the HP3001 receiver
pub const PRODUCT_ID: u16 = 0x5750;

/// Interrupt OUT endpoint (implicit when going through a HID API)
pub const ENDPOINT_OUT: u8 = 0x01;

/// Interrupt IN endpoint (implicit when going through a HID API)
pub const ENDPOINT_IN: u8 = 0x82;

// ============================================================================
// Frame markers
// ============================================================================

/// First byte of every frame
pub const FRAME_HEADER: u8 = 0x7b;

/// Command byte, followed by the end marker pair
pub const FRAME_COMMAND: u8 = 0x03;

/// Second to last byte of every frame
pub const FRAME_TRAILER_0: u8 = 0x40;

/// Last byte of every frame
pub const FRAME_TRAILER_1: u8 = 0x7d;

/// Snapshot request: header, command, trailer
pub const REQUEST_FRAME: [u8; 4] = [FRAME_HEADER, FRAME_COMMAND, FRAME_TRAILER_0, FRAME_TRAILER_1];

// ============================================================================
// Response layout
// ============================================================================

/// Number of probes reported in one response
pub const CHANNEL_COUNT: usize = 8;

/// Bytes per channel: i16 big-endian decidegrees + i8 percent
pub const CHANNEL_RECORD_LEN: usize = 3;

/// Payload between header and trailer
/// = 8 channels × 3 bytes = 24 bytes
pub const PAYLOAD_LEN: usize = CHANNEL_COUNT * CHANNEL_RECORD_LEN;

/// Full response length
/// = 1 (header) + 24 (payload) + 2 (trailer) = 27 bytes
pub const RESPONSE_LEN: usize = 1 + PAYLOAD_LEN + 2;

/// Offset of the first payload byte
pub const PAYLOAD_OFFSET: usize = 1;

/// Offset of the first trailer byte (0x19)
pub const TRAILER_OFFSET: usize = PAYLOAD_OFFSET + PAYLOAD_LEN;

/// The device may hand back up to 64 bytes; everything past the
/// response length is noise.
pub const MAX_REPORT_LEN: usize = 64;

/// Read deadline used by the scheduler for each poll
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 500;
