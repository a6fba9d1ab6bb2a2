//! Error handling for the HP3001 bridge service
//!
//! A single error enum covers the device protocol, the transport, the
//! broker side and configuration. The scheduler decides per variant whether
//! an error ends the service or only the current cycle.

use std::time::Duration;
use thiserror::Error;

/// Bridge service error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Response frame has the wrong size
    #[error("Frame length error: expected {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    /// Response frame does not start with the header sentinel
    #[error("Frame header error: expected 0x7B, got 0x{0:02X}")]
    FrameHeader(u8),

    /// Response frame does not end with the trailer sentinels
    #[error("Frame trailer error: expected 0x40 0x7D, got 0x{0:02X} 0x{1:02X}")]
    FrameTrailer(u8, u8),

    /// Device did not answer within the read deadline
    #[error("Timeout error: no response within {0:?}")]
    Timeout(Duration),

    /// No matching HID device could be opened
    #[error("Device not found: {vendor_id:04x}:{product_id:04x} ({reason})")]
    DeviceNotFound {
        vendor_id: u16,
        product_id: u16,
        reason: String,
    },

    /// Transport level I/O failure on an already opened device
    #[error("Transport error: {0}")]
    Transport(String),

    /// Broker rejected or could not queue a message
    #[error("Publish error on '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    Io(String),
}

/// Result type alias for the bridge service
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        BridgeError::Config(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        BridgeError::Transport(msg.into())
    }

    pub fn publish(topic: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        BridgeError::Publish {
            topic: topic.into(),
            reason: reason.to_string(),
        }
    }

    pub fn device_not_found(vendor_id: u16, product_id: u16, reason: impl Into<String>) -> Self {
        BridgeError::DeviceNotFound {
            vendor_id,
            product_id,
            reason: reason.into(),
        }
    }

    /// Malformed or corrupted response frame
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            Self::FrameLength { .. } | Self::FrameHeader(_) | Self::FrameTrailer(..)
        )
    }

    /// Errors that only cost the current cycle; the loop keeps running.
    pub fn is_cycle_local(&self) -> bool {
        self.is_frame_error()
            || matches!(
                self,
                Self::Timeout(_) | Self::Transport(_) | Self::Publish { .. }
            )
    }

    /// Short machine-readable code used in log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::FrameLength { .. } => "FRAME_LENGTH",
            Self::FrameHeader(_) => "FRAME_HEADER",
            Self::FrameTrailer(..) => "FRAME_TRAILER",
            Self::Timeout(_) => "TIMEOUT",
            Self::DeviceNotFound { .. } => "DEVICE_NOT_FOUND",
            Self::Transport(_) => "TRANSPORT",
            Self::Publish { .. } => "PUBLISH",
            Self::Config(_) => "CONFIG",
            Self::Io(_) => "IO",
        }
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err.to_string())
    }
}

impl From<figment::Error> for BridgeError {
    fn from(err: figment::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for BridgeError {
    fn from(err: tokio::task::JoinError) -> Self {
        BridgeError::Transport(format!("Blocking task failed: {err}"))
    }
}

#[cfg(feature = "usb-hid")]
impl From<hidapi::HidError> for BridgeError {
    fn from(err: hidapi::HidError) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_errors_are_cycle_local() {
        let errors = [
            BridgeError::FrameLength {
                expected: 27,
                actual: 64,
            },
            BridgeError::FrameHeader(0x00),
            BridgeError::FrameTrailer(0x40, 0x00),
            BridgeError::Timeout(Duration::from_millis(500)),
        ];

        for err in errors {
            assert!(err.is_cycle_local(), "{err} should be cycle local");
        }
        assert!(BridgeError::publish("1/temperature", "queue full").is_cycle_local());
    }

    #[test]
    fn test_startup_errors_are_fatal() {
        assert!(!BridgeError::device_not_found(0x0483, 0x5750, "no such device").is_cycle_local());
        assert!(!BridgeError::config("bad period").is_cycle_local());
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::FrameTrailer(0x41, 0x7d);
        assert_eq!(
            err.to_string(),
            "Frame trailer error: expected 0x40 0x7D, got 0x41 0x7D"
        );

        let err = BridgeError::device_not_found(0x0483, 0x5750, "unplugged");
        assert!(err.to_string().contains("0483:5750"));
        assert_eq!(err.error_code(), "DEVICE_NOT_FOUND");
    }
}
