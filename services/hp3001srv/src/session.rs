//! Device session
//!
//! Owns the transport handle for the lifetime of the service and exposes one
//! operation, [`DeviceSession::poll`]: one request write, one response read,
//! one decode. Retrying is up to the caller.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::protocol::{decode_response, encode_request, PollResult, RESPONSE_LEN};
use crate::transport::{HidTransport, TransportStats};

/// An opened sensor
#[derive(Debug)]
pub struct DeviceSession<T: HidTransport> {
    transport: T,
}

#[cfg(feature = "usb-hid")]
impl DeviceSession<crate::transport::UsbHidTransport> {
    /// Open the sensor by USB identity
    ///
    /// Fails with [`BridgeError::DeviceNotFound`] when no matching device can
    /// be opened.
    pub fn open(vendor_id: u16, product_id: u16) -> Result<Self> {
        let transport = crate::transport::UsbHidTransport::open(vendor_id, product_id)?;
        Ok(Self::new(transport))
    }
}

impl<T: HidTransport> DeviceSession<T> {
    /// Wrap an already opened transport
    pub fn new(transport: T) -> Self {
        info!("Device session started on {}", transport.name());
        Self { transport }
    }

    /// Request and decode one snapshot of all channels
    pub async fn poll(&mut self, timeout: Duration) -> Result<PollResult> {
        let request = encode_request();
        self.transport.write(&request).await?;
        debug!("Sent snapshot request: {:02X?}", request);

        let mut buffer = [0u8; RESPONSE_LEN];
        let received = self.transport.read_timeout(&mut buffer, timeout).await?;
        if received == 0 {
            return Err(BridgeError::Timeout(timeout));
        }

        decode_response(&buffer[..received])
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// Release the device handle
    pub async fn close(mut self) -> Result<()> {
        let stats = self.transport.stats();
        info!(
            "Closing device session on {} (writes={}, reads={}, timeouts={})",
            self.transport.name(),
            stats.writes,
            stats.reads,
            stats.read_timeouts
        );
        if let Err(e) = self.transport.close().await {
            warn!("Error closing transport: {}", e);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_response, REQUEST_FRAME};
    use crate::transport::{MockReply, MockTransport};

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn frame_with_channel0(decidegrees: i16, humidity: i8) -> Vec<u8> {
        let mut channels = [(0i16, 0i8); 8];
        channels[0] = (decidegrees, humidity);
        build_response(&channels).to_vec()
    }

    #[tokio::test]
    async fn test_poll_writes_request_and_decodes() {
        let mock = MockTransport::new();
        mock.push_frame(frame_with_channel0(213, 45));
        let mut session = DeviceSession::new(mock.clone());

        let result = session.poll(TIMEOUT).await.unwrap();
        assert_eq!(result.channel(0).unwrap().temperature, 21.3);
        assert_eq!(result.channel(0).unwrap().humidity, 45);

        // Exactly one write per poll
        assert_eq!(mock.sent_data(), vec![REQUEST_FRAME.to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout() {
        let mock = MockTransport::new();
        mock.push_reply(MockReply::Silence);
        let mut session = DeviceSession::new(mock.clone());

        let err = session.poll(TIMEOUT).await.unwrap_err();
        assert_eq!(err, BridgeError::Timeout(TIMEOUT));
        assert_eq!(mock.stats().read_timeouts, 1);
    }

    #[tokio::test]
    async fn test_poll_propagates_frame_errors() {
        let mock = MockTransport::new();
        let mut bad_header = frame_with_channel0(0, 0);
        bad_header[0] = 0x00;
        mock.push_frame(bad_header);
        mock.push_frame(vec![0x7b, 0x00, 0x40, 0x7d]);
        let mut session = DeviceSession::new(mock);

        assert_eq!(
            session.poll(TIMEOUT).await.unwrap_err(),
            BridgeError::FrameHeader(0x00)
        );
        assert!(matches!(
            session.poll(TIMEOUT).await,
            Err(BridgeError::FrameLength { actual: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_long_report_is_truncated_to_response() {
        let mock = MockTransport::new();
        let mut report = frame_with_channel0(-55, 10);
        report.extend_from_slice(&[0xEE; 37]);
        mock.push_frame(report);
        let mut session = DeviceSession::new(mock);

        let result = session.poll(TIMEOUT).await.unwrap();
        assert_eq!(result.channel(0).unwrap().temperature, -5.5);
    }

    #[tokio::test]
    async fn test_close_releases_transport() {
        let mock = MockTransport::new();
        let session = DeviceSession::new(mock.clone());
        session.close().await.unwrap();
        assert!(mock.is_closed());
    }
}
