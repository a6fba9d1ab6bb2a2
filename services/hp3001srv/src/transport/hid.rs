//! USB HID transport backed by `hidapi`
//!
//! hidapi calls block, so every call runs on tokio's blocking pool. The
//! device handle is shared with those closures through an `Arc<Mutex<_>>`;
//! only one call is ever in flight because the session drives the transport
//! sequentially.

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::traits::{HidTransport, TransportStats};
use crate::error::{BridgeError, Result};

/// HID transport to a single device
pub struct UsbHidTransport {
    name: String,
    device: Option<Arc<Mutex<HidDevice>>>,
    stats: TransportStats,
}

impl fmt::Debug for UsbHidTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbHidTransport")
            .field("name", &self.name)
            .field("open", &self.device.is_some())
            .finish()
    }
}

impl UsbHidTransport {
    /// Open the first HID device matching vendor/product id
    pub fn open(vendor_id: u16, product_id: u16) -> Result<Self> {
        let api = HidApi::new()
            .map_err(|e| BridgeError::device_not_found(vendor_id, product_id, e.to_string()))?;
        let device = api
            .open(vendor_id, product_id)
            .map_err(|e| BridgeError::device_not_found(vendor_id, product_id, e.to_string()))?;

        let name = format!("hid:{vendor_id:04x}:{product_id:04x}");
        info!("Opened HID device {}", name);

        Ok(Self {
            name,
            device: Some(Arc::new(Mutex::new(device))),
            stats: TransportStats::new(),
        })
    }

    fn handle(&self) -> Result<Arc<Mutex<HidDevice>>> {
        self.device
            .clone()
            .ok_or_else(|| BridgeError::transport(format!("{} is closed", self.name)))
    }
}

#[async_trait]
impl HidTransport for UsbHidTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let device = self.handle()?;
        // Unnumbered reports are prefixed with report id 0
        let mut report = Vec::with_capacity(data.len() + 1);
        report.push(0x00);
        report.extend_from_slice(data);
        let sent = tokio::task::spawn_blocking(move || device.lock().write(&report)).await??;
        let written = sent.saturating_sub(1).min(data.len());

        self.stats.record_write(written);
        debug!("HID write {} bytes: {:02X?}", written, data);
        Ok(written)
    }

    async fn read_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        let device = self.handle()?;
        let capacity = buffer.len();
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);

        let (received, data) = tokio::task::spawn_blocking(move || {
            let mut report = vec![0u8; capacity];
            device
                .lock()
                .read_timeout(&mut report, timeout_ms)
                .map(|n| (n, report))
        })
        .await??;

        buffer[..received].copy_from_slice(&data[..received]);
        self.stats.record_read(received);
        debug!("HID read {} bytes", received);
        Ok(received)
    }

    async fn close(&mut self) -> Result<()> {
        if self.device.take().is_some() {
            info!("Closed HID device {}", self.name);
        }
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
