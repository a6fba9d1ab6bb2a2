//! Transport Layer Traits
//!
//! The device session only needs "send N bytes" and "read up to N bytes with
//! a deadline". Anything that can do both over the sensor's HID endpoints
//! implements [`HidTransport`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};

use crate::error::Result;

/// Transport statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Number of writes
    pub writes: u64,
    /// Number of reads that returned data
    pub reads: u64,
    /// Number of reads that hit the deadline
    pub read_timeouts: u64,
    /// Last time data arrived
    pub last_receive: Option<SystemTime>,
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes sent
    pub fn record_write(&mut self, bytes: usize) {
        self.writes += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Record bytes received; zero bytes counts as a timeout
    pub fn record_read(&mut self, bytes: usize) {
        if bytes == 0 {
            self.read_timeouts += 1;
        } else {
            self.reads += 1;
            self.bytes_received += bytes as u64;
            self.last_receive = Some(SystemTime::now());
        }
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Byte transport to the sensor's interrupt endpoints
#[async_trait]
pub trait HidTransport: Send + fmt::Debug {
    /// Human-readable transport name
    fn name(&self) -> &str;

    /// Write one report to the output endpoint
    ///
    /// Returns the number of bytes accepted by the device.
    async fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read one report from the input endpoint
    ///
    /// Blocks until data arrives or `timeout` elapses. Returns the number of
    /// bytes copied into `buffer`; `Ok(0)` means the deadline passed with
    /// nothing to read.
    async fn read_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Release the underlying handle. Further calls fail.
    async fn close(&mut self) -> Result<()>;

    /// Transport statistics
    fn stats(&self) -> TransportStats;
}

#[async_trait]
impl HidTransport for Box<dyn HidTransport> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.as_mut().write(data).await
    }

    async fn read_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        self.as_mut().read_timeout(buffer, timeout).await
    }

    async fn close(&mut self) -> Result<()> {
        self.as_mut().close().await
    }

    fn stats(&self) -> TransportStats {
        self.as_ref().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_stats() {
        let mut stats = TransportStats::new();
        assert_eq!(stats.writes, 0);

        stats.record_write(4);
        stats.record_read(27);
        stats.record_read(0);
        assert_eq!(stats.bytes_sent, 4);
        assert_eq!(stats.bytes_received, 27);
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.read_timeouts, 1);
        assert!(stats.last_receive.is_some());

        stats.reset();
        assert_eq!(stats.bytes_received, 0);
        assert!(stats.last_receive.is_none());
    }
}
