//! Mock Transport for Testing
//!
//! Scripted stand-in for the sensor. Each read pops the next reply from a
//! queue; once the queue is empty the fallback reply is used (silence unless
//! configured otherwise). Clones share state so a test can keep a handle
//! after moving the transport into a session.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::traits::{HidTransport, TransportStats};
use crate::error::{BridgeError, Result};

/// What the mock device does on the next read
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Answer with these bytes
    Frame(Vec<u8>),
    /// Say nothing until the deadline passes
    Silence,
    /// Fail the read with a transport error
    Fail(String),
}

#[derive(Debug)]
struct MockState {
    replies: VecDeque<MockReply>,
    fallback: MockReply,
    sent_data: Vec<Vec<u8>>,
    stats: TransportStats,
    closed: bool,
}

/// Mock transport implementation
#[derive(Debug, Clone)]
pub struct MockTransport {
    name: String,
    /// Simulated device latency for frame replies
    read_delay: Duration,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            read_delay: Duration::ZERO,
            state: Arc::new(Mutex::new(MockState {
                replies: VecDeque::new(),
                fallback: MockReply::Silence,
                sent_data: Vec::new(),
                stats: TransportStats::new(),
                closed: false,
            })),
        }
    }

    /// Delay every frame reply by `delay`
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Queue a reply for the next unanswered read
    pub fn push_reply(&self, reply: MockReply) {
        self.state.lock().replies.push_back(reply);
    }

    /// Queue a frame reply
    pub fn push_frame(&self, data: impl Into<Vec<u8>>) {
        self.push_reply(MockReply::Frame(data.into()));
    }

    /// Reply used once the queue runs dry
    pub fn set_fallback(&self, reply: MockReply) {
        self.state.lock().fallback = reply;
    }

    /// Everything written so far (for testing)
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent_data.clone()
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn next_reply(&self) -> Result<MockReply> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BridgeError::transport("Mock transport is closed"));
        }
        Ok(match state.replies.pop_front() {
            Some(reply) => reply,
            None => state.fallback.clone(),
        })
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HidTransport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BridgeError::transport("Mock transport is closed"));
        }
        state.sent_data.push(data.to_vec());
        state.stats.record_write(data.len());
        debug!("Mock transport sent {} bytes", data.len());
        Ok(data.len())
    }

    async fn read_timeout(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        let received = match self.next_reply()? {
            MockReply::Frame(data) if self.read_delay < timeout => {
                tokio::time::sleep(self.read_delay).await;
                let len = data.len().min(buffer.len());
                buffer[..len].copy_from_slice(&data[..len]);
                len
            },
            MockReply::Frame(_) | MockReply::Silence => {
                tokio::time::sleep(timeout).await;
                0
            },
            MockReply::Fail(msg) => return Err(BridgeError::Transport(msg)),
        };

        self.state.lock().stats.record_read(received);
        debug!("Mock transport received {} bytes", received);
        Ok(received)
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            debug!("Mock transport closed");
        }
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.state.lock().stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_mock_replies_in_order() {
        let mut transport = MockTransport::new();
        transport.push_frame(vec![1, 2, 3]);
        transport.push_reply(MockReply::Silence);

        let mut buf = [0u8; 2];
        assert_eq!(
            transport
                .read_timeout(&mut buf, Duration::from_millis(500))
                .await
                .unwrap(),
            2
        );
        assert_eq!(buf, [1, 2]);

        let start = tokio::time::Instant::now();
        assert_eq!(
            transport
                .read_timeout(&mut buf, Duration::from_millis(500))
                .await
                .unwrap(),
            0
        );
        assert_eq!(start.elapsed(), Duration::from_millis(500));

        let stats = transport.stats();
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.read_timeouts, 1);
    }

    #[tokio::test]
    async fn test_mock_closed_rejects_io() {
        let mut transport = MockTransport::new();
        let handle = transport.clone();
        transport.close().await.unwrap();

        assert!(handle.is_closed());
        assert!(transport.write(&[0x7b]).await.is_err());
        let mut buf = [0u8; 27];
        assert!(transport
            .read_timeout(&mut buf, Duration::from_millis(1))
            .await
            .is_err());
    }
}
