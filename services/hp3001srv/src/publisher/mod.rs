//! Publisher adapters
//!
//! The scheduler only needs "publish this string to that topic". Delivery
//! guarantees belong to the adapter; a failed publish is reported back but
//! never retried by the caller.

pub mod memory;
pub mod mqtt;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::RecordingPublisher;
pub use mqtt::MqttPublisher;

/// Sink for (topic, value) pairs
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Emit one value on one topic
    async fn publish(&self, topic: &str, value: &str) -> Result<()>;

    /// Flush and drop the broker connection
    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

#[async_trait]
impl Publisher for Box<dyn Publisher> {
    async fn publish(&self, topic: &str, value: &str) -> Result<()> {
        self.as_ref().publish(topic, value).await
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.as_mut().disconnect().await
    }

    fn name(&self) -> &str {
        self.as_ref().name()
    }
}
