//! In-memory publisher
//!
//! Records every publish call in order. Topics can be marked as failing to
//! exercise the scheduler's per-message error handling.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::Publisher;
use crate::error::{BridgeError, Result};

#[derive(Debug, Default)]
struct Recorded {
    messages: Vec<(String, String)>,
    failing_topics: HashSet<String>,
    attempts: usize,
}

/// Publisher that keeps messages in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `topic` fail
    pub fn fail_on(&self, topic: impl Into<String>) {
        self.inner.lock().failing_topics.insert(topic.into());
    }

    /// Successfully published (topic, value) pairs in call order
    pub fn messages(&self) -> Vec<(String, String)> {
        self.inner.lock().messages.clone()
    }

    /// Value last published on `topic`
    pub fn last_value(&self, topic: &str) -> Option<String> {
        self.inner
            .lock()
            .messages
            .iter()
            .rev()
            .find(|(t, _)| t == topic)
            .map(|(_, v)| v.clone())
    }

    /// Number of publish calls, failed ones included
    pub fn attempts(&self) -> usize {
        self.inner.lock().attempts
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.messages.clear();
        inner.attempts = 0;
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.attempts += 1;
        if inner.failing_topics.contains(topic) {
            return Err(BridgeError::publish(topic, "rejected by recording publisher"));
        }
        inner.messages.push((topic.to_string(), value.to_string()));
        debug!("Recorded {} = {}", topic, value);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
