//! Poll/publish scheduler
//!
//! One cycle is poll → decode → publish → sleep. Cycle starts are locked to
//! the configured period: the sleep after a cycle is the period minus the
//! time the cycle took, never negative.
//!
//! ```text
//!        cancel? ──yes──► close session, disconnect publisher
//!          │ no
//!          ▼
//!   ┌─────────────┐   poll ok    ┌───────────────────────────┐
//!   │   Polling   │ ───────────► │ publish ch1..ch8 (T, then H)│
//!   └─────────────┘              └─────────────┬─────────────┘
//!          │ poll failed (logged)              │
//!          ▼                                   ▼
//!   ┌──────────────────────────────────────────────────────┐
//!   │ Idle: sleep max(0, period - elapsed) or until cancel  │
//!   └──────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::protocol::{PollResult, CHANNEL_COUNT};
use crate::publisher::Publisher;
use crate::session::DeviceSession;
use crate::transport::HidTransport;

/// Messages published per successful cycle
pub const MESSAGES_PER_CYCLE: usize = CHANNEL_COUNT * 2;

// ============================================================================
// Topic naming
// ============================================================================

/// Append `/` to a non-empty root that lacks it
pub fn normalize_topic_root(root: &str) -> String {
    if root.is_empty() || root.ends_with('/') {
        root.to_string()
    } else {
        format!("{root}/")
    }
}

/// Topics for one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTopics {
    pub temperature: String,
    pub humidity: String,
}

/// Topics for a zero-based channel index; names use 1-based numbering
pub fn channel_topics(topic_root: &str, channel: usize) -> ChannelTopics {
    let base = format!("{}{}", normalize_topic_root(topic_root), channel + 1);
    ChannelTopics {
        temperature: format!("{base}/temperature"),
        humidity: format!("{base}/humidity"),
    }
}

// ============================================================================
// Cadence
// ============================================================================

/// Sleep before the next cycle: `period - elapsed`, floored at zero
#[inline]
pub fn next_delay(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Between cycles
    Idle,
    /// Poll or publish in progress
    Polling,
}

/// How one cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Poll succeeded and every message was handed to the publisher
    Published,
    /// Poll succeeded, some messages were rejected
    PartiallyPublished,
    /// Poll failed; nothing was published
    PollFailed(BridgeError),
}

/// Summary of one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcome: CycleOutcome,
    pub published: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub next_delay: Duration,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Published)
    }

    fn log(&self, consecutive_failures: u32) {
        match &self.outcome {
            CycleOutcome::Published => debug!(
                cycle = self.cycle,
                published = self.published,
                elapsed_ms = self.elapsed.as_millis() as u64,
                "Cycle completed"
            ),
            CycleOutcome::PartiallyPublished => warn!(
                cycle = self.cycle,
                published = self.published,
                failed = self.failed,
                "Cycle completed with publish failures"
            ),
            CycleOutcome::PollFailed(e) => warn!(
                cycle = self.cycle,
                code = e.error_code(),
                consecutive_failures,
                "Poll failed, skipping publish: {}",
                e
            ),
        }
    }
}

// ============================================================================
// Service context
// ============================================================================

/// Long-lived handles owned by the scheduler
pub struct BridgeContext<T: HidTransport, P: Publisher> {
    pub session: DeviceSession<T>,
    pub publisher: P,
}

impl<T: HidTransport, P: Publisher> BridgeContext<T, P> {
    pub fn new(session: DeviceSession<T>, publisher: P) -> Self {
        Self { session, publisher }
    }
}

/// Timing and naming parameters of the loop
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub period: Duration,
    pub poll_timeout: Duration,
    pub topic_root: String,
}

impl ScheduleConfig {
    pub fn new(period: Duration, poll_timeout: Duration, topic_root: &str) -> Self {
        Self {
            period,
            poll_timeout,
            topic_root: normalize_topic_root(topic_root),
        }
    }
}

impl From<&crate::config::ServiceSettings> for ScheduleConfig {
    fn from(settings: &crate::config::ServiceSettings) -> Self {
        Self::new(
            settings.period(),
            settings.poll_timeout(),
            &settings.mqtt_topic_root,
        )
    }
}

/// Drives the poll/publish cycle
pub struct Scheduler<T: HidTransport, P: Publisher> {
    context: BridgeContext<T, P>,
    config: ScheduleConfig,
    state: SchedulerState,
    cycle: u64,
    consecutive_failures: u32,
    /// Start of the most recent cycle
    last_cycle_start: Option<Instant>,
}

impl<T: HidTransport, P: Publisher> Scheduler<T, P> {
    pub fn new(context: BridgeContext<T, P>, config: ScheduleConfig) -> Self {
        Self {
            context,
            config,
            state: SchedulerState::Idle,
            cycle: 0,
            consecutive_failures: 0,
            last_cycle_start: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    pub fn last_cycle_start(&self) -> Option<Instant> {
        self.last_cycle_start
    }

    pub fn context(&self) -> &BridgeContext<T, P> {
        &self.context
    }

    /// Run one cycle without the trailing sleep
    pub async fn run_cycle(&mut self) -> CycleReport {
        let cycle_start = Instant::now();
        self.last_cycle_start = Some(cycle_start);
        self.state = SchedulerState::Polling;
        self.cycle += 1;

        let (outcome, published, failed) =
            match self.context.session.poll(self.config.poll_timeout).await {
                Ok(result) => {
                    self.consecutive_failures = 0;
                    let (published, failed) = publish_readings(
                        &self.context.publisher,
                        &self.config.topic_root,
                        &result,
                    )
                    .await;
                    let outcome = if failed == 0 {
                        CycleOutcome::Published
                    } else {
                        CycleOutcome::PartiallyPublished
                    };
                    (outcome, published, failed)
                },
                Err(e) => {
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    (CycleOutcome::PollFailed(e), 0, 0)
                },
            };

        self.state = SchedulerState::Idle;
        let elapsed = cycle_start.elapsed();
        let report = CycleReport {
            cycle: self.cycle,
            outcome,
            published,
            failed,
            elapsed,
            next_delay: next_delay(self.config.period, elapsed),
        };
        report.log(self.consecutive_failures);
        report
    }

    /// Run until `shutdown` is cancelled, then release the device and the
    /// broker connection
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Starting poll loop: period={:?}, timeout={:?}, topic_root='{}'",
            self.config.period, self.config.poll_timeout, self.config.topic_root
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let report = self.run_cycle().await;

            tokio::select! {
                () = tokio::time::sleep(report.next_delay) => {},
                () = shutdown.cancelled() => break,
            }
        }

        info!("Poll loop stopped after {} cycles", self.cycle);
        self.shutdown().await
    }

    /// Close the session and disconnect the publisher
    pub async fn shutdown(self) -> Result<()> {
        let BridgeContext {
            session,
            mut publisher,
        } = self.context;

        let closed = session.close().await;
        if let Err(e) = publisher.disconnect().await {
            warn!("Error disconnecting publisher {}: {}", publisher.name(), e);
        }
        closed
    }
}

/// Publish every reading in channel order, temperature before humidity
///
/// Returns (published, failed). A failure on one message does not stop the
/// others.
pub async fn publish_readings<P: Publisher + ?Sized>(
    publisher: &P,
    topic_root: &str,
    result: &PollResult,
) -> (usize, usize) {
    let mut published = 0;
    let mut failed = 0;

    for (channel, reading) in result.iter().enumerate() {
        let topics = channel_topics(topic_root, channel);
        let messages = [
            (topics.temperature, reading.temperature_text()),
            (topics.humidity, reading.humidity_text()),
        ];

        for (topic, value) in &messages {
            match publisher.publish(topic, value).await {
                Ok(()) => published += 1,
                Err(e) => {
                    failed += 1;
                    warn!("Failed to publish {} = {}: {}", topic, value, e);
                },
            }
        }
    }

    (published, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_response;
    use crate::publisher::RecordingPublisher;
    use crate::transport::{MockReply, MockTransport};
    use tracing_test::traced_test;

    const PERIOD: Duration = Duration::from_secs(30);
    const TIMEOUT: Duration = Duration::from_millis(500);

    fn scheduler(
        mock: &MockTransport,
        publisher: &RecordingPublisher,
        root: &str,
    ) -> Scheduler<MockTransport, RecordingPublisher> {
        let context = BridgeContext::new(DeviceSession::new(mock.clone()), publisher.clone());
        Scheduler::new(context, ScheduleConfig::new(PERIOD, TIMEOUT, root))
    }

    fn sample_frame() -> Vec<u8> {
        let mut channels = [(0i16, 0i8); CHANNEL_COUNT];
        channels[0] = (213, 45);
        build_response(&channels).to_vec()
    }

    #[test]
    fn test_normalize_topic_root() {
        assert_eq!(normalize_topic_root(""), "");
        assert_eq!(normalize_topic_root("sensors"), "sensors/");
        assert_eq!(normalize_topic_root("sensors/"), "sensors/");
        assert_eq!(normalize_topic_root("home/hp3001"), "home/hp3001/");
    }

    #[test]
    fn test_channel_topics() {
        let topics = channel_topics("sensors", 3);
        assert_eq!(topics.temperature, "sensors/4/temperature");
        assert_eq!(topics.humidity, "sensors/4/humidity");

        let topics = channel_topics("", 0);
        assert_eq!(topics.temperature, "1/temperature");
        assert_eq!(topics.humidity, "1/humidity");
    }

    #[test]
    fn test_next_delay() {
        assert_eq!(
            next_delay(PERIOD, Duration::from_millis(1500)),
            Duration::from_millis(28_500)
        );
        assert_eq!(next_delay(PERIOD, PERIOD), Duration::ZERO);
        assert_eq!(next_delay(PERIOD, Duration::from_secs(45)), Duration::ZERO);
        assert_eq!(next_delay(PERIOD, Duration::ZERO), PERIOD);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_publishes_sixteen_messages_in_order() {
        let mock = MockTransport::new();
        mock.push_frame(sample_frame());
        let publisher = RecordingPublisher::new();
        let mut scheduler = scheduler(&mock, &publisher, "sensors");

        let report = scheduler.run_cycle().await;
        assert!(report.is_success());
        assert_eq!(report.published, MESSAGES_PER_CYCLE);
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let messages = publisher.messages();
        assert_eq!(messages.len(), 16);
        assert_eq!(
            messages[0],
            ("sensors/1/temperature".to_string(), "21.3".to_string())
        );
        assert_eq!(
            messages[1],
            ("sensors/1/humidity".to_string(), "45".to_string())
        );
        assert_eq!(
            messages[15],
            ("sensors/8/humidity".to_string(), "0".to_string())
        );
        assert_eq!(
            publisher.last_value("sensors/2/temperature").as_deref(),
            Some("0.0")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_does_not_block_others() {
        let mock = MockTransport::new();
        mock.push_frame(sample_frame());
        let publisher = RecordingPublisher::new();
        publisher.fail_on("3/temperature");
        let mut scheduler = scheduler(&mock, &publisher, "");

        let report = scheduler.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::PartiallyPublished);
        assert_eq!(report.published, 15);
        assert_eq!(report.failed, 1);
        assert_eq!(publisher.attempts(), 16);
        assert_eq!(publisher.last_value("3/humidity").as_deref(), Some("0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cycle_skips_publish_and_keeps_cadence() {
        let mock = MockTransport::new();
        mock.push_reply(MockReply::Silence);
        let publisher = RecordingPublisher::new();
        let mut scheduler = scheduler(&mock, &publisher, "");

        let report = scheduler.run_cycle().await;
        assert_eq!(report.outcome, CycleOutcome::PollFailed(BridgeError::Timeout(TIMEOUT)));
        assert_eq!(publisher.attempts(), 0);
        assert_eq!(report.elapsed, TIMEOUT);
        assert_eq!(report.next_delay, PERIOD - TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_frame_error_is_logged() {
        let mock = MockTransport::new();
        mock.push_frame(vec![0x7b, 0x03, 0x40, 0x7d]);
        let publisher = RecordingPublisher::new();
        let mut scheduler = scheduler(&mock, &publisher, "");

        let report = scheduler.run_cycle().await;
        assert!(matches!(
            report.outcome,
            CycleOutcome::PollFailed(BridgeError::FrameLength { actual: 4, .. })
        ));
        assert!(logs_contain("Poll failed, skipping publish"));
        assert!(logs_contain("FRAME_LENGTH"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_has_no_sleep() {
        let mock = MockTransport::new().with_read_delay(Duration::from_millis(400));
        mock.push_frame(sample_frame());
        let publisher = RecordingPublisher::new();
        let context = BridgeContext::new(DeviceSession::new(mock.clone()), publisher.clone());
        let config = ScheduleConfig::new(Duration::from_millis(300), TIMEOUT, "");
        let mut scheduler = Scheduler::new(context, config);

        let report = scheduler.run_cycle().await;
        assert!(report.is_success());
        assert_eq!(report.next_delay, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel_and_closes_session() {
        let mock = MockTransport::new();
        mock.set_fallback(MockReply::Frame(sample_frame()));
        let publisher = RecordingPublisher::new();
        let scheduler = scheduler(&mock, &publisher, "");

        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));

        // Cycles start at t=0, 30, 60
        tokio::time::sleep(Duration::from_secs(61)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(mock.sent_data().len(), 3);
        assert_eq!(publisher.messages().len(), 3 * MESSAGES_PER_CYCLE);
        assert!(mock.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_keeps_cadence_through_timeout() {
        let mock = MockTransport::new();
        mock.push_reply(MockReply::Silence);
        mock.set_fallback(MockReply::Frame(sample_frame()));
        let publisher = RecordingPublisher::new();
        let scheduler = scheduler(&mock, &publisher, "sensors");

        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));

        // t=0: request sent, read times out at 0.5s
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(mock.sent_data().len(), 1);
        assert_eq!(publisher.attempts(), 0);

        // No early retry after the failure
        tokio::time::sleep(Duration::from_millis(28_900)).await;
        assert_eq!(mock.sent_data().len(), 1);

        // t=30: next cycle on the period boundary, publishing resumes
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(mock.sent_data().len(), 2);
        assert_eq!(publisher.messages().len(), MESSAGES_PER_CYCLE);
        assert_eq!(
            publisher.last_value("sensors/1/temperature").as_deref(),
            Some("21.3")
        );

        // t=60
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(mock.sent_data().len(), 3);
        assert_eq!(publisher.messages().len(), 2 * MESSAGES_PER_CYCLE);

        token.cancel();
        handle.await.unwrap().unwrap();
        assert!(mock.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_runs_no_cycle() {
        let mock = MockTransport::new();
        let publisher = RecordingPublisher::new();
        let scheduler = scheduler(&mock, &publisher, "");

        let token = CancellationToken::new();
        token.cancel();
        scheduler.run(token).await.unwrap();

        assert!(mock.sent_data().is_empty());
        assert!(mock.is_closed());
    }
}
