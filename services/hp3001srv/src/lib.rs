//! HP3001 Sensor Bridge Service (`hp3001srv`)
//!
//! Polls an HP3001 eight-channel USB temperature/humidity receiver and
//! republishes every reading on its own MQTT topic.
//!
//! # Architecture
//!
//! ```text
//! Scheduler ──► DeviceSession::poll ──► frame codec (encode / decode)
//!     │                 │
//!     │                 └── HidTransport (hidapi | mock)
//!     │
//!     └──► Publisher::publish × 16 per cycle (rumqttc | memory)
//! ```
//!
//! # Modules
//!
//! - `protocol`: wire constants and the request/response frame codec
//! - `transport`: byte transport to the device's HID endpoints
//! - `session`: one opened device, one `poll()` operation
//! - `publisher`: (topic, value) sinks
//! - `scheduler`: drift-free poll/publish loop with cancellation
//! - `config` / `bootstrap`: settings, CLI, logging, signals

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod protocol;
pub mod publisher;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use error::{BridgeError, Result};
pub use protocol::{decode_response, encode_request, PollResult, Reading};
pub use publisher::Publisher;
pub use scheduler::{BridgeContext, CycleOutcome, CycleReport, ScheduleConfig, Scheduler};
pub use session::DeviceSession;
pub use transport::HidTransport;

/// Service name used in logs and the default MQTT client id
pub const SERVICE_NAME: &str = "hp3001srv";
