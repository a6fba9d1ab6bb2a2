//! hp3001srv configuration
//!
//! Two JSON documents, both required on disk:
//! - service settings (`hp3001.json`): cadence, topic root, device identity
//! - broker settings (`mqtt.json`): host, port, credentials, TLS material
//!
//! Each is layered with figment: built-in defaults, then the file, then
//! `HP3001_*` / `HP3001_MQTT_*` environment overrides.

use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::protocol::{DEFAULT_POLL_TIMEOUT_MS, PRODUCT_ID, VENDOR_ID};
use crate::scheduler::normalize_topic_root;

pub const DEFAULT_SERVICE_CONFIG: &str = "hp3001.json";
pub const DEFAULT_MQTT_CONFIG: &str = "mqtt.json";

const SERVICE_ENV_PREFIX: &str = "HP3001_";
const MQTT_ENV_PREFIX: &str = "HP3001_MQTT_";

/// Polling and topic settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSettings {
    /// Seconds between cycle starts
    #[serde(default = "default_period", deserialize_with = "deserialize_seconds")]
    pub period: f64,
    /// Prefix for every published topic
    #[serde(default)]
    pub mqtt_topic_root: String,
    /// Read deadline for one poll
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "default_product_id")]
    pub product_id: u16,
}

fn default_period() -> f64 {
    30.0
}

fn default_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}

fn default_vendor_id() -> u16 {
    VENDOR_ID
}

fn default_product_id() -> u16 {
    PRODUCT_ID
}

/// Accepts `30`, `2.5` or `"30"`
fn deserialize_seconds<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(f64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(value) => Ok(value),
        Seconds::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid period '{text}': {e}"))),
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            period: default_period(),
            mqtt_topic_root: String::new(),
            timeout_ms: default_timeout_ms(),
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
        }
    }
}

impl ServiceSettings {
    /// Load from a JSON file plus `HP3001_*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_object(path)?;

        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(SERVICE_ENV_PREFIX).only(&[
                "period",
                "mqtt_topic_root",
                "timeout_ms",
                "vendor_id",
                "product_id",
            ]))
            .extract()?;

        settings.validate()?;
        debug!("Loaded service settings from {}: {:?}", path.display(), settings);
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.period.is_finite() || self.period <= 0.0 {
            return Err(BridgeError::config(format!(
                "period must be a positive number of seconds, got {}",
                self.period
            )));
        }
        Duration::try_from_secs_f64(self.period).map_err(|e| {
            BridgeError::config(format!("period {} is out of range: {}", self.period, e))
        })?;
        if self.timeout_ms == 0 {
            return Err(BridgeError::config("timeout_ms must be greater than 0"));
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.period)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Topic root with a trailing `/` when non-empty
    pub fn topic_root(&self) -> String {
        normalize_topic_root(&self.mqtt_topic_root)
    }
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    pub ca_certs: Option<PathBuf>,
    pub certfile: Option<PathBuf>,
    pub keyfile: Option<PathBuf>,
    pub client_id: Option<String>,
    #[serde(default)]
    pub qos: u8,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub retain: bool,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            use_tls: false,
            ca_certs: None,
            certfile: None,
            keyfile: None,
            client_id: None,
            qos: 0,
            keep_alive_secs: default_keep_alive(),
            retain: false,
        }
    }
}

impl MqttSettings {
    /// Load from a JSON file plus `HP3001_MQTT_*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_object(path)?;

        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(MQTT_ENV_PREFIX))
            .extract()?;

        settings.validate()?;
        debug!("Loaded MQTT settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(BridgeError::config("MQTT host cannot be empty"));
        }
        if self.qos > 2 {
            return Err(BridgeError::config(format!(
                "MQTT qos must be 0, 1 or 2, got {}",
                self.qos
            )));
        }
        // certfile alone is fine: the key is then read from the same PEM
        if self.keyfile.is_some() && self.certfile.is_none() {
            return Err(BridgeError::config("keyfile requires certfile"));
        }
        // The platform trust store has no slot for a client identity
        if self.use_tls && self.certfile.is_some() && self.ca_certs.is_none() {
            return Err(BridgeError::config(
                "client certificates require ca_certs to be provided",
            ));
        }
        Ok(())
    }

    /// Configured client id, or one derived from the process id
    pub fn client_id(&self) -> String {
        match &self.client_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("hp3001srv-{}", std::process::id()),
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub service: ServiceSettings,
    pub mqtt: MqttSettings,
}

impl Config {
    pub fn load(service_path: impl AsRef<Path>, mqtt_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            service: ServiceSettings::load(service_path)?,
            mqtt: MqttSettings::load(mqtt_path)?,
        })
    }
}

/// A config file must exist and hold a JSON object at the top level
fn ensure_object(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        BridgeError::config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| BridgeError::config(format!("{}: {}", path.display(), e)))?;
    if !value.is_object() {
        return Err(BridgeError::config(format!(
            "{}: configuration must be an object",
            path.display()
        )));
    }
    Ok(())
}
