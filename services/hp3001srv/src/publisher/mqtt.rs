//! MQTT publisher backed by `rumqttc`
//!
//! Publishing never waits on the network: messages go into the client's
//! request queue with `try_publish` and a background task drives the event
//! loop. When the broker is unreachable the event loop keeps reconnecting
//! and a full queue surfaces as a publish error for that message only.

use async_trait::async_trait;
use rumqttc::tokio_rustls::rustls::pki_types::CertificateDer;
use rumqttc::tokio_rustls::rustls::{ClientConfig, RootCertStore};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Publisher;
use crate::config::MqttSettings;
use crate::error::{BridgeError, Result};

/// Request queue capacity; holds several cycles of 16 messages
const REQUEST_CAPACITY: usize = 64;

/// Pause between reconnect attempts after an event loop error
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct MqttPublisher {
    name: String,
    client: AsyncClient,
    qos: QoS,
    retain: bool,
    connected: Arc<AtomicBool>,
    event_task: Option<JoinHandle<()>>,
}

fn qos_from_level(level: u8) -> QoS {
    match level {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| BridgeError::config(format!("Failed to read {}: {}", path.display(), e)))
}

/// TLS transport verifying the broker against the given trust anchors
fn platform_roots_transport(certs: Vec<CertificateDer<'static>>) -> Result<Transport> {
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(BridgeError::config(
            "use_tls without ca_certs needs platform root certificates, none were found",
        ));
    }
    debug!("Loaded {} platform root certificates ({} ignored)", added, ignored);

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Transport::tls_with_config(TlsConfiguration::Rustls(Arc::new(config))))
}

/// Translate settings into rumqttc options
fn build_options(settings: &MqttSettings) -> Result<MqttOptions> {
    let mut options = MqttOptions::new(settings.client_id(), &settings.host, settings.port);
    options.set_keep_alive(settings.keep_alive());
    options.set_clean_session(true);

    if let Some(username) = &settings.username {
        options.set_credentials(username, settings.password.clone().unwrap_or_default());
    }

    if settings.use_tls {
        let transport = match settings.ca_certs.as_deref() {
            Some(ca_path) => {
                let ca = read_pem(ca_path)?;
                // Without a keyfile the key is expected in the certfile
                let client_auth = match (&settings.certfile, &settings.keyfile) {
                    (Some(cert), Some(key)) => Some((read_pem(cert)?, read_pem(key)?)),
                    (Some(cert), None) => {
                        let pem = read_pem(cert)?;
                        Some((pem.clone(), pem))
                    },
                    _ => None,
                };
                Transport::tls(ca, client_auth, None)
            },
            None if settings.certfile.is_some() => {
                return Err(BridgeError::config(
                    "client certificates require ca_certs to be provided",
                ));
            },
            None => {
                let certs = rustls_native_certs::load_native_certs().map_err(|e| {
                    BridgeError::config(format!("Failed to load platform root certificates: {e}"))
                })?;
                platform_roots_transport(certs)?
            },
        };
        options.set_transport(transport);
    }

    Ok(options)
}

impl MqttPublisher {
    /// Create the client and start driving its event loop
    pub async fn connect(settings: &MqttSettings) -> Result<Self> {
        let options = build_options(settings)?;
        let name = format!("mqtt://{}:{}", settings.host, settings.port);
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let connected = Arc::new(AtomicBool::new(false));
        let task_connected = connected.clone();
        let task_name = name.clone();

        let event_task = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        task_connected.store(true, Ordering::Relaxed);
                        info!("Connected to MQTT broker {} ({:?})", task_name, ack.code);
                    },
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        task_connected.store(false, Ordering::Relaxed);
                        warn!("MQTT broker {} closed the session", task_name);
                    },
                    Ok(notification) => {
                        debug!("MQTT event: {:?}", notification);
                    },
                    Err(e) => {
                        if task_connected.swap(false, Ordering::Relaxed) {
                            error!("MQTT connection to {} lost: {}", task_name, e);
                        } else {
                            warn!("MQTT connection to {} failed: {}", task_name, e);
                        }
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    },
                }
            }
        });

        info!("MQTT publisher started for {}", name);

        Ok(Self {
            name,
            client,
            qos: qos_from_level(settings.qos),
            retain: settings.retain,
            connected,
            event_task: Some(event_task),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, value: &str) -> Result<()> {
        self.client
            .try_publish(topic, self.qos, self.retain, value.as_bytes().to_vec())
            .map_err(|e| BridgeError::publish(topic, e))?;

        debug!("MQTT queued {} = {}", topic, value);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Err(e) = self.client.disconnect().await {
            warn!("Error disconnecting from MQTT broker {}: {}", self.name, e);
        }

        // Give the event loop a moment to flush the disconnect packet
        if let Some(task) = self.event_task.take() {
            tokio::time::sleep(Duration::from_millis(100)).await;
            task.abort();
        }

        self.connected.store(false, Ordering::Relaxed);
        info!("MQTT publisher {} disconnected", self.name);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }
}
