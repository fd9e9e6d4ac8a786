//! MQTT client implementation

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::AgentError;
use crate::mqtt::topics::Topics;

/// MQTT broker address
#[derive(Debug, Clone)]
pub struct MqttAddress {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// Optional path to a PEM-encoded CA certificate for broker verification.
    /// When `None` and `use_tls` is `true`, the system certificate store is used.
    pub ca_cert_path: Option<String>,
}

impl Default for MqttAddress {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8883,
            use_tls: true,
            ca_cert_path: None,
        }
    }
}

/// MQTT client wrapper
pub struct MqttClient {
    client: AsyncClient,
    // Wrapped so `MqttClient` is `Sync`; only reached through `get_mut`.
    eventloop: std::sync::Mutex<EventLoop>,
    identity: String,
}

impl MqttClient {
    /// Create a new MQTT client. The identity doubles as the username.
    pub fn new(
        address: &MqttAddress,
        identity: &str,
        password: Option<&SecretString>,
    ) -> Result<Self, AgentError> {
        if address.host.is_empty() {
            return Err(AgentError::MqttError("MQTT host is not configured".to_string()));
        }

        let client_id = format!("lockagent-{}", identity);

        let mut options = MqttOptions::new(&client_id, &address.host, address.port);
        options.set_keep_alive(std::time::Duration::from_secs(30));
        if let Some(password) = password {
            options.set_credentials(identity, password.expose_secret());
        }

        if address.use_tls {
            use rumqttc::{TlsConfiguration, Transport};
            use rustls::ClientConfig;
            use std::sync::Arc;

            let mut root_cert_store = rustls::RootCertStore::empty();

            if let Some(ref ca_path) = address.ca_cert_path {
                let ca_pem = std::fs::read(ca_path)
                    .map_err(|e| AgentError::MqttError(format!("Failed to read CA cert {ca_path}: {e}")))?;
                let mut cursor = std::io::Cursor::new(ca_pem);
                for cert in rustls_pemfile::certs(&mut cursor).flatten() {
                    let _ = root_cert_store.add(cert);
                }
            } else {
                for cert in rustls_native_certs::load_native_certs().unwrap_or_default() {
                    let _ = root_cert_store.add(cert);
                }
            }

            let client_config = ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_no_client_auth();

            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                Arc::new(client_config),
            )));
        }

        let (client, eventloop) = AsyncClient::new(options, 10);

        Ok(Self {
            client,
            eventloop: std::sync::Mutex::new(eventloop),
            identity: identity.to_string(),
        })
    }

    /// Subscribe to the device command topic
    pub async fn subscribe_commands(&self) -> Result<(), AgentError> {
        let topic = Topics::device_command(&self.identity);
        self.client
            .subscribe(&topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| AgentError::MqttError(e.to_string()))?;
        info!("Subscribed to: {}", topic);
        Ok(())
    }

    /// Poll for events
    pub async fn poll(&mut self) -> Result<Option<MqttMessage>, AgentError> {
        let eventloop = self.eventloop.get_mut().unwrap_or_else(|e| e.into_inner());
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!("Received message on topic: {}", publish.topic);
                Ok(Some(MqttMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                }))
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected");
                Ok(None)
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                debug!("Subscription acknowledged");
                Ok(None)
            }
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("MQTT poll error: {}", e);
                Err(AgentError::MqttError(e.to_string()))
            }
        }
    }

    /// Disconnect from broker
    pub async fn disconnect(&self) -> Result<(), AgentError> {
        self.client
            .disconnect()
            .await
            .map_err(|e| AgentError::MqttError(e.to_string()))?;
        info!("MQTT disconnected");
        Ok(())
    }
}

/// MQTT message
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl MqttMessage {
    /// Parse payload as JSON
    pub fn parse_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, AgentError> {
        serde_json::from_slice(&self.payload).map_err(|e| AgentError::MqttError(e.to_string()))
    }
}
