//! Device transport seam and its MQTT implementation.

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;

/// Errors produced by a device transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("mqtt error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("transport closed")]
    Closed,
}

/// Publish-only channel to the device.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// Capacity of the request queue between the client and the event loop.
const MQTT_REQUEST_CAPACITY: usize = 64;

/// Fire-and-forget MQTT publisher (QoS 0, not retained).
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

impl MqttTransport {
    /// Create the client and spawn the task driving its event loop.
    ///
    /// The task exits when `shutdown_rx` turns true.
    pub fn spawn(config: &MqttConfig, shutdown_rx: watch::Receiver<bool>) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }

        let (client, event_loop) = AsyncClient::new(options, MQTT_REQUEST_CAPACITY);
        info!(host = %config.host, port = config.port, "Starting MQTT transport");
        let handle = tokio::spawn(drive(event_loop, shutdown_rx));
        (Self { client }, handle)
    }
}

#[async_trait]
impl DeviceTransport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }
}

async fn drive(mut event_loop: EventLoop, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("MQTT event loop shutting down");
                    break;
                }
            }

            polled = event_loop.poll() => match polled {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(ack))) => {
                    info!(code = ?ack.code, "MQTT connected");
                }
                Ok(event) => debug!(event = ?event, "MQTT event"),
                Err(e) => {
                    warn!(error = %e, "MQTT connection error, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }
}
