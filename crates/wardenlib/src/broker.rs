use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Initial delay before a reconnect attempt after the connection drops.
const RECONNECT_BACKOFF_BASE: Duration = Duration::from_millis(500);
/// Back-off never grows past this, so a broker outage doesn't leave the
/// client polling once an hour.
const RECONNECT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Mirrors rumqttc's QoS levels, wrapped so the rest of the engine never
/// names `rumqttc` directly.
#[allow(clippy::enum_variant_names)]
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Hash)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl Display for QoS {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            QoS::AtMostOnce => "at most once (0)",
            QoS::AtLeastOnce => "at least once (1)",
            QoS::ExactlyOnce => "exactly once (2)",
        };
        write!(f, "{display}")
    }
}

impl From<QoS> for rumqttc::v5::mqttbytes::QoS {
    fn from(value: QoS) -> Self {
        match value {
            QoS::AtMostOnce => rumqttc::v5::mqttbytes::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::v5::mqttbytes::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::v5::mqttbytes::QoS::ExactlyOnce,
        }
    }
}

impl From<rumqttc::v5::mqttbytes::QoS> for QoS {
    fn from(value: rumqttc::v5::mqttbytes::QoS) -> Self {
        match value {
            rumqttc::v5::mqttbytes::QoS::AtMostOnce => QoS::AtMostOnce,
            rumqttc::v5::mqttbytes::QoS::AtLeastOnce => QoS::AtLeastOnce,
            rumqttc::v5::mqttbytes::QoS::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker client error")]
    Client(#[from] rumqttc::v5::ClientError),
    #[error("broker connection was dropped before startup completed")]
    ConnectionDropped,
}

/// One incoming publish, handed to the supervisor's ingest path.
#[derive(Clone, Debug)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retained: bool,
}

/// The broker interface consumed by the engine. The concrete MQTT client
/// library is deliberately out of the core's scope; this trait is the
/// seam a host binary plugs a real client into.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Returns the event-loop task handle, a channel of incoming publishes,
    /// and a channel that fires once per re-established connection (not
    /// for the initial connect) so the caller can reassert subscriptions.
    async fn connect(
        &self,
        receiver_exit: broadcast::Receiver<()>,
    ) -> Result<(JoinHandle<()>, broadcast::Receiver<BrokerMessage>, broadcast::Receiver<()>), BrokerError>;

    async fn subscribe(&self, topic_pattern: &str, qos: QoS) -> Result<(), BrokerError>;

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), BrokerError>;

    async fn disconnect(&self) -> Result<(), BrokerError>;
}

/// Connection parameters for [`RumqttcBroker`]: the fields the engine
/// actually needs, with no TLS client-auth variants — this is the
/// reference adapter, not a feature-complete client.
#[derive(Clone, Debug)]
pub struct BrokerConnect {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for BrokerConnect {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "warden".to_string(),
            keep_alive_secs: 5,
            username: None,
            password: None,
        }
    }
}

/// Reference [`Broker`] implementation over `rumqttc`'s v5 async client.
/// No v3.1.1 fallback and no TLS client-certificate support — a thinner
/// client than a production deployment might want, but enough to drive
/// the engine end to end.
pub struct RumqttcBroker {
    client: rumqttc::v5::AsyncClient,
    event_loop: tokio::sync::Mutex<Option<rumqttc::v5::EventLoop>>,
}

impl RumqttcBroker {
    pub fn new(config: &BrokerConnect) -> Self {
        let mut opts = rumqttc::v5::MqttOptions::new(
            config.client_id.clone(),
            config.host.clone(),
            config.port,
        );
        opts.set_keep_alive(std::time::Duration::from_secs(config.keep_alive_secs as u64));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            opts.set_credentials(username.clone(), password.clone());
        }

        let (client, event_loop) = rumqttc::v5::AsyncClient::new(opts, 64);

        Self {
            client,
            event_loop: tokio::sync::Mutex::new(Some(event_loop)),
        }
    }
}

#[async_trait]
impl Broker for RumqttcBroker {
    async fn connect(
        &self,
        mut receiver_exit: broadcast::Receiver<()>,
    ) -> Result<(JoinHandle<()>, broadcast::Receiver<BrokerMessage>, broadcast::Receiver<()>), BrokerError> {
        let mut event_loop = self
            .event_loop
            .lock()
            .await
            .take()
            .ok_or(BrokerError::ConnectionDropped)?;

        let (sender, receiver) = broadcast::channel::<BrokerMessage>(256);
        let (reconnect_tx, reconnect_rx) = broadcast::channel::<()>(1);

        let handle = tokio::task::spawn(async move {
            let mut backoff = RECONNECT_BACKOFF_BASE;
            let mut was_disconnected = false;
            loop {
                tokio::select! {
                    event = event_loop.poll() => {
                        match event {
                            Ok(rumqttc::v5::Event::Incoming(rumqttc::v5::Incoming::Publish(publish))) => {
                                backoff = RECONNECT_BACKOFF_BASE;
                                let topic = String::from_utf8_lossy(&publish.topic).to_string();
                                let message = BrokerMessage {
                                    topic,
                                    payload: publish.payload.to_vec(),
                                    qos: QoS::from(publish.qos),
                                    retained: publish.retain,
                                };
                                if sender.send(message).is_err() {
                                    // no receiver listening, drop silently
                                }
                            }
                            Ok(rumqttc::v5::Event::Incoming(rumqttc::v5::Incoming::ConnAck(_))) => {
                                backoff = RECONNECT_BACKOFF_BASE;
                                if was_disconnected {
                                    was_disconnected = false;
                                    let _ = reconnect_tx.send(());
                                }
                            }
                            Ok(_) => {
                                backoff = RECONNECT_BACKOFF_BASE;
                            }
                            Err(error) => {
                                was_disconnected = true;
                                tracing::warn!(%error, backoff_ms = backoff.as_millis() as u64, "broker connection lost, retrying after back-off");
                                tokio::time::sleep(backoff).await;
                                backoff = (backoff * 2).min(RECONNECT_BACKOFF_CAP);
                            }
                        }
                    }
                    _ = receiver_exit.recv() => {
                        break;
                    }
                }
            }
        });

        Ok((handle, receiver, reconnect_rx))
    }

    async fn subscribe(&self, topic_pattern: &str, qos: QoS) -> Result<(), BrokerError> {
        self.client
            .subscribe(topic_pattern, qos.into())
            .await
            .map_err(BrokerError::from)
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), BrokerError> {
        self.client
            .publish(topic, qos.into(), retain, payload)
            .await
            .map_err(BrokerError::from)
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.client.disconnect().await.map_err(BrokerError::from)
    }
}

pub type SharedBroker = Arc<dyn Broker>;
