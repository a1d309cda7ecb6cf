//! Message bus plumbing.
//!
//! The core only talks to [`Transport`]. [`MqttTransport`] implements it on
//! top of rumqttc and owns the connection lifecycle: last will, the discover
//! subscription, re-announcing on discovery requests and reconnects, and the
//! leave message on a clean disconnect.

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::MqttConfig;

/// Pause between reconnection attempts of the background event loop.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How long a clean disconnect waits for the event loop to flush.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Capacity of the request channel between client handles and the event loop.
const REQUEST_CAPACITY: usize = 32;

/// Errors from the bus layer.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("invalid broker address: {0}")]
    InvalidAddress(String),

    #[error("connection failed: {0}")]
    Connect(#[from] rumqttc::ConnectionError),

    #[error("no answer from broker within {0:?}")]
    ConnectTimeout(Duration),

    #[error("client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("could not serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A message that announces one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publish side of a pub/sub transport.
pub trait Transport: Send + Sync {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<(), BusError>> + Send;
}

/// MQTT connection to the hemtjanst broker.
pub struct MqttTransport {
    client: AsyncClient,
    client_id: String,
    leave_topic: String,
    event_loop: JoinHandle<()>,
}

impl MqttTransport {
    /// Connect to the broker and start the background event loop.
    ///
    /// Resolves once the broker has acknowledged the connection. The
    /// `announcements` are replayed whenever something is published on the
    /// discover topic and after every reconnect.
    pub async fn connect(
        config: &MqttConfig,
        announcements: Vec<Announcement>,
    ) -> Result<Self, BusError> {
        let (host, port) = config
            .broker()
            .map_err(|_| BusError::InvalidAddress(config.address.clone()))?;

        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_last_will(LastWill::new(
            config.leave_topic.clone(),
            config.client_id.clone(),
            QoS::AtLeastOnce,
            false,
        ));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let timeout = Duration::from_secs(config.connect_timeout_secs);
        tokio::time::timeout(timeout, wait_for_connack(&mut event_loop))
            .await
            .map_err(|_| BusError::ConnectTimeout(timeout))??;

        client
            .subscribe(config.discover_topic.clone(), QoS::AtLeastOnce)
            .await?;

        let event_loop = tokio::spawn(drive_event_loop(
            event_loop,
            client.clone(),
            config.discover_topic.clone(),
            announcements,
        ));

        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            leave_topic: config.leave_topic.clone(),
            event_loop,
        })
    }

    /// Say goodbye on the leave topic and close the connection.
    pub async fn disconnect(self) -> Result<(), BusError> {
        self.client
            .publish(
                self.leave_topic.clone(),
                QoS::AtLeastOnce,
                false,
                self.client_id.clone().into_bytes(),
            )
            .await?;
        self.client.disconnect().await?;

        if tokio::time::timeout(DISCONNECT_GRACE, self.event_loop)
            .await
            .is_err()
        {
            log::warn!("MQTT event loop did not stop within {:?}", DISCONNECT_GRACE);
        }
        Ok(())
    }
}

impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), BusError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await?;
        Ok(())
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), BusError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = event_loop.poll().await? {
            return Ok(());
        }
    }
}

/// Poll the connection until a disconnect goes out.
///
/// Runs in its own task, so it must never await on the client: the request
/// channel is only drained by this very loop. Hence the `try_` calls.
async fn drive_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    discover_topic: String,
    announcements: Vec<Announcement>,
) {
    log::debug!("MQTT event loop started");

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(message))) if message.topic == discover_topic => {
                log::info!(
                    "Discovery request received, announcing {} sensors",
                    announcements.len()
                );
                replay_announcements(&client, &announcements);
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                log::info!("Reconnected to broker");
                if let Err(e) = client.try_subscribe(discover_topic.clone(), QoS::AtLeastOnce) {
                    log::error!("Failed to resubscribe to {}: {}", discover_topic, e);
                }
                replay_announcements(&client, &announcements);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                log::debug!("MQTT event loop stopping");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!(
                    "MQTT connection error: {}. Retrying in {:?}",
                    e,
                    RECONNECT_DELAY
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

fn replay_announcements(client: &AsyncClient, announcements: &[Announcement]) {
    for announcement in announcements {
        if let Err(e) = client.try_publish(
            announcement.topic.clone(),
            QoS::AtLeastOnce,
            true,
            announcement.payload.clone(),
        ) {
            log::error!("Failed to announce {}: {}", announcement.topic, e);
        }
    }
}
