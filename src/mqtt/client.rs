//! Broker client: subscription pump and response publishing.
//!
//! Wraps a rumqttc [`AsyncClient`]. The event pump re-subscribes to the
//! wildcard request pattern on every ConnAck so broker reconnects restore
//! the subscription, and feeds each inbound publish into the bounded
//! dispatcher queue under the configured overflow policy.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::MqttConfig;
use crate::gateway::dispatcher::{EnqueueOutcome, InboundMessage, QueueNack, QueueProducer};
use crate::gateway::ResponsePublisher;
use crate::utils::error::GatewayError;

use super::{tls, topic};

const EVENT_CHANNEL_CAPACITY: usize = 10;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

struct BrokerAddress {
    host: String,
    port: u16,
    tls: bool,
}

fn parse_broker_url(broker: &str) -> Result<BrokerAddress, GatewayError> {
    let (scheme, rest) = broker.split_once("://").unwrap_or(("tcp", broker));
    let tls = match scheme {
        "tcp" | "mqtt" => false,
        "ssl" | "mqtts" | "tls" => true,
        other => {
            return Err(GatewayError::ConfigError(format!(
                "unsupported broker scheme {:?}",
                other
            )))
        }
    };

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                GatewayError::ConfigError(format!("invalid broker port in {:?}", broker))
            })?;
            (host.to_string(), port)
        }
        None => (rest.to_string(), if tls { 8883 } else { 1883 }),
    };

    if host.is_empty() {
        return Err(GatewayError::ConfigError(format!(
            "broker host missing in {:?}",
            broker
        )));
    }

    Ok(BrokerAddress { host, port, tls })
}

#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    broker: String,
}

impl MqttClient {
    /// Creates the broker client and spawns its event pump.
    ///
    /// The connection itself is established lazily by rumqttc on the first
    /// poll; subscription happens on every ConnAck.
    pub fn connect(
        config: &MqttConfig,
        producer: QueueProducer,
        nack: QueueNack,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(Self, JoinHandle<()>), GatewayError> {
        let address = parse_broker_url(&config.broker)?;

        let mut options =
            MqttOptions::new(config.client_id.as_str(), address.host.as_str(), address.port);
        options.set_keep_alive(KEEP_ALIVE);
        if !config.username.is_empty() {
            options.set_credentials(config.username.as_str(), config.password.as_str());
        }
        if address.tls {
            options.set_transport(tls::transport(config)?);
        }

        let (client, mut eventloop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);
        let subscription = topic::wildcard(&config.request_topic);
        let broker = config.broker.clone();

        let pump_client = client.clone();
        let pump_broker = broker.clone();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("🔌 Connected to MQTT broker: {}", pump_broker);
                            match pump_client
                                .subscribe(subscription.as_str(), QoS::AtLeastOnce)
                                .await
                            {
                                Ok(()) => info!("Subscribed to topic: {}", subscription),
                                Err(e) => {
                                    error!("Failed to subscribe to topic {}: {}", subscription, e)
                                }
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let message = InboundMessage {
                                topic: publish.topic,
                                payload: String::from_utf8_lossy(&publish.payload).into_owned(),
                            };
                            match producer.enqueue(message).await {
                                EnqueueOutcome::Accepted => {}
                                EnqueueOutcome::Rejected(message) => {
                                    warn!("Queue full, rejecting request from {}", message.topic);
                                    if let Some((nack_topic, text)) = nack.response_for(&message) {
                                        if let Err(e) = pump_client.try_publish(
                                            nack_topic,
                                            QoS::AtLeastOnce,
                                            false,
                                            text,
                                        ) {
                                            error!("Failed to publish queue-full response: {}", e);
                                        }
                                    }
                                }
                                EnqueueOutcome::Closed => break,
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("Connection lost: {}", e);
                            tokio::time::sleep(RECONNECT_DELAY).await;
                        }
                    }
                }
            }
            debug!("MQTT event pump stopped");
        });

        Ok((Self { client, broker }, pump))
    }

    /// Asks the broker for a clean disconnect; inbound delivery stops here.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("Failed to disconnect from {}: {}", self.broker, e);
        }
    }
}

#[async_trait]
impl ResponsePublisher for MqttClient {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), GatewayError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| GatewayError::PublishFailure(e.to_string()))
    }
}
