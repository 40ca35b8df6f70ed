// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! MQTT client for the seat unit channels

use anyhow::{anyhow, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;

/// A raw message from a seat unit
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// MQTT client wrapper
#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    qos: QoS,
}

impl MqttClient {
    /// Connect in the background and forward everything published under the
    /// subscription filter. Must be called inside a tokio runtime.
    pub fn new(config: &MqttConfig) -> Result<(Self, mpsc::Receiver<InboundMessage>)> {
        let qos = qos(config.qos)?;

        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));

        let subscriber = client.clone();
        let filter = config.subscribe_topic.clone();
        let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);

        // Spawn eventloop handler
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                        // Subscriptions do not survive a clean-session reconnect
                        match subscriber.try_subscribe(filter.as_str(), qos) {
                            Ok(()) => info!("Subscribed to MQTT topic: {}", filter),
                            Err(e) => warn!("MQTT subscribe failed: {}", e),
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        debug!("MQTT received: {}", msg.topic);
                        let message = InboundMessage {
                            topic: msg.topic.clone(),
                            payload: msg.payload.to_vec(),
                        };
                        if tx.send(message).await.is_err() {
                            debug!("Inbound receiver dropped, stopping MQTT event loop");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT error: {:?}", e);
                        tokio::time::sleep(reconnect_delay).await;
                    }
                }
            }
        });

        info!("MQTT client initialized for {}:{}", config.broker, config.port);
        Ok((Self { client, qos }, rx))
    }

    /// Queue a payload without waiting on the network.
    pub fn publish_raw(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client
            .try_publish(topic, self.qos, false, payload.to_vec())
            .map_err(|e| anyhow!("MQTT publish failed: {}", e))
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| anyhow!("MQTT disconnect failed: {}", e))
    }
}

fn qos(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(anyhow!("Invalid MQTT QoS level: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos(2).unwrap(), QoS::ExactlyOnce);
        assert!(qos(3).is_err());
    }
}
