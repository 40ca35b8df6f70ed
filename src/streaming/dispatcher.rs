// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Outbound command delivery

use tracing::{debug, warn};

use super::MqttClient;
use crate::codec::Command;

/// Where engine decisions go. Delivery is fire-and-forget: a failed send is
/// logged by the sink and never reaches the caller.
pub trait CommandSink: Send + Sync {
    fn dispatch(&self, command: &Command);
}

/// Publishes encoded commands on the shared command channel
pub struct MqttDispatcher {
    client: MqttClient,
    topic: String,
    type_key: String,
}

impl MqttDispatcher {
    pub fn new(client: MqttClient, topic: impl Into<String>, type_key: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
            type_key: type_key.into(),
        }
    }
}

impl CommandSink for MqttDispatcher {
    fn dispatch(&self, command: &Command) {
        let payload = command.encode(&self.type_key);
        match self.client.publish_raw(&self.topic, payload.as_bytes()) {
            Ok(()) => debug!("-> {} {}", self.topic, payload),
            Err(e) => warn!(
                "Dropped {} command for seat {}: {}",
                command.name(),
                command.seat_id().unwrap_or("*"),
                e
            ),
        }
    }
}

/// Keeps every dispatched command for inspection
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    sent: parking_lot::Mutex<Vec<Command>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn take(&self) -> Vec<Command> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[cfg(test)]
impl CommandSink for RecordingSink {
    fn dispatch(&self, command: &Command) {
        self.sent.lock().push(command.clone());
    }
}
