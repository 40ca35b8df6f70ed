// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Wire codec - device payloads in, device commands out
//!
//! Seat units speak two payload dialects on the inbound channel:
//!
//! ```text
//! type=telemetry&seat_id=A01&temp=23.5&humi=40&lux=300&tof_mm=412
//! {"type":"rfid","seat_id":"A01","uid":"04a1b2c3"}
//! ```
//!
//! Both decode into the same loosely-typed [`Fields`] map, which is then
//! classified and validated exactly once into an [`InboundEvent`]. Nothing
//! past this module looks at raw fields.

mod command;
mod event;

pub use command::*;
pub use event::*;

use serde_json::{Map, Value};
use tracing::debug;

use crate::reservation::normalize_uid;

/// Keys whose presence marks a message as telemetry
const TELEMETRY_KEYS: [&str; 5] = ["temp", "humi", "lux", "tof_mm", "distance_mm"];

/// Loosely-typed field mapping with no required keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Map<String, Value>);

impl Fields {
    /// Parse a raw payload. Never fails; garbage yields an empty map.
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        let text = text.trim();
        if text.is_empty() {
            return Self::default();
        }

        if text.starts_with('{') && text.ends_with('}') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
                return Self(map);
            }
        }

        let mut map = Map::new();
        for pair in text.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    map.insert(key.to_string(), Value::String(value.trim().to_string()));
                }
            }
        }
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Non-empty textual value; scalars are rendered as text.
    pub fn text(&self, key: &str) -> Option<String> {
        let text = match self.0.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            _ => return None,
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        let value = match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        value.is_finite().then_some(value)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|v| v != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Some(true),
                "0" | "false" | "off" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Work out what kind of message this is.
///
/// An explicit `type` field wins, then the channel path, then the shape of
/// the fields themselves.
pub fn classify(topic: &str, fields: &Fields) -> Option<EventKind> {
    if let Some(kind) = fields.text("type").as_deref().and_then(EventKind::from_label) {
        return Some(kind);
    }

    let topic = topic.to_ascii_lowercase();
    if topic.contains("rfid") {
        return Some(EventKind::Identity);
    }
    if topic.contains("telemetry") || topic.contains("sensor") {
        return Some(EventKind::Telemetry);
    }
    if topic.contains("state") {
        return Some(EventKind::State);
    }

    if fields.contains("uid") {
        return Some(EventKind::Identity);
    }
    if TELEMETRY_KEYS.iter().any(|k| fields.contains(k)) {
        return Some(EventKind::Telemetry);
    }
    None
}

/// Decode one inbound message. `None` means drop it.
pub fn decode(topic: &str, payload: &[u8]) -> Option<InboundEvent> {
    let fields = Fields::parse(payload);
    if fields.is_empty() {
        debug!("Dropping empty or unparseable message on {}", topic);
        return None;
    }

    let Some(kind) = classify(topic, &fields) else {
        debug!("Dropping unclassifiable message on {}", topic);
        return None;
    };

    let seat_id = fields.text("seat_id");
    let event = match kind {
        EventKind::Telemetry => InboundEvent::Telemetry(TelemetryReport {
            seat_id,
            temp: fields.float("temp"),
            humi: fields.float("humi"),
            lux: fields.int("lux"),
            tof_mm: fields.int("tof_mm").or_else(|| fields.int("distance_mm")),
            object_present: fields.flag("object_present"),
        }),
        EventKind::State => InboundEvent::State(StateReport {
            seat_id: seat_id?,
            state: fields.text("state"),
            light: fields.flag("light"),
            light_mode: fields.text("light_mode"),
        }),
        EventKind::Identity => {
            let uid = fields.text("uid").as_deref().and_then(normalize_uid);
            let (Some(seat_id), Some(uid)) = (seat_id, uid) else {
                debug!("Dropping identity message without seat or card on {}", topic);
                return None;
            };
            InboundEvent::Identity(IdentityEvent {
                seat_id,
                uid,
                intent: fields.text("cmd").as_deref().and_then(SwipeIntent::from_label),
            })
        }
        EventKind::Sync => InboundEvent::Sync { seat_id: seat_id? },
    };
    Some(event)
}
