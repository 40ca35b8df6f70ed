// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Typed inbound device events

use serde::Serialize;

/// One decoded device message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InboundEvent {
    Telemetry(TelemetryReport),
    State(StateReport),
    Identity(IdentityEvent),
    Sync { seat_id: String },
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::Telemetry(_) => EventKind::Telemetry,
            InboundEvent::State(_) => EventKind::State,
            InboundEvent::Identity(_) => EventKind::Identity,
            InboundEvent::Sync { .. } => EventKind::Sync,
        }
    }

    pub fn seat_id(&self) -> Option<&str> {
        match self {
            InboundEvent::Telemetry(t) => t.seat_id.as_deref(),
            InboundEvent::State(s) => Some(&s.seat_id),
            InboundEvent::Identity(i) => Some(&i.seat_id),
            InboundEvent::Sync { seat_id } => Some(seat_id),
        }
    }
}

/// Message class, before field validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Telemetry,
    State,
    Identity,
    Sync,
}

impl EventKind {
    /// Match an explicit `type` label or a channel path segment.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "telemetry" | "sensor" => Some(EventKind::Telemetry),
            "state" => Some(EventKind::State),
            "rfid" | "identity" => Some(EventKind::Identity),
            "sync" => Some(EventKind::Sync),
            _ => None,
        }
    }
}

/// Environment and distance sample; every reading is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryReport {
    pub seat_id: Option<String>,
    pub temp: Option<f64>,
    pub humi: Option<f64>,
    pub lux: Option<i64>,
    pub tof_mm: Option<i64>,
    /// Explicit presence flag sent by some firmware revisions
    pub object_present: Option<bool>,
}

/// Seat unit status report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateReport {
    pub seat_id: String,
    pub state: Option<String>,
    pub light: Option<bool>,
    pub light_mode: Option<String>,
}

/// Card presented at a seat reader
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityEvent {
    pub seat_id: String,
    /// Normalised card identifier
    pub uid: String,
    pub intent: Option<SwipeIntent>,
}

/// What the seat unit believed the swipe was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwipeIntent {
    CheckIn,
    CheckOut,
}

impl SwipeIntent {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "checkin" | "check_in" => Some(SwipeIntent::CheckIn),
            "checkout" | "check_out" => Some(SwipeIntent::CheckOut),
            _ => None,
        }
    }
}
