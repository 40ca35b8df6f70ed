// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Outbound device commands and their canonical encoding

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::reservation::DenyReason;
use crate::TIMESTAMP_FORMAT;

/// Internal command names that seat units know under another name
const WIRE_RENAMES: [(&str, &str); 1] = [("cancel", "release")];

/// Whether a value can sit inside a `key=value&...` payload without
/// changing its field layout.
pub fn is_wire_safe(value: &str) -> bool {
    !value.chars().any(|c| c == '&' || c == '=' || c.is_control())
}

/// A decision of the engine addressed to the seat units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Command {
    Reserve {
        seat_id: String,
        reservation_id: i64,
        user: String,
        uid: Option<String>,
        expires_at: NaiveDateTime,
    },
    Release {
        seat_id: String,
        reservation_id: Option<i64>,
        reason: ReleaseReason,
    },
    /// Explicit cancel from the front-end; released on the wire
    Cancel { seat_id: String, reservation_id: i64 },
    CheckinOk {
        seat_id: String,
        reservation_id: i64,
        uid: String,
    },
    CheckoutOk {
        seat_id: String,
        reservation_id: i64,
        uid: Option<String>,
        reason: CheckoutReason,
    },
    Deny {
        seat_id: String,
        reason: DenyReason,
        uid: String,
    },
    OccupyWarn { seat_id: String },
    TimeSync { time: NaiveTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReleaseReason {
    Expired,
    Noshow,
    /// Answer to a device refresh request while the seat is free
    Sync,
}

impl ReleaseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseReason::Expired => "expired",
            ReleaseReason::Noshow => "noshow",
            ReleaseReason::Sync => "sync",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckoutReason {
    Card,
    AutoAway,
}

impl CheckoutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutReason::Card => "card",
            CheckoutReason::AutoAway => "auto_away",
        }
    }
}

impl Command {
    /// Engine-side command name
    pub fn name(&self) -> &'static str {
        match self {
            Command::Reserve { .. } => "reserve",
            Command::Release { .. } => "release",
            Command::Cancel { .. } => "cancel",
            Command::CheckinOk { .. } => "checkin_ok",
            Command::CheckoutOk { .. } => "checkout_ok",
            Command::Deny { .. } => "deny",
            Command::OccupyWarn { .. } => "occupy_warn",
            Command::TimeSync { .. } => "time_sync",
        }
    }

    /// Command name as the seat units expect it
    pub fn wire_name(&self) -> &'static str {
        let name = self.name();
        WIRE_RENAMES
            .iter()
            .find(|(from, _)| *from == name)
            .map(|(_, to)| *to)
            .unwrap_or(name)
    }

    pub fn seat_id(&self) -> Option<&str> {
        match self {
            Command::Reserve { seat_id, .. }
            | Command::Release { seat_id, .. }
            | Command::Cancel { seat_id, .. }
            | Command::CheckinOk { seat_id, .. }
            | Command::CheckoutOk { seat_id, .. }
            | Command::Deny { seat_id, .. }
            | Command::OccupyWarn { seat_id } => Some(seat_id),
            Command::TimeSync { .. } => None,
        }
    }

    /// Flat field list in wire order; `None` values are left off the wire.
    pub fn fields(&self) -> Vec<(&'static str, Option<String>)> {
        match self {
            Command::Reserve { seat_id, reservation_id, user, uid, expires_at } => vec![
                ("seat_id", Some(seat_id.clone())),
                ("reservation_id", Some(reservation_id.to_string())),
                ("user", Some(user.clone())),
                ("uid", uid.clone()),
                ("expires_at", Some(expires_at.format(TIMESTAMP_FORMAT).to_string())),
            ],
            Command::Release { seat_id, reservation_id, reason } => vec![
                ("seat_id", Some(seat_id.clone())),
                ("reservation_id", reservation_id.map(|id| id.to_string())),
                ("reason", Some(reason.as_str().to_string())),
            ],
            Command::Cancel { seat_id, reservation_id } => vec![
                ("seat_id", Some(seat_id.clone())),
                ("reservation_id", Some(reservation_id.to_string())),
                ("reason", Some("cancel".to_string())),
            ],
            Command::CheckinOk { seat_id, reservation_id, uid } => vec![
                ("seat_id", Some(seat_id.clone())),
                ("reservation_id", Some(reservation_id.to_string())),
                ("uid", Some(uid.clone())),
            ],
            Command::CheckoutOk { seat_id, reservation_id, uid, reason } => vec![
                ("seat_id", Some(seat_id.clone())),
                ("reservation_id", Some(reservation_id.to_string())),
                ("uid", uid.clone()),
                ("reason", Some(reason.as_str().to_string())),
            ],
            Command::Deny { seat_id, reason, uid } => vec![
                ("seat_id", Some(seat_id.clone())),
                ("reason", Some(reason.as_str().to_string())),
                ("uid", Some(uid.clone())),
            ],
            Command::OccupyWarn { seat_id } => vec![("seat_id", Some(seat_id.clone()))],
            Command::TimeSync { time } => vec![("time", Some(time.format("%H:%M:%S").to_string()))],
        }
    }

    /// Canonical `&`-joined `key=value` form, command name first.
    pub fn encode(&self, type_key: &str) -> String {
        let mut parts = vec![format!("{}={}", type_key, self.wire_name())];
        parts.extend(
            self.fields()
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| format!("{}={}", key, v))),
        );
        parts.join("&")
    }
}
