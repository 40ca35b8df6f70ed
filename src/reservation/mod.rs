// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Seat and reservation records plus the lifecycle state machine

mod machine;

pub use machine::*;

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Seat state as seen by the front-end and the devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    Free,
    Reserved,
    InUse,
}

impl SeatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatState::Free => "FREE",
            SeatState::Reserved => "RESERVED",
            SeatState::InUse => "IN_USE",
        }
    }

    /// Seat state implied by the statuses of the seat's reservations.
    pub fn derived_from<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ReservationStatus>,
    {
        let mut state = SeatState::Free;
        for status in statuses {
            match status {
                ReservationStatus::InUse => return SeatState::InUse,
                ReservationStatus::Active => state = SeatState::Reserved,
                _ => {}
            }
        }
        state
    }
}

impl fmt::Display for SeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(SeatState::Free),
            "RESERVED" => Ok(SeatState::Reserved),
            "IN_USE" => Ok(SeatState::InUse),
            _ => Err(UnknownState(s.to_string())),
        }
    }
}

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    InUse,
    Done,
    Cancel,
    CancelNoshow,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::InUse => "IN_USE",
            ReservationStatus::Done => "DONE",
            ReservationStatus::Cancel => "CANCEL",
            ReservationStatus::CancelNoshow => "CANCEL_NOSHOW",
            ReservationStatus::Expired => "EXPIRED",
        }
    }

    /// `ACTIVE` or `IN_USE`; at most one live reservation exists per seat.
    pub fn is_live(&self) -> bool {
        matches!(self, ReservationStatus::Active | ReservationStatus::InUse)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(ReservationStatus::Active),
            "IN_USE" => Ok(ReservationStatus::InUse),
            "DONE" => Ok(ReservationStatus::Done),
            "CANCEL" => Ok(ReservationStatus::Cancel),
            "CANCEL_NOSHOW" => Ok(ReservationStatus::CancelNoshow),
            "EXPIRED" => Ok(ReservationStatus::Expired),
            _ => Err(UnknownState(s.to_string())),
        }
    }
}

/// A stored state label that does not name a known state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown state label: {0:?}")]
pub struct UnknownState(pub String);

/// One physical seat
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Seat {
    pub seat_id: String,
    pub display: String,
    pub state: SeatState,
    /// Lighting as last reported by the seat unit
    pub light_on: bool,
    pub light_mode: String,
    pub updated_at: NaiveDateTime,
}

/// A time-bounded claim on a seat
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub id: i64,
    pub seat_id: String,
    pub user: String,
    pub status: ReservationStatus,
    /// Bound card; `None` until first-touch binding at check-in
    pub uid: Option<String>,
    pub reserved_at: NaiveDateTime,
    /// Check-in deadline while `ACTIVE`, end of use while `IN_USE`
    pub expires_at: NaiveDateTime,
    pub checkin_at: Option<NaiveDateTime>,
    pub checkout_at: Option<NaiveDateTime>,
}

impl Reservation {
    /// Latest moment a check-in is still accepted.
    pub fn checkin_deadline(&self, checkin_timeout: Duration) -> NaiveDateTime {
        self.expires_at.min(self.reserved_at + checkin_timeout)
    }

    /// Length of the booking as requested at reservation time.
    pub fn booked_duration(&self) -> Duration {
        self.expires_at - self.reserved_at
    }
}

/// Why an identity event was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenyReason {
    NoReservation,
    WrongCard,
    UidMismatch,
    NoBinding,
    Expired,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NoReservation => "NO_RESERVATION",
            DenyReason::WrongCard => "WRONG_CARD",
            DenyReason::UidMismatch => "UID_MISMATCH",
            DenyReason::NoBinding => "NO_BINDING",
            DenyReason::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical form of a card identifier: trimmed, upper-case, never empty,
/// and safe to place in a device payload.
pub fn normalize_uid(raw: &str) -> Option<String> {
    let uid = raw.trim().to_ascii_uppercase();
    if uid.is_empty() || !crate::codec::is_wire_safe(&uid) {
        None
    } else {
        Some(uid)
    }
}
