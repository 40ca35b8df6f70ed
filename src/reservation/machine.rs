// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Reservation state machine
//!
//! ```text
//!            reserve                   card (bind / match)
//!   (none) ──────────► ACTIVE ─────────────────────────► IN_USE
//!                        │  │                             │  │
//!         now>expires_at │  │ no check-in within          │  │ same card again,
//!                        ▼  ▼ checkin timeout             │  │ or away timeout
//!                  EXPIRED  CANCEL_NOSHOW                 │  ▼
//!                                                         │  DONE
//!         cancel (ACTIVE or IN_USE) ──► CANCEL ◄──────────┘
//! ```
//!
//! Every method works inside the caller's transaction and reports what it
//! decided as an [`Outcome`]. Absence timers live here as well, so the only
//! owner of "since when has this seat been empty" is the same component that
//! ends reservations.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

use super::{normalize_uid, DenyReason, Reservation, ReservationStatus, Seat, SeatState};
use crate::codec::{
    is_wire_safe, CheckoutReason, Command, IdentityEvent, ReleaseReason, SwipeIntent,
};
use crate::config::EngineConfig;
use crate::db::{NewReservation, Store};
use crate::error::{Error, Result};

/// A reservation request from the front-end
#[derive(Debug, Clone, Default)]
pub struct ReserveRequest {
    pub seat_id: String,
    pub user: String,
    /// Booked minutes; defaulted and clamped by policy
    pub minutes: Option<i64>,
    /// Card to bind up front; falls back to the user's registered card
    pub uid: Option<String>,
}

/// Result of one transition step
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    pub commands: Vec<Command>,
    /// Seats whose absence timer goes away once the transaction commits
    pub cleared: Vec<String>,
}

impl Outcome {
    fn command(command: Command) -> Self {
        Self {
            commands: vec![command],
            cleared: Vec::new(),
        }
    }

    pub fn merge(&mut self, other: Outcome) {
        self.commands.extend(other.commands);
        self.cleared.extend(other.cleared);
    }
}

/// Owns every seat and reservation transition
pub struct SeatMachine {
    checkin_timeout: Duration,
    away_timeout: Duration,
    default_minutes: i64,
    min_minutes: i64,
    max_minutes: i64,
    absent_since: HashMap<String, NaiveDateTime>,
}

impl SeatMachine {
    pub fn new(config: &EngineConfig) -> Self {
        let min_minutes = config.min_reservation_mins.max(1);
        Self {
            checkin_timeout: Duration::minutes(config.checkin_timeout_mins),
            away_timeout: Duration::minutes(config.away_timeout_mins),
            default_minutes: config.default_reservation_mins,
            min_minutes,
            max_minutes: config.max_reservation_mins.max(min_minutes),
            absent_since: HashMap::new(),
        }
    }

    pub fn absent_since(&self, seat_id: &str) -> Option<NaiveDateTime> {
        self.absent_since.get(seat_id).copied()
    }

    /// Create an `ACTIVE` reservation on a free seat.
    pub fn reserve(
        &self,
        store: &Store<'_>,
        request: &ReserveRequest,
        now: NaiveDateTime,
    ) -> Result<(i64, Outcome)> {
        let seat_id = request.seat_id.trim();
        let user = request.user.trim();
        if seat_id.is_empty() || user.is_empty() {
            return Err(Error::InvalidRequest("seat_id and user are required".into()));
        }
        if !is_wire_safe(seat_id) || !is_wire_safe(user) {
            return Err(Error::InvalidRequest(
                "seat_id and user must not contain '&', '=' or control characters".into(),
            ));
        }

        let minutes = request
            .minutes
            .unwrap_or(self.default_minutes)
            .clamp(self.min_minutes, self.max_minutes);

        let seat = store
            .seat(seat_id)?
            .ok_or_else(|| Error::SeatNotFound(seat_id.to_string()))?;
        if seat.state != SeatState::Free {
            return Err(Error::SeatNotFree {
                seat_id: seat.seat_id,
                state: seat.state,
            });
        }
        if let Some(live) = store.live_reservation(seat_id)? {
            warn!(
                "Seat {} is marked FREE but reservation {} is {}",
                seat_id, live.id, live.status
            );
            return Err(Error::SeatNotFree {
                seat_id: seat.seat_id,
                state: SeatState::derived_from([live.status]),
            });
        }

        let explicit = request.uid.as_deref().filter(|raw| !raw.trim().is_empty());
        let uid = match explicit {
            Some(raw) => Some(normalize_uid(raw).ok_or_else(|| {
                Error::InvalidRequest(format!("invalid card uid {:?}", raw))
            })?),
            None => store.user_card(user)?,
        };
        let expires_at = now + Duration::minutes(minutes);

        let id = store.insert_reservation(&NewReservation {
            seat_id,
            user,
            uid: uid.as_deref(),
            reserved_at: now,
            expires_at,
        })?;
        store.set_seat_state(seat_id, SeatState::Reserved, now)?;

        info!(
            "Reservation {} created: seat {} for {} ({} min, card {})",
            id,
            seat_id,
            user,
            minutes,
            uid.as_deref().unwrap_or("unbound")
        );

        Ok((
            id,
            Outcome::command(Command::Reserve {
                seat_id: seat_id.to_string(),
                reservation_id: id,
                user: user.to_string(),
                uid,
                expires_at,
            }),
        ))
    }

    /// Explicit cancel; allowed while `ACTIVE` and, as an override, `IN_USE`.
    pub fn cancel(&self, store: &Store<'_>, id: i64, now: NaiveDateTime) -> Result<Outcome> {
        let mut reservation = store
            .reservation(id)?
            .ok_or(Error::ReservationNotFound(id))?;
        if reservation.status.is_terminal() {
            return Err(Error::NotCancellable {
                id,
                status: reservation.status,
            });
        }

        let was = reservation.status;
        let mut outcome = Outcome::default();
        self.finish(store, &mut reservation, ReservationStatus::Cancel, now, &mut outcome)?;
        outcome.commands.push(Command::Cancel {
            seat_id: reservation.seat_id.clone(),
            reservation_id: id,
        });

        info!("Reservation {} cancelled (was {})", id, was);
        Ok(outcome)
    }

    /// A card was presented at a seat reader.
    pub fn swipe(
        &self,
        store: &Store<'_>,
        event: &IdentityEvent,
        now: NaiveDateTime,
    ) -> Result<Outcome> {
        let seat_id = event.seat_id.as_str();
        let uid = event.uid.as_str();

        let Some(mut reservation) = store.live_reservation(seat_id)? else {
            return Ok(deny(seat_id, DenyReason::NoReservation, uid));
        };

        match reservation.status {
            ReservationStatus::Active => {
                if now > reservation.checkin_deadline(self.checkin_timeout) {
                    return Ok(deny(seat_id, DenyReason::Expired, uid));
                }
                if let Some(bound) = reservation.uid.as_deref() {
                    if bound != uid {
                        return Ok(deny(seat_id, DenyReason::WrongCard, uid));
                    }
                }
                log_intent(event, SwipeIntent::CheckIn);
                self.check_in(store, &mut reservation, uid, now)
            }
            ReservationStatus::InUse => match reservation.uid.clone() {
                Some(bound) if bound == uid => {
                    log_intent(event, SwipeIntent::CheckOut);
                    let mut outcome = Outcome::default();
                    self.finish(store, &mut reservation, ReservationStatus::Done, now, &mut outcome)?;
                    outcome.commands.push(Command::CheckoutOk {
                        seat_id: seat_id.to_string(),
                        reservation_id: reservation.id,
                        uid: Some(uid.to_string()),
                        reason: CheckoutReason::Card,
                    });
                    info!("Reservation {} checked out at seat {} by card", reservation.id, seat_id);
                    Ok(outcome)
                }
                Some(_) => Ok(deny(seat_id, DenyReason::UidMismatch, uid)),
                None => Ok(deny(seat_id, DenyReason::NoBinding, uid)),
            },
            // live_reservation only yields live statuses
            _ => Ok(deny(seat_id, DenyReason::NoReservation, uid)),
        }
    }

    fn check_in(
        &self,
        store: &Store<'_>,
        reservation: &mut Reservation,
        uid: &str,
        now: NaiveDateTime,
    ) -> Result<Outcome> {
        let booked = reservation.booked_duration();
        let first_touch = reservation.uid.is_none();

        reservation.status = ReservationStatus::InUse;
        reservation.uid = Some(uid.to_string());
        reservation.checkin_at = Some(now);
        reservation.expires_at = now + booked;
        store.update_reservation(reservation)?;
        self.sync_seat(store, &reservation.seat_id, now)?;

        info!(
            "Reservation {} checked in at seat {} with card {}{}",
            reservation.id,
            reservation.seat_id,
            uid,
            if first_touch { " (bound on first touch)" } else { "" }
        );

        Ok(Outcome {
            commands: vec![Command::CheckinOk {
                seat_id: reservation.seat_id.clone(),
                reservation_id: reservation.id,
                uid: uid.to_string(),
            }],
            cleared: vec![reservation.seat_id.clone()],
        })
    }

    /// Expire overdue reservations and cancel no-shows.
    pub fn sweep_reservations(&self, store: &Store<'_>, now: NaiveDateTime) -> Result<Outcome> {
        let mut outcome = Outcome::default();

        for mut reservation in store.reservations_with_status(ReservationStatus::Active)? {
            let (status, reason) = if now > reservation.expires_at {
                (ReservationStatus::Expired, ReleaseReason::Expired)
            } else if now - reservation.reserved_at > self.checkin_timeout {
                (ReservationStatus::CancelNoshow, ReleaseReason::Noshow)
            } else {
                continue;
            };

            self.finish(store, &mut reservation, status, now, &mut outcome)?;
            outcome.commands.push(Command::Release {
                seat_id: reservation.seat_id.clone(),
                reservation_id: Some(reservation.id),
                reason,
            });
            info!(
                "Reservation {} on seat {} ended: {}",
                reservation.id, reservation.seat_id, status
            );
        }

        Ok(outcome)
    }

    /// Force checkout on seats that have been empty for longer than the away timeout.
    pub fn sweep_absence(&self, store: &Store<'_>, now: NaiveDateTime) -> Result<Outcome> {
        let mut due: Vec<(String, NaiveDateTime)> = self
            .absent_since
            .iter()
            .filter(|(_, since)| now - **since > self.away_timeout)
            .map(|(seat, since)| (seat.clone(), *since))
            .collect();
        due.sort();

        let mut outcome = Outcome::default();
        for (seat_id, since) in due {
            match store.live_reservation(&seat_id)? {
                Some(mut reservation) if reservation.status == ReservationStatus::InUse => {
                    self.finish(store, &mut reservation, ReservationStatus::Done, now, &mut outcome)?;
                    outcome.commands.push(Command::CheckoutOk {
                        seat_id: seat_id.clone(),
                        reservation_id: reservation.id,
                        uid: reservation.uid.clone(),
                        reason: CheckoutReason::AutoAway,
                    });
                    info!(
                        "Reservation {} on seat {} auto checked out, away since {}",
                        reservation.id, seat_id, since
                    );
                }
                _ => {
                    debug!("Dropping stale absence timer for seat {}", seat_id);
                    outcome.cleared.push(seat_id);
                }
            }
        }

        Ok(outcome)
    }

    /// Absence timer bookkeeping for one presence observation.
    pub fn note_presence(&mut self, seat: &Seat, present: bool, now: NaiveDateTime) {
        let seat_id = &seat.seat_id;
        if seat.state != SeatState::InUse {
            if self.absent_since.remove(seat_id).is_some() {
                debug!("Seat {} no longer in use, absence timer dropped", seat_id);
            }
            return;
        }

        if present {
            if let Some(since) = self.absent_since.remove(seat_id) {
                debug!("Seat {} occupied again (away since {})", seat_id, since);
            }
        } else {
            self.absent_since.entry(seat_id.clone()).or_insert_with(|| {
                info!("Seat {} in use but empty, absence timer started", seat_id);
                now
            });
        }
    }

    /// Apply the in-memory side of a committed outcome.
    pub fn settle(&mut self, outcome: &Outcome) {
        for seat_id in &outcome.cleared {
            self.absent_since.remove(seat_id);
        }
    }

    /// Commands that bring a seat unit back in line with the record store.
    pub fn refresh(&self, store: &Store<'_>, seat_id: &str, now: NaiveDateTime) -> Result<Outcome> {
        if store.seat(seat_id)?.is_none() {
            debug!("Refresh requested for unknown seat {}", seat_id);
            return Ok(Outcome::default());
        }

        let state = self.sync_seat(store, seat_id, now)?;
        let live = store.live_reservation(seat_id)?;
        let command = match (state, live) {
            (SeatState::Reserved, Some(r)) => Command::Reserve {
                seat_id: r.seat_id,
                reservation_id: r.id,
                user: r.user,
                uid: r.uid,
                expires_at: r.expires_at,
            },
            (SeatState::InUse, Some(Reservation { id, uid: Some(uid), .. })) => Command::CheckinOk {
                seat_id: seat_id.to_string(),
                reservation_id: id,
                uid,
            },
            (SeatState::InUse, Some(r)) => {
                warn!("Reservation {} in use without a bound card", r.id);
                return Ok(Outcome::default());
            }
            _ => Command::Release {
                seat_id: seat_id.to_string(),
                reservation_id: None,
                reason: ReleaseReason::Sync,
            },
        };
        Ok(Outcome::command(command))
    }

    /// Move a live reservation into `status` and bring its seat in line.
    fn finish(
        &self,
        store: &Store<'_>,
        reservation: &mut Reservation,
        status: ReservationStatus,
        now: NaiveDateTime,
        outcome: &mut Outcome,
    ) -> Result<()> {
        reservation.status = status;
        if status == ReservationStatus::Done {
            reservation.checkout_at = Some(now);
        }
        store.update_reservation(reservation)?;
        self.sync_seat(store, &reservation.seat_id, now)?;
        outcome.cleared.push(reservation.seat_id.clone());
        Ok(())
    }

    /// Recompute the seat state from its live reservations.
    fn sync_seat(&self, store: &Store<'_>, seat_id: &str, now: NaiveDateTime) -> Result<SeatState> {
        let derived = SeatState::derived_from(store.live_statuses(seat_id)?);
        if let Some(seat) = store.seat(seat_id)? {
            if seat.state != derived {
                store.set_seat_state(seat_id, derived, now)?;
                debug!("Seat {}: {} -> {}", seat_id, seat.state, derived);
            }
        }
        Ok(derived)
    }
}

fn deny(seat_id: &str, reason: DenyReason, uid: &str) -> Outcome {
    info!("Denied card {} at seat {}: {}", uid, seat_id, reason);
    Outcome::command(Command::Deny {
        seat_id: seat_id.to_string(),
        reason,
        uid: uid.to_string(),
    })
}

/// Cards toggle; the declared intent is only reported.
fn log_intent(event: &IdentityEvent, action: SwipeIntent) {
    if let Some(intent) = event.intent {
        if intent != action {
            debug!(
                "Seat {} declared {:?} but card {} toggles to {:?}",
                event.seat_id, intent, event.uid, action
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn setup() -> (Database, SeatMachine) {
        let mut db = Database::open_in_memory().unwrap();
        let store = db.transaction().unwrap();
        store.insert_seat_if_missing("A01", "A-01", t0()).unwrap();
        store.commit().unwrap();
        (db, SeatMachine::new(&EngineConfig::default()))
    }

    fn card(uid: &str) -> IdentityEvent {
        IdentityEvent {
            seat_id: "A01".into(),
            uid: uid.into(),
            intent: None,
        }
    }

    #[test]
    fn test_minutes_are_clamped() {
        let (mut db, machine) = setup();
        let store = db.transaction().unwrap();
        let (id, _) = machine
            .reserve(
                &store,
                &ReserveRequest {
                    seat_id: " A01 ".into(),
                    user: "alice".into(),
                    minutes: Some(2),
                    uid: None,
                },
                t0(),
            )
            .unwrap();
        let r = store.reservation(id).unwrap().unwrap();
        assert_eq!(r.expires_at - r.reserved_at, Duration::minutes(10));
    }

    #[test]
    fn test_reserve_rejects_bad_requests() {
        let (mut db, machine) = setup();
        let store = db.transaction().unwrap();
        let request = |seat: &str, user: &str| ReserveRequest {
            seat_id: seat.into(),
            user: user.into(),
            ..Default::default()
        };

        assert!(matches!(
            machine.reserve(&store, &request("A01", " "), t0()),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            machine.reserve(&store, &request("A01", "bob&type=release&seat_id=A02"), t0()),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            machine.reserve(&store, &request("A01&x=1", "bob"), t0()),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            machine.reserve(
                &store,
                &ReserveRequest {
                    uid: Some("04A1=B2".into()),
                    ..request("A01", "bob")
                },
                t0()
            ),
            Err(Error::InvalidRequest(_))
        ));
        assert!(store.live_reservation("A01").unwrap().is_none());
        assert!(matches!(
            machine.reserve(&store, &request("Z99", "alice"), t0()),
            Err(Error::SeatNotFound(_))
        ));
        machine.reserve(&store, &request("A01", "alice"), t0()).unwrap();
        assert!(matches!(
            machine.reserve(&store, &request("A01", "bob"), t0()),
            Err(Error::SeatNotFree { state: SeatState::Reserved, .. })
        ));
    }

    #[test]
    fn test_registered_card_is_prebound() {
        let (mut db, machine) = setup();
        let store = db.transaction().unwrap();
        store.upsert_user_card("alice", "CAFE01", t0()).unwrap();

        let (id, outcome) = machine
            .reserve(
                &store,
                &ReserveRequest {
                    seat_id: "A01".into(),
                    user: "alice".into(),
                    ..Default::default()
                },
                t0(),
            )
            .unwrap();
        assert_eq!(store.reservation(id).unwrap().unwrap().uid.as_deref(), Some("CAFE01"));
        assert!(matches!(
            &outcome.commands[0],
            Command::Reserve { uid: Some(uid), .. } if uid == "CAFE01"
        ));

        let denied = machine.swipe(&store, &card("BEEF02"), t0()).unwrap();
        assert!(matches!(
            &denied.commands[0],
            Command::Deny { reason: DenyReason::WrongCard, .. }
        ));
        assert_eq!(
            store.reservation(id).unwrap().unwrap().status,
            ReservationStatus::Active
        );
    }

    #[test]
    fn test_checkin_rederives_end_of_use() {
        let (mut db, machine) = setup();
        let store = db.transaction().unwrap();
        let (id, _) = machine
            .reserve(
                &store,
                &ReserveRequest {
                    seat_id: "A01".into(),
                    user: "alice".into(),
                    minutes: Some(60),
                    uid: None,
                },
                t0(),
            )
            .unwrap();

        let at = t0() + Duration::minutes(5);
        let outcome = machine.swipe(&store, &card("04A1B2"), at).unwrap();
        assert_eq!(outcome.cleared, vec!["A01".to_string()]);

        let r = store.reservation(id).unwrap().unwrap();
        assert_eq!(r.status, ReservationStatus::InUse);
        assert_eq!(r.checkin_at, Some(at));
        assert_eq!(r.expires_at, at + Duration::minutes(60));
        assert_eq!(store.seat("A01").unwrap().unwrap().state, SeatState::InUse);
    }

    #[test]
    fn test_late_checkin_is_denied_without_mutation() {
        let (mut db, machine) = setup();
        let store = db.transaction().unwrap();
        let (id, _) = machine
            .reserve(
                &store,
                &ReserveRequest {
                    seat_id: "A01".into(),
                    user: "alice".into(),
                    ..Default::default()
                },
                t0(),
            )
            .unwrap();

        let outcome = machine
            .swipe(&store, &card("04A1B2"), t0() + Duration::minutes(16))
            .unwrap();
        assert!(matches!(
            &outcome.commands[0],
            Command::Deny { reason: DenyReason::Expired, .. }
        ));
        let r = store.reservation(id).unwrap().unwrap();
        assert_eq!(r.status, ReservationStatus::Active);
        assert_eq!(r.uid, None);
    }

    #[test]
    fn test_presence_only_tracked_while_in_use() {
        let (_db, mut machine) = setup();
        let mut seat = Seat {
            seat_id: "A01".into(),
            display: "A-01".into(),
            state: SeatState::Reserved,
            light_on: false,
            light_mode: "MANUAL".into(),
            updated_at: t0(),
        };

        machine.note_presence(&seat, false, t0());
        assert_eq!(machine.absent_since("A01"), None);

        seat.state = SeatState::InUse;
        machine.note_presence(&seat, false, t0());
        machine.note_presence(&seat, false, t0() + Duration::minutes(3));
        assert_eq!(machine.absent_since("A01"), Some(t0()));

        machine.note_presence(&seat, true, t0() + Duration::minutes(4));
        assert_eq!(machine.absent_since("A01"), None);
    }
}
