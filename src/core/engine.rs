// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Seat engine - the single serialized entry point for every transition
//!
//! Device messages, the periodic sweep and front-end requests all come
//! through here. Each call takes the ledger lock, runs inside one store
//! transaction, commits, and only then touches in-memory timers and sends
//! the resulting commands.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::codec::{self, CheckoutReason, Command, InboundEvent, ReleaseReason, StateReport};
use crate::config::{CardBinding, EngineConfig, SeatSeed};
use crate::db::{Database, Store};
use crate::error::{Error, Result};
use crate::reservation::{
    normalize_uid, Outcome, Reservation, ReserveRequest, Seat, SeatMachine, SeatState,
};
use crate::streaming::CommandSink;
use crate::telemetry::{OccupancyIncident, OccupancyMonitor, TelemetrySample};

/// Everything guarded by the engine lock
struct Ledger {
    db: Database,
    machine: SeatMachine,
    monitor: OccupancyMonitor,
}

/// Main seat engine
pub struct Engine {
    ledger: Mutex<Ledger>,
    sink: Arc<dyn CommandSink>,
    online_window: Duration,
}

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub no_shows: usize,
    pub auto_checkouts: usize,
}

impl SweepReport {
    fn from_commands(commands: &[Command]) -> Self {
        let mut report = Self::default();
        for command in commands {
            match command {
                Command::Release { reason: ReleaseReason::Expired, .. } => report.expired += 1,
                Command::Release { reason: ReleaseReason::Noshow, .. } => report.no_shows += 1,
                Command::CheckoutOk { reason: CheckoutReason::AutoAway, .. } => {
                    report.auto_checkouts += 1
                }
                _ => {}
            }
        }
        report
    }

    pub fn is_empty(&self) -> bool {
        self.expired == 0 && self.no_shows == 0 && self.auto_checkouts == 0
    }
}

/// Dashboard row for one seat
#[derive(Debug, Clone, Serialize)]
pub struct SeatOverview {
    pub seat: Seat,
    pub reservation: Option<Reservation>,
    pub incident_open: bool,
    pub telemetry: Option<TelemetrySample>,
    pub online: bool,
}

impl Engine {
    pub fn new(config: &EngineConfig, db: Database, sink: Arc<dyn CommandSink>) -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                db,
                machine: SeatMachine::new(config),
                monitor: OccupancyMonitor::new(config.occupied_threshold_mm),
            }),
            sink,
            online_window: Duration::seconds(config.online_window_secs),
        }
    }

    /// Create configured seats and card bindings.
    pub fn seed(&self, seats: &[SeatSeed], cards: &[CardBinding], now: NaiveDateTime) -> Result<usize> {
        self.ledger.lock().db.seed(seats, cards, now)
    }

    /// Entry point for raw device messages. Never fails: bad payloads are
    /// dropped and store errors are logged.
    pub fn handle_message(&self, topic: &str, payload: &[u8], now: NaiveDateTime) {
        let Some(event) = codec::decode(topic, payload) else {
            return;
        };
        let kind = event.kind();
        let seat = event.seat_id().unwrap_or("-").to_string();
        if let Err(e) = self.handle_event(event, now) {
            error!("Failed to handle {:?} message for seat {} on {}: {}", kind, seat, topic, e);
        }
    }

    pub fn handle_event(&self, event: InboundEvent, now: NaiveDateTime) -> Result<()> {
        match event {
            InboundEvent::Telemetry(report) => {
                let mut ledger = self.ledger.lock();
                let Ledger { db, machine, monitor } = &mut *ledger;

                let store = db.transaction()?;
                let observation = monitor.observe(&store, &report, now)?;
                store.commit()?;

                if let Some(seat) = &observation.seat {
                    machine.note_presence(seat, observation.present, now);
                }
                self.send(&observation.commands);
                Ok(())
            }
            InboundEvent::State(report) => {
                let mut ledger = self.ledger.lock();
                let store = ledger.db.transaction()?;
                apply_state_report(&store, &report, now)?;
                store.commit()?;
                Ok(())
            }
            InboundEvent::Identity(identity) => {
                self.transition(|store, machine| Ok(((), machine.swipe(store, &identity, now)?)))
            }
            InboundEvent::Sync { seat_id } => self.transition(|store, machine| {
                let mut outcome = Outcome::default();
                outcome.commands.push(Command::TimeSync { time: now.time() });
                outcome.merge(machine.refresh(store, &seat_id, now)?);
                Ok(((), outcome))
            }),
        }
    }

    /// Create a reservation on behalf of a user.
    pub fn reserve(&self, request: &ReserveRequest, now: NaiveDateTime) -> Result<i64> {
        self.transition(|store, machine| machine.reserve(store, request, now))
    }

    /// Cancel a live reservation.
    pub fn cancel(&self, reservation_id: i64, now: NaiveDateTime) -> Result<()> {
        self.transition(|store, machine| Ok(((), machine.cancel(store, reservation_id, now)?)))
    }

    /// Register (or replace) the card a user's future reservations are bound to.
    pub fn register_card(&self, user: &str, uid: &str, now: NaiveDateTime) -> Result<()> {
        let user = user.trim();
        let uid = normalize_uid(uid)
            .filter(|_| !user.is_empty())
            .ok_or_else(|| Error::InvalidRequest("user and card uid are required".into()))?;

        let mut ledger = self.ledger.lock();
        let store = ledger.db.transaction()?;
        store.upsert_user_card(user, &uid, now)?;
        store.commit()?;
        info!("Card {} registered for {}", uid, user);
        Ok(())
    }

    /// Apply every time-based transition that is due.
    pub fn sweep(&self, now: NaiveDateTime) -> Result<SweepReport> {
        let report = self.transition(|store, machine| {
            let mut outcome = machine.sweep_reservations(store, now)?;
            outcome.merge(machine.sweep_absence(store, now)?);
            Ok((SweepReport::from_commands(&outcome.commands), outcome))
        })?;

        if report.is_empty() {
            debug!("Sweep at {}: nothing due", now);
        } else {
            info!(
                "Sweep at {}: {} expired, {} no-shows, {} auto checkouts",
                now, report.expired, report.no_shows, report.auto_checkouts
            );
        }
        Ok(report)
    }

    /// Tell every seat unit the current local time.
    pub fn broadcast_time(&self, now: NaiveDateTime) {
        self.sink.dispatch(&Command::TimeSync { time: now.time() });
    }

    /// Per-seat status for dashboards.
    pub fn overview(&self, now: NaiveDateTime) -> Result<Vec<SeatOverview>> {
        let mut ledger = self.ledger.lock();
        let store = ledger.db.transaction()?;

        let mut rows = Vec::new();
        for seat in store.seats()? {
            let reservation = store.live_reservation(&seat.seat_id)?;
            let incident_open = store.open_incident(&seat.seat_id)?.is_some();
            let telemetry = store.latest_telemetry(&seat.seat_id)?;
            let online = telemetry
                .as_ref()
                .is_some_and(|t| now - t.created_at <= self.online_window);
            rows.push(SeatOverview {
                seat,
                reservation,
                incident_open,
                telemetry,
                online,
            });
        }
        Ok(rows)
    }

    pub fn reservation(&self, id: i64) -> Result<Option<Reservation>> {
        let mut ledger = self.ledger.lock();
        let store = ledger.db.transaction()?;
        Ok(store.reservation(id)?)
    }

    pub fn incidents(&self, seat_id: &str) -> Result<Vec<OccupancyIncident>> {
        let mut ledger = self.ledger.lock();
        let store = ledger.db.transaction()?;
        Ok(store.incidents(seat_id)?)
    }

    /// Run one state-machine step in a transaction, then settle timers and
    /// send commands. Nothing is sent if the step or the commit fails.
    fn transition<T, F>(&self, step: F) -> Result<T>
    where
        F: FnOnce(&Store<'_>, &SeatMachine) -> Result<(T, Outcome)>,
    {
        let mut ledger = self.ledger.lock();
        let Ledger { db, machine, .. } = &mut *ledger;

        let store = db.transaction()?;
        let (value, outcome) = step(&store, &*machine)?;
        store.commit()?;

        machine.settle(&outcome);
        self.send(&outcome.commands);
        Ok(value)
    }

    fn send(&self, commands: &[Command]) {
        for command in commands {
            self.sink.dispatch(command);
        }
    }
}

/// Device-reported lighting is recorded; the reported state is informational.
fn apply_state_report(store: &Store<'_>, report: &StateReport, now: NaiveDateTime) -> Result<()> {
    let Some(seat) = store.seat(&report.seat_id)? else {
        warn!("State report for unknown seat {}", report.seat_id);
        return Ok(());
    };

    if report.light.is_some() || report.light_mode.is_some() {
        store.update_seat_lighting(&seat.seat_id, report.light, report.light_mode.as_deref(), now)?;
    }

    if let Some(reported) = report.state.as_deref() {
        match reported.parse::<SeatState>() {
            Ok(state) if state != seat.state => warn!(
                "Seat {} reports {} but is {}",
                seat.seat_id, state, seat.state
            ),
            Ok(_) => {}
            Err(e) => debug!("Seat {} sent {}", seat.seat_id, e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::{DenyReason, ReservationStatus};
    use crate::streaming::RecordingSink;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn mins(n: i64) -> NaiveDateTime {
        t0() + Duration::minutes(n)
    }

    fn engine() -> (Engine, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let engine = Engine::new(
            &EngineConfig::default(),
            Database::open_in_memory().unwrap(),
            sink.clone(),
        );
        engine.seed(&SeatSeed::stock_layout(3), &[], t0()).unwrap();
        (engine, sink)
    }

    fn reserve(engine: &Engine, seat: &str, minutes: i64, at: NaiveDateTime) -> i64 {
        engine
            .reserve(
                &ReserveRequest {
                    seat_id: seat.into(),
                    user: "alice".into(),
                    minutes: Some(minutes),
                    uid: None,
                },
                at,
            )
            .unwrap()
    }

    fn swipe(engine: &Engine, seat: &str, uid: &str, at: NaiveDateTime) {
        let payload = format!("seat_id={}&uid={}", seat, uid);
        engine.handle_message(&format!("server/rfid/{}", seat), payload.as_bytes(), at);
    }

    fn distance(engine: &Engine, seat: &str, mm: i64, at: NaiveDateTime) {
        let payload = format!("type=telemetry&seat_id={}&temp=22.1&tof_mm={}", seat, mm);
        engine.handle_message("server/telemetry", payload.as_bytes(), at);
    }

    fn seat_state(engine: &Engine, seat: &str) -> SeatState {
        engine
            .overview(t0())
            .unwrap()
            .into_iter()
            .find(|row| row.seat.seat_id == seat)
            .unwrap()
            .seat
            .state
    }

    fn status(engine: &Engine, id: i64) -> ReservationStatus {
        engine.reservation(id).unwrap().unwrap().status
    }

    #[test]
    fn test_expiry_scenario() {
        let (engine, sink) = engine();
        let id = reserve(&engine, "A01", 120, t0());
        sink.take();

        // Expiry is checked before the check-in timeout
        let report = engine.sweep(mins(121)).unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(status(&engine, id), ReservationStatus::Expired);
        assert_eq!(seat_state(&engine, "A01"), SeatState::Free);
        assert!(sink.take().contains(&Command::Release {
            seat_id: "A01".into(),
            reservation_id: Some(id),
            reason: ReleaseReason::Expired,
        }));
    }

    #[test]
    fn test_noshow_scenario() {
        let (engine, sink) = engine();
        let id = reserve(&engine, "A02", 120, t0());
        sink.take();

        assert!(engine.sweep(mins(15)).unwrap().is_empty());
        assert_eq!(status(&engine, id), ReservationStatus::Active);

        let report = engine.sweep(mins(16)).unwrap();
        assert_eq!(report.no_shows, 1);
        assert_eq!(status(&engine, id), ReservationStatus::CancelNoshow);
        assert_eq!(seat_state(&engine, "A02"), SeatState::Free);
        assert_eq!(
            sink.take(),
            vec![Command::Release {
                seat_id: "A02".into(),
                reservation_id: Some(id),
                reason: ReleaseReason::Noshow,
            }]
        );
    }

    #[test]
    fn test_away_timeout_scenario() {
        let (engine, sink) = engine();
        let id = reserve(&engine, "A01", 120, t0());
        swipe(&engine, "A01", "04a1b2", mins(1));
        assert_eq!(status(&engine, id), ReservationStatus::InUse);

        distance(&engine, "A01", 250, mins(2));
        distance(&engine, "A01", 900, mins(10));
        // Duplicate delivery must not restart the timer
        distance(&engine, "A01", 900, mins(20));
        sink.take();

        assert!(engine.sweep(mins(30)).unwrap().is_empty());
        let report = engine.sweep(mins(31)).unwrap();
        assert_eq!(report.auto_checkouts, 1);

        let reservation = engine.reservation(id).unwrap().unwrap();
        assert_eq!(reservation.status, ReservationStatus::Done);
        assert_eq!(reservation.checkout_at, Some(mins(31)));
        assert_eq!(seat_state(&engine, "A01"), SeatState::Free);
        assert_eq!(
            sink.take(),
            vec![Command::CheckoutOk {
                seat_id: "A01".into(),
                reservation_id: id,
                uid: Some("04A1B2".into()),
                reason: CheckoutReason::AutoAway,
            }]
        );
    }

    #[test]
    fn test_presence_recovery_cancels_away_timeout() {
        let (engine, _sink) = engine();
        let id = reserve(&engine, "A01", 120, t0());
        swipe(&engine, "A01", "04A1B2", mins(1));

        distance(&engine, "A01", 900, mins(2));
        distance(&engine, "A01", 200, mins(12));
        distance(&engine, "A01", 900, mins(15));

        assert!(engine.sweep(mins(30)).unwrap().is_empty());
        assert_eq!(status(&engine, id), ReservationStatus::InUse);
        assert_eq!(engine.sweep(mins(36)).unwrap().auto_checkouts, 1);
    }

    #[test]
    fn test_unauthorized_occupancy_scenario() {
        let (engine, sink) = engine();

        distance(&engine, "A03", 300, t0());
        distance(&engine, "A03", 300, mins(1));
        assert_eq!(sink.take(), vec![Command::OccupyWarn { seat_id: "A03".into() }]);

        let incidents = engine.incidents("A03").unwrap();
        assert_eq!(incidents.len(), 1);
        assert!(incidents[0].is_open());
        assert_eq!(incidents[0].last_tof_mm, Some(300));

        distance(&engine, "A03", 900, mins(2));
        assert!(!engine.incidents("A03").unwrap()[0].is_open());

        // A new sit-down opens a fresh incident
        distance(&engine, "A03", 280, mins(3));
        assert_eq!(sink.take(), vec![Command::OccupyWarn { seat_id: "A03".into() }]);
        assert_eq!(engine.incidents("A03").unwrap().len(), 2);
    }

    #[test]
    fn test_first_touch_binding_and_toggle() {
        let (engine, sink) = engine();
        let id = reserve(&engine, "A01", 60, t0());
        sink.take();

        swipe(&engine, "A01", "04a1b2", mins(3));
        assert_eq!(
            sink.take(),
            vec![Command::CheckinOk {
                seat_id: "A01".into(),
                reservation_id: id,
                uid: "04A1B2".into(),
            }]
        );

        swipe(&engine, "A01", "BEEF01", mins(20));
        assert_eq!(
            sink.take(),
            vec![Command::Deny {
                seat_id: "A01".into(),
                reason: DenyReason::UidMismatch,
                uid: "BEEF01".into(),
            }]
        );
        assert_eq!(status(&engine, id), ReservationStatus::InUse);

        // Same card again checks out
        swipe(&engine, "A01", "04A1B2", mins(40));
        assert_eq!(status(&engine, id), ReservationStatus::Done);
        assert!(matches!(
            sink.take().as_slice(),
            [Command::CheckoutOk { reason: CheckoutReason::Card, .. }]
        ));
        assert_eq!(seat_state(&engine, "A01"), SeatState::Free);
    }

    #[test]
    fn test_prebound_card_rejects_other_cards() {
        let (engine, sink) = engine();
        engine.register_card("bob", "cafe01", t0()).unwrap();
        let id = engine
            .reserve(
                &ReserveRequest {
                    seat_id: "A02".into(),
                    user: "bob".into(),
                    ..Default::default()
                },
                t0(),
            )
            .unwrap();
        sink.take();

        swipe(&engine, "A02", "04A1B2", mins(1));
        assert!(matches!(
            sink.take().as_slice(),
            [Command::Deny { reason: DenyReason::WrongCard, .. }]
        ));
        assert_eq!(status(&engine, id), ReservationStatus::Active);

        swipe(&engine, "A02", "CAFE01", mins(2));
        assert_eq!(status(&engine, id), ReservationStatus::InUse);
    }

    #[test]
    fn test_swipe_without_reservation() {
        let (engine, sink) = engine();
        swipe(&engine, "A01", "04A1B2", t0());
        assert_eq!(
            sink.take(),
            vec![Command::Deny {
                seat_id: "A01".into(),
                reason: DenyReason::NoReservation,
                uid: "04A1B2".into(),
            }]
        );
    }

    #[test]
    fn test_one_live_reservation_per_seat() {
        let (engine, _sink) = engine();
        let first = reserve(&engine, "A01", 60, t0());
        let second = engine.reserve(
            &ReserveRequest {
                seat_id: "A01".into(),
                user: "bob".into(),
                ..Default::default()
            },
            t0(),
        );
        assert!(matches!(second, Err(Error::SeatNotFree { .. })));

        engine.cancel(first, mins(1)).unwrap();
        assert!(matches!(
            engine.cancel(first, mins(2)),
            Err(Error::NotCancellable { status: ReservationStatus::Cancel, .. })
        ));
        assert!(matches!(engine.cancel(999, mins(2)), Err(Error::ReservationNotFound(999))));

        let again = reserve(&engine, "A01", 60, mins(3));
        assert_ne!(again, first);
        assert_eq!(seat_state(&engine, "A01"), SeatState::Reserved);
    }

    #[test]
    fn test_cancel_in_use_clears_absence_timer() {
        let (engine, sink) = engine();
        let id = reserve(&engine, "A01", 60, t0());
        swipe(&engine, "A01", "04A1B2", mins(1));
        distance(&engine, "A01", 900, mins(2));
        sink.take();

        engine.cancel(id, mins(5)).unwrap();
        assert_eq!(
            sink.take(),
            vec![Command::Cancel { seat_id: "A01".into(), reservation_id: id }]
        );

        // A new occupant must not inherit the old timer
        reserve(&engine, "A01", 60, mins(6));
        swipe(&engine, "A01", "BEEF01", mins(7));
        assert!(engine.sweep(mins(25)).unwrap().is_empty());
    }

    #[test]
    fn test_sync_request_replays_state() {
        let (engine, sink) = engine();
        let id = reserve(&engine, "A01", 60, t0());
        sink.take();

        engine.handle_message("server/sync/A01", b"type=sync&seat_id=A01", mins(2));
        let sent = sink.take();
        assert_eq!(sent[0], Command::TimeSync { time: mins(2).time() });
        assert!(matches!(&sent[1], Command::Reserve { reservation_id, .. } if *reservation_id == id));

        engine.handle_message("server/sync/A02", b"type=sync&seat_id=A02", mins(2));
        assert!(matches!(
            sink.take()[1],
            Command::Release { reason: ReleaseReason::Sync, reservation_id: None, .. }
        ));
    }

    #[test]
    fn test_state_report_updates_lighting_only() {
        let (engine, _sink) = engine();
        engine.handle_message(
            "server/state/A01",
            b"seat_id=A01&state=IN_USE&light=1&light_mode=AUTO",
            mins(1),
        );

        let row = engine
            .overview(mins(1))
            .unwrap()
            .into_iter()
            .find(|row| row.seat.seat_id == "A01")
            .unwrap();
        assert_eq!(row.seat.state, SeatState::Free);
        assert!(row.seat.light_on);
        assert_eq!(row.seat.light_mode, "AUTO");
    }

    #[test]
    fn test_overview_online_window() {
        let (engine, _sink) = engine();
        distance(&engine, "A02", 900, t0());

        let rows = engine.overview(t0() + Duration::seconds(30)).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().find(|r| r.seat.seat_id == "A02").unwrap().online);
        assert!(!rows.iter().find(|r| r.seat.seat_id == "A01").unwrap().online);

        let later = engine.overview(mins(5)).unwrap();
        assert!(later.iter().all(|r| !r.online));
    }

    #[test]
    fn test_garbage_is_dropped() {
        let (engine, sink) = engine();
        engine.handle_message("server/rfid/A01", b"\xff\xfe", t0());
        engine.handle_message("server/misc", b"hello", t0());
        engine.handle_message("server/rfid/A01", b"uid=04A1B2", t0());
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_broadcast_time() {
        let (engine, sink) = engine();
        engine.broadcast_time(mins(7));
        assert_eq!(sink.take(), vec![Command::TimeSync { time: mins(7).time() }]);
    }

    #[test]
    fn test_reserve_refuses_values_that_would_rewrite_the_payload() {
        let (engine, sink) = engine();
        let result = engine.reserve(
            &ReserveRequest {
                seat_id: "A01".into(),
                user: "bob&type=release&seat_id=A02".into(),
                ..Default::default()
            },
            t0(),
        );
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
        assert!(matches!(
            engine.register_card("bob", "04A1&seat_id=A02", t0()),
            Err(Error::InvalidRequest(_))
        ));
        assert!(sink.take().is_empty());
        assert_eq!(seat_state(&engine, "A01"), SeatState::Free);
    }

    #[test]
    fn test_concurrent_callers_leave_one_live_reservation() {
        let (engine, _sink) = engine();
        let engine = Arc::new(engine);
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    match i {
                        6 => {
                            swipe(&engine, "A01", "04A1B2", mins(1));
                            false
                        }
                        7 => {
                            engine.sweep(mins(2)).unwrap();
                            false
                        }
                        _ => engine
                            .reserve(
                                &ReserveRequest {
                                    seat_id: "A01".into(),
                                    user: format!("user{}", i),
                                    minutes: Some(60),
                                    uid: None,
                                },
                                t0(),
                            )
                            .is_ok(),
                    }
                })
            })
            .collect();

        let reserved = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(reserved, 1);

        let mut ledger = engine.ledger.lock();
        let store = ledger.db.transaction().unwrap();
        let statuses = store.live_statuses("A01").unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(
            store.seat("A01").unwrap().unwrap().state,
            SeatState::derived_from(statuses)
        );
    }

    #[test]
    fn test_store_failure_rolls_back_and_sends_nothing() {
        let (engine, sink) = engine();
        let in_use = reserve(&engine, "A01", 60, t0());
        swipe(&engine, "A01", "04A1B2", mins(1));
        distance(&engine, "A01", 900, mins(2));
        let waiting = reserve(&engine, "A03", 60, t0());
        sink.take();

        engine
            .ledger
            .lock()
            .db
            .execute_batch(&format!(
                "UPDATE reservations SET checkin_at = 'garbage' WHERE id = {}",
                in_use
            ))
            .unwrap();

        // The no-show on A03 is applied before the unreadable A01 row is hit
        assert!(matches!(engine.sweep(mins(30)), Err(Error::Store(_))));
        assert!(matches!(engine.cancel(in_use, mins(30)), Err(Error::Store(_))));
        assert!(sink.take().is_empty());
        assert_eq!(status(&engine, waiting), ReservationStatus::Active);
        assert_eq!(engine.ledger.lock().machine.absent_since("A01"), Some(mins(2)));

        engine
            .ledger
            .lock()
            .db
            .execute_batch(&format!(
                "UPDATE reservations SET checkin_at = '2026-03-14 09:01:00' WHERE id = {}",
                in_use
            ))
            .unwrap();

        // Retried on the next sweep
        let report = engine.sweep(mins(31)).unwrap();
        assert_eq!(report.no_shows, 1);
        assert_eq!(report.auto_checkouts, 1);
        assert_eq!(status(&engine, waiting), ReservationStatus::CancelNoshow);
        assert_eq!(status(&engine, in_use), ReservationStatus::Done);
        assert_eq!(engine.ledger.lock().machine.absent_since("A01"), None);
    }
}
