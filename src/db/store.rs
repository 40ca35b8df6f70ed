// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Typed queries over one open transaction

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row, Transaction};

use crate::reservation::{Reservation, ReservationStatus, Seat, SeatState};
use crate::telemetry::{OccupancyIncident, TelemetrySample};
use crate::TIMESTAMP_FORMAT;

const RESERVATION_COLUMNS: &str =
    "id, seat_id, user, status, uid, reserved_at, expires_at, checkin_at, checkout_at";

const TELEMETRY_COLUMNS: &str =
    "id, seat_id, temp, humi, lux, tof_mm, object_present, created_at";

/// A reservation about to be inserted
#[derive(Debug, Clone)]
pub struct NewReservation<'a> {
    pub seat_id: &'a str,
    pub user: &'a str,
    pub uid: Option<&'a str>,
    pub reserved_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

/// Transactional view of the record store
pub struct Store<'c> {
    tx: Transaction<'c>,
}

impl<'c> Store<'c> {
    pub(super) fn new(tx: Transaction<'c>) -> Self {
        Self { tx }
    }

    pub fn commit(self) -> rusqlite::Result<()> {
        self.tx.commit()
    }

    // ---- seats ----

    pub fn seat(&self, seat_id: &str) -> rusqlite::Result<Option<Seat>> {
        self.tx
            .query_row(
                "SELECT seat_id, display, state, light_on, light_mode, updated_at FROM seats WHERE seat_id = ?1",
                params![seat_id],
                seat_from_row,
            )
            .optional()
    }

    pub fn seats(&self) -> rusqlite::Result<Vec<Seat>> {
        let mut stmt = self.tx.prepare(
            "SELECT seat_id, display, state, light_on, light_mode, updated_at FROM seats ORDER BY seat_id",
        )?;
        let rows = stmt.query_map([], seat_from_row)?;
        rows.collect()
    }

    pub fn insert_seat_if_missing(
        &self,
        seat_id: &str,
        display: &str,
        now: NaiveDateTime,
    ) -> rusqlite::Result<bool> {
        let inserted = self.tx.execute(
            "INSERT OR IGNORE INTO seats (seat_id, display, state, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![seat_id, display, SeatState::Free.as_str(), fmt_ts(&now)],
        )?;
        Ok(inserted > 0)
    }

    pub fn set_seat_state(
        &self,
        seat_id: &str,
        state: SeatState,
        now: NaiveDateTime,
    ) -> rusqlite::Result<()> {
        self.tx.execute(
            "UPDATE seats SET state = ?1, updated_at = ?2 WHERE seat_id = ?3",
            params![state.as_str(), fmt_ts(&now), seat_id],
        )?;
        Ok(())
    }

    /// Record lighting reported by the seat unit. Returns whether the seat exists.
    pub fn update_seat_lighting(
        &self,
        seat_id: &str,
        light_on: Option<bool>,
        light_mode: Option<&str>,
        now: NaiveDateTime,
    ) -> rusqlite::Result<bool> {
        let updated = self.tx.execute(
            "UPDATE seats SET light_on = COALESCE(?1, light_on), light_mode = COALESCE(?2, light_mode), updated_at = ?3
             WHERE seat_id = ?4",
            params![light_on, light_mode, fmt_ts(&now), seat_id],
        )?;
        Ok(updated > 0)
    }

    // ---- reservations ----

    pub fn reservation(&self, id: i64) -> rusqlite::Result<Option<Reservation>> {
        self.tx
            .query_row(
                &format!("SELECT {} FROM reservations WHERE id = ?1", RESERVATION_COLUMNS),
                params![id],
                reservation_from_row,
            )
            .optional()
    }

    /// The `ACTIVE` or `IN_USE` reservation of a seat, newest first.
    pub fn live_reservation(&self, seat_id: &str) -> rusqlite::Result<Option<Reservation>> {
        self.tx
            .query_row(
                &format!(
                    "SELECT {} FROM reservations WHERE seat_id = ?1 AND status IN (?2, ?3)
                     ORDER BY id DESC LIMIT 1",
                    RESERVATION_COLUMNS
                ),
                params![
                    seat_id,
                    ReservationStatus::Active.as_str(),
                    ReservationStatus::InUse.as_str()
                ],
                reservation_from_row,
            )
            .optional()
    }

    pub fn reservations_with_status(
        &self,
        status: ReservationStatus,
    ) -> rusqlite::Result<Vec<Reservation>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {} FROM reservations WHERE status = ?1 ORDER BY id",
            RESERVATION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![status.as_str()], reservation_from_row)?;
        rows.collect()
    }

    /// Statuses of every live reservation held on a seat.
    pub fn live_statuses(&self, seat_id: &str) -> rusqlite::Result<Vec<ReservationStatus>> {
        let mut stmt = self.tx.prepare(
            "SELECT status FROM reservations WHERE seat_id = ?1 AND status IN (?2, ?3)",
        )?;
        let rows = stmt.query_map(
            params![
                seat_id,
                ReservationStatus::Active.as_str(),
                ReservationStatus::InUse.as_str()
            ],
            |row| parse_label::<ReservationStatus>(row, 0),
        )?;
        rows.collect()
    }

    pub fn insert_reservation(&self, new: &NewReservation<'_>) -> rusqlite::Result<i64> {
        self.tx.execute(
            "INSERT INTO reservations (seat_id, user, status, uid, reserved_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.seat_id,
                new.user,
                ReservationStatus::Active.as_str(),
                new.uid,
                fmt_ts(&new.reserved_at),
                fmt_ts(&new.expires_at)
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Persist the mutable columns of a reservation.
    pub fn update_reservation(&self, reservation: &Reservation) -> rusqlite::Result<()> {
        self.tx.execute(
            "UPDATE reservations SET status = ?1, uid = ?2, expires_at = ?3, checkin_at = ?4, checkout_at = ?5
             WHERE id = ?6",
            params![
                reservation.status.as_str(),
                reservation.uid,
                fmt_ts(&reservation.expires_at),
                reservation.checkin_at.as_ref().map(fmt_ts),
                reservation.checkout_at.as_ref().map(fmt_ts),
                reservation.id
            ],
        )?;
        Ok(())
    }

    // ---- telemetry ----

    pub fn insert_telemetry(&self, sample: &TelemetrySample) -> rusqlite::Result<i64> {
        self.tx.execute(
            "INSERT INTO telemetry (seat_id, temp, humi, lux, tof_mm, object_present, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                sample.seat_id,
                sample.temp,
                sample.humi,
                sample.lux,
                sample.tof_mm,
                sample.object_present,
                fmt_ts(&sample.created_at)
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn latest_telemetry(&self, seat_id: &str) -> rusqlite::Result<Option<TelemetrySample>> {
        self.tx
            .query_row(
                &format!(
                    "SELECT {} FROM telemetry WHERE seat_id = ?1 ORDER BY id DESC LIMIT 1",
                    TELEMETRY_COLUMNS
                ),
                params![seat_id],
                telemetry_from_row,
            )
            .optional()
    }

    pub fn telemetry_count(&self) -> rusqlite::Result<i64> {
        self.tx.query_row("SELECT COUNT(*) FROM telemetry", [], |row| row.get(0))
    }

    // ---- occupancy incidents ----

    pub fn open_incident(&self, seat_id: &str) -> rusqlite::Result<Option<OccupancyIncident>> {
        self.tx
            .query_row(
                "SELECT id, seat_id, opened_at, closed_at, last_tof_mm FROM occupy_incidents
                 WHERE seat_id = ?1 AND closed_at IS NULL ORDER BY id DESC LIMIT 1",
                params![seat_id],
                incident_from_row,
            )
            .optional()
    }

    pub fn incidents(&self, seat_id: &str) -> rusqlite::Result<Vec<OccupancyIncident>> {
        let mut stmt = self.tx.prepare(
            "SELECT id, seat_id, opened_at, closed_at, last_tof_mm FROM occupy_incidents
             WHERE seat_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![seat_id], incident_from_row)?;
        rows.collect()
    }

    pub fn open_incident_for(
        &self,
        seat_id: &str,
        now: NaiveDateTime,
        tof_mm: Option<i64>,
    ) -> rusqlite::Result<i64> {
        self.tx.execute(
            "INSERT INTO occupy_incidents (seat_id, opened_at, closed_at, last_tof_mm) VALUES (?1, ?2, NULL, ?3)",
            params![seat_id, fmt_ts(&now), tof_mm],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Keep the previous reading when the new sample carried none.
    pub fn touch_incident(&self, id: i64, tof_mm: Option<i64>) -> rusqlite::Result<()> {
        self.tx.execute(
            "UPDATE occupy_incidents SET last_tof_mm = COALESCE(?1, last_tof_mm) WHERE id = ?2",
            params![tof_mm, id],
        )?;
        Ok(())
    }

    pub fn close_incident(&self, id: i64, now: NaiveDateTime) -> rusqlite::Result<()> {
        self.tx.execute(
            "UPDATE occupy_incidents SET closed_at = ?1 WHERE id = ?2",
            params![fmt_ts(&now), id],
        )?;
        Ok(())
    }

    // ---- card registry ----

    pub fn user_card(&self, username: &str) -> rusqlite::Result<Option<String>> {
        let uid: Option<Option<String>> = self
            .tx
            .query_row(
                "SELECT uid FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        Ok(uid.flatten().filter(|u| !u.is_empty()))
    }

    pub fn upsert_user_card(
        &self,
        username: &str,
        uid: &str,
        now: NaiveDateTime,
    ) -> rusqlite::Result<()> {
        self.tx.execute(
            "INSERT INTO users (username, uid, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(username) DO UPDATE SET uid = excluded.uid",
            params![username, uid, fmt_ts(&now)],
        )?;
        Ok(())
    }
}

pub(crate) fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let text: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&text, TIMESTAMP_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn parse_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        NaiveDateTime::parse_from_str(&t, TIMESTAMP_FORMAT).map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn parse_label<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn seat_from_row(row: &Row<'_>) -> rusqlite::Result<Seat> {
    Ok(Seat {
        seat_id: row.get(0)?,
        display: row.get(1)?,
        state: parse_label(row, 2)?,
        light_on: row.get(3)?,
        light_mode: row.get(4)?,
        updated_at: parse_ts(row, 5)?,
    })
}

fn reservation_from_row(row: &Row<'_>) -> rusqlite::Result<Reservation> {
    Ok(Reservation {
        id: row.get(0)?,
        seat_id: row.get(1)?,
        user: row.get(2)?,
        status: parse_label(row, 3)?,
        uid: row.get(4)?,
        reserved_at: parse_ts(row, 5)?,
        expires_at: parse_ts(row, 6)?,
        checkin_at: parse_opt_ts(row, 7)?,
        checkout_at: parse_opt_ts(row, 8)?,
    })
}

fn telemetry_from_row(row: &Row<'_>) -> rusqlite::Result<TelemetrySample> {
    Ok(TelemetrySample {
        id: row.get(0)?,
        seat_id: row.get(1)?,
        temp: row.get(2)?,
        humi: row.get(3)?,
        lux: row.get(4)?,
        tof_mm: row.get(5)?,
        object_present: row.get(6)?,
        created_at: parse_ts(row, 7)?,
    })
}

fn incident_from_row(row: &Row<'_>) -> rusqlite::Result<OccupancyIncident> {
    Ok(OccupancyIncident {
        id: row.get(0)?,
        seat_id: row.get(1)?,
        opened_at: parse_ts(row, 2)?,
        closed_at: parse_opt_ts(row, 3)?,
        last_tof_mm: row.get(4)?,
    })
}
