// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Database module - the transactional record store behind the engine

mod store;

pub use store::*;

use anyhow::Result;
use chrono::NaiveDateTime;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::codec::is_wire_safe;
use crate::config::{CardBinding, DatabaseConfig, SeatSeed};
use crate::reservation::normalize_uid;

/// Record store handle. Owned by the engine, which serialises all access.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&config.path)?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        "#,
        )?;

        let db = Self { conn };
        db.create_tables()?;

        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    /// Fresh private database, used by tests and dry runs
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS seats (
                seat_id TEXT PRIMARY KEY,
                display TEXT NOT NULL,
                state TEXT NOT NULL,
                light_on INTEGER NOT NULL DEFAULT 0,
                light_mode TEXT NOT NULL DEFAULT 'MANUAL',
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reservations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                seat_id TEXT NOT NULL REFERENCES seats(seat_id),
                user TEXT NOT NULL,
                status TEXT NOT NULL,
                uid TEXT,
                reserved_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                checkin_at TEXT,
                checkout_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_reservations_seat_status ON reservations(seat_id, status);
            CREATE INDEX IF NOT EXISTS idx_reservations_status ON reservations(status);

            -- Append-only
            CREATE TABLE IF NOT EXISTS telemetry (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                seat_id TEXT,
                temp REAL,
                humi REAL,
                lux INTEGER,
                tof_mm INTEGER,
                object_present INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_telemetry_seat ON telemetry(seat_id, id);

            CREATE TABLE IF NOT EXISTS occupy_incidents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                seat_id TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT,
                last_tof_mm INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_incidents_open ON occupy_incidents(seat_id, closed_at);

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                uid TEXT,
                created_at TEXT NOT NULL
            );
        "#,
        )
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> rusqlite::Result<()> {
        self.conn.execute_batch(sql)
    }

    /// Start a transaction. Dropping the returned store without
    /// [`Store::commit`] rolls everything back.
    pub fn transaction(&mut self) -> rusqlite::Result<Store<'_>> {
        Ok(Store::new(self.conn.transaction()?))
    }

    /// Insert configured seats that are not yet known. Existing seats keep
    /// their state.
    pub fn seed(
        &mut self,
        seats: &[SeatSeed],
        cards: &[CardBinding],
        now: NaiveDateTime,
    ) -> crate::error::Result<usize> {
        let store = self.transaction()?;
        let mut added = 0;
        for seat in seats {
            let seat_id = seat.seat_id.trim();
            if seat_id.is_empty() || !is_wire_safe(seat_id) {
                warn!("Ignoring seat with unusable id: {:?}", seat);
                continue;
            }
            if store.insert_seat_if_missing(seat_id, &seat.display, now)? {
                added += 1;
            }
        }
        for card in cards {
            let username = card.username.trim();
            match normalize_uid(&card.uid) {
                Some(uid) if !username.is_empty() => store.upsert_user_card(username, &uid, now)?,
                _ => warn!("Ignoring card binding with empty user or card: {:?}", card),
            }
        }
        store.commit()?;

        if added > 0 {
            info!("Seeded {} new seats", added);
        }
        Ok(added)
    }
}
