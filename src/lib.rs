// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Seatkeeper - seat reservation engine for RFID seat units
//!
//! Seat units report telemetry, lighting state and card swipes over MQTT.
//! The engine turns those into reservation transitions, watches for people
//! sitting where they should not, and sends commands back on one channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Seatkeeper                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  MQTT in ──► Codec ──► ┌────────────────────────────┐        │
//! │                        │  Engine (one lock)         │        │
//! │  Scheduler ──────────► │  ├─ Occupancy monitor      │ ──► Dispatcher ──► MQTT out
//! │                        │  ├─ Seat machine + timers  │        │
//! │  reserve / cancel ───► │  └─ Database (SQLite)      │        │
//! │                        └────────────────────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod reservation;
pub mod streaming;
pub mod telemetry;

// Re-exports for convenience
pub use crate::core::{Engine, Scheduler};
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};

/// Seatkeeper version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Seatkeeper name
pub const NAME: &str = "Seatkeeper";

/// Timestamp layout used in the record store and on the wire
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
