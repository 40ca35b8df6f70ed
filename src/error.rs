// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Engine error type

use crate::reservation::{ReservationStatus, SeatState};

/// Errors surfaced to callers of engine operations.
///
/// Identity mismatches are not errors; they are answered with a `deny`
/// command and reported as a normal outcome.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("seat not found: {0}")]
    SeatNotFound(String),

    #[error("seat {seat_id} is not free (currently {state})")]
    SeatNotFree { seat_id: String, state: SeatState },

    #[error("reservation not found: {0}")]
    ReservationNotFound(i64),

    #[error("reservation {id} cannot be cancelled in status {status}")]
    NotCancellable { id: i64, status: ReservationStatus },

    #[error("record store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
