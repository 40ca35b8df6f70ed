// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Core engine module - serialized transitions and the timeout sweep

mod engine;
mod scheduler;

pub use engine::{Engine, SeatOverview, SweepReport};
pub use scheduler::Scheduler;
