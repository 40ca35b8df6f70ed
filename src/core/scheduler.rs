// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Periodic timeout sweep

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use super::{Engine, SweepReport};

pub struct Scheduler {
    engine: Arc<Engine>,
    period: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, period: Duration) -> Self {
        Self {
            engine,
            period: period.max(Duration::from_millis(10)),
        }
    }

    /// One sweep. A failed sweep is retried on the next tick; the time
    /// broadcast goes out either way.
    pub fn tick(&self, now: NaiveDateTime) -> Option<SweepReport> {
        sweep_and_sync(&self.engine, now)
    }

    /// Sweep on a fixed period until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Timeout sweep every {:?}", self.period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // SQLite work stays off the async workers
                    let engine = self.engine.clone();
                    let now = Local::now().naive_local();
                    if let Err(e) = tokio::task::spawn_blocking(move || sweep_and_sync(&engine, now)).await {
                        error!("Sweep task failed: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Scheduler stopping");
                    break;
                }
            }
        }
    }
}

fn sweep_and_sync(engine: &Engine, now: NaiveDateTime) -> Option<SweepReport> {
    let report = match engine.sweep(now) {
        Ok(report) => Some(report),
        Err(e) => {
            error!("Sweep failed: {}", e);
            None
        }
    };
    engine.broadcast_time(now);
    report
}
