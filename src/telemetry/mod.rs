// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/glowbarn-rs

//! Telemetry and occupancy monitoring
//!
//! Every report is kept. Reports that name a seat are also turned into a
//! presence reading, which drives unauthorized-occupancy incidents here and
//! the absence timers in the reservation machine.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::{Command, TelemetryReport};
use crate::db::Store;
use crate::error::Result;
use crate::reservation::{Seat, SeatState};

/// One stored environment/distance report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub id: i64,
    pub seat_id: Option<String>,
    pub temp: Option<f64>,
    pub humi: Option<f64>,
    pub lux: Option<i64>,
    pub tof_mm: Option<i64>,
    pub object_present: Option<bool>,
    pub created_at: NaiveDateTime,
}

/// Someone sat at a seat nobody reserved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyIncident {
    pub id: i64,
    pub seat_id: String,
    pub opened_at: NaiveDateTime,
    pub closed_at: Option<NaiveDateTime>,
    pub last_tof_mm: Option<i64>,
}

impl OccupancyIncident {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// What a single report changed
#[derive(Debug, Default)]
pub struct Observation {
    pub sample_id: i64,
    /// Seat the report belongs to, as it stood when observed
    pub seat: Option<Seat>,
    pub present: bool,
    pub commands: Vec<Command>,
}

pub struct OccupancyMonitor {
    threshold_mm: i64,
}

impl OccupancyMonitor {
    pub fn new(threshold_mm: i64) -> Self {
        Self { threshold_mm }
    }

    /// Presence from the distance sensor, or the unit's own flag when there
    /// is no usable distance. `None` when the report says nothing either way.
    pub fn presence(&self, report: &TelemetryReport) -> Option<bool> {
        match report.tof_mm {
            Some(mm) if mm > 0 => Some(mm < self.threshold_mm),
            _ => report.object_present,
        }
    }

    /// Persist a report and apply the unauthorized-occupancy rule.
    pub fn observe(
        &self,
        store: &Store<'_>,
        report: &TelemetryReport,
        now: NaiveDateTime,
    ) -> Result<Observation> {
        let presence = self.presence(report);
        let sample_id = store.insert_telemetry(&TelemetrySample {
            id: 0,
            seat_id: report.seat_id.clone(),
            temp: report.temp,
            humi: report.humi,
            lux: report.lux,
            tof_mm: report.tof_mm,
            object_present: presence,
            created_at: now,
        })?;

        let Some(seat_id) = report.seat_id.as_deref() else {
            debug!("Telemetry sample {} stored without a seat", sample_id);
            return Ok(Observation {
                sample_id,
                ..Default::default()
            });
        };
        let Some(seat) = store.seat(seat_id)? else {
            warn!("Telemetry for unknown seat {}", seat_id);
            return Ok(Observation {
                sample_id,
                ..Default::default()
            });
        };

        let present = presence.unwrap_or(false);
        let mut commands = Vec::new();

        if present && seat.state == SeatState::Free {
            match store.open_incident(seat_id)? {
                Some(incident) => store.touch_incident(incident.id, report.tof_mm)?,
                None => {
                    let id = store.open_incident_for(seat_id, now, report.tof_mm)?;
                    info!("Unauthorized occupancy at seat {} (incident {})", seat_id, id);
                    commands.push(Command::OccupyWarn {
                        seat_id: seat_id.to_string(),
                    });
                }
            }
        } else if !present {
            if let Some(incident) = store.open_incident(seat_id)? {
                store.close_incident(incident.id, now)?;
                info!("Seat {} vacated, incident {} closed", seat_id, incident.id);
            }
        }

        Ok(Observation {
            sample_id,
            seat: Some(seat),
            present,
            commands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn report(tof_mm: Option<i64>, object_present: Option<bool>) -> TelemetryReport {
        TelemetryReport {
            seat_id: Some("A01".into()),
            tof_mm,
            object_present,
            ..Default::default()
        }
    }

    #[test]
    fn test_presence_derivation() {
        let monitor = OccupancyMonitor::new(380);
        assert_eq!(monitor.presence(&report(Some(200), Some(false))), Some(true));
        assert_eq!(monitor.presence(&report(Some(380), None)), Some(false));
        assert_eq!(monitor.presence(&report(Some(0), Some(true))), Some(true));
        assert_eq!(monitor.presence(&report(Some(-5), None)), None);
        assert_eq!(monitor.presence(&report(None, None)), None);
    }

    #[test]
    fn test_incident_lifecycle_warns_once() {
        let mut db = Database::open_in_memory().unwrap();
        let store = db.transaction().unwrap();
        store.insert_seat_if_missing("A01", "A-01", t0()).unwrap();
        let monitor = OccupancyMonitor::new(380);

        let first = monitor.observe(&store, &report(Some(200), None), t0()).unwrap();
        assert_eq!(first.commands, vec![Command::OccupyWarn { seat_id: "A01".into() }]);

        let again = monitor
            .observe(&store, &report(Some(150), None), t0() + Duration::seconds(5))
            .unwrap();
        assert!(again.commands.is_empty());
        let open = store.open_incident("A01").unwrap().unwrap();
        assert_eq!(open.last_tof_mm, Some(150));

        // No distance keeps the last one recorded
        monitor
            .observe(&store, &report(None, Some(true)), t0() + Duration::seconds(8))
            .unwrap();
        assert_eq!(store.open_incident("A01").unwrap().unwrap().last_tof_mm, Some(150));

        monitor
            .observe(&store, &report(Some(900), None), t0() + Duration::seconds(10))
            .unwrap();
        assert!(store.open_incident("A01").unwrap().is_none());

        let incidents = store.incidents("A01").unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].closed_at, Some(t0() + Duration::seconds(10)));
        assert_eq!(store.telemetry_count().unwrap(), 4);
    }

    #[test]
    fn test_reserved_seat_never_opens_incident() {
        let mut db = Database::open_in_memory().unwrap();
        let store = db.transaction().unwrap();
        store.insert_seat_if_missing("A01", "A-01", t0()).unwrap();
        store.set_seat_state("A01", SeatState::Reserved, t0()).unwrap();

        let observed = OccupancyMonitor::new(380)
            .observe(&store, &report(Some(100), None), t0())
            .unwrap();
        assert!(observed.present);
        assert!(observed.commands.is_empty());
        assert!(store.incidents("A01").unwrap().is_empty());
    }

    #[test]
    fn test_sample_without_seat_is_stored() {
        let mut db = Database::open_in_memory().unwrap();
        let store = db.transaction().unwrap();

        let observed = OccupancyMonitor::new(380)
            .observe(
                &store,
                &TelemetryReport {
                    temp: Some(22.5),
                    ..Default::default()
                },
                t0(),
            )
            .unwrap();
        assert!(observed.seat.is_none());
        assert_eq!(store.telemetry_count().unwrap(), 1);
    }
}
