//! Periodic refresh of a patient's appointment statuses.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::backend::{BackendResult, HistoryBackend};
use crate::models::AppointmentStatus;
use crate::timers::IntervalTimer;

/// An appointment whose status differs from the last poll.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentChange {
    pub appointment_id: i64,
    /// `None` the first time the appointment is seen
    pub previous: Option<AppointmentStatus>,
    pub current: AppointmentStatus,
}

pub struct AppointmentStatusPoller {
    patient_id: i64,
    timer: IntervalTimer,
    statuses: BTreeMap<i64, AppointmentStatus>,
}

impl AppointmentStatusPoller {
    /// Returns `None` when `period` is zero.
    pub fn new(patient_id: i64, period: Duration, now: Instant) -> Option<Self> {
        Some(Self {
            patient_id,
            timer: IntervalTimer::new(period, now)?,
            statuses: BTreeMap::new(),
        })
    }

    pub fn status_of(&self, appointment_id: i64) -> Option<AppointmentStatus> {
        self.statuses.get(&appointment_id).copied()
    }

    pub fn time_until_next(&self, now: Instant) -> Duration {
        self.timer.time_until_next(now)
    }

    /// Refresh when the interval has elapsed. Returns no changes otherwise.
    pub fn poll<B: HistoryBackend>(
        &mut self,
        backend: &B,
        now: Instant,
    ) -> BackendResult<Vec<AppointmentChange>> {
        if !self.timer.due(now) {
            return Ok(Vec::new());
        }
        self.refresh(backend)
    }

    /// Refresh now, independent of the interval.
    pub fn refresh<B: HistoryBackend>(&mut self, backend: &B) -> BackendResult<Vec<AppointmentChange>> {
        let appointments = backend.list_appointments(self.patient_id).map_err(|e| {
            warn!(patient_id = self.patient_id, error = %e, "appointment refresh failed");
            e
        })?;

        let mut changes = Vec::new();
        let mut seen = BTreeMap::new();
        for appointment in appointments {
            let previous = self.statuses.get(&appointment.id).copied();
            if previous != Some(appointment.status) {
                changes.push(AppointmentChange {
                    appointment_id: appointment.id,
                    previous,
                    current: appointment.status,
                });
            }
            seen.insert(appointment.id, appointment.status);
        }
        self.statuses = seen;

        debug!(
            patient_id = self.patient_id,
            tracked = self.statuses.len(),
            changed = changes.len(),
            "appointment statuses refreshed"
        );
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{Appointment, Patient};

    #[test]
    fn test_poll_reports_changes_on_interval() {
        let db = Database::open_in_memory().unwrap();
        let patient = db.insert_patient(&Patient::new("Luis".into(), None)).unwrap();
        let appt = db
            .insert_appointment(&Appointment::new(patient.id, "2026-04-01T10:00:00Z".into()))
            .unwrap();

        let t0 = Instant::now();
        let mut poller =
            AppointmentStatusPoller::new(patient.id, Duration::from_secs(60), t0).unwrap();
        assert!(AppointmentStatusPoller::new(patient.id, Duration::ZERO, t0).is_none());

        assert!(poller.poll(&db, t0 + Duration::from_secs(30)).unwrap().is_empty());
        assert_eq!(poller.status_of(appt.id), None);

        let changes = poller.poll(&db, t0 + Duration::from_secs(60)).unwrap();
        assert_eq!(
            changes,
            vec![AppointmentChange {
                appointment_id: appt.id,
                previous: None,
                current: AppointmentStatus::Scheduled,
            }]
        );

        db.update_appointment_status(appt.id, AppointmentStatus::Completed)
            .unwrap();
        assert!(poller.poll(&db, t0 + Duration::from_secs(90)).unwrap().is_empty());

        let changes = poller.poll(&db, t0 + Duration::from_secs(120)).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].previous, Some(AppointmentStatus::Scheduled));
        assert_eq!(poller.status_of(appt.id), Some(AppointmentStatus::Completed));
    }
}
