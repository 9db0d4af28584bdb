//! Appointment database operations.

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{
    Appointment, AppointmentStatus, AuditAction, ClinicalHistoryRecord, NewRecord, RecordStatus,
};

const APPOINTMENT_COLUMNS: &str = "id, patient_id, doctor_id, scheduled_at, reason, status, updated_at";

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    let status: String = row.get(5)?;
    let status = AppointmentStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            format!("unknown appointment status: {}", status).into(),
        )
    })?;

    Ok(Appointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        scheduled_at: row.get(3)?,
        reason: row.get(4)?,
        status,
        updated_at: row.get(6)?,
    })
}

impl Database {
    /// Insert an appointment and return it with its assigned ID.
    pub fn insert_appointment(&self, appointment: &Appointment) -> DbResult<Appointment> {
        self.conn.execute(
            r#"
            INSERT INTO appointments (patient_id, doctor_id, scheduled_at, reason, status, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                appointment.patient_id,
                appointment.doctor_id,
                appointment.scheduled_at,
                appointment.reason,
                appointment.status.as_str(),
                appointment.updated_at,
            ],
        )?;

        let mut stored = appointment.clone();
        stored.id = self.conn.last_insert_rowid();
        Ok(stored)
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, id: i64) -> DbResult<Option<Appointment>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM appointments WHERE id = ?", APPOINTMENT_COLUMNS),
                [id],
                appointment_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Appointments for a patient, soonest first.
    pub fn list_appointments_for_patient(&self, patient_id: i64) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM appointments WHERE patient_id = ? ORDER BY scheduled_at",
            APPOINTMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([patient_id], appointment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Change an appointment's status.
    pub fn update_appointment_status(&self, id: i64, status: AppointmentStatus) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE appointments SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Open an in-progress record for an appointment and mark the appointment
    /// as in progress.
    pub fn start_record_for_appointment(
        &self,
        appointment_id: i64,
        consultation_date: NaiveDate,
    ) -> DbResult<ClinicalHistoryRecord> {
        let appointment = self
            .get_appointment(appointment_id)?
            .ok_or_else(|| DbError::NotFound(format!("appointment {}", appointment_id)))?;

        if !appointment.status.is_open() {
            return Err(DbError::Constraint(format!(
                "appointment {} is {}",
                appointment_id,
                appointment.status.as_str()
            )));
        }

        let mut new = NewRecord::empty(appointment.patient_id, consultation_date);
        new.doctor_id = appointment.doctor_id;
        new.appointment_id = Some(appointment.id);
        new.status = RecordStatus::InProgress;
        new.audit.user_id = appointment.doctor_id;

        let record = self.insert_record(&new)?;
        self.append_audit(
            record.id,
            AuditAction::Create,
            appointment.doctor_id,
            Some(&format!("from appointment {}", appointment.id)),
            None,
        )?;
        self.update_appointment_status(appointment.id, AppointmentStatus::InProgress)?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Patient;

    fn setup_db() -> (Database, Appointment) {
        let db = Database::open_in_memory().unwrap();
        let patient = db
            .insert_patient(&Patient::new("Ana".into(), Some("Ruiz".into())))
            .unwrap();
        let mut appointment = Appointment::new(patient.id, "2026-03-02T10:00:00Z".into());
        appointment.doctor_id = Some(12);
        appointment.reason = Some("Revisión".into());
        let appointment = db.insert_appointment(&appointment).unwrap();
        (db, appointment)
    }

    #[test]
    fn test_insert_and_list() {
        let (db, appointment) = setup_db();
        let fetched = db.get_appointment(appointment.id).unwrap().unwrap();
        assert_eq!(fetched.status, AppointmentStatus::Scheduled);
        assert_eq!(fetched.reason.as_deref(), Some("Revisión"));

        let list = db
            .list_appointments_for_patient(appointment.patient_id)
            .unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_start_record_for_appointment() {
        let (db, appointment) = setup_db();
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let record = db.start_record_for_appointment(appointment.id, date).unwrap();
        assert_eq!(record.status, RecordStatus::InProgress);
        assert_eq!(record.appointment_id, Some(appointment.id));
        assert_eq!(record.doctor_id, Some(12));

        let appointment = db.get_appointment(appointment.id).unwrap().unwrap();
        assert_eq!(appointment.status, AppointmentStatus::InProgress);

        assert_eq!(db.list_audit(record.id).unwrap()[0].action, AuditAction::Create);
    }

    #[test]
    fn test_cancelled_appointment_cannot_start() {
        let (db, appointment) = setup_db();
        db.update_appointment_status(appointment.id, AppointmentStatus::Cancelled)
            .unwrap();

        let err = db
            .start_record_for_appointment(appointment.id, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }
}
