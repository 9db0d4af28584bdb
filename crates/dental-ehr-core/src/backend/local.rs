//! In-process record service over the SQLite store.

use tracing::{debug, info};

use super::{BackendError, BackendResult, HistoryBackend};
use crate::db::{Database, DbError, PatientDebugInfo};
use crate::models::{
    Appointment, AuditAction, ClinicalHistoryRecord, DiagnosisTreatment, NewRecord, RecordPatch,
    RecordStatus,
};

impl From<DbError> for BackendError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => BackendError::NotFound(what),
            DbError::Constraint(msg) => BackendError::Validation(msg),
            other => BackendError::Server {
                status: 500,
                message: other.to_string(),
            },
        }
    }
}

impl Database {
    fn require_record(&self, id: i64) -> BackendResult<ClinicalHistoryRecord> {
        self.get_record(id)?
            .ok_or_else(|| BackendError::NotFound(format!("clinical history {}", id)))
    }
}

impl HistoryBackend for Database {
    fn create_record(&self, record: &NewRecord) -> BackendResult<ClinicalHistoryRecord> {
        if self.get_patient(record.patient_id)?.is_none() {
            return Err(BackendError::Validation(format!(
                "patient {} does not exist",
                record.patient_id
            )));
        }

        let created = self.insert_record(record)?;
        self.append_audit(
            created.id,
            AuditAction::Create,
            record.audit.user_id,
            None,
            record.audit.ip.as_deref(),
        )?;
        info!(
            history_id = created.id,
            patient_id = created.patient_id,
            status = %created.status,
            "clinical history created"
        );
        Ok(created)
    }

    fn get_record(&self, id: i64) -> BackendResult<ClinicalHistoryRecord> {
        let record = self.require_record(id)?;
        self.append_audit(id, AuditAction::View, None, None, None)?;
        Ok(record)
    }

    fn update_record(&self, id: i64, patch: &RecordPatch) -> BackendResult<ClinicalHistoryRecord> {
        let before = self.require_record(id)?;
        let updated = self.patch_record(id, patch)?;

        let (action, details) = match patch.status {
            Some(RecordStatus::Archived) if before.status != RecordStatus::Archived => {
                (AuditAction::Archive, None)
            }
            Some(next) if next != before.status => (
                AuditAction::StatusChange,
                Some(format!("{} -> {}", before.status, next)),
            ),
            _ => (AuditAction::Update, None),
        };
        self.append_audit(id, action, patch.updated_by, details.as_deref(), None)?;

        debug!(history_id = id, action = action.as_str(), "clinical history updated");
        Ok(updated)
    }

    fn update_diagnosis_treatment(
        &self,
        id: i64,
        body: &DiagnosisTreatment,
    ) -> BackendResult<ClinicalHistoryRecord> {
        self.update_record(id, &body.clone().into())
    }

    fn list_patient_records(&self, patient_id: i64) -> BackendResult<Vec<ClinicalHistoryRecord>> {
        Ok(self.list_records_for_patient(patient_id, false)?)
    }

    fn archive_record(&self, id: i64, user_id: Option<i64>) -> BackendResult<ClinicalHistoryRecord> {
        self.update_record(
            id,
            &RecordPatch {
                status: Some(RecordStatus::Archived),
                updated_by: user_id,
                ..RecordPatch::default()
            },
        )
    }

    fn debug_patient(&self, patient_id: i64) -> BackendResult<PatientDebugInfo> {
        Ok(Database::debug_patient(self, patient_id)?)
    }

    fn list_appointments(&self, patient_id: i64) -> BackendResult<Vec<Appointment>> {
        Ok(self.list_appointments_for_patient(patient_id)?)
    }
}
