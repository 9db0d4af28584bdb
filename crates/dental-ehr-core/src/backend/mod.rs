//! Record service boundary.
//!
//! The wizard and persistence layer only talk to a [`HistoryBackend`]. Two
//! implementations ship with the crate: [`HttpBackend`] for the clinic's REST
//! service and the in-process service over [`crate::db::Database`].

mod http;
mod local;

pub use http::*;

use thiserror::Error;

use crate::db::PatientDebugInfo;
use crate::models::{
    Appointment, ClinicalHistoryRecord, DiagnosisTreatment, NewRecord, RecordPatch,
};

/// Failures surfaced by a record service.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Network(_) => "network",
            BackendError::NotFound(_) => "not_found",
            BackendError::Forbidden(_) => "forbidden",
            BackendError::Validation(_) => "validation",
            BackendError::Server { .. } => "server",
            BackendError::Decode(_) => "decode",
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Operations the core needs from a clinical history service.
pub trait HistoryBackend {
    /// Create a record from the aggregated form.
    fn create_record(&self, record: &NewRecord) -> BackendResult<ClinicalHistoryRecord>;

    fn get_record(&self, id: i64) -> BackendResult<ClinicalHistoryRecord>;

    /// Partial update. Status may only move forward.
    fn update_record(&self, id: i64, patch: &RecordPatch) -> BackendResult<ClinicalHistoryRecord>;

    fn update_diagnosis_treatment(
        &self,
        id: i64,
        body: &DiagnosisTreatment,
    ) -> BackendResult<ClinicalHistoryRecord>;

    /// A patient's records, newest consultation first. No records is an empty list.
    fn list_patient_records(&self, patient_id: i64) -> BackendResult<Vec<ClinicalHistoryRecord>>;

    /// Soft delete.
    fn archive_record(&self, id: i64, user_id: Option<i64>) -> BackendResult<ClinicalHistoryRecord>;

    fn debug_patient(&self, patient_id: i64) -> BackendResult<PatientDebugInfo>;

    fn list_appointments(&self, patient_id: i64) -> BackendResult<Vec<Appointment>>;
}

impl<T: HistoryBackend + ?Sized> HistoryBackend for &T {
    fn create_record(&self, record: &NewRecord) -> BackendResult<ClinicalHistoryRecord> {
        (**self).create_record(record)
    }

    fn get_record(&self, id: i64) -> BackendResult<ClinicalHistoryRecord> {
        (**self).get_record(id)
    }

    fn update_record(&self, id: i64, patch: &RecordPatch) -> BackendResult<ClinicalHistoryRecord> {
        (**self).update_record(id, patch)
    }

    fn update_diagnosis_treatment(
        &self,
        id: i64,
        body: &DiagnosisTreatment,
    ) -> BackendResult<ClinicalHistoryRecord> {
        (**self).update_diagnosis_treatment(id, body)
    }

    fn list_patient_records(&self, patient_id: i64) -> BackendResult<Vec<ClinicalHistoryRecord>> {
        (**self).list_patient_records(patient_id)
    }

    fn archive_record(&self, id: i64, user_id: Option<i64>) -> BackendResult<ClinicalHistoryRecord> {
        (**self).archive_record(id, user_id)
    }

    fn debug_patient(&self, patient_id: i64) -> BackendResult<PatientDebugInfo> {
        (**self).debug_patient(patient_id)
    }

    fn list_appointments(&self, patient_id: i64) -> BackendResult<Vec<Appointment>> {
        (**self).list_appointments(patient_id)
    }
}
