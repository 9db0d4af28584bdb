//! Saving records with local fallback.
//!
//! A save never hard-fails because the backend is down: the record is backed
//! up on the device and the caller gets a synthetic offline ID together with a
//! [`DegradedReason`]. The only error is the case where even the local backup
//! could not be written.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::backend::{BackendError, HistoryBackend};
use crate::files::FileStore;
use crate::models::{ClinicalHistoryForm, ClinicalHistoryRecord, HistoryId, NewRecord, Patient};
use crate::report::{self, GeneratedReport, ReportMeta};
use crate::storage::{LocalStore, StorageError};

/// Why an operation completed in a reduced form.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradedReason {
    #[error("backend unavailable ({backend}): {message}")]
    Offline { backend: String, message: String },

    #[error("PDF generation failed: {message}")]
    PdfFailed { message: String },

    #[error("no PDF to save")]
    PdfUnavailable,

    #[error("saving the PDF failed: {message}")]
    DownloadFailed { message: String },

    #[error("saving the digital version failed: {message}")]
    DigitalVersionFailed { message: String },
}

/// Persistence errors that cannot be degraded away.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("backend failed ({backend}) and the local backup failed too ({storage})")]
    BackupFailed {
        backend: BackendError,
        storage: StorageError,
    },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Result of a save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub history_id: HistoryId,
    pub degraded: Option<DegradedReason>,
    pub message: String,
    /// Local backup key when the backend did not take the save
    pub backup_key: Option<String>,
    /// The stored record when the backend took the save
    pub record: Option<ClinicalHistoryRecord>,
}

impl SaveOutcome {
    pub fn success(&self) -> bool {
        self.degraded.is_none()
    }

    pub fn is_offline(&self) -> bool {
        self.history_id.is_offline()
    }
}

/// Saves records to a backend, falling back to device storage.
pub struct PersistenceService<'a, B> {
    backend: B,
    store: LocalStore<'a>,
    files: &'a FileStore,
}

impl<'a, B: HistoryBackend> PersistenceService<'a, B> {
    pub fn new(backend: B, store: LocalStore<'a>, files: &'a FileStore) -> Self {
        Self {
            backend,
            store,
            files,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &LocalStore<'a> {
        &self.store
    }

    /// Create the record on the backend, or back it up locally.
    pub fn save(&self, record: &NewRecord) -> PersistenceResult<SaveOutcome> {
        match self.backend.create_record(record) {
            Ok(created) => {
                info!(
                    history_id = created.id,
                    patient_id = record.patient_id,
                    "clinical history saved"
                );
                Ok(SaveOutcome {
                    history_id: HistoryId::Server(created.id),
                    degraded: None,
                    message: "Historial clínico guardado correctamente".to_string(),
                    backup_key: None,
                    record: Some(created),
                })
            }
            Err(backend_err) => {
                error!(
                    patient_id = record.patient_id,
                    kind = backend_err.kind(),
                    error = %backend_err,
                    "backend save failed, writing local backup"
                );
                self.note_error("guardar", &backend_err.to_string());

                let backup_key = match self.store.write_backup(record, backend_err.kind(), Utc::now()) {
                    Ok(key) => key,
                    Err(storage) => {
                        error!(patient_id = record.patient_id, error = %storage, "local backup failed");
                        return Err(PersistenceError::BackupFailed {
                            backend: backend_err,
                            storage,
                        });
                    }
                };

                let history_id = HistoryId::offline();
                warn!(history_id = %history_id, backup_key = %backup_key, "saved offline");
                Ok(SaveOutcome {
                    history_id,
                    degraded: Some(DegradedReason::Offline {
                        backend: backend_err.kind().to_string(),
                        message: backend_err.to_string(),
                    }),
                    message: "Sin conexión con el servidor: el historial se guardó en este dispositivo"
                        .to_string(),
                    backup_key: Some(backup_key),
                    record: None,
                })
            }
        }
    }

    /// Render the report PDF.
    pub fn generate_pdf(
        &self,
        form: &ClinicalHistoryForm,
        patient: &Patient,
        meta: &ReportMeta,
    ) -> Result<GeneratedReport, DegradedReason> {
        report::generate(form, patient, meta).map_err(|e| {
            error!(patient_id = form.patient_id, error = %e, "PDF generation failed");
            self.note_error("pdf", &e.to_string());
            DegradedReason::PdfFailed {
                message: e.to_string(),
            }
        })
    }

    /// Write the PDF to the download directory.
    pub fn save_locally(&self, report: &GeneratedReport) -> Result<PathBuf, DegradedReason> {
        self.files
            .save_download(&report.filename, &report.bytes)
            .map_err(|e| {
                error!(filename = %report.filename, error = %e, "saving PDF failed");
                self.note_error("descarga", &e.to_string());
                DegradedReason::DownloadFailed {
                    message: e.to_string(),
                }
            })
    }

    /// Keep a snapshot of the form on the device under its history ID.
    pub fn save_digital_version(
        &self,
        history_id: &HistoryId,
        form: &ClinicalHistoryForm,
    ) -> Result<String, DegradedReason> {
        self.store
            .save_digital_version(history_id, form, Utc::now())
            .map_err(|e| {
                error!(history_id = %history_id, error = %e, "saving digital version failed");
                self.note_error("version_digital", &e.to_string());
                DegradedReason::DigitalVersionFailed {
                    message: e.to_string(),
                }
            })
    }

    /// Append to the local error ring buffer. Never fails.
    pub fn note_error(&self, context: &str, message: &str) {
        if let Err(e) = self.store.log_error(context, message, Utc::now()) {
            warn!(error = %e, "could not append to local error log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendResult;
    use crate::config::FileStorageConfig;
    use crate::db::{Database, PatientDebugInfo};
    use crate::models::{Appointment, DiagnosisTreatment, RecordPatch};
    use chrono::NaiveDate;

    struct Unreachable;

    impl HistoryBackend for Unreachable {
        fn create_record(&self, _: &NewRecord) -> BackendResult<ClinicalHistoryRecord> {
            Err(BackendError::Network("connection refused".into()))
        }
        fn get_record(&self, _: i64) -> BackendResult<ClinicalHistoryRecord> {
            Err(BackendError::Network("connection refused".into()))
        }
        fn update_record(&self, _: i64, _: &RecordPatch) -> BackendResult<ClinicalHistoryRecord> {
            Err(BackendError::Network("connection refused".into()))
        }
        fn update_diagnosis_treatment(
            &self,
            _: i64,
            _: &DiagnosisTreatment,
        ) -> BackendResult<ClinicalHistoryRecord> {
            Err(BackendError::Network("connection refused".into()))
        }
        fn list_patient_records(&self, _: i64) -> BackendResult<Vec<ClinicalHistoryRecord>> {
            Err(BackendError::Network("connection refused".into()))
        }
        fn archive_record(&self, _: i64, _: Option<i64>) -> BackendResult<ClinicalHistoryRecord> {
            Err(BackendError::Network("connection refused".into()))
        }
        fn debug_patient(&self, _: i64) -> BackendResult<PatientDebugInfo> {
            Err(BackendError::Network("connection refused".into()))
        }
        fn list_appointments(&self, _: i64) -> BackendResult<Vec<Appointment>> {
            Err(BackendError::Network("connection refused".into()))
        }
    }

    fn files() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(&FileStorageConfig::under(dir.path())).unwrap();
        (dir, store)
    }

    fn record(patient_id: i64) -> NewRecord {
        NewRecord::empty(patient_id, NaiveDate::from_ymd_opt(2026, 5, 4).unwrap())
    }

    #[test]
    fn test_save_to_reachable_backend() {
        let db = Database::open_in_memory().unwrap();
        let patient = db
            .insert_patient(&Patient::new("Ana".into(), None))
            .unwrap();
        let (_dir, files) = files();
        let service = PersistenceService::new(&db, LocalStore::new(&db), &files);

        let outcome = service.save(&record(patient.id)).unwrap();
        assert!(outcome.success());
        assert!(matches!(outcome.history_id, HistoryId::Server(id) if id > 0));
        assert!(outcome.backup_key.is_none());
        assert!(service.store().list_backups(patient.id).unwrap().is_empty());
    }

    #[test]
    fn test_unreachable_backend_saves_offline() {
        let db = Database::open_in_memory().unwrap();
        let (_dir, files) = files();
        let service = PersistenceService::new(Unreachable, LocalStore::new(&db), &files);

        let outcome = service.save(&record(9)).unwrap();
        assert!(!outcome.success());
        assert!(outcome.is_offline());
        assert!(outcome.history_id.to_string().starts_with("offline-"));
        assert!(matches!(
            outcome.degraded,
            Some(DegradedReason::Offline { ref backend, .. }) if backend == "network"
        ));

        let backups = service.store().list_backups(9).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(outcome.backup_key.as_deref(), Some(backups[0].as_str()));
        assert_eq!(service.store().error_log().unwrap().len(), 1);
    }

    #[test]
    fn test_save_locally_writes_download() {
        let db = Database::open_in_memory().unwrap();
        let (_dir, files) = files();
        let service = PersistenceService::new(Unreachable, LocalStore::new(&db), &files);

        let report = GeneratedReport {
            filename: "Historial_Clinico_Ana_2026-05-04_10-00-00.pdf".into(),
            bytes: b"%PDF-1.5".to_vec(),
            page_count: 1,
        };
        let path = service.save_locally(&report).unwrap();
        assert!(path.starts_with(files.download_dir()));
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.5");
    }
}
