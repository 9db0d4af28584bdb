//! Dental EHR Core Library
//!
//! Clinical history capture for a dental clinic: a seven-section wizard with
//! per-section validation, persistence that degrades to device storage when the
//! record service is unreachable, and a paginated PDF report.
//!
//! # Architecture
//!
//! ```text
//! section edits → ClinicalHistoryWizard ──(next)──→ validation
//!                        │                              │
//!                        │                     draft: historial_<patientId>
//!                        │
//!                     (finish)
//!                        │
//!        ┌───────────────▼────────────────┐
//!        │         FinishPipeline         │
//!        │ 1. save ─┬─ HistoryBackend     │
//!        │          └─ local backup       │
//!        │ 2. generate PDF                │
//!        │ 3. save PDF to downloads       │
//!        │ 4. save digital version        │
//!        └───────────────┬────────────────┘
//!                        │
//!               PipelineReport (Done / Degraded per step)
//! ```
//!
//! # Core Principle
//!
//! **Never lose a consultation.** Backend, PDF and file failures degrade to
//! local storage and are reported as values; only a failed local backup is an
//! error, and then the user chooses retry or exit.
//!
//! # Modules
//!
//! - [`config`]: configuration resolved once at startup
//! - [`models`]: patients, appointments, typed sections, records
//! - [`validation`]: per-section completeness checks (fail-open)
//! - [`db`]: SQLite record service store, audit log, versions, attachments
//! - [`storage`]: device-local key/value namespace
//! - [`backend`]: `HistoryBackend` trait, REST client, in-process service
//! - [`persistence`]: save with local fallback
//! - [`report`]: PDF layout and encoding
//! - [`files`]: download/upload directories and expiry cleanup
//! - [`timers`]: debounce and interval timers
//! - [`wizard`]: section state machine and finish pipeline

pub mod backend;
pub mod config;
pub mod db;
pub mod files;
pub mod models;
pub mod persistence;
pub mod report;
pub mod storage;
pub mod text;
pub mod timers;
pub mod validation;
pub mod wizard;

// Re-export commonly used types
pub use backend::{BackendError, HistoryBackend, HttpBackend};
pub use config::{BackendConfig, CoreConfig, FileStorageConfig, WizardTiming};
pub use db::Database;
pub use files::FileStore;
pub use models::{
    Appointment, AppointmentStatus, ClinicalHistoryForm, ClinicalHistoryRecord, HistoryId,
    NewRecord, Patient, RecordStatus, SectionData,
};
pub use persistence::{DegradedReason, PersistenceService, SaveOutcome};
pub use storage::LocalStore;
pub use validation::{validate_section, validate_section_json, ValidationOutcome};
pub use wizard::{ClinicalHistoryWizard, FinishOutcome, FinishPipeline, PipelineReport, Section};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum DentalEhrError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Report error: {0}")]
    ReportError(String),
}

impl From<db::DbError> for DentalEhrError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => DentalEhrError::NotFound(what),
            db::DbError::Constraint(msg) => DentalEhrError::InvalidInput(msg),
            other => DentalEhrError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DentalEhrError {
    fn from(e: serde_json::Error) -> Self {
        DentalEhrError::SerializationError(e.to_string())
    }
}

impl From<BackendError> for DentalEhrError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(what) => DentalEhrError::NotFound(what),
            BackendError::Validation(msg) => DentalEhrError::InvalidInput(msg),
            other => DentalEhrError::BackendError(other.to_string()),
        }
    }
}

impl From<storage::StorageError> for DentalEhrError {
    fn from(e: storage::StorageError) -> Self {
        DentalEhrError::StorageError(e.to_string())
    }
}

impl From<persistence::PersistenceError> for DentalEhrError {
    fn from(e: persistence::PersistenceError) -> Self {
        DentalEhrError::StorageError(e.to_string())
    }
}

impl From<report::ReportError> for DentalEhrError {
    fn from(e: report::ReportError) -> Self {
        DentalEhrError::ReportError(e.to_string())
    }
}

impl From<files::FileError> for DentalEhrError {
    fn from(e: files::FileError) -> Self {
        DentalEhrError::StorageError(e.to_string())
    }
}

impl From<config::ConfigError> for DentalEhrError {
    fn from(e: config::ConfigError) -> Self {
        DentalEhrError::InvalidInput(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for DentalEhrError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        DentalEhrError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, DentalEhrError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| DentalEhrError::InvalidInput(format!("fecha inválida {:?}: {}", raw, e)))
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
#[uniffi::export]
pub fn open_database(path: String, config: FfiCoreConfig) -> Result<Arc<DentalEhrCore>, DentalEhrError> {
    let config = CoreConfig::try_from(config)?;
    let db = Database::open(&path)?;
    DentalEhrCore::build(db, &config)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory(config: FfiCoreConfig) -> Result<Arc<DentalEhrCore>, DentalEhrError> {
    let config = CoreConfig::try_from(config)?;
    let db = Database::open_in_memory()?;
    DentalEhrCore::build(db, &config)
}

/// Validate one section's JSON. Unknown sections and unreadable JSON pass.
#[uniffi::export]
pub fn validate_section_payload(index: u8, json: String) -> FfiValidation {
    let outcome = match serde_json::from_str::<serde_json::Value>(&json) {
        Ok(value) => validate_section_json(index, &value),
        Err(e) => ValidationOutcome {
            section: index,
            is_valid: true,
            errors: Default::default(),
            skipped: Some(validation::SkipReason::Unreadable(e.to_string())),
        },
    };
    outcome.into()
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
///
/// With a configured backend, finished consultations go to the REST record
/// service and fall back to device storage; otherwise they go to `db`.
#[derive(uniffi::Object)]
pub struct DentalEhrCore {
    db: Arc<Mutex<Database>>,
    files: FileStore,
    backend: Option<HttpBackend>,
    error_log_capacity: usize,
}

impl DentalEhrCore {
    fn build(db: Database, config: &CoreConfig) -> Result<Arc<Self>, DentalEhrError> {
        let files = FileStore::open(config.files())?;
        let backend = config.backend().map(HttpBackend::new).transpose()?;
        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            files,
            backend,
            error_log_capacity: config.error_log_capacity(),
        }))
    }

    fn local_store<'a>(&self, db: &'a Database) -> LocalStore<'a> {
        LocalStore::new(db).with_error_log_capacity(self.error_log_capacity)
    }
}

fn run_finish<B: HistoryBackend>(
    service: PersistenceService<'_, B>,
    form: &ClinicalHistoryForm,
    patient: &Patient,
) -> Result<FfiFinishReport, DentalEhrError> {
    let report = FinishPipeline::new(&service).run(form, patient)?;
    Ok(report.into())
}

#[uniffi::export]
impl DentalEhrCore {
    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Register a patient.
    pub fn create_patient(&self, patient: FfiNewPatient) -> Result<FfiPatient, DentalEhrError> {
        let db = self.db.lock()?;
        let created = db.insert_patient(&patient.into())?;
        Ok(created.into())
    }

    pub fn get_patient(&self, id: i64) -> Result<Option<FfiPatient>, DentalEhrError> {
        let db = self.db.lock()?;
        Ok(db.get_patient(id)?.map(|p| p.into()))
    }

    /// Search patients by name.
    pub fn search_patients(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<FfiPatient>, DentalEhrError> {
        let db = self.db.lock()?;
        let patients = db.search_patients(&query, limit as usize)?;
        Ok(patients.into_iter().map(|p| p.into()).collect())
    }

    // =========================================================================
    // Appointment Operations
    // =========================================================================

    pub fn create_appointment(
        &self,
        patient_id: i64,
        scheduled_at: String,
        doctor_id: Option<i64>,
        reason: Option<String>,
    ) -> Result<FfiAppointment, DentalEhrError> {
        let db = self.db.lock()?;
        let mut appointment = Appointment::new(patient_id, scheduled_at);
        appointment.doctor_id = doctor_id;
        appointment.reason = reason;
        Ok(db.insert_appointment(&appointment)?.into())
    }

    pub fn list_appointments(&self, patient_id: i64) -> Result<Vec<FfiAppointment>, DentalEhrError> {
        let db = self.db.lock()?;
        let appointments = db.list_appointments_for_patient(patient_id)?;
        Ok(appointments.into_iter().map(|a| a.into()).collect())
    }

    /// Open an in-progress record for an existing appointment.
    pub fn start_record_for_appointment(
        &self,
        appointment_id: i64,
        consultation_date: String,
    ) -> Result<FfiRecordSummary, DentalEhrError> {
        let date = parse_date(&consultation_date)?;
        let db = self.db.lock()?;
        Ok(db.start_record_for_appointment(appointment_id, date)?.into())
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Save a completed consultation and produce its PDF and digital version.
    ///
    /// `form_json` is a serialized `ClinicalHistoryForm`. The patient must be
    /// registered locally; the record goes to the configured backend.
    pub fn finish_consultation(&self, form_json: String) -> Result<FfiFinishReport, DentalEhrError> {
        let form = ClinicalHistoryForm::from_json(&form_json)?;

        let mut missing = form.missing_identity();
        missing.extend(form.missing_closing_texts());
        if !missing.is_empty() {
            return Err(DentalEhrError::InvalidInput(format!(
                "Campos obligatorios: {}",
                missing.join(", ")
            )));
        }

        let db = self.db.lock()?;
        let patient = db
            .get_patient(form.patient_id)?
            .ok_or_else(|| DentalEhrError::NotFound(format!("patient {}", form.patient_id)))?;

        let store = self.local_store(&db);
        match &self.backend {
            Some(http) => {
                let service = PersistenceService::new(http, store, &self.files);
                run_finish(service, &form, &patient)
            }
            None => {
                let service = PersistenceService::new(&*db, store, &self.files);
                run_finish(service, &form, &patient)
            }
        }
    }

    /// Full record as JSON.
    pub fn get_record_json(&self, id: i64) -> Result<Option<String>, DentalEhrError> {
        let db = self.db.lock()?;
        match db.get_record(id)? {
            Some(record) => Ok(Some(serde_json::to_string(&record)?)),
            None => Ok(None),
        }
    }

    /// A patient's records, newest consultation first. Archived records are hidden.
    pub fn list_patient_records(
        &self,
        patient_id: i64,
    ) -> Result<Vec<FfiRecordSummary>, DentalEhrError> {
        let db = self.db.lock()?;
        let records = db.list_patient_records(patient_id)?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    pub fn update_diagnosis_treatment(
        &self,
        id: i64,
        diagnosis: String,
        treatment: String,
        user_id: Option<i64>,
    ) -> Result<FfiRecordSummary, DentalEhrError> {
        let db = self.db.lock()?;
        let body = models::DiagnosisTreatment {
            diagnostico: diagnosis,
            tratamiento: treatment,
            updated_by: user_id,
        };
        Ok(db.update_diagnosis_treatment(id, &body)?.into())
    }

    /// Move a record forward to `status` ("in_progress", "completed", ...).
    pub fn set_record_status(
        &self,
        id: i64,
        status: String,
        user_id: Option<i64>,
    ) -> Result<FfiRecordSummary, DentalEhrError> {
        let status = RecordStatus::parse(&status)
            .ok_or_else(|| DentalEhrError::InvalidInput(format!("unknown status {:?}", status)))?;
        let db = self.db.lock()?;
        let patch = models::RecordPatch {
            status: Some(status),
            updated_by: user_id,
            ..Default::default()
        };
        Ok(db.update_record(id, &patch)?.into())
    }

    /// Soft delete.
    pub fn archive_record(
        &self,
        id: i64,
        user_id: Option<i64>,
    ) -> Result<FfiRecordSummary, DentalEhrError> {
        let db = self.db.lock()?;
        Ok(db.archive_record(id, user_id)?.into())
    }

    pub fn get_record_stats(&self) -> Result<FfiRecordStats, DentalEhrError> {
        let db = self.db.lock()?;
        Ok(db.record_stats()?.into())
    }

    /// Everything stored for a patient, as JSON.
    pub fn debug_patient_json(&self, patient_id: i64) -> Result<String, DentalEhrError> {
        let db = self.db.lock()?;
        let info = HistoryBackend::debug_patient(&*db, patient_id)?;
        Ok(serde_json::to_string(&info)?)
    }

    // =========================================================================
    // Version Operations
    // =========================================================================

    /// Snapshot the record's current content as a new digital version.
    pub fn create_digital_version(
        &self,
        record_id: i64,
        change_summary: Option<String>,
        created_by: Option<i64>,
    ) -> Result<FfiDigitalVersion, DentalEhrError> {
        let db = self.db.lock()?;
        let record = db
            .get_record(record_id)?
            .ok_or_else(|| DentalEhrError::NotFound(format!("clinical history {}", record_id)))?;
        let snapshot = serde_json::to_string(&ClinicalHistoryForm::from_record(&record))?;
        let version =
            db.create_digital_version(record_id, &snapshot, change_summary.as_deref(), created_by)?;
        Ok(version.into())
    }

    pub fn list_digital_versions(
        &self,
        record_id: i64,
    ) -> Result<Vec<FfiDigitalVersion>, DentalEhrError> {
        let db = self.db.lock()?;
        let versions = db.list_versions(record_id)?;
        Ok(versions.into_iter().map(|v| v.into()).collect())
    }

    /// Recompute hashes and links of the record's version chain.
    pub fn verify_version_chain(&self, record_id: i64) -> Result<bool, DentalEhrError> {
        let db = self.db.lock()?;
        Ok(db.verify_version_chain(record_id)?)
    }

    // =========================================================================
    // PDF Operations
    // =========================================================================

    /// Render a stored record, attach the PDF to it and write a download copy.
    pub fn generate_record_pdf(
        &self,
        record_id: i64,
        user_id: Option<i64>,
    ) -> Result<FfiPdfAttachment, DentalEhrError> {
        let db = self.db.lock()?;
        let record = db
            .get_record(record_id)?
            .ok_or_else(|| DentalEhrError::NotFound(format!("clinical history {}", record_id)))?;
        let patient = db
            .get_patient(record.patient_id)?
            .ok_or_else(|| DentalEhrError::NotFound(format!("patient {}", record.patient_id)))?;

        let meta = report::ReportMeta {
            history_id: Some(HistoryId::Server(record.id)),
            status: record.status,
            generated_at: Local::now(),
        };
        let generated = report::generate(&ClinicalHistoryForm::from_record(&record), &patient, &meta)?;
        let attachment =
            db.insert_pdf_attachment(record.id, &generated.filename, &generated.bytes, user_id)?;
        let path = self.files.save_download(&generated.filename, &generated.bytes)?;

        let mut ffi: FfiPdfAttachment = attachment.into();
        ffi.download_path = Some(path.display().to_string());
        Ok(ffi)
    }

    pub fn verify_pdf_attachment(&self, id: i64) -> Result<bool, DentalEhrError> {
        let db = self.db.lock()?;
        Ok(db.verify_pdf_attachment(id)?)
    }

    // =========================================================================
    // Local Storage Operations
    // =========================================================================

    /// The patient's unfinished wizard form, as JSON.
    pub fn load_draft_json(&self, patient_id: i64) -> Result<Option<String>, DentalEhrError> {
        let db = self.db.lock()?;
        match self.local_store(&db).load_draft(patient_id)? {
            Some(form) => Ok(Some(serde_json::to_string(&form)?)),
            None => Ok(None),
        }
    }

    /// Keys of records saved on the device while the backend was down.
    pub fn list_backups(&self, patient_id: i64) -> Result<Vec<String>, DentalEhrError> {
        let db = self.db.lock()?;
        Ok(self.local_store(&db).list_backups(patient_id)?)
    }

    pub fn get_error_log(&self) -> Result<Vec<FfiErrorLogEntry>, DentalEhrError> {
        let db = self.db.lock()?;
        let entries = self.local_store(&db).error_log()?;
        Ok(entries.into_iter().map(|e| e.into()).collect())
    }

    /// Remove expired downloads and uploads. Returns how many files were removed.
    pub fn cleanup_expired_files(&self) -> Result<u32, DentalEhrError> {
        let report = self.files.cleanup_expired(std::time::SystemTime::now())?;
        Ok(report.removed.len() as u32)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe startup configuration.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCoreConfig {
    /// Downloads and uploads go under this directory
    pub files_root: String,
    /// REST record service origin; `None` keeps records in the local database
    pub backend_url: Option<String>,
    pub auth_token: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub error_log_capacity: Option<u32>,
}

impl FfiCoreConfig {
    /// Local-only configuration rooted at `files_root`.
    pub fn local(files_root: impl Into<String>) -> Self {
        Self {
            files_root: files_root.into(),
            backend_url: None,
            auth_token: None,
            request_timeout_ms: None,
            error_log_capacity: None,
        }
    }
}

impl TryFrom<FfiCoreConfig> for CoreConfig {
    type Error = config::ConfigError;

    fn try_from(c: FfiCoreConfig) -> Result<Self, Self::Error> {
        let mut config = CoreConfig::new(FileStorageConfig::under(&c.files_root));
        if let Some(url) = c.backend_url {
            let mut backend = BackendConfig::new(url)?;
            if let Some(token) = c.auth_token {
                backend = backend.with_auth_token(token);
            }
            if let Some(ms) = c.request_timeout_ms {
                backend = backend.with_request_timeout(std::time::Duration::from_millis(ms))?;
            }
            config = config.with_backend(backend);
        }
        if let Some(capacity) = c.error_log_capacity {
            config = config.with_error_log_capacity(capacity as usize)?;
        }
        Ok(config)
    }
}

/// FFI-safe validation result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiValidation {
    pub section: u8,
    pub is_valid: bool,
    pub errors: HashMap<String, String>,
    pub skipped: Option<String>,
}

impl From<ValidationOutcome> for FfiValidation {
    fn from(outcome: ValidationOutcome) -> Self {
        Self {
            section: outcome.section,
            is_valid: outcome.is_valid,
            errors: outcome.errors.into_iter().collect(),
            skipped: outcome.skipped.map(|reason| match reason {
                validation::SkipReason::UnknownSection(index) => {
                    format!("unknown section {}", index)
                }
                validation::SkipReason::Unreadable(detail) => detail,
            }),
        }
    }
}

/// FFI-safe patient registration.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewPatient {
    pub nombre: String,
    pub apellido_paterno: Option<String>,
    pub apellido_materno: Option<String>,
    pub sexo: Option<String>,
    pub fecha_nacimiento: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
}

impl From<FfiNewPatient> for Patient {
    fn from(p: FfiNewPatient) -> Self {
        let mut patient = Patient::new(p.nombre, p.apellido_paterno);
        patient.apellido_materno = p.apellido_materno;
        patient.sexo = p.sexo;
        patient.fecha_nacimiento = p.fecha_nacimiento;
        patient.telefono = p.telefono;
        patient.email = p.email;
        patient
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: i64,
    pub full_name: String,
    pub nombre: String,
    pub apellido_paterno: Option<String>,
    pub apellido_materno: Option<String>,
    pub sexo: Option<String>,
    pub fecha_nacimiento: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            full_name: patient.full_name(),
            nombre: patient.nombre,
            apellido_paterno: patient.apellido_paterno,
            apellido_materno: patient.apellido_materno,
            sexo: patient.sexo,
            fecha_nacimiento: patient.fecha_nacimiento,
            telefono: patient.telefono,
            email: patient.email,
        }
    }
}

/// FFI-safe appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    pub scheduled_at: String,
    pub reason: Option<String>,
    pub status: String,
}

impl From<Appointment> for FfiAppointment {
    fn from(a: Appointment) -> Self {
        Self {
            id: a.id,
            patient_id: a.patient_id,
            doctor_id: a.doctor_id,
            scheduled_at: a.scheduled_at,
            reason: a.reason,
            status: a.status.as_str().to_string(),
        }
    }
}

/// FFI-safe record listing entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRecordSummary {
    pub id: i64,
    pub patient_id: i64,
    pub appointment_id: Option<i64>,
    pub consultation_date: String,
    pub status: String,
    pub diagnostico: String,
    pub tratamiento: String,
    pub pdf_filename: Option<String>,
    pub updated_at: String,
}

impl From<ClinicalHistoryRecord> for FfiRecordSummary {
    fn from(r: ClinicalHistoryRecord) -> Self {
        Self {
            id: r.id,
            patient_id: r.patient_id,
            appointment_id: r.appointment_id,
            consultation_date: r.consultation_date.format("%Y-%m-%d").to_string(),
            status: r.status.as_str().to_string(),
            diagnostico: r.diagnostico,
            tratamiento: r.tratamiento,
            pdf_filename: r.pdf_filename,
            updated_at: r.updated_at,
        }
    }
}

/// FFI-safe finish result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFinishReport {
    pub history_id: String,
    pub offline: bool,
    pub message: String,
    pub pdf_filename: Option<String>,
    pub pdf_path: Option<String>,
    /// One message per step that fell back or failed
    pub degraded: Vec<String>,
}

impl From<PipelineReport> for FfiFinishReport {
    fn from(report: PipelineReport) -> Self {
        Self {
            history_id: report.history_id.to_string(),
            offline: report.is_offline(),
            degraded: report.degraded_reasons().map(|r| r.to_string()).collect(),
            message: report.message,
            pdf_filename: report.pdf_filename,
            pdf_path: report.pdf_path.map(|p| p.display().to_string()),
        }
    }
}

/// FFI-safe record statistics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRecordStats {
    pub total: u64,
    pub draft: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub archived: u64,
    pub patients: u64,
    pub with_pdf: u64,
    pub latest_consultation: Option<String>,
}

impl From<db::RecordStats> for FfiRecordStats {
    fn from(s: db::RecordStats) -> Self {
        Self {
            total: s.total,
            draft: s.draft,
            in_progress: s.in_progress,
            completed: s.completed,
            archived: s.archived,
            patients: s.patients,
            with_pdf: s.with_pdf,
            latest_consultation: s.latest_consultation.map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

/// FFI-safe digital version.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDigitalVersion {
    pub id: i64,
    pub record_id: i64,
    pub version_number: u32,
    pub previous_version_id: Option<i64>,
    pub content_hash: String,
    pub change_summary: Option<String>,
    pub created_at: String,
}

impl From<models::DigitalVersion> for FfiDigitalVersion {
    fn from(v: models::DigitalVersion) -> Self {
        Self {
            id: v.id,
            record_id: v.record_id,
            version_number: v.version_number,
            previous_version_id: v.previous_version_id,
            content_hash: v.content_hash,
            change_summary: v.change_summary,
            created_at: v.created_at,
        }
    }
}

/// FFI-safe PDF attachment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPdfAttachment {
    pub id: i64,
    pub record_id: i64,
    pub filename: String,
    pub size: i64,
    pub sha256: String,
    pub download_path: Option<String>,
}

impl From<models::PdfAttachment> for FfiPdfAttachment {
    fn from(a: models::PdfAttachment) -> Self {
        Self {
            id: a.id,
            record_id: a.record_id,
            filename: a.filename,
            size: a.size,
            sha256: a.sha256,
            download_path: None,
        }
    }
}

/// FFI-safe error log entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiErrorLogEntry {
    pub timestamp: String,
    pub context: String,
    pub message: String,
}

impl From<storage::ErrorLogEntry> for FfiErrorLogEntry {
    fn from(e: storage::ErrorLogEntry) -> Self {
        Self {
            timestamp: e.timestamp.to_rfc3339(),
            context: e.context,
            message: e.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> (tempfile::TempDir, Arc<DentalEhrCore>) {
        let dir = tempfile::tempdir().unwrap();
        let core =
            open_database_in_memory(FfiCoreConfig::local(dir.path().display().to_string())).unwrap();
        (dir, core)
    }

    fn unreachable_url() -> String {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        format!("http://127.0.0.1:{}", port)
    }

    fn new_patient() -> FfiNewPatient {
        FfiNewPatient {
            nombre: "Ana".into(),
            apellido_paterno: Some("Ruiz".into()),
            apellido_materno: None,
            sexo: Some("Femenino".into()),
            fecha_nacimiento: Some("1990-04-12".into()),
            telefono: None,
            email: None,
        }
    }

    #[test]
    fn test_validate_section_payload() {
        let result = validate_section_payload(1, r#"{"nombre":"Ana"}"#.into());
        assert!(!result.is_valid);
        assert!(result.errors.contains_key("sexo"));

        assert!(validate_section_payload(12, "{}".into()).is_valid);
        let garbled = validate_section_payload(3, "{".into());
        assert!(garbled.is_valid);
        assert!(garbled.skipped.is_some());
    }

    #[test]
    fn test_finish_consultation_and_pdf() {
        let (_dir, core) = core();
        let patient = core.create_patient(new_patient()).unwrap();

        let mut form = ClinicalHistoryForm::new(patient.id, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
        form.identification.nombre = Some("Ana".into());
        form.identification.apellido_paterno = Some("Ruiz".into());
        form.identification.sexo = Some("Femenino".into());

        let err = core
            .finish_consultation(serde_json::to_string(&form).unwrap())
            .unwrap_err();
        assert!(matches!(err, DentalEhrError::InvalidInput(_)));

        form.diagnosis = "Periodontitis leve".into();
        form.treatment = "Raspado y alisado".into();
        let report = core
            .finish_consultation(serde_json::to_string(&form).unwrap())
            .unwrap();
        assert!(!report.offline);
        assert!(report.degraded.is_empty(), "{:?}", report.degraded);

        let records = core.list_patient_records(patient.id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, "completed");
        assert_eq!(records[0].id.to_string(), report.history_id);

        let attachment = core.generate_record_pdf(records[0].id, None).unwrap();
        assert!(core.verify_pdf_attachment(attachment.id).unwrap());
        assert!(attachment.download_path.is_some());
    }

    #[test]
    fn test_versions_and_status() {
        let (_dir, core) = core();
        let patient = core.create_patient(new_patient()).unwrap();
        let appointment = core
            .create_appointment(patient.id, "2026-07-02T09:00:00Z".into(), Some(3), None)
            .unwrap();
        let record = core
            .start_record_for_appointment(appointment.id, "2026-07-02".into())
            .unwrap();
        assert_eq!(record.status, "in_progress");

        core.create_digital_version(record.id, Some("inicio".into()), Some(3))
            .unwrap();
        let second = core.create_digital_version(record.id, None, Some(3)).unwrap();
        assert_eq!(second.version_number, 2);
        assert!(core.verify_version_chain(record.id).unwrap());

        let err = core
            .set_record_status(record.id, "draft".into(), None)
            .unwrap_err();
        assert!(matches!(err, DentalEhrError::InvalidInput(_)));

        core.archive_record(record.id, Some(3)).unwrap();
        assert!(core.list_patient_records(patient.id).unwrap().is_empty());
        assert_eq!(core.get_record_stats().unwrap().archived, 1);
    }

    fn complete_form(patient_id: i64) -> ClinicalHistoryForm {
        let mut form = ClinicalHistoryForm::new(patient_id, NaiveDate::from_ymd_opt(2026, 7, 3).unwrap());
        form.identification.nombre = Some("Ana".into());
        form.identification.apellido_paterno = Some("Ruiz".into());
        form.identification.sexo = Some("Femenino".into());
        form.diagnosis = "Caries en 36".into();
        form.treatment = "Resina oclusal".into();
        form
    }

    #[test]
    fn test_configured_backend_falls_back_to_device() {
        let dir = tempfile::tempdir().unwrap();
        let config = FfiCoreConfig {
            backend_url: Some(unreachable_url()),
            auth_token: Some("token".into()),
            request_timeout_ms: Some(2000),
            error_log_capacity: Some(1),
            ..FfiCoreConfig::local(dir.path().display().to_string())
        };
        let core = open_database_in_memory(config).unwrap();
        let patient = core.create_patient(new_patient()).unwrap();
        let form = serde_json::to_string(&complete_form(patient.id)).unwrap();

        let first = core.finish_consultation(form.clone()).unwrap();
        assert!(first.offline);
        assert!(first.history_id.starts_with("offline-"));
        let second = core.finish_consultation(form).unwrap();
        assert!(second.offline);

        assert_eq!(core.list_backups(patient.id).unwrap().len(), 2);
        // Nothing reached the local record service.
        assert!(core.list_patient_records(patient.id).unwrap().is_empty());
        // Ring buffer capped at the configured size.
        assert_eq!(core.get_error_log().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();

        let bad_url = FfiCoreConfig {
            backend_url: Some("ftp://clinic".into()),
            ..FfiCoreConfig::local(root.clone())
        };
        assert!(matches!(
            open_database_in_memory(bad_url),
            Err(DentalEhrError::InvalidInput(_))
        ));

        let zero_capacity = FfiCoreConfig {
            error_log_capacity: Some(0),
            ..FfiCoreConfig::local(root)
        };
        assert!(open_database_in_memory(zero_capacity).is_err());
    }
}
