//! Device-local storage namespace.
//!
//! Everything the wizard keeps on the device lives under `historial_*` keys in
//! the `local_storage` table:
//!
//! - `historial_<patientId>`: the draft form, rewritten after each section
//! - `historial_respaldo_<patientId>_<millis>`: backups written when the backend
//!   could not take a save
//! - `historial_digital_<historyId>`: digital version snapshots
//! - `historial_error_logs`: the last few pipeline errors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::DEFAULT_ERROR_LOG_CAPACITY;
use crate::db::{hash_content, Database, DbError};
use crate::models::{ClinicalHistoryForm, HistoryId, NewRecord};

const DRAFT_PREFIX: &str = "historial_";
const BACKUP_PREFIX: &str = "historial_respaldo_";
const DIGITAL_PREFIX: &str = "historial_digital_";
const ERROR_LOG_KEY: &str = "historial_error_logs";

/// Local storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Local storage error: {0}")]
    Db(#[from] DbError),

    #[error("Stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A record that could not reach the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub patient_id: i64,
    pub saved_at: DateTime<Utc>,
    pub reason: String,
    pub record: NewRecord,
}

/// A digital version kept on the device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalDigitalVersion {
    pub history_id: HistoryId,
    pub saved_at: DateTime<Utc>,
    /// SHA-256 of the serialized form
    pub content_hash: String,
    pub form: ClinicalHistoryForm,
}

/// One entry of the error ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub context: String,
    pub message: String,
}

pub fn draft_key(patient_id: i64) -> String {
    format!("{}{}", DRAFT_PREFIX, patient_id)
}

pub fn backup_prefix(patient_id: i64) -> String {
    format!("{}{}_", BACKUP_PREFIX, patient_id)
}

pub fn digital_key(history_id: &HistoryId) -> String {
    format!("{}{}", DIGITAL_PREFIX, history_id)
}

/// Typed access to the device-local namespace.
pub struct LocalStore<'a> {
    db: &'a Database,
    error_log_capacity: usize,
}

impl<'a> LocalStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
        }
    }

    pub fn with_error_log_capacity(mut self, capacity: usize) -> Self {
        self.error_log_capacity = capacity.max(1);
        self
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let json = serde_json::to_string(value)?;
        self.db.local_set(key, &json)?;
        Ok(())
    }

    fn fetch<T: for<'de> Deserialize<'de>>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.db.local_get(key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Drafts
    // ------------------------------------------------------------------

    /// Store the in-progress form for its patient.
    pub fn save_draft(&self, form: &ClinicalHistoryForm) -> StorageResult<String> {
        let key = draft_key(form.patient_id);
        self.put(&key, form)?;
        debug!(patient_id = form.patient_id, key = %key, "draft saved");
        Ok(key)
    }

    pub fn load_draft(&self, patient_id: i64) -> StorageResult<Option<ClinicalHistoryForm>> {
        self.fetch(&draft_key(patient_id))
    }

    pub fn clear_draft(&self, patient_id: i64) -> StorageResult<bool> {
        Ok(self.db.local_remove(&draft_key(patient_id))?)
    }

    // ------------------------------------------------------------------
    // Backups
    // ------------------------------------------------------------------

    /// Write a timestamped backup of a record the backend did not accept.
    pub fn write_backup(
        &self,
        record: &NewRecord,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<String> {
        let prefix = backup_prefix(record.patient_id);
        let mut millis = now.timestamp_millis();
        let mut key = format!("{}{}", prefix, millis);
        while self.db.local_get(&key)?.is_some() {
            millis += 1;
            key = format!("{}{}", prefix, millis);
        }

        let entry = BackupEntry {
            patient_id: record.patient_id,
            saved_at: now,
            reason: reason.to_string(),
            record: record.clone(),
        };
        self.put(&key, &entry)?;
        debug!(patient_id = record.patient_id, key = %key, "backup written");
        Ok(key)
    }

    /// Backup keys for a patient, oldest first.
    pub fn list_backups(&self, patient_id: i64) -> StorageResult<Vec<String>> {
        let mut keys = self.db.local_keys_with_prefix(&backup_prefix(patient_id))?;
        keys.sort_by_key(|k| {
            k.rsplit('_')
                .next()
                .and_then(|ts| ts.parse::<i64>().ok())
                .unwrap_or_default()
        });
        Ok(keys)
    }

    pub fn load_backup(&self, key: &str) -> StorageResult<Option<BackupEntry>> {
        self.fetch(key)
    }

    pub fn remove_backup(&self, key: &str) -> StorageResult<bool> {
        Ok(self.db.local_remove(key)?)
    }

    // ------------------------------------------------------------------
    // Digital versions
    // ------------------------------------------------------------------

    /// Keep a snapshot of the form under its history ID.
    pub fn save_digital_version(
        &self,
        history_id: &HistoryId,
        form: &ClinicalHistoryForm,
        now: DateTime<Utc>,
    ) -> StorageResult<String> {
        let key = digital_key(history_id);
        let content_hash = hash_content(serde_json::to_string(form)?.as_bytes());
        let version = LocalDigitalVersion {
            history_id: history_id.clone(),
            saved_at: now,
            content_hash,
            form: form.clone(),
        };
        self.put(&key, &version)?;
        Ok(key)
    }

    pub fn load_digital_version(
        &self,
        history_id: &HistoryId,
    ) -> StorageResult<Option<LocalDigitalVersion>> {
        self.fetch(&digital_key(history_id))
    }

    // ------------------------------------------------------------------
    // Error ring buffer
    // ------------------------------------------------------------------

    /// Append to the error log, dropping the oldest entries past capacity.
    pub fn log_error(&self, context: &str, message: &str, now: DateTime<Utc>) -> StorageResult<()> {
        let mut entries = self.error_log().unwrap_or_else(|e| {
            warn!(error = %e, "error log unreadable, starting a new one");
            Vec::new()
        });
        entries.push(ErrorLogEntry {
            timestamp: now,
            context: context.to_string(),
            message: message.to_string(),
        });
        if entries.len() > self.error_log_capacity {
            let excess = entries.len() - self.error_log_capacity;
            entries.drain(..excess);
        }
        self.put(ERROR_LOG_KEY, &entries)
    }

    /// Logged errors, oldest first.
    pub fn error_log(&self) -> StorageResult<Vec<ErrorLogEntry>> {
        Ok(self.fetch(ERROR_LOG_KEY)?.unwrap_or_default())
    }
}
