//! Digital version chain operations.
//!
//! Each record keeps an ordered chain of immutable snapshots. A version links
//! to its predecessor and carries the SHA-256 of its snapshot so the chain can
//! be checked later.

use rusqlite::{params, OptionalExtension, Row};
use sha2::{Digest, Sha256};

use super::{Database, DbError, DbResult};
use crate::models::{AuditAction, DigitalVersion};

const VERSION_COLUMNS: &str = "id, record_id, version_number, previous_version_id, snapshot, \
     content_hash, change_summary, created_by, created_at";

/// SHA-256 of data, hex encoded.
pub fn hash_content(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<DigitalVersion> {
    Ok(DigitalVersion {
        id: row.get(0)?,
        record_id: row.get(1)?,
        version_number: row.get(2)?,
        previous_version_id: row.get(3)?,
        snapshot: row.get(4)?,
        content_hash: row.get(5)?,
        change_summary: row.get(6)?,
        created_by: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl Database {
    /// Append a snapshot to the record's version chain.
    pub fn create_digital_version(
        &self,
        record_id: i64,
        snapshot: &str,
        change_summary: Option<&str>,
        created_by: Option<i64>,
    ) -> DbResult<DigitalVersion> {
        if self.get_record(record_id)?.is_none() {
            return Err(DbError::NotFound(format!("clinical history {}", record_id)));
        }

        let tx = self.conn.unchecked_transaction()?;

        let previous = self.latest_version(record_id)?;
        let version_number = previous.as_ref().map_or(1, |v| v.version_number + 1);
        let previous_version_id = previous.map(|v| v.id);
        let content_hash = hash_content(snapshot.as_bytes());

        tx.execute(
            r#"
            INSERT INTO digital_versions (
                record_id, version_number, previous_version_id, snapshot,
                content_hash, change_summary, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record_id,
                version_number,
                previous_version_id,
                snapshot,
                content_hash,
                change_summary,
                created_by,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO audit_log (record_id, user_id, action, details) VALUES (?, ?, ?, ?)",
            params![
                record_id,
                created_by,
                AuditAction::VersionCreated.as_str(),
                format!("version {}", version_number),
            ],
        )?;

        tx.commit()?;

        self.get_version(id)?
            .ok_or_else(|| DbError::NotFound(format!("digital version {}", id)))
    }

    /// Get a version by ID.
    pub fn get_version(&self, id: i64) -> DbResult<Option<DigitalVersion>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM digital_versions WHERE id = ?", VERSION_COLUMNS),
                [id],
                version_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Most recent version of a record.
    pub fn latest_version(&self, record_id: i64) -> DbResult<Option<DigitalVersion>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM digital_versions WHERE record_id = ? ORDER BY version_number DESC LIMIT 1",
                    VERSION_COLUMNS
                ),
                [record_id],
                version_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// All versions of a record, oldest first.
    pub fn list_versions(&self, record_id: i64) -> DbResult<Vec<DigitalVersion>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM digital_versions WHERE record_id = ? ORDER BY version_number",
            VERSION_COLUMNS
        ))?;
        let rows = stmt.query_map([record_id], version_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Check every snapshot hash and predecessor link of a record's chain.
    pub fn verify_version_chain(&self, record_id: i64) -> DbResult<bool> {
        let versions = self.list_versions(record_id)?;
        let mut previous: Option<&DigitalVersion> = None;

        for (i, version) in versions.iter().enumerate() {
            if version.version_number as usize != i + 1 {
                return Ok(false);
            }
            if version.previous_version_id != previous.map(|v| v.id) {
                return Ok(false);
            }
            if hash_content(version.snapshot.as_bytes()) != version.content_hash {
                return Ok(false);
            }
            previous = Some(version);
        }
        Ok(true)
    }
}
