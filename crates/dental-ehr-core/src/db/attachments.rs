//! PDF attachment operations.

use rusqlite::{params, OptionalExtension, Row};

use super::versions::hash_content;
use super::{Database, DbError, DbResult};
use crate::models::{AuditAction, PdfAttachment};

const ATTACHMENT_COLUMNS: &str = "id, record_id, filename, content, size, sha256, created_at";

fn attachment_from_row(row: &Row<'_>) -> rusqlite::Result<PdfAttachment> {
    Ok(PdfAttachment {
        id: row.get(0)?,
        record_id: row.get(1)?,
        filename: row.get(2)?,
        content: row.get(3)?,
        size: row.get(4)?,
        sha256: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl Database {
    /// Store a PDF against a record and update the record's PDF columns.
    pub fn insert_pdf_attachment(
        &self,
        record_id: i64,
        filename: &str,
        content: &[u8],
        user_id: Option<i64>,
    ) -> DbResult<PdfAttachment> {
        if self.get_record(record_id)?.is_none() {
            return Err(DbError::NotFound(format!("clinical history {}", record_id)));
        }

        let size = content.len() as i64;
        let sha256 = hash_content(content);
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO pdf_attachments (record_id, filename, content, size, sha256, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record_id,
                filename,
                content,
                size,
                sha256,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO audit_log (record_id, user_id, action, details) VALUES (?, ?, ?, ?)",
            params![record_id, user_id, AuditAction::PdfGenerated.as_str(), filename],
        )?;

        tx.commit()?;

        self.set_record_pdf(record_id, filename, &format!("attachment:{}", id), size)?;

        self.get_pdf_attachment(id)?
            .ok_or_else(|| DbError::NotFound(format!("pdf attachment {}", id)))
    }

    /// Get an attachment with its content.
    pub fn get_pdf_attachment(&self, id: i64) -> DbResult<Option<PdfAttachment>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM pdf_attachments WHERE id = ?", ATTACHMENT_COLUMNS),
                [id],
                attachment_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Attachments of a record, newest first.
    pub fn list_pdf_attachments(&self, record_id: i64) -> DbResult<Vec<PdfAttachment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM pdf_attachments WHERE record_id = ? ORDER BY id DESC",
            ATTACHMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([record_id], attachment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Whether stored bytes still match their recorded digest.
    pub fn verify_pdf_attachment(&self, id: i64) -> DbResult<bool> {
        let attachment = self
            .get_pdf_attachment(id)?
            .ok_or_else(|| DbError::NotFound(format!("pdf attachment {}", id)))?;
        Ok(attachment.size == attachment.content.len() as i64
            && hash_content(&attachment.content) == attachment.sha256)
    }
}
