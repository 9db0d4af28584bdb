//! Append-only audit log operations.

use rusqlite::types::Type;
use rusqlite::{params, Row};

use super::{Database, DbResult};
use crate::models::{AuditAction, AuditEntry};

impl Database {
    /// Append an audit entry and return its ID.
    pub fn append_audit(
        &self,
        record_id: i64,
        action: AuditAction,
        user_id: Option<i64>,
        details: Option<&str>,
        ip: Option<&str>,
    ) -> DbResult<i64> {
        self.conn.execute(
            "INSERT INTO audit_log (record_id, user_id, action, details, ip) VALUES (?, ?, ?, ?, ?)",
            params![record_id, user_id, action.as_str(), details, ip],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Audit trail for a record, oldest first.
    pub fn list_audit(&self, record_id: i64) -> DbResult<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, record_id, user_id, action, details, ip, created_at
            FROM audit_log
            WHERE record_id = ?
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([record_id], audit_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Latest audit entries across all of a patient's records, newest first.
    pub fn recent_audit_for_patient(&self, patient_id: i64, limit: usize) -> DbResult<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT a.id, a.record_id, a.user_id, a.action, a.details, a.ip, a.created_at
            FROM audit_log a
            JOIN clinical_histories h ON h.id = a.record_id
            WHERE h.patient_id = ?1
            ORDER BY a.id DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![patient_id, limit as i64], audit_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let action: String = row.get(3)?;
    let action = AuditAction::parse(&action).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown audit action: {}", action).into(),
        )
    })?;

    Ok(AuditEntry {
        id: row.get(0)?,
        record_id: row.get(1)?,
        user_id: row.get(2)?,
        action,
        details: row.get(4)?,
        ip: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRecord, Patient};
    use chrono::NaiveDate;

    #[test]
    fn test_append_and_list() {
        let db = Database::open_in_memory().unwrap();
        let patient = db
            .insert_patient(&Patient::new("Ana".into(), None))
            .unwrap();
        let record = db
            .insert_record(&NewRecord::empty(
                patient.id,
                NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            ))
            .unwrap();

        db.append_audit(record.id, AuditAction::Create, Some(4), None, Some("10.0.0.8"))
            .unwrap();
        db.append_audit(
            record.id,
            AuditAction::StatusChange,
            Some(4),
            Some("draft -> completed"),
            None,
        )
        .unwrap();

        let trail = db.list_audit(record.id).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, AuditAction::Create);
        assert_eq!(trail[0].ip.as_deref(), Some("10.0.0.8"));
        assert_eq!(trail[1].action, AuditAction::StatusChange);
        assert_eq!(trail[1].details.as_deref(), Some("draft -> completed"));
    }
}
