//! Clinical history record database operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DbError, DbResult};
use crate::models::{
    AuditEntry, ClinicalHistoryRecord, NewRecord, Patient, RecordPatch, RecordStatus,
};

const RECORD_COLUMNS: &str = "id, patient_id, doctor_id, appointment_id, consultation_date, \
     status, version, datos_personales, ficha_identificacion, motivo_consulta, \
     antecedentes_heredofamiliares, antecedentes_no_patologicos, antecedentes_patologicos, \
     examen_extraoral, examen_intraoral, plan_tratamiento, diagnostico, tratamiento, \
     pdf_filename, pdf_path, pdf_size, pdf_saved_at, created_by, updated_by, creation_ip, \
     user_agent, created_at, updated_at";

/// One page of a listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

/// Aggregate counts over all records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordStats {
    pub total: u64,
    pub draft: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub archived: u64,
    pub patients: u64,
    pub with_pdf: u64,
    pub latest_consultation: Option<NaiveDate>,
}

/// Diagnostic view of everything stored for one patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientDebugInfo {
    pub patient_id: i64,
    pub patient: Option<Patient>,
    pub record_count: u64,
    pub archived_count: u64,
    pub latest_record: Option<ClinicalHistoryRecord>,
    pub recent_audit: Vec<AuditEntry>,
}

impl Database {
    /// Insert a new record and return it as stored.
    pub fn insert_record(&self, record: &NewRecord) -> DbResult<ClinicalHistoryRecord> {
        let now = chrono::Utc::now().to_rfc3339();

        self.conn.execute(
            r#"
            INSERT INTO clinical_histories (
                patient_id, doctor_id, appointment_id, consultation_date, status, version,
                datos_personales, ficha_identificacion, motivo_consulta,
                antecedentes_heredofamiliares, antecedentes_no_patologicos,
                antecedentes_patologicos, examen_extraoral, examen_intraoral,
                plan_tratamiento, diagnostico, tratamiento,
                created_by, updated_by, creation_ip, user_agent, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18, ?18, ?19, ?20, ?21, ?21
            )
            "#,
            params![
                record.patient_id,
                record.doctor_id,
                record.appointment_id,
                record.consultation_date.to_string(),
                record.status.as_str(),
                record.version,
                serde_json::to_string(&record.datos_personales)?,
                serde_json::to_string(&record.ficha_identificacion)?,
                serde_json::to_string(&record.motivo_consulta)?,
                serde_json::to_string(&record.antecedentes_heredofamiliares)?,
                serde_json::to_string(&record.antecedentes_personales_no_patologicos)?,
                serde_json::to_string(&record.antecedentes_personales_patologicos)?,
                serde_json::to_string(&record.examen_extraoral)?,
                serde_json::to_string(&record.examen_intraoral)?,
                serde_json::to_string(&record.plan_tratamiento)?,
                record.diagnostico,
                record.tratamiento,
                record.audit.user_id,
                record.audit.ip,
                record.audit.user_agent,
                now,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_record(id)?
            .ok_or_else(|| DbError::NotFound(format!("clinical history {}", id)))
    }

    /// Get a record by ID.
    pub fn get_record(&self, id: i64) -> DbResult<Option<ClinicalHistoryRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM clinical_histories WHERE id = ?", RECORD_COLUMNS),
                [id],
                RecordRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Apply a partial update. Status may only move forward.
    pub fn patch_record(&self, id: i64, patch: &RecordPatch) -> DbResult<ClinicalHistoryRecord> {
        let mut record = self
            .get_record(id)?
            .ok_or_else(|| DbError::NotFound(format!("clinical history {}", id)))?;

        if let Some(next) = patch.status {
            if !record.status.can_transition_to(next) {
                return Err(DbError::Constraint(format!(
                    "status cannot move from {} to {}",
                    record.status, next
                )));
            }
            record.status = next;
        }
        if let Some(date) = patch.consultation_date {
            record.consultation_date = date;
        }
        if let Some(s) = &patch.ficha_identificacion {
            record.ficha_identificacion = s.clone();
        }
        if let Some(s) = &patch.motivo_consulta {
            record.motivo_consulta = s.clone();
        }
        if let Some(s) = &patch.antecedentes_heredofamiliares {
            record.antecedentes_heredofamiliares = s.clone();
        }
        if let Some(s) = &patch.antecedentes_personales_no_patologicos {
            record.antecedentes_personales_no_patologicos = s.clone();
        }
        if let Some(s) = &patch.antecedentes_personales_patologicos {
            record.antecedentes_personales_patologicos = s.clone();
        }
        if let Some(s) = &patch.examen_extraoral {
            record.examen_extraoral = s.clone();
        }
        if let Some(s) = &patch.examen_intraoral {
            record.examen_intraoral = s.clone();
        }
        if let Some(s) = &patch.plan_tratamiento {
            record.plan_tratamiento = s.clone();
        }
        if let Some(s) = &patch.diagnostico {
            record.diagnostico = s.clone();
        }
        if let Some(s) = &patch.tratamiento {
            record.tratamiento = s.clone();
        }
        if patch.updated_by.is_some() {
            record.updated_by = patch.updated_by;
        }

        self.conn.execute(
            r#"
            UPDATE clinical_histories SET
                status = ?2,
                consultation_date = ?3,
                ficha_identificacion = ?4,
                motivo_consulta = ?5,
                antecedentes_heredofamiliares = ?6,
                antecedentes_no_patologicos = ?7,
                antecedentes_patologicos = ?8,
                examen_extraoral = ?9,
                examen_intraoral = ?10,
                plan_tratamiento = ?11,
                diagnostico = ?12,
                tratamiento = ?13,
                updated_by = ?14,
                updated_at = ?15
            WHERE id = ?1
            "#,
            params![
                id,
                record.status.as_str(),
                record.consultation_date.to_string(),
                serde_json::to_string(&record.ficha_identificacion)?,
                serde_json::to_string(&record.motivo_consulta)?,
                serde_json::to_string(&record.antecedentes_heredofamiliares)?,
                serde_json::to_string(&record.antecedentes_personales_no_patologicos)?,
                serde_json::to_string(&record.antecedentes_personales_patologicos)?,
                serde_json::to_string(&record.examen_extraoral)?,
                serde_json::to_string(&record.examen_intraoral)?,
                serde_json::to_string(&record.plan_tratamiento)?,
                record.diagnostico,
                record.tratamiento,
                record.updated_by,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;

        self.get_record(id)?
            .ok_or_else(|| DbError::NotFound(format!("clinical history {}", id)))
    }

    /// Move a record to a new status (forward only).
    pub fn set_record_status(
        &self,
        id: i64,
        status: RecordStatus,
        updated_by: Option<i64>,
    ) -> DbResult<ClinicalHistoryRecord> {
        self.patch_record(
            id,
            &RecordPatch {
                status: Some(status),
                updated_by,
                ..RecordPatch::default()
            },
        )
    }

    /// Records for a patient, newest consultation first.
    pub fn list_records_for_patient(
        &self,
        patient_id: i64,
        include_archived: bool,
    ) -> DbResult<Vec<ClinicalHistoryRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM clinical_histories
            WHERE patient_id = ?1 AND (?2 OR status != 'archived')
            ORDER BY consultation_date DESC, id DESC
            "#,
            RECORD_COLUMNS
        ))?;

        let rows = stmt.query_map(params![patient_id, include_archived], RecordRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.try_into()?);
        }
        Ok(records)
    }

    /// Paginated listing across all patients, newest first. `page` is 1-based.
    pub fn list_records_page(
        &self,
        page: u32,
        per_page: u32,
        status: Option<RecordStatus>,
    ) -> DbResult<Page<ClinicalHistoryRecord>> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let status_filter = status.map(|s| s.as_str());

        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM clinical_histories WHERE ?1 IS NULL OR status = ?1",
            params![status_filter],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM clinical_histories
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY consultation_date DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
            RECORD_COLUMNS
        ))?;

        let offset = i64::from(page - 1) * i64::from(per_page);
        let rows = stmt.query_map(
            params![status_filter, i64::from(per_page), offset],
            RecordRow::from_row,
        )?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }

        let total = total.max(0) as u64;
        let total_pages = total.div_ceil(u64::from(per_page)) as u32;

        Ok(Page {
            items,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    /// Aggregate counts for dashboards.
    pub fn record_stats(&self) -> DbResult<RecordStats> {
        let mut stats = RecordStats::default();

        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM clinical_histories GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            let count = count.max(0) as u64;
            stats.total += count;
            match RecordStatus::parse(&status) {
                Some(RecordStatus::Draft) => stats.draft = count,
                Some(RecordStatus::InProgress) => stats.in_progress = count,
                Some(RecordStatus::Completed) => stats.completed = count,
                Some(RecordStatus::Archived) => stats.archived = count,
                None => {}
            }
        }

        let (patients, with_pdf, latest): (i64, i64, Option<String>) = self.conn.query_row(
            r#"
            SELECT COUNT(DISTINCT patient_id),
                   COUNT(pdf_filename),
                   MAX(consultation_date)
            FROM clinical_histories
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        stats.patients = patients.max(0) as u64;
        stats.with_pdf = with_pdf.max(0) as u64;
        stats.latest_consultation = latest.as_deref().map(parse_date).transpose()?;

        Ok(stats)
    }

    /// Record that a PDF for this history was persisted.
    pub fn set_record_pdf(
        &self,
        id: i64,
        filename: &str,
        path: &str,
        size: i64,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE clinical_histories SET
                pdf_filename = ?2,
                pdf_path = ?3,
                pdf_size = ?4,
                pdf_saved_at = ?5,
                updated_at = ?5
            WHERE id = ?1
            "#,
            params![id, filename, path, size, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Number of non-archived records for a patient.
    pub fn count_records_for_patient(&self, patient_id: i64) -> DbResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM clinical_histories WHERE patient_id = ? AND status != 'archived'",
            [patient_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

impl Database {
    /// Everything stored for a patient, for support diagnostics.
    pub fn debug_patient(&self, patient_id: i64) -> DbResult<PatientDebugInfo> {
        let all = self.list_records_for_patient(patient_id, true)?;
        let archived_count = all.iter().filter(|r| r.is_archived()).count() as u64;

        Ok(PatientDebugInfo {
            patient_id,
            patient: self.get_patient(patient_id)?,
            record_count: all.len() as u64,
            archived_count,
            latest_record: all.into_iter().find(|r| !r.is_archived()),
            recent_audit: self.recent_audit_for_patient(patient_id, 10)?,
        })
    }
}

fn parse_date(s: &str) -> DbResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DbError::Constraint(format!("invalid consultation date {:?}: {}", s, e)))
}

/// Intermediate row struct for database mapping.
struct RecordRow {
    id: i64,
    patient_id: i64,
    doctor_id: Option<i64>,
    appointment_id: Option<i64>,
    consultation_date: String,
    status: String,
    version: String,
    blobs: [String; 9],
    diagnostico: String,
    tratamiento: String,
    pdf_filename: Option<String>,
    pdf_path: Option<String>,
    pdf_size: Option<i64>,
    pdf_saved_at: Option<String>,
    created_by: Option<i64>,
    updated_by: Option<i64>,
    creation_ip: Option<String>,
    user_agent: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            doctor_id: row.get(2)?,
            appointment_id: row.get(3)?,
            consultation_date: row.get(4)?,
            status: row.get(5)?,
            version: row.get(6)?,
            blobs: [
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
                row.get(13)?,
                row.get(14)?,
                row.get(15)?,
            ],
            diagnostico: row.get(16)?,
            tratamiento: row.get(17)?,
            pdf_filename: row.get(18)?,
            pdf_path: row.get(19)?,
            pdf_size: row.get(20)?,
            pdf_saved_at: row.get(21)?,
            created_by: row.get(22)?,
            updated_by: row.get(23)?,
            creation_ip: row.get(24)?,
            user_agent: row.get(25)?,
            created_at: row.get(26)?,
            updated_at: row.get(27)?,
        })
    }
}

impl TryFrom<RecordRow> for ClinicalHistoryRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let status = RecordStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown record status: {}", row.status)))?;
        let [personal, ident, complaint, family, non_path, path, extra, intra, plan] = row.blobs;

        Ok(ClinicalHistoryRecord {
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            appointment_id: row.appointment_id,
            consultation_date: parse_date(&row.consultation_date)?,
            status,
            version: row.version,
            datos_personales: serde_json::from_str(&personal)?,
            ficha_identificacion: serde_json::from_str(&ident)?,
            motivo_consulta: serde_json::from_str(&complaint)?,
            antecedentes_heredofamiliares: serde_json::from_str(&family)?,
            antecedentes_personales_no_patologicos: serde_json::from_str(&non_path)?,
            antecedentes_personales_patologicos: serde_json::from_str(&path)?,
            examen_extraoral: serde_json::from_str(&extra)?,
            examen_intraoral: serde_json::from_str(&intra)?,
            plan_tratamiento: serde_json::from_str(&plan)?,
            diagnostico: row.diagnostico,
            tratamiento: row.tratamiento,
            pdf_filename: row.pdf_filename,
            pdf_path: row.pdf_path,
            pdf_size: row.pdf_size,
            pdf_saved_at: row.pdf_saved_at,
            created_by: row.created_by,
            updated_by: row.updated_by,
            creation_ip: row.creation_ip,
            user_agent: row.user_agent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
