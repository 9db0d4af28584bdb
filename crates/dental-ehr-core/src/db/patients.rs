//! Patient database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::Patient;

const PATIENT_COLUMNS: &str = "id, nombre, apellido_paterno, apellido_materno, sexo, \
     fecha_nacimiento, telefono, email, created_at, updated_at";

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        nombre: row.get(1)?,
        apellido_paterno: row.get(2)?,
        apellido_materno: row.get(3)?,
        sexo: row.get(4)?,
        fecha_nacimiento: row.get(5)?,
        telefono: row.get(6)?,
        email: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl Database {
    /// Insert a new patient and return it with its assigned ID.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<Patient> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                nombre, apellido_paterno, apellido_materno, sexo,
                fecha_nacimiento, telefono, email, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                patient.nombre,
                patient.apellido_paterno,
                patient.apellido_materno,
                patient.sexo,
                patient.fecha_nacimiento,
                patient.telefono,
                patient.email,
                patient.created_at,
                patient.updated_at,
            ],
        )?;

        let mut stored = patient.clone();
        stored.id = self.conn.last_insert_rowid();
        Ok(stored)
    }

    /// Update an existing patient.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                nombre = ?2,
                apellido_paterno = ?3,
                apellido_materno = ?4,
                sexo = ?5,
                fecha_nacimiento = ?6,
                telefono = ?7,
                email = ?8,
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![
                patient.id,
                patient.nombre,
                patient.apellido_paterno,
                patient.apellido_materno,
                patient.sexo,
                patient.fecha_nacimiento,
                patient.telefono,
                patient.email,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: i64) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM patients WHERE id = ?", PATIENT_COLUMNS),
                [id],
                patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Search patients by name or surname (prefix match).
    pub fn search_patients(&self, query: &str, limit: usize) -> DbResult<Vec<Patient>> {
        let pattern = format!("{}%", query);
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM patients
            WHERE nombre LIKE ?1 OR apellido_paterno LIKE ?1 OR apellido_materno LIKE ?1
            ORDER BY nombre
            LIMIT ?2
            "#,
            PATIENT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![pattern, limit as i64], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List all patients.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM patients ORDER BY nombre",
            PATIENT_COLUMNS
        ))?;
        let rows = stmt.query_map([], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
