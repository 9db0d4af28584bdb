//! SQLite schema definition.

/// Complete database schema for the clinical history store.
///
/// The same schema backs both the record service and the device-local store;
/// a device simply leaves the record tables empty.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    nombre TEXT NOT NULL,
    apellido_paterno TEXT,
    apellido_materno TEXT,
    sexo TEXT,
    fecha_nacimiento TEXT,
    telefono TEXT,
    email TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_nombre ON patients(nombre);

-- ============================================================================
-- Appointments
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patients(id),
    doctor_id INTEGER,
    scheduled_at TEXT NOT NULL,
    reason TEXT,
    status TEXT NOT NULL DEFAULT 'scheduled'
        CHECK (status IN ('scheduled', 'in_progress', 'completed', 'cancelled')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id);

-- ============================================================================
-- Clinical Histories (soft delete only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS clinical_histories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patients(id),
    doctor_id INTEGER,
    appointment_id INTEGER REFERENCES appointments(id),
    consultation_date TEXT NOT NULL,                  -- YYYY-MM-DD
    status TEXT NOT NULL DEFAULT 'draft'
        CHECK (status IN ('draft', 'in_progress', 'completed', 'archived')),
    version TEXT NOT NULL DEFAULT '1.0',
    datos_personales TEXT NOT NULL DEFAULT '{}',      -- JSON section blobs
    ficha_identificacion TEXT NOT NULL DEFAULT '{}',
    motivo_consulta TEXT NOT NULL DEFAULT '{}',
    antecedentes_heredofamiliares TEXT NOT NULL DEFAULT '{}',
    antecedentes_no_patologicos TEXT NOT NULL DEFAULT '{}',
    antecedentes_patologicos TEXT NOT NULL DEFAULT '{}',
    examen_extraoral TEXT NOT NULL DEFAULT '{}',
    examen_intraoral TEXT NOT NULL DEFAULT '{}',
    plan_tratamiento TEXT NOT NULL DEFAULT '{}',
    diagnostico TEXT NOT NULL DEFAULT '',
    tratamiento TEXT NOT NULL DEFAULT '',
    pdf_filename TEXT,
    pdf_path TEXT,
    pdf_size INTEGER,
    pdf_saved_at TEXT,
    created_by INTEGER,
    updated_by INTEGER,
    creation_ip TEXT,
    user_agent TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_histories_patient ON clinical_histories(patient_id, consultation_date);
CREATE INDEX IF NOT EXISTS idx_histories_status ON clinical_histories(status);

CREATE TRIGGER IF NOT EXISTS clinical_histories_no_delete BEFORE DELETE ON clinical_histories
BEGIN
    SELECT RAISE(ABORT, 'Clinical histories are archived, never deleted');
END;

CREATE TRIGGER IF NOT EXISTS clinical_histories_status_forward BEFORE UPDATE OF status ON clinical_histories
WHEN (CASE new.status WHEN 'draft' THEN 0 WHEN 'in_progress' THEN 1 WHEN 'completed' THEN 2 ELSE 3 END)
   < (CASE old.status WHEN 'draft' THEN 0 WHEN 'in_progress' THEN 1 WHEN 'completed' THEN 2 ELSE 3 END)
BEGIN
    SELECT RAISE(ABORT, 'Record status can only move forward');
END;

-- ============================================================================
-- Digital Versions (Immutable after creation)
-- ============================================================================

CREATE TABLE IF NOT EXISTS digital_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL REFERENCES clinical_histories(id),
    version_number INTEGER NOT NULL,
    previous_version_id INTEGER REFERENCES digital_versions(id),
    snapshot TEXT NOT NULL,                           -- full form JSON
    content_hash TEXT NOT NULL,                       -- SHA-256 of snapshot
    change_summary TEXT,
    created_by INTEGER,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (record_id, version_number)
);

CREATE TRIGGER IF NOT EXISTS digital_versions_immutable BEFORE UPDATE ON digital_versions
BEGIN
    SELECT RAISE(ABORT, 'Digital versions are immutable');
END;

-- ============================================================================
-- Audit Log (Append-only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL REFERENCES clinical_histories(id),
    user_id INTEGER,
    action TEXT NOT NULL CHECK (action IN (
        'create', 'update', 'view', 'status_change', 'archive', 'pdf_generated', 'version_created'
    )),
    details TEXT,
    ip TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_audit_record ON audit_log(record_id);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'Audit log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_delete BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'Audit log is append-only');
END;

-- ============================================================================
-- PDF Attachments
-- ============================================================================

CREATE TABLE IF NOT EXISTS pdf_attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL REFERENCES clinical_histories(id),
    filename TEXT NOT NULL,
    content BLOB NOT NULL,
    size INTEGER NOT NULL,
    sha256 TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_attachments_record ON pdf_attachments(record_id);

-- ============================================================================
-- Local Storage (device key/value namespace)
-- ============================================================================

CREATE TABLE IF NOT EXISTS local_storage (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute("INSERT INTO patients (nombre) VALUES ('Ana')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO clinical_histories (patient_id, consultation_date) VALUES (1, '2026-01-10')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);

        // Idempotent
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_histories_cannot_be_deleted() {
        let conn = setup();
        let result = conn.execute("DELETE FROM clinical_histories WHERE id = 1", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_status_only_moves_forward() {
        let conn = setup();
        conn.execute("UPDATE clinical_histories SET status = 'completed' WHERE id = 1", [])
            .unwrap();

        let back = conn.execute("UPDATE clinical_histories SET status = 'draft' WHERE id = 1", []);
        assert!(back.is_err());

        let forward = conn.execute("UPDATE clinical_histories SET status = 'archived' WHERE id = 1", []);
        assert!(forward.is_ok());
    }

    #[test]
    fn test_versions_and_audit_are_immutable() {
        let conn = setup();
        conn.execute(
            "INSERT INTO digital_versions (record_id, version_number, snapshot, content_hash) VALUES (1, 1, '{}', 'h')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO audit_log (record_id, action) VALUES (1, 'create')",
            [],
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE digital_versions SET snapshot = '{\"x\":1}'", [])
            .is_err());
        assert!(conn.execute("UPDATE audit_log SET details = 'x'", []).is_err());
        assert!(conn.execute("DELETE FROM audit_log", []).is_err());
    }

    #[test]
    fn test_audit_action_constraint() {
        let conn = setup();
        let result = conn.execute(
            "INSERT INTO audit_log (record_id, action) VALUES (1, 'delete')",
            [],
        );
        assert!(result.is_err());
    }
}
