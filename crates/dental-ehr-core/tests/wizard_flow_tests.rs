//! End-to-end wizard tests against an unreachable record service.

use std::net::TcpListener;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde_json::json;

use dental_ehr_core::backend::HttpBackend;
use dental_ehr_core::config::{BackendConfig, FileStorageConfig, WizardTiming};
use dental_ehr_core::db::Database;
use dental_ehr_core::files::FileStore;
use dental_ehr_core::models::{HistoryId, Patient, RecordStatus, SectionData};
use dental_ehr_core::persistence::{DegradedReason, PersistenceService};
use dental_ehr_core::storage::LocalStore;
use dental_ehr_core::wizard::{
    ClinicalHistoryWizard, FinishOutcome, PipelineStep, Section, StepOutcome, WizardPhase,
};

fn section_json(index: u8) -> SectionData {
    let value = match index {
        1 => json!({"nombre": "Mario", "apellidoPaterno": "Soto", "sexo": "Masculino", "fechaNacimiento": "1984-09-30"}),
        2 => json!({"quejaPrincipal": "Sangrado de encías al cepillarse"}),
        3 => json!({"madre": {"diabetes": true}, "abuelos": {"hipertension": true}}),
        4 => json!({"alimentacion": {"consumoAzucares": "Alto"}, "vivienda": {"tipo": "Casa"}}),
        5 => json!({"medicamentos": {"actuales": "Metformina"}, "hospitalizaciones": {"motivo": "Fractura"}}),
        6 => json!({"atm": {"aperturaMaxima": "45 mm"}, "labios": {"aspecto": "Hidratados"}}),
        7 => json!({
            "encias": {"color": "Enrojecidas"},
            "dientes": {"ausentes": "18, 28"},
            "carrillos": {"aspecto": "Normal"}
        }),
        8 => json!({"relacionCanina": {"izquierda": "Clase II"}, "guias": {"anterior": "Presente"}}),
        _ => unreachable!(),
    };
    SectionData::from_json(index, value).unwrap().unwrap()
}

fn unreachable_backend() -> HttpBackend {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let config = BackendConfig::new(format!("http://127.0.0.1:{}", port))
        .unwrap()
        .with_auth_token("token-de-prueba")
        .with_request_timeout(Duration::from_secs(2))
        .unwrap();
    HttpBackend::new(&config).unwrap()
}

fn patient(db: &Database) -> Patient {
    db.insert_patient(&Patient::new("Mario".into(), Some("Soto".into())))
        .unwrap()
}

fn walk_to_last_section<B: dental_ehr_core::HistoryBackend>(
    wizard: &mut ClinicalHistoryWizard<'_, B>,
    now: Instant,
) {
    for index in 1..=8 {
        wizard.update_section(section_json(index), now).unwrap();
    }
    while wizard.current_section() != Section::LAST {
        wizard.go_next().unwrap();
    }
    wizard
        .set_closing_texts("Gingivitis generalizada", "Profilaxis y control de placa", now)
        .unwrap();
}

#[test]
fn test_offline_finish_writes_one_backup() {
    let db = Database::open_in_memory().unwrap();
    let patient = patient(&db);
    let dir = tempfile::tempdir().unwrap();
    let files = FileStore::open(&FileStorageConfig::under(dir.path())).unwrap();

    let service = PersistenceService::new(unreachable_backend(), LocalStore::new(&db), &files);
    let mut wizard = ClinicalHistoryWizard::start(
        patient.clone(),
        NaiveDate::from_ymd_opt(2026, 8, 20).unwrap(),
        service,
        &WizardTiming::default(),
    );
    walk_to_last_section(&mut wizard, Instant::now());

    let report = match wizard.finish().unwrap() {
        FinishOutcome::Completed(report) => report,
        other => panic!("unexpected {:?}", other),
    };

    assert!(report.is_offline());
    assert!(report.history_id.to_string().starts_with("offline-"));
    assert!(matches!(
        report.outcome_of(PipelineStep::Save),
        Some(StepOutcome::Degraded(DegradedReason::Offline { backend, .. })) if backend == "network"
    ));
    for step in [
        PipelineStep::GeneratePdf,
        PipelineStep::SaveLocally,
        PipelineStep::SaveDigitalVersion,
    ] {
        assert_eq!(report.outcome_of(step), Some(&StepOutcome::Done), "{}", step);
    }
    assert!(report.pdf_path.as_ref().unwrap().exists());

    let store = LocalStore::new(&db);
    let backups = store.list_backups(patient.id).unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(report.backup_key.as_deref(), Some(backups[0].as_str()));
    let backup = store.load_backup(&backups[0]).unwrap().unwrap();
    assert_eq!(backup.record.status, RecordStatus::Completed);
    assert_eq!(backup.record.diagnostico, "Gingivitis generalizada");

    let version = store.load_digital_version(&report.history_id).unwrap().unwrap();
    assert_eq!(version.form.patient_id, patient.id);
    assert_eq!(store.error_log().unwrap().len(), 1);

    assert_eq!(wizard.status(), RecordStatus::Completed);
    assert!(matches!(wizard.phase(), WizardPhase::Finished(HistoryId::Offline(_))));
}

#[test]
fn test_failed_backup_asks_for_retry_or_exit() {
    let db = Database::open_in_memory().unwrap();
    let patient = patient(&db);
    let dir = tempfile::tempdir().unwrap();
    let files = FileStore::open(&FileStorageConfig::under(dir.path())).unwrap();

    let service = PersistenceService::new(unreachable_backend(), LocalStore::new(&db), &files);
    let mut wizard = ClinicalHistoryWizard::start(
        patient.clone(),
        NaiveDate::from_ymd_opt(2026, 8, 21).unwrap(),
        service,
        &WizardTiming::default(),
    );
    walk_to_last_section(&mut wizard, Instant::now());

    // Device storage gone: the backup cannot be written either.
    db.conn().execute_batch("DROP TABLE local_storage").unwrap();

    let outcome = wizard.finish().unwrap();
    assert!(matches!(outcome, FinishOutcome::NeedsDecision { .. }));
    assert_eq!(wizard.phase(), &WizardPhase::AwaitingDecision);
    assert_ne!(wizard.status(), RecordStatus::Completed);
    assert_eq!(std::fs::read_dir(files.download_dir()).unwrap().count(), 0);

    let retried = wizard.retry_finish().unwrap();
    assert!(matches!(retried, FinishOutcome::NeedsDecision { .. }));

    assert!(wizard.exit().is_none());
    assert_eq!(wizard.phase(), &WizardPhase::Exited);
}

#[test]
fn test_jump_ahead_after_debounced_edits() {
    let db = Database::open_in_memory().unwrap();
    let patient = patient(&db);
    let dir = tempfile::tempdir().unwrap();
    let files = FileStore::open(&FileStorageConfig::under(dir.path())).unwrap();
    let service = PersistenceService::new(&db, LocalStore::new(&db), &files);

    let timing = WizardTiming {
        debounce: Duration::from_millis(500),
        ..WizardTiming::default()
    };
    let mut wizard = ClinicalHistoryWizard::start(
        patient,
        NaiveDate::from_ymd_opt(2026, 8, 22).unwrap(),
        service,
        &timing,
    );

    let t0 = Instant::now();
    for index in 1..=5 {
        wizard
            .update_section(section_json(index), t0 + Duration::from_millis(100 * u64::from(index)))
            .unwrap();
    }
    // Still inside the debounce window of the last edit.
    assert!(wizard.tick(t0 + Duration::from_millis(900)).is_empty());
    assert!(wizard.jump_to(6).is_err());
    assert_eq!(wizard.current_section(), Section::Identification);

    let rechecked = wizard.tick(t0 + Duration::from_millis(1000));
    assert_eq!(rechecked.len(), 5);
    assert_eq!(wizard.jump_to(6).unwrap(), Section::Exams);
    assert!(wizard.jump_to(7).is_err());
}
