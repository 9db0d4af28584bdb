//! The four-step finish pipeline: save, PDF, local copy, digital version.
//!
//! Steps run in order and always all run. A failing step is recorded as
//! [`StepOutcome::Degraded`] and the next one still runs; only a save that
//! cannot even be backed up locally aborts the pipeline.

use std::fmt;
use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::HistoryBackend;
use crate::models::{ClinicalHistoryForm, HistoryId, NewRecord, Patient, RecordStatus};
use crate::persistence::{DegradedReason, PersistenceResult, PersistenceService};
use crate::report::ReportMeta;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Save,
    GeneratePdf,
    SaveLocally,
    SaveDigitalVersion,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Save => "save",
            PipelineStep::GeneratePdf => "generate_pdf",
            PipelineStep::SaveLocally => "save_locally",
            PipelineStep::SaveDigitalVersion => "save_digital_version",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    Done,
    Degraded(DegradedReason),
}

impl StepOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, StepOutcome::Done)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: PipelineStep,
    pub outcome: StepOutcome,
}

/// What a finished consultation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub history_id: HistoryId,
    /// Patient whose record view to show next
    pub patient_id: i64,
    pub message: String,
    pub backup_key: Option<String>,
    pub pdf_filename: Option<String>,
    pub pdf_path: Option<PathBuf>,
    pub digital_version_key: Option<String>,
    pub steps: Vec<StepReport>,
}

impl PipelineReport {
    pub fn is_offline(&self) -> bool {
        self.history_id.is_offline()
    }

    /// True when any step fell back or failed.
    pub fn is_degraded(&self) -> bool {
        self.steps.iter().any(|s| !s.outcome.is_done())
    }

    pub fn outcome_of(&self, step: PipelineStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| &s.outcome)
    }

    pub fn degraded_reasons(&self) -> impl Iterator<Item = &DegradedReason> {
        self.steps.iter().filter_map(|s| match &s.outcome {
            StepOutcome::Degraded(reason) => Some(reason),
            StepOutcome::Done => None,
        })
    }
}

fn record_step<T>(
    steps: &mut Vec<StepReport>,
    step: PipelineStep,
    result: Result<T, DegradedReason>,
) -> Option<T> {
    match result {
        Ok(value) => {
            steps.push(StepReport {
                step,
                outcome: StepOutcome::Done,
            });
            Some(value)
        }
        Err(reason) => {
            warn!(step = %step, reason = %reason, "finish step degraded");
            steps.push(StepReport {
                step,
                outcome: StepOutcome::Degraded(reason),
            });
            None
        }
    }
}

pub struct FinishPipeline<'s, 'a, B> {
    service: &'s PersistenceService<'a, B>,
}

impl<'s, 'a, B: HistoryBackend> FinishPipeline<'s, 'a, B> {
    pub fn new(service: &'s PersistenceService<'a, B>) -> Self {
        Self { service }
    }

    /// Save the form as a completed record and produce its artifacts.
    pub fn run(
        &self,
        form: &ClinicalHistoryForm,
        patient: &Patient,
    ) -> PersistenceResult<PipelineReport> {
        let mut steps = Vec::with_capacity(4);

        let record = NewRecord::from_form(form, patient, RecordStatus::Completed);
        let saved = self.service.save(&record)?;
        steps.push(StepReport {
            step: PipelineStep::Save,
            outcome: match &saved.degraded {
                None => StepOutcome::Done,
                Some(reason) => StepOutcome::Degraded(reason.clone()),
            },
        });

        let meta = ReportMeta {
            history_id: Some(saved.history_id.clone()),
            status: RecordStatus::Completed,
            generated_at: Local::now(),
        };
        let pdf = record_step(
            &mut steps,
            PipelineStep::GeneratePdf,
            self.service.generate_pdf(form, patient, &meta),
        );

        let saved_to = match &pdf {
            Some(report) => self.service.save_locally(report),
            None => Err(DegradedReason::PdfUnavailable),
        };
        let pdf_path = record_step(&mut steps, PipelineStep::SaveLocally, saved_to);

        let digital_version_key = record_step(
            &mut steps,
            PipelineStep::SaveDigitalVersion,
            self.service.save_digital_version(&saved.history_id, form),
        );

        let report = PipelineReport {
            history_id: saved.history_id,
            patient_id: form.patient_id,
            message: saved.message,
            backup_key: saved.backup_key,
            pdf_filename: pdf.map(|p| p.filename),
            pdf_path,
            digital_version_key,
            steps,
        };
        info!(
            history_id = %report.history_id,
            patient_id = report.patient_id,
            degraded = report.is_degraded(),
            "consultation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileStorageConfig;
    use crate::db::Database;
    use crate::files::FileStore;
    use crate::storage::LocalStore;
    use chrono::NaiveDate;

    #[test]
    fn test_all_steps_done_with_local_backend() {
        let db = Database::open_in_memory().unwrap();
        let patient = db
            .insert_patient(&Patient::new("Ana".into(), Some("Ruiz".into())))
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let files = FileStore::open(&FileStorageConfig::under(dir.path())).unwrap();
        let service = PersistenceService::new(&db, LocalStore::new(&db), &files);

        let mut form = ClinicalHistoryForm::new(patient.id, NaiveDate::from_ymd_opt(2026, 2, 3).unwrap());
        form.identification.nombre = Some("Ana".into());
        form.diagnosis = "Caries oclusal en 36".into();
        form.treatment = "Resina compuesta".into();

        let report = FinishPipeline::new(&service).run(&form, &patient).unwrap();
        assert!(!report.is_degraded(), "{:?}", report.steps);
        assert_eq!(report.steps.len(), 4);
        assert!(!report.is_offline());

        let path = report.pdf_path.as_ref().unwrap();
        assert!(path.exists());
        assert!(std::fs::read(path).unwrap().starts_with(b"%PDF"));

        let id = report.history_id.server_id().unwrap();
        let stored = db.get_record(id).unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Completed);
        assert!(LocalStore::new(&db)
            .load_digital_version(&report.history_id)
            .unwrap()
            .is_some());
    }
}
