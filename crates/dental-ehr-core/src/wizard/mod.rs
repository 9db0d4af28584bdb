//! Clinical history wizard.
//!
//! A seven-step state machine over one [`ClinicalHistoryForm`]. Moving forward
//! requires the current section to validate; moving back never does. Edits are
//! revalidated after a debounce so the set of validated sections stays current
//! for jumps. Finishing runs the [`FinishPipeline`].
//!
//! The wizard owns no clock: callers pass `Instant`s to [`ClinicalHistoryWizard::update_section`]
//! and [`ClinicalHistoryWizard::tick`] from their event loop.

mod pipeline;
mod poller;
mod section;

pub use pipeline::*;
pub use poller::*;
pub use section::*;

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::backend::HistoryBackend;
use crate::config::WizardTiming;
use crate::models::{
    ClinicalHistoryForm, HistoryId, Patient, RecordStatus, SectionData, TreatmentPlan,
};
use crate::persistence::PersistenceService;
use crate::storage::StorageError;
use crate::timers::Debouncer;
use crate::validation::ValidationOutcome;

/// Why a navigation request was refused. The wizard is left unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavigationError {
    #[error("La sección {section} tiene datos incompletos")]
    Invalid {
        section: Section,
        outcome: ValidationOutcome,
    },

    #[error("Complete la sección {first_unvalidated} antes de ir a la sección {target}")]
    Locked {
        target: Section,
        first_unvalidated: Section,
    },

    #[error("Sección desconocida: {0}")]
    UnknownSection(u8),

    #[error("El historial ya no admite cambios")]
    Closed,
}

#[derive(Error, Debug)]
pub enum WizardError {
    #[error("Finish is only available on the last section (current: {0})")]
    NotAtLastSection(Section),

    #[error("The wizard is closed")]
    Closed,

    #[error("No finish attempt is waiting for a decision")]
    NoPendingDecision,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type WizardResult<T> = Result<T, WizardError>;

/// Where the wizard is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum WizardPhase {
    Editing,
    /// Finish failed outright; the user picks retry or exit
    AwaitingDecision,
    Finished(HistoryId),
    Exited,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// Saved (possibly degraded); show the patient's records next
    Completed(PipelineReport),
    /// Required data missing; nothing was saved
    Blocked { messages: Vec<String> },
    /// Nothing could be saved, not even locally
    NeedsDecision { error: String },
}

pub struct ClinicalHistoryWizard<'a, B> {
    patient: Patient,
    form: ClinicalHistoryForm,
    current: Section,
    validated: BTreeSet<Section>,
    last_errors: Option<ValidationOutcome>,
    dirty: BTreeSet<Section>,
    debounce: Debouncer,
    status: RecordStatus,
    phase: WizardPhase,
    service: PersistenceService<'a, B>,
}

impl<'a, B: HistoryBackend> ClinicalHistoryWizard<'a, B> {
    /// Start a fresh consultation, prefilled from the patient's registration.
    pub fn start(
        patient: Patient,
        consultation_date: NaiveDate,
        service: PersistenceService<'a, B>,
        timing: &WizardTiming,
    ) -> Self {
        let mut form = ClinicalHistoryForm::new(patient.id, consultation_date);
        let ident = &mut form.identification;
        ident.nombre = Some(patient.nombre.clone());
        ident.apellido_paterno = patient.apellido_paterno.clone();
        ident.apellido_materno = patient.apellido_materno.clone();
        ident.sexo = patient.sexo.clone();
        ident.fecha_nacimiento = patient.fecha_nacimiento.clone();
        ident.telefono = patient.telefono.clone();
        ident.email = patient.email.clone();

        Self::with_form(patient, form, service, timing)
    }

    /// Wizard over an existing form. Starts at section 1 with nothing validated.
    pub fn with_form(
        patient: Patient,
        form: ClinicalHistoryForm,
        service: PersistenceService<'a, B>,
        timing: &WizardTiming,
    ) -> Self {
        Self {
            patient,
            form,
            current: Section::FIRST,
            validated: BTreeSet::new(),
            last_errors: None,
            dirty: BTreeSet::new(),
            debounce: Debouncer::new(timing.debounce),
            status: RecordStatus::Draft,
            phase: WizardPhase::Editing,
            service,
        }
    }

    /// Reopen the patient's saved draft, if any.
    ///
    /// Sections are revalidated and the wizard lands on the first one that
    /// does not pass.
    pub fn resume(
        patient: Patient,
        service: PersistenceService<'a, B>,
        timing: &WizardTiming,
    ) -> WizardResult<Option<Self>> {
        let Some(form) = service.store().load_draft(patient.id)? else {
            return Ok(None);
        };

        let mut wizard = Self::with_form(patient, form, service, timing);
        for section in Section::ALL {
            if section.validate(&wizard.form).is_valid {
                wizard.validated.insert(section);
            }
        }
        wizard.current = wizard.first_unvalidated_before(None).unwrap_or(Section::LAST);
        if !wizard.validated.is_empty() {
            wizard.status = RecordStatus::InProgress;
        }
        info!(
            patient_id = wizard.patient.id,
            section = wizard.current.number(),
            "draft resumed"
        );
        Ok(Some(wizard))
    }

    pub fn current_section(&self) -> Section {
        self.current
    }

    pub fn is_validated(&self, section: Section) -> bool {
        self.validated.contains(&section)
    }

    pub fn validated_sections(&self) -> impl Iterator<Item = Section> + '_ {
        self.validated.iter().copied()
    }

    /// Errors from the last failed attempt to leave a section.
    pub fn last_errors(&self) -> Option<&ValidationOutcome> {
        self.last_errors.as_ref()
    }

    pub fn form(&self) -> &ClinicalHistoryForm {
        &self.form
    }

    pub fn patient(&self) -> &Patient {
        &self.patient
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn phase(&self) -> &WizardPhase {
        &self.phase
    }

    pub fn service(&self) -> &PersistenceService<'a, B> {
        &self.service
    }

    fn is_open(&self) -> bool {
        matches!(
            self.phase,
            WizardPhase::Editing | WizardPhase::AwaitingDecision
        )
    }

    fn first_unvalidated_before(&self, target: Option<Section>) -> Option<Section> {
        Section::ALL
            .into_iter()
            .take_while(|s| target.map_or(true, |t| *s < t))
            .find(|s| !self.validated.contains(s))
    }

    fn mark_dirty(&mut self, section: Section, now: Instant) {
        self.dirty.insert(section);
        self.debounce.trigger(now);
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Replace one section's data and schedule revalidation.
    pub fn update_section(&mut self, data: SectionData, now: Instant) -> Result<(), NavigationError> {
        if !self.is_open() {
            return Err(NavigationError::Closed);
        }
        let index = data.index();
        let section =
            Section::for_validation_index(index).ok_or(NavigationError::UnknownSection(index))?;
        self.form.apply(data);
        self.mark_dirty(section, now);
        Ok(())
    }

    /// Set the planning notes; occlusion findings are left as they are.
    pub fn update_plan_notes(&mut self, notes: TreatmentPlan, now: Instant) -> Result<(), NavigationError> {
        if !self.is_open() {
            return Err(NavigationError::Closed);
        }
        let plan = &mut self.form.treatment_plan;
        plan.fases = notes.fases;
        plan.pronostico = notes.pronostico;
        plan.observaciones = notes.observaciones;
        plan.proxima_cita = notes.proxima_cita;
        self.mark_dirty(Section::OcclusionAndPlan, now);
        Ok(())
    }

    pub fn set_closing_texts(
        &mut self,
        diagnosis: impl Into<String>,
        treatment: impl Into<String>,
        now: Instant,
    ) -> Result<(), NavigationError> {
        if !self.is_open() {
            return Err(NavigationError::Closed);
        }
        self.form.diagnosis = diagnosis.into();
        self.form.treatment = treatment.into();
        self.mark_dirty(Section::OcclusionAndPlan, now);
        Ok(())
    }

    /// Run the debounced revalidation if it is due.
    ///
    /// Returns the outcomes of the sections that were rechecked.
    pub fn tick(&mut self, now: Instant) -> Vec<ValidationOutcome> {
        if !self.debounce.fire(now) {
            return Vec::new();
        }

        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .map(|section| {
                let outcome = section.validate(&self.form);
                if outcome.is_valid {
                    self.validated.insert(section);
                } else {
                    self.validated.remove(&section);
                }
                debug!(
                    section = section.number(),
                    valid = outcome.is_valid,
                    "section revalidated"
                );
                outcome
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Validate the current section, keep a draft, and advance.
    pub fn go_next(&mut self) -> Result<Section, NavigationError> {
        if !self.is_open() {
            return Err(NavigationError::Closed);
        }

        let section = self.current;
        let outcome = section.validate(&self.form);
        if !outcome.is_valid {
            self.validated.remove(&section);
            debug!(
                section = section.number(),
                errors = outcome.errors.len(),
                "section incomplete"
            );
            self.last_errors = Some(outcome.clone());
            return Err(NavigationError::Invalid { section, outcome });
        }

        self.validated.insert(section);
        self.dirty.remove(&section);
        self.last_errors = None;
        if self.status == RecordStatus::Draft {
            self.status = RecordStatus::InProgress;
        }

        if let Err(e) = self.service.store().save_draft(&self.form) {
            warn!(patient_id = self.patient.id, error = %e, "draft not saved");
            self.service.note_error("borrador", &e.to_string());
        }

        self.current = section.next();
        Ok(self.current)
    }

    pub fn go_previous(&mut self) -> Result<Section, NavigationError> {
        if !self.is_open() {
            return Err(NavigationError::Closed);
        }
        self.last_errors = None;
        self.current = self.current.previous();
        Ok(self.current)
    }

    /// Jump to a section by number.
    ///
    /// Going back is always allowed. Going forward requires every section
    /// before the target to be validated.
    pub fn jump_to(&mut self, number: u8) -> Result<Section, NavigationError> {
        if !self.is_open() {
            return Err(NavigationError::Closed);
        }
        let target = Section::from_number(number).ok_or(NavigationError::UnknownSection(number))?;

        if target > self.current {
            if let Some(first_unvalidated) = self.first_unvalidated_before(Some(target)) {
                return Err(NavigationError::Locked {
                    target,
                    first_unvalidated,
                });
            }
        }

        self.last_errors = None;
        self.current = target;
        Ok(target)
    }

    // ------------------------------------------------------------------
    // Finishing
    // ------------------------------------------------------------------

    /// Close the consultation from the last section.
    pub fn finish(&mut self) -> WizardResult<FinishOutcome> {
        if !self.is_open() {
            return Err(WizardError::Closed);
        }
        if self.current != Section::LAST {
            return Err(WizardError::NotAtLastSection(self.current));
        }

        let outcome = self.current.validate(&self.form);
        if !outcome.is_valid {
            self.validated.remove(&self.current);
            let messages = outcome.messages();
            self.last_errors = Some(outcome);
            return Ok(FinishOutcome::Blocked { messages });
        }
        self.validated.insert(self.current);

        let mut messages = Vec::new();
        let missing = self.form.missing_identity();
        if !missing.is_empty() {
            messages.push(format!(
                "Faltan datos de identificación: {}",
                missing.join(", ")
            ));
        }
        let missing = self.form.missing_closing_texts();
        if !missing.is_empty() {
            messages.push(format!("Campos obligatorios: {}", missing.join(", ")));
        }
        if !messages.is_empty() {
            warn!(patient_id = self.patient.id, ?messages, "finish blocked");
            return Ok(FinishOutcome::Blocked { messages });
        }

        self.debounce.cancel();
        self.dirty.clear();

        match FinishPipeline::new(&self.service).run(&self.form, &self.patient) {
            Ok(report) => {
                self.status = RecordStatus::Completed;
                self.phase = WizardPhase::Finished(report.history_id.clone());
                if let Err(e) = self.service.store().clear_draft(self.patient.id) {
                    warn!(patient_id = self.patient.id, error = %e, "draft not cleared");
                }
                Ok(FinishOutcome::Completed(report))
            }
            Err(e) => {
                error!(patient_id = self.patient.id, error = %e, "finish failed");
                self.service.note_error("finalizar", &e.to_string());
                self.phase = WizardPhase::AwaitingDecision;
                Ok(FinishOutcome::NeedsDecision {
                    error: e.to_string(),
                })
            }
        }
    }

    /// Try the finish again after a failed attempt.
    pub fn retry_finish(&mut self) -> WizardResult<FinishOutcome> {
        if self.phase != WizardPhase::AwaitingDecision {
            return Err(WizardError::NoPendingDecision);
        }
        self.finish()
    }

    /// Leave the wizard. An unfinished form is kept as the patient's draft.
    ///
    /// Returns the draft key when one was written.
    pub fn exit(&mut self) -> Option<String> {
        let keep_draft = self.is_open();
        self.phase = WizardPhase::Exited;
        self.debounce.cancel();
        if !keep_draft {
            return None;
        }

        match self.service.store().save_draft(&self.form) {
            Ok(key) => {
                info!(patient_id = self.patient.id, "wizard exited, draft kept");
                Some(key)
            }
            Err(e) => {
                warn!(patient_id = self.patient.id, error = %e, "draft not saved on exit");
                self.service.note_error("borrador", &e.to_string());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileStorageConfig;
    use crate::db::Database;
    use crate::files::FileStore;
    use crate::storage::LocalStore;
    use serde_json::json;
    use std::time::Duration;

    fn section(index: u8, value: serde_json::Value) -> SectionData {
        SectionData::from_json(index, value).unwrap().unwrap()
    }

    fn complete_section(index: u8) -> SectionData {
        let value = match index {
            1 => json!({"nombre": "Ana", "apellidoPaterno": "Ruiz", "sexo": "Femenino", "edad": 34}),
            2 => json!({"motivoConsulta": "Dolor en molar inferior"}),
            3 => json!({"padre": {"otras": "Diabetes"}, "madre": {"otras": "Hipertensión"}}),
            4 => json!({"higieneBucal": {"cepillado": "2 veces"}, "habitos": {"tabaquismo": true}}),
            5 => json!({"alergias": {"medicamentos": "Penicilina"}, "cirugias": {"descripcion": "Apendicectomía"}}),
            6 => json!({"cabeza": {"forma": "Mesocéfalo"}, "cara": {"perfil": "Recto"}}),
            7 => json!({
                "encias": {"color": "Rosa coral"},
                "lengua": {"aspecto": "Normal"},
                "paladar": {"duro": "Sin alteraciones"}
            }),
            8 => json!({"relacionMolar": {"derecha": "Clase I"}, "sobremordida": {"vertical": "2 mm"}}),
            _ => unreachable!(),
        };
        section(index, value)
    }

    struct Fixture {
        db: Database,
        files: FileStore,
        _dir: tempfile::TempDir,
        patient: Patient,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            let mut patient = Patient::new("Ana".into(), Some("Ruiz".into()));
            patient.sexo = Some("Femenino".into());
            let patient = db.insert_patient(&patient).unwrap();
            let dir = tempfile::tempdir().unwrap();
            let files = FileStore::open(&FileStorageConfig::under(dir.path())).unwrap();
            Self {
                db,
                files,
                _dir: dir,
                patient,
            }
        }

        fn wizard(&self) -> ClinicalHistoryWizard<'_, &Database> {
            let service = PersistenceService::new(&self.db, LocalStore::new(&self.db), &self.files);
            ClinicalHistoryWizard::start(
                self.patient.clone(),
                NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
                service,
                &WizardTiming::default(),
            )
        }
    }

    fn fill_all(wizard: &mut ClinicalHistoryWizard<'_, &Database>, now: Instant) {
        for index in 1..=8 {
            wizard.update_section(complete_section(index), now).unwrap();
        }
    }

    #[test]
    fn test_initial_state() {
        let fx = Fixture::new();
        let wizard = fx.wizard();
        assert_eq!(wizard.current_section(), Section::FIRST);
        assert_eq!(wizard.validated_sections().count(), 0);
        assert_eq!(wizard.status(), RecordStatus::Draft);
        assert_eq!(wizard.form().identification.nombre.as_deref(), Some("Ana"));
    }

    #[test]
    fn test_go_next_blocks_on_invalid_section() {
        let fx = Fixture::new();
        let mut wizard = fx.wizard();

        let err = wizard.go_next().unwrap_err();
        match err {
            NavigationError::Invalid { section, outcome } => {
                assert_eq!(section, Section::Identification);
                assert!(outcome.errors.contains_key("edad"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(wizard.current_section(), Section::Identification);
        assert!(wizard.last_errors().is_some());
    }

    #[test]
    fn test_go_next_saves_draft_and_advances() {
        let fx = Fixture::new();
        let mut wizard = fx.wizard();
        let now = Instant::now();
        wizard.update_section(complete_section(1), now).unwrap();

        assert_eq!(wizard.go_next().unwrap(), Section::ChiefComplaint);
        assert!(wizard.is_validated(Section::Identification));
        assert_eq!(wizard.status(), RecordStatus::InProgress);
        assert!(LocalStore::new(&fx.db)
            .load_draft(fx.patient.id)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_go_previous_is_unconditional_and_capped() {
        let fx = Fixture::new();
        let mut wizard = fx.wizard();
        assert_eq!(wizard.go_previous(), Ok(Section::FIRST));

        wizard.update_section(complete_section(1), Instant::now()).unwrap();
        wizard.go_next().unwrap();
        assert_eq!(wizard.go_previous(), Ok(Section::Identification));
    }

    #[test]
    fn test_jump_forward_requires_validated_prefix() {
        let fx = Fixture::new();
        let mut wizard = fx.wizard();
        wizard.update_section(complete_section(1), Instant::now()).unwrap();
        wizard.go_next().unwrap();

        let err = wizard.jump_to(4).unwrap_err();
        assert_eq!(
            err,
            NavigationError::Locked {
                target: Section::NonPathologicalHistory,
                first_unvalidated: Section::ChiefComplaint,
            }
        );
        assert!(err.to_string().contains("Motivo de consulta"));
        assert_eq!(wizard.current_section(), Section::ChiefComplaint);

        assert_eq!(wizard.jump_to(1).unwrap(), Section::Identification);
        assert_eq!(wizard.jump_to(2).unwrap(), Section::ChiefComplaint);
        assert_eq!(wizard.jump_to(9), Err(NavigationError::UnknownSection(9)));
    }

    #[test]
    fn test_debounced_revalidation_unlocks_jump() {
        let fx = Fixture::new();
        let mut wizard = fx.wizard();
        let t0 = Instant::now();
        fill_all(&mut wizard, t0);

        assert!(wizard.tick(t0 + Duration::from_millis(100)).is_empty());
        assert!(wizard.jump_to(7).is_err());

        let outcomes = wizard.tick(t0 + Duration::from_millis(800));
        assert_eq!(outcomes.len(), 7);
        assert!(outcomes.iter().all(|o| o.is_valid));
        assert_eq!(wizard.jump_to(7).unwrap(), Section::OcclusionAndPlan);
    }

    #[test]
    fn test_revalidation_drops_section_that_became_invalid() {
        let fx = Fixture::new();
        let mut wizard = fx.wizard();
        let t0 = Instant::now();
        wizard.update_section(complete_section(1), t0).unwrap();
        wizard.go_next().unwrap();

        wizard
            .update_section(SectionData::empty(1).unwrap(), t0)
            .unwrap();
        wizard.tick(t0 + Duration::from_secs(1));
        assert!(!wizard.is_validated(Section::Identification));
    }

    #[test]
    fn test_finish_only_from_last_section() {
        let fx = Fixture::new();
        let mut wizard = fx.wizard();
        assert!(matches!(
            wizard.finish(),
            Err(WizardError::NotAtLastSection(Section::Identification))
        ));
    }

    #[test]
    fn test_finish_blocked_without_closing_texts() {
        let fx = Fixture::new();
        let mut wizard = fx.wizard();
        let t0 = Instant::now();
        fill_all(&mut wizard, t0);
        wizard.tick(t0 + Duration::from_secs(1));
        wizard.jump_to(7).unwrap();

        let outcome = wizard.finish().unwrap();
        match outcome {
            FinishOutcome::Blocked { messages } => {
                assert_eq!(messages.len(), 1);
                assert!(messages[0].contains("diagnóstico"));
                assert!(messages[0].contains("tratamiento"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_ne!(wizard.status(), RecordStatus::Completed);
        assert_eq!(wizard.phase(), &WizardPhase::Editing);
    }

    #[test]
    fn test_finish_completes_and_clears_draft() {
        let fx = Fixture::new();
        let mut wizard = fx.wizard();
        let t0 = Instant::now();
        fill_all(&mut wizard, t0);
        for _ in 0..6 {
            wizard.go_next().unwrap();
        }
        wizard
            .set_closing_texts("Caries en 46", "Endodoncia y corona", t0)
            .unwrap();

        let outcome = wizard.finish().unwrap();
        let report = match outcome {
            FinishOutcome::Completed(report) => report,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(report.patient_id, fx.patient.id);
        assert_eq!(wizard.status(), RecordStatus::Completed);
        assert!(matches!(wizard.phase(), WizardPhase::Finished(HistoryId::Server(_))));
        assert!(LocalStore::new(&fx.db)
            .load_draft(fx.patient.id)
            .unwrap()
            .is_none());
        assert_eq!(wizard.go_next(), Err(NavigationError::Closed));
        assert_eq!(wizard.go_previous(), Err(NavigationError::Closed));
        assert_eq!(wizard.jump_to(1), Err(NavigationError::Closed));
        assert_eq!(wizard.current_section(), Section::LAST);
        assert!(wizard.exit().is_none());
    }

    #[test]
    fn test_exit_keeps_draft_for_resume() {
        let fx = Fixture::new();
        let mut wizard = fx.wizard();
        let t0 = Instant::now();
        for index in 1..=3 {
            wizard.update_section(complete_section(index), t0).unwrap();
        }
        assert!(wizard.exit().is_some());
        assert!(matches!(wizard.retry_finish(), Err(WizardError::NoPendingDecision)));
        assert_eq!(wizard.jump_to(1), Err(NavigationError::Closed));
        assert_eq!(wizard.go_previous(), Err(NavigationError::Closed));
        drop(wizard);

        let service = PersistenceService::new(&fx.db, LocalStore::new(&fx.db), &fx.files);
        let resumed =
            ClinicalHistoryWizard::resume(fx.patient.clone(), service, &WizardTiming::default())
                .unwrap()
                .unwrap();
        assert_eq!(resumed.current_section(), Section::NonPathologicalHistory);
        assert!(resumed.is_validated(Section::FamilyHistory));
        assert_eq!(resumed.status(), RecordStatus::InProgress);
    }
}
