//! Clinical history records as stored by the record service.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::form::ClinicalHistoryForm;
use super::patient::Patient;
use super::sections::{
    ChiefComplaint, ExtraoralExam, FamilyHistory, Identification, IntraoralExam,
    NonPathologicalHistory, PathologicalHistory, TreatmentPlan,
};
use crate::text::clean_text;

/// Record lifecycle status. Only ever moves forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Draft,
    InProgress,
    Completed,
    /// Soft-deleted
    Archived,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Draft => "draft",
            RecordStatus::InProgress => "in_progress",
            RecordStatus::Completed => "completed",
            RecordStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" | "borrador" => Some(RecordStatus::Draft),
            "in_progress" | "en_proceso" => Some(RecordStatus::InProgress),
            "completed" | "completado" => Some(RecordStatus::Completed),
            "archived" | "archivado" => Some(RecordStatus::Archived),
            _ => None,
        }
    }

    /// Forward-only: staying put is allowed, going back is not.
    pub fn can_transition_to(&self, next: RecordStatus) -> bool {
        next >= *self
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier returned by a save: a server row ID, or a synthetic local one
/// when the backend was unreachable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum HistoryId {
    Server(i64),
    Offline(String),
}

impl HistoryId {
    /// New synthetic ID for an offline save.
    pub fn offline() -> Self {
        HistoryId::Offline(format!("offline-{}", uuid::Uuid::new_v4()))
    }

    pub fn server_id(&self) -> Option<i64> {
        match self {
            HistoryId::Server(id) => Some(*id),
            HistoryId::Offline(_) => None,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, HistoryId::Offline(_))
    }
}

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryId::Server(id) => write!(f, "{}", id),
            HistoryId::Offline(key) => f.write_str(key),
        }
    }
}

/// Snapshot of the patient's demographics at consultation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalData {
    pub nombre: Option<String>,
    pub apellido_paterno: Option<String>,
    pub apellido_materno: Option<String>,
    pub sexo: Option<String>,
    pub fecha_nacimiento: Option<String>,
    pub edad: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
}

impl PersonalData {
    /// Form values win; the patient row fills the gaps.
    pub fn snapshot(patient: &Patient, ident: &Identification) -> Self {
        fn pick(form: &Option<String>, stored: Option<&str>) -> Option<String> {
            form.as_deref()
                .and_then(clean_text)
                .or_else(|| stored.and_then(clean_text))
                .map(str::to_string)
        }

        Self {
            nombre: pick(&ident.nombre, Some(&patient.nombre)),
            apellido_paterno: pick(&ident.apellido_paterno, patient.apellido_paterno.as_deref()),
            apellido_materno: pick(&ident.apellido_materno, patient.apellido_materno.as_deref()),
            sexo: pick(&ident.sexo, patient.sexo.as_deref()),
            fecha_nacimiento: pick(&ident.fecha_nacimiento, patient.fecha_nacimiento.as_deref()),
            edad: pick(&ident.edad, None),
            telefono: pick(&ident.telefono, patient.telefono.as_deref()),
            email: pick(&ident.email, patient.email.as_deref()),
        }
    }
}

/// Request context captured for audit columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditContext {
    pub user_id: Option<i64>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Payload for creating a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    pub appointment_id: Option<i64>,
    pub consultation_date: NaiveDate,
    pub status: RecordStatus,
    pub version: String,
    #[serde(default)]
    pub datos_personales: PersonalData,
    #[serde(default)]
    pub ficha_identificacion: Identification,
    #[serde(default)]
    pub motivo_consulta: ChiefComplaint,
    #[serde(default)]
    pub antecedentes_heredofamiliares: FamilyHistory,
    #[serde(default)]
    pub antecedentes_personales_no_patologicos: NonPathologicalHistory,
    #[serde(default)]
    pub antecedentes_personales_patologicos: PathologicalHistory,
    #[serde(default)]
    pub examen_extraoral: ExtraoralExam,
    #[serde(default)]
    pub examen_intraoral: IntraoralExam,
    #[serde(default)]
    pub plan_tratamiento: TreatmentPlan,
    #[serde(default)]
    pub diagnostico: String,
    #[serde(default)]
    pub tratamiento: String,
    #[serde(default)]
    pub audit: AuditContext,
}

impl NewRecord {
    /// Empty record for a patient (used when documentation starts from an appointment).
    pub fn empty(patient_id: i64, consultation_date: NaiveDate) -> Self {
        Self {
            patient_id,
            doctor_id: None,
            appointment_id: None,
            consultation_date,
            status: RecordStatus::Draft,
            version: "1.0".to_string(),
            datos_personales: PersonalData::default(),
            ficha_identificacion: Identification::default(),
            motivo_consulta: ChiefComplaint::default(),
            antecedentes_heredofamiliares: FamilyHistory::default(),
            antecedentes_personales_no_patologicos: NonPathologicalHistory::default(),
            antecedentes_personales_patologicos: PathologicalHistory::default(),
            examen_extraoral: ExtraoralExam::default(),
            examen_intraoral: IntraoralExam::default(),
            plan_tratamiento: TreatmentPlan::default(),
            diagnostico: String::new(),
            tratamiento: String::new(),
            audit: AuditContext::default(),
        }
    }

    /// Aggregate the wizard form into a creatable record.
    pub fn from_form(form: &ClinicalHistoryForm, patient: &Patient, status: RecordStatus) -> Self {
        Self {
            patient_id: form.patient_id,
            doctor_id: form.doctor_id,
            appointment_id: form.appointment_id,
            consultation_date: form.consultation_date,
            status,
            version: "1.0".to_string(),
            datos_personales: PersonalData::snapshot(patient, &form.identification),
            ficha_identificacion: form.identification.clone(),
            motivo_consulta: form.chief_complaint.clone(),
            antecedentes_heredofamiliares: form.family_history.clone(),
            antecedentes_personales_no_patologicos: form.non_pathological.clone(),
            antecedentes_personales_patologicos: form.pathological.clone(),
            examen_extraoral: form.extraoral.clone(),
            examen_intraoral: form.intraoral.clone(),
            plan_tratamiento: form.treatment_plan.clone(),
            diagnostico: form.diagnosis.clone(),
            tratamiento: form.treatment.clone(),
            audit: AuditContext {
                user_id: form.doctor_id,
                ..AuditContext::default()
            },
        }
    }
}

/// A persisted clinical history record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalHistoryRecord {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    pub appointment_id: Option<i64>,
    pub consultation_date: NaiveDate,
    pub status: RecordStatus,
    pub version: String,
    #[serde(default)]
    pub datos_personales: PersonalData,
    #[serde(default)]
    pub ficha_identificacion: Identification,
    #[serde(default)]
    pub motivo_consulta: ChiefComplaint,
    #[serde(default)]
    pub antecedentes_heredofamiliares: FamilyHistory,
    #[serde(default)]
    pub antecedentes_personales_no_patologicos: NonPathologicalHistory,
    #[serde(default)]
    pub antecedentes_personales_patologicos: PathologicalHistory,
    #[serde(default)]
    pub examen_extraoral: ExtraoralExam,
    #[serde(default)]
    pub examen_intraoral: IntraoralExam,
    #[serde(default)]
    pub plan_tratamiento: TreatmentPlan,
    #[serde(default)]
    pub diagnostico: String,
    #[serde(default)]
    pub tratamiento: String,
    pub pdf_filename: Option<String>,
    pub pdf_path: Option<String>,
    pub pdf_size: Option<i64>,
    pub pdf_saved_at: Option<String>,
    pub created_by: Option<i64>,
    pub updated_by: Option<i64>,
    pub creation_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ClinicalHistoryRecord {
    pub fn is_archived(&self) -> bool {
        self.status == RecordStatus::Archived
    }

    pub fn has_pdf(&self) -> bool {
        self.pdf_filename.is_some()
    }
}

/// Partial update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ficha_identificacion: Option<Identification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motivo_consulta: Option<ChiefComplaint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub antecedentes_heredofamiliares: Option<FamilyHistory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub antecedentes_personales_no_patologicos: Option<NonPathologicalHistory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub antecedentes_personales_patologicos: Option<PathologicalHistory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examen_extraoral: Option<ExtraoralExam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub examen_intraoral: Option<IntraoralExam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_tratamiento: Option<TreatmentPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostico: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tratamiento: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<i64>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        *self == RecordPatch::default()
    }
}

/// Body of the diagnosis/treatment partial update.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisTreatment {
    pub diagnostico: String,
    pub tratamiento: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<i64>,
}

impl From<DiagnosisTreatment> for RecordPatch {
    fn from(dt: DiagnosisTreatment) -> Self {
        RecordPatch {
            diagnostico: Some(dt.diagnostico),
            tratamiento: Some(dt.tratamiento),
            updated_by: dt.updated_by,
            ..RecordPatch::default()
        }
    }
}
