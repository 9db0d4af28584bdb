//! The aggregated wizard form.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::record::ClinicalHistoryRecord;
use super::sections::{
    fold_aliases, ChiefComplaint, ExtraoralExam, FamilyHistory, Identification, IntraoralExam,
    NonPathologicalHistory, PathologicalHistory, SectionData, TreatmentPlan,
};
use crate::text::{clean_text, is_filled};

/// Everything the clinician entered across all sections of one consultation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalHistoryForm {
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    pub appointment_id: Option<i64>,
    pub consultation_date: NaiveDate,
    #[serde(default)]
    pub identification: Identification,
    #[serde(default)]
    pub chief_complaint: ChiefComplaint,
    #[serde(default)]
    pub family_history: FamilyHistory,
    #[serde(default)]
    pub non_pathological: NonPathologicalHistory,
    #[serde(default)]
    pub pathological: PathologicalHistory,
    #[serde(default)]
    pub extraoral: ExtraoralExam,
    #[serde(default)]
    pub intraoral: IntraoralExam,
    #[serde(default)]
    pub treatment_plan: TreatmentPlan,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub treatment: String,
}

impl ClinicalHistoryForm {
    pub fn new(patient_id: i64, consultation_date: NaiveDate) -> Self {
        Self {
            patient_id,
            doctor_id: None,
            appointment_id: None,
            consultation_date,
            identification: Identification::default(),
            chief_complaint: ChiefComplaint::default(),
            family_history: FamilyHistory::default(),
            non_pathological: NonPathologicalHistory::default(),
            pathological: PathologicalHistory::default(),
            extraoral: ExtraoralExam::default(),
            intraoral: IntraoralExam::default(),
            treatment_plan: TreatmentPlan::default(),
            diagnosis: String::new(),
            treatment: String::new(),
        }
    }

    /// Parse a form sent by a host screen, accepting legacy key spellings.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        serde_json::from_value(fold_aliases(value))
    }

    /// Form view of a stored record, for re-rendering or re-editing it.
    pub fn from_record(record: &ClinicalHistoryRecord) -> Self {
        Self {
            patient_id: record.patient_id,
            doctor_id: record.doctor_id,
            appointment_id: record.appointment_id,
            consultation_date: record.consultation_date,
            identification: record.ficha_identificacion.clone(),
            chief_complaint: record.motivo_consulta.clone(),
            family_history: record.antecedentes_heredofamiliares.clone(),
            non_pathological: record.antecedentes_personales_no_patologicos.clone(),
            pathological: record.antecedentes_personales_patologicos.clone(),
            extraoral: record.examen_extraoral.clone(),
            intraoral: record.examen_intraoral.clone(),
            treatment_plan: record.plan_tratamiento.clone(),
            diagnosis: record.diagnostico.clone(),
            treatment: record.tratamiento.clone(),
        }
    }

    /// Replace one section with new data.
    pub fn apply(&mut self, data: SectionData) {
        match data {
            SectionData::Identification(s) => self.identification = s,
            SectionData::ChiefComplaint(s) => self.chief_complaint = s,
            SectionData::FamilyHistory(s) => self.family_history = s,
            SectionData::NonPathologicalHistory(s) => self.non_pathological = s,
            SectionData::PathologicalHistory(s) => self.pathological = s,
            SectionData::ExtraoralExam(s) => self.extraoral = s,
            SectionData::IntraoralExam(s) => self.intraoral = s,
            SectionData::Occlusion(s) => self.treatment_plan.oclusion = s,
        }
    }

    /// Current data of a section by validation index.
    pub fn section(&self, index: u8) -> Option<SectionData> {
        Some(match index {
            1 => SectionData::Identification(self.identification.clone()),
            2 => SectionData::ChiefComplaint(self.chief_complaint.clone()),
            3 => SectionData::FamilyHistory(self.family_history.clone()),
            4 => SectionData::NonPathologicalHistory(self.non_pathological.clone()),
            5 => SectionData::PathologicalHistory(self.pathological.clone()),
            6 => SectionData::ExtraoralExam(self.extraoral.clone()),
            7 => SectionData::IntraoralExam(self.intraoral.clone()),
            8 => SectionData::Occlusion(self.treatment_plan.oclusion.clone()),
            _ => return None,
        })
    }

    /// Labels of the identity fields required to close a consultation.
    pub fn missing_identity(&self) -> Vec<&'static str> {
        let ident = &self.identification;
        let mut missing = Vec::new();
        if !is_filled(&ident.nombre) {
            missing.push("nombre");
        }
        if !ident.has_surname() {
            missing.push("apellido");
        }
        if !is_filled(&ident.sexo) {
            missing.push("sexo");
        }
        missing
    }

    /// Labels of the closing texts that are still empty.
    pub fn missing_closing_texts(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if clean_text(&self.diagnosis).is_none() {
            missing.push("diagnóstico");
        }
        if clean_text(&self.treatment).is_none() {
            missing.push("tratamiento");
        }
        missing
    }

    /// Name used in file names and report headers.
    pub fn patient_display_name(&self) -> Option<String> {
        let ident = &self.identification;
        let parts: Vec<&str> = [&ident.nombre, &ident.apellido_paterno, &ident.apellido_materno]
            .into_iter()
            .filter_map(|f| f.as_deref().and_then(clean_text))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}
