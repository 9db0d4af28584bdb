//! Section completeness checks.
//!
//! Strictness is deliberately uneven: identification is checked field by field,
//! the chief complaint only needs its text, and the history/exam sections only
//! need to be "mostly filled". Validation never traps the user: unknown
//! sections and payloads that cannot be read are reported as valid, with the
//! reason kept in [`ValidationOutcome::skipped`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{
    ChiefComplaint, ExtraoralExam, FamilyHistory, GroupedSection, Identification, IntraoralExam,
    NonPathologicalHistory, Occlusion, PathologicalHistory, SectionData,
};
use crate::text::is_filled;

/// Minimum number of identity/contact fields for section 1.
pub const MIN_IDENTIFICATION_FIELDS: usize = 3;

/// Field key → user-facing message.
pub type FieldErrors = BTreeMap<String, String>;

/// Why a section was let through without being checked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    UnknownSection(u8),
    Unreadable(String),
}

/// Result of validating one section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub section: u8,
    pub is_valid: bool,
    pub errors: FieldErrors,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

impl ValidationOutcome {
    fn from_errors(section: u8, errors: FieldErrors) -> Self {
        Self {
            section,
            is_valid: errors.is_empty(),
            errors,
            skipped: None,
        }
    }

    fn fail_open(section: u8, reason: SkipReason) -> Self {
        Self {
            section,
            is_valid: true,
            errors: FieldErrors::new(),
            skipped: Some(reason),
        }
    }

    /// Merge another outcome into this one (used when one screen covers two sections).
    pub fn merge(mut self, other: ValidationOutcome) -> Self {
        self.is_valid &= other.is_valid;
        for (key, msg) in other.errors {
            match self.errors.entry(key) {
                Entry::Occupied(mut existing) => {
                    let joined = existing.get_mut();
                    joined.push_str(" / ");
                    joined.push_str(&msg);
                }
                Entry::Vacant(slot) => {
                    slot.insert(msg);
                }
            }
        }
        if self.skipped.is_none() {
            self.skipped = other.skipped;
        }
        self
    }

    /// Messages in field order, for display.
    pub fn messages(&self) -> Vec<String> {
        self.errors.values().cloned().collect()
    }
}

/// Validate typed section data.
pub fn validate_section(data: &SectionData) -> ValidationOutcome {
    let index = data.index();
    let result = match data {
        SectionData::Identification(s) => Ok(validate_identification(s)),
        SectionData::ChiefComplaint(s) => Ok(validate_chief_complaint(s)),
        SectionData::FamilyHistory(s) => validate_groups::<FamilyHistory>(s),
        SectionData::NonPathologicalHistory(s) => validate_groups::<NonPathologicalHistory>(s),
        SectionData::PathologicalHistory(s) => validate_groups::<PathologicalHistory>(s),
        SectionData::ExtraoralExam(s) => validate_groups::<ExtraoralExam>(s),
        SectionData::IntraoralExam(s) => validate_groups::<IntraoralExam>(s),
        SectionData::Occlusion(s) => validate_groups::<Occlusion>(s),
    };

    match result {
        Ok(errors) => {
            debug!(section = index, errors = errors.len(), "section validated");
            ValidationOutcome::from_errors(index, errors)
        }
        Err(e) => {
            warn!(section = index, error = %e, "validation could not inspect section, letting it through");
            ValidationOutcome::fail_open(index, SkipReason::Unreadable(e.to_string()))
        }
    }
}

/// Validate raw JSON for a section index.
pub fn validate_section_json(index: u8, raw: &Value) -> ValidationOutcome {
    match SectionData::from_json(index, raw.clone()) {
        Ok(Some(data)) => validate_section(&data),
        Ok(None) => ValidationOutcome::fail_open(index, SkipReason::UnknownSection(index)),
        Err(e) => {
            warn!(section = index, error = %e, "section payload unreadable, letting it through");
            ValidationOutcome::fail_open(index, SkipReason::Unreadable(e.to_string()))
        }
    }
}

/// Section 1.
///
/// Both the per-field requirements and the "at least 3 of 6" aggregate are
/// enforced; they are independent checks and either one can fail.
fn validate_identification(s: &Identification) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if !is_filled(&s.nombre) {
        errors.insert("nombre".into(), "El nombre es obligatorio".into());
    }
    if !s.has_surname() {
        errors.insert(
            "apellidoPaterno".into(),
            "Se requiere al menos un apellido".into(),
        );
    }
    if !is_filled(&s.sexo) {
        errors.insert("sexo".into(), "El sexo es obligatorio".into());
    }
    if !s.has_birthdate_or_age() {
        errors.insert(
            "edad".into(),
            "Indique la fecha de nacimiento o la edad".into(),
        );
    }

    let present = [
        is_filled(&s.nombre),
        s.has_surname(),
        is_filled(&s.sexo),
        s.has_birthdate_or_age(),
        is_filled(&s.telefono),
        is_filled(&s.email),
    ]
    .into_iter()
    .filter(|p| *p)
    .count();

    if present < MIN_IDENTIFICATION_FIELDS {
        errors.insert(
            "general".into(),
            format!(
                "Complete al menos {} datos de identificación ({} capturados)",
                MIN_IDENTIFICATION_FIELDS, present
            ),
        );
    }

    errors
}

/// Section 2.
fn validate_chief_complaint(s: &ChiefComplaint) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if s.complaint_text().is_none() {
        errors.insert(
            "motivoConsulta".into(),
            "Describa el motivo de la consulta".into(),
        );
    }
    errors
}

/// Sections 3-8.
fn validate_groups<S: GroupedSection>(s: &S) -> Result<FieldErrors, serde_json::Error> {
    let (filled, total) = s.group_fill()?;
    let mut errors = FieldErrors::new();
    if filled < S::MIN_FILLED_GROUPS {
        errors.insert(
            "general".into(),
            format!(
                "{}: complete al menos {} de {} apartados ({} con información)",
                S::TITLE,
                S::MIN_FILLED_GROUPS,
                total,
                filled
            ),
        );
    }
    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_known_sections_are_invalid() {
        for index in 1..=8 {
            let outcome = validate_section_json(index, &json!({}));
            assert!(!outcome.is_valid, "section {} should be invalid when empty", index);
            assert!(!outcome.errors.is_empty());
            assert!(outcome.skipped.is_none());
        }
    }

    #[test]
    fn test_unknown_sections_fail_open() {
        for index in [0u8, 9, 42, 255] {
            let outcome = validate_section_json(index, &json!({}));
            assert!(outcome.is_valid);
            assert_eq!(outcome.skipped, Some(SkipReason::UnknownSection(index)));
        }
    }

    #[test]
    fn test_unreadable_payload_fails_open() {
        let outcome = validate_section_json(3, &json!({"padre": "texto suelto"}));
        assert!(outcome.is_valid);
        assert!(matches!(outcome.skipped, Some(SkipReason::Unreadable(_))));

        let outcome = validate_section_json(1, &json!("Ana Ruiz"));
        assert!(outcome.is_valid);
    }

    #[test]
    fn test_duplicate_spellings_are_still_checked() {
        let outcome = validate_section_json(1, &json!({"apellido": "Ruiz", "apellidoPaterno": "Ruiz"}));
        assert!(!outcome.is_valid);
        assert_eq!(outcome.skipped, None);
        for key in ["nombre", "sexo", "edad"] {
            assert!(outcome.errors.contains_key(key), "missing error for {}", key);
        }
        assert!(!outcome.errors.contains_key("apellidoPaterno"));

        let outcome = validate_section_json(2, &json!({"motivoConsulta": "", "motivo_consulta": ""}));
        assert!(!outcome.is_valid);
        assert_eq!(outcome.skipped, None);
        assert!(outcome.errors.contains_key("motivoConsulta"));

        let outcome =
            validate_section_json(2, &json!({"motivoConsulta": "", "motivo_consulta": "Dolor"}));
        assert!(outcome.is_valid);
    }

    #[test]
    fn test_identification_requires_age_even_with_three_fields() {
        let outcome = validate_section_json(
            1,
            &json!({"nombre": "Ana", "apellidoPaterno": "Ruiz", "sexo": "Femenino"}),
        );
        assert!(!outcome.is_valid);
        assert!(outcome.errors.contains_key("edad"));
        assert!(!outcome.errors.contains_key("general"));
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_identification_complete() {
        let outcome = validate_section_json(
            1,
            &json!({
                "nombre": "Ana",
                "apellidoMaterno": "Ruiz",
                "sexo": "Femenino",
                "edad": 34
            }),
        );
        assert!(outcome.is_valid, "{:?}", outcome.errors);
    }

    #[test]
    fn test_identification_aggregate_check() {
        let outcome = validate_section_json(1, &json!({"nombre": "Ana", "telefono": ""}));
        assert!(!outcome.is_valid);
        assert!(outcome.errors.contains_key("general"));
        assert!(outcome.errors.contains_key("sexo"));
    }

    #[test]
    fn test_chief_complaint_any_alias() {
        assert!(validate_section_json(2, &json!({"motivo": "Sensibilidad al frío"})).is_valid);
        assert!(validate_section_json(2, &json!({"descripcion": "Revisión"})).is_valid);

        let outcome = validate_section_json(2, &json!({"padecimientoActual": "Dolor"}));
        assert!(!outcome.is_valid);
        assert!(outcome.errors.contains_key("motivoConsulta"));
    }

    #[test]
    fn test_grouped_section_thresholds() {
        let one_group = json!({"higieneBucal": {"cepillado": "2 veces al día"}});
        assert!(!validate_section_json(4, &one_group).is_valid);

        let two_groups = json!({
            "higieneBucal": {"cepillado": "2 veces al día"},
            "habitos": {"bruxismo": true}
        });
        assert!(validate_section_json(4, &two_groups).is_valid);

        // Intraoral needs three groups.
        let intraoral = json!({
            "encias": {"color": "Rosa coral"},
            "lengua": {"aspecto": "Normal"}
        });
        assert!(!validate_section_json(7, &intraoral).is_valid);
    }

    #[test]
    fn test_unchecked_boxes_do_not_count() {
        let outcome = validate_section_json(
            5,
            &json!({
                "enfermedadesSistemicas": {"diabetes": false},
                "alergias": {"latex": false}
            }),
        );
        assert!(!outcome.is_valid);
    }

    #[test]
    fn test_merge_keeps_both_errors() {
        let a = validate_section_json(6, &json!({}));
        let b = validate_section_json(7, &json!({}));
        let merged = a.merge(b);
        assert!(!merged.is_valid);
        let general = &merged.errors["general"];
        assert!(general.contains("Examen extraoral"));
        assert!(general.contains("Examen intraoral"));
    }
}
