//! The seven visible wizard sections.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::ClinicalHistoryForm;
use crate::validation::{validate_section, ValidationOutcome};

/// A visible wizard step. Numbered 1..=7.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Identification,
    ChiefComplaint,
    FamilyHistory,
    NonPathologicalHistory,
    PathologicalHistory,
    /// Extraoral and intraoral exam on one screen
    Exams,
    /// Occlusion, treatment plan, diagnosis and treatment
    OcclusionAndPlan,
}

impl Section {
    pub const ALL: [Section; 7] = [
        Section::Identification,
        Section::ChiefComplaint,
        Section::FamilyHistory,
        Section::NonPathologicalHistory,
        Section::PathologicalHistory,
        Section::Exams,
        Section::OcclusionAndPlan,
    ];

    pub const FIRST: Section = Section::Identification;
    pub const LAST: Section = Section::OcclusionAndPlan;

    pub fn number(self) -> u8 {
        match self {
            Section::Identification => 1,
            Section::ChiefComplaint => 2,
            Section::FamilyHistory => 3,
            Section::NonPathologicalHistory => 4,
            Section::PathologicalHistory => 5,
            Section::Exams => 6,
            Section::OcclusionAndPlan => 7,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        n.checked_sub(1)
            .and_then(|i| Self::ALL.get(usize::from(i)))
            .copied()
    }

    pub fn title(self) -> &'static str {
        match self {
            Section::Identification => "Ficha de identificación",
            Section::ChiefComplaint => "Motivo de consulta",
            Section::FamilyHistory => "Antecedentes heredofamiliares",
            Section::NonPathologicalHistory => "Antecedentes personales no patológicos",
            Section::PathologicalHistory => "Antecedentes personales patológicos",
            Section::Exams => "Examen extraoral e intraoral",
            Section::OcclusionAndPlan => "Oclusión y plan de tratamiento",
        }
    }

    /// Validation indices checked when leaving this section.
    pub fn validation_indices(self) -> &'static [u8] {
        match self {
            Section::Identification => &[1],
            Section::ChiefComplaint => &[2],
            Section::FamilyHistory => &[3],
            Section::NonPathologicalHistory => &[4],
            Section::PathologicalHistory => &[5],
            Section::Exams => &[6, 7],
            Section::OcclusionAndPlan => &[8],
        }
    }

    /// The section that edits a given validation index.
    pub fn for_validation_index(index: u8) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.validation_indices().contains(&index))
    }

    pub fn next(self) -> Self {
        Self::from_number(self.number() + 1).unwrap_or(Self::LAST)
    }

    pub fn previous(self) -> Self {
        Self::from_number(self.number().saturating_sub(1)).unwrap_or(Self::FIRST)
    }

    /// Validate this section's current data in `form`.
    pub fn validate(self, form: &ClinicalHistoryForm) -> ValidationOutcome {
        let mut outcomes = self
            .validation_indices()
            .iter()
            .filter_map(|&i| form.section(i))
            .map(|data| validate_section(&data));

        let first = outcomes.next();
        let merged = first.map(|first| outcomes.fold(first, ValidationOutcome::merge));
        let mut outcome = merged.unwrap_or_else(|| ValidationOutcome {
            section: self.number(),
            is_valid: true,
            errors: Default::default(),
            skipped: None,
        });
        outcome.section = self.number();
        outcome
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.number(), self.title())
    }
}
