//! Typed clinical-history sections.
//!
//! Each section is a struct of optional fields deserialized leniently at the
//! boundary: unknown keys are dropped, numbers and strings are interchangeable
//! for text fields, and checkbox values accept the usual truthy spellings.
//! Legacy key spellings are folded onto the canonical key by [`fold_aliases`]
//! before deserialization, so a payload carrying both spellings still parses.
//! Completeness is decided later by [`crate::validation`], never here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::text::{clean_text, has_content, is_filled, lenient_bool, lenient_string};

/// Declares a section sub-object: a flat group of text fields and checkboxes.
macro_rules! form_group {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( text $tfield:ident ; )*
            $( flag $bfield:ident ; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
        #[serde(rename_all = "camelCase", default)]
        pub struct $name {
            $(
                #[serde(deserialize_with = "lenient_string")]
                pub $tfield: Option<String>,
            )*
            $(
                #[serde(deserialize_with = "lenient_bool")]
                pub $bfield: Option<bool>,
            )*
        }
    };
}

/// Legacy spelling → canonical key, applied at every object level.
///
/// Several spellings may fold onto the same key; they are applied in order.
pub const KEY_ALIASES: &[(&str, &str)] = &[
    ("apellido", "apellidoPaterno"),
    ("apellido_paterno", "apellidoPaterno"),
    ("apellido_materno", "apellidoMaterno"),
    ("genero", "sexo"),
    ("fecha_nacimiento", "fechaNacimiento"),
    ("celular", "telefono"),
    ("correo", "email"),
    ("motivo_consulta", "motivoConsulta"),
    ("queja_principal", "quejaPrincipal"),
    ("padecimiento_actual", "padecimientoActual"),
    ("cepillado", "cepilladoDiario"),
];

/// Rewrite legacy keys onto their canonical names.
///
/// When both spellings are present the one with content wins; the canonical
/// key wins a tie.
pub fn fold_aliases(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            for (alias, canonical) in KEY_ALIASES {
                let Some(legacy) = map.remove(*alias) else {
                    continue;
                };
                let keep_current = map.get(*canonical).is_some_and(has_content);
                if !keep_current {
                    map.insert((*canonical).to_string(), legacy);
                }
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, inner)| (key, fold_aliases(inner)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(fold_aliases).collect()),
        other => other,
    }
}

/// A section made of named sub-objects, complete when enough of them hold data.
pub trait GroupedSection: Serialize {
    /// Display title of the section.
    const TITLE: &'static str;
    /// Minimum number of sub-objects with at least one populated field.
    const MIN_FILLED_GROUPS: usize;

    /// Returns `(filled, total)` sub-object counts.
    fn group_fill(&self) -> Result<(usize, usize), serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(groups) => {
                let filled = groups.values().filter(|g| has_content(g)).count();
                Ok((filled, groups.len()))
            }
            other => Ok((usize::from(has_content(&other)), 1)),
        }
    }
}

// ============================================================================
// Section 1: Identification
// ============================================================================

/// Patient identification sheet (ficha de identificación).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Identification {
    #[serde(deserialize_with = "lenient_string")]
    pub nombre: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub apellido_paterno: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub apellido_materno: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub sexo: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub fecha_nacimiento: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub edad: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub telefono: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub domicilio: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub ocupacion: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub estado_civil: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub escolaridad: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub lugar_nacimiento: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub contacto_emergencia: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub telefono_emergencia: Option<String>,
}

impl Identification {
    /// At least one surname is present.
    pub fn has_surname(&self) -> bool {
        is_filled(&self.apellido_paterno) || is_filled(&self.apellido_materno)
    }

    /// Birthdate or age is present.
    pub fn has_birthdate_or_age(&self) -> bool {
        is_filled(&self.fecha_nacimiento) || is_filled(&self.edad)
    }
}

// ============================================================================
// Section 2: Chief complaint
// ============================================================================

/// Reason for consultation.
///
/// Older screens stored the complaint under different keys; any of them counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChiefComplaint {
    #[serde(deserialize_with = "lenient_string")]
    pub motivo_consulta: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub motivo: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub queja_principal: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub descripcion: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub padecimiento_actual: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub evolucion: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub intensidad_dolor: Option<String>,
}

impl ChiefComplaint {
    /// The complaint text from whichever alias carries it.
    pub fn complaint_text(&self) -> Option<&str> {
        [
            &self.motivo_consulta,
            &self.motivo,
            &self.queja_principal,
            &self.descripcion,
        ]
        .into_iter()
        .find_map(|f| f.as_deref().and_then(clean_text))
    }
}

// ============================================================================
// Section 3: Family history
// ============================================================================

form_group! {
    /// Conditions reported for one relative.
    RelativeConditions {
        text otras;
        text observaciones;
        flag diabetes;
        flag hipertension;
        flag cardiopatias;
        flag cancer;
        flag epilepsia;
        flag alergias;
    }
}

/// Hereditary and family history (antecedentes heredofamiliares).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FamilyHistory {
    pub padre: RelativeConditions,
    pub madre: RelativeConditions,
    pub hermanos: RelativeConditions,
    pub abuelos: RelativeConditions,
    pub otros: RelativeConditions,
}

impl GroupedSection for FamilyHistory {
    const TITLE: &'static str = "Antecedentes heredofamiliares";
    const MIN_FILLED_GROUPS: usize = 2;
}

// ============================================================================
// Section 4: Non-pathological personal history
// ============================================================================

form_group! {
    OralHygiene {
        text cepillado_diario;
        text tipo_cepillo;
        flag uso_hilo_dental;
        flag uso_enjuague;
    }
}

form_group! {
    Diet {
        text comidas_diarias;
        text consumo_azucares;
        text consumo_agua;
    }
}

form_group! {
    Habits {
        text otros;
        flag tabaquismo;
        flag alcoholismo;
        flag bruxismo;
        flag onicofagia;
        flag respiracion_bucal;
    }
}

form_group! {
    Housing {
        text tipo;
        text convivientes;
        flag servicios_basicos;
    }
}

form_group! {
    Immunizations {
        text ultima_vacuna;
        flag esquema_completo;
    }
}

/// Non-pathological personal history (antecedentes personales no patológicos).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NonPathologicalHistory {
    pub higiene_bucal: OralHygiene,
    pub alimentacion: Diet,
    pub habitos: Habits,
    pub vivienda: Housing,
    pub inmunizaciones: Immunizations,
}

impl GroupedSection for NonPathologicalHistory {
    const TITLE: &'static str = "Antecedentes personales no patológicos";
    const MIN_FILLED_GROUPS: usize = 2;
}

// ============================================================================
// Section 5: Pathological personal history
// ============================================================================

form_group! {
    SystemicDiseases {
        text otras;
        flag diabetes;
        flag hipertension;
        flag cardiopatias;
        flag coagulopatias;
        flag asma;
        flag hepatitis;
        flag vih;
    }
}

form_group! {
    Allergies {
        text medicamentos;
        text alimentos;
        text otras;
        flag anestesicos_locales;
        flag latex;
    }
}

form_group! {
    Surgeries {
        text descripcion;
        text fecha;
        flag realizadas;
    }
}

form_group! {
    Medications {
        text actuales;
        text dosis;
        text frecuencia;
    }
}

form_group! {
    Hospitalizations {
        text motivo;
        text fecha;
    }
}

/// Pathological personal history (antecedentes personales patológicos).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PathologicalHistory {
    pub enfermedades_sistemicas: SystemicDiseases,
    pub alergias: Allergies,
    pub cirugias: Surgeries,
    pub medicamentos: Medications,
    pub hospitalizaciones: Hospitalizations,
}

impl GroupedSection for PathologicalHistory {
    const TITLE: &'static str = "Antecedentes personales patológicos";
    const MIN_FILLED_GROUPS: usize = 2;
}

// ============================================================================
// Sections 6-7: Exams
// ============================================================================

form_group! {
    Head {
        text forma;
        text simetria;
    }
}

form_group! {
    Face {
        text perfil;
        text tercios;
        text simetria;
    }
}

form_group! {
    /// Temporomandibular joint.
    Tmj {
        text apertura_maxima;
        text desviacion;
        flag ruidos;
        flag dolor;
    }
}

form_group! {
    LymphNodes {
        text descripcion;
        flag palpables;
    }
}

form_group! {
    Lips {
        text aspecto;
        text comisuras;
    }
}

/// Extraoral exam.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtraoralExam {
    pub cabeza: Head,
    pub cara: Face,
    pub atm: Tmj,
    pub ganglios: LymphNodes,
    pub labios: Lips,
}

impl GroupedSection for ExtraoralExam {
    const TITLE: &'static str = "Examen extraoral";
    const MIN_FILLED_GROUPS: usize = 2;
}

form_group! {
    Gums {
        text color;
        text consistencia;
        flag sangrado;
    }
}

form_group! {
    Tongue {
        text aspecto;
        text movilidad;
    }
}

form_group! {
    Palate {
        text duro;
        text blando;
    }
}

form_group! {
    /// Any soft-tissue area described by appearance only.
    SoftTissue {
        text aspecto;
        text observaciones;
    }
}

form_group! {
    Dentition {
        text presentes;
        text ausentes;
        text cariados;
        text restaurados;
        text observaciones;
    }
}

/// Intraoral exam.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IntraoralExam {
    pub encias: Gums,
    pub lengua: Tongue,
    pub paladar: Palate,
    pub piso_boca: SoftTissue,
    pub carrillos: SoftTissue,
    pub dientes: Dentition,
}

impl GroupedSection for IntraoralExam {
    const TITLE: &'static str = "Examen intraoral";
    const MIN_FILLED_GROUPS: usize = 3;
}

// ============================================================================
// Section 8: Occlusion
// ============================================================================

form_group! {
    Bilateral {
        text derecha;
        text izquierda;
    }
}

form_group! {
    Overbite {
        text vertical;
        text horizontal;
    }
}

form_group! {
    Midline {
        text superior;
        text inferior;
    }
}

form_group! {
    Guidance {
        text anterior;
        text canina;
    }
}

/// Occlusion analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Occlusion {
    pub relacion_molar: Bilateral,
    pub relacion_canina: Bilateral,
    pub sobremordida: Overbite,
    pub linea_media: Midline,
    pub guias: Guidance,
}

impl GroupedSection for Occlusion {
    const TITLE: &'static str = "Oclusión";
    const MIN_FILLED_GROUPS: usize = 2;
}

/// Treatment plan blob: occlusion findings plus planning notes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TreatmentPlan {
    pub oclusion: Occlusion,
    #[serde(deserialize_with = "lenient_string")]
    pub fases: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub pronostico: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub observaciones: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub proxima_cita: Option<String>,
}

// ============================================================================
// Section dispatch
// ============================================================================

/// Highest validation index with a known policy.
pub const LAST_SECTION_INDEX: u8 = 8;

/// One section's data, tagged by its validation index.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionData {
    Identification(Identification),
    ChiefComplaint(ChiefComplaint),
    FamilyHistory(FamilyHistory),
    NonPathologicalHistory(NonPathologicalHistory),
    PathologicalHistory(PathologicalHistory),
    ExtraoralExam(ExtraoralExam),
    IntraoralExam(IntraoralExam),
    Occlusion(Occlusion),
}

impl SectionData {
    /// Validation index (1..=8).
    pub fn index(&self) -> u8 {
        match self {
            SectionData::Identification(_) => 1,
            SectionData::ChiefComplaint(_) => 2,
            SectionData::FamilyHistory(_) => 3,
            SectionData::NonPathologicalHistory(_) => 4,
            SectionData::PathologicalHistory(_) => 5,
            SectionData::ExtraoralExam(_) => 6,
            SectionData::IntraoralExam(_) => 7,
            SectionData::Occlusion(_) => 8,
        }
    }

    /// Empty data for a known index.
    pub fn empty(index: u8) -> Option<Self> {
        Some(match index {
            1 => SectionData::Identification(Identification::default()),
            2 => SectionData::ChiefComplaint(ChiefComplaint::default()),
            3 => SectionData::FamilyHistory(FamilyHistory::default()),
            4 => SectionData::NonPathologicalHistory(NonPathologicalHistory::default()),
            5 => SectionData::PathologicalHistory(PathologicalHistory::default()),
            6 => SectionData::ExtraoralExam(ExtraoralExam::default()),
            7 => SectionData::IntraoralExam(IntraoralExam::default()),
            8 => SectionData::Occlusion(Occlusion::default()),
            _ => return None,
        })
    }

    /// Parse raw JSON for a section. Returns `Ok(None)` for unknown indices.
    pub fn from_json(index: u8, value: Value) -> Result<Option<Self>, serde_json::Error> {
        let value = match value {
            Value::Null => Value::Object(Default::default()),
            v => fold_aliases(v),
        };
        Ok(Some(match index {
            1 => SectionData::Identification(serde_json::from_value(value)?),
            2 => SectionData::ChiefComplaint(serde_json::from_value(value)?),
            3 => SectionData::FamilyHistory(serde_json::from_value(value)?),
            4 => SectionData::NonPathologicalHistory(serde_json::from_value(value)?),
            5 => SectionData::PathologicalHistory(serde_json::from_value(value)?),
            6 => SectionData::ExtraoralExam(serde_json::from_value(value)?),
            7 => SectionData::IntraoralExam(serde_json::from_value(value)?),
            8 => SectionData::Occlusion(serde_json::from_value(value)?),
            _ => return Ok(None),
        }))
    }
}
