//! Clinical history PDF report.
//!
//! [`generate`] lays out the form in a fixed section order and encodes it with
//! lopdf. Every field goes through placeholder suppression first, so a form
//! full of `"undefined"` prints as empty sections rather than junk.

mod layout;
mod render;

pub use layout::*;

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::debug;

use crate::models::{ClinicalHistoryForm, Patient};

/// PDF generation errors.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("PDF encoding failed: {0}")]
    Encode(String),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// A generated report ready to be saved.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

/// Name used for the report of a patient at a given time.
///
/// `Historial_Clinico_<patient>_<YYYY-MM-DD>_<HH-MM-SS>.pdf`
pub fn report_filename(patient_name: &str, at: DateTime<Local>) -> String {
    let mut slug = String::with_capacity(patient_name.len());
    for word in patient_name.split_whitespace() {
        let clean: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if clean.is_empty() {
            continue;
        }
        if !slug.is_empty() {
            slug.push('_');
        }
        slug.push_str(&clean);
    }
    if slug.is_empty() {
        slug.push_str("Paciente");
    }
    format!(
        "Historial_Clinico_{}_{}.pdf",
        slug,
        at.format("%Y-%m-%d_%H-%M-%S")
    )
}

/// Generate the report for a form.
pub fn generate(
    form: &ClinicalHistoryForm,
    patient: &Patient,
    meta: &ReportMeta,
) -> ReportResult<GeneratedReport> {
    let patient_name = form
        .patient_display_name()
        .unwrap_or_else(|| patient.full_name());

    let blocks = build_blocks(form, patient, meta);
    let pages = layout(&patient_name, &blocks, meta.generated_at);
    let bytes = render::render(&pages, &format!("{} - {}", REPORT_TITLE, patient_name))?;

    debug!(
        patient_id = form.patient_id,
        pages = pages.len(),
        size = bytes.len(),
        "report generated"
    );

    Ok(GeneratedReport {
        filename: report_filename(&patient_name, meta.generated_at),
        bytes,
        page_count: pages.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HistoryId, RecordStatus};
    use chrono::{NaiveDate, TimeZone};

    fn meta() -> ReportMeta {
        ReportMeta {
            history_id: Some(HistoryId::Server(3)),
            status: RecordStatus::Completed,
            generated_at: Local.with_ymd_and_hms(2026, 3, 14, 16, 5, 9).unwrap(),
        }
    }

    fn form() -> ClinicalHistoryForm {
        let mut form = ClinicalHistoryForm::new(4, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        form.identification.nombre = Some("José".into());
        form.identification.apellido_paterno = Some("Peña".into());
        form.chief_complaint.motivo_consulta = Some("Dolor al masticar".into());
        form.diagnosis = "Pulpitis irreversible".into();
        form.treatment = "Endodoncia".into();
        form
    }

    #[test]
    fn test_filename() {
        assert_eq!(
            report_filename("José  Peña", meta().generated_at),
            "Historial_Clinico_José_Peña_2026-03-14_16-05-09.pdf"
        );
        assert_eq!(
            report_filename(" / ", meta().generated_at),
            "Historial_Clinico_Paciente_2026-03-14_16-05-09.pdf"
        );
    }

    #[test]
    fn test_generate_produces_loadable_pdf() {
        let patient = Patient::new("José".into(), Some("Peña".into()));
        let report = generate(&form(), &patient, &meta()).unwrap();

        assert!(report.bytes.starts_with(b"%PDF-1.5"));
        assert_eq!(report.filename, "Historial_Clinico_José_Peña_2026-03-14_16-05-09.pdf");

        let doc = lopdf::Document::load_mem(&report.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), report.page_count);
    }

    #[test]
    fn test_every_page_has_content_stream() {
        let mut long = form();
        long.treatment = "Control radiográfico y revaloración periódica. ".repeat(300);
        let patient = Patient::new("José".into(), None);
        let report = generate(&long, &patient, &meta()).unwrap();
        assert!(report.page_count > 1);

        let doc = lopdf::Document::load_mem(&report.bytes).unwrap();
        for (_, page_id) in doc.get_pages() {
            let content = doc.get_page_content(page_id).unwrap();
            let ops = lopdf::content::Content::decode(&content).unwrap().operations;
            // header + two footer lines at minimum
            assert!(ops.iter().filter(|op| op.operator == "Tj").count() >= 3);
        }
    }
}
