//! Page layout for the clinical history report.
//!
//! Layout is computed without touching PDF objects so pagination, ordering and
//! placeholder suppression can be checked directly.

use chrono::{DateTime, Local};
use serde_json::Value;

use crate::models::{ClinicalHistoryForm, HistoryId, Patient, PersonalData, RecordStatus};
use crate::text::{clean_text, display_value, has_content, humanize_key};

/// A4 in points.
pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;
pub const MARGIN: f32 = 50.0;

const HEADER_Y: f32 = PAGE_HEIGHT - 36.0;
const BODY_TOP: f32 = PAGE_HEIGHT - 72.0;
const BODY_BOTTOM: f32 = 64.0;
const FOOTER_Y: f32 = 32.0;

const TITLE_SIZE: f32 = 16.0;
const SECTION_SIZE: f32 = 12.0;
const BODY_SIZE: f32 = 10.0;
const HEADER_SIZE: f32 = 8.0;

pub const REPORT_TITLE: &str = "Historia Clínica Odontológica";
pub const EMPTY_SECTION_NOTE: &str = "Sin información registrada";

/// What a line is for; decides font and spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Header,
    Title,
    Subtitle,
    SectionTitle,
    Field,
    Note,
    Footer,
}

impl LineKind {
    pub fn font_size(&self) -> f32 {
        match self {
            LineKind::Title => TITLE_SIZE,
            LineKind::SectionTitle => SECTION_SIZE,
            LineKind::Subtitle | LineKind::Field | LineKind::Note => BODY_SIZE,
            LineKind::Header | LineKind::Footer => HEADER_SIZE,
        }
    }

    pub fn is_bold(&self) -> bool {
        matches!(self, LineKind::Title | LineKind::SectionTitle)
    }

    fn advance(&self) -> f32 {
        match self {
            LineKind::Title => 24.0,
            LineKind::SectionTitle => 20.0,
            _ => 14.0,
        }
    }
}

/// A positioned line of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub kind: LineKind,
    pub text: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub lines: Vec<Line>,
}

impl Page {
    pub fn lines_of(&self, kind: LineKind) -> impl Iterator<Item = &Line> {
        self.lines.iter().filter(move |l| l.kind == kind)
    }
}

/// Record-level details printed at the end of the report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportMeta {
    pub history_id: Option<HistoryId>,
    pub status: RecordStatus,
    pub generated_at: DateTime<Local>,
}

/// One titled group of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub title: String,
    pub fields: Vec<(String, String)>,
}

impl Block {
    fn from_value(title: &str, value: &Value) -> Self {
        let mut fields = Vec::new();
        collect_fields(value, "", &mut fields);
        Self {
            title: title.to_string(),
            fields,
        }
    }

    fn from_serializable<T: serde::Serialize>(title: &str, data: &T) -> Self {
        let value = serde_json::to_value(data).unwrap_or(Value::Null);
        Self::from_value(title, &value)
    }
}

/// Flatten nested objects into `Group / Field` labels, skipping empty leaves.
fn collect_fields(value: &Value, prefix: &str, out: &mut Vec<(String, String)>) {
    let Value::Object(map) = value else {
        return;
    };
    for (key, child) in map {
        let label = if prefix.is_empty() {
            humanize_key(key)
        } else {
            format!("{} / {}", prefix, humanize_key(key))
        };
        match child {
            Value::Object(_) => collect_fields(child, &label, out),
            leaf if has_content(leaf) => {
                if let Some(text) = display_value(leaf) {
                    out.push((label, text));
                }
            }
            _ => {}
        }
    }
}

/// Report blocks in their fixed order.
pub fn build_blocks(form: &ClinicalHistoryForm, patient: &Patient, meta: &ReportMeta) -> Vec<Block> {
    let personal = serde_json::to_value(PersonalData::snapshot(patient, &form.identification))
        .unwrap_or(Value::Null);
    let mut personal_block = Block::from_value("Datos personales", &personal);
    let extra = Block::from_serializable("", &form.identification);
    let shown: Vec<String> = personal_block.fields.iter().map(|(k, _)| k.clone()).collect();
    personal_block
        .fields
        .extend(extra.fields.into_iter().filter(|(k, _)| !shown.contains(k)));

    let plan = &form.treatment_plan;
    let closing = Block {
        title: "Diagnóstico y plan de tratamiento".to_string(),
        fields: [
            ("Diagnóstico", Some(form.diagnosis.as_str())),
            ("Tratamiento", Some(form.treatment.as_str())),
            ("Fases", plan.fases.as_deref()),
            ("Pronóstico", plan.pronostico.as_deref()),
            ("Observaciones", plan.observaciones.as_deref()),
            ("Próxima cita", plan.proxima_cita.as_deref()),
        ]
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .and_then(clean_text)
                .map(|v| (label.to_string(), v.to_string()))
        })
        .collect(),
    };

    let mut metadata = vec![
        ("Fecha de consulta".to_string(), form.consultation_date.format("%d/%m/%Y").to_string()),
        ("Estado".to_string(), meta.status.as_str().to_string()),
        (
            "Generado".to_string(),
            meta.generated_at.format("%d/%m/%Y %H:%M:%S").to_string(),
        ),
    ];
    if let Some(id) = &meta.history_id {
        metadata.insert(0, ("Folio".to_string(), id.to_string()));
    }

    vec![
        personal_block,
        Block::from_serializable("Motivo de consulta", &form.chief_complaint),
        Block::from_serializable("Antecedentes heredofamiliares", &form.family_history),
        Block::from_serializable("Antecedentes personales no patológicos", &form.non_pathological),
        Block::from_serializable("Antecedentes personales patológicos", &form.pathological),
        Block::from_serializable("Examen extraoral", &form.extraoral),
        Block::from_serializable("Examen intraoral", &form.intraoral),
        Block::from_serializable("Oclusión", &plan.oclusion),
        closing,
        Block {
            title: "Datos del registro".to_string(),
            fields: metadata,
        },
    ]
}

/// Greedy word wrap by character count. Words longer than a line are split.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(max_chars) {
            let needed = if current.is_empty() {
                piece.len()
            } else {
                current_len + 1 + piece.len()
            };
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push(' ');
                current_len += 1;
            }
            current.extend(piece);
            current_len += piece.len();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn max_chars(size: f32, indent: f32) -> usize {
    // Helvetica averages about half an em per glyph.
    ((PAGE_WIDTH - 2.0 * MARGIN - indent) / (size * 0.5)) as usize
}

struct Cursor {
    pages: Vec<Page>,
    y: f32,
}

impl Cursor {
    fn new() -> Self {
        Self {
            pages: vec![Page::default()],
            y: BODY_TOP,
        }
    }

    fn ensure(&mut self, height: f32) {
        if self.y - height < BODY_BOTTOM {
            self.pages.push(Page::default());
            self.y = BODY_TOP;
        }
    }

    fn push(&mut self, kind: LineKind, text: String, x: f32) {
        self.ensure(kind.advance());
        if let Some(page) = self.pages.last_mut() {
            page.lines.push(Line {
                kind,
                text,
                x,
                y: self.y,
            });
        }
        self.y -= kind.advance();
    }
}

/// Lay out the report: title block, sections, then header and footer on every page.
pub fn layout(patient_name: &str, blocks: &[Block], generated_at: DateTime<Local>) -> Vec<Page> {
    let mut cursor = Cursor::new();

    cursor.push(LineKind::Title, REPORT_TITLE.to_string(), MARGIN);
    cursor.push(LineKind::Subtitle, format!("Paciente: {}", patient_name), MARGIN);

    for block in blocks {
        // Keep the title with at least its first line.
        cursor.ensure(LineKind::SectionTitle.advance() + LineKind::Field.advance() + 6.0);
        cursor.y -= 6.0;
        cursor.push(LineKind::SectionTitle, block.title.clone(), MARGIN);

        if block.fields.is_empty() {
            cursor.push(LineKind::Note, EMPTY_SECTION_NOTE.to_string(), MARGIN + 10.0);
            continue;
        }

        for (label, value) in &block.fields {
            let text = format!("{}: {}", label, value);
            for (i, chunk) in wrap(&text, max_chars(BODY_SIZE, 10.0)).into_iter().enumerate() {
                let indent = if i == 0 { 10.0 } else { 20.0 };
                cursor.push(LineKind::Field, chunk, MARGIN + indent);
            }
        }
    }

    let total = cursor.pages.len();
    let stamp = generated_at.format("%d/%m/%Y %H:%M:%S").to_string();
    for (i, page) in cursor.pages.iter_mut().enumerate() {
        page.lines.insert(
            0,
            Line {
                kind: LineKind::Header,
                text: format!("{} - {}", REPORT_TITLE, patient_name),
                x: MARGIN,
                y: HEADER_Y,
            },
        );
        page.lines.push(Line {
            kind: LineKind::Footer,
            text: format!("Página {} de {}", i + 1, total),
            x: MARGIN,
            y: FOOTER_Y,
        });
        page.lines.push(Line {
            kind: LineKind::Footer,
            text: format!("Generado: {}", stamp),
            x: PAGE_WIDTH - MARGIN - 150.0,
            y: FOOTER_Y,
        });
    }

    cursor.pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn meta() -> ReportMeta {
        ReportMeta {
            history_id: Some(HistoryId::Server(12)),
            status: RecordStatus::Completed,
            generated_at: Local.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
        }
    }

    fn empty_form() -> ClinicalHistoryForm {
        ClinicalHistoryForm::new(1, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap())
    }

    fn placeholder_patient() -> Patient {
        Patient::new("undefined".into(), Some("null".into()))
    }

    #[test]
    fn test_block_order() {
        let blocks = build_blocks(&empty_form(), &placeholder_patient(), &meta());
        let titles: Vec<&str> = blocks.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Datos personales",
                "Motivo de consulta",
                "Antecedentes heredofamiliares",
                "Antecedentes personales no patológicos",
                "Antecedentes personales patológicos",
                "Examen extraoral",
                "Examen intraoral",
                "Oclusión",
                "Diagnóstico y plan de tratamiento",
                "Datos del registro",
            ]
        );
    }

    #[test]
    fn test_placeholders_produce_no_section_fields() {
        let mut form = empty_form();
        form.identification.telefono = Some("undefined".into());
        form.chief_complaint.motivo = Some("   ".into());
        form.diagnosis = "null".into();

        let blocks = build_blocks(&form, &placeholder_patient(), &meta());
        // Only the record metadata block carries values.
        for block in &blocks[..blocks.len() - 1] {
            assert!(block.fields.is_empty(), "{} has {:?}", block.title, block.fields);
        }

        let pages = layout("Paciente", &blocks, meta().generated_at);
        for page in &pages {
            assert_eq!(page.lines_of(LineKind::Header).count(), 1);
            assert_eq!(page.lines_of(LineKind::Footer).count(), 2);
        }
        let notes: usize = pages
            .iter()
            .map(|p| p.lines_of(LineKind::Note).count())
            .sum();
        assert_eq!(notes, blocks.len() - 1);
    }

    #[test]
    fn test_nested_fields_are_labelled() {
        let mut form = empty_form();
        form.family_history.padre.diabetes = Some(true);
        form.family_history.madre.hipertension = Some(false);

        let blocks = build_blocks(&form, &placeholder_patient(), &meta());
        let family = &blocks[2];
        assert_eq!(
            family.fields,
            vec![("Padre / Diabetes".to_string(), "Sí".to_string())]
        );
    }

    #[test]
    fn test_long_content_paginates_with_numbered_footers() {
        let mut form = empty_form();
        form.diagnosis = "Lesión cariosa extensa con compromiso pulpar. ".repeat(200);

        let blocks = build_blocks(&form, &placeholder_patient(), &meta());
        let pages = layout("Ana Ruiz", &blocks, meta().generated_at);
        assert!(pages.len() > 1);

        let total = pages.len();
        for (i, page) in pages.iter().enumerate() {
            let footer: Vec<&str> = page
                .lines_of(LineKind::Footer)
                .map(|l| l.text.as_str())
                .collect();
            assert!(footer.contains(&format!("Página {} de {}", i + 1, total).as_str()));
            assert!(footer.iter().any(|t| t.starts_with("Generado: 14/03/2026")));
            for line in &page.lines {
                if line.kind != LineKind::Footer && line.kind != LineKind::Header {
                    assert!(line.y >= BODY_BOTTOM, "line below body area: {:?}", line);
                }
            }
        }
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("uno dos tres", 7), vec!["uno dos", "tres"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn test_wrap_splits_overlong_words() {
        let lines = wrap("ver https://clinica.example/rx/123456 hoy", 10);
        assert_eq!(
            lines,
            vec!["ver", "https://cl", "inica.exam", "ple/rx/123", "456 hoy"]
        );
        assert!(lines.iter().all(|l| l.chars().count() <= 10));

        let teeth = "11-12-13-14-15-16-17-18-21-22-23-24";
        assert!(wrap(teeth, 8).iter().all(|l| l.chars().count() <= 8));
        assert_eq!(wrap(teeth, 8).concat(), teeth);
    }
}
