//! Patient models.

use serde::{Deserialize, Serialize};

use crate::text::clean_text;

/// A clinic patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Server-assigned ID (0 until inserted)
    pub id: i64,
    /// Given name
    pub nombre: String,
    /// Paternal surname
    pub apellido_paterno: Option<String>,
    /// Maternal surname
    pub apellido_materno: Option<String>,
    /// Sex as captured at registration ("Femenino", "Masculino", ...)
    pub sexo: Option<String>,
    /// Date of birth (YYYY-MM-DD)
    pub fecha_nacimiento: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Patient {
    /// Create a new patient with required fields.
    pub fn new(nombre: String, apellido_paterno: Option<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: 0,
            nombre,
            apellido_paterno,
            apellido_materno: None,
            sexo: None,
            fecha_nacimiento: None,
            telefono: None,
            email: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Full display name with placeholder surnames dropped.
    pub fn full_name(&self) -> String {
        [
            Some(self.nombre.as_str()),
            self.apellido_paterno.as_deref(),
            self.apellido_materno.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter_map(clean_text)
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_patient() {
        let patient = Patient::new("Ana".into(), Some("Ruiz".into()));
        assert_eq!(patient.id, 0);
        assert_eq!(patient.full_name(), "Ana Ruiz");
    }

    #[test]
    fn test_full_name_skips_placeholders() {
        let mut patient = Patient::new("Luis".into(), Some("undefined".into()));
        patient.apellido_materno = Some("Pérez".into());
        assert_eq!(patient.full_name(), "Luis Pérez");
    }
}
