//! REST client for the clinic's history service.

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{BackendError, BackendResult, HistoryBackend};
use crate::config::BackendConfig;
use crate::db::PatientDebugInfo;
use crate::models::{
    Appointment, ClinicalHistoryRecord, DiagnosisTreatment, NewRecord, RecordPatch, RecordStatus,
};

const HISTORY_API: &str = "/api/historial";
const APPOINTMENT_API: &str = "/api/citas";

/// Blocking JSON client with bearer-token auth.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            auth_token: config.auth_token().map(str::to_string),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> BackendResult<T> {
        let response = builder
            .send()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !status.is_success() {
            let err = error_for_status(status, &body);
            warn!(status = status.as_u16(), kind = err.kind(), "history service rejected request");
            return Err(err);
        }

        decode_body(&body)
    }

    fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> BackendResult<T> {
        debug!(method = %method, path, "history service request");
        self.send(self.request(method, path).json(body))
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> BackendResult<T> {
        debug!(path, "history service request");
        self.send(self.request(Method::GET, path))
    }
}

/// Map a non-success response to the error taxonomy.
pub(crate) fn error_for_status(status: StatusCode, body: &str) -> BackendError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "error", "mensaje"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| status.to_string());

    match status.as_u16() {
        400 | 409 | 422 => BackendError::Validation(message),
        401 | 403 => BackendError::Forbidden(message),
        404 => BackendError::NotFound(message),
        code => BackendError::Server {
            status: code,
            message,
        },
    }
}

/// Parse a response body, accepting both `{ "data": ... }` envelopes and bare payloads.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &str) -> BackendResult<T> {
    let value: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))?
    };

    let payload = match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    serde_json::from_value(payload).map_err(|e| BackendError::Decode(e.to_string()))
}

impl HistoryBackend for HttpBackend {
    fn create_record(&self, record: &NewRecord) -> BackendResult<ClinicalHistoryRecord> {
        self.send_json(
            Method::POST,
            &format!("{}/historiales-clinicos", HISTORY_API),
            record,
        )
    }

    fn get_record(&self, id: i64) -> BackendResult<ClinicalHistoryRecord> {
        self.get(&format!("{}/historiales-clinicos/{}", HISTORY_API, id))
    }

    fn update_record(&self, id: i64, patch: &RecordPatch) -> BackendResult<ClinicalHistoryRecord> {
        self.send_json(
            Method::PATCH,
            &format!("{}/historiales-clinicos/{}", HISTORY_API, id),
            patch,
        )
    }

    fn update_diagnosis_treatment(
        &self,
        id: i64,
        body: &DiagnosisTreatment,
    ) -> BackendResult<ClinicalHistoryRecord> {
        self.send_json(
            Method::PATCH,
            &format!(
                "{}/historiales-clinicos/{}/diagnostico-tratamiento",
                HISTORY_API, id
            ),
            body,
        )
    }

    fn list_patient_records(&self, patient_id: i64) -> BackendResult<Vec<ClinicalHistoryRecord>> {
        let result: BackendResult<Option<Vec<ClinicalHistoryRecord>>> =
            self.get(&format!("{}/pacientes/{}/historial", HISTORY_API, patient_id));

        match result {
            Ok(records) => {
                let mut records = records.unwrap_or_default();
                records.sort_by(|a, b| {
                    b.consultation_date
                        .cmp(&a.consultation_date)
                        .then(b.id.cmp(&a.id))
                });
                Ok(records)
            }
            // The service answers 404 when a patient has no history yet.
            Err(BackendError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn archive_record(&self, id: i64, user_id: Option<i64>) -> BackendResult<ClinicalHistoryRecord> {
        self.update_record(
            id,
            &RecordPatch {
                status: Some(RecordStatus::Archived),
                updated_by: user_id,
                ..RecordPatch::default()
            },
        )
    }

    fn debug_patient(&self, patient_id: i64) -> BackendResult<PatientDebugInfo> {
        self.get(&format!("{}/debug/paciente/{}", HISTORY_API, patient_id))
    }

    fn list_appointments(&self, patient_id: i64) -> BackendResult<Vec<Appointment>> {
        match self.get::<Option<Vec<Appointment>>>(&format!(
            "{}/paciente/{}",
            APPOINTMENT_API, patient_id
        )) {
            Ok(list) => Ok(list.unwrap_or_default()),
            Err(BackendError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}
