//! Appointment models.

use serde::{Deserialize, Serialize};

/// Appointment status as shown on the agenda.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "in_progress" => Some(AppointmentStatus::InProgress),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    /// Appointments that can still be documented.
    pub fn is_open(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::InProgress)
    }
}

/// A scheduled visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    /// RFC 3339 start time
    pub scheduled_at: String,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub updated_at: String,
}

impl Appointment {
    pub fn new(patient_id: i64, scheduled_at: String) -> Self {
        Self {
            id: 0,
            patient_id,
            doctor_id: None,
            scheduled_at,
            reason: None,
            status: AppointmentStatus::Scheduled,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
