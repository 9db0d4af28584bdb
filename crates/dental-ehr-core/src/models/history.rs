//! Record history: digital versions, audit entries and PDF attachments.

use serde::{Deserialize, Serialize};

/// Immutable snapshot of a record's full form data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DigitalVersion {
    pub id: i64,
    pub record_id: i64,
    /// 1-based, increments per record
    pub version_number: u32,
    /// Previous version of the same record (None for the first)
    pub previous_version_id: Option<i64>,
    /// Full form JSON at snapshot time
    pub snapshot: String,
    /// SHA-256 of `snapshot`, hex encoded
    pub content_hash: String,
    pub change_summary: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: String,
}

/// Kind of action recorded in the audit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    View,
    StatusChange,
    Archive,
    PdfGenerated,
    VersionCreated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::View => "view",
            AuditAction::StatusChange => "status_change",
            AuditAction::Archive => "archive",
            AuditAction::PdfGenerated => "pdf_generated",
            AuditAction::VersionCreated => "version_created",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(AuditAction::Create),
            "update" => Some(AuditAction::Update),
            "view" => Some(AuditAction::View),
            "status_change" => Some(AuditAction::StatusChange),
            "archive" => Some(AuditAction::Archive),
            "pdf_generated" => Some(AuditAction::PdfGenerated),
            "version_created" => Some(AuditAction::VersionCreated),
            _ => None,
        }
    }
}

/// One row of the append-only audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub record_id: i64,
    pub user_id: Option<i64>,
    pub action: AuditAction,
    pub details: Option<String>,
    pub ip: Option<String>,
    pub created_at: String,
}

/// A PDF stored against a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PdfAttachment {
    pub id: i64,
    pub record_id: i64,
    pub filename: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub size: i64,
    /// SHA-256 of `content`, hex encoded
    pub sha256: String,
    pub created_at: String,
}
