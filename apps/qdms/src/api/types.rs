//! # API Request/Response Types
//!
//! Shared JSON structures for the HTTP API and the error contract.
//! Record-family payloads live next to their handlers in `records.rs`.

use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use qdms_core::{
    ApprovalStage, Distribution, DocumentStatus, DocumentStatusReport, FileMeta, QdmsError,
    Timestamp, User, Verdict,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// ERROR CONTRACT
// =============================================================================

/// Error payload: `{"error": "..."}` with the mapped status code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Map a domain error onto the HTTP error contract:
/// 400 invalid input or transition, 403 permission denial, 404 missing
/// record, 409 conflicting state, 500 storage/serialization failures.
#[must_use]
pub fn error_response(err: &QdmsError) -> Response {
    let status = match err {
        QdmsError::NotFound(_) => StatusCode::NOT_FOUND,
        QdmsError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        QdmsError::InvalidInput(_) | QdmsError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
        QdmsError::Conflict(_) => StatusCode::CONFLICT,
        QdmsError::SerializationError(_) | QdmsError::IoError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// 200 with a JSON body.
pub fn ok_json<T: Serialize>(value: T) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

/// 201 with a JSON body.
pub fn created_json<T: Serialize>(value: T) -> Response {
    (StatusCode::CREATED, Json(value)).into_response()
}

// =============================================================================
// HEALTH
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// AUTH
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// Response for `GET /api/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: User,
    pub effective_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Partial update for `PATCH /api/users/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
    pub roles: Option<Vec<String>>,
    pub department: Option<String>,
    pub groups: Option<Vec<String>>,
    pub permissions: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

// =============================================================================
// FOLDERS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderPayload {
    pub name: String,
    pub code_prefix: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub auto_code_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderPatch {
    pub name: Option<String>,
    pub code_prefix: Option<String>,
    pub department: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub auto_code_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderPermissionsPayload {
    pub permissions: Vec<qdms_core::FolderPermission>,
}

// =============================================================================
// DOCUMENTS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCreateRequest {
    pub folder_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub document_type: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub distribution_list: Vec<Distribution>,
    #[serde(default)]
    pub approval_matrix: Vec<ApprovalStage>,
    #[serde(default)]
    pub review_date: Option<Timestamp>,
    #[serde(default)]
    pub expiry_date: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub department: Option<String>,
    pub tags: Option<Vec<String>>,
    pub distribution_list: Option<Vec<Distribution>>,
    pub approval_matrix: Option<Vec<ApprovalStage>>,
    pub review_date: Option<Timestamp>,
    pub expiry_date: Option<Timestamp>,
}

/// Manual override for `PATCH /api/documents/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusOverrideRequest {
    pub status: DocumentStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionRequest {
    pub changes: Option<String>,
    pub notes: Option<String>,
    pub file_id: Option<String>,
    pub mark_as_published: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AcknowledgeRequest {
    pub note: Option<String>,
    /// Acknowledge on behalf of this user; honored for admins only.
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub decision: Verdict,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub outcome: String,
    pub document: qdms_core::Document,
}

// =============================================================================
// FILES
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUploadRequest {
    pub filename: String,
    pub mime_type: String,
    /// Base64-encoded payload.
    pub content: String,
    #[serde(default)]
    pub module_type: Option<String>,
    #[serde(default)]
    pub module_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDownloadResponse {
    #[serde(flatten)]
    pub meta: FileMeta,
    /// Base64-encoded payload.
    pub content: String,
}

// =============================================================================
// DASHBOARD
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub collections: BTreeMap<String, u64>,
    pub documents: DocumentStatusReport,
    pub unread_notifications: u64,
}
