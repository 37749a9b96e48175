//! # Core Type Definitions
//!
//! Shared identifiers, status enums, and the error type for the QDMS
//! domain engine:
//! - Record identifiers and timestamps
//! - Document / stage / receipt status enums
//! - Error types (`QdmsError`)
//! - Token normalization used by the approval resolver and RBAC
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` where they participate in `BTreeMap`/`BTreeSet`
//! - Serialize to stable snake_case wire names

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// UTC timestamp used on every stored record.
pub type Timestamp = DateTime<Utc>;

/// Generate a fresh record identifier (UUID v4, string form).
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Normalize an identifier or approver token: trim and lowercase.
///
/// Every comparison in the approval resolver and the RBAC layer goes
/// through this function so that `"QA "` and `"qa"` are the same token.
#[must_use]
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

// =============================================================================
// DOCUMENT LIFECYCLE STATUSES
// =============================================================================

/// Lifecycle status of a controlled document.
///
/// `draft → review → approved`, with `archived`/`retired` as terminal
/// shelving states. A rejection at any approval stage sends the document
/// back to `draft`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Draft,
    Review,
    Approved,
    Archived,
    Retired,
}

impl DocumentStatus {
    /// Stable wire name, used in status history entries and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Review => "review",
            Self::Approved => "approved",
            Self::Archived => "archived",
            Self::Retired => "retired",
        }
    }
}

/// Status of a single approval stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Completion policy of an approval stage.
///
/// `All` requires every approver token to be covered by an approved
/// decision; `Any` completes on the first approval.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    #[default]
    All,
    Any,
}

/// An individual approver's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
}

/// Status of a stored document version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    #[default]
    Draft,
    PendingApproval,
    Published,
    Retired,
}

/// Status of a read receipt on the distribution list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    #[default]
    Pending,
    Read,
    Overdue,
}

/// Principal kind referenced by folder permissions and distribution lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    User,
    Role,
    Department,
    Group,
}

/// Severity channel of a stored notification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

// =============================================================================
// GENERIC STATUS HISTORY
// =============================================================================

/// One entry in a record's embedded status history.
///
/// The quality records (complaints, CAPAs, audits, risks, calibration)
/// all keep free-form status strings validated against a per-entity
/// allow-list; documents use the typed [`DocumentStatus`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: String,
    pub changed_by: String,
    pub changed_at: Timestamp,
    #[serde(default)]
    pub note: Option<String>,
}

impl StatusChange {
    #[must_use]
    pub fn new(
        status: impl Into<String>,
        changed_by: impl Into<String>,
        changed_at: Timestamp,
        note: Option<String>,
    ) -> Self {
        Self {
            status: status.into(),
            changed_by: changed_by.into(),
            changed_at,
            note,
        }
    }
}

/// Validate a free-form status value against an entity's allow-list.
///
/// Returns the normalized value, or `QdmsError::InvalidInput` naming the
/// offending value.
pub fn validate_status(value: &str, allowed: &[&str]) -> Result<String, QdmsError> {
    let normalized = normalize(value);
    if allowed.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(QdmsError::InvalidInput(format!(
            "invalid status '{value}', expected one of: {}",
            allowed.join(", ")
        )))
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the QDMS engine.
///
/// - No silent failures
/// - Use `Result<T, QdmsError>` for fallible operations
/// - The engine never panics; all errors are recoverable
#[derive(Debug, Error)]
pub enum QdmsError {
    /// The requested record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The caller lacks the permission or capability for this operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Input failed shape or value validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation conflicts with existing state (e.g. duplicate decision).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested lifecycle transition is not allowed.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize("  QA-Manager "), "qa-manager");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("  "), "");
    }

    #[test]
    fn document_status_wire_names() {
        assert_eq!(DocumentStatus::Draft.as_str(), "draft");
        assert_eq!(DocumentStatus::Review.as_str(), "review");
        assert_eq!(DocumentStatus::Approved.as_str(), "approved");
    }

    #[test]
    fn validate_status_accepts_listed_values() {
        let result = validate_status(" Open ", &["open", "closed"]);
        assert_eq!(result.expect("valid"), "open");
    }

    #[test]
    fn validate_status_rejects_unknown_values() {
        let result = validate_status("bogus", &["open", "closed"]);
        assert!(matches!(result, Err(QdmsError::InvalidInput(_))));
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
