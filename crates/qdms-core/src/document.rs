//! # Controlled Document Model
//!
//! The document aggregate with its embedded lists: distribution list,
//! approval matrix, read receipts, status history, and version history.
//! Relationships to other records are by string id only; all updates are
//! single-record read-modify-write operations.

use crate::types::{
    ApprovalType, DocumentStatus, PrincipalType, ReceiptStatus, StageStatus, Timestamp, Verdict,
    VersionStatus,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// EMBEDDED LISTS
// =============================================================================

/// One entry on a document's distribution list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub principal_type: PrincipalType,
    pub principal_id: String,
    #[serde(default = "default_true")]
    pub required_to_read: bool,
}

/// A recorded approver verdict inside a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDecision {
    pub user_id: String,
    pub decision: Verdict,
    #[serde(default)]
    pub comment: Option<String>,
    pub decided_at: Timestamp,
    /// The approver token this user matched when deciding. For `all`
    /// stages, completion is judged over these tokens.
    #[serde(default)]
    pub matched_token: Option<String>,
}

/// One stage of the approval matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStage {
    /// Ordering number; the lowest pending stage is the actionable one.
    pub stage: i64,
    pub approvers: Vec<String>,
    #[serde(default)]
    pub approval_type: ApprovalType,
    #[serde(default)]
    pub deadline: Option<Timestamp>,
    #[serde(default)]
    pub status: StageStatus,
    #[serde(default)]
    pub decided_by: Option<String>,
    #[serde(default)]
    pub decided_at: Option<Timestamp>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub decisions: Vec<StageDecision>,
}

/// Per-recipient acknowledgement record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user_id: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub status: ReceiptStatus,
    #[serde(default)]
    pub read_at: Option<Timestamp>,
    #[serde(default)]
    pub note: Option<String>,
}

/// One entry in the document's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatusEntry {
    pub status: DocumentStatus,
    pub changed_by: String,
    pub changed_at: Timestamp,
    #[serde(default)]
    pub comment: Option<String>,
}

/// One entry in the document's version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: String,
    /// Dotted `major.minor` label, e.g. `"2.1"`.
    pub version: String,
    #[serde(default)]
    pub changes: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub status: VersionStatus,
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// A controlled document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub folder_id: String,
    /// Human-readable code generated from the folder's pattern.
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form type token: SOP, Specification, Procedure, Policy, ...
    pub document_type: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub status: DocumentStatus,
    pub author_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub distribution_list: Vec<Distribution>,
    #[serde(default)]
    pub approval_matrix: Vec<ApprovalStage>,
    #[serde(default)]
    pub read_receipts: Vec<ReadReceipt>,
    #[serde(default)]
    pub status_history: Vec<DocumentStatusEntry>,
    #[serde(default)]
    pub version_history: Vec<VersionRecord>,
    #[serde(default)]
    pub current_version_id: Option<String>,
    #[serde(default)]
    pub review_date: Option<Timestamp>,
    #[serde(default)]
    pub expiry_date: Option<Timestamp>,
    #[serde(default)]
    pub published_at: Option<Timestamp>,
    #[serde(default)]
    pub archived_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Document {
    /// Append a status history entry and set the current status.
    pub fn record_status(
        &mut self,
        status: DocumentStatus,
        changed_by: &str,
        comment: Option<String>,
        now: Timestamp,
    ) {
        self.status = status;
        self.status_history.push(DocumentStatusEntry {
            status,
            changed_by: changed_by.to_string(),
            changed_at: now,
            comment,
        });
        self.updated_at = now;
    }

    /// The version record referenced by `current_version_id`, if any.
    #[must_use]
    pub fn current_version_mut(&mut self) -> Option<&mut VersionRecord> {
        let current = self.current_version_id.clone()?;
        self.version_history.iter_mut().find(|v| v.id == current)
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

const fn default_true() -> bool {
    true
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn empty_document() -> Document {
        let now = Utc::now();
        Document {
            id: "d1".to_string(),
            folder_id: "f1".to_string(),
            code: "QM-SOP-001".to_string(),
            title: "Calibration SOP".to_string(),
            description: None,
            document_type: "SOP".to_string(),
            department: None,
            status: DocumentStatus::Draft,
            author_id: "u1".to_string(),
            version: "1.0".to_string(),
            tags: vec![],
            distribution_list: vec![],
            approval_matrix: vec![],
            read_receipts: vec![],
            status_history: vec![],
            version_history: vec![],
            current_version_id: None,
            review_date: None,
            expiry_date: None,
            published_at: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn record_status_appends_history() {
        let mut doc = empty_document();
        let now = Utc::now();
        doc.record_status(DocumentStatus::Review, "u2", None, now);
        assert_eq!(doc.status, DocumentStatus::Review);
        assert_eq!(doc.status_history.len(), 1);
        assert_eq!(doc.status_history[0].changed_by, "u2");
        assert_eq!(doc.updated_at, now);
    }

    #[test]
    fn current_version_mut_follows_pointer() {
        let mut doc = empty_document();
        let now = Utc::now();
        doc.version_history.push(VersionRecord {
            id: "v1".to_string(),
            version: "1.0".to_string(),
            changes: None,
            notes: None,
            created_by: "u1".to_string(),
            created_at: now,
            file_id: None,
            status: VersionStatus::Draft,
        });
        doc.current_version_id = Some("v1".to_string());
        assert!(doc.current_version_mut().is_some());

        doc.current_version_id = Some("missing".to_string());
        assert!(doc.current_version_mut().is_none());
    }

    #[test]
    fn document_deserializes_with_sparse_fields() {
        // Legacy records may omit every embedded list.
        let raw = serde_json::json!({
            "id": "d9",
            "folder_id": "f1",
            "code": "QM-001",
            "title": "Legacy",
            "document_type": "Policy",
            "author_id": "u1",
            "created_at": Utc::now(),
            "updated_at": Utc::now(),
        });
        let doc: Document = serde_json::from_value(raw).expect("hydrate");
        assert_eq!(doc.status, DocumentStatus::Draft);
        assert_eq!(doc.version, "1.0");
        assert!(doc.approval_matrix.is_empty());
        assert!(doc.read_receipts.is_empty());
    }
}
