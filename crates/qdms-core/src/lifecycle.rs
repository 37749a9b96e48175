//! # Document Lifecycle
//!
//! Version transitions, approval-matrix normalization and reset, read
//! receipts, and the archive/retire status overrides.
//!
//! `draft → review → approved`, with a rejection reverting to `draft`.
//! Creating a new version resets the whole matrix to `pending` and moves
//! the document back into `review` (or straight to `approved` when no
//! matrix exists).

use crate::document::{
    ApprovalStage, Distribution, Document, ReadReceipt, VersionRecord,
};
use crate::rbac::User;
use crate::types::{
    DocumentStatus, PrincipalType, QdmsError, ReceiptStatus, StageStatus, Timestamp,
    VersionStatus, new_id,
};

// =============================================================================
// APPROVAL MATRIX MAINTENANCE
// =============================================================================

/// Normalize an incoming approval matrix: drop empty approver tokens and
/// sort stages by their stage number.
#[must_use]
pub fn normalize_stages(mut stages: Vec<ApprovalStage>) -> Vec<ApprovalStage> {
    for stage in &mut stages {
        stage.approvers.retain(|token| !token.trim().is_empty());
    }
    stages.sort_by_key(|stage| stage.stage);
    stages
}

/// Reset every stage to `pending` with its decisions cleared. Approver
/// sets, completion policy, and deadlines are preserved.
#[must_use]
pub fn reset_stages(stages: &[ApprovalStage]) -> Vec<ApprovalStage> {
    stages
        .iter()
        .map(|stage| ApprovalStage {
            stage: stage.stage,
            approvers: stage.approvers.clone(),
            approval_type: stage.approval_type,
            deadline: stage.deadline,
            status: StageStatus::Pending,
            decided_by: None,
            decided_at: None,
            comment: None,
            decisions: Vec::new(),
        })
        .collect()
}

// =============================================================================
// READ RECEIPTS
// =============================================================================

/// Build the initial pending receipts from a distribution list. Only
/// `user` principals get a receipt; role/department/group entries are
/// resolved to users at notification time instead.
#[must_use]
pub fn initial_read_receipts(distribution: &[Distribution]) -> Vec<ReadReceipt> {
    distribution
        .iter()
        .filter(|entry| entry.principal_type == PrincipalType::User)
        .map(|entry| ReadReceipt {
            user_id: entry.principal_id.clone(),
            required: entry.required_to_read,
            status: ReceiptStatus::Pending,
            read_at: None,
            note: None,
        })
        .collect()
}

/// Mark the user's receipt as read, or append a fresh `read` receipt if
/// the user was not on the distribution list. Idempotent on the receipt
/// set: acknowledging twice rewrites the same entry.
pub fn acknowledge_read(
    document: &mut Document,
    user_id: &str,
    note: Option<String>,
    now: Timestamp,
) {
    if let Some(receipt) = document
        .read_receipts
        .iter_mut()
        .find(|r| r.user_id == user_id)
    {
        receipt.status = ReceiptStatus::Read;
        receipt.read_at = Some(now);
        receipt.note = note;
    } else {
        document.read_receipts.push(ReadReceipt {
            user_id: user_id.to_string(),
            required: false,
            status: ReceiptStatus::Read,
            read_at: Some(now),
            note,
        });
    }
    document.updated_at = now;
}

// =============================================================================
// VERSIONING
// =============================================================================

/// Compute the next `major.minor` version label.
///
/// Empty history starts at `"1.0"`. Otherwise the latest entry is parsed;
/// unparseable labels fall back to `major = 1, minor = len(history)`.
/// Publishing bumps the major and zeroes the minor, a working revision
/// bumps the minor.
#[must_use]
pub fn next_version_label(history: &[VersionRecord], mark_as_published: bool) -> String {
    if history.is_empty() {
        return "1.0".to_string();
    }
    let latest = history
        .last()
        .map_or("1.0", |record| record.version.as_str());

    let (mut major, mut minor) = parse_version(latest).unwrap_or((1, history.len() as i64));

    if mark_as_published {
        major = major.saturating_add(1);
        minor = 0;
    } else {
        minor = minor.saturating_add(1);
    }
    format!("{major}.{minor}")
}

fn parse_version(label: &str) -> Option<(i64, i64)> {
    let (major_str, minor_str) = label.split_once('.')?;
    Some((major_str.parse().ok()?, minor_str.parse().ok()?))
}

/// Create a new version of the document.
///
/// If the document carries an approval matrix the version starts in
/// `pending_approval`, the matrix is reset, and the document moves to
/// `review`. Without a matrix the version publishes immediately and the
/// document becomes `approved`.
///
/// Returns the id of the new version record.
pub fn create_version(
    document: &mut Document,
    actor: &User,
    changes: Option<String>,
    notes: Option<String>,
    file_id: Option<String>,
    mark_as_published: bool,
    now: Timestamp,
) -> String {
    let label = next_version_label(&document.version_history, mark_as_published);
    let has_matrix = !document.approval_matrix.is_empty();

    let record = VersionRecord {
        id: new_id(),
        version: label.clone(),
        changes: changes.clone(),
        notes: notes.clone(),
        created_by: actor.id.clone(),
        created_at: now,
        file_id,
        status: if has_matrix {
            VersionStatus::PendingApproval
        } else {
            VersionStatus::Published
        },
    };
    let version_id = record.id.clone();

    document.current_version_id = Some(version_id.clone());
    document.version = label;
    document.version_history.push(record);

    let comment = notes
        .or(changes)
        .unwrap_or_else(|| "new revision created".to_string());

    if has_matrix {
        document.approval_matrix = reset_stages(&document.approval_matrix);
        document.record_status(DocumentStatus::Review, &actor.id, Some(comment), now);
    } else {
        document.published_at = Some(now);
        document.record_status(DocumentStatus::Approved, &actor.id, Some(comment), now);
    }

    version_id
}

// =============================================================================
// STATUS OVERRIDES (archive / retire / restore)
// =============================================================================

/// Apply a manual status override outside the approval flow.
///
/// Allowed transitions:
/// - `approved → archived` (stamps `archived_at`)
/// - `archived → approved` (restore)
/// - `approved | archived → retired`
///
/// Everything else is an `InvalidTransition`.
pub fn override_status(
    document: &mut Document,
    target: DocumentStatus,
    actor: &User,
    comment: Option<String>,
    now: Timestamp,
) -> Result<(), QdmsError> {
    let from = document.status;
    let allowed = matches!(
        (from, target),
        (DocumentStatus::Approved, DocumentStatus::Archived)
            | (DocumentStatus::Archived, DocumentStatus::Approved)
            | (DocumentStatus::Approved | DocumentStatus::Archived, DocumentStatus::Retired)
    );
    if !allowed {
        return Err(QdmsError::InvalidTransition {
            from: from.as_str().to_string(),
            to: target.as_str().to_string(),
        });
    }

    if target == DocumentStatus::Archived {
        document.archived_at = Some(now);
    }
    if target == DocumentStatus::Approved {
        document.archived_at = None;
    }
    document.record_status(target, &actor.id, comment, now);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApprovalType;
    use chrono::Utc;

    fn actor() -> User {
        User {
            id: "u1".to_string(),
            username: "author".to_string(),
            email: "author@example.com".to_string(),
            full_name: "Author".to_string(),
            role: "qa".to_string(),
            roles: vec![],
            department: "Quality".to_string(),
            groups: vec![],
            permissions: vec![],
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn document_with_matrix(stage_count: i64) -> Document {
        let now = Utc::now();
        let matrix = (1..=stage_count)
            .map(|no| ApprovalStage {
                stage: no,
                approvers: vec!["role:qa".to_string()],
                approval_type: ApprovalType::Any,
                deadline: None,
                status: StageStatus::Pending,
                decided_by: None,
                decided_at: None,
                comment: None,
                decisions: vec![],
            })
            .collect();
        Document {
            id: "d1".to_string(),
            folder_id: "f1".to_string(),
            code: "QM-001".to_string(),
            title: "Doc".to_string(),
            description: None,
            document_type: "SOP".to_string(),
            department: None,
            status: DocumentStatus::Draft,
            author_id: "u1".to_string(),
            version: "1.0".to_string(),
            tags: vec![],
            distribution_list: vec![],
            approval_matrix: matrix,
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
    fn normalize_stages_sorts_and_drops_blank_tokens() {
        let stages = vec![
            ApprovalStage {
                stage: 2,
                approvers: vec!["role:qa".to_string(), "  ".to_string()],
                approval_type: ApprovalType::All,
                deadline: None,
                status: StageStatus::Pending,
                decided_by: None,
                decided_at: None,
                comment: None,
                decisions: vec![],
            },
            ApprovalStage {
                stage: 1,
                approvers: vec!["user:u9".to_string()],
                approval_type: ApprovalType::Any,
                deadline: None,
                status: StageStatus::Pending,
                decided_by: None,
                decided_at: None,
                comment: None,
                decisions: vec![],
            },
        ];
        let normalized = normalize_stages(stages);
        assert_eq!(normalized[0].stage, 1);
        assert_eq!(normalized[1].approvers, vec!["role:qa".to_string()]);
    }

    #[test]
    fn reset_preserves_approvers_and_clears_decisions() {
        let mut doc = document_with_matrix(2);
        doc.approval_matrix[0].status = StageStatus::Approved;
        doc.approval_matrix[0].decided_by = Some("u1".to_string());
        let reset = reset_stages(&doc.approval_matrix);
        assert!(reset.iter().all(|s| s.status == StageStatus::Pending));
        assert!(reset.iter().all(|s| s.decisions.is_empty()));
        assert!(reset.iter().all(|s| s.decided_by.is_none()));
        assert_eq!(reset[0].approvers, doc.approval_matrix[0].approvers);
    }

    #[test]
    fn initial_receipts_only_for_user_principals() {
        let distribution = vec![
            Distribution {
                principal_type: PrincipalType::User,
                principal_id: "u2".to_string(),
                required_to_read: true,
            },
            Distribution {
                principal_type: PrincipalType::Role,
                principal_id: "qa".to_string(),
                required_to_read: true,
            },
        ];
        let receipts = initial_read_receipts(&distribution);
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].user_id, "u2");
        assert_eq!(receipts[0].status, ReceiptStatus::Pending);
    }

    #[test]
    fn acknowledge_is_idempotent_on_receipt_count() {
        let mut doc = document_with_matrix(0);
        doc.read_receipts = vec![ReadReceipt {
            user_id: "u2".to_string(),
            required: true,
            status: ReceiptStatus::Pending,
            read_at: None,
            note: None,
        }];
        let now = Utc::now();
        acknowledge_read(&mut doc, "u2", None, now);
        acknowledge_read(&mut doc, "u2", Some("again".to_string()), now);
        assert_eq!(doc.read_receipts.len(), 1);
        assert_eq!(doc.read_receipts[0].status, ReceiptStatus::Read);
    }

    #[test]
    fn acknowledge_appends_for_unknown_reader() {
        let mut doc = document_with_matrix(0);
        acknowledge_read(&mut doc, "u7", None, Utc::now());
        assert_eq!(doc.read_receipts.len(), 1);
        assert!(!doc.read_receipts[0].required);
    }

    #[test]
    fn version_labels() {
        assert_eq!(next_version_label(&[], false), "1.0");
        let history = vec![VersionRecord {
            id: "v1".to_string(),
            version: "1.3".to_string(),
            changes: None,
            notes: None,
            created_by: "u1".to_string(),
            created_at: Utc::now(),
            file_id: None,
            status: VersionStatus::Published,
        }];
        assert_eq!(next_version_label(&history, false), "1.4");
        assert_eq!(next_version_label(&history, true), "2.0");
    }

    #[test]
    fn version_label_falls_back_on_garbage() {
        let history = vec![VersionRecord {
            id: "v1".to_string(),
            version: "rev-A".to_string(),
            changes: None,
            notes: None,
            created_by: "u1".to_string(),
            created_at: Utc::now(),
            file_id: None,
            status: VersionStatus::Published,
        }];
        // major=1, minor=len(history)=1, bump minor
        assert_eq!(next_version_label(&history, false), "1.2");
    }

    #[test]
    fn create_version_with_matrix_enters_review() {
        let mut doc = document_with_matrix(1);
        doc.approval_matrix[0].status = StageStatus::Approved;
        let id = create_version(&mut doc, &actor(), None, None, None, false, Utc::now());
        assert_eq!(doc.status, DocumentStatus::Review);
        assert_eq!(doc.current_version_id, Some(id));
        assert!(doc.approval_matrix.iter().all(|s| s.status == StageStatus::Pending));
        assert_eq!(doc.version_history[0].status, VersionStatus::PendingApproval);
    }

    #[test]
    fn create_version_without_matrix_publishes() {
        let mut doc = document_with_matrix(0);
        create_version(&mut doc, &actor(), None, None, None, false, Utc::now());
        assert_eq!(doc.status, DocumentStatus::Approved);
        assert!(doc.published_at.is_some());
        assert_eq!(doc.version_history[0].status, VersionStatus::Published);
    }

    #[test]
    fn override_status_validates_transitions() {
        let mut doc = document_with_matrix(0);
        let who = actor();
        let now = Utc::now();

        // draft -> archived is not allowed
        let err = override_status(&mut doc, DocumentStatus::Archived, &who, None, now);
        assert!(matches!(err, Err(QdmsError::InvalidTransition { .. })));

        doc.status = DocumentStatus::Approved;
        override_status(&mut doc, DocumentStatus::Archived, &who, None, now).expect("archive");
        assert!(doc.archived_at.is_some());

        override_status(&mut doc, DocumentStatus::Approved, &who, None, now).expect("restore");
        assert!(doc.archived_at.is_none());

        override_status(&mut doc, DocumentStatus::Retired, &who, None, now).expect("retire");
        assert_eq!(doc.status, DocumentStatus::Retired);
    }
}
