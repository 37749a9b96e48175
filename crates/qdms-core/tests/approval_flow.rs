//! # Approval Workflow Integration Tests
//!
//! End-to-end scenarios across the stage engine, lifecycle, read
//! receipts, notification fan-out, and the persistent store.

use chrono::Utc;
use qdms_core::{
    ApprovalStage, ApprovalType, DecisionOutcome, Distribution, Document, DocumentStatus,
    PrincipalType, ReceiptStatus, StageStatus, Store, Timestamp, User, Verdict, VersionStatus,
    acknowledge_read, apply_decision, create_version, initial_read_receipts, normalize_stages,
    resolve_recipients,
};
use std::collections::BTreeSet;
use tempfile::tempdir;

fn user(id: &str, role: &str, department: &str) -> User {
    User {
        id: id.to_string(),
        username: id.to_string(),
        email: format!("{id}@example.com"),
        full_name: id.to_string(),
        role: role.to_string(),
        roles: vec![],
        department: department.to_string(),
        groups: vec![],
        permissions: vec![],
        is_active: true,
        created_at: Utc::now(),
    }
}

fn stage(number: i64, approvers: &[&str], approval_type: ApprovalType) -> ApprovalStage {
    ApprovalStage {
        stage: number,
        approvers: approvers.iter().map(|s| (*s).to_string()).collect(),
        approval_type,
        deadline: None,
        status: StageStatus::Pending,
        decided_by: None,
        decided_at: None,
        comment: None,
        decisions: vec![],
    }
}

fn document(matrix: Vec<ApprovalStage>, now: Timestamp) -> Document {
    Document {
        id: "d1".to_string(),
        folder_id: "f1".to_string(),
        code: "QM-SOP-001".to_string(),
        title: "Calibration SOP".to_string(),
        description: None,
        document_type: "SOP".to_string(),
        department: Some("QA".to_string()),
        status: DocumentStatus::Draft,
        author_id: "author".to_string(),
        version: "1.0".to_string(),
        tags: vec![],
        distribution_list: vec![],
        approval_matrix: normalize_stages(matrix),
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
fn two_stage_matrix_approves_through_to_published() {
    let now = Utc::now();
    let author = user("author", "user", "QA");
    let qa = user("qa1", "qa_manager", "QA");
    let alice = user("alice", "user", "Plant");
    let plant = user("bob", "operator", "Plant");

    let mut doc = document(
        vec![
            // Any member of the QA manager role unlocks stage 1.
            stage(1, &["role:qa_manager"], ApprovalType::Any),
            // Stage 2 needs alice AND someone from Plant.
            stage(2, &["user:alice", "department:plant"], ApprovalType::All),
        ],
        now,
    );
    let version_id = create_version(&mut doc, &author, Some("initial".to_string()), None, None, false, now);
    assert_eq!(doc.status, DocumentStatus::Review);
    assert_eq!(doc.current_version_id.as_deref(), Some(version_id.as_str()));

    // Stage 1: single approval moves on.
    let outcome = apply_decision(&mut doc, &qa, Verdict::Approved, None, now).expect("stage 1");
    assert_eq!(outcome, DecisionOutcome::StageApproved);
    assert_eq!(doc.approval_matrix[0].status, StageStatus::Approved);
    assert_eq!(doc.status, DocumentStatus::Review);

    // Stage 2: alice alone is not enough under `all`.
    let outcome = apply_decision(&mut doc, &alice, Verdict::Approved, None, now).expect("alice");
    assert_eq!(outcome, DecisionOutcome::StageIncomplete);
    assert_eq!(doc.status, DocumentStatus::Review);

    // A Plant user completes the superset and the document publishes.
    let outcome = apply_decision(&mut doc, &plant, Verdict::Approved, None, now).expect("plant");
    assert_eq!(outcome, DecisionOutcome::DocumentApproved);
    assert_eq!(doc.status, DocumentStatus::Approved);
    assert!(doc.published_at.is_some());
    let version = doc
        .version_history
        .iter()
        .find(|v| v.id == version_id)
        .expect("version");
    assert_eq!(version.status, VersionStatus::Published);
}

#[test]
fn rejection_reverts_document_and_version_to_draft() {
    let now = Utc::now();
    let author = user("author", "user", "QA");
    let qa = user("qa1", "qa_manager", "QA");

    let mut doc = document(vec![stage(1, &["role:qa_manager"], ApprovalType::Any)], now);
    create_version(&mut doc, &author, None, None, None, false, now);

    let outcome = apply_decision(
        &mut doc,
        &qa,
        Verdict::Rejected,
        Some("section 3 outdated".to_string()),
        now,
    )
    .expect("reject");
    assert_eq!(outcome, DecisionOutcome::DocumentRejected);
    assert_eq!(doc.status, DocumentStatus::Draft);
    assert_eq!(doc.approval_matrix[0].status, StageStatus::Rejected);
    assert_eq!(
        doc.version_history.last().map(|v| v.status),
        Some(VersionStatus::Draft)
    );

    // A new revision resets the matrix and re-enters review.
    create_version(&mut doc, &author, Some("fixed section 3".to_string()), None, None, false, now);
    assert_eq!(doc.status, DocumentStatus::Review);
    assert_eq!(doc.approval_matrix[0].status, StageStatus::Pending);
    assert!(doc.approval_matrix[0].decisions.is_empty());
    assert_eq!(doc.version, "1.1");
}

#[test]
fn duplicate_decision_is_a_conflict() {
    let now = Utc::now();
    let qa = user("qa1", "qa_manager", "QA");
    let qa2 = user("qa2", "user", "QA");

    let mut doc = document(
        vec![stage(1, &["role:qa_manager", "user:qa2"], ApprovalType::All)],
        now,
    );
    apply_decision(&mut doc, &qa, Verdict::Approved, None, now).expect("first");
    let err = apply_decision(&mut doc, &qa, Verdict::Approved, None, now);
    assert!(err.is_err());

    // The other approver still completes the stage.
    let outcome = apply_decision(&mut doc, &qa2, Verdict::Approved, None, now).expect("second");
    assert_eq!(outcome, DecisionOutcome::DocumentApproved);
}

#[test]
fn outsider_cannot_decide() {
    let now = Utc::now();
    let outsider = user("eve", "operator", "Plant");
    let mut doc = document(vec![stage(1, &["role:qa_manager"], ApprovalType::Any)], now);
    assert!(apply_decision(&mut doc, &outsider, Verdict::Approved, None, now).is_err());
    assert!(doc.approval_matrix[0].decisions.is_empty());
}

#[test]
fn read_receipts_acknowledge_is_idempotent() {
    let now = Utc::now();
    let mut doc = document(vec![], now);
    doc.distribution_list = vec![
        Distribution {
            principal_type: PrincipalType::User,
            principal_id: "u1".to_string(),
            required_to_read: true,
        },
        Distribution {
            principal_type: PrincipalType::Role,
            principal_id: "qa_manager".to_string(),
            required_to_read: true,
        },
    ];
    doc.read_receipts = initial_read_receipts(&doc.distribution_list);
    // Only the user principal gets an upfront receipt.
    assert_eq!(doc.read_receipts.len(), 1);

    acknowledge_read(&mut doc, "u1", None, now);
    acknowledge_read(&mut doc, "u1", Some("read again".to_string()), now);
    assert_eq!(doc.read_receipts.len(), 1);
    assert_eq!(doc.read_receipts[0].status, ReceiptStatus::Read);

    // Off-list acknowledgement appends a non-required receipt once.
    acknowledge_read(&mut doc, "u2", None, now);
    acknowledge_read(&mut doc, "u2", None, now);
    assert_eq!(doc.read_receipts.len(), 2);
    assert!(!doc.read_receipts[1].required);
}

#[test]
fn next_stage_recipients_resolve_after_approval() {
    let now = Utc::now();
    let author = user("author", "user", "QA");
    let qa = user("qa1", "qa_manager", "QA");
    let plant1 = user("p1", "operator", "Plant");
    let plant2 = user("p2", "operator", "Plant");
    let users = vec![author.clone(), qa.clone(), plant1, plant2];

    let mut doc = document(
        vec![
            stage(1, &["role:qa_manager"], ApprovalType::Any),
            stage(2, &["department:plant"], ApprovalType::Any),
        ],
        now,
    );
    create_version(&mut doc, &author, None, None, None, false, now);
    apply_decision(&mut doc, &qa, Verdict::Approved, None, now).expect("approve");

    let next = &doc.approval_matrix[1];
    assert_eq!(next.status, StageStatus::Pending);
    let recipients = resolve_recipients(&next.approvers, &users, Some(qa.id.as_str()));
    assert_eq!(
        recipients,
        BTreeSet::from(["p1".to_string(), "p2".to_string()])
    );
}

#[test]
fn workflow_state_survives_store_roundtrip() {
    let temp = tempdir().expect("temp dir");
    let store = Store::open(temp.path().join("qdms.redb")).expect("open");

    let now = Utc::now();
    let author = user("author", "user", "QA");
    let qa = user("qa1", "qa_manager", "QA");

    let mut doc = document(vec![stage(1, &["role:qa_manager"], ApprovalType::Any)], now);
    create_version(&mut doc, &author, None, None, None, false, now);
    store.put_document(&doc).expect("put");

    // Read-modify-write, as the API layer does it.
    let mut loaded = store.get_document("d1").expect("get").expect("present");
    let outcome =
        apply_decision(&mut loaded, &qa, Verdict::Approved, None, now).expect("approve");
    assert_eq!(outcome, DecisionOutcome::DocumentApproved);
    store.put_document(&loaded).expect("put");

    let reloaded = store.get_document("d1").expect("get").expect("present");
    assert_eq!(reloaded.status, DocumentStatus::Approved);
    assert_eq!(reloaded.approval_matrix[0].status, StageStatus::Approved);
    assert!(reloaded.published_at.is_some());
}
