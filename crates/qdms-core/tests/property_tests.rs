//! # Property-Based Tests
//!
//! Invariants of the approval engine, versioning, risk scoring, and the
//! auto-number counters, exercised with proptest.

use chrono::Utc;
use proptest::collection::vec;
use proptest::prelude::*;
use qdms_core::{
    ApprovalStage, ApprovalType, StageStatus, Store, User, VersionRecord, VersionStatus,
    find_pending_stage, level_for_score, new_id, next_version_label, normalize, reset_stages,
    score_risk, user_matches_approver,
};
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

fn stage(number: i64, status: StageStatus) -> ApprovalStage {
    ApprovalStage {
        stage: number,
        approvers: vec!["role:qa_manager".to_string()],
        approval_type: ApprovalType::Any,
        deadline: None,
        status,
        decided_by: None,
        decided_at: None,
        comment: None,
        decisions: vec![],
    }
}

proptest! {
    /// Token matching is insensitive to case and surrounding whitespace.
    #[test]
    fn token_matching_ignores_case_and_whitespace(
        role in "[a-zA-Z][a-zA-Z_]{1,12}",
        pad_left in " {0,3}",
        pad_right in " {0,3}",
    ) {
        let u = user("u1", &role, "QA");
        let token = format!("{pad_left}role:{}{pad_right}", role.to_uppercase());
        prop_assert!(user_matches_approver(&u, &token));
        prop_assert!(user_matches_approver(&u, &normalize(&token)));
    }

    /// The pending stage is always the lowest-numbered pending one,
    /// regardless of the order stages appear in the matrix.
    #[test]
    fn pending_stage_is_lowest_pending_number(
        numbers in vec(0i64..100, 1..8),
        done_mask in vec(any::<bool>(), 8),
    ) {
        let matrix: Vec<ApprovalStage> = numbers
            .iter()
            .zip(done_mask.iter())
            .map(|(&n, &done)| {
                stage(n, if done { StageStatus::Approved } else { StageStatus::Pending })
            })
            .collect();

        let expected = matrix
            .iter()
            .filter(|s| s.status == StageStatus::Pending)
            .map(|s| s.stage)
            .min();
        let found = find_pending_stage(&matrix).map(|idx| matrix[idx].stage);
        prop_assert_eq!(found, expected);
    }

    /// Resetting stages preserves approver sets and stage numbers while
    /// clearing every decision.
    #[test]
    fn reset_preserves_approvers_and_clears_decisions(
        numbers in vec(1i64..20, 1..6),
    ) {
        let matrix: Vec<ApprovalStage> = numbers
            .iter()
            .map(|&n| {
                let mut s = stage(n, StageStatus::Approved);
                s.decided_by = Some("u1".to_string());
                s.comment = Some("done".to_string());
                s
            })
            .collect();

        let reset = reset_stages(&matrix);
        prop_assert_eq!(reset.len(), matrix.len());
        for (before, after) in matrix.iter().zip(reset.iter()) {
            prop_assert_eq!(after.stage, before.stage);
            prop_assert_eq!(&after.approvers, &before.approvers);
            prop_assert_eq!(after.status, StageStatus::Pending);
            prop_assert!(after.decisions.is_empty());
            prop_assert!(after.decided_by.is_none());
        }
    }

    /// Version labels always parse back to `major.minor`, and publishing
    /// bumps the major while zeroing the minor.
    #[test]
    fn version_labels_progress_monotonically(
        majors in 1u64..50,
        minors in 0u64..50,
    ) {
        let history = vec![VersionRecord {
            id: new_id(),
            version: format!("{majors}.{minors}"),
            changes: None,
            notes: None,
            created_by: "u1".to_string(),
            created_at: Utc::now(),
            file_id: None,
            status: VersionStatus::Published,
        }];

        let revision = next_version_label(&history, false);
        prop_assert_eq!(revision, format!("{}.{}", majors, minors + 1));

        let published = next_version_label(&history, true);
        prop_assert_eq!(published, format!("{}.0", majors + 1));
    }

    /// Risk scores stay on the integer grid and residual never exceeds
    /// inherent; every inherent level agrees with the score bands'
    /// ordering.
    #[test]
    fn risk_scores_bounded_and_consistent(
        likelihood in 1i64..=5,
        impact in 1i64..=5,
        effectiveness in proptest::option::of(0i64..=100),
    ) {
        let score = score_risk(likelihood, impact, effectiveness).expect("valid factors");
        prop_assert_eq!(score.inherent, likelihood * impact);
        prop_assert!(score.residual >= 1);
        prop_assert!(score.residual <= score.inherent);
        prop_assert_eq!(score.residual_level, level_for_score(score.residual));
        prop_assert!(score.residual_level <= score.inherent_level);
    }
}

// Counter monotonicity needs the store, so it runs as a plain test with
// a generated number of draws.
#[test]
fn counters_strictly_monotonic_per_collection() {
    let temp = tempdir().expect("temp dir");
    let store = Store::open(temp.path().join("qdms.redb")).expect("open");

    let mut last = String::new();
    for i in 1..=25_u64 {
        let code = store.next_code("capas", "CAPA", 2026).expect("code");
        assert_eq!(code, format!("CAPA-2026-{i:04}"));
        assert!(code > last);
        last = code;
    }
    // Other collections are unaffected.
    assert_eq!(
        store.next_code("audits", "AUD", 2026).expect("code"),
        "AUD-2026-0001"
    );
}
