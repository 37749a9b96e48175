//! # Approval Workflow Engine
//!
//! Approver token resolution, stage completion policy, pending-stage
//! selection, and decision application for the document approval matrix.
//!
//! ## Approver tokens
//!
//! A stage names its approvers as tokens:
//! - `role:<name>` — any user holding that role
//! - `department:<name>` — any user of that department
//! - `group:<name>` — any user in that group
//! - `user:<id>` — a specific user (id, username, or email)
//! - bare token — matched against every identifier field of the user
//!
//! All comparisons are case-insensitive after trimming.

use crate::document::{ApprovalStage, Document, StageDecision};
use crate::rbac::User;
use crate::types::{
    ApprovalType, DocumentStatus, QdmsError, StageStatus, Timestamp, Verdict, VersionStatus,
    normalize,
};
use std::collections::BTreeSet;

// =============================================================================
// TOKEN RESOLUTION
// =============================================================================

/// Split a prefixed token into its value part. `"role:qa"` → `"qa"`.
fn strip_prefix(token: &str) -> &str {
    token.split_once(':').map_or("", |(_, rest)| rest)
}

/// Does this user match the given approver token?
#[must_use]
pub fn user_matches_approver(user: &User, approver_token: &str) -> bool {
    let token = normalize(approver_token);
    if token.is_empty() {
        return false;
    }

    if let Some(role_value) = token.strip_prefix("role:") {
        return user
            .role_names()
            .iter()
            .any(|role| normalize(role) == role_value);
    }
    if let Some(dept_value) = token.strip_prefix("department:") {
        return normalize(&user.department) == dept_value;
    }
    if let Some(group_value) = token.strip_prefix("group:") {
        return user
            .groups
            .iter()
            .any(|group| normalize(group) == group_value);
    }
    if token.starts_with("user:") {
        let target = strip_prefix(&token);
        return user.identifier_tokens().contains(target);
    }

    user.identifier_tokens().contains(token.as_str())
}

/// The first approver token of the stage this user matches, if any.
#[must_use]
pub fn resolve_matching_token(user: &User, stage: &ApprovalStage) -> Option<String> {
    stage
        .approvers
        .iter()
        .find(|token| user_matches_approver(user, token))
        .cloned()
}

// =============================================================================
// STAGE SELECTION & COMPLETION
// =============================================================================

/// Index of the currently actionable stage: among pending stages, the one
/// with the lowest `stage` number.
#[must_use]
pub fn find_pending_stage(matrix: &[ApprovalStage]) -> Option<usize> {
    let mut pending: Option<(usize, i64)> = None;
    for (idx, stage) in matrix.iter().enumerate() {
        if stage.status != StageStatus::Pending {
            continue;
        }
        match pending {
            Some((_, best)) if stage.stage >= best => {}
            _ => pending = Some((idx, stage.stage)),
        }
    }
    pending.map(|(idx, _)| idx)
}

/// Is this stage complete under its completion policy?
///
/// - `any`: one approved decision suffices.
/// - `all`: the normalized matched tokens of approved decisions must cover
///   every approver token of the stage. A stage without approvers can
///   never complete.
#[must_use]
pub fn stage_is_complete(stage: &ApprovalStage) -> bool {
    if stage.status == StageStatus::Approved {
        return true;
    }
    if stage.approval_type == ApprovalType::Any {
        return stage
            .decisions
            .iter()
            .any(|d| d.decision == Verdict::Approved);
    }
    if stage.approvers.is_empty() {
        return false;
    }

    let approved_tokens: BTreeSet<String> = stage
        .decisions
        .iter()
        .filter(|d| d.decision == Verdict::Approved)
        .map(|d| normalize(d.matched_token.as_deref().unwrap_or(&d.user_id)))
        .collect();
    let required_tokens: BTreeSet<String> = stage
        .approvers
        .iter()
        .map(|t| normalize(t))
        .filter(|t| !t.is_empty())
        .collect();

    required_tokens.is_subset(&approved_tokens)
}

// =============================================================================
// DECISION APPLICATION
// =============================================================================

/// What a decision did to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// The decision was recorded but the stage still waits for others.
    StageIncomplete,
    /// The stage completed; at least one later stage is still pending.
    StageApproved,
    /// Every stage is approved; the document is now `approved`.
    DocumentApproved,
    /// The stage was rejected; the document reverted to `draft`.
    DocumentRejected,
}

/// Apply one approver verdict to the document's current pending stage.
///
/// Guards, in order:
/// - the document must carry an approval matrix (`InvalidInput`);
/// - a pending stage must exist (`InvalidInput`);
/// - the actor must match one of the stage's approver tokens
///   (`PermissionDenied`);
/// - the actor must not have already decided in this stage (`Conflict`).
///
/// A rejection fails the stage, reverts the document to `draft` and marks
/// the current version record `draft`; other stages are left untouched.
/// An approval completes the stage per its policy; when no pending stage
/// remains the document becomes `approved`, `published_at` is stamped and
/// the current version record becomes `published`.
pub fn apply_decision(
    document: &mut Document,
    actor: &User,
    verdict: Verdict,
    comment: Option<String>,
    now: Timestamp,
) -> Result<DecisionOutcome, QdmsError> {
    if document.approval_matrix.is_empty() {
        return Err(QdmsError::InvalidInput(
            "document does not require approval".to_string(),
        ));
    }
    let stage_index = find_pending_stage(&document.approval_matrix)
        .ok_or_else(|| QdmsError::InvalidInput("no pending approval stage".to_string()))?;

    let matched_token = resolve_matching_token(actor, &document.approval_matrix[stage_index])
        .ok_or_else(|| {
            QdmsError::PermissionDenied("not part of the current approval stage".to_string())
        })?;

    let stage = &mut document.approval_matrix[stage_index];
    if stage.decisions.iter().any(|d| d.user_id == actor.id) {
        return Err(QdmsError::Conflict(
            "approval decision already recorded".to_string(),
        ));
    }

    stage.decisions.push(StageDecision {
        user_id: actor.id.clone(),
        decision: verdict,
        comment: comment.clone(),
        decided_at: now,
        matched_token: Some(matched_token),
    });

    if verdict == Verdict::Rejected {
        stage.status = StageStatus::Rejected;
        stage.decided_by = Some(actor.id.clone());
        stage.decided_at = Some(now);
        stage.comment = comment.clone();
        if let Some(version) = document.current_version_mut() {
            version.status = VersionStatus::Draft;
        }
        document.record_status(
            DocumentStatus::Draft,
            &actor.id,
            Some(comment.unwrap_or_else(|| "approval stage rejected".to_string())),
            now,
        );
        return Ok(DecisionOutcome::DocumentRejected);
    }

    if !stage_is_complete(stage) {
        document.updated_at = now;
        return Ok(DecisionOutcome::StageIncomplete);
    }

    stage.status = StageStatus::Approved;
    stage.decided_by = Some(actor.id.clone());
    stage.decided_at = Some(now);
    stage.comment = comment.clone();

    let stage_no = stage.stage;
    let remaining_pending = document
        .approval_matrix
        .iter()
        .any(|s| s.status == StageStatus::Pending);

    if remaining_pending {
        document.record_status(
            DocumentStatus::Review,
            &actor.id,
            Some(comment.unwrap_or_else(|| format!("stage {stage_no} approved"))),
            now,
        );
        Ok(DecisionOutcome::StageApproved)
    } else {
        document.published_at = Some(now);
        if let Some(version) = document.current_version_mut() {
            version.status = VersionStatus::Published;
        }
        document.record_status(
            DocumentStatus::Approved,
            &actor.id,
            Some(comment.unwrap_or_else(|| format!("stage {stage_no} approved"))),
            now,
        );
        Ok(DecisionOutcome::DocumentApproved)
    }
}

// =============================================================================
// TESTS
// =============================================================================
