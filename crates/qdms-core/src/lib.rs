//! # qdms-core
//!
//! The deterministic domain engine for QDMS - THE LOGIC.
//!
//! This crate implements the quality/document-management domain: the
//! document approval workflow (approver tokens, stage engine, lifecycle,
//! read receipts), RBAC, folder capabilities and code generation, the
//! quality-record families (complaints, CAPA, audits, risks,
//! calibration), and the embedded redb record store.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Deterministic: BTreeMap/BTreeSet ordering, integer arithmetic only
//! - Clock-free: every state transition takes `now` as a parameter;
//!   the HTTP/CLI layer in `apps/qdms` owns the clock

// =============================================================================
// MODULES
// =============================================================================

pub mod approval;
pub mod document;
pub mod folder;
pub mod lifecycle;
pub mod notify;
pub mod rbac;
pub mod records;
pub mod report;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ApprovalType, DocumentStatus, NotificationKind, PrincipalType, QdmsError, ReceiptStatus,
    StageStatus, StatusChange, Timestamp, Verdict, VersionStatus, new_id, normalize,
    validate_status,
};

// =============================================================================
// RE-EXPORTS: Documents & Workflow
// =============================================================================

pub use approval::{
    DecisionOutcome, apply_decision, find_pending_stage, resolve_matching_token, stage_is_complete,
    user_matches_approver,
};
pub use document::{
    ApprovalStage, Distribution, Document, DocumentStatusEntry, ReadReceipt, StageDecision,
    VersionRecord,
};
pub use lifecycle::{
    acknowledge_read, create_version, initial_read_receipts, next_version_label, normalize_stages,
    override_status, reset_stages,
};

// =============================================================================
// RE-EXPORTS: RBAC, Folders, Records
// =============================================================================

pub use folder::{
    Capability, DEFAULT_CODE_PATTERN, Folder, FolderPermission, capabilities_for_user,
    ensure_capability, generate_code, sanitize_permissions, user_has_capability,
};
pub use rbac::{ADMIN_ROLE_KEYS, Role, User, effective_permissions, ensure_permission, is_admin_role};
pub use records::{
    Audit, AuditFinding, AuditTeamMember, CalibrationDevice, CalibrationWorkOrder, Capa,
    CapaAction, Complaint, MeasurementRecord, RiskAssessment, RiskLevel, RiskScore, level_for_score,
    measurement_passes, next_due_date, record_code, score_risk,
};

// =============================================================================
// RE-EXPORTS: Reporting, Notifications, Store
// =============================================================================

pub use notify::{Notification, fan_out, resolve_recipients};
pub use report::{DocumentStatusReport, ReportFilter, document_status_report};
pub use storage::{FileMeta, Store};
