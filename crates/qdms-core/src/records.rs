//! # Quality Records
//!
//! Complaints, CAPA records, audits, risk assessments, and calibration
//! equipment. These follow a uniform shape: an auto-numbered record with
//! denormalized embedded lists and an appended status history.
//!
//! All scoring and measurement fields are integers: risk uses the 1..=5
//! matrix scale directly, calibration measurements are stored in
//! milli-units (value × 1000).

use crate::types::{QdmsError, StatusChange, Timestamp, validate_status};
use serde::{Deserialize, Serialize};

// =============================================================================
// STATUS ALLOW-LISTS
// =============================================================================

pub const COMPLAINT_STATUSES: [&str; 4] = ["open", "investigating", "resolved", "closed"];
pub const CAPA_STATUSES: [&str; 6] = [
    "open",
    "investigating",
    "implementing",
    "pending_closure",
    "closed",
    "cancelled",
];
pub const CAPA_ACTION_STATUSES: [&str; 4] = ["open", "in_progress", "completed", "overdue"];
pub const AUDIT_STATUSES: [&str; 4] = ["planned", "in_progress", "completed", "closed"];
pub const FINDING_STATUSES: [&str; 2] = ["open", "closed"];
pub const RISK_STATUSES: [&str; 4] = ["identified", "assessed", "mitigating", "closed"];
pub const DEVICE_STATUSES: [&str; 3] = ["active", "maintenance", "retired"];
pub const WORK_ORDER_STATUSES: [&str; 4] = ["planned", "in_progress", "completed", "cancelled"];

/// Auto-number format shared by every record family: `PREFIX-YEAR-NNNN`.
#[must_use]
pub fn record_code(prefix: &str, year: i32, seq: u64) -> String {
    format!("{prefix}-{year}-{seq:04}")
}

/// Validate a target status and append a history entry.
fn transition(
    status: &mut String,
    history: &mut Vec<StatusChange>,
    target: &str,
    allowed: &[&str],
    changed_by: &str,
    note: Option<String>,
    now: Timestamp,
) -> Result<(), QdmsError> {
    let normalized = validate_status(target, allowed)?;
    history.push(StatusChange::new(normalized.clone(), changed_by, now, note));
    *status = normalized;
    Ok(())
}

// =============================================================================
// COMPLAINTS
// =============================================================================

/// A customer complaint record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: String,
    pub complaint_no: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub customer_name: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default = "default_open")]
    pub status: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub investigation_notes: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub linked_capa_ids: Vec<String>,
    #[serde(default)]
    pub file_attachments: Vec<String>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub created_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Complaint {
    pub fn set_status(
        &mut self,
        target: &str,
        changed_by: &str,
        note: Option<String>,
        now: Timestamp,
    ) -> Result<(), QdmsError> {
        transition(
            &mut self.status,
            &mut self.status_history,
            target,
            &COMPLAINT_STATUSES,
            changed_by,
            note,
            now,
        )?;
        self.updated_at = now;
        Ok(())
    }
}

// =============================================================================
// CAPA
// =============================================================================

/// A corrective or preventive action item inside a CAPA record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapaAction {
    pub id: String,
    pub description: String,
    pub responsible: String,
    #[serde(default)]
    pub due_date: Option<Timestamp>,
    #[serde(default = "default_open")]
    pub status: String,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Corrective and Preventive Action record (CAPA / DÖF).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capa {
    pub id: String,
    pub capa_no: String,
    pub title: String,
    /// Origin: internal_audit, customer_complaint, management_review, ...
    pub source: String,
    pub department: String,
    pub initiated_by: String,
    pub team_leader: String,
    pub initiated_date: Timestamp,
    #[serde(default)]
    pub target_date: Option<Timestamp>,
    #[serde(default = "default_open")]
    pub status: String,
    pub nonconformity_description: String,
    #[serde(default)]
    pub root_cause_analysis: Option<String>,
    #[serde(default)]
    pub immediate_action: Option<String>,
    #[serde(default)]
    pub corrective_actions: Vec<CapaAction>,
    #[serde(default)]
    pub preventive_actions: Vec<CapaAction>,
    #[serde(default)]
    pub effectiveness_review: Option<String>,
    #[serde(default)]
    pub team_members: Vec<String>,
    #[serde(default)]
    pub linked_risk_ids: Vec<String>,
    #[serde(default)]
    pub linked_audit_finding_ids: Vec<String>,
    #[serde(default)]
    pub file_attachments: Vec<String>,
    #[serde(default)]
    pub closure_requested_at: Option<Timestamp>,
    #[serde(default)]
    pub closure_requested_by: Option<String>,
    #[serde(default)]
    pub closure_request_note: Option<String>,
    #[serde(default)]
    pub closure_approved_at: Option<Timestamp>,
    #[serde(default)]
    pub closure_approved_by: Option<String>,
    #[serde(default)]
    pub closure_decision_note: Option<String>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Capa {
    pub fn set_status(
        &mut self,
        target: &str,
        changed_by: &str,
        note: Option<String>,
        now: Timestamp,
    ) -> Result<(), QdmsError> {
        transition(
            &mut self.status,
            &mut self.status_history,
            target,
            &CAPA_STATUSES,
            changed_by,
            note,
            now,
        )?;
        self.updated_at = now;
        Ok(())
    }

    /// Request closure: only an open-family CAPA may enter `pending_closure`.
    pub fn request_closure(
        &mut self,
        requested_by: &str,
        note: Option<String>,
        now: Timestamp,
    ) -> Result<(), QdmsError> {
        if self.status == "closed" || self.status == "cancelled" {
            return Err(QdmsError::InvalidTransition {
                from: self.status.clone(),
                to: "pending_closure".to_string(),
            });
        }
        self.closure_requested_at = Some(now);
        self.closure_requested_by = Some(requested_by.to_string());
        self.closure_request_note = note.clone();
        self.set_status("pending_closure", requested_by, note, now)
    }

    /// Decide a pending closure request: approve closes the CAPA, deny
    /// sends it back to `implementing`.
    pub fn decide_closure(
        &mut self,
        approve: bool,
        decided_by: &str,
        note: Option<String>,
        now: Timestamp,
    ) -> Result<(), QdmsError> {
        if self.status != "pending_closure" {
            return Err(QdmsError::InvalidTransition {
                from: self.status.clone(),
                to: if approve { "closed" } else { "implementing" }.to_string(),
            });
        }
        self.closure_approved_at = Some(now);
        self.closure_approved_by = Some(decided_by.to_string());
        self.closure_decision_note = note.clone();
        let target = if approve { "closed" } else { "implementing" };
        self.set_status(target, decided_by, note, now)
    }
}

// =============================================================================
// AUDITS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTeamMember {
    pub user_id: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// A finding raised during an audit, optionally linked to a CAPA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFinding {
    pub id: String,
    pub description: String,
    /// major / minor / observation / opportunity
    pub finding_type: String,
    #[serde(default)]
    pub clause: Option<String>,
    #[serde(default = "default_open")]
    pub status: String,
    #[serde(default)]
    pub linked_capa_id: Option<String>,
    pub raised_by: String,
    pub raised_at: Timestamp,
}

/// An internal or external audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    pub id: String,
    pub audit_code: String,
    pub audit_type: String,
    pub scope: String,
    pub department: String,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    #[serde(default = "default_planned")]
    pub status: String,
    pub lead_auditor: String,
    #[serde(default)]
    pub audit_team: Vec<AuditTeamMember>,
    #[serde(default)]
    pub auditee_representative: Option<String>,
    #[serde(default)]
    pub objectives: Option<String>,
    #[serde(default)]
    pub findings: Vec<AuditFinding>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub created_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Audit {
    pub fn set_status(
        &mut self,
        target: &str,
        changed_by: &str,
        note: Option<String>,
        now: Timestamp,
    ) -> Result<(), QdmsError> {
        transition(
            &mut self.status,
            &mut self.status_history,
            target,
            &AUDIT_STATUSES,
            changed_by,
            note,
            now,
        )?;
        self.updated_at = now;
        Ok(())
    }
}

// =============================================================================
// RISK ASSESSMENTS
// =============================================================================

/// Risk level band from the 5×5 matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// The 5×5 level matrix, indexed `[likelihood - 1][impact - 1]`.
pub const RISK_MATRIX: [[RiskLevel; 5]; 5] = {
    use RiskLevel::{Critical, High, Low, Medium};
    [
        [Low, Low, Medium, Medium, High],
        [Low, Medium, Medium, High, High],
        [Medium, Medium, High, High, Critical],
        [Medium, High, High, Critical, Critical],
        [High, High, Critical, Critical, Critical],
    ]
};

/// Computed risk score block stored on the assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    /// likelihood × impact on the 1..=5 scale (1..=25).
    pub inherent: i64,
    /// Inherent score discounted by controls effectiveness (percent).
    pub residual: i64,
    pub inherent_level: RiskLevel,
    pub residual_level: RiskLevel,
}

/// Validate a factor on the 1..=5 matrix scale.
fn validate_factor(name: &str, value: i64) -> Result<i64, QdmsError> {
    if (1..=5).contains(&value) {
        Ok(value)
    } else {
        Err(QdmsError::InvalidInput(format!(
            "{name} must be between 1 and 5, got {value}"
        )))
    }
}

/// Level band for a raw score (1..=25), used for residual scores that do
/// not land on a matrix cell.
#[must_use]
pub fn level_for_score(score: i64) -> RiskLevel {
    match score {
        i64::MIN..=5 => RiskLevel::Low,
        6..=12 => RiskLevel::Medium,
        13..=20 => RiskLevel::High,
        _ => RiskLevel::Critical,
    }
}

/// Compute the score block for a likelihood/impact pair.
///
/// `controls_effectiveness` is a percentage (0..=100) discounting the
/// residual score; `None` leaves residual equal to inherent.
pub fn score_risk(
    likelihood: i64,
    impact: i64,
    controls_effectiveness: Option<i64>,
) -> Result<RiskScore, QdmsError> {
    let likelihood = validate_factor("likelihood", likelihood)?;
    let impact = validate_factor("impact", impact)?;
    let effectiveness = match controls_effectiveness {
        Some(pct) if !(0..=100).contains(&pct) => {
            return Err(QdmsError::InvalidInput(format!(
                "controls_effectiveness must be between 0 and 100, got {pct}"
            )));
        }
        Some(pct) => pct,
        None => 0,
    };

    let inherent = likelihood.saturating_mul(impact);
    // Integer discount: residual = inherent * (100 - eff) / 100, floor,
    // but never below 1 while a risk exists.
    let residual = ((inherent.saturating_mul(100 - effectiveness)) / 100).max(1);
    let inherent_level = RISK_MATRIX[(likelihood - 1) as usize][(impact - 1) as usize];

    Ok(RiskScore {
        inherent,
        residual,
        inherent_level,
        residual_level: level_for_score(residual),
    })
}

/// A risk assessment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: String,
    pub risk_code: String,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub process: Option<String>,
    pub owner: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_identified")]
    pub status: String,
    /// 1..=5 matrix scale.
    pub likelihood: i64,
    /// 1..=5 matrix scale.
    pub impact: i64,
    /// Percentage 0..=100.
    #[serde(default)]
    pub controls_effectiveness: Option<i64>,
    pub risk_score: RiskScore,
    #[serde(default)]
    pub linked_capa_ids: Vec<String>,
    #[serde(default)]
    pub linked_audit_finding_ids: Vec<String>,
    #[serde(default)]
    pub next_review_date: Option<Timestamp>,
    #[serde(default)]
    pub last_reviewed_at: Option<Timestamp>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub created_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RiskAssessment {
    pub fn set_status(
        &mut self,
        target: &str,
        changed_by: &str,
        note: Option<String>,
        now: Timestamp,
    ) -> Result<(), QdmsError> {
        transition(
            &mut self.status,
            &mut self.status_history,
            target,
            &RISK_STATUSES,
            changed_by,
            note,
            now,
        )?;
        self.updated_at = now;
        Ok(())
    }

    /// Re-score after likelihood/impact/controls changed.
    pub fn rescore(&mut self, now: Timestamp) -> Result<(), QdmsError> {
        self.risk_score = score_risk(self.likelihood, self.impact, self.controls_effectiveness)?;
        self.last_reviewed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

// =============================================================================
// CALIBRATION
// =============================================================================

/// A measurement taken during calibration, in milli-units (value × 1000)
/// to keep the store float-free.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub id: String,
    pub parameter: String,
    pub nominal_milli: i64,
    #[serde(default)]
    pub tolerance_milli: Option<i64>,
    pub observed_milli: i64,
    pub passed: bool,
    pub recorded_at: Timestamp,
    #[serde(default)]
    pub recorded_by: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Within-tolerance check on milli-unit measurements. Without a tolerance
/// the observation must match the nominal exactly.
#[must_use]
pub fn measurement_passes(nominal_milli: i64, observed_milli: i64, tolerance_milli: Option<i64>) -> bool {
    let deviation = (observed_milli - nominal_milli).abs();
    deviation <= tolerance_milli.unwrap_or(0)
}

/// A measurement device subject to periodic calibration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationDevice {
    pub id: String,
    pub device_code: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub responsible_person: Option<String>,
    #[serde(default = "default_active")]
    pub status: String,
    #[serde(default = "default_interval")]
    pub calibration_interval_days: i64,
    #[serde(default)]
    pub last_calibrated_at: Option<Timestamp>,
    #[serde(default)]
    pub next_due_date: Option<Timestamp>,
    #[serde(default = "default_notice")]
    pub notice_days: i64,
    #[serde(default)]
    pub file_attachments: Vec<String>,
    #[serde(default)]
    pub linked_capa_ids: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub created_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CalibrationDevice {
    pub fn set_status(
        &mut self,
        target: &str,
        changed_by: &str,
        note: Option<String>,
        now: Timestamp,
    ) -> Result<(), QdmsError> {
        transition(
            &mut self.status,
            &mut self.status_history,
            target,
            &DEVICE_STATUSES,
            changed_by,
            note,
            now,
        )?;
        self.updated_at = now;
        Ok(())
    }

    /// Record a completed calibration and recompute the next due date.
    pub fn mark_calibrated(&mut self, calibrated_at: Timestamp, now: Timestamp) {
        self.last_calibrated_at = Some(calibrated_at);
        self.next_due_date = next_due_date(calibrated_at, self.calibration_interval_days);
        self.updated_at = now;
    }
}

/// `last + interval` in days; `None` on out-of-range arithmetic.
#[must_use]
pub fn next_due_date(last_calibrated: Timestamp, interval_days: i64) -> Option<Timestamp> {
    last_calibrated.checked_add_signed(chrono::Duration::days(interval_days))
}

/// A calibration work order against a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationWorkOrder {
    pub id: String,
    pub work_order_no: String,
    pub device_id: String,
    pub planned_date: Timestamp,
    pub due_date: Timestamp,
    #[serde(default = "default_planned")]
    pub status: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub measurement_records: Vec<MeasurementRecord>,
    #[serde(default)]
    pub linked_capa_ids: Vec<String>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub created_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CalibrationWorkOrder {
    pub fn set_status(
        &mut self,
        target: &str,
        changed_by: &str,
        note: Option<String>,
        now: Timestamp,
    ) -> Result<(), QdmsError> {
        transition(
            &mut self.status,
            &mut self.status_history,
            target,
            &WORK_ORDER_STATUSES,
            changed_by,
            note,
            now,
        )?;
        if self.status == "completed" {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }
}

// =============================================================================
// DEFAULTS
// =============================================================================

fn default_open() -> String {
    "open".to_string()
}

fn default_planned() -> String {
    "planned".to_string()
}

fn default_identified() -> String {
    "identified".to_string()
}

fn default_active() -> String {
    "active".to_string()
}

const fn default_interval() -> i64 {
    365
}

const fn default_notice() -> i64 {
    14
}

// =============================================================================
// TESTS
// =============================================================================
