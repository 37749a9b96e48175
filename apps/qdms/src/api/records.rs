//! # Quality Record Handlers
//!
//! CRUD for the record families: complaints, CAPA records, audits, risk
//! assessments, calibration devices, and work orders. All share the same
//! shape: auto-numbered create, filtered list, patch with an optional
//! status transition, delete.
//!
//! Access is permission-keyed per module (`qm.<module>.read` /
//! `qm.<module>.write`), evaluated over the effective permission set so
//! role grants count.

use super::{AppState, now, types};
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    response::Response,
    routing::{get, post},
};
use chrono::Datelike;
use qdms_core::{
    Audit, AuditFinding, AuditTeamMember, CalibrationDevice, CalibrationWorkOrder, Capa,
    CapaAction, Complaint, MeasurementRecord, QdmsError, RiskAssessment, Store, Timestamp, User,
    effective_permissions, measurement_passes, new_id, score_risk,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

// Collection keys in the generic records table.
const COMPLAINTS: &str = "complaints";
const CAPAS: &str = "capas";
const AUDITS: &str = "audits";
const RISKS: &str = "risks";
const DEVICES: &str = "devices";
const WORK_ORDERS: &str = "work_orders";

// =============================================================================
// ROUTER
// =============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        // Complaints
        .route(
            "/complaints",
            get(list_complaints_handler).post(create_complaint_handler),
        )
        .route(
            "/complaints/{id}",
            get(get_complaint_handler)
                .patch(patch_complaint_handler)
                .delete(delete_complaint_handler),
        )
        // CAPA
        .route("/capas", get(list_capas_handler).post(create_capa_handler))
        .route(
            "/capas/{id}",
            get(get_capa_handler)
                .patch(patch_capa_handler)
                .delete(delete_capa_handler),
        )
        .route("/capas/{id}/actions", post(add_capa_action_handler))
        .route(
            "/capas/{id}/actions/{action_id}",
            axum::routing::patch(patch_capa_action_handler),
        )
        .route(
            "/capas/{id}/closure/request",
            post(request_capa_closure_handler),
        )
        .route(
            "/capas/{id}/closure/decision",
            post(decide_capa_closure_handler),
        )
        // Audits
        .route("/audits", get(list_audits_handler).post(create_audit_handler))
        .route(
            "/audits/{id}",
            get(get_audit_handler)
                .patch(patch_audit_handler)
                .delete(delete_audit_handler),
        )
        .route("/audits/{id}/findings", post(add_finding_handler))
        .route(
            "/audits/{id}/findings/{finding_id}",
            axum::routing::patch(patch_finding_handler),
        )
        // Risks
        .route("/risks", get(list_risks_handler).post(create_risk_handler))
        .route(
            "/risks/{id}",
            get(get_risk_handler)
                .patch(patch_risk_handler)
                .delete(delete_risk_handler),
        )
        // Calibration devices
        .route(
            "/devices",
            get(list_devices_handler).post(create_device_handler),
        )
        .route(
            "/devices/{id}",
            get(get_device_handler)
                .patch(patch_device_handler)
                .delete(delete_device_handler),
        )
        .route("/devices/{id}/calibrate", post(calibrate_device_handler))
        // Work orders
        .route(
            "/work-orders",
            get(list_work_orders_handler).post(create_work_order_handler),
        )
        .route(
            "/work-orders/{id}",
            get(get_work_order_handler)
                .patch(patch_work_order_handler)
                .delete(delete_work_order_handler),
        )
        .route(
            "/work-orders/{id}/measurements",
            post(add_measurement_handler),
        )
}

// =============================================================================
// SHARED HELPERS
// =============================================================================

/// Check a `qm.*` permission over the effective set so role grants apply.
fn ensure_module_permission(
    store: &Store,
    actor: &User,
    permission: &str,
) -> Result<(), QdmsError> {
    if actor.has_permission(permission) {
        return Ok(());
    }
    let roles = store.list_roles()?;
    let effective = effective_permissions(actor, &roles);
    if effective.iter().any(|p| p == permission || p == "*") {
        Ok(())
    } else {
        Err(QdmsError::PermissionDenied(permission.to_string()))
    }
}

fn list_collection<T: Serialize + DeserializeOwned>(
    store: &Store,
    actor: &User,
    collection: &str,
    read_permission: &str,
) -> Response {
    if let Err(e) = ensure_module_permission(store, actor, read_permission) {
        return types::error_response(&e);
    }
    match store.list_records::<T>(collection) {
        Ok(records) => types::ok_json(records),
        Err(e) => types::error_response(&e),
    }
}

fn get_one<T: Serialize + DeserializeOwned>(
    store: &Store,
    actor: &User,
    collection: &str,
    id: &str,
    read_permission: &str,
) -> Response {
    if let Err(e) = ensure_module_permission(store, actor, read_permission) {
        return types::error_response(&e);
    }
    match store.get_record::<T>(collection, id) {
        Ok(Some(record)) => types::ok_json(record),
        Ok(None) => types::error_response(&QdmsError::NotFound(format!("{collection}/{id}"))),
        Err(e) => types::error_response(&e),
    }
}

fn delete_one(
    store: &Store,
    actor: &User,
    collection: &str,
    id: &str,
    write_permission: &str,
) -> Response {
    if let Err(e) = ensure_module_permission(store, actor, write_permission) {
        return types::error_response(&e);
    }
    match store.delete_record(collection, id) {
        Ok(true) => types::ok_json(serde_json::json!({ "deleted": true })),
        Ok(false) => types::error_response(&QdmsError::NotFound(format!("{collection}/{id}"))),
        Err(e) => types::error_response(&e),
    }
}

/// Load a record for a guarded mutation, or bail with the mapped error.
fn load_for_update<T: DeserializeOwned>(
    store: &Store,
    actor: &User,
    collection: &str,
    id: &str,
    write_permission: &str,
) -> Result<T, QdmsError> {
    ensure_module_permission(store, actor, write_permission)?;
    store
        .get_record::<T>(collection, id)?
        .ok_or_else(|| QdmsError::NotFound(format!("{collection}/{id}")))
}

// =============================================================================
// COMPLAINTS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ComplaintPayload {
    pub title: String,
    pub customer_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ComplaintPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub assigned_to: Option<String>,
    pub investigation_notes: Option<String>,
    pub resolution: Option<String>,
    pub linked_capa_ids: Option<Vec<String>>,
    pub status: Option<String>,
    pub status_note: Option<String>,
}

pub async fn list_complaints_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    list_collection::<Complaint>(&*state.store.read().await, &actor, COMPLAINTS, "qm.complaint.read")
}

pub async fn create_complaint_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<ComplaintPayload>,
) -> Response {
    let store = state.store.write().await;
    if let Err(e) = ensure_module_permission(&store, &actor, "qm.complaint.write") {
        return types::error_response(&e);
    }
    if payload.title.trim().is_empty() || payload.customer_name.trim().is_empty() {
        return types::error_response(&QdmsError::InvalidInput(
            "title and customer_name are required".to_string(),
        ));
    }

    let timestamp = now();
    let complaint_no = match store.next_code(COMPLAINTS, "COMP", timestamp.year()) {
        Ok(code) => code,
        Err(e) => return types::error_response(&e),
    };
    let complaint = Complaint {
        id: new_id(),
        complaint_no,
        title: payload.title.trim().to_string(),
        description: payload.description,
        customer_name: payload.customer_name.trim().to_string(),
        category_id: payload.category_id,
        severity: payload.severity,
        status: "open".to_string(),
        assigned_to: payload.assigned_to,
        investigation_notes: None,
        resolution: None,
        linked_capa_ids: vec![],
        file_attachments: vec![],
        status_history: vec![],
        created_by: actor.id.clone(),
        created_at: timestamp,
        updated_at: timestamp,
    };
    match store.put_record(COMPLAINTS, &complaint.id, &complaint) {
        Ok(()) => types::created_json(complaint),
        Err(e) => types::error_response(&e),
    }
}

pub async fn get_complaint_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    get_one::<Complaint>(&*state.store.read().await, &actor, COMPLAINTS, &id, "qm.complaint.read")
}

pub async fn patch_complaint_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(patch): Json<ComplaintPatch>,
) -> Response {
    let store = state.store.write().await;
    let mut complaint: Complaint =
        match load_for_update(&store, &actor, COMPLAINTS, &id, "qm.complaint.write") {
            Ok(record) => record,
            Err(e) => return types::error_response(&e),
        };

    if let Some(title) = patch.title {
        complaint.title = title;
    }
    if let Some(description) = patch.description {
        complaint.description = Some(description);
    }
    if let Some(severity) = patch.severity {
        complaint.severity = Some(severity);
    }
    if let Some(assigned_to) = patch.assigned_to {
        complaint.assigned_to = Some(assigned_to);
    }
    if let Some(notes) = patch.investigation_notes {
        complaint.investigation_notes = Some(notes);
    }
    if let Some(resolution) = patch.resolution {
        complaint.resolution = Some(resolution);
    }
    if let Some(linked) = patch.linked_capa_ids {
        complaint.linked_capa_ids = linked;
    }
    let timestamp = now();
    if let Some(status) = patch.status {
        if let Err(e) = complaint.set_status(&status, &actor.id, patch.status_note, timestamp) {
            return types::error_response(&e);
        }
    } else {
        complaint.updated_at = timestamp;
    }

    match store.put_record(COMPLAINTS, &complaint.id, &complaint) {
        Ok(()) => types::ok_json(complaint),
        Err(e) => types::error_response(&e),
    }
}

pub async fn delete_complaint_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    delete_one(&*state.store.write().await, &actor, COMPLAINTS, &id, "qm.complaint.write")
}

// =============================================================================
// CAPA
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CapaPayload {
    pub title: String,
    pub source: String,
    pub department: String,
    pub team_leader: String,
    pub nonconformity_description: String,
    #[serde(default)]
    pub target_date: Option<Timestamp>,
    #[serde(default)]
    pub team_members: Vec<String>,
    #[serde(default)]
    pub linked_risk_ids: Vec<String>,
    #[serde(default)]
    pub linked_audit_finding_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CapaPatch {
    pub title: Option<String>,
    pub department: Option<String>,
    pub team_leader: Option<String>,
    pub target_date: Option<Timestamp>,
    pub root_cause_analysis: Option<String>,
    pub immediate_action: Option<String>,
    pub effectiveness_review: Option<String>,
    pub team_members: Option<Vec<String>>,
    pub linked_risk_ids: Option<Vec<String>>,
    pub linked_audit_finding_ids: Option<Vec<String>>,
    pub status: Option<String>,
    pub status_note: Option<String>,
}

/// New corrective or preventive action on a CAPA.
#[derive(Debug, Deserialize)]
pub struct CapaActionPayload {
    /// `corrective` or `preventive`.
    pub kind: String,
    pub description: String,
    pub responsible: String,
    #[serde(default)]
    pub due_date: Option<Timestamp>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CapaActionPatch {
    pub description: Option<String>,
    pub responsible: Option<String>,
    pub due_date: Option<Timestamp>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClosureRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClosureDecision {
    pub approve: bool,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn list_capas_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    list_collection::<Capa>(&*state.store.read().await, &actor, CAPAS, "qm.capa.read")
}

pub async fn create_capa_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<CapaPayload>,
) -> Response {
    let store = state.store.write().await;
    if let Err(e) = ensure_module_permission(&store, &actor, "qm.capa.write") {
        return types::error_response(&e);
    }
    if payload.title.trim().is_empty() || payload.nonconformity_description.trim().is_empty() {
        return types::error_response(&QdmsError::InvalidInput(
            "title and nonconformity_description are required".to_string(),
        ));
    }

    let timestamp = now();
    let capa_no = match store.next_code(CAPAS, "CAPA", timestamp.year()) {
        Ok(code) => code,
        Err(e) => return types::error_response(&e),
    };
    let capa = Capa {
        id: new_id(),
        capa_no,
        title: payload.title.trim().to_string(),
        source: payload.source,
        department: payload.department,
        initiated_by: actor.id.clone(),
        team_leader: payload.team_leader,
        initiated_date: timestamp,
        target_date: payload.target_date,
        status: "open".to_string(),
        nonconformity_description: payload.nonconformity_description,
        root_cause_analysis: None,
        immediate_action: None,
        corrective_actions: vec![],
        preventive_actions: vec![],
        effectiveness_review: None,
        team_members: payload.team_members,
        linked_risk_ids: payload.linked_risk_ids,
        linked_audit_finding_ids: payload.linked_audit_finding_ids,
        file_attachments: vec![],
        closure_requested_at: None,
        closure_requested_by: None,
        closure_request_note: None,
        closure_approved_at: None,
        closure_approved_by: None,
        closure_decision_note: None,
        status_history: vec![],
        created_at: timestamp,
        updated_at: timestamp,
    };
    match store.put_record(CAPAS, &capa.id, &capa) {
        Ok(()) => types::created_json(capa),
        Err(e) => types::error_response(&e),
    }
}

pub async fn get_capa_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    get_one::<Capa>(&*state.store.read().await, &actor, CAPAS, &id, "qm.capa.read")
}

pub async fn patch_capa_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(patch): Json<CapaPatch>,
) -> Response {
    let store = state.store.write().await;
    let mut capa: Capa = match load_for_update(&store, &actor, CAPAS, &id, "qm.capa.write") {
        Ok(record) => record,
        Err(e) => return types::error_response(&e),
    };

    if let Some(title) = patch.title {
        capa.title = title;
    }
    if let Some(department) = patch.department {
        capa.department = department;
    }
    if let Some(team_leader) = patch.team_leader {
        capa.team_leader = team_leader;
    }
    if let Some(target_date) = patch.target_date {
        capa.target_date = Some(target_date);
    }
    if let Some(root_cause) = patch.root_cause_analysis {
        capa.root_cause_analysis = Some(root_cause);
    }
    if let Some(action) = patch.immediate_action {
        capa.immediate_action = Some(action);
    }
    if let Some(review) = patch.effectiveness_review {
        capa.effectiveness_review = Some(review);
    }
    if let Some(members) = patch.team_members {
        capa.team_members = members;
    }
    if let Some(risks) = patch.linked_risk_ids {
        capa.linked_risk_ids = risks;
    }
    if let Some(findings) = patch.linked_audit_finding_ids {
        capa.linked_audit_finding_ids = findings;
    }
    let timestamp = now();
    if let Some(status) = patch.status {
        if let Err(e) = capa.set_status(&status, &actor.id, patch.status_note, timestamp) {
            return types::error_response(&e);
        }
    } else {
        capa.updated_at = timestamp;
    }

    match store.put_record(CAPAS, &capa.id, &capa) {
        Ok(()) => types::ok_json(capa),
        Err(e) => types::error_response(&e),
    }
}

pub async fn delete_capa_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    delete_one(&*state.store.write().await, &actor, CAPAS, &id, "qm.capa.write")
}

pub async fn add_capa_action_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(payload): Json<CapaActionPayload>,
) -> Response {
    let store = state.store.write().await;
    let mut capa: Capa = match load_for_update(&store, &actor, CAPAS, &id, "qm.capa.write") {
        Ok(record) => record,
        Err(e) => return types::error_response(&e),
    };

    let timestamp = now();
    let action = CapaAction {
        id: new_id(),
        description: payload.description,
        responsible: payload.responsible,
        due_date: payload.due_date,
        status: "open".to_string(),
        completed_at: None,
        created_at: timestamp,
    };
    match payload.kind.as_str() {
        "corrective" => capa.corrective_actions.push(action),
        "preventive" => capa.preventive_actions.push(action),
        other => {
            return types::error_response(&QdmsError::InvalidInput(format!(
                "action kind must be corrective or preventive, got '{other}'"
            )));
        }
    }
    capa.updated_at = timestamp;

    match store.put_record(CAPAS, &capa.id, &capa) {
        Ok(()) => types::ok_json(capa),
        Err(e) => types::error_response(&e),
    }
}

pub async fn patch_capa_action_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path((id, action_id)): Path<(String, String)>,
    Json(patch): Json<CapaActionPatch>,
) -> Response {
    let store = state.store.write().await;
    let mut capa: Capa = match load_for_update(&store, &actor, CAPAS, &id, "qm.capa.write") {
        Ok(record) => record,
        Err(e) => return types::error_response(&e),
    };

    let timestamp = now();
    let Some(action) = capa
        .corrective_actions
        .iter_mut()
        .chain(capa.preventive_actions.iter_mut())
        .find(|a| a.id == action_id)
    else {
        return types::error_response(&QdmsError::NotFound(format!(
            "action {action_id} on capa {id}"
        )));
    };

    if let Some(description) = patch.description {
        action.description = description;
    }
    if let Some(responsible) = patch.responsible {
        action.responsible = responsible;
    }
    if let Some(due_date) = patch.due_date {
        action.due_date = Some(due_date);
    }
    if let Some(status) = patch.status {
        let normalized = match qdms_core::validate_status(&status, &qdms_core::records::CAPA_ACTION_STATUSES) {
            Ok(s) => s,
            Err(e) => return types::error_response(&e),
        };
        if normalized == "completed" {
            action.completed_at = Some(timestamp);
        }
        action.status = normalized;
    }
    capa.updated_at = timestamp;

    match store.put_record(CAPAS, &capa.id, &capa) {
        Ok(()) => types::ok_json(capa),
        Err(e) => types::error_response(&e),
    }
}

pub async fn request_capa_closure_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(request): Json<ClosureRequest>,
) -> Response {
    let store = state.store.write().await;
    let mut capa: Capa = match load_for_update(&store, &actor, CAPAS, &id, "qm.capa.write") {
        Ok(record) => record,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = capa.request_closure(&actor.id, request.note, now()) {
        return types::error_response(&e);
    }
    match store.put_record(CAPAS, &capa.id, &capa) {
        Ok(()) => types::ok_json(capa),
        Err(e) => types::error_response(&e),
    }
}

pub async fn decide_capa_closure_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(decision): Json<ClosureDecision>,
) -> Response {
    let store = state.store.write().await;
    let mut capa: Capa = match load_for_update(&store, &actor, CAPAS, &id, "qm.capa.close") {
        Ok(record) => record,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = capa.decide_closure(decision.approve, &actor.id, decision.note, now()) {
        return types::error_response(&e);
    }
    match store.put_record(CAPAS, &capa.id, &capa) {
        Ok(()) => types::ok_json(capa),
        Err(e) => types::error_response(&e),
    }
}

// =============================================================================
// AUDITS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AuditPayload {
    pub audit_type: String,
    pub scope: String,
    pub department: String,
    pub start_date: Timestamp,
    pub end_date: Timestamp,
    pub lead_auditor: String,
    #[serde(default)]
    pub audit_team: Vec<AuditTeamMember>,
    #[serde(default)]
    pub auditee_representative: Option<String>,
    #[serde(default)]
    pub objectives: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuditPatch {
    pub scope: Option<String>,
    pub department: Option<String>,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
    pub lead_auditor: Option<String>,
    pub audit_team: Option<Vec<AuditTeamMember>>,
    pub auditee_representative: Option<String>,
    pub objectives: Option<String>,
    pub status: Option<String>,
    pub status_note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FindingPayload {
    pub description: String,
    /// major / minor / observation / opportunity.
    pub finding_type: String,
    #[serde(default)]
    pub clause: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FindingPatch {
    pub status: Option<String>,
    pub linked_capa_id: Option<String>,
}

pub async fn list_audits_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    list_collection::<Audit>(&*state.store.read().await, &actor, AUDITS, "qm.audit.read")
}

pub async fn create_audit_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<AuditPayload>,
) -> Response {
    let store = state.store.write().await;
    if let Err(e) = ensure_module_permission(&store, &actor, "qm.audit.write") {
        return types::error_response(&e);
    }
    if payload.scope.trim().is_empty() {
        return types::error_response(&QdmsError::InvalidInput(
            "audit scope is required".to_string(),
        ));
    }
    if payload.end_date < payload.start_date {
        return types::error_response(&QdmsError::InvalidInput(
            "end_date must not precede start_date".to_string(),
        ));
    }

    let timestamp = now();
    let audit_code = match store.next_code(AUDITS, "AUD", timestamp.year()) {
        Ok(code) => code,
        Err(e) => return types::error_response(&e),
    };
    let audit = Audit {
        id: new_id(),
        audit_code,
        audit_type: payload.audit_type,
        scope: payload.scope,
        department: payload.department,
        start_date: payload.start_date,
        end_date: payload.end_date,
        status: "planned".to_string(),
        lead_auditor: payload.lead_auditor,
        audit_team: payload.audit_team,
        auditee_representative: payload.auditee_representative,
        objectives: payload.objectives,
        findings: vec![],
        status_history: vec![],
        created_by: actor.id.clone(),
        created_at: timestamp,
        updated_at: timestamp,
    };
    match store.put_record(AUDITS, &audit.id, &audit) {
        Ok(()) => types::created_json(audit),
        Err(e) => types::error_response(&e),
    }
}

pub async fn get_audit_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    get_one::<Audit>(&*state.store.read().await, &actor, AUDITS, &id, "qm.audit.read")
}

pub async fn patch_audit_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(patch): Json<AuditPatch>,
) -> Response {
    let store = state.store.write().await;
    let mut audit: Audit = match load_for_update(&store, &actor, AUDITS, &id, "qm.audit.write") {
        Ok(record) => record,
        Err(e) => return types::error_response(&e),
    };

    if let Some(scope) = patch.scope {
        audit.scope = scope;
    }
    if let Some(department) = patch.department {
        audit.department = department;
    }
    if let Some(start_date) = patch.start_date {
        audit.start_date = start_date;
    }
    if let Some(end_date) = patch.end_date {
        audit.end_date = end_date;
    }
    if let Some(lead) = patch.lead_auditor {
        audit.lead_auditor = lead;
    }
    if let Some(team) = patch.audit_team {
        audit.audit_team = team;
    }
    if let Some(rep) = patch.auditee_representative {
        audit.auditee_representative = Some(rep);
    }
    if let Some(objectives) = patch.objectives {
        audit.objectives = Some(objectives);
    }
    let timestamp = now();
    if let Some(status) = patch.status {
        if let Err(e) = audit.set_status(&status, &actor.id, patch.status_note, timestamp) {
            return types::error_response(&e);
        }
    } else {
        audit.updated_at = timestamp;
    }

    match store.put_record(AUDITS, &audit.id, &audit) {
        Ok(()) => types::ok_json(audit),
        Err(e) => types::error_response(&e),
    }
}

pub async fn delete_audit_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    delete_one(&*state.store.write().await, &actor, AUDITS, &id, "qm.audit.write")
}

pub async fn add_finding_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(payload): Json<FindingPayload>,
) -> Response {
    let store = state.store.write().await;
    let mut audit: Audit = match load_for_update(&store, &actor, AUDITS, &id, "qm.audit.write") {
        Ok(record) => record,
        Err(e) => return types::error_response(&e),
    };

    let timestamp = now();
    audit.findings.push(AuditFinding {
        id: new_id(),
        description: payload.description,
        finding_type: payload.finding_type,
        clause: payload.clause,
        status: "open".to_string(),
        linked_capa_id: None,
        raised_by: actor.id.clone(),
        raised_at: timestamp,
    });
    audit.updated_at = timestamp;

    match store.put_record(AUDITS, &audit.id, &audit) {
        Ok(()) => types::ok_json(audit),
        Err(e) => types::error_response(&e),
    }
}

pub async fn patch_finding_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path((id, finding_id)): Path<(String, String)>,
    Json(patch): Json<FindingPatch>,
) -> Response {
    let store = state.store.write().await;
    let mut audit: Audit = match load_for_update(&store, &actor, AUDITS, &id, "qm.audit.write") {
        Ok(record) => record,
        Err(e) => return types::error_response(&e),
    };

    let Some(finding) = audit.findings.iter_mut().find(|f| f.id == finding_id) else {
        return types::error_response(&QdmsError::NotFound(format!(
            "finding {finding_id} on audit {id}"
        )));
    };
    if let Some(status) = patch.status {
        match qdms_core::validate_status(&status, &qdms_core::records::FINDING_STATUSES) {
            Ok(normalized) => finding.status = normalized,
            Err(e) => return types::error_response(&e),
        }
    }
    if let Some(capa_id) = patch.linked_capa_id {
        finding.linked_capa_id = Some(capa_id);
    }
    audit.updated_at = now();

    match store.put_record(AUDITS, &audit.id, &audit) {
        Ok(()) => types::ok_json(audit),
        Err(e) => types::error_response(&e),
    }
}

// =============================================================================
// RISK ASSESSMENTS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RiskPayload {
    pub title: String,
    pub category: String,
    pub owner: String,
    #[serde(default)]
    pub process: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// 1..=5 matrix scale.
    pub likelihood: i64,
    /// 1..=5 matrix scale.
    pub impact: i64,
    /// Percentage 0..=100.
    #[serde(default)]
    pub controls_effectiveness: Option<i64>,
    #[serde(default)]
    pub next_review_date: Option<Timestamp>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RiskPatch {
    pub title: Option<String>,
    pub category: Option<String>,
    pub owner: Option<String>,
    pub process: Option<String>,
    pub description: Option<String>,
    pub likelihood: Option<i64>,
    pub impact: Option<i64>,
    pub controls_effectiveness: Option<i64>,
    pub linked_capa_ids: Option<Vec<String>>,
    pub linked_audit_finding_ids: Option<Vec<String>>,
    pub next_review_date: Option<Timestamp>,
    pub status: Option<String>,
    pub status_note: Option<String>,
}

pub async fn list_risks_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    list_collection::<RiskAssessment>(&*state.store.read().await, &actor, RISKS, "qm.risk.read")
}

pub async fn create_risk_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<RiskPayload>,
) -> Response {
    let store = state.store.write().await;
    if let Err(e) = ensure_module_permission(&store, &actor, "qm.risk.write") {
        return types::error_response(&e);
    }

    let risk_score = match score_risk(
        payload.likelihood,
        payload.impact,
        payload.controls_effectiveness,
    ) {
        Ok(score) => score,
        Err(e) => return types::error_response(&e),
    };

    let timestamp = now();
    let risk_code = match store.next_code(RISKS, "RISK", timestamp.year()) {
        Ok(code) => code,
        Err(e) => return types::error_response(&e),
    };
    let risk = RiskAssessment {
        id: new_id(),
        risk_code,
        title: payload.title,
        category: payload.category,
        process: payload.process,
        owner: payload.owner,
        description: payload.description,
        status: "identified".to_string(),
        likelihood: payload.likelihood,
        impact: payload.impact,
        controls_effectiveness: payload.controls_effectiveness,
        risk_score,
        linked_capa_ids: vec![],
        linked_audit_finding_ids: vec![],
        next_review_date: payload.next_review_date,
        last_reviewed_at: None,
        status_history: vec![],
        created_by: actor.id.clone(),
        created_at: timestamp,
        updated_at: timestamp,
    };
    match store.put_record(RISKS, &risk.id, &risk) {
        Ok(()) => types::created_json(risk),
        Err(e) => types::error_response(&e),
    }
}

pub async fn get_risk_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    get_one::<RiskAssessment>(&*state.store.read().await, &actor, RISKS, &id, "qm.risk.read")
}

pub async fn patch_risk_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(patch): Json<RiskPatch>,
) -> Response {
    let store = state.store.write().await;
    let mut risk: RiskAssessment = match load_for_update(&store, &actor, RISKS, &id, "qm.risk.write")
    {
        Ok(record) => record,
        Err(e) => return types::error_response(&e),
    };

    if let Some(title) = patch.title {
        risk.title = title;
    }
    if let Some(category) = patch.category {
        risk.category = category;
    }
    if let Some(owner) = patch.owner {
        risk.owner = owner;
    }
    if let Some(process) = patch.process {
        risk.process = Some(process);
    }
    if let Some(description) = patch.description {
        risk.description = Some(description);
    }
    if let Some(linked) = patch.linked_capa_ids {
        risk.linked_capa_ids = linked;
    }
    if let Some(findings) = patch.linked_audit_finding_ids {
        risk.linked_audit_finding_ids = findings;
    }
    if let Some(review) = patch.next_review_date {
        risk.next_review_date = Some(review);
    }

    let timestamp = now();
    let factors_changed = patch.likelihood.is_some()
        || patch.impact.is_some()
        || patch.controls_effectiveness.is_some();
    if let Some(likelihood) = patch.likelihood {
        risk.likelihood = likelihood;
    }
    if let Some(impact) = patch.impact {
        risk.impact = impact;
    }
    if let Some(effectiveness) = patch.controls_effectiveness {
        risk.controls_effectiveness = Some(effectiveness);
    }
    if factors_changed {
        if let Err(e) = risk.rescore(timestamp) {
            return types::error_response(&e);
        }
    }
    if let Some(status) = patch.status {
        if let Err(e) = risk.set_status(&status, &actor.id, patch.status_note, timestamp) {
            return types::error_response(&e);
        }
    } else {
        risk.updated_at = timestamp;
    }

    match store.put_record(RISKS, &risk.id, &risk) {
        Ok(()) => types::ok_json(risk),
        Err(e) => types::error_response(&e),
    }
}

pub async fn delete_risk_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    delete_one(&*state.store.write().await, &actor, RISKS, &id, "qm.risk.write")
}

// =============================================================================
// CALIBRATION DEVICES
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct DevicePayload {
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
    #[serde(default)]
    pub calibration_interval_days: Option<i64>,
    #[serde(default)]
    pub notice_days: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DevicePatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub department: Option<String>,
    pub responsible_person: Option<String>,
    pub calibration_interval_days: Option<i64>,
    pub notice_days: Option<i64>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub status_note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CalibratePayload {
    /// Defaults to the request time.
    pub calibrated_at: Option<Timestamp>,
}

pub async fn list_devices_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    list_collection::<CalibrationDevice>(
        &*state.store.read().await,
        &actor,
        DEVICES,
        "qm.calibration.read",
    )
}

pub async fn create_device_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<DevicePayload>,
) -> Response {
    let store = state.store.write().await;
    if let Err(e) = ensure_module_permission(&store, &actor, "qm.calibration.write") {
        return types::error_response(&e);
    }
    if payload.name.trim().is_empty() {
        return types::error_response(&QdmsError::InvalidInput(
            "device name is required".to_string(),
        ));
    }

    let timestamp = now();
    let device_code = match store.next_code(DEVICES, "DEV", timestamp.year()) {
        Ok(code) => code,
        Err(e) => return types::error_response(&e),
    };
    let device = CalibrationDevice {
        id: new_id(),
        device_code,
        name: payload.name.trim().to_string(),
        category: payload.category,
        location: payload.location,
        manufacturer: payload.manufacturer,
        model: payload.model,
        serial_number: payload.serial_number,
        department: payload.department,
        responsible_person: payload.responsible_person,
        status: "active".to_string(),
        calibration_interval_days: payload.calibration_interval_days.unwrap_or(365),
        last_calibrated_at: None,
        next_due_date: None,
        notice_days: payload.notice_days.unwrap_or(14),
        file_attachments: vec![],
        linked_capa_ids: vec![],
        notes: payload.notes,
        status_history: vec![],
        created_by: actor.id.clone(),
        created_at: timestamp,
        updated_at: timestamp,
    };
    match store.put_record(DEVICES, &device.id, &device) {
        Ok(()) => types::created_json(device),
        Err(e) => types::error_response(&e),
    }
}

pub async fn get_device_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    get_one::<CalibrationDevice>(
        &*state.store.read().await,
        &actor,
        DEVICES,
        &id,
        "qm.calibration.read",
    )
}

pub async fn patch_device_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(patch): Json<DevicePatch>,
) -> Response {
    let store = state.store.write().await;
    let mut device: CalibrationDevice =
        match load_for_update(&store, &actor, DEVICES, &id, "qm.calibration.write") {
            Ok(record) => record,
            Err(e) => return types::error_response(&e),
        };

    if let Some(name) = patch.name {
        device.name = name;
    }
    if let Some(category) = patch.category {
        device.category = category;
    }
    if let Some(location) = patch.location {
        device.location = Some(location);
    }
    if let Some(department) = patch.department {
        device.department = Some(department);
    }
    if let Some(person) = patch.responsible_person {
        device.responsible_person = Some(person);
    }
    if let Some(interval) = patch.calibration_interval_days {
        if interval <= 0 {
            return types::error_response(&QdmsError::InvalidInput(
                "calibration_interval_days must be positive".to_string(),
            ));
        }
        device.calibration_interval_days = interval;
        if let Some(last) = device.last_calibrated_at {
            device.next_due_date = qdms_core::next_due_date(last, interval);
        }
    }
    if let Some(notice) = patch.notice_days {
        device.notice_days = notice;
    }
    if let Some(notes) = patch.notes {
        device.notes = Some(notes);
    }
    let timestamp = now();
    if let Some(status) = patch.status {
        if let Err(e) = device.set_status(&status, &actor.id, patch.status_note, timestamp) {
            return types::error_response(&e);
        }
    } else {
        device.updated_at = timestamp;
    }

    match store.put_record(DEVICES, &device.id, &device) {
        Ok(()) => types::ok_json(device),
        Err(e) => types::error_response(&e),
    }
}

pub async fn delete_device_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    delete_one(&*state.store.write().await, &actor, DEVICES, &id, "qm.calibration.write")
}

pub async fn calibrate_device_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(payload): Json<CalibratePayload>,
) -> Response {
    let store = state.store.write().await;
    let mut device: CalibrationDevice =
        match load_for_update(&store, &actor, DEVICES, &id, "qm.calibration.write") {
            Ok(record) => record,
            Err(e) => return types::error_response(&e),
        };

    let timestamp = now();
    device.mark_calibrated(payload.calibrated_at.unwrap_or(timestamp), timestamp);
    match store.put_record(DEVICES, &device.id, &device) {
        Ok(()) => types::ok_json(device),
        Err(e) => types::error_response(&e),
    }
}

// =============================================================================
// CALIBRATION WORK ORDERS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct WorkOrderPayload {
    pub device_id: String,
    pub planned_date: Timestamp,
    pub due_date: Timestamp,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorkOrderPatch {
    pub planned_date: Option<Timestamp>,
    pub due_date: Option<Timestamp>,
    pub assigned_to: Option<String>,
    pub result: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub status_note: Option<String>,
    /// Calibration date recorded on completion; defaults to the request
    /// time when the status moves to `completed`.
    pub calibrated_at: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
pub struct MeasurementPayload {
    pub parameter: String,
    pub nominal_milli: i64,
    #[serde(default)]
    pub tolerance_milli: Option<i64>,
    pub observed_milli: i64,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn list_work_orders_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    list_collection::<CalibrationWorkOrder>(
        &*state.store.read().await,
        &actor,
        WORK_ORDERS,
        "qm.calibration.read",
    )
}

pub async fn create_work_order_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<WorkOrderPayload>,
) -> Response {
    let store = state.store.write().await;
    if let Err(e) = ensure_module_permission(&store, &actor, "qm.calibration.write") {
        return types::error_response(&e);
    }
    match store.get_record::<CalibrationDevice>(DEVICES, &payload.device_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return types::error_response(&QdmsError::NotFound(format!(
                "device {}",
                payload.device_id
            )));
        }
        Err(e) => return types::error_response(&e),
    }

    let timestamp = now();
    let work_order_no = match store.next_code(WORK_ORDERS, "WO", timestamp.year()) {
        Ok(code) => code,
        Err(e) => return types::error_response(&e),
    };
    let order = CalibrationWorkOrder {
        id: new_id(),
        work_order_no,
        device_id: payload.device_id,
        planned_date: payload.planned_date,
        due_date: payload.due_date,
        status: "planned".to_string(),
        assigned_to: payload.assigned_to,
        completed_at: None,
        result: None,
        notes: payload.notes,
        measurement_records: vec![],
        linked_capa_ids: vec![],
        status_history: vec![],
        created_by: actor.id.clone(),
        created_at: timestamp,
        updated_at: timestamp,
    };
    match store.put_record(WORK_ORDERS, &order.id, &order) {
        Ok(()) => types::created_json(order),
        Err(e) => types::error_response(&e),
    }
}

pub async fn get_work_order_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    get_one::<CalibrationWorkOrder>(
        &*state.store.read().await,
        &actor,
        WORK_ORDERS,
        &id,
        "qm.calibration.read",
    )
}

pub async fn patch_work_order_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(patch): Json<WorkOrderPatch>,
) -> Response {
    let store = state.store.write().await;
    let mut order: CalibrationWorkOrder =
        match load_for_update(&store, &actor, WORK_ORDERS, &id, "qm.calibration.write") {
            Ok(record) => record,
            Err(e) => return types::error_response(&e),
        };

    if let Some(planned) = patch.planned_date {
        order.planned_date = planned;
    }
    if let Some(due) = patch.due_date {
        order.due_date = due;
    }
    if let Some(assigned) = patch.assigned_to {
        order.assigned_to = Some(assigned);
    }
    if let Some(result) = patch.result {
        order.result = Some(result);
    }
    if let Some(notes) = patch.notes {
        order.notes = Some(notes);
    }

    let timestamp = now();
    let mut completed_now = false;
    if let Some(status) = patch.status {
        let was_completed = order.status == "completed";
        if let Err(e) = order.set_status(&status, &actor.id, patch.status_note, timestamp) {
            return types::error_response(&e);
        }
        completed_now = !was_completed && order.status == "completed";
    } else {
        order.updated_at = timestamp;
    }

    if let Err(e) = store.put_record(WORK_ORDERS, &order.id, &order) {
        return types::error_response(&e);
    }

    // Completing a work order stamps the device's calibration dates.
    if completed_now {
        let calibrated_at = patch.calibrated_at.unwrap_or(timestamp);
        match store.get_record::<CalibrationDevice>(DEVICES, &order.device_id) {
            Ok(Some(mut device)) => {
                device.mark_calibrated(calibrated_at, timestamp);
                if let Err(e) = store.put_record(DEVICES, &device.id, &device) {
                    return types::error_response(&e);
                }
            }
            Ok(None) => {
                tracing::warn!(
                    work_order = %order.id,
                    device = %order.device_id,
                    "completed work order references a missing device"
                );
            }
            Err(e) => return types::error_response(&e),
        }
    }
    types::ok_json(order)
}

pub async fn delete_work_order_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    delete_one(&*state.store.write().await, &actor, WORK_ORDERS, &id, "qm.calibration.write")
}

pub async fn add_measurement_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(payload): Json<MeasurementPayload>,
) -> Response {
    let store = state.store.write().await;
    let mut order: CalibrationWorkOrder =
        match load_for_update(&store, &actor, WORK_ORDERS, &id, "qm.calibration.write") {
            Ok(record) => record,
            Err(e) => return types::error_response(&e),
        };

    let timestamp = now();
    order.measurement_records.push(MeasurementRecord {
        id: new_id(),
        parameter: payload.parameter,
        nominal_milli: payload.nominal_milli,
        tolerance_milli: payload.tolerance_milli,
        observed_milli: payload.observed_milli,
        passed: measurement_passes(
            payload.nominal_milli,
            payload.observed_milli,
            payload.tolerance_milli,
        ),
        recorded_at: timestamp,
        recorded_by: Some(actor.id.clone()),
        note: payload.note,
    });
    order.updated_at = timestamp;

    match store.put_record(WORK_ORDERS, &order.id, &order) {
        Ok(()) => types::ok_json(order),
        Err(e) => types::error_response(&e),
    }
}
