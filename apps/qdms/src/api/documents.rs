//! # Folder & Document Handlers
//!
//! Folder CRUD with capability grants, document CRUD with auto codes,
//! the approval decision endpoint, read receipts, and the status report.
//!
//! Every mutation is a read-modify-write under the store's write lock,
//! so two concurrent decisions on the same document serialize instead of
//! overwriting each other.

use super::{AppState, now, types};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::Response,
};
use qdms_core::{
    Capability, DEFAULT_CODE_PATTERN, DecisionOutcome, Document, DocumentStatus, Folder,
    Notification, NotificationKind, QdmsError, ReceiptStatus, ReportFilter, Store, User,
    apply_decision, create_version, document_status_report, ensure_capability,
    find_pending_stage, initial_read_receipts, new_id, normalize_stages, override_status,
    resolve_matching_token, resolve_recipients, sanitize_permissions,
};

// =============================================================================
// FOLDERS
// =============================================================================

/// `GET /api/folders` — folders the caller can at least read.
pub async fn list_folders_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    let folders = match state.store.read().await.list_folders() {
        Ok(folders) => folders,
        Err(e) => return types::error_response(&e),
    };
    let visible: Vec<Folder> = folders
        .into_iter()
        .filter(|f| qdms_core::user_has_capability(&actor, f, Capability::Read))
        .collect();
    types::ok_json(visible)
}

/// `POST /api/folders` — admin or `doc.folder.manage_permissions`.
pub async fn create_folder_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<types::FolderPayload>,
) -> Response {
    if !actor.is_admin() && !actor.has_permission("doc.folder.manage_permissions") {
        return types::error_response(&QdmsError::PermissionDenied(
            "folder creation requires doc.folder.manage_permissions".to_string(),
        ));
    }
    if payload.name.trim().is_empty() {
        return types::error_response(&QdmsError::InvalidInput(
            "folder name must not be empty".to_string(),
        ));
    }

    let timestamp = now();
    let folder = Folder {
        id: new_id(),
        name: payload.name.trim().to_string(),
        code_prefix: Some(payload.code_prefix),
        department: payload.department,
        description: payload.description,
        parent_id: payload.parent_id,
        auto_code_pattern: payload
            .auto_code_pattern
            .unwrap_or_else(|| DEFAULT_CODE_PATTERN.to_string()),
        auto_code_seq: 0,
        permissions: vec![],
        created_at: timestamp,
        updated_at: timestamp,
    };
    match state.store.write().await.put_folder(&folder) {
        Ok(()) => types::created_json(folder),
        Err(e) => types::error_response(&e),
    }
}

/// `GET /api/folders/{id}`
pub async fn get_folder_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    let folder = match load_folder(&*state.store.read().await, &id) {
        Ok(folder) => folder,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = ensure_capability(&actor, &folder, Capability::Read) {
        return types::error_response(&e);
    }
    types::ok_json(folder)
}

/// `PATCH /api/folders/{id}`
pub async fn patch_folder_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(patch): Json<types::FolderPatch>,
) -> Response {
    let store = state.store.write().await;
    let mut folder = match load_folder(&store, &id) {
        Ok(folder) => folder,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = ensure_capability(&actor, &folder, Capability::Manage) {
        return types::error_response(&e);
    }

    if let Some(name) = patch.name {
        folder.name = name;
    }
    if let Some(code_prefix) = patch.code_prefix {
        folder.code_prefix = Some(code_prefix);
    }
    if let Some(department) = patch.department {
        folder.department = Some(department);
    }
    if let Some(description) = patch.description {
        folder.description = Some(description);
    }
    if let Some(parent_id) = patch.parent_id {
        folder.parent_id = Some(parent_id);
    }
    if let Some(pattern) = patch.auto_code_pattern {
        folder.auto_code_pattern = pattern;
    }
    folder.updated_at = now();

    match store.put_folder(&folder) {
        Ok(()) => types::ok_json(folder),
        Err(e) => types::error_response(&e),
    }
}

/// `DELETE /api/folders/{id}` — refused while documents or child
/// folders still reference it.
pub async fn delete_folder_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    let store = state.store.write().await;
    let folder = match load_folder(&store, &id) {
        Ok(folder) => folder,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = ensure_capability(&actor, &folder, Capability::Manage) {
        return types::error_response(&e);
    }

    let has_documents = match store.list_documents() {
        Ok(docs) => docs.iter().any(|d| d.folder_id == id),
        Err(e) => return types::error_response(&e),
    };
    let has_children = match store.list_folders() {
        Ok(folders) => folders.iter().any(|f| f.parent_id.as_deref() == Some(id.as_str())),
        Err(e) => return types::error_response(&e),
    };
    if has_documents || has_children {
        return types::error_response(&QdmsError::Conflict(
            "folder still contains documents or child folders".to_string(),
        ));
    }

    match store.delete_folder(&id) {
        Ok(true) => types::ok_json(serde_json::json!({ "deleted": true })),
        Ok(false) => types::error_response(&QdmsError::NotFound(format!("folder {id}"))),
        Err(e) => types::error_response(&e),
    }
}

/// `PATCH /api/folders/{id}/permissions` — replace the grant list.
pub async fn set_folder_permissions_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(payload): Json<types::FolderPermissionsPayload>,
) -> Response {
    let store = state.store.write().await;
    let mut folder = match load_folder(&store, &id) {
        Ok(folder) => folder,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = ensure_capability(&actor, &folder, Capability::Manage) {
        return types::error_response(&e);
    }

    folder.permissions = sanitize_permissions(payload.permissions);
    folder.updated_at = now();
    match store.put_folder(&folder) {
        Ok(()) => types::ok_json(folder),
        Err(e) => types::error_response(&e),
    }
}

// =============================================================================
// DOCUMENTS
// =============================================================================

#[derive(Debug, serde::Deserialize)]
pub struct DocumentListQuery {
    #[serde(default)]
    pub folder_id: Option<String>,
}

/// `GET /api/documents` — optionally folder-scoped; results are limited
/// to folders the caller can read.
pub async fn list_documents_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Query(query): Query<DocumentListQuery>,
) -> Response {
    let store = state.store.read().await;
    let folders = match store.list_folders() {
        Ok(folders) => folders,
        Err(e) => return types::error_response(&e),
    };
    let documents = match store.list_documents() {
        Ok(docs) => docs,
        Err(e) => return types::error_response(&e),
    };
    drop(store);

    let readable = |folder_id: &str| {
        folders
            .iter()
            .find(|f| f.id == folder_id)
            .is_some_and(|f| qdms_core::user_has_capability(&actor, f, Capability::Read))
    };
    let visible: Vec<Document> = documents
        .into_iter()
        .filter(|d| query.folder_id.as_deref().is_none_or(|f| d.folder_id == f))
        .filter(|d| readable(&d.folder_id))
        .collect();
    types::ok_json(visible)
}

/// `POST /api/documents` — creates the document with a folder-generated
/// code and an initial version record.
pub async fn create_document_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(request): Json<types::DocumentCreateRequest>,
) -> Response {
    if request.title.trim().is_empty() || request.document_type.trim().is_empty() {
        return types::error_response(&QdmsError::InvalidInput(
            "title and document_type are required".to_string(),
        ));
    }

    let store = state.store.write().await;
    let folder = match load_folder(&store, &request.folder_id) {
        Ok(folder) => folder,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = ensure_capability(&actor, &folder, Capability::Create) {
        return types::error_response(&e);
    }

    let timestamp = now();
    let mut document = Document {
        id: new_id(),
        folder_id: folder.id.clone(),
        code: String::new(),
        title: request.title.trim().to_string(),
        description: request.description,
        document_type: request.document_type.trim().to_string(),
        department: request.department.or_else(|| folder.department.clone()),
        status: DocumentStatus::Draft,
        author_id: actor.id.clone(),
        version: "1.0".to_string(),
        tags: request.tags,
        distribution_list: request.distribution_list,
        approval_matrix: normalize_stages(request.approval_matrix),
        read_receipts: vec![],
        status_history: vec![],
        version_history: vec![],
        current_version_id: None,
        review_date: request.review_date,
        expiry_date: request.expiry_date,
        published_at: None,
        archived_at: None,
        created_at: timestamp,
        updated_at: timestamp,
    };
    document.read_receipts = initial_read_receipts(&document.distribution_list);
    create_version(
        &mut document,
        &actor,
        Some("initial version".to_string()),
        None,
        None,
        false,
        timestamp,
    );

    let (document, _) = match store.insert_document_with_code(&folder, document) {
        Ok(pair) => pair,
        Err(e) => return types::error_response(&e),
    };

    if document.status == DocumentStatus::Review {
        if let Err(e) = notify_pending_stage(&store, &document, &actor) {
            tracing::warn!("notification fan-out failed: {}", e);
        }
    }
    types::created_json(document)
}

/// `GET /api/documents/{id}`
pub async fn get_document_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    let store = state.store.read().await;
    let (document, folder) = match load_document(&store, &id) {
        Ok(pair) => pair,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = ensure_capability(&actor, &folder, Capability::Read) {
        return types::error_response(&e);
    }
    types::ok_json(document)
}

/// `PATCH /api/documents/{id}` — author or `revise` capability; the
/// approval matrix is only editable while the document is a draft.
pub async fn patch_document_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(patch): Json<types::DocumentPatch>,
) -> Response {
    let store = state.store.write().await;
    let (mut document, folder) = match load_document(&store, &id) {
        Ok(pair) => pair,
        Err(e) => return types::error_response(&e),
    };
    if document.author_id != actor.id {
        if let Err(e) = ensure_capability(&actor, &folder, Capability::Revise) {
            return types::error_response(&e);
        }
    }
    if patch.approval_matrix.is_some() && document.status != DocumentStatus::Draft {
        return types::error_response(&QdmsError::InvalidInput(
            "the approval matrix can only change while the document is a draft".to_string(),
        ));
    }

    if let Some(title) = patch.title {
        document.title = title;
    }
    if let Some(description) = patch.description {
        document.description = Some(description);
    }
    if let Some(department) = patch.department {
        document.department = Some(department);
    }
    if let Some(tags) = patch.tags {
        document.tags = tags;
    }
    if let Some(distribution) = patch.distribution_list {
        document.distribution_list = distribution;
        document.read_receipts = initial_read_receipts(&document.distribution_list);
    }
    if let Some(matrix) = patch.approval_matrix {
        document.approval_matrix = normalize_stages(matrix);
    }
    if let Some(review_date) = patch.review_date {
        document.review_date = Some(review_date);
    }
    if let Some(expiry_date) = patch.expiry_date {
        document.expiry_date = Some(expiry_date);
    }
    document.updated_at = now();

    match store.put_document(&document) {
        Ok(()) => types::ok_json(document),
        Err(e) => types::error_response(&e),
    }
}

/// `PATCH /api/documents/{id}/status` — manual archive/retire/restore.
pub async fn override_status_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(request): Json<types::StatusOverrideRequest>,
) -> Response {
    let store = state.store.write().await;
    let (mut document, folder) = match load_document(&store, &id) {
        Ok(pair) => pair,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = ensure_capability(&actor, &folder, Capability::Cancel) {
        return types::error_response(&e);
    }

    if let Err(e) = override_status(&mut document, request.status, &actor, request.comment, now()) {
        return types::error_response(&e);
    }
    match store.put_document(&document) {
        Ok(()) => types::ok_json(document),
        Err(e) => types::error_response(&e),
    }
}

/// `POST /api/documents/{id}/versions` — new revision; re-enters the
/// approval flow when a matrix is present.
pub async fn create_version_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(request): Json<types::VersionRequest>,
) -> Response {
    let store = state.store.write().await;
    let (mut document, folder) = match load_document(&store, &id) {
        Ok(pair) => pair,
        Err(e) => return types::error_response(&e),
    };
    if document.author_id != actor.id {
        if let Err(e) = ensure_capability(&actor, &folder, Capability::Revise) {
            return types::error_response(&e);
        }
    }

    // Stamp the referenced upload as belonging to this document before
    // the version records it.
    if let Some(file_id) = &request.file_id {
        let mut meta = match store.get_file_meta(file_id) {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                return types::error_response(&QdmsError::NotFound(format!("file {file_id}")));
            }
            Err(e) => return types::error_response(&e),
        };
        meta.module_type = Some("document".to_string());
        meta.module_id = Some(document.id.clone());
        if let Err(e) = store.put_file_meta(&meta) {
            return types::error_response(&e);
        }
    }

    create_version(
        &mut document,
        &actor,
        request.changes,
        request.notes,
        request.file_id,
        request.mark_as_published,
        now(),
    );
    if let Err(e) = store.put_document(&document) {
        return types::error_response(&e);
    }
    if document.status == DocumentStatus::Review {
        if let Err(e) = notify_pending_stage(&store, &document, &actor) {
            tracing::warn!("notification fan-out failed: {}", e);
        }
    }
    types::ok_json(document)
}

/// `GET /api/documents/{id}/read-receipts`
pub async fn read_receipts_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    let store = state.store.read().await;
    let (document, folder) = match load_document(&store, &id) {
        Ok(pair) => pair,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = ensure_capability(&actor, &folder, Capability::Read) {
        return types::error_response(&e);
    }
    types::ok_json(document.read_receipts)
}

/// `POST /api/documents/{id}/acknowledge` — idempotent read receipt.
pub async fn acknowledge_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(request): Json<types::AcknowledgeRequest>,
) -> Response {
    let store = state.store.write().await;
    let (mut document, folder) = match load_document(&store, &id) {
        Ok(pair) => pair,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = ensure_capability(&actor, &folder, Capability::Read) {
        return types::error_response(&e);
    }

    // Admins may acknowledge on behalf of another user; everyone else
    // always acknowledges as themselves.
    let target_id = match request.user_id {
        Some(user_id) if actor.is_admin() => user_id,
        _ => actor.id.clone(),
    };
    qdms_core::acknowledge_read(&mut document, &target_id, request.note, now());
    if let Err(e) = store.put_document(&document) {
        return types::error_response(&e);
    }
    if let Err(e) = mark_document_notifications_read(&store, &target_id, &document.code) {
        tracing::warn!("marking notifications read failed: {}", e);
    }
    types::ok_json(document.read_receipts)
}

/// `GET /api/documents/approvals/pending` — documents whose current
/// pending stage the caller can decide.
pub async fn pending_approvals_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    let documents = match state.store.read().await.list_documents() {
        Ok(docs) => docs,
        Err(e) => return types::error_response(&e),
    };
    let pending: Vec<Document> = documents
        .into_iter()
        .filter(|d| d.status == DocumentStatus::Review)
        .filter(|d| {
            find_pending_stage(&d.approval_matrix)
                .map(|idx| &d.approval_matrix[idx])
                .is_some_and(|stage| resolve_matching_token(&actor, stage).is_some())
        })
        .collect();
    types::ok_json(pending)
}

/// `POST /api/documents/{id}/approvals/decision`
pub async fn decision_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(request): Json<types::DecisionRequest>,
) -> Response {
    let store = state.store.write().await;
    let (mut document, folder) = match load_document(&store, &id) {
        Ok(pair) => pair,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = ensure_capability(&actor, &folder, Capability::Read) {
        return types::error_response(&e);
    }

    let outcome = match apply_decision(
        &mut document,
        &actor,
        request.decision,
        request.comment,
        now(),
    ) {
        Ok(outcome) => outcome,
        Err(e) => return types::error_response(&e),
    };
    if let Err(e) = store.put_document(&document) {
        return types::error_response(&e);
    }

    if let Err(e) = notify_decision(&store, &document, &actor, &outcome) {
        tracing::warn!("notification fan-out failed: {}", e);
    }
    if let Err(e) = mark_document_notifications_read(&store, &actor.id, &document.code) {
        tracing::warn!("marking notifications read failed: {}", e);
    }

    let outcome_name = match outcome {
        DecisionOutcome::StageIncomplete => "stage_incomplete",
        DecisionOutcome::StageApproved => "stage_approved",
        DecisionOutcome::DocumentApproved => "document_approved",
        DecisionOutcome::DocumentRejected => "document_rejected",
    };
    types::ok_json(types::DecisionResponse {
        outcome: outcome_name.to_string(),
        document,
    })
}

/// `GET /api/documents/read-tasks` — documents with a receipt for the
/// caller that is not yet read, required or not.
pub async fn read_tasks_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    let documents = match state.store.read().await.list_documents() {
        Ok(docs) => docs,
        Err(e) => return types::error_response(&e),
    };
    let tasks: Vec<Document> = documents
        .into_iter()
        .filter(|d| {
            d.read_receipts
                .iter()
                .any(|r| r.user_id == actor.id && r.status != ReceiptStatus::Read)
        })
        .collect();
    types::ok_json(tasks)
}

/// `GET /api/documents/report/status`
pub async fn status_report_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Query(filter): Query<ReportFilter>,
) -> Response {
    let store = state.store.read().await;
    let folders = match store.list_folders() {
        Ok(folders) => folders,
        Err(e) => return types::error_response(&e),
    };
    let documents = match store.list_documents() {
        Ok(docs) => docs,
        Err(e) => return types::error_response(&e),
    };
    drop(store);

    let readable: Vec<Document> = documents
        .into_iter()
        .filter(|d| {
            folders
                .iter()
                .find(|f| f.id == d.folder_id)
                .is_some_and(|f| qdms_core::user_has_capability(&actor, f, Capability::Read))
        })
        .collect();
    types::ok_json(document_status_report(&readable, &filter))
}

// =============================================================================
// SHARED HELPERS
// =============================================================================

pub(super) fn load_folder(store: &Store, id: &str) -> Result<Folder, QdmsError> {
    store
        .get_folder(id)?
        .ok_or_else(|| QdmsError::NotFound(format!("folder {id}")))
}

pub(super) fn load_document(store: &Store, id: &str) -> Result<(Document, Folder), QdmsError> {
    let document = store
        .get_document(id)?
        .ok_or_else(|| QdmsError::NotFound(format!("document {id}")))?;
    let folder = load_folder(store, &document.folder_id)?;
    Ok((document, folder))
}

/// Notify the resolved approvers of the current pending stage.
fn notify_pending_stage(store: &Store, document: &Document, actor: &User) -> Result<(), QdmsError> {
    let Some(stage) = find_pending_stage(&document.approval_matrix)
        .map(|idx| &document.approval_matrix[idx])
    else {
        return Ok(());
    };
    let users = store.list_users()?;
    let recipients = resolve_recipients(&stage.approvers, &users, Some(actor.id.as_str()));
    let batch = qdms_core::fan_out(
        &recipients,
        "Approval required",
        &format!(
            "Document {} \"{}\" awaits your approval (stage {})",
            document.code, document.title, stage.stage
        ),
        NotificationKind::Info,
        now(),
    );
    store.put_notifications(&batch)
}

/// Fan out notifications for a decision outcome.
fn notify_decision(
    store: &Store,
    document: &Document,
    actor: &User,
    outcome: &DecisionOutcome,
) -> Result<(), QdmsError> {
    match outcome {
        DecisionOutcome::StageIncomplete => Ok(()),
        DecisionOutcome::StageApproved => notify_pending_stage(store, document, actor),
        DecisionOutcome::DocumentRejected => {
            let notification = Notification::new(
                &document.author_id,
                "Document rejected",
                &format!("Document {} \"{}\" was rejected", document.code, document.title),
                NotificationKind::Error,
                now(),
            );
            store.put_notification(&notification)
        }
        DecisionOutcome::DocumentApproved => {
            let mut recipients: Vec<String> = document
                .read_receipts
                .iter()
                .filter(|r| r.status == ReceiptStatus::Pending)
                .map(|r| r.user_id.clone())
                .collect();
            recipients.push(document.author_id.clone());
            recipients.sort_unstable();
            recipients.dedup();

            let batch: Vec<Notification> = recipients
                .iter()
                .map(|user_id| {
                    Notification::new(
                        user_id,
                        "Document published",
                        &format!(
                            "Document {} \"{}\" v{} is approved and published",
                            document.code, document.title, document.version
                        ),
                        NotificationKind::Success,
                        now(),
                    )
                })
                .collect();
            store.put_notifications(&batch)
        }
    }
}

/// Mark the actor's unread notifications about a document as read.
fn mark_document_notifications_read(
    store: &Store,
    user_id: &str,
    document_code: &str,
) -> Result<(), QdmsError> {
    let notifications = store.list_notifications_for_user(user_id)?;
    for mut notification in notifications {
        if !notification.is_read && notification.message.contains(document_code) {
            notification.is_read = true;
            store.put_notification(&notification)?;
        }
    }
    Ok(())
}
