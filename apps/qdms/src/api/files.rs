//! # Attachments, Notifications, Dashboard
//!
//! File payloads travel as base64 inside JSON; the blob and its metadata
//! are written to the store in one transaction. Notifications are listed
//! per user and marked read one at a time. The dashboard aggregates
//! collection counts, the document status report, and the caller's
//! unread notification count.

use super::{AppState, now, types};
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::Response,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use qdms_core::{FileMeta, QdmsError, ReportFilter, User, document_status_report, new_id};

// =============================================================================
// FILES
// =============================================================================

/// `POST /api/files`
pub async fn upload_file_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(request): Json<types::FileUploadRequest>,
) -> Response {
    if request.filename.trim().is_empty() {
        return types::error_response(&QdmsError::InvalidInput(
            "filename must not be empty".to_string(),
        ));
    }
    let bytes = match BASE64.decode(request.content.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            return types::error_response(&QdmsError::InvalidInput(format!(
                "content is not valid base64: {e}"
            )));
        }
    };

    let meta = FileMeta {
        id: new_id(),
        original_filename: request.filename.trim().to_string(),
        mime_type: request.mime_type,
        file_size: bytes.len() as u64,
        uploaded_by: actor.id.clone(),
        uploaded_at: now(),
        module_type: request.module_type,
        module_id: request.module_id,
    };
    match state.store.write().await.put_file(&meta, &bytes) {
        Ok(()) => types::created_json(meta),
        Err(e) => types::error_response(&e),
    }
}

/// `GET /api/files/{id}` — metadata plus base64 content.
pub async fn download_file_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.read().await.get_file(&id) {
        Ok(Some((meta, bytes))) => types::ok_json(types::FileDownloadResponse {
            meta,
            content: BASE64.encode(&bytes),
        }),
        Ok(None) => types::error_response(&QdmsError::NotFound(format!("file {id}"))),
        Err(e) => types::error_response(&e),
    }
}

/// `DELETE /api/files/{id}` — uploader or admin.
pub async fn delete_file_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    let store = state.store.write().await;
    match store.get_file_meta(&id) {
        Ok(Some(meta)) => {
            if meta.uploaded_by != actor.id && !actor.is_admin() {
                return types::error_response(&QdmsError::PermissionDenied(
                    "only the uploader or an administrator may delete a file".to_string(),
                ));
            }
        }
        Ok(None) => return types::error_response(&QdmsError::NotFound(format!("file {id}"))),
        Err(e) => return types::error_response(&e),
    }
    match store.delete_file(&id) {
        Ok(true) => types::ok_json(serde_json::json!({ "deleted": true })),
        Ok(false) => types::error_response(&QdmsError::NotFound(format!("file {id}"))),
        Err(e) => types::error_response(&e),
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// `GET /api/notifications` — the caller's notifications, newest first.
pub async fn list_notifications_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    match state.store.read().await.list_notifications_for_user(&actor.id) {
        Ok(notifications) => types::ok_json(notifications),
        Err(e) => types::error_response(&e),
    }
}

/// `POST /api/notifications/{id}/read`
pub async fn mark_notification_read_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Response {
    let store = state.store.write().await;
    let notifications = match store.list_notifications_for_user(&actor.id) {
        Ok(notifications) => notifications,
        Err(e) => return types::error_response(&e),
    };
    let Some(mut notification) = notifications.into_iter().find(|n| n.id == id) else {
        return types::error_response(&QdmsError::NotFound(format!("notification {id}")));
    };

    notification.is_read = true;
    match store.put_notification(&notification) {
        Ok(()) => types::ok_json(notification),
        Err(e) => types::error_response(&e),
    }
}

// =============================================================================
// DASHBOARD
// =============================================================================

/// `GET /api/dashboard/stats`
pub async fn dashboard_stats_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    let store = state.store.read().await;
    let collections = match store.collection_counts() {
        Ok(counts) => counts,
        Err(e) => return types::error_response(&e),
    };
    let documents = match store.list_documents() {
        Ok(docs) => docs,
        Err(e) => return types::error_response(&e),
    };
    let unread_notifications = match store.list_notifications_for_user(&actor.id) {
        Ok(notifications) => notifications.iter().filter(|n| !n.is_read).count() as u64,
        Err(e) => return types::error_response(&e),
    };
    drop(store);

    types::ok_json(types::DashboardStats {
        collections,
        documents: document_status_report(&documents, &ReportFilter::default()),
        unread_notifications,
    })
}
