//! # User & Role Handlers
//!
//! User administration and role CRUD. Role grants combine with per-user
//! permissions into the effective permission set (`qdms_core::rbac`).

use super::{AppState, auth, now, types};
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::Response,
};
use qdms_core::{QdmsError, Role, User, is_admin_role};

// =============================================================================
// USERS
// =============================================================================

/// `GET /api/users`
pub async fn list_users_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    if !actor.is_admin() && !actor.has_permission("doc.user.read") {
        return types::error_response(&QdmsError::PermissionDenied(
            "user listing requires doc.user.read".to_string(),
        ));
    }
    match state.store.read().await.list_users() {
        Ok(users) => types::ok_json(users),
        Err(e) => types::error_response(&e),
    }
}

/// `PATCH /api/users/{id}`
///
/// Admins may change anything. A user may update their own email, full
/// name, and password; the RBAC fields stay admin-only.
pub async fn patch_user_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
    Json(patch): Json<types::UserPatch>,
) -> Response {
    let self_update = actor.id == id;
    if !actor.is_admin() && !self_update {
        return types::error_response(&QdmsError::PermissionDenied(
            "cannot modify another user".to_string(),
        ));
    }
    // Department is an RBAC field too: it feeds department approver-token
    // matching, so self-service would let a user move into an approving
    // department.
    let rbac_fields_touched = patch.role.is_some()
        || patch.roles.is_some()
        || patch.department.is_some()
        || patch.groups.is_some()
        || patch.permissions.is_some()
        || patch.is_active.is_some();
    if rbac_fields_touched && !actor.is_admin() {
        return types::error_response(&QdmsError::PermissionDenied(
            "RBAC fields are admin-only".to_string(),
        ));
    }

    let store = state.store.write().await;
    let mut user = match store.get_user(&id) {
        Ok(Some(user)) => user,
        Ok(None) => return types::error_response(&QdmsError::NotFound(format!("user {id}"))),
        Err(e) => return types::error_response(&e),
    };

    if let Some(email) = patch.email {
        user.email = email;
    }
    if let Some(full_name) = patch.full_name {
        user.full_name = full_name;
    }
    if let Some(role) = patch.role {
        user.role = role;
    }
    if let Some(roles) = patch.roles {
        user.roles = roles;
    }
    if let Some(department) = patch.department {
        user.department = department;
    }
    if let Some(groups) = patch.groups {
        user.groups = groups;
    }
    if let Some(permissions) = patch.permissions {
        user.permissions = permissions;
    }
    if let Some(is_active) = patch.is_active {
        user.is_active = is_active;
    }

    if let Err(e) = store.put_user(&user) {
        return types::error_response(&e);
    }
    if let Some(password) = patch.password {
        if let Err(e) = auth::store_credential(&store, &user.id, &password) {
            return types::error_response(&e);
        }
    }
    types::ok_json(user)
}

// =============================================================================
// ROLES
// =============================================================================

/// `GET /api/roles`
pub async fn list_roles_handler(State(state): State<AppState>) -> Response {
    match state.store.read().await.list_roles() {
        Ok(roles) => types::ok_json(roles),
        Err(e) => types::error_response(&e),
    }
}

/// `POST /api/roles` — admin only.
pub async fn create_role_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(payload): Json<types::RolePayload>,
) -> Response {
    if let Err(e) = require_admin(&actor) {
        return types::error_response(&e);
    }
    if payload.name.trim().is_empty() {
        return types::error_response(&QdmsError::InvalidInput(
            "role name must not be empty".to_string(),
        ));
    }

    let store = state.store.write().await;
    match store.get_role(&payload.name) {
        Ok(Some(_)) => {
            return types::error_response(&QdmsError::Conflict(format!(
                "role '{}' already exists",
                payload.name
            )));
        }
        Ok(None) => {}
        Err(e) => return types::error_response(&e),
    }

    let timestamp = now();
    let role = Role {
        name: payload.name.trim().to_string(),
        description: payload.description,
        permissions: payload.permissions,
        created_at: timestamp,
        updated_at: timestamp,
    };
    match store.put_role(&role) {
        Ok(()) => types::created_json(role),
        Err(e) => types::error_response(&e),
    }
}

/// `GET /api/roles/{name}`
pub async fn get_role_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.store.read().await.get_role(&name) {
        Ok(Some(role)) => types::ok_json(role),
        Ok(None) => types::error_response(&QdmsError::NotFound(format!("role {name}"))),
        Err(e) => types::error_response(&e),
    }
}

/// `PUT /api/roles/{name}` — admin only.
pub async fn update_role_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(name): Path<String>,
    Json(payload): Json<types::RolePayload>,
) -> Response {
    if let Err(e) = require_admin(&actor) {
        return types::error_response(&e);
    }

    let store = state.store.write().await;
    let mut role = match store.get_role(&name) {
        Ok(Some(role)) => role,
        Ok(None) => return types::error_response(&QdmsError::NotFound(format!("role {name}"))),
        Err(e) => return types::error_response(&e),
    };
    role.description = payload.description;
    role.permissions = payload.permissions;
    role.updated_at = now();
    match store.put_role(&role) {
        Ok(()) => types::ok_json(role),
        Err(e) => types::error_response(&e),
    }
}

/// `DELETE /api/roles/{name}` — admin only. Admin role keys and roles
/// still assigned to users cannot be deleted.
pub async fn delete_role_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(name): Path<String>,
) -> Response {
    if let Err(e) = require_admin(&actor) {
        return types::error_response(&e);
    }
    if is_admin_role(&name) {
        return types::error_response(&QdmsError::InvalidInput(
            "the administrator role cannot be deleted".to_string(),
        ));
    }

    let store = state.store.write().await;
    // Role names keep their stored casing, so compare normalized.
    let target = qdms_core::normalize(&name);
    let in_use = match store.list_users() {
        Ok(users) => users.iter().any(|u| {
            u.role_names()
                .iter()
                .any(|r| qdms_core::normalize(r) == target)
        }),
        Err(e) => return types::error_response(&e),
    };
    if in_use {
        return types::error_response(&QdmsError::Conflict(format!(
            "role '{name}' is still assigned to users"
        )));
    }

    match store.delete_role(&name) {
        Ok(true) => types::ok_json(serde_json::json!({ "deleted": true })),
        Ok(false) => types::error_response(&QdmsError::NotFound(format!("role {name}"))),
        Err(e) => types::error_response(&e),
    }
}

pub(super) fn require_admin(actor: &User) -> Result<(), QdmsError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(QdmsError::PermissionDenied(
            "administrator privileges required".to_string(),
        ))
    }
}
