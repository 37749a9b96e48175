//! # Authentication Module
//!
//! Session-token authentication for the QDMS HTTP API.
//!
//! Login verifies the bcrypt password hash and issues an opaque session
//! token (UUID v4) held in the in-process session table. Subsequent
//! requests send it as `Authorization: Bearer <token>`; the middleware
//! resolves it to a user with a constant-time comparison and injects the
//! user into request extensions.
//!
//! Password hashes never live on the `User` record. They are stored as a
//! separate `credentials` record so user payloads can be returned as-is.

use super::{AppState, now, types};
use axum::{
    Extension, Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use qdms_core::{QdmsError, Role, Store, User, effective_permissions, new_id};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Record collection holding password hashes, keyed by user id.
const CREDENTIALS: &str = "credentials";

/// A stored credential. Lives in the generic records table, never on the
/// user payload itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Credential {
    user_id: String,
    password_hash: String,
}

pub(super) fn hash_password(password: &str) -> Result<String, QdmsError> {
    if password.trim().is_empty() {
        return Err(QdmsError::InvalidInput("password must not be empty".to_string()));
    }
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| QdmsError::IoError(e.to_string()))
}

pub(super) fn store_credential(
    store: &Store,
    user_id: &str,
    password: &str,
) -> Result<(), QdmsError> {
    let credential = Credential {
        user_id: user_id.to_string(),
        password_hash: hash_password(password)?,
    };
    store.put_record(CREDENTIALS, user_id, &credential)
}

/// Create the admin user with a wildcard grant, plus its credential.
/// Used by `qdms init`; a no-op if the username is taken.
pub fn seed_admin(store: &Store, username: &str, password: &str) -> Result<User, QdmsError> {
    if store.find_user_by_username(username)?.is_some() {
        return Err(QdmsError::Conflict(format!(
            "user '{username}' already exists"
        )));
    }
    let user = User {
        id: new_id(),
        username: username.to_string(),
        email: format!("{username}@local"),
        full_name: "System Administrator".to_string(),
        role: "admin".to_string(),
        roles: vec![],
        department: String::new(),
        groups: vec![],
        permissions: vec!["*".to_string()],
        is_active: true,
        created_at: now(),
    };
    store.put_user(&user)?;
    store_credential(store, &user.id, password)?;
    Ok(user)
}

// =============================================================================
// LOGIN
// =============================================================================

/// `POST /api/auth/login`
pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<types::LoginRequest>,
) -> Response {
    let store = state.store.read().await;
    let user = match store.find_user_by_username(&request.username) {
        Ok(Some(user)) if user.is_active => user,
        Ok(_) => {
            tracing::warn!(event = "auth_failure", username = %request.username, "login rejected");
            return unauthorized();
        }
        Err(e) => return types::error_response(&e),
    };

    let credential: Option<Credential> = match store.get_record(CREDENTIALS, &user.id) {
        Ok(c) => c,
        Err(e) => return types::error_response(&e),
    };
    drop(store);

    let verified = credential
        .map(|c| bcrypt::verify(&request.password, &c.password_hash).unwrap_or(false))
        .unwrap_or(false);
    if !verified {
        tracing::warn!(event = "auth_failure", username = %request.username, "login rejected");
        return unauthorized();
    }

    let token = new_id();
    state
        .sessions
        .write()
        .await
        .insert(token.clone(), user.id.clone());
    tracing::info!(event = "login", user_id = %user.id, "session issued");

    types::ok_json(types::LoginResponse { token, user })
}

/// `POST /api/auth/register` — admin only.
pub async fn register_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Json(request): Json<types::RegisterRequest>,
) -> Response {
    if !actor.is_admin() {
        return types::error_response(&QdmsError::PermissionDenied(
            "only administrators may register users".to_string(),
        ));
    }
    if request.username.trim().is_empty() {
        return types::error_response(&QdmsError::InvalidInput(
            "username must not be empty".to_string(),
        ));
    }

    let store = state.store.write().await;
    match store.find_user_by_username(&request.username) {
        Ok(Some(_)) => {
            return types::error_response(&QdmsError::Conflict(format!(
                "user '{}' already exists",
                request.username
            )));
        }
        Ok(None) => {}
        Err(e) => return types::error_response(&e),
    }

    let user = User {
        id: new_id(),
        username: request.username.trim().to_string(),
        email: request.email,
        full_name: request.full_name,
        role: request.role.unwrap_or_else(|| "user".to_string()),
        roles: request.roles,
        department: request.department.unwrap_or_default(),
        groups: request.groups,
        permissions: request.permissions,
        is_active: true,
        created_at: now(),
    };
    if let Err(e) = store
        .put_user(&user)
        .and_then(|()| store_credential(&store, &user.id, &request.password))
    {
        return types::error_response(&e);
    }
    types::created_json(user)
}

/// `GET /api/auth/me`
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
) -> Response {
    let roles: Vec<Role> = match state.store.read().await.list_roles() {
        Ok(roles) => roles,
        Err(e) => return types::error_response(&e),
    };
    let effective = effective_permissions(&actor, &roles);
    types::ok_json(types::MeResponse {
        user: actor,
        effective_permissions: effective,
    })
}

// =============================================================================
// SESSION MIDDLEWARE
// =============================================================================

/// Paths reachable without a session.
fn is_open_path(path: &str) -> bool {
    matches!(path, "/health" | "/api/health" | "/api/auth/login")
}

/// Resolve the bearer token to a user id with a constant-time comparison.
/// Tokens are padded to equal length so `ct_eq` always runs over the same
/// number of bytes.
async fn resolve_token(state: &AppState, provided: &str) -> Option<String> {
    let provided_bytes = provided.as_bytes();
    let sessions = state.sessions.read().await;
    let mut resolved = None;
    for (token, user_id) in sessions.iter() {
        let token_bytes = token.as_bytes();
        let max_len = provided_bytes.len().max(token_bytes.len());
        let mut padded_provided = vec![0u8; max_len];
        let mut padded_token = vec![0u8; max_len];
        padded_provided[..provided_bytes.len()].copy_from_slice(provided_bytes);
        padded_token[..token_bytes.len()].copy_from_slice(token_bytes);

        let bytes_match: bool = padded_provided.ct_eq(&padded_token).into();
        if bytes_match && provided_bytes.len() == token_bytes.len() {
            resolved = Some(user_id.clone());
        }
    }
    resolved
}

/// Session authentication middleware. Resolves the token, loads the
/// user, and injects it into request extensions for the handlers.
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if is_open_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let Some(header_value) = auth_header else {
        tracing::warn!(
            event = "auth_failure",
            reason = "missing_authorization_header",
            "Missing Authorization header"
        );
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
    };
    let provided = header_value.strip_prefix("Bearer ").unwrap_or(header_value);

    let Some(user_id) = resolve_token(&state, provided).await else {
        tracing::warn!(
            event = "auth_failure",
            reason = "invalid_session_token",
            "Authentication failed: invalid session token"
        );
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
    };

    let user = {
        let store = state.store.read().await;
        store.get_user(&user_id).ok().flatten()
    };
    let Some(user) = user.filter(|u| u.is_active) else {
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized"));
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(types::ErrorResponse {
            error: "invalid username or password".to_string(),
        }),
    )
        .into_response()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_paths() {
        assert!(is_open_path("/health"));
        assert!(is_open_path("/api/auth/login"));
        assert!(!is_open_path("/api/documents"));
        assert!(!is_open_path("/api/auth/register"));
    }

    #[test]
    fn empty_password_rejected() {
        assert!(hash_password("  ").is_err());
        assert!(hash_password("secret").is_ok());
    }
}
