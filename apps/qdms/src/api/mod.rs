//! # QDMS HTTP API Module
//!
//! The axum REST API. All endpoints live under `/api` and require a
//! session token except `POST /api/auth/login` and `GET /health`.
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `QDMS_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `QDMS_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)

mod auth;
mod documents;
mod files;
mod middleware;
mod rbac;
mod records;
mod types;

// Re-exports for external use and integration tests (via `qdms::api::*`)
pub use auth::seed_admin;
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
#[allow(unused_imports)]
pub use types::{
    AcknowledgeRequest, DashboardStats, DecisionRequest, DecisionResponse, DocumentCreateRequest,
    DocumentPatch, ErrorResponse, FileDownloadResponse, FileUploadRequest, FolderPatch,
    FolderPayload, FolderPermissionsPayload, HealthResponse, LoginRequest, LoginResponse,
    MeResponse, RegisterRequest, RolePayload, StatusOverrideRequest, UserPatch, VersionRequest,
};

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use chrono::Utc;
use qdms_core::{QdmsError, Store, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the record store and the session token table.
#[derive(Clone)]
pub struct AppState {
    /// The embedded store. Handlers doing read-modify-write take the
    /// write lock for the whole update so decisions cannot interleave.
    pub store: Arc<RwLock<Store>>,
    /// Opaque session token -> user id.
    pub sessions: Arc<RwLock<HashMap<String, String>>>,
}

impl AppState {
    /// Create new app state around an open store.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

/// Wall-clock timestamp for the current request. The core is clock-free;
/// every mutation gets its `now` from here.
pub(crate) fn now() -> Timestamp {
    Utc::now()
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `QDMS_CORS_ORIGINS`:
/// - If "*": allows all origins (development mode)
/// - If not set: defaults to localhost only (restrictive default)
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("QDMS_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (QDMS_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in QDMS_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(ALLOWED_METHODS)
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No QDMS_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PATCH,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// Restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint, always open.
async fn health_handler() -> impl IntoResponse {
    Json(types::HealthResponse::default())
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. CORS - handles preflight requests
/// 2. Tracing - logs all requests
/// 3. Body limit - 16 MiB, sized for base64 attachments
/// 4. Rate Limiting - protects against DoS (if enabled)
/// 5. Session auth - resolves the bearer token to a user
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let api = Router::new()
        // Auth & users
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/me", get(auth::me_handler))
        .route("/users", get(rbac::list_users_handler))
        .route("/users/{id}", patch(rbac::patch_user_handler))
        // Roles
        .route(
            "/roles",
            get(rbac::list_roles_handler).post(rbac::create_role_handler),
        )
        .route(
            "/roles/{name}",
            get(rbac::get_role_handler)
                .put(rbac::update_role_handler)
                .delete(rbac::delete_role_handler),
        )
        // Folders
        .route(
            "/folders",
            get(documents::list_folders_handler).post(documents::create_folder_handler),
        )
        .route(
            "/folders/{id}",
            get(documents::get_folder_handler)
                .patch(documents::patch_folder_handler)
                .delete(documents::delete_folder_handler),
        )
        .route(
            "/folders/{id}/permissions",
            patch(documents::set_folder_permissions_handler),
        )
        // Documents
        .route(
            "/documents",
            get(documents::list_documents_handler).post(documents::create_document_handler),
        )
        .route(
            "/documents/approvals/pending",
            get(documents::pending_approvals_handler),
        )
        .route("/documents/read-tasks", get(documents::read_tasks_handler))
        .route(
            "/documents/report/status",
            get(documents::status_report_handler),
        )
        .route(
            "/documents/{id}",
            get(documents::get_document_handler).patch(documents::patch_document_handler),
        )
        .route(
            "/documents/{id}/status",
            patch(documents::override_status_handler),
        )
        .route(
            "/documents/{id}/versions",
            post(documents::create_version_handler),
        )
        .route(
            "/documents/{id}/read-receipts",
            get(documents::read_receipts_handler),
        )
        .route(
            "/documents/{id}/acknowledge",
            post(documents::acknowledge_handler),
        )
        .route(
            "/documents/{id}/approvals/decision",
            post(documents::decision_handler),
        )
        // Quality records
        .merge(records::router())
        // Notifications
        .route("/notifications", get(files::list_notifications_handler))
        .route(
            "/notifications/{id}/read",
            post(files::mark_notification_read_handler),
        )
        // Files
        .route("/files", post(files::upload_file_handler))
        .route(
            "/files/{id}",
            get(files::download_file_handler).delete(files::delete_file_handler),
        )
        // Dashboard
        .route("/dashboard/stats", get(files::dashboard_stats_handler))
        .route("/health", get(health_handler));

    let mut router = Router::new().route("/health", get(health_handler)).nest("/api", api);

    // Session auth (innermost - runs last on request)
    router = router.layer(axum_middleware::from_fn_with_state(
        state.clone(),
        auth::session_auth_middleware,
    ));

    // Rate limiting
    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    // Body limit, CORS, and tracing (outermost layers)
    router
        .layer(axum::extract::DefaultBodyLimit::max(16 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, store: Store) -> Result<(), QdmsError> {
    let state = AppState::new(store);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| QdmsError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("QDMS HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| QdmsError::IoError(format!("Server error: {}", e)))
}
