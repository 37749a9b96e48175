//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use crate::config::AppConfig;
use chrono::Utc;
use qdms_core::{QdmsError, Role, Store};
use std::path::{Path, PathBuf};

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
///
/// Configuration precedence: CLI flags, then `QDMS_API_*` environment
/// variables, then the config file, then defaults. The `--database` flag
/// only wins when it was changed from its default.
pub async fn cmd_server(
    db_path: &PathBuf,
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), QdmsError> {
    let mut config = AppConfig::load(config_path)?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if db_path != &PathBuf::from("qdms.redb") {
        config.database = db_path.clone();
    }

    let store = Store::open(&config.database)?;

    println!("QDMS Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.host);
    println!("  Port:     {}", config.port);
    println!("  Database: {}", config.database.display());
    println!();

    api::run_server(&config.bind_addr(), store).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// The default roles seeded alongside the admin user.
fn default_roles() -> Vec<Role> {
    let now = Utc::now();
    let role = |name: &str, description: &str, permissions: &[&str]| Role {
        name: name.to_string(),
        description: Some(description.to_string()),
        permissions: permissions.iter().map(ToString::to_string).collect(),
        created_at: now,
        updated_at: now,
    };
    vec![
        role(
            "qa_manager",
            "Quality manager: full access to quality records and approvals",
            &[
                "doc.document.read",
                "doc.user.read",
                "qm.complaint.read",
                "qm.complaint.write",
                "qm.capa.read",
                "qm.capa.write",
                "qm.capa.close",
                "qm.audit.read",
                "qm.audit.write",
                "qm.risk.read",
                "qm.risk.write",
                "qm.calibration.read",
                "qm.calibration.write",
            ],
        ),
        role(
            "document_controller",
            "Document controller: manages folders and document distribution",
            &[
                "doc.document.read",
                "doc.user.read",
                "doc.folder.manage_permissions",
            ],
        ),
        role(
            "user",
            "Standard user: reads documents and quality records",
            &[
                "doc.document.read",
                "qm.complaint.read",
                "qm.capa.read",
                "qm.audit.read",
                "qm.risk.read",
                "qm.calibration.read",
            ],
        ),
    ]
}

/// Initialize the database, seed the admin user and the default roles.
pub fn cmd_init(
    db_path: &PathBuf,
    admin_username: &str,
    admin_password: &str,
    json_mode: bool,
) -> Result<(), QdmsError> {
    let store = Store::open(db_path)?;
    let admin = api::seed_admin(&store, admin_username, admin_password)?;

    let mut seeded_roles = Vec::new();
    for role in default_roles() {
        if store.get_role(&role.name)?.is_none() {
            store.put_role(&role)?;
            seeded_roles.push(role.name);
        }
    }

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.display().to_string(),
            "admin_user": admin.username,
            "admin_user_id": admin.id,
            "seeded_roles": seeded_roles,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)
                .map_err(|e| QdmsError::SerializationError(e.to_string()))?
        );
    } else {
        println!("Database initialized: {}", db_path.display());
        println!("Admin user:           {}", admin.username);
        if seeded_roles.is_empty() {
            println!("Roles:                already present");
        } else {
            println!("Roles:                {}", seeded_roles.join(", "));
        }
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show collection counts.
pub fn cmd_status(db_path: &PathBuf, json_mode: bool) -> Result<(), QdmsError> {
    let store = Store::open(db_path)?;
    let counts = store.collection_counts()?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&counts)
                .map_err(|e| QdmsError::SerializationError(e.to_string()))?
        );
    } else {
        println!("QDMS Store Status");
        println!();
        println!("Database: {}", db_path.display());
        for (collection, count) in &counts {
            println!("  {collection:<16} {count}");
        }
    }
    Ok(())
}
