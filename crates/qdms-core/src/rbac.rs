//! # RBAC Module
//!
//! Users, roles, and permission evaluation.
//!
//! A user carries a primary `role` plus an additional `roles` list; the
//! union of both is the user's role set. Permissions come from explicit
//! per-user grants plus the permissions of every held role. Admin roles
//! short-circuit every check.

use crate::types::{QdmsError, Timestamp, normalize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role names that grant unconditional admin rights (compared lowercased).
pub const ADMIN_ROLE_KEYS: [&str; 3] = ["admin", "system_admin", "systemadministrator"];

// =============================================================================
// MODELS
// =============================================================================

/// A named role with its permission grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// An account known to the system.
///
/// `permissions` holds the *effective* set after role expansion when the
/// user is loaded through [`effective_permissions`]; raw stored users keep
/// only their direct grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub department: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: Timestamp,
}

const fn default_true() -> bool {
    true
}

// =============================================================================
// ROLE & PERMISSION EVALUATION
// =============================================================================

impl User {
    /// The user's full role set: primary role plus the `roles` list,
    /// deduplicated, original casing preserved.
    #[must_use]
    pub fn role_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        if !self.role.trim().is_empty() {
            names.insert(self.role.clone());
        }
        for role in &self.roles {
            if !role.trim().is_empty() {
                names.insert(role.clone());
            }
        }
        names
    }

    /// True if any held role is an admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role_names()
            .iter()
            .any(|name| is_admin_role(name))
    }

    /// Permission check: admins and the `"*"` grant pass everything.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        if self.is_admin() {
            return true;
        }
        if self.permissions.iter().any(|p| p == "*") {
            return true;
        }
        self.permissions.iter().any(|p| p == permission)
    }

    /// All normalized identifier tokens for this user: id, username,
    /// email, role names, department, and groups. Used by the approval
    /// resolver for bare-token and `user:` matches.
    #[must_use]
    pub fn identifier_tokens(&self) -> BTreeSet<String> {
        let mut tokens = BTreeSet::new();
        tokens.insert(normalize(&self.id));
        tokens.insert(normalize(&self.username));
        tokens.insert(normalize(&self.email));
        tokens.insert(normalize(&self.role));
        tokens.insert(normalize(&self.department));
        for role in &self.roles {
            tokens.insert(normalize(role));
        }
        for group in &self.groups {
            tokens.insert(normalize(group));
        }
        tokens.retain(|token| !token.is_empty());
        tokens
    }
}

/// True if the role name (lowercased) is one of the admin role keys.
#[must_use]
pub fn is_admin_role(name: &str) -> bool {
    let normalized = normalize(name);
    ADMIN_ROLE_KEYS.contains(&normalized.as_str())
}

/// Fail with `PermissionDenied` unless the user holds the permission.
pub fn ensure_permission(user: &User, permission: &str) -> Result<(), QdmsError> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        Err(QdmsError::PermissionDenied(permission.to_string()))
    }
}

/// Expand a user's effective permission set from their direct grants and
/// the permissions of every role they hold. Admins gain the `"*"` grant.
///
/// `roles` is the full role table; missing roles contribute nothing.
#[must_use]
pub fn effective_permissions(user: &User, roles: &[Role]) -> Vec<String> {
    let mut permissions: BTreeSet<String> = user
        .permissions
        .iter()
        .filter(|p| !p.trim().is_empty())
        .cloned()
        .collect();

    for name in user.role_names() {
        if let Some(role) = roles.iter().find(|r| r.name == name) {
            permissions.extend(
                role.permissions
                    .iter()
                    .filter(|p| !p.trim().is_empty())
                    .cloned(),
            );
        }
    }

    if user.is_admin() {
        permissions.insert("*".to_string());
    }

    permissions.into_iter().collect()
}

// =============================================================================
// TESTS
// =============================================================================
