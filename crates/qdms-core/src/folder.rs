//! # Document Folders
//!
//! Folder-scoped access control and document code generation.
//!
//! Folders carry per-principal capability grants. A folder with no grant
//! entries is a legacy-open folder: everyone gets every capability except
//! `manage`.

use crate::rbac::User;
use crate::types::{PrincipalType, QdmsError, Timestamp, normalize};
use serde::{Deserialize, Serialize};

/// Default code pattern when a folder does not define its own.
pub const DEFAULT_CODE_PATTERN: &str = "{PREFIX}-{TYPE}-{SEQ:000}";

// =============================================================================
// CAPABILITIES
// =============================================================================

/// Folder-scoped capability, checked per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Read,
    Download,
    Create,
    Revise,
    Approve,
    Cancel,
    Manage,
}

impl Capability {
    /// Every capability, in grant-list order.
    pub const ALL: [Self; 7] = [
        Self::Read,
        Self::Download,
        Self::Create,
        Self::Revise,
        Self::Approve,
        Self::Cancel,
        Self::Manage,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Download => "download",
            Self::Create => "create",
            Self::Revise => "revise",
            Self::Approve => "approve",
            Self::Cancel => "cancel",
            Self::Manage => "manage",
        }
    }

    /// Parse a capability name (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match normalize(value).as_str() {
            "read" => Some(Self::Read),
            "download" => Some(Self::Download),
            "create" => Some(Self::Create),
            "revise" => Some(Self::Revise),
            "approve" => Some(Self::Approve),
            "cancel" => Some(Self::Cancel),
            "manage" => Some(Self::Manage),
            _ => None,
        }
    }
}

/// One capability grant on a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderPermission {
    pub principal_type: PrincipalType,
    pub principal_id: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

/// A folder grouping controlled documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code_prefix: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default = "default_pattern")]
    pub auto_code_pattern: String,
    #[serde(default)]
    pub auto_code_seq: u64,
    #[serde(default)]
    pub permissions: Vec<FolderPermission>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

fn default_pattern() -> String {
    DEFAULT_CODE_PATTERN.to_string()
}

/// Drop grants with no capabilities or a blank principal id.
#[must_use]
pub fn sanitize_permissions(permissions: Vec<FolderPermission>) -> Vec<FolderPermission> {
    permissions
        .into_iter()
        .filter_map(|mut perm| {
            perm.principal_id = perm.principal_id.trim().to_string();
            perm.capabilities.sort_unstable();
            perm.capabilities.dedup();
            if perm.principal_id.is_empty() || perm.capabilities.is_empty() {
                None
            } else {
                Some(perm)
            }
        })
        .collect()
}

/// Does the user hold the capability on this folder?
///
/// Precedence:
/// 1. admins hold everything;
/// 2. `manage` also via the global `doc.folder.manage_permissions` grant;
/// 3. legacy-open folders (no grant entries) allow everything but `manage`;
/// 4. explicit grants matched by principal;
/// 5. `read`/`download` fall back to the global `doc.document.read` grant.
#[must_use]
pub fn user_has_capability(user: &User, folder: &Folder, capability: Capability) -> bool {
    if user.is_admin() {
        return true;
    }
    if capability == Capability::Manage && user.has_permission("doc.folder.manage_permissions") {
        return true;
    }
    if folder.permissions.is_empty() {
        return capability != Capability::Manage;
    }

    let role_names = user.role_names();
    for perm in &folder.permissions {
        if !perm.capabilities.contains(&capability) {
            continue;
        }
        let matched = match perm.principal_type {
            PrincipalType::User => perm.principal_id == user.id,
            PrincipalType::Role => role_names.contains(&perm.principal_id),
            PrincipalType::Department => perm.principal_id == user.department,
            PrincipalType::Group => user.groups.contains(&perm.principal_id),
        };
        if matched {
            return true;
        }
    }

    matches!(capability, Capability::Read | Capability::Download)
        && user.has_permission("doc.document.read")
}

/// All capabilities the user holds on the folder, in canonical order.
#[must_use]
pub fn capabilities_for_user(user: &User, folder: &Folder) -> Vec<Capability> {
    Capability::ALL
        .into_iter()
        .filter(|cap| user_has_capability(user, folder, *cap))
        .collect()
}

/// Fail with `PermissionDenied` unless the user holds the capability.
pub fn ensure_capability(
    user: &User,
    folder: &Folder,
    capability: Capability,
) -> Result<(), QdmsError> {
    if user_has_capability(user, folder, capability) {
        Ok(())
    } else {
        Err(QdmsError::PermissionDenied(format!(
            "folder access denied: {}",
            capability.as_str()
        )))
    }
}

// =============================================================================
// DOCUMENT CODE GENERATION
// =============================================================================

/// Strip a token down to uppercase alphanumerics/dashes for code use.
fn sanitize_code_token(value: Option<&str>, fallback: &str) -> String {
    let cleaned: String = value
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect::<String>()
        .to_uppercase();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// Expand a folder's code pattern for the next sequence value.
///
/// Placeholders: `{PREFIX}`, `{TYPE}` (first 8 chars of the document
/// type), `{YEAR}`, `{MONTH}`, and `{SEQ:NNN}` where the digit count of
/// `NNN` gives the zero-padding width. The caller persists the bumped
/// `auto_code_seq` together with the new document.
#[must_use]
pub fn generate_code(folder: &Folder, document_type: &str, next_seq: u64, now: Timestamp) -> String {
    use chrono::Datelike;

    let pattern = if folder.auto_code_pattern.trim().is_empty() {
        DEFAULT_CODE_PATTERN
    } else {
        folder.auto_code_pattern.as_str()
    };
    let prefix = sanitize_code_token(folder.code_prefix.as_deref(), "DOC");
    let type_token = sanitize_code_token(
        Some(&document_type.chars().take(8).collect::<String>()),
        "DOC",
    );

    let mut code = expand_seq(pattern, next_seq);
    code = code.replace("{PREFIX}", &prefix);
    code = code.replace("{TYPE}", &type_token);
    code = code.replace("{YEAR}", &now.year().to_string());
    code = code.replace("{MONTH}", &format!("{:02}", now.month()));
    code
}

/// Replace every `{SEQ:NNN}` placeholder with the zero-padded sequence.
fn expand_seq(pattern: &str, seq: u64) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(start) = rest.find("{SEQ:") {
        let after = &rest[start + 5..];
        let Some(end) = after.find('}') else {
            break;
        };
        let width = after[..end].len();
        out.push_str(&rest[..start]);
        out.push_str(&format!("{seq:0width$}"));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn user(id: &str, role: &str, department: &str, permissions: &[&str]) -> User {
        User {
            id: id.to_string(),
            username: id.to_string(),
            email: format!("{id}@example.com"),
            full_name: id.to_string(),
            role: role.to_string(),
            roles: vec![],
            department: department.to_string(),
            groups: vec![],
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn folder(permissions: Vec<FolderPermission>) -> Folder {
        let now = Utc::now();
        Folder {
            id: "f1".to_string(),
            name: "Quality Manual".to_string(),
            code_prefix: Some("QM".to_string()),
            department: None,
            description: None,
            parent_id: None,
            auto_code_pattern: DEFAULT_CODE_PATTERN.to_string(),
            auto_code_seq: 0,
            permissions,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn legacy_open_folder_allows_all_but_manage() {
        let f = folder(vec![]);
        let u = user("u1", "viewer", "Sales", &[]);
        assert!(user_has_capability(&u, &f, Capability::Read));
        assert!(user_has_capability(&u, &f, Capability::Revise));
        assert!(!user_has_capability(&u, &f, Capability::Manage));
    }

    #[test]
    fn admin_holds_everything() {
        let f = folder(vec![FolderPermission {
            principal_type: PrincipalType::Role,
            principal_id: "qa".to_string(),
            capabilities: vec![Capability::Read],
        }]);
        let u = user("u1", "admin", "IT", &[]);
        assert_eq!(capabilities_for_user(&u, &f), Capability::ALL.to_vec());
    }

    #[test]
    fn role_grant_is_honored() {
        let f = folder(vec![FolderPermission {
            principal_type: PrincipalType::Role,
            principal_id: "qa".to_string(),
            capabilities: vec![Capability::Read, Capability::Approve],
        }]);
        let qa = user("u1", "qa", "Quality", &[]);
        let other = user("u2", "production", "Plant", &[]);
        assert!(user_has_capability(&qa, &f, Capability::Approve));
        assert!(!user_has_capability(&other, &f, Capability::Approve));
    }

    #[test]
    fn global_read_grant_falls_through() {
        let f = folder(vec![FolderPermission {
            principal_type: PrincipalType::Role,
            principal_id: "qa".to_string(),
            capabilities: vec![Capability::Read],
        }]);
        let u = user("u2", "production", "Plant", &["doc.document.read"]);
        assert!(user_has_capability(&u, &f, Capability::Read));
        assert!(user_has_capability(&u, &f, Capability::Download));
        assert!(!user_has_capability(&u, &f, Capability::Create));
    }

    #[test]
    fn manage_via_global_permission() {
        let f = folder(vec![FolderPermission {
            principal_type: PrincipalType::Role,
            principal_id: "qa".to_string(),
            capabilities: vec![Capability::Read],
        }]);
        let u = user("u2", "doc-admin", "Quality", &["doc.folder.manage_permissions"]);
        assert!(user_has_capability(&u, &f, Capability::Manage));
    }

    #[test]
    fn sanitize_drops_empty_grants() {
        let sanitized = sanitize_permissions(vec![
            FolderPermission {
                principal_type: PrincipalType::User,
                principal_id: "  ".to_string(),
                capabilities: vec![Capability::Read],
            },
            FolderPermission {
                principal_type: PrincipalType::Role,
                principal_id: "qa".to_string(),
                capabilities: vec![],
            },
            FolderPermission {
                principal_type: PrincipalType::Role,
                principal_id: " qa ".to_string(),
                capabilities: vec![Capability::Read, Capability::Read],
            },
        ]);
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized[0].principal_id, "qa");
        assert_eq!(sanitized[0].capabilities, vec![Capability::Read]);
    }

    #[test]
    fn code_generation_expands_placeholders() {
        let f = folder(vec![]);
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).single().expect("ts");
        assert_eq!(generate_code(&f, "SOP", 7, now), "QM-SOP-007");
    }

    #[test]
    fn code_generation_year_month_pattern() {
        let mut f = folder(vec![]);
        f.auto_code_pattern = "{PREFIX}/{YEAR}-{MONTH}/{SEQ:0000}".to_string();
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).single().expect("ts");
        assert_eq!(generate_code(&f, "SOP", 12, now), "QM/2026-03/0012");
    }

    #[test]
    fn code_generation_sanitizes_type_token() {
        let f = folder(vec![]);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("ts");
        // first 8 chars, non-alphanumerics dropped, uppercased
        assert_eq!(generate_code(&f, "spec if!cation", 1, now), "QM-SPECIF-001");
    }

    #[test]
    fn capability_parse_roundtrip() {
        for cap in Capability::ALL {
            assert_eq!(Capability::parse(cap.as_str()), Some(cap));
        }
        assert_eq!(Capability::parse("bogus"), None);
    }
}
