//! # Notifications
//!
//! Store-backed per-user notifications and approver-token fan-out. There
//! is no delivery channel; the app serves these over the API and marks
//! them read.

use crate::approval::user_matches_approver;
use crate::rbac::User;
use crate::types::{NotificationKind, Timestamp, new_id, normalize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single per-user notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub kind: NotificationKind,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: Timestamp,
}

impl Notification {
    #[must_use]
    pub fn new(
        user_id: &str,
        title: &str,
        message: &str,
        kind: NotificationKind,
        now: Timestamp,
    ) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            kind,
            is_read: false,
            created_at: now,
        }
    }
}

/// Resolve a set of approver tokens to concrete user ids over the active
/// user set. The actor (if given) is excluded so decisions never notify
/// their own author.
#[must_use]
pub fn resolve_recipients<'a, I>(
    tokens: &[String],
    users: I,
    exclude_user_id: Option<&str>,
) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a User>,
{
    let tokens: Vec<String> = tokens
        .iter()
        .map(|t| normalize(t))
        .filter(|t| !t.is_empty())
        .collect();
    let mut recipients = BTreeSet::new();
    for user in users {
        if !user.is_active {
            continue;
        }
        if exclude_user_id == Some(user.id.as_str()) {
            continue;
        }
        if tokens.iter().any(|t| user_matches_approver(user, t)) {
            recipients.insert(user.id.clone());
        }
    }
    recipients
}

/// Build one notification per recipient.
#[must_use]
pub fn fan_out(
    recipients: &BTreeSet<String>,
    title: &str,
    message: &str,
    kind: NotificationKind,
    now: Timestamp,
) -> Vec<Notification> {
    recipients
        .iter()
        .map(|user_id| Notification::new(user_id, title, message, kind, now))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: &str, role: &str, department: &str, active: bool) -> User {
        User {
            id: id.to_string(),
            username: id.to_string(),
            email: format!("{id}@example.com"),
            full_name: id.to_string(),
            role: role.to_string(),
            roles: vec![],
            department: department.to_string(),
            groups: vec![],
            permissions: vec![],
            is_active: active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn resolves_role_and_department_tokens() {
        let users = vec![
            user("u1", "qa_manager", "QA", true),
            user("u2", "operator", "QA", true),
            user("u3", "operator", "Plant", true),
        ];
        let tokens = vec!["role:qa_manager".to_string(), "department:plant".to_string()];
        let recipients = resolve_recipients(&tokens, &users, None);
        assert_eq!(
            recipients,
            BTreeSet::from(["u1".to_string(), "u3".to_string()])
        );
    }

    #[test]
    fn excludes_actor_and_inactive_users() {
        let users = vec![
            user("u1", "qa_manager", "QA", true),
            user("u2", "qa_manager", "QA", false),
            user("u3", "qa_manager", "QA", true),
        ];
        let tokens = vec!["role:qa_manager".to_string()];
        let recipients = resolve_recipients(&tokens, &users, Some("u1"));
        assert_eq!(recipients, BTreeSet::from(["u3".to_string()]));
    }

    #[test]
    fn blank_tokens_match_nobody() {
        let users = vec![user("u1", "qa_manager", "QA", true)];
        let recipients = resolve_recipients(&[String::new(), "  ".to_string()], &users, None);
        assert!(recipients.is_empty());
    }

    #[test]
    fn fan_out_builds_one_per_recipient() {
        let recipients = BTreeSet::from(["u1".to_string(), "u2".to_string()]);
        let batch = fan_out(
            &recipients,
            "Approval required",
            "Document QM-001 awaits your decision",
            NotificationKind::Info,
            Utc::now(),
        );
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|n| !n.is_read));
        assert_eq!(batch[0].user_id, "u1");
    }
}
