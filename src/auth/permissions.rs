//! Static permission model.
//!
//! Maps role names to their canonical permission sets. The table is
//! compiled in; the seeded role documents are refreshed from it on every
//! startup so permission edits ship with the binary.

use std::collections::HashSet;

pub const ROLE_ADMIN: &str = "Admin";
pub const ROLE_MANAGER: &str = "Manager";
pub const ROLE_USER: &str = "User";

/// Canonical roles and their permissions. Membership is what matters;
/// order is irrelevant.
pub const DEFAULT_ROLES: [(&str, &[&str]); 3] = [
    (
        ROLE_ADMIN,
        &[
            "task:create",
            "task:read_all",
            "task:update_all",
            "task:delete_all",
            "user:read_all",
            "user:update_role",
            "user:update_profile",
            "user:verify_email",
            "user:create_admin",
            "dashboard:read_metrics",
        ],
    ),
    (
        ROLE_MANAGER,
        &[
            "task:create",
            "task:read_all",
            "task:update_all",
            "task:delete_all",
            "user:update_profile",
        ],
    ),
    (
        ROLE_USER,
        &[
            "task:create",
            "task:read_own",
            "task:update_own",
            "task:delete_own",
            "user:update_profile",
        ],
    ),
];

/// Canonical permission set for a role name. Unknown names yield an empty
/// set so authorization fails closed.
pub fn permissions_for_role(name: &str) -> HashSet<String> {
    DEFAULT_ROLES
        .iter()
        .find(|(role, _)| *role == name)
        .map(|(_, actions)| actions.iter().map(|a| a.to_string()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_permissions_canonical() {
        let perms = permissions_for_role(ROLE_ADMIN);
        assert_eq!(perms.len(), 10);
        assert!(perms.contains("task:delete_all"));
        assert!(perms.contains("user:create_admin"));
        assert!(perms.contains("dashboard:read_metrics"));
        assert!(!perms.contains("task:read_own"));
    }

    #[test]
    fn test_manager_permissions_canonical() {
        let perms = permissions_for_role(ROLE_MANAGER);
        assert_eq!(perms.len(), 5);
        assert!(perms.contains("task:update_all"));
        assert!(perms.contains("user:update_profile"));
        assert!(!perms.contains("user:update_role"));
    }

    #[test]
    fn test_user_permissions_canonical() {
        let perms = permissions_for_role(ROLE_USER);
        assert_eq!(perms.len(), 5);
        assert!(perms.contains("task:update_own"));
        assert!(!perms.contains("task:update_all"));
        assert!(!perms.contains("user:read_all"));
    }

    #[test]
    fn test_unknown_role_fails_closed() {
        assert!(permissions_for_role("Superuser").is_empty());
        assert!(permissions_for_role("").is_empty());
        // Case-sensitive: "admin" is not a canonical role name
        assert!(permissions_for_role("admin").is_empty());
    }
}
