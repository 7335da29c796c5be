//! Domain models and request/response types for the auth subsystem.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A role document: unique name plus a permission set. Seeded at startup
/// and refreshed in place from the compiled-in defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub permissions: HashSet<String>,
}

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role_id: Uuid,
    pub profile_picture_url: Option<String>,
    pub is_email_verified: bool,
    pub needs_password_change: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request-scoped authorization context.
///
/// Built fresh for every verified request; the permission set is copied
/// from the role at token-verification time, so a role edit takes effect
/// on the user's next request. Immutable after construction.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub role_name: String,
    pub permissions: HashSet<String>,
    pub is_email_verified: bool,
    pub needs_password_change: bool,
}

impl AuthContext {
    /// Exact membership test against the copied permission set.
    pub fn has_permission(&self, action: &str) -> bool {
        self.permissions.contains(action)
    }
}

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user_id: String,
    pub role_name: String,
    /// Surfaced so the client can redirect admins created with a temporary
    /// password straight to the change-password screen.
    pub needs_password_change: bool,
}

/// User data returned to clients (sanitized)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    pub is_email_verified: bool,
    pub needs_password_change: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn from_user(user: &User, role_name: &str) -> Self {
        Self {
            id: user.id.to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role_name: role_name.to_string(),
            profile_picture_url: user.profile_picture_url.clone(),
            is_email_verified: user.is_email_verified,
            needs_password_change: user.needs_password_change,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Admin-creation request: the new admin receives a temporary password by
/// email and must change it on first login.
#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeTemporaryPasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_picture_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::{permissions_for_role, ROLE_USER};

    #[test]
    fn test_has_permission_is_exact_membership() {
        let ctx = AuthContext {
            user_id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            role_name: ROLE_USER.to_string(),
            permissions: permissions_for_role(ROLE_USER),
            is_email_verified: true,
            needs_password_change: false,
        };

        assert!(ctx.has_permission("task:update_own"));
        assert!(!ctx.has_permission("task:update_all"));
        // No prefix or wildcard matching
        assert!(!ctx.has_permission("task:update"));
        assert!(!ctx.has_permission("task"));
    }

    #[test]
    fn test_user_response_omits_password_hash() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "$2b$12$secret".to_string(),
            role_id: Uuid::new_v4(),
            profile_picture_url: None,
            is_email_verified: true,
            needs_password_change: false,
            created_at: now,
            updated_at: now,
        };

        let response = UserResponse::from_user(&user, "User");
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("ada@example.com"));
        assert_eq!(response.role_name, "User");
    }
}
