//! Access decision engine.
//!
//! Permission membership is checked by `AuthContext::has_permission`; this
//! module adds the handler-level gates layered on top: the own-or-all
//! pattern used by task and profile endpoints, and the special-case rules
//! on the role-update path.

use uuid::Uuid;

use crate::auth::models::AuthContext;
use crate::auth::permissions::ROLE_ADMIN;
use crate::error::AccessError;

pub const PERM_UPDATE_ROLE: &str = "user:update_role";

/// Require a named permission; `Ok` means the route gate passes.
pub fn require_permission(ctx: &AuthContext, action: &str) -> Result<(), AccessError> {
    if ctx.has_permission(action) {
        Ok(())
    } else {
        Err(AccessError::PermissionDenied)
    }
}

/// Own-or-all gate: access is granted if the actor holds the resource's
/// `_all` permission or owns the resource.
pub fn own_or_all(ctx: &AuthContext, all_permission: &str, owner_id: Uuid) -> bool {
    ctx.has_permission(all_permission) || ctx.user_id == owner_id
}

/// Role-change guard. The two admin rules run before the generic
/// permission check and short-circuit regardless of the actor's
/// permission set:
///
/// - an Admin may not change the role of a *different* Admin;
/// - an Admin may not change their *own* role away from Admin.
pub fn authorize_role_change(
    ctx: &AuthContext,
    target_user_id: Uuid,
    target_role_name: &str,
    new_role_name: &str,
) -> Result<(), AccessError> {
    if target_role_name == ROLE_ADMIN
        && ctx.role_name == ROLE_ADMIN
        && target_user_id != ctx.user_id
    {
        return Err(AccessError::PeerAdminImmutable);
    }
    if target_user_id == ctx.user_id && ctx.role_name == ROLE_ADMIN && new_role_name != ROLE_ADMIN {
        return Err(AccessError::SelfDemotion);
    }
    require_permission(ctx, PERM_UPDATE_ROLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::{permissions_for_role, ROLE_MANAGER, ROLE_USER};

    fn ctx_for(role_name: &str) -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            role_name: role_name.to_string(),
            permissions: permissions_for_role(role_name),
            is_email_verified: true,
            needs_password_change: false,
        }
    }

    #[test]
    fn test_own_or_all_for_plain_user() {
        let ctx = ctx_for(ROLE_USER);

        // Owns the resource: allowed despite holding only `_own`
        assert!(own_or_all(&ctx, "task:update_all", ctx.user_id));
        // Someone else's resource: denied
        assert!(!own_or_all(&ctx, "task:update_all", Uuid::new_v4()));
    }

    #[test]
    fn test_own_or_all_for_manager() {
        let ctx = ctx_for(ROLE_MANAGER);

        // `task:update_all` grants access to any owner's task
        assert!(own_or_all(&ctx, "task:update_all", Uuid::new_v4()));
    }

    #[test]
    fn test_admin_cannot_change_peer_admin() {
        let admin = ctx_for(ROLE_ADMIN);
        assert!(admin.has_permission(PERM_UPDATE_ROLE));

        let other_admin = Uuid::new_v4();
        assert_eq!(
            authorize_role_change(&admin, other_admin, ROLE_ADMIN, ROLE_USER),
            Err(AccessError::PeerAdminImmutable)
        );
    }

    #[test]
    fn test_admin_cannot_demote_self() {
        let admin = ctx_for(ROLE_ADMIN);
        assert_eq!(
            authorize_role_change(&admin, admin.user_id, ROLE_ADMIN, ROLE_MANAGER),
            Err(AccessError::SelfDemotion)
        );
        // Reasserting their own Admin role is a no-op, not a demotion
        assert!(authorize_role_change(&admin, admin.user_id, ROLE_ADMIN, ROLE_ADMIN).is_ok());
    }

    #[test]
    fn test_admin_may_change_non_admin_roles() {
        let admin = ctx_for(ROLE_ADMIN);
        let target = Uuid::new_v4();
        assert!(authorize_role_change(&admin, target, ROLE_USER, ROLE_MANAGER).is_ok());
        assert!(authorize_role_change(&admin, target, ROLE_MANAGER, ROLE_USER).is_ok());
    }

    #[test]
    fn test_role_change_requires_permission() {
        let manager = ctx_for(ROLE_MANAGER);
        assert_eq!(
            authorize_role_change(&manager, Uuid::new_v4(), ROLE_USER, ROLE_MANAGER),
            Err(AccessError::PermissionDenied)
        );
    }
}
