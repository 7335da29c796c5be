//! Route protection middleware.
//!
//! Every protected route passes through `permission_guard`: the bearer
//! token is verified, the authorization context is resolved fresh from
//! the store, and an optional named permission is enforced. An empty
//! permission string means authentication-only. Handlers that need more
//! nuanced checks (resource ownership, role-change rules) read the
//! injected `AuthContext` and decide themselves.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::auth::api::{ApiError, AppState};
use crate::error::AuthError;

pub async fn permission_guard(
    State((state, required_permission)): State<(AppState, &'static str)>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or(AuthError::MissingCredential)?;
    let claims = state.tokens.decode_session_token(token)?;
    let user_id = claims.user_id()?;
    let role_id = claims.role_id()?;

    // Re-resolved on every request: role/permission edits take effect on
    // the next verified request, not at token issuance. A missing user or
    // role here is a dangling reference, reported as a server fault.
    let ctx = state
        .auth
        .auth_context(user_id, role_id)
        .map_err(|err| match err {
            crate::error::ServiceError::NotFound(_) => {
                warn!(%user_id, %role_id, %err, "failed to resolve authentication context");
                ApiError::internal("failed to resolve authentication context")
            }
            other => ApiError::from(other),
        })?;

    if !required_permission.is_empty() && !ctx.has_permission(required_permission) {
        return Err(AuthError::InsufficientPermission.into());
    }

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
