//! HTTP surface for the auth subsystem.
//!
//! Thin axum handlers over `AuthService`, plus the error-to-status
//! mapping. Route-level permissions are declared where the routes are
//! wired; ownership gates live in the handlers that know the target
//! resource.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::auth::access;
use crate::auth::jwt::TokenService;
use crate::auth::middleware::permission_guard;
use crate::auth::models::{
    AuthContext, ChangeTemporaryPasswordRequest, CreateAdminRequest, ForgotPasswordRequest,
    LoginRequest, LoginResponse, RegisterRequest, ResetPasswordRequest, UpdateProfileRequest,
    UpdateRoleRequest, UserResponse,
};
use crate::auth::service::AuthService;
use crate::error::{AccessError, AuthError, NotFoundError, ServiceError};

/// Shared state for auth routes and the permission guard.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub tokens: Arc<TokenService>,
}

/// Transport-level error: a status code and a client-safe message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": true, "message": self.message })),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match err {
            AuthError::InsufficientPermission => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        };
        Self::new(status, err.to_string())
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        Self::new(StatusCode::FORBIDDEN, err.to_string())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Auth(e) => e.into(),
            ServiceError::Access(e) => e.into(),
            ServiceError::Validation(e) => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            ServiceError::NotFound(NotFoundError::User) => {
                Self::new(StatusCode::NOT_FOUND, "user not found")
            }
            ServiceError::NotFound(NotFoundError::ResetToken) => Self::new(
                StatusCode::BAD_REQUEST,
                "invalid or expired password reset token",
            ),
            // A dangling role reference; never a client mistake.
            ServiceError::NotFound(NotFoundError::Role) => {
                error!("role integrity fault: dangling role reference");
                Self::internal("internal server error")
            }
            ServiceError::EmailTaken => Self::new(StatusCode::CONFLICT, "email already registered"),
            ServiceError::InvalidCredentials => {
                Self::new(StatusCode::UNAUTHORIZED, "invalid credentials")
            }
            ServiceError::PasswordChangeNotRequired => Self::new(
                StatusCode::BAD_REQUEST,
                "password change not required for this account",
            ),
            ServiceError::AlreadyVerified => {
                Self::new(StatusCode::BAD_REQUEST, "email already verified")
            }
            ServiceError::Storage(e) => {
                error!(%e, "storage error");
                Self::internal("internal server error")
            }
            ServiceError::PasswordHash(e) => {
                error!(%e, "password hashing error");
                Self::internal("internal server error")
            }
            ServiceError::TokenSigning(e) => {
                error!(%e, "token signing error");
                Self::internal("internal server error")
            }
        }
    }
}

/// All auth/user routes, with per-route permission requirements attached.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/forgot_password", post(forgot_password))
        .route("/api/v1/auth/reset_password", post(reset_password))
        .with_state(state.clone());

    // Authentication only; no named permission.
    let authenticated = Router::new()
        .route("/api/v1/auth/verify_email", post(verify_email))
        .route("/api/v1/auth/change_temp_password", post(change_temp_password))
        .route("/api/v1/users/:id", get(get_user))
        .route_layer(from_fn_with_state((state.clone(), ""), permission_guard))
        .with_state(state.clone());

    let profile = Router::new()
        .route("/api/v1/users/:id/profile", put(update_profile))
        .route_layer(from_fn_with_state(
            (state.clone(), "user:update_profile"),
            permission_guard,
        ))
        .with_state(state.clone());

    let admin_create = Router::new()
        .route("/api/v1/users/admin", post(create_admin))
        .route_layer(from_fn_with_state(
            (state.clone(), "user:create_admin"),
            permission_guard,
        ))
        .with_state(state.clone());

    let user_listing = Router::new()
        .route("/api/v1/users", get(list_users))
        .route_layer(from_fn_with_state(
            (state.clone(), "user:read_all"),
            permission_guard,
        ))
        .with_state(state.clone());

    let role_update = Router::new()
        .route("/api/v1/users/:id/role", put(update_role))
        .route_layer(from_fn_with_state(
            (state.clone(), "user:update_role"),
            permission_guard,
        ))
        .with_state(state);

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(profile)
        .merge(admin_create)
        .merge(user_listing)
        .merge(role_update)
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(state.auth.login(req)?))
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.forgot_password(&req.email).await?;
    // Identical response whether or not the email exists.
    Ok(Json(json!({
        "message": "If that email is registered, a reset link has been sent."
    })))
}

async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.reset_password(&req.token, &req.new_password)?;
    Ok(Json(json!({ "message": "Password reset successfully." })))
}

async fn verify_email(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.verify_email(&ctx)?;
    Ok(Json(json!({ "message": "Email verified successfully." })))
}

async fn change_temp_password(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<ChangeTemporaryPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .auth
        .change_temporary_password(ctx.user_id, &req.old_password, &req.new_password)?;
    Ok(Json(json!({ "message": "Password changed successfully." })))
}

async fn create_admin(
    State(state): State<AppState>,
    Json(req): Json<CreateAdminRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth.create_admin(&req.email).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    Ok(Json(state.auth.list_users()?))
}

async fn get_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let target = parse_user_id(&id)?;
    if !access::own_or_all(&ctx, "user:read_all", target) {
        return Err(AccessError::PermissionDenied.into());
    }
    Ok(Json(state.auth.user_response(target)?))
}

async fn update_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let target = parse_user_id(&id)?;
    Ok(Json(state.auth.update_user_role(&ctx, target, &req.role_name)?))
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let target = parse_user_id(&id)?;
    if !access::own_or_all(&ctx, "user:read_all", target) {
        return Err(AccessError::PermissionDenied.into());
    }
    Ok(Json(state.auth.update_profile(target, &req)?))
}

fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "invalid user id format"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_status_mapping() {
        assert_eq!(
            ApiError::from(AuthError::MissingCredential).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::Expired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(AuthError::InsufficientPermission).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_service_error_status_mapping() {
        assert_eq!(
            ApiError::from(ServiceError::EmailTaken).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ServiceError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(ServiceError::from(NotFoundError::User)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ServiceError::from(NotFoundError::ResetToken)).status(),
            StatusCode::BAD_REQUEST
        );
        // Dangling role reference is a server fault, not a 404
        assert_eq!(
            ApiError::from(ServiceError::from(NotFoundError::Role)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(ServiceError::from(AccessError::SelfDemotion)).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_parse_user_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_user_id(&id.to_string()).unwrap(), id);
        assert_eq!(
            parse_user_id("not-a-uuid").unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
