//! Core business logic for authentication and account lifecycle.
//!
//! Orchestrates the credential store, token service, reset registry and
//! mailer: registration (self-service and admin-created accounts with
//! temporary passwords), login, the forgot/reset password flow, the
//! temporary-password state machine, email verification, and per-request
//! authorization-context resolution.

use std::sync::Arc;

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::access;
use crate::auth::jwt::TokenService;
use crate::auth::models::{
    AuthContext, LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest, User,
    UserResponse,
};
use crate::auth::permissions::{ROLE_ADMIN, ROLE_USER};
use crate::auth::reset_registry::ResetTokenRegistry;
use crate::auth::user_store::UserStore;
use crate::error::{NotFoundError, ServiceError, ValidationError};
use crate::mailer::Mailer;

const DEFAULT_AVATAR_URL: &str = "https://placehold.co/150x150/cccccc/ffffff?text=Avatar";
const TEMP_PASSWORD_LEN: usize = 12;

pub struct AuthService {
    store: Arc<UserStore>,
    tokens: Arc<TokenService>,
    reset_tokens: Arc<ResetTokenRegistry>,
    mailer: Arc<dyn Mailer>,
    frontend_base_url: String,
}

impl AuthService {
    pub fn new(
        store: Arc<UserStore>,
        tokens: Arc<TokenService>,
        reset_tokens: Arc<ResetTokenRegistry>,
        mailer: Arc<dyn Mailer>,
        frontend_base_url: String,
    ) -> Self {
        Self {
            store,
            tokens,
            reset_tokens,
            mailer,
            frontend_base_url,
        }
    }

    /// Self-service registration. New accounts get the User role and a
    /// verification email.
    pub async fn register(&self, req: RegisterRequest) -> Result<UserResponse, ServiceError> {
        validate_email(&req.email)?;
        validate_password(&req.password)?;
        self.register_user(&req.email, &req.password, false).await
    }

    /// Admin-initiated creation of another admin account. A temporary
    /// password is generated, mailed to the new admin, and the account is
    /// flagged `needs_password_change` until it is replaced.
    pub async fn create_admin(&self, email: &str) -> Result<UserResponse, ServiceError> {
        validate_email(email)?;
        let temp_password = generate_temp_password();
        self.register_user(email, &temp_password, true).await
    }

    async fn register_user(
        &self,
        email: &str,
        password: &str,
        admin_creation: bool,
    ) -> Result<UserResponse, ServiceError> {
        if self.store.find_user_by_email(email)?.is_some() {
            return Err(ServiceError::EmailTaken);
        }

        let role_name = if admin_creation { ROLE_ADMIN } else { ROLE_USER };
        let role = self
            .store
            .find_role_by_name(role_name)?
            .ok_or(NotFoundError::Role)?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            first_name: "New".to_string(),
            last_name: "User".to_string(),
            email: email.to_string(),
            password_hash: hash(password, DEFAULT_COST)?,
            role_id: role.id,
            profile_picture_url: Some(DEFAULT_AVATAR_URL.to_string()),
            is_email_verified: false,
            needs_password_change: admin_creation,
            created_at: now,
            updated_at: now,
        };
        self.store.create_user(&user)?;
        info!(email, role = role_name, "user created");

        if admin_creation {
            self.mailer
                .send(
                    "admin_temp_password",
                    "Your TaskFlow admin account details",
                    email,
                    json!({
                        "first_name": user.first_name,
                        "temporary_password": password,
                        "login_link": format!("{}/login", self.frontend_base_url),
                    }),
                )
                .await;
        } else {
            // A failed verification-token signing should not lose the
            // account; the user can request another email later.
            match self.tokens.issue_verification_token(user.id) {
                Ok(token) => {
                    self.mailer
                        .send(
                            "welcome",
                            "Welcome to TaskFlow! Please verify your email.",
                            email,
                            json!({
                                "first_name": user.first_name,
                                "verification_link": format!(
                                    "{}/verify-email?token={}",
                                    self.frontend_base_url, token
                                ),
                            }),
                        )
                        .await;
                }
                Err(err) => warn!(email, %err, "failed to generate verification token"),
            }
        }

        Ok(UserResponse::from_user(&user, &role.name))
    }

    /// Login. Unknown email and wrong password are indistinguishable to
    /// the caller.
    pub fn login(&self, req: LoginRequest) -> Result<LoginResponse, ServiceError> {
        let user = self
            .store
            .find_user_by_email(&req.email)?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !verify(&req.password, &user.password_hash)? {
            return Err(ServiceError::InvalidCredentials);
        }

        let role = self
            .store
            .find_role_by_id(&user.role_id)?
            .ok_or(NotFoundError::Role)?;

        let token = self
            .tokens
            .issue_session_token(user.id, &user.email, user.role_id)
            .map_err(ServiceError::TokenSigning)?;

        Ok(LoginResponse {
            message: "Login successful".to_string(),
            token,
            user_id: user.id.to_string(),
            role_name: role.name,
            needs_password_change: user.needs_password_change,
        })
    }

    /// Start the password-reset flow. Returns success whether or not the
    /// email is known; the distinction is only visible in server logs.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ServiceError> {
        let Some(user) = self.store.find_user_by_email(email)? else {
            info!(email, "password reset requested for unknown email");
            return Ok(());
        };

        let token = self
            .tokens
            .issue_reset_token(user.id)
            .map_err(ServiceError::TokenSigning)?;
        self.reset_tokens.register(&token, user.id);

        self.mailer
            .send(
                "forgot_password",
                "Password reset request for TaskFlow",
                email,
                json!({
                    "reset_link": format!(
                        "{}/reset-password?token={}",
                        self.frontend_base_url, token
                    ),
                }),
            )
            .await;

        Ok(())
    }

    /// Complete a password reset. Redemption is at-most-once: the token is
    /// removed from the registry before the password is touched.
    pub fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ServiceError> {
        validate_password(new_password)?;
        let user_id = self.reset_tokens.redeem(token)?;

        let password_hash = hash(new_password, DEFAULT_COST)?;
        if !self.store.update_user_password(&user_id, &password_hash)? {
            return Err(NotFoundError::User.into());
        }
        info!(%user_id, "password reset completed");
        Ok(())
    }

    /// The only legal transition out of `needs_password_change`: validate
    /// the temporary password, then replace it and clear the flag.
    pub fn change_temporary_password(
        &self,
        user_id: Uuid,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        validate_password(new_password)?;

        let user = self
            .store
            .find_user_by_id(&user_id)?
            .ok_or(NotFoundError::User)?;

        if !user.needs_password_change {
            return Err(ServiceError::PasswordChangeNotRequired);
        }
        if !verify(old_password, &user.password_hash)? {
            return Err(ServiceError::InvalidCredentials);
        }

        let password_hash = hash(new_password, DEFAULT_COST)?;
        if !self
            .store
            .update_user_password_and_flag(&user_id, &password_hash, false)?
        {
            return Err(NotFoundError::User.into());
        }
        info!(%user_id, "temporary password replaced");
        Ok(())
    }

    /// Mark the authenticated user's email as verified.
    pub fn verify_email(&self, ctx: &AuthContext) -> Result<(), ServiceError> {
        if ctx.is_email_verified {
            return Err(ServiceError::AlreadyVerified);
        }
        if !self.store.set_email_verified(&ctx.user_id)? {
            return Err(NotFoundError::User.into());
        }
        Ok(())
    }

    /// Resolve a verified identity into an authorization context. Looks up
    /// the user and role on every call so permission edits propagate on
    /// the next request; the permission set is copied by value.
    pub fn auth_context(&self, user_id: Uuid, role_id: Uuid) -> Result<AuthContext, ServiceError> {
        let user = self
            .store
            .find_user_by_id(&user_id)?
            .ok_or(NotFoundError::User)?;
        let role = self
            .store
            .find_role_by_id(&role_id)?
            .ok_or(NotFoundError::Role)?;

        Ok(AuthContext {
            user_id: user.id,
            role_id: role.id,
            role_name: role.name,
            permissions: role.permissions,
            is_email_verified: user.is_email_verified,
            needs_password_change: user.needs_password_change,
        })
    }

    /// Change a user's role, subject to the admin special-case rules.
    pub fn update_user_role(
        &self,
        ctx: &AuthContext,
        target_user_id: Uuid,
        new_role_name: &str,
    ) -> Result<UserResponse, ServiceError> {
        let target = self
            .store
            .find_user_by_id(&target_user_id)?
            .ok_or(NotFoundError::User)?;
        let target_role = self
            .store
            .find_role_by_id(&target.role_id)?
            .ok_or(NotFoundError::Role)?;

        access::authorize_role_change(ctx, target.id, &target_role.name, new_role_name)?;

        let new_role = self
            .store
            .find_role_by_name(new_role_name)?
            .ok_or_else(|| ValidationError(format!("unknown role: {new_role_name}")))?;

        if !self.store.update_user_role(&target.id, &new_role.id)? {
            return Err(NotFoundError::User.into());
        }
        info!(target = %target.id, role = %new_role.name, actor = %ctx.user_id, "user role updated");

        self.user_response(target_user_id)
    }

    /// Update profile fields. The own-or-all ownership gate is enforced by
    /// the caller before this runs.
    pub fn update_profile(
        &self,
        target_user_id: Uuid,
        req: &UpdateProfileRequest,
    ) -> Result<UserResponse, ServiceError> {
        for name in [&req.first_name, &req.last_name].into_iter().flatten() {
            if name.len() < 2 || name.len() > 50 {
                return Err(
                    ValidationError("names must be between 2 and 50 characters".to_string()).into(),
                );
            }
        }

        if !self.store.update_user_profile(&target_user_id, req)? {
            return Err(NotFoundError::User.into());
        }
        self.user_response(target_user_id)
    }

    /// Sanitized view of a user, with the role name resolved.
    pub fn user_response(&self, user_id: Uuid) -> Result<UserResponse, ServiceError> {
        let user = self
            .store
            .find_user_by_id(&user_id)?
            .ok_or(NotFoundError::User)?;
        let role = self
            .store
            .find_role_by_id(&user.role_id)?
            .ok_or(NotFoundError::Role)?;
        Ok(UserResponse::from_user(&user, &role.name))
    }

    pub fn list_users(&self) -> Result<Vec<UserResponse>, ServiceError> {
        let users = self.store.list_users()?;
        let mut out = Vec::with_capacity(users.len());
        for user in &users {
            let role = self
                .store
                .find_role_by_id(&user.role_id)?
                .ok_or(NotFoundError::Role)?;
            out.push(UserResponse::from_user(user, &role.name));
        }
        Ok(out)
    }
}

fn validate_email(email: &str) -> Result<(), ValidationError> {
    // Enough to reject obvious garbage; real validation happens when the
    // verification email bounces.
    let valid = email.contains('@') && email.len() >= 3 && !email.starts_with('@');
    if valid {
        Ok(())
    } else {
        Err(ValidationError("invalid email address".to_string()))
    }
}

fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < 6 {
        return Err(ValidationError(
            "password must be at least 6 characters".to_string(),
        ));
    }
    Ok(())
}

fn generate_temp_password() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    raw[..TEMP_PASSWORD_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::{permissions_for_role, ROLE_MANAGER};
    use crate::error::AccessError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use tempfile::NamedTempFile;

    /// Records outbound mail for assertions.
    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>, // (template, to)
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, template: &str, _subject: &str, to: &str, _data: Value) {
            self.sent.lock().push((template.to_string(), to.to_string()));
        }
    }

    struct Harness {
        service: AuthService,
        store: Arc<UserStore>,
        tokens: Arc<TokenService>,
        registry: Arc<ResetTokenRegistry>,
        mailer: Arc<RecordingMailer>,
        _temp: NamedTempFile,
    }

    fn harness() -> Harness {
        let temp = NamedTempFile::new().unwrap();
        let store = Arc::new(UserStore::new(temp.path().to_str().unwrap()).unwrap());
        let tokens = Arc::new(TokenService::new("session-secret", "reset-secret"));
        let registry = Arc::new(ResetTokenRegistry::new());
        let mailer = Arc::new(RecordingMailer::default());
        let service = AuthService::new(
            store.clone(),
            tokens.clone(),
            registry.clone(),
            mailer.clone(),
            "http://localhost:3000".to_string(),
        );
        Harness {
            service,
            store,
            tokens,
            registry,
            mailer,
            _temp: temp,
        }
    }

    fn register_req(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "password123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let h = harness();

        let user = h.service.register(register_req("ada@example.com")).await.unwrap();
        assert_eq!(user.role_name, ROLE_USER);
        assert!(!user.needs_password_change);
        assert_eq!(
            *h.mailer.sent.lock(),
            vec![("welcome".to_string(), "ada@example.com".to_string())]
        );

        let login = h
            .service
            .login(LoginRequest {
                email: "ada@example.com".to_string(),
                password: "password123".to_string(),
            })
            .unwrap();
        assert_eq!(login.role_name, ROLE_USER);
        assert!(!login.needs_password_change);

        // The issued token round-trips through the verifier
        let claims = h.tokens.decode_session_token(&login.token).unwrap();
        assert_eq!(claims.user_id, login.user_id);
    }

    #[tokio::test]
    async fn test_register_duplicate_email_rejected() {
        let h = harness();
        h.service.register(register_req("dup@example.com")).await.unwrap();

        let err = h
            .service
            .register(register_req("dup@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmailTaken));
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let h = harness();
        h.service.register(register_req("ada@example.com")).await.unwrap();

        let unknown = h
            .service
            .login(LoginRequest {
                email: "ghost@example.com".to_string(),
                password: "password123".to_string(),
            })
            .unwrap_err();
        let wrong_password = h
            .service
            .login(LoginRequest {
                email: "ada@example.com".to_string(),
                password: "wrong-password".to_string(),
            })
            .unwrap_err();

        assert!(matches!(unknown, ServiceError::InvalidCredentials));
        assert!(matches!(wrong_password, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_admin_creation_sets_temp_password_flow() {
        let h = harness();

        let admin = h.service.create_admin("boss@example.com").await.unwrap();
        assert_eq!(admin.role_name, ROLE_ADMIN);
        assert!(admin.needs_password_change);
        assert_eq!(
            *h.mailer.sent.lock(),
            vec![(
                "admin_temp_password".to_string(),
                "boss@example.com".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_forgot_password_does_not_reveal_unknown_email() {
        let h = harness();
        h.service.register(register_req("ada@example.com")).await.unwrap();

        // Unknown email: success, nothing registered, nothing sent
        h.service.forgot_password("ghost@example.com").await.unwrap();
        assert!(h.registry.is_empty());
        assert!(h.mailer.sent.lock().len() == 1); // just the welcome email

        // Known email: token registered, reset mail dispatched
        h.service.forgot_password("ada@example.com").await.unwrap();
        assert_eq!(h.registry.len(), 1);
        assert_eq!(
            h.mailer.sent.lock().last().unwrap(),
            &("forgot_password".to_string(), "ada@example.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_reset_password_redeems_exactly_once() {
        let h = harness();
        let user = h.service.register(register_req("ada@example.com")).await.unwrap();
        let user_id = Uuid::parse_str(&user.id).unwrap();

        let token = h.tokens.issue_reset_token(user_id).unwrap();
        h.registry.register(&token, user_id);

        h.service.reset_password(&token, "brand-new-pass").unwrap();
        let relogin = h
            .service
            .login(LoginRequest {
                email: "ada@example.com".to_string(),
                password: "brand-new-pass".to_string(),
            })
            .unwrap();
        assert_eq!(relogin.user_id, user.id);

        // Second redemption of the same token fails
        let err = h.service.reset_password(&token, "another-pass").unwrap_err();
        assert!(matches!(
            err,
            ServiceError::NotFound(NotFoundError::ResetToken)
        ));
    }

    #[tokio::test]
    async fn test_change_temporary_password_state_machine() {
        let h = harness();
        h.service.create_admin("boss@example.com").await.unwrap();
        let admin = h.store.find_user_by_email("boss@example.com").unwrap().unwrap();

        // Wrong temporary password
        let err = h
            .service
            .change_temporary_password(admin.id, "not-the-temp", "permanent1")
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));

        // We don't know the generated temp password, so emulate the flow by
        // setting a known one with the flag still raised.
        let known_hash = hash("temp-pass-123", DEFAULT_COST).unwrap();
        h.store
            .update_user_password_and_flag(&admin.id, &known_hash, true)
            .unwrap();

        h.service
            .change_temporary_password(admin.id, "temp-pass-123", "permanent1")
            .unwrap();
        let updated = h.store.find_user_by_id(&admin.id).unwrap().unwrap();
        assert!(!updated.needs_password_change);

        // Once the flag is clear, the transition is no longer available
        let err = h
            .service
            .change_temporary_password(admin.id, "permanent1", "permanent2")
            .unwrap_err();
        assert!(matches!(err, ServiceError::PasswordChangeNotRequired));
    }

    #[tokio::test]
    async fn test_verify_email_once() {
        let h = harness();
        let user = h.service.register(register_req("ada@example.com")).await.unwrap();
        let user_id = Uuid::parse_str(&user.id).unwrap();
        let stored = h.store.find_user_by_id(&user_id).unwrap().unwrap();
        let ctx = h.service.auth_context(stored.id, stored.role_id).unwrap();

        h.service.verify_email(&ctx).unwrap();
        let refreshed = h.service.auth_context(stored.id, stored.role_id).unwrap();
        assert!(refreshed.is_email_verified);

        let err = h.service.verify_email(&refreshed).unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyVerified));
    }

    #[tokio::test]
    async fn test_auth_context_reflects_current_role_state() {
        let h = harness();
        let user = h.service.register(register_req("ada@example.com")).await.unwrap();
        let user_id = Uuid::parse_str(&user.id).unwrap();
        let stored = h.store.find_user_by_id(&user_id).unwrap().unwrap();

        let ctx = h.service.auth_context(stored.id, stored.role_id).unwrap();
        assert_eq!(ctx.role_name, ROLE_USER);
        assert_eq!(ctx.permissions, permissions_for_role(ROLE_USER));
    }

    #[tokio::test]
    async fn test_auth_context_with_dangling_role_is_integrity_fault() {
        let h = harness();
        let user = h.service.register(register_req("ada@example.com")).await.unwrap();
        let user_id = Uuid::parse_str(&user.id).unwrap();
        let stored = h.store.find_user_by_id(&user_id).unwrap().unwrap();

        // Role id that was never seeded: a dangling reference
        let err = h
            .service
            .auth_context(stored.id, Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(NotFoundError::Role)));
    }

    fn admin_ctx(h: &Harness, user_id: Uuid) -> AuthContext {
        let role = h.store.find_role_by_name(ROLE_ADMIN).unwrap().unwrap();
        AuthContext {
            user_id,
            role_id: role.id,
            role_name: role.name,
            permissions: role.permissions,
            is_email_verified: true,
            needs_password_change: false,
        }
    }

    #[tokio::test]
    async fn test_role_update_respects_admin_rules() {
        let h = harness();
        let acting_admin = h.service.create_admin("boss@example.com").await.unwrap();
        let other_admin = h.service.create_admin("peer@example.com").await.unwrap();
        let user = h.service.register(register_req("ada@example.com")).await.unwrap();

        let actor_id = Uuid::parse_str(&acting_admin.id).unwrap();
        let ctx = admin_ctx(&h, actor_id);

        // Promoting an ordinary user works
        let promoted = h
            .service
            .update_user_role(&ctx, Uuid::parse_str(&user.id).unwrap(), ROLE_MANAGER)
            .unwrap();
        assert_eq!(promoted.role_name, ROLE_MANAGER);

        // Peer admin is immutable
        let err = h
            .service
            .update_user_role(&ctx, Uuid::parse_str(&other_admin.id).unwrap(), ROLE_USER)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Access(AccessError::PeerAdminImmutable)
        ));

        // Self-demotion is rejected
        let err = h
            .service
            .update_user_role(&ctx, actor_id, ROLE_USER)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Access(AccessError::SelfDemotion)));

        // Unknown target role name is a validation error
        let err = h
            .service
            .update_user_role(&ctx, Uuid::parse_str(&user.id).unwrap(), "Superuser")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_profile_validation() {
        let h = harness();
        let user = h.service.register(register_req("ada@example.com")).await.unwrap();
        let user_id = Uuid::parse_str(&user.id).unwrap();

        let err = h
            .service
            .update_profile(
                user_id,
                &UpdateProfileRequest {
                    first_name: Some("A".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let updated = h
            .service
            .update_profile(
                user_id,
                &UpdateProfileRequest {
                    first_name: Some("Ada".to_string()),
                    last_name: Some("Lovelace".to_string()),
                    profile_picture_url: None,
                },
            )
            .unwrap();
        assert_eq!(updated.first_name, "Ada");
        assert_eq!(updated.last_name, "Lovelace");
    }

    #[test]
    fn test_temp_password_shape() {
        let a = generate_temp_password();
        let b = generate_temp_password();
        assert_eq!(a.len(), TEMP_PASSWORD_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_validation_helpers() {
        assert!(validate_email("a@b.c").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_password("123456").is_ok());
        assert!(validate_password("12345").is_err());
    }

}
