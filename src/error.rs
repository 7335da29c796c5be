//! Error taxonomy for the authorization core.
//!
//! All failures are tagged variants so callers branch on kind, never on
//! message text. The api layer owns the mapping to HTTP status codes.

use thiserror::Error;

/// Authentication and token-verification failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authorization credential")]
    MissingCredential,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token claims")]
    MalformedClaims,
    #[error("insufficient permissions")]
    InsufficientPermission,
}

/// A referenced entity does not exist.
///
/// User/Role lookups that fail while building an authentication context
/// indicate a dangling reference (roles are seeded and only copied from
/// valid documents) and are mapped to a server-side fault, not a
/// client-facing 404.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("user not found")]
    User,
    #[error("role not found")]
    Role,
    #[error("invalid or expired password reset token")]
    ResetToken,
}

/// Caller-supplied data failed a precondition.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Access-decision rejections from the role-update path. These rules run
/// before the generic permission check and short-circuit regardless of
/// the actor's permission set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("you cannot change the role of another admin")]
    PeerAdminImmutable,
    #[error("you cannot change your own role away from admin")]
    SelfDemotion,
    #[error("you do not have sufficient permissions to access this resource")]
    PermissionDenied,
}

/// Composite error for the auth service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("password change not required for this account")]
    PasswordChangeNotRequired,
    #[error("email already verified")]
    AlreadyVerified,
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
    #[error("password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
    #[error("token signing error: {0}")]
    TokenSigning(jsonwebtoken::errors::Error),
}
