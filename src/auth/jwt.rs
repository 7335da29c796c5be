//! Token issuance and verification.
//!
//! Three HMAC-signed token kinds with distinct claims, issuers and TTLs:
//! session (24h), password-reset (1h, separate secret) and
//! email-verification (24h). Verification pins the algorithm to HS256 so
//! tokens re-signed under another scheme are rejected outright.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

pub const SESSION_ISSUER: &str = "taskflow-api";
pub const SESSION_AUDIENCE: &str = "taskflow-clients";
pub const RESET_ISSUER: &str = "taskflow-api-reset";
pub const VERIFICATION_ISSUER: &str = "taskflow-api-verify";

pub const SESSION_TTL_HOURS: i64 = 24;
pub const RESET_TTL_HOURS: i64 = 1;
pub const VERIFICATION_TTL_HOURS: i64 = 24;

/// Session token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: String,
    pub email: String,
    pub role_id: String,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl SessionClaims {
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.user_id).map_err(|_| AuthError::MalformedClaims)
    }

    pub fn role_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.role_id).map_err(|_| AuthError::MalformedClaims)
    }
}

/// Password-reset token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetClaims {
    pub user_id: String,
    pub exp: i64,
    pub iss: String,
}

/// Email-verification token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationClaims {
    pub user_id: String,
    pub exp: i64,
    pub iss: String,
}

impl VerificationClaims {
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.user_id).map_err(|_| AuthError::MalformedClaims)
    }
}

/// Issues and verifies the three token kinds. Reset tokens use their own
/// secret: password reset is the highest-value replay target, and a
/// compromised session secret must not be able to mint reset links.
pub struct TokenService {
    session_secret: String,
    reset_secret: String,
}

impl TokenService {
    pub fn new(session_secret: impl Into<String>, reset_secret: impl Into<String>) -> Self {
        Self {
            session_secret: session_secret.into(),
            reset_secret: reset_secret.into(),
        }
    }

    /// Signed session token, 24h expiry. Signing failures are fatal to the
    /// calling request.
    pub fn issue_session_token(
        &self,
        user_id: Uuid,
        email: &str,
        role_id: Uuid,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = SessionClaims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            role_id: role_id.to_string(),
            exp: (Utc::now() + Duration::hours(SESSION_TTL_HOURS)).timestamp(),
            iss: SESSION_ISSUER.to_string(),
            aud: SESSION_AUDIENCE.to_string(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.session_secret.as_bytes()),
        )
    }

    /// Signed reset token, 1h expiry, reset secret. The caller is expected
    /// to register the token in the single-use registry.
    pub fn issue_reset_token(&self, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = ResetClaims {
            user_id: user_id.to_string(),
            exp: (Utc::now() + Duration::hours(RESET_TTL_HOURS)).timestamp(),
            iss: RESET_ISSUER.to_string(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.reset_secret.as_bytes()),
        )
    }

    /// Signed email-verification token, 24h expiry, session secret.
    pub fn issue_verification_token(
        &self,
        user_id: Uuid,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = VerificationClaims {
            user_id: user_id.to_string(),
            exp: (Utc::now() + Duration::hours(VERIFICATION_TTL_HOURS)).timestamp(),
            iss: VERIFICATION_ISSUER.to_string(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.session_secret.as_bytes()),
        )
    }

    pub fn decode_session_token(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[SESSION_ISSUER]);
        validation.set_audience(&[SESSION_AUDIENCE]);
        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.session_secret.as_bytes()),
            &validation,
        )
        .map_err(map_decode_error)?;
        Ok(data.claims)
    }

    pub fn decode_reset_token(&self, token: &str) -> Result<ResetClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[RESET_ISSUER]);
        let data = decode::<ResetClaims>(
            token,
            &DecodingKey::from_secret(self.reset_secret.as_bytes()),
            &validation,
        )
        .map_err(map_decode_error)?;
        Ok(data.claims)
    }

    pub fn decode_verification_token(&self, token: &str) -> Result<VerificationClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[VERIFICATION_ISSUER]);
        let data = decode::<VerificationClaims>(
            token,
            &DecodingKey::from_secret(self.session_secret.as_bytes()),
            &validation,
        )
        .map_err(map_decode_error)?;
        Ok(data.claims)
    }
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::ImmatureSignature => AuthError::InvalidSignature,
        _ => AuthError::MalformedClaims,
    }
}
