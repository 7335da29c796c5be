//! Application configuration loaded from the environment.

use std::env;

/// Runtime configuration. Every field has a development default so the
/// server starts with nothing but `cargo run`; production deployments are
/// expected to override the secrets.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub db_path: String,
    /// Secret for session and email-verification tokens.
    pub jwt_secret: String,
    /// Separate secret for password-reset tokens so a leaked session secret
    /// cannot forge reset links.
    pub password_reset_secret: String,
    /// Base URL the frontend is served from; used to build links embedded
    /// in outbound emails.
    pub frontend_base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            db_path: env_or("DB_PATH", "taskflow.db"),
            jwt_secret: env_or("JWT_SECRET", "dev_jwt_secret_change_in_production"),
            password_reset_secret: env_or(
                "PASSWORD_RESET_SECRET",
                "dev_reset_secret_change_in_production",
            ),
            frontend_base_url: env_or("FRONTEND_BASE_URL", "http://localhost:3000"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
