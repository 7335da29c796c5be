//! Authentication & Authorization
//!
//! JWT session handling, role-based access control, the single-use
//! password-reset registry, and the axum surface that exposes them.

pub mod access;
pub mod api;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod permissions;
pub mod reset_registry;
pub mod service;
pub mod user_store;

pub use api::AppState;
pub use jwt::TokenService;
pub use middleware::permission_guard;
pub use reset_registry::ResetTokenRegistry;
pub use service::AuthService;
pub use user_store::UserStore;
