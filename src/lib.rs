//! TaskFlow Backend Library
//!
//! Exposes the authentication/authorization core and its collaborators
//! for use by the server binary and integration tests.

pub mod auth;
pub mod config;
pub mod error;
pub mod mailer;
