//! Single-use registry for password-reset tokens.
//!
//! A reset token is redeemable only while it sits in this registry;
//! redemption removes it under the same lock that guards insertion and
//! the periodic sweep, so a token can be consumed at most once even under
//! concurrent redemption attempts. Entries self-expire after the reset
//! TTL; `sweep` is driven by a timer in the binary and keeps the map
//! bounded whether or not tokens are ever redeemed.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::auth::jwt::RESET_TTL_HOURS;
use crate::error::NotFoundError;

#[derive(Debug)]
struct ResetEntry {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

/// One map, one lock. Shared by issuance, redemption and the sweep.
#[derive(Debug, Default)]
pub struct ResetTokenRegistry {
    entries: Mutex<HashMap<String, ResetEntry>>,
}

impl ResetTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly issued token for its owning user.
    pub fn register(&self, token: &str, user_id: Uuid) {
        self.register_at(token, user_id, Utc::now());
    }

    pub fn register_at(&self, token: &str, user_id: Uuid, now: DateTime<Utc>) {
        let entry = ResetEntry {
            user_id,
            expires_at: now + Duration::hours(RESET_TTL_HOURS),
        };
        self.entries.lock().insert(token.to_string(), entry);
    }

    /// Atomically look up and remove a token. Fails if the token was never
    /// registered, was already consumed, or has expired. An expired entry
    /// is dropped on the way out rather than waiting for the sweep.
    pub fn redeem(&self, token: &str) -> Result<Uuid, NotFoundError> {
        self.redeem_at(token, Utc::now())
    }

    pub fn redeem_at(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, NotFoundError> {
        let mut entries = self.entries.lock();
        match entries.remove(token) {
            Some(entry) if entry.expires_at > now => Ok(entry.user_id),
            _ => Err(NotFoundError::ResetToken),
        }
    }

    /// Drop expired entries; returns how many were removed. No-ops on keys
    /// already redeemed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
