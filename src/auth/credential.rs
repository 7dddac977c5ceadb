// Credential storage with safety-margin expiry

use chrono::{DateTime, Duration, Utc};

/// Longest lifetime honored for a token (100 years); larger values are clamped
const MAX_LIFETIME_SECS: u64 = 100 * 365 * 24 * 60 * 60;
use parking_lot::RwLock;
use std::fmt;

/// Bearer token plus the instant after which it must no longer be used
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// The token value is a live secret, never print it
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Process-wide holder of the current credential.
///
/// Token and expiry are swapped as one value, so readers see either the old
/// pair or the new pair. Freshness decisions belong to the refresh
/// coordinator; this type only stores and answers questions about `now`.
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,

    /// Seconds shaved off the server-declared lifetime
    safety_margin: i64,
}

impl CredentialStore {
    pub fn new(safety_margin_secs: u64) -> Self {
        Self {
            current: RwLock::new(None),
            safety_margin: safety_margin_secs.min(MAX_LIFETIME_SECS) as i64,
        }
    }

    pub fn safety_margin_secs(&self) -> u64 {
        self.safety_margin as u64
    }

    /// Current credential, fresh or not
    pub fn get(&self) -> Option<Credential> {
        self.current.read().clone()
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(|c| c.is_fresh(now))
    }

    /// Credential only if it can still be used at `now`
    pub fn fresh(&self, now: DateTime<Utc>) -> Option<Credential> {
        self.current
            .read()
            .as_ref()
            .filter(|c| c.is_fresh(now))
            .cloned()
    }

    /// Replace the credential; `expires_at = now + expires_in - safety_margin`.
    ///
    /// Lifetimes beyond [`MAX_LIFETIME_SECS`] are clamped and the sum saturates
    /// at the calendar bounds.
    pub fn set(&self, token: impl Into<String>, expires_in_secs: u64, now: DateTime<Utc>) -> Credential {
        let lifetime = expires_in_secs.min(MAX_LIFETIME_SECS) as i64 - self.safety_margin;
        let expires_at = Duration::try_seconds(lifetime)
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(if lifetime < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            });
        let credential = Credential::new(token, expires_at);
        *self.current.write() = Some(credential.clone());
        credential
    }

    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    /// Clear the credential only while it still holds `rejected`.
    ///
    /// A newer token stored by another caller survives. Returns whether
    /// anything was cleared.
    pub fn invalidate_if(&self, rejected: &str) -> bool {
        let mut current = self.current.write();
        if current.as_ref().is_some_and(|c| c.token() == rejected) {
            *current = None;
            true
        } else {
            false
        }
    }
}
