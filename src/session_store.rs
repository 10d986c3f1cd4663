//! The storage contract shared by every session backend.

use std::fmt::Debug;

use async_trait::async_trait;
use time::OffsetDateTime;

/// Errors returned by [`SessionStore`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backing store failed or could not be reached.
    #[error("session backend error: {0}")]
    Backend(String),

    /// A record with the same fingerprint already exists.
    #[error("a session with this fingerprint already exists")]
    Duplicate,

    /// The presented token is empty or malformed.
    #[error("malformed session token")]
    InvalidToken,

    /// `expires_at` is not strictly after `created_at`.
    #[error("session must expire after it is created")]
    InvalidExpiry,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Everything the caller decides about a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub user_id: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub remember: bool,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Plaintext token of the session this one supersedes.
    pub rotated_from: Option<String>,
}

/// A stored session, as the backends see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub fingerprint: String,
    pub key_id: String,
    pub user_id: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub remember: bool,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub rotated_from_fingerprint: Option<String>,
    pub revoked_at: Option<OffsetDateTime>,
}

impl SessionRecord {
    /// A session is usable while it is unrevoked and `now` is strictly
    /// before its expiry.
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

/// Persistence for login sessions, addressed by plaintext token.
///
/// Implementations fingerprint the token themselves and never store it.
/// All three operations must be safe under arbitrary concurrent interleaving.
#[async_trait]
pub trait SessionStore: Debug + Send + Sync + 'static {
    /// Stores a new active session for `token`.
    ///
    /// Fails with [`Error::Duplicate`] if the fingerprint is already present.
    async fn insert(&self, token: &str, session: NewSession) -> Result<()>;

    /// Marks the session revoked. Returns `true` only for the single call
    /// that performed the transition.
    async fn revoke(&self, token: &str) -> Result<bool>;

    /// Returns the owning user id of an active session. Never writes.
    async fn resolve(&self, token: &str) -> Result<Option<String>>;

    /// Returns the stored record for `token` whatever its state, for audits.
    /// Malformed and unknown tokens give `None`.
    async fn find_record(&self, token: &str) -> Result<Option<SessionRecord>>;
}

pub(crate) fn check_new_session(token: &str, session: &NewSession) -> Result<()> {
    if !crate::token::is_well_formed(token) {
        return Err(Error::InvalidToken);
    }
    if session.expires_at <= session.created_at {
        return Err(Error::InvalidExpiry);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn record(expires_in: Duration, revoked: bool) -> (SessionRecord, OffsetDateTime) {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let record = SessionRecord {
            fingerprint: "f".repeat(64),
            key_id: "k1".into(),
            user_id: "u1".into(),
            created_at: now - Duration::hours(1),
            expires_at: now + expires_in,
            remember: false,
            ip: None,
            user_agent: None,
            rotated_from_fingerprint: None,
            revoked_at: revoked.then_some(now),
        };
        (record, now)
    }

    #[test]
    fn expiry_boundary_is_strict() {
        let (at_boundary, now) = record(Duration::ZERO, false);
        assert!(!at_boundary.is_active_at(now));

        let (just_before, now) = record(Duration::nanoseconds(1), false);
        assert!(just_before.is_active_at(now));
    }

    #[test]
    fn revoked_is_never_active() {
        let (revoked, now) = record(Duration::hours(1), true);
        assert!(!revoked.is_active_at(now));
    }

    #[test]
    fn new_session_must_expire_after_creation() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let session = NewSession {
            user_id: "u1".into(),
            created_at: now,
            expires_at: now,
            remember: false,
            ip: None,
            user_agent: None,
            rotated_from: None,
        };
        assert!(matches!(
            check_new_session("abcdefghijklmnopqrstuvwxyz", &session),
            Err(Error::InvalidExpiry)
        ));
        assert!(matches!(
            check_new_session("", &session),
            Err(Error::InvalidToken)
        ));
    }
}
