use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::clock::{self, Clock};
use crate::session_store::{self, check_new_session, NewSession, SessionRecord, SessionStore};
use crate::token::{self, TokenHasher};

/// A process-local session store.
///
/// Records live in a map guarded by a read/write lock, so `resolve` only
/// ever takes the shared side. Nothing survives a restart and nothing is
/// shared between processes: use it for development and tests, and
/// [`DatabaseStore`](crate::DatabaseStore) everywhere else.
///
/// Clones share the same map.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    hasher: TokenHasher,
    clock: Arc<dyn Clock>,
    records: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl MemoryStore {
    pub fn new(hasher: TokenHasher) -> Self {
        Self {
            hasher,
            clock: clock::system(),
            records: Arc::default(),
        }
    }

    /// Replaces the wall clock used for expiry checks and revocation stamps.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Swaps the keyring while keeping every stored record, as a key
    /// rotation does for a long-running process.
    pub fn with_hasher(mut self, hasher: TokenHasher) -> Self {
        self.hasher = hasher;
        self
    }

    fn lookup(&self, token: &str) -> Option<SessionRecord> {
        if !token::is_well_formed(token) {
            return None;
        }
        let candidates = self.hasher.candidates(token, self.clock.now());
        let records = self.records.read();
        candidates
            .iter()
            .find_map(|fp| records.get(fp.digest()))
            .cloned()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, token: &str, session: NewSession) -> session_store::Result<()> {
        check_new_session(token, &session)?;

        let fingerprint = self.hasher.hash(token);
        // Link to the digest the prior session is actually stored under,
        // which differs from the active key's hash after a key rotation.
        let rotated_from_fingerprint = session.rotated_from.as_deref().map(|prior| {
            self.lookup(prior)
                .map(|record| record.fingerprint)
                .unwrap_or_else(|| self.hasher.hash(prior).into_digest())
        });

        let record = SessionRecord {
            fingerprint: fingerprint.digest().to_owned(),
            key_id: fingerprint.key_id().to_owned(),
            user_id: session.user_id,
            created_at: session.created_at,
            expires_at: session.expires_at,
            remember: session.remember,
            ip: session.ip,
            user_agent: session.user_agent,
            rotated_from_fingerprint,
            revoked_at: None,
        };

        match self.records.write().entry(fingerprint.into_digest()) {
            Entry::Occupied(_) => Err(session_store::Error::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn revoke(&self, token: &str) -> session_store::Result<bool> {
        if !token::is_well_formed(token) {
            return Ok(false);
        }

        let now = self.clock.now();
        let candidates = self.hasher.candidates(token, now);
        let mut records = self.records.write();

        for fp in &candidates {
            if let Some(record) = records.get_mut(fp.digest()) {
                if record.revoked_at.is_some() {
                    return Ok(false);
                }
                record.revoked_at = Some(now);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn resolve(&self, token: &str) -> session_store::Result<Option<String>> {
        if !token::is_well_formed(token) {
            return Ok(None);
        }

        let now = self.clock.now();
        let candidates = self.hasher.candidates(token, now);
        let records = self.records.read();

        Ok(candidates
            .iter()
            .find_map(|fp| records.get(fp.digest()))
            .filter(|record| record.is_active_at(now))
            .map(|record| record.user_id.clone()))
    }

    async fn find_record(&self, token: &str) -> session_store::Result<Option<SessionRecord>> {
        Ok(self.lookup(token))
    }
}
