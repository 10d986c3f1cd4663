#![allow(dead_code)]

use std::sync::Arc;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use time::{Duration, OffsetDateTime};
use tower_identity_sessions::migration::Migrator;
use tower_identity_sessions::{
    DatabaseStore, Keyring, ManualClock, MemoryStore, NewSession, SessionStore, SigningKey,
    TokenHasher,
};

pub fn epoch() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_767_225_600).expect("valid timestamp")
}

pub fn signing_key(id: &str, fill: u8) -> SigningKey {
    SigningKey::new(id, [fill; 32]).expect("32 byte key")
}

pub fn hasher() -> TokenHasher {
    TokenHasher::new(Keyring::new(signing_key("test-1", 0x5a)))
}

/// `test-2` active, `test-1` retired and honored until `grace_until`.
pub fn rotated_hasher(grace_until: OffsetDateTime) -> TokenHasher {
    TokenHasher::new(
        Keyring::new(signing_key("test-2", 0x77))
            .with_retired(signing_key("test-1", 0x5a).honored_until(grace_until)),
    )
}

pub fn new_session(user_id: &str, now: OffsetDateTime, ttl: Duration) -> NewSession {
    NewSession {
        user_id: user_id.to_owned(),
        created_at: now,
        expires_at: now + ttl,
        remember: false,
        ip: Some("203.0.113.7".to_owned()),
        user_agent: Some("integration-test".to_owned()),
        rotated_from: None,
    }
}

pub async fn sqlite() -> DatabaseConnection {
    // One connection, otherwise every pooled connection sees its own empty database.
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let conn = Database::connect(opt).await.expect("sqlite connects");
    Migrator::up(&conn, None).await.expect("migrations apply");
    conn
}

pub async fn memory_store(clock: ManualClock) -> Arc<dyn SessionStore> {
    Arc::new(MemoryStore::new(hasher()).with_clock(clock))
}

pub async fn database_store(clock: ManualClock) -> Arc<dyn SessionStore> {
    Arc::new(DatabaseStore::new(sqlite().await, hasher()).with_clock(clock))
}

/// Two views of one memory store: before and after the key rotation of
/// [`rotated_hasher`].
pub async fn memory_rotation(
    clock: ManualClock,
    grace_until: OffsetDateTime,
) -> (Arc<dyn SessionStore>, Arc<dyn SessionStore>) {
    let before = MemoryStore::new(hasher()).with_clock(clock);
    let after = before.clone().with_hasher(rotated_hasher(grace_until));
    (Arc::new(before), Arc::new(after))
}

/// Two stores over one database: before and after the key rotation of
/// [`rotated_hasher`].
pub async fn database_rotation(
    clock: ManualClock,
    grace_until: OffsetDateTime,
) -> (Arc<dyn SessionStore>, Arc<dyn SessionStore>) {
    let conn = sqlite().await;
    let before = DatabaseStore::new(conn.clone(), hasher()).with_clock(clock.clone());
    let after = DatabaseStore::new(conn, rotated_hasher(grace_until)).with_clock(clock);
    (Arc::new(before), Arc::new(after))
}
