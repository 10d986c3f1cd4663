//! Session entity model for Sea-ORM database interaction.
//!
//! Maps to the `sessions` table created by the bundled migration.

use sea_orm::entity::prelude::*;

/// Sea-ORM entity model representing one login session.
///
/// # Database Schema
///
/// | Column                   | Type               | Description                               |
/// |--------------------------|--------------------|-------------------------------------------|
/// | fingerprint              | TEXT (Primary Key) | Hex HMAC-SHA256 of the session token      |
/// | key_id                   | TEXT               | Signing key that produced the fingerprint |
/// | user_id                  | TEXT (indexed)     | Owner of the session                      |
/// | created_at               | TIMESTAMPTZ        | Creation instant (UTC)                    |
/// | expires_at               | TIMESTAMPTZ        | Expiry instant (UTC), exclusive           |
/// | remember                 | BOOLEAN            | Extended "remember me" lifetime           |
/// | ip                       | TEXT NULL          | Client address at login                   |
/// | user_agent               | TEXT NULL          | Client user agent at login                |
/// | rotated_from_fingerprint | TEXT NULL          | Session this one replaced                 |
/// | revoked_at               | TIMESTAMPTZ NULL   | Set once, when the session is revoked     |
///
/// The plaintext token is never stored.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub fingerprint: String,
    #[sea_orm(column_type = "Text")]
    pub key_id: String,
    #[sea_orm(column_type = "Text", indexed)]
    pub user_id: String,
    pub created_at: DateTimeWithTimeZone,
    pub expires_at: DateTimeWithTimeZone,
    pub remember: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub ip: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub rotated_from_fingerprint: Option<String>,
    pub revoked_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
