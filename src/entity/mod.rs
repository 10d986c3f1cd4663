//! Database entity models used by [`DatabaseStore`](crate::DatabaseStore).

/// The `sessions` table.
pub mod session;
