//! # Revocable login sessions and request identity for tower and axum
//!
//! Server-side login sessions where the server never holds a usable token,
//! plus a tower layer that turns the session cookie into an [`Identity`] on
//! every request.
//!
//! ## How it fits together
//!
//! - A [`TokenHasher`] turns plaintext tokens into keyed [`Fingerprint`]s.
//!   Its [`Keyring`] can carry retired keys so a key rotation does not end
//!   every session at once.
//! - A [`SessionStore`] keeps session records by fingerprint. Two backends
//!   are provided: [`MemoryStore`] for development and tests, and
//!   [`DatabaseStore`] on top of Sea-ORM.
//! - The [`SessionManager`] mints tokens, starts, rotates and revokes
//!   sessions, and writes or clears the session cookie.
//! - The [`IdentityLayer`] resolves the cookie on each request. It never
//!   fails a request: anything short of a valid session and a known user is
//!   [`Identity::Anonymous`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tower_identity_sessions::{
//!     Keyring, MemoryStore, SessionConfig, SessionManager, SessionStore, TokenHasher,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hasher = TokenHasher::new(Keyring::from_env()?);
//! let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new(hasher));
//! let manager = SessionManager::new(store.clone(), SessionConfig::from_env()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Session validity
//!
//! A session is valid while it is not revoked and the current instant is
//! strictly before `expires_at`. Validity is evaluated on every read and
//! never cached. Revocation is one-way and happens exactly once.
//!
//! ## Operational note
//!
//! Neither backend deletes expired rows. Deployments using
//! [`DatabaseStore`] should run their own periodic purge.

pub mod clock;
pub mod config;
mod database_store;
pub mod entity;
mod identity;
mod manager;
mod memory_store;
#[cfg(feature = "migration")]
pub mod migration;
pub mod session_store;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SessionConfig};
pub use database_store::DatabaseStore;
pub use identity::{Identity, IdentityLayer, IdentityService, MissingIdentityLayer, UserLookup};
pub use manager::{request_is_secure, ClientInfo, SessionManager};
pub use memory_store::MemoryStore;
pub use session_store::{NewSession, SessionRecord, SessionStore};
pub use token::{Fingerprint, KeyError, Keyring, SigningKey, TokenHasher};

/// The cookie types used by [`SessionManager`], re-exported for handlers.
pub use tower_cookies::{CookieManagerLayer, Cookies};
