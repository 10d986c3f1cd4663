use std::sync::Arc;

use http::uri::Scheme;
use http::{HeaderMap, Uri};
use time::Duration;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};

use crate::clock::{self, Clock};
use crate::config::SessionConfig;
use crate::session_store::{self, NewSession, SessionStore};
use crate::token::generate_token;

/// Diagnostic details recorded with a new session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }

    /// Takes the `User-Agent` header; the address has to come from the
    /// connection and is left empty.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let user_agent = headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        Self {
            ip: None,
            user_agent,
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }
}

/// Starts, rotates and ends login sessions, and writes the session cookie.
///
/// The manager is the only place plaintext tokens are created. It must only
/// be asked to start a session after credentials were verified.
///
/// ```no_run
/// use tower_identity_sessions::{ClientInfo, Cookies, SessionManager};
///
/// # async fn login(manager: SessionManager, cookies: Cookies) -> Result<(), Box<dyn std::error::Error>> {
/// let remember = true;
/// let ttl = manager.ttl_for(remember);
/// let token = manager
///     .start("user-42", remember, ClientInfo::default(), ttl)
///     .await?;
/// manager.attach_cookie(&cookies, &token, true, remember, ttl);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            store,
            config,
            clock: clock::system(),
        }
    }

    /// Use the same clock as the store when testing expiry.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn ttl_for(&self, remember: bool) -> Duration {
        self.config.ttl_for(remember)
    }

    /// Creates a session for an already authenticated user and returns the
    /// plaintext token. The token must go to the client and nowhere else.
    ///
    /// Fails with `InvalidExpiry` if `ttl` is not positive or overflows the
    /// calendar.
    pub async fn start(
        &self,
        user_id: &str,
        remember: bool,
        client: ClientInfo,
        ttl: Duration,
    ) -> session_store::Result<String> {
        self.start_inner(user_id, remember, client, ttl, None).await
    }

    /// Ends the session behind `token`. Returns `false` if it was unknown or
    /// already revoked.
    pub async fn revoke(&self, token: &str) -> session_store::Result<bool> {
        let revoked = self.store.revoke(token).await?;
        if revoked {
            tracing::info!("session revoked");
        } else {
            tracing::debug!("revoke ignored for unknown or already revoked session");
        }
        Ok(revoked)
    }

    /// Replaces an active session with a fresh token for the same user and
    /// revokes the old one.
    ///
    /// Returns `None` if `old_token` is not an active session, or if a
    /// concurrent call revoked it first. In both cases no new session
    /// remains usable.
    pub async fn rotate(
        &self,
        old_token: &str,
        remember: bool,
        client: ClientInfo,
        ttl: Duration,
    ) -> session_store::Result<Option<String>> {
        let Some(user_id) = self.store.resolve(old_token).await? else {
            return Ok(None);
        };

        let token = self
            .start_inner(&user_id, remember, client, ttl, Some(old_token.to_owned()))
            .await?;

        let revoked_old = match self.store.revoke(old_token).await {
            Ok(revoked) => revoked,
            Err(e) => {
                // The new token never reaches a client, so it must not stay usable.
                if let Err(cleanup) = self.store.revoke(&token).await {
                    tracing::error!(
                        user_id = %user_id,
                        error = %cleanup,
                        "failed to discard session after rotation error"
                    );
                }
                return Err(e);
            }
        };

        if !revoked_old {
            self.store.revoke(&token).await?;
            tracing::warn!(user_id = %user_id, "session rotation lost a race, new session discarded");
            return Ok(None);
        }

        tracing::info!(user_id = %user_id, "session rotated");
        Ok(Some(token))
    }

    async fn start_inner(
        &self,
        user_id: &str,
        remember: bool,
        client: ClientInfo,
        ttl: Duration,
        rotated_from: Option<String>,
    ) -> session_store::Result<String> {
        let token = generate_token();
        let created_at = self.clock.now();
        let expires_at = created_at
            .checked_add(ttl)
            .ok_or(session_store::Error::InvalidExpiry)?;

        self.store
            .insert(
                &token,
                NewSession {
                    user_id: user_id.to_owned(),
                    created_at,
                    expires_at,
                    remember,
                    ip: client.ip,
                    user_agent: client.user_agent,
                    rotated_from,
                },
            )
            .await?;

        tracing::debug!(user_id, remember, ttl_secs = ttl.whole_seconds(), "session started");
        Ok(token)
    }

    /// Reads the session token from the request cookies.
    pub fn token_from(&self, cookies: &Cookies) -> Option<String> {
        cookies
            .get(self.config.cookie_name())
            .map(|cookie| cookie.value().to_owned())
    }

    /// Sets the session cookie.
    ///
    /// Remembered sessions get `Max-Age` equal to `ttl`; other sessions get a
    /// browser-session cookie. Pass `secure` from the transport, see
    /// [`request_is_secure`].
    pub fn attach_cookie(
        &self,
        cookies: &Cookies,
        token: &str,
        secure: bool,
        remember: bool,
        ttl: Duration,
    ) {
        let mut cookie = Cookie::build((self.config.cookie_name().to_owned(), token.to_owned()))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .path("/");
        if remember {
            cookie = cookie.max_age(ttl);
        }
        cookies.add(cookie.build());
    }

    /// Overwrites the session cookie with an expired, empty one.
    ///
    /// Always emits the removal, whether or not the request carried the
    /// cookie or this response had set it.
    pub fn clear_cookie(&self, cookies: &Cookies) {
        let mut cookie = Cookie::build((self.config.cookie_name().to_owned(), ""))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .build();
        cookie.make_removal();
        cookies.add(cookie);
    }
}

/// Whether the request reached us over TLS.
///
/// `X-Forwarded-Proto` is only consulted when `trust_forwarded_proto` is set.
pub fn request_is_secure(uri: &Uri, headers: &HeaderMap, trust_forwarded_proto: bool) -> bool {
    if uri.scheme() == Some(&Scheme::HTTPS) {
        return true;
    }
    trust_forwarded_proto
        && headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}
