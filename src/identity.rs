//! Per-request identity resolution.
//!
//! [`IdentityLayer`] reads the session cookie, resolves it through a
//! [`SessionStore`] and a [`UserLookup`], and stores the outcome as an
//! [`Identity`] request extension. Handlers take `Identity<U>` as an
//! extractor.
//!
//! The layer never rejects a request. A missing cookie, an unknown, revoked
//! or expired session, a deleted user, and even a failing store all produce
//! [`Identity::Anonymous`]. An invalid cookie is left in place; clearing it
//! is the job of an explicit logout.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::response::{IntoResponse, Response};
use axum::BoxError;
use http::request::Parts;
use http::{header, HeaderMap, Request, StatusCode};
use tower::{Layer, Service};
use tower_cookies::Cookie;

use crate::session_store::SessionStore;

/// Finds users by the id stored in their session.
///
/// Backed by whatever holds the application's accounts.
#[async_trait]
pub trait UserLookup: Send + Sync + 'static {
    type User: Clone + Send + Sync + 'static;

    /// `Ok(None)` when no such user exists (any more).
    async fn by_id(&self, user_id: &str) -> Result<Option<Self::User>, BoxError>;
}

/// Who made the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity<U> {
    Anonymous,
    User(U),
}

impl<U> Identity<U> {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    pub fn user(&self) -> Option<&U> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user),
        }
    }

    pub fn into_user(self) -> Option<U> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user),
        }
    }
}

struct Resolver<U> {
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserLookup<User = U>>,
    cookie_name: String,
}

impl<U: Clone + Send + Sync + 'static> Resolver<U> {
    async fn identify(&self, headers: &HeaderMap) -> Identity<U> {
        let Some(token) = session_cookie(headers, &self.cookie_name) else {
            return Identity::Anonymous;
        };

        let user_id = match self.store.resolve(&token).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => return Identity::Anonymous,
            Err(e) => {
                tracing::warn!(error = %e, "session lookup failed, treating request as anonymous");
                return Identity::Anonymous;
            }
        };

        match self.users.by_id(&user_id).await {
            Ok(Some(user)) => Identity::User(user),
            Ok(None) => {
                tracing::debug!(user_id = %user_id, "session belongs to a user that no longer exists");
                Identity::Anonymous
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "user lookup failed, treating request as anonymous");
                Identity::Anonymous
            }
        }
    }
}

fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_owned())
}

/// A tower layer attaching an [`Identity`] to every request.
///
/// ```no_run
/// use std::sync::Arc;
/// use axum::{routing::get, Router};
/// use tower_identity_sessions::{Identity, IdentityLayer, SessionStore, UserLookup};
///
/// # fn build<U: UserLookup<User = String>>(store: Arc<dyn SessionStore>, users: Arc<U>) {
/// let app: Router = Router::new()
///     .route("/", get(|identity: Identity<String>| async move {
///         identity.user().cloned().unwrap_or_else(|| "anonymous".into())
///     }))
///     .layer(IdentityLayer::<String>::new(store, users, "auth_sid"));
/// # }
/// ```
pub struct IdentityLayer<U> {
    resolver: Arc<Resolver<U>>,
}

impl<U: Clone + Send + Sync + 'static> IdentityLayer<U> {
    pub fn new(
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserLookup<User = U>>,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            resolver: Arc::new(Resolver {
                store,
                users,
                cookie_name: cookie_name.into(),
            }),
        }
    }

    /// Runs the same resolution the layer performs, for callers outside a
    /// tower stack.
    pub async fn identify(&self, headers: &HeaderMap) -> Identity<U> {
        self.resolver.identify(headers).await
    }
}

impl<U> Clone for IdentityLayer<U> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<S, U> Layer<S> for IdentityLayer<U> {
    type Service = IdentityService<S, U>;

    fn layer(&self, inner: S) -> Self::Service {
        IdentityService {
            inner,
            resolver: Arc::clone(&self.resolver),
        }
    }
}

/// The service produced by [`IdentityLayer`].
pub struct IdentityService<S, U> {
    inner: S,
    resolver: Arc<Resolver<U>>,
}

impl<S: Clone, U> Clone for IdentityService<S, U> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<S, U, ReqBody> Service<Request<ReqBody>> for IdentityService<S, U>
where
    S: Service<Request<ReqBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    U: Clone + Send + Sync + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // The clone may not be ready; keep the one that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let resolver = Arc::clone(&self.resolver);

        Box::pin(async move {
            let identity = resolver.identify(req.headers()).await;
            req.extensions_mut().insert(identity);
            inner.call(req).await
        })
    }
}

/// Rejection for `Identity<U>` on a route without [`IdentityLayer`].
#[derive(Debug, Clone, Copy)]
pub struct MissingIdentityLayer;

impl IntoResponse for MissingIdentityLayer {
    fn into_response(self) -> Response {
        tracing::error!("Identity extractor used without IdentityLayer installed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "identity layer is not installed",
        )
            .into_response()
    }
}

impl<S, U> FromRequestParts<S> for Identity<U>
where
    S: Send + Sync,
    U: Clone + Send + Sync + 'static,
{
    type Rejection = MissingIdentityLayer;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity<U>>()
            .cloned()
            .ok_or(MissingIdentityLayer)
    }
}
