use std::sync::Arc;

use async_trait::async_trait;
use http::Extensions;
use log::{debug, info, warn};
use reqwest::{header::HeaderValue, Request, Response, StatusCode, Url};
use reqwest_middleware::{Middleware, Next};

use crate::auth::refresh::RefreshCoordinator;
use crate::auth::session::SessionStore;
use crate::error::ApiError;

/// Prefix shared by login, register, refresh and logout.
pub const AUTH_PREFIX: &str = "/auth/";

/// Marks a request that was already replayed after a token refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retried;

/// Attaches the bearer token and heals a single 401 per request by renewing
/// the access token and replaying the request.
///
/// Auth endpoints and replays are never retried; their 401 reaches the caller
/// as is. When the refresh itself fails the session is cleared and the
/// refresh error replaces the original 401.
pub struct SilentRefreshMiddleware {
    session: Arc<SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    base_path: String,
}

impl SilentRefreshMiddleware {
    pub fn new(
        session: Arc<SessionStore>,
        coordinator: Arc<RefreshCoordinator>,
        base_url: &str,
    ) -> Self {
        let base_path = Url::parse(base_url)
            .map(|url| url.path().trim_end_matches('/').to_string())
            .unwrap_or_default();
        Self {
            session,
            coordinator,
            base_path,
        }
    }

    /// Whether `url` targets an auth endpoint, relative to the API base path.
    pub fn is_auth_endpoint(&self, url: &Url) -> bool {
        url.path()
            .strip_prefix(self.base_path.as_str())
            .is_some_and(|relative| relative.starts_with(AUTH_PREFIX))
    }
}

pub(crate) fn set_bearer(request: &mut Request, token: &str) -> Result<(), ApiError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| ApiError::InvalidHeader(e.to_string()))?;
    value.set_sensitive(true);
    request
        .headers_mut()
        .insert(reqwest::header::AUTHORIZATION, value);
    Ok(())
}

#[async_trait]
impl Middleware for SilentRefreshMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let attached = self.session.access_token();
        if let Some(token) = &attached {
            set_bearer(&mut req, token)?;
        }

        let retryable =
            !self.is_auth_endpoint(req.url()) && extensions.get::<Retried>().is_none();
        // Replay copy; streaming bodies cannot be cloned and are sent only once.
        let pending = if retryable { req.try_clone() } else { None };

        let response = next.clone().run(req, extensions).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(mut pending) = pending else {
            debug!("401 from {} is final", response.url());
            return Ok(response);
        };

        // A refresh finished while this request was out; reuse its token.
        if let Some(current) = self.session.access_token() {
            if attached.as_deref() != Some(current.as_str()) {
                debug!(
                    "Replaying {} {} with the already refreshed token",
                    pending.method(),
                    pending.url()
                );
                drop(response);
                extensions.insert(Retried);
                set_bearer(&mut pending, &current)?;
                return next.run(pending, extensions).await;
            }
        }

        let Some(refresh_token) = self.session.refresh_token() else {
            info!("401 without a refresh token, clearing session");
            self.session.clear();
            return Ok(response);
        };

        match self.coordinator.refresh(&refresh_token).await {
            Ok(access_token) => {
                debug!("Replaying {} {} with refreshed token", pending.method(), pending.url());
                drop(response);
                extensions.insert(Retried);
                set_bearer(&mut pending, &access_token)?;
                next.run(pending, extensions).await
            }
            Err(ApiError::RefreshAborted) => {
                warn!("Token refresh abandoned, keeping session");
                Err(ApiError::RefreshAborted.into())
            }
            Err(err) => {
                warn!("Token refresh failed, signing out: {err}");
                self.session.clear();
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::MemorySessionStorage;

    fn middleware_for(base_url: &str) -> SilentRefreshMiddleware {
        let session = Arc::new(SessionStore::load(MemorySessionStorage::new()));
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build();
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::new(client),
            base_url,
            session.clone(),
        ));
        SilentRefreshMiddleware::new(session, coordinator, base_url)
    }

    #[test]
    fn auth_endpoints_are_relative_to_base_path() {
        let middleware = middleware_for("http://localhost:3000/api");
        let url = |path: &str| Url::parse(&format!("http://localhost:3000{path}")).unwrap();

        assert!(middleware.is_auth_endpoint(&url("/api/auth/login")));
        assert!(middleware.is_auth_endpoint(&url("/api/auth/logout-all")));
        assert!(!middleware.is_auth_endpoint(&url("/api/properties")));
        assert!(!middleware.is_auth_endpoint(&url("/api/authors")));
        assert!(!middleware.is_auth_endpoint(&url("/auth/login")));
    }

    #[test]
    fn auth_endpoints_without_base_path() {
        let middleware = middleware_for("http://localhost:3000/");
        let url = Url::parse("http://localhost:3000/auth/register").unwrap();
        assert!(middleware.is_auth_endpoint(&url));
    }

    #[test]
    fn bearer_header_is_sensitive() {
        let mut request = Request::new(
            reqwest::Method::GET,
            Url::parse("http://localhost/properties").unwrap(),
        );
        set_bearer(&mut request, "abc").expect("header");

        let value = request.headers().get(reqwest::header::AUTHORIZATION).unwrap();
        assert_eq!(value, "Bearer abc");
        assert!(value.is_sensitive());
    }

    #[test]
    fn bearer_rejects_control_characters() {
        let mut request = Request::new(
            reqwest::Method::GET,
            Url::parse("http://localhost/properties").unwrap(),
        );
        let err = set_bearer(&mut request, "bad\ntoken").unwrap_err();
        assert!(matches!(err, ApiError::InvalidHeader(_)));
    }
}
