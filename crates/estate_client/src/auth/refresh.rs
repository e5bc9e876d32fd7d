//! Single-flight access token renewal.
//!
//! The coordinator is either idle or refreshing. The first caller to ask for a
//! refresh starts the one network call to `/auth/refresh` on its own task;
//! every caller, the first included, parks on a oneshot channel and receives
//! the same outcome. The call runs to completion even if the caller that
//! started it goes away. Every exit from the refreshing state drains the
//! waiter list.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use log::{debug, error, info, warn};
use reqwest_middleware::ClientWithMiddleware;
use tokio::sync::oneshot;

use crate::auth::session::SessionStore;
use crate::error::{ApiError, Result};
use crate::masking::mask_secret;
use crate::models::{RefreshRequest, RefreshResponse};

pub const REFRESH_PATH: &str = "/auth/refresh";

type Waiter = oneshot::Sender<Result<String>>;

pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<ClientWithMiddleware>,
    base_url: String,
    session: Arc<SessionStore>,
    /// `None` while idle, the parked waiters while refreshing.
    waiters: Mutex<Option<Vec<Waiter>>>,
    refresh_calls: AtomicUsize,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("base_url", &self.inner.base_url)
            .field("refreshing", &self.is_refreshing())
            .field("refresh_calls", &self.refresh_count())
            .finish()
    }
}

impl RefreshCoordinator {
    /// `client` must not carry the refreshing middleware, or a rejected
    /// refresh would recurse into itself.
    pub fn new(
        client: Arc<ClientWithMiddleware>,
        base_url: impl Into<String>,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                session,
                waiters: Mutex::new(None),
                refresh_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.state().is_some()
    }

    /// Number of refresh calls sent over the wire so far.
    pub fn refresh_count(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    /// Obtains a new access token, joining an in-flight refresh if there is one.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let started = {
            let mut state = self.inner.state();
            match state.as_mut() {
                Some(waiters) => {
                    waiters.push(tx);
                    false
                }
                None => {
                    *state = Some(vec![tx]);
                    true
                }
            }
        };

        if started {
            let inner = Arc::clone(&self.inner);
            let refresh_token = refresh_token.to_string();
            tokio::spawn(async move {
                let mut in_flight = InFlight {
                    inner: &inner,
                    settled: false,
                };
                let outcome = inner.request_new_tokens(&refresh_token).await;
                in_flight.settle(outcome);
            });
        } else {
            debug!("Refresh already in flight, waiting for its outcome");
        }

        rx.await.unwrap_or(Err(ApiError::RefreshAborted))
    }
}

impl Inner {
    async fn request_new_tokens(&self, refresh_token: &str) -> Result<String> {
        let attempt = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Refreshing access token (call #{attempt}) with refresh token {}",
            mask_secret(refresh_token)
        );

        let url = format!("{}{}", self.base_url, REFRESH_PATH);
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest {
                refresh_token: refresh_token.to_string(),
            })
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send refresh request: {e}");
                ApiError::from(e)
            })?;

        if !response.status().is_success() {
            let err = ApiError::from_response(response).await;
            warn!("Refresh endpoint rejected the refresh token: {err}");
            return Err(err);
        }

        let tokens: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(format!("refresh response: {e}")))?;

        let stored = self.session.rotate_tokens(
            refresh_token,
            tokens.access_token.clone(),
            tokens.refresh_token,
        );
        if !stored {
            // Logged out or signed in again meanwhile; do not resurrect the old session.
            warn!("Session changed while refreshing; new tokens not stored");
        }

        info!("Access token refreshed: {}", mask_secret(&tokens.access_token));
        Ok(tokens.access_token)
    }

    fn state(&self) -> MutexGuard<'_, Option<Vec<Waiter>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leaves the refreshing state and hands `outcome` to every parked waiter.
    fn release(&self, outcome: &Result<String>) {
        let waiters = self.state().take().unwrap_or_default();
        debug!("Releasing {} queued request(s)", waiters.len());
        for waiter in waiters {
            // A dropped receiver belongs to a cancelled request.
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Drains the waiters if the refresh task panics or is torn down with its runtime.
struct InFlight<'a> {
    inner: &'a Inner,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(&mut self, outcome: Result<String>) {
        self.settled = true;
        self.inner.release(&outcome);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Token refresh abandoned; failing queued requests");
            self.inner.release(&Err(ApiError::RefreshAborted));
        }
    }
}
