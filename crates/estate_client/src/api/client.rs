use std::{sync::Arc, time::Duration};

use estate_core::config::{Config, ProxyAuth};
use log::info;
use reqwest::{header::HeaderMap, Client, Method, Proxy, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::{de::DeserializeOwned, Serialize};

use crate::api::middleware::SilentRefreshMiddleware;
use crate::auth::refresh::RefreshCoordinator;
use crate::auth::session::SessionStore;
use crate::error::{ApiError, Result};
use crate::utils::http_utils::{ensure_success, execute_request};

fn apply_proxy_auth(proxy: Proxy, auth: Option<&ProxyAuth>) -> Proxy {
    let Some(auth) = auth else {
        return proxy;
    };
    if auth.username.is_empty() {
        return proxy;
    }
    proxy.basic_auth(&auth.username, &auth.password)
}

/// Marketplace API client.
///
/// Owns two middleware stacks over one connection pool: the authenticated one
/// (bearer attachment and silent refresh) for ordinary calls, and a plain one
/// for the refresh and logout calls that must never trigger a refresh.
#[derive(Clone)]
pub struct ApiClient {
    authed: Arc<ClientWithMiddleware>,
    plain: Arc<ClientWithMiddleware>,
    base_url: String,
    session: Arc<SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: &Config, session: Arc<SessionStore>) -> Result<Self> {
        let client = Self::build_http_client(config)?;
        Ok(Self::with_http_client(client, config.api_base(), session))
    }

    /// Builds the client over an existing `reqwest::Client`.
    pub fn with_http_client(client: Client, base_url: &str, session: Arc<SessionStore>) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let plain = Arc::new(ClientBuilder::new(client.clone()).build());
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&plain),
            base_url.clone(),
            Arc::clone(&session),
        ));
        let authed = Arc::new(
            ClientBuilder::new(client)
                .with(SilentRefreshMiddleware::new(
                    Arc::clone(&session),
                    Arc::clone(&coordinator),
                    &base_url,
                ))
                .build(),
        );
        info!("API client ready for {base_url}");

        ApiClient {
            authed,
            plain,
            base_url,
            session,
            coordinator,
        }
    }

    fn build_http_client(config: &Config) -> Result<Client> {
        let mut builder = Client::builder()
            .default_headers(Self::get_default_headers())
            .timeout(Duration::from_secs(config.request_timeout_secs));
        if !config.http_proxy.is_empty() {
            let mut proxy = Proxy::http(&config.http_proxy)?;
            proxy = apply_proxy_auth(proxy, config.http_proxy_auth.as_ref());
            builder = builder.proxy(proxy);
        }
        if !config.https_proxy.is_empty() {
            let mut proxy = Proxy::https(&config.https_proxy)?;
            proxy = apply_proxy_auth(proxy, config.https_proxy_auth.as_ref());
            builder = builder.proxy(proxy);
        }
        Ok(builder.build()?)
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut header = HeaderMap::new();
        header.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        header.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(concat!(
                "estate-client/",
                env!("CARGO_PKG_VERSION")
            )),
        );
        header
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Client without the refresh middleware (logout, refresh).
    pub fn plain_client(&self) -> &ClientWithMiddleware {
        &self.plain
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends an authenticated request; non-2xx responses become [`ApiError::Status`].
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let response = execute_request(&self.authed, method, &self.url(path), body).await?;
        ensure_success(response).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        decode(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, Some(body)).await?;
        decode(response).await
    }

    /// POST whose response body is ignored.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: Option<&B>) -> Result<()> {
        self.send(Method::POST, path, body).await.map(drop)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send::<()>(Method::DELETE, path, None).await.map(drop)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let url = response.url().clone();
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(format!("{url}: {e}")))
}
