//! Typed wrappers over the marketplace endpoints.

use log::{info, warn};
use reqwest::Method;

use crate::api::client::ApiClient;
use crate::error::Result;
use crate::models::{Application, AuthResponse, Credentials, NewApplication, Property, RefreshRequest};
use crate::utils::http_utils::{ensure_success, execute_request};

/// Login, registration and logout flows. These are the only writers of the
/// session besides the refresh coordinator.
#[derive(Debug, Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.authenticate("/auth/login", email, password).await
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.authenticate("/auth/register", email, password).await
    }

    async fn authenticate(&self, path: &str, email: &str, password: &str) -> Result<AuthResponse> {
        let credentials = Credentials {
            email: email.trim().to_lowercase(),
            password: password.to_string(),
        };
        let auth: AuthResponse = self.client.post_json(path, &credentials).await?;
        self.client.session().set_session(
            Some(auth.user.clone()),
            auth.access_token.clone(),
            auth.refresh_token.clone(),
        );
        Ok(auth)
    }

    /// Invalidates the refresh token server-side when possible, then always
    /// clears the local session. Server failures are ignored.
    pub async fn logout(&self) {
        let session = self.client.session();
        if let Some(refresh_token) = session.refresh_token() {
            let body = RefreshRequest { refresh_token };
            let outcome = match execute_request(
                self.client.plain_client(),
                Method::POST,
                &self.client.url("/auth/logout"),
                Some(&body),
            )
            .await
            {
                Ok(response) => ensure_success(response).await.map(drop),
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                warn!("Server-side logout failed, clearing locally anyway: {err}");
            }
        }
        session.clear();
        info!("Logged out");
    }

    /// Revokes every refresh token of the user. Requires a valid access token;
    /// the local session is cleared only when the server accepted.
    pub async fn logout_all(&self) -> Result<()> {
        self.client.post::<()>("/auth/logout-all", None).await?;
        self.client.session().clear();
        info!("Logged out from all devices");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PropertiesApi {
    client: ApiClient,
}

impl PropertiesApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn get_all(&self) -> Result<Vec<Property>> {
        self.client.get_json("/properties").await
    }
}

#[derive(Debug, Clone)]
pub struct ApplicationsApi {
    client: ApiClient,
}

impl ApplicationsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, property_id: i64, amount: u64) -> Result<Application> {
        self.client
            .post_json(
                "/applications",
                &NewApplication {
                    property_id,
                    amount,
                },
            )
            .await
    }

    pub async fn get_mine(&self) -> Result<Vec<Application>> {
        self.client.get_json("/applications").await
    }

    pub async fn remove(&self, id: i64) -> Result<()> {
        self.client.delete(&format!("/applications/{id}")).await
    }
}
