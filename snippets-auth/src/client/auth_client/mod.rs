mod models;

use crate::client::interceptor::OutboundRequest;
use crate::common::{GoogleRegisterData, LoginData, RegisterData, Registration, TokenPair};
pub use models::AuthClientError;
use models::*;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Thin client for the snippet manager's `/auth` endpoints.
pub struct ServerAuthClient {
    http_client: Client,
    server_url: String,
}

impl ServerAuthClient {
    pub fn new(server_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthClientError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        let server_url = server_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http_client,
            server_url,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    /// Browser entry point of the Google sign-in flow
    pub fn google_login_url(&self) -> String {
        self.url("/auth/google/login")
    }

    pub async fn register(&self, data: &RegisterData) -> Result<Registration, AuthClientError> {
        self.post_json("/auth/register", data).await
    }

    pub async fn login(&self, data: &LoginData) -> Result<TokenPair, AuthClientError> {
        self.post_json("/auth/login", data).await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair, AuthClientError> {
        self.post_json("/auth/refresh", &RefreshRequest { refresh_token })
            .await
    }

    pub async fn complete_google_register(
        &self,
        data: &GoogleRegisterData,
    ) -> Result<TokenPair, AuthClientError> {
        self.post_json("/auth/google/complete-register", data)
            .await
    }

    /// Send a bearer-authenticated request. Non-2xx responses become `AuthClientError::Status`.
    pub async fn execute(
        &self,
        request: &OutboundRequest,
        access_token: &str,
    ) -> Result<Response, AuthClientError> {
        let mut builder = self
            .http_client
            .request(request.method().clone(), self.url(request.path()))
            .bearer_auth(access_token);
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        check_status(resp).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, AuthClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .http_client
            .post(self.url(path))
            .json(body)
            .send()
            .await?;

        Ok(check_status(resp).await?.json::<T>().await?)
    }
}

async fn check_status(resp: Response) -> Result<Response, AuthClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(AuthClientError::Status {
        status,
        messages: error_messages(status, &body),
    })
}
