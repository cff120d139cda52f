use reqwest::{Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::client::session::SessionManager;
use crate::error::AuthError;

/// A bearer-authenticated API call, tagged for the retry-once policy.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    id: Uuid,
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    retried: bool,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, AuthError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn retried(&self) -> bool {
        self.retried
    }

    fn mark_retried(&mut self) {
        self.retried = true;
    }
}

/// Side effect run when the session is lost mid-request.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self);
}

impl<F> Navigator for F
where
    F: Fn() + Send + Sync,
{
    fn redirect_to_login(&self) {
        self()
    }
}

/// Opens the frontend login page in the user's browser
pub struct BrowserNavigator {
    login_url: String,
}

impl BrowserNavigator {
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
        }
    }
}

impl Navigator for BrowserNavigator {
    fn redirect_to_login(&self) {
        if let Err(e) = open::that(&self.login_url) {
            tracing::warn!(url = %self.login_url, "Failed to open login page: {}", e);
        }
    }
}

/// Sends bearer requests and recovers once from an expired access token.
///
/// A 401 triggers a (shared) refresh and a single retry with the new access
/// token. If the refresh fails the session is logged out and the navigator
/// is sent to the login page.
#[derive(Clone)]
pub struct RequestInterceptor {
    session: SessionManager,
}

impl RequestInterceptor {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub async fn send(&self, mut request: OutboundRequest) -> Result<Response, AuthError> {
        let mut access_token = self.session.get_token().ok_or(AuthError::NotAuthenticated)?;

        loop {
            let err = match self.session.client().execute(&request, &access_token).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            if !err.is_unauthorized() {
                return Err(err.into());
            }
            if request.retried() {
                tracing::debug!(request = %request.id(), "Retried request rejected again");
                return Err(AuthError::Unauthorized);
            }

            request.mark_retried();
            tracing::debug!(
                request = %request.id(),
                path = request.path(),
                "Access token rejected, refreshing"
            );

            match self.session.refresh_after_rejection(&access_token).await {
                Ok(pair) => access_token = pair.access_token,
                Err(refresh_err) => {
                    if self.session.force_logout(&access_token) {
                        self.session.navigator().redirect_to_login();
                    }
                    return Err(refresh_err);
                }
            }
        }
    }

    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: OutboundRequest,
    ) -> Result<T, AuthError> {
        Ok(self.send(request).await?.json::<T>().await?)
    }

    pub async fn send_empty(&self, request: OutboundRequest) -> Result<(), AuthError> {
        self.send(request).await?;
        Ok(())
    }
}
