use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::client::auth_client::{AuthClientError, ServerAuthClient};
use crate::client::broadcaster::{AuthStateBroadcaster, Subscription};
use crate::client::config::Settings;
use crate::client::interceptor::{BrowserNavigator, Navigator, OutboundRequest, RequestInterceptor};
use crate::client::token_storage::{FileTokenStore, TokenStore};
use crate::client::validators;
use crate::common::{
    ChangePasswordData, GoogleRegisterData, LoginData, RegisterData, Registration, TokenPair, User,
};
use crate::error::AuthError;

type RefreshOutcome = Result<TokenPair, Arc<AuthError>>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlightRefresh {
    id: u64,
    outcome: SharedRefresh,
}

struct Inner {
    client: ServerAuthClient,
    store: Arc<dyn TokenStore>,
    broadcaster: AuthStateBroadcaster,
    navigator: Arc<dyn Navigator>,
    refresh_flight: Mutex<Option<InFlightRefresh>>,
    next_flight: AtomicU64,
}

impl Inner {
    fn flight(&self) -> MutexGuard<'_, Option<InFlightRefresh>> {
        self.refresh_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release_flight(&self, id: u64) {
        let mut slot = self.flight();
        if slot.as_ref().is_some_and(|flight| flight.id == id) {
            *slot = None;
        }
    }

    fn store_session(&self, pair: &TokenPair) -> Result<(), AuthError> {
        self.store.save(pair)?;
        self.broadcaster.notify();
        Ok(())
    }

    fn load_pair(&self) -> Option<TokenPair> {
        match self.store.load() {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("Failed to read stored tokens: {}", e);
                None
            }
        }
    }
}

/// Owner of the session: the only writer of the token store.
///
/// Cloning is cheap and every clone drives the same session. Authenticated
/// state is never cached; it is read from the store on each query.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        client: ServerAuthClient,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                broadcaster: AuthStateBroadcaster::new(),
                navigator,
                refresh_flight: Mutex::new(None),
                next_flight: AtomicU64::new(1),
            }),
        }
    }

    /// File-backed session that opens the frontend login page on expiry
    pub fn from_settings(settings: &Settings) -> Result<Self, AuthError> {
        let client = ServerAuthClient::new(settings.api_url.clone(), settings.request_timeout())?;
        let store: Arc<dyn TokenStore> = match &settings.token_path {
            Some(path) => Arc::new(FileTokenStore::at(path)?),
            None => Arc::new(FileTokenStore::new()?),
        };
        let navigator = Arc::new(BrowserNavigator::new(settings.login_url()));

        Ok(Self::new(client, store, navigator))
    }

    pub fn client(&self) -> &ServerAuthClient {
        &self.inner.client
    }

    pub fn broadcaster(&self) -> &AuthStateBroadcaster {
        &self.inner.broadcaster
    }

    pub fn navigator(&self) -> &dyn Navigator {
        self.inner.navigator.as_ref()
    }

    pub fn interceptor(&self) -> RequestInterceptor {
        RequestInterceptor::new(self.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.load_pair().is_some()
    }

    pub fn get_token(&self) -> Option<String> {
        self.inner.load_pair().map(|pair| pair.access_token)
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.broadcaster.subscribe(listener)
    }

    pub fn google_login_url(&self) -> String {
        self.inner.client.google_login_url()
    }

    pub async fn login(&self, credentials: &LoginData) -> Result<TokenPair, AuthError> {
        let pair = self
            .inner
            .client
            .login(credentials)
            .await
            .map_err(|e| match e.status().map(|status| status.as_u16()) {
                Some(400 | 401) => AuthError::InvalidCredentials(e.into_messages().join("; ")),
                Some(422) => AuthError::ValidationFailed(e.into_messages()),
                _ => e.into(),
            })?;

        self.inner.store_session(&pair)?;
        tracing::info!("Logged in");
        Ok(pair)
    }

    /// Register an account. The session only becomes authenticated when the
    /// server includes a token in its response.
    pub async fn register(&self, data: &RegisterData) -> Result<Registration, AuthError> {
        validators::validate_registration(data)?;

        let registration = self
            .inner
            .client
            .register(data)
            .await
            .map_err(validation_error)?;

        match &registration.token {
            Some(pair) => {
                self.inner.store_session(pair)?;
                tracing::info!("Registered and logged in");
            }
            None => tracing::info!("Registered without a session token"),
        }
        Ok(registration)
    }

    pub async fn complete_google_registration(
        &self,
        data: &GoogleRegisterData,
    ) -> Result<TokenPair, AuthError> {
        validators::validate_google_registration(data)?;

        let pair = self
            .inner
            .client
            .complete_google_register(data)
            .await
            .map_err(validation_error)?;

        self.inner.store_session(&pair)?;
        tracing::info!("Google registration completed");
        Ok(pair)
    }

    /// Accept the tokens the OAuth redirect carries, either as a bare
    /// `token=...&refresh_token=...` fragment or as the full callback URL
    /// with the pair in its query string or fragment.
    pub fn complete_oauth_callback(&self, fragment: &str) -> Result<TokenPair, AuthError> {
        let pair = parse_callback_fragment(fragment)?;
        self.inner.store_session(&pair)?;
        tracing::info!("OAuth sign-in completed");
        Ok(pair)
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// At most one refresh call is in flight; concurrent callers share its
    /// outcome. The exchange runs on its own task and finishes even if every
    /// caller goes away.
    pub async fn refresh(&self) -> Result<TokenPair, AuthError> {
        let outcome = {
            let mut slot = self.inner.flight();
            let existing = slot
                .as_ref()
                .map(|flight| (flight.id, flight.outcome.clone()));

            match existing {
                Some((id, outcome)) => {
                    tracing::debug!(flight = id, "Joining in-flight token refresh");
                    outcome
                }
                None => {
                    let refresh_token = self
                        .inner
                        .store
                        .load()?
                        .map(|pair| pair.refresh_token)
                        .filter(|token| !token.is_empty())
                        .ok_or(AuthError::NoRefreshToken)?;

                    let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
                    let outcome = spawn_refresh(Arc::clone(&self.inner), id, refresh_token);
                    *slot = Some(InFlightRefresh {
                        id,
                        outcome: outcome.clone(),
                    });
                    outcome
                }
            }
        };

        outcome.await.map_err(AuthError::RefreshFailed)
    }

    /// New credentials for a request whose `rejected_token` got a 401. If the
    /// store already holds a different access token, some other request has
    /// refreshed in the meantime and that token is reused.
    pub(crate) async fn refresh_after_rejection(
        &self,
        rejected_token: &str,
    ) -> Result<TokenPair, AuthError> {
        if let Some(current) = self.inner.load_pair() {
            if current.access_token != rejected_token {
                tracing::debug!("Access token already replaced, reusing it");
                return Ok(current);
            }
        }
        self.refresh().await
    }

    /// Log out after a failed refresh, unless the store has moved on from the
    /// rejected session. Returns whether a logout happened.
    pub(crate) fn force_logout(&self, rejected_token: &str) -> bool {
        let holds_rejected = self
            .inner
            .load_pair()
            .is_some_and(|pair| pair.access_token == rejected_token);
        if !holds_rejected {
            tracing::debug!("Session already replaced or cleared, skipping forced logout");
            return false;
        }

        tracing::warn!("Session expired, logging out");
        if let Err(e) = self.logout() {
            tracing::warn!("Failed to clear expired session: {}", e);
        }
        true
    }

    pub async fn change_password(&self, data: &ChangePasswordData) -> Result<(), AuthError> {
        validators::validate_password_change(data)?;

        let request = OutboundRequest::post("/auth/change-password").json(data)?;
        self.interceptor()
            .send_empty(request)
            .await
            .map_err(|e| match e {
                AuthError::Api { status, messages }
                    if status == StatusCode::BAD_REQUEST
                        || status == StatusCode::UNPROCESSABLE_ENTITY =>
                {
                    AuthError::ValidationFailed(messages)
                }
                other => other,
            })?;

        tracing::info!("Password changed");
        Ok(())
    }

    pub async fn get_current_user(&self) -> Result<User, AuthError> {
        self.interceptor()
            .send_json(OutboundRequest::get("/auth/me"))
            .await
    }

    pub fn logout(&self) -> Result<(), AuthError> {
        self.inner.store.clear()?;
        self.inner.broadcaster.notify();
        tracing::info!("Logged out");
        Ok(())
    }
}

fn validation_error(err: AuthClientError) -> AuthError {
    match err.status().map(|status| status.as_u16()) {
        Some(400 | 422) => AuthError::ValidationFailed(err.into_messages()),
        _ => err.into(),
    }
}

fn spawn_refresh(inner: Arc<Inner>, id: u64, refresh_token: String) -> SharedRefresh {
    tracing::debug!(flight = id, "Starting token refresh");

    let task_inner = Arc::clone(&inner);
    let handle = tokio::spawn(async move {
        let outcome = match task_inner.client.refresh_token(&refresh_token).await {
            Ok(pair) => match task_inner.store_session(&pair) {
                Ok(()) => {
                    tracing::info!(flight = id, "Token refreshed");
                    Ok(pair)
                }
                Err(e) => Err(Arc::new(e)),
            },
            Err(e) => {
                tracing::warn!(flight = id, "Token refresh rejected: {}", e);
                Err(Arc::new(AuthError::from(e)))
            }
        };
        task_inner.release_flight(id);
        outcome
    });

    async move {
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                inner.release_flight(id);
                Err(Arc::new(AuthError::Task(e.to_string())))
            }
        }
    }
    .boxed()
    .shared()
}

fn parse_callback_fragment(input: &str) -> Result<TokenPair, AuthError> {
    let input = input.trim();

    // The backend redirects with the pair in the query string; the web
    // frontend forwards it in the fragment. Both shapes are accepted.
    let params: Vec<(String, String)> = if input.contains("://") {
        let url = url::Url::parse(input)
            .map_err(|e| AuthError::InvalidCallback(format!("invalid callback URL: {}", e)))?;
        match url.fragment().filter(|fragment| !fragment.is_empty()) {
            Some(fragment) => url::form_urlencoded::parse(fragment.as_bytes())
                .into_owned()
                .collect(),
            None => url.query_pairs().into_owned().collect(),
        }
    } else {
        let params = input.trim_start_matches(['#', '?']);
        url::form_urlencoded::parse(params.as_bytes())
            .into_owned()
            .collect()
    };

    let mut access_token = None;
    let mut refresh_token = None;
    for (key, value) in params {
        match key.as_str() {
            "token" => access_token = Some(value),
            "refresh_token" => refresh_token = Some(value),
            _ => {}
        }
    }

    match (access_token, refresh_token) {
        (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
            Ok(TokenPair::bearer(access, refresh))
        }
        _ => Err(AuthError::InvalidCallback(
            "callback must carry token and refresh_token".to_string(),
        )),
    }
}
