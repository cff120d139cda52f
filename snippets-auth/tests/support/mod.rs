#![allow(dead_code)]

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use snippets_auth::{MemoryTokenStore, ServerAuthClient, SessionManager, TokenPair, TokenStore};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const EMAIL: &str = "a@b.com";
pub const PASSWORD: &str = "Secret1!";
pub const REGISTRATION_TOKEN: &str = "reg-token";

/// In-process stand-in for the snippet manager's auth API
#[derive(Clone, Default)]
pub struct MockAuthApi {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    // (access, refresh) currently accepted by the server
    tokens: Mutex<Option<(String, String)>>,
    issued: AtomicUsize,
    refresh_calls: AtomicUsize,
    me_calls: AtomicUsize,
    refresh_delay_ms: AtomicU64,
    fail_refresh: AtomicBool,
    reject_bearer: AtomicBool,
    register_without_token: AtomicBool,
    seen_bearers: Mutex<Vec<String>>,
}

impl MockAuthApi {
    pub async fn spawn() -> (Self, String) {
        let api = Self::default();
        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/auth/refresh", post(refresh))
            .route("/auth/google/complete-register", post(google_complete))
            .route("/auth/change-password", post(change_password))
            .route("/auth/me", get(me))
            .with_state(api.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (api, format!("http://{}", addr))
    }

    /// Issue a fresh pair and make it the only one the server accepts
    pub fn issue(&self) -> TokenPair {
        let n = self.state.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let pair = TokenPair::bearer(format!("access-{n}"), format!("refresh-{n}"));
        *self.state.tokens.lock().unwrap() =
            Some((pair.access_token.clone(), pair.refresh_token.clone()));
        pair
    }

    /// Invalidate the access token while keeping the refresh token usable
    pub fn expire_access_token(&self) {
        if let Some((access, _)) = self.state.tokens.lock().unwrap().as_mut() {
            *access = "expired".to_string();
        }
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state
            .refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self) {
        self.state.fail_refresh.store(true, Ordering::SeqCst);
    }

    pub fn reject_all_bearer_tokens(&self) {
        self.state.reject_bearer.store(true, Ordering::SeqCst);
    }

    pub fn register_without_token(&self) {
        self.state.register_without_token.store(true, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn me_calls(&self) -> usize {
        self.state.me_calls.load(Ordering::SeqCst)
    }

    pub fn seen_bearers(&self) -> Vec<String> {
        self.state.seen_bearers.lock().unwrap().clone()
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string);

        if let Some(bearer) = &bearer {
            self.state.seen_bearers.lock().unwrap().push(bearer.clone());
        }
        if self.state.reject_bearer.load(Ordering::SeqCst) {
            return false;
        }

        let tokens = self.state.tokens.lock().unwrap();
        matches!((tokens.as_ref(), bearer), (Some((access, _)), Some(bearer)) if *access == bearer)
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn user_json() -> Value {
    json!({
        "id": 1,
        "email": EMAIL,
        "username": "alice",
        "created_at": "2024-03-01T12:00:00",
        "is_active": true,
    })
}

async fn login(State(api): State<MockAuthApi>, Json(body): Json<Value>) -> Response {
    if body["email"] == EMAIL && body["password"] == PASSWORD {
        Json(api.issue()).into_response()
    } else {
        detail(StatusCode::UNAUTHORIZED, "Invalid email or password")
    }
}

async fn register(State(api): State<MockAuthApi>, Json(body): Json<Value>) -> Response {
    if body["email"] == "taken@b.com" {
        return detail(StatusCode::BAD_REQUEST, "User already exists");
    }
    if api.state.register_without_token.load(Ordering::SeqCst) {
        return (StatusCode::CREATED, Json(json!({ "user": user_json() }))).into_response();
    }
    let token = api.issue();
    (
        StatusCode::CREATED,
        Json(json!({ "user": user_json(), "token": token })),
    )
        .into_response()
}

async fn refresh(State(api): State<MockAuthApi>, Json(body): Json<Value>) -> Response {
    api.state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = api.state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let current_refresh = api
        .state
        .tokens
        .lock()
        .unwrap()
        .as_ref()
        .map(|(_, refresh)| refresh.clone());
    let valid = !api.state.fail_refresh.load(Ordering::SeqCst)
        && current_refresh.is_some_and(|refresh| body["refresh_token"] == refresh.as_str());

    if valid {
        Json(api.issue()).into_response()
    } else {
        detail(StatusCode::UNAUTHORIZED, "Invalid refresh token")
    }
}

async fn google_complete(State(api): State<MockAuthApi>, Json(body): Json<Value>) -> Response {
    if body["registration_token"] == REGISTRATION_TOKEN {
        Json(api.issue()).into_response()
    } else {
        detail(StatusCode::BAD_REQUEST, "Invalid token")
    }
}

async fn change_password(
    State(api): State<MockAuthApi>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !api.authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Could not validate credentials");
    }
    if body["old_password"] != PASSWORD {
        return detail(StatusCode::BAD_REQUEST, "Invalid old password");
    }
    Json(json!({ "message": "Password updated successfully" })).into_response()
}

async fn me(State(api): State<MockAuthApi>, headers: HeaderMap) -> Response {
    api.state.me_calls.fetch_add(1, Ordering::SeqCst);
    if !api.authorized(&headers) {
        return detail(StatusCode::UNAUTHORIZED, "Could not validate credentials");
    }
    Json(user_json()).into_response()
}

/// Session wired to the mock, with counters for redirects and notifications
pub struct Harness {
    pub session: SessionManager,
    pub store: Arc<MemoryTokenStore>,
    pub redirects: Arc<AtomicUsize>,
    pub notifications: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new(base_url: &str) -> Self {
        let store = Arc::new(MemoryTokenStore::new());
        let redirects = Arc::new(AtomicUsize::new(0));
        let notifications = Arc::new(AtomicUsize::new(0));

        let client = ServerAuthClient::new(base_url, Duration::from_secs(5)).unwrap();
        let redirect_counter = Arc::clone(&redirects);
        let session = SessionManager::new(
            client,
            Arc::clone(&store) as Arc<dyn TokenStore>,
            Arc::new(move || {
                redirect_counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let notification_counter = Arc::clone(&notifications);
        // kept for the lifetime of the session
        let _subscription = session.subscribe(move || {
            notification_counter.fetch_add(1, Ordering::SeqCst);
        });

        Self {
            session,
            store,
            redirects,
            notifications,
        }
    }

    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }

    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Option<TokenPair> {
        self.store.load().unwrap()
    }
}
