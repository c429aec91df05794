//! Sessions.
//!
//! A [`Session`] is a shared handle: the [`SessionMiddleware`] attaches it to
//! the request, views and other middleware read and write through it, and the
//! middleware persists whatever state it holds once the response comes back.
//!
//! ## Backends
//!
//! - [`InMemorySessionBackend`] keeps sessions in a process-local map.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use simple_auth_core::settings::SessionSettings;
use simple_auth_core::{AuthError, AuthResult};

use crate::middleware::Middleware;
use crate::{HttpRequest, HttpResponse};

/// Generates a random 32-character session key.
pub fn generate_session_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

/// Persisted session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub session_key: String,
    pub data: HashMap<String, serde_json::Value>,
    pub expire_date: DateTime<Utc>,
}

impl SessionData {
    /// Creates an empty session that expires after `lifetime_seconds`.
    pub fn with_lifetime(session_key: String, lifetime_seconds: i64) -> Self {
        Self {
            session_key,
            data: HashMap::new(),
            expire_date: Utc::now() + Duration::seconds(lifetime_seconds),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expire_date
    }
}

#[derive(Debug)]
struct SessionState {
    data: SessionData,
    modified: bool,
    is_new: bool,
    /// Keys that must be removed from the backend when the session is saved.
    stale_keys: Vec<String>,
}

/// A session shared between the middleware and the view.
///
/// Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<RwLock<SessionState>>,
}

impl Session {
    /// Wraps a loaded session.
    pub fn from_data(data: SessionData) -> Self {
        Self::wrap(data, false)
    }

    /// Creates a fresh session with a new key.
    pub fn new_empty(lifetime_seconds: i64) -> Self {
        Self::wrap(
            SessionData::with_lifetime(generate_session_key(), lifetime_seconds),
            true,
        )
    }

    fn wrap(data: SessionData, is_new: bool) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState {
                data,
                modified: false,
                is_new,
                stale_keys: Vec::new(),
            })),
        }
    }

    pub async fn session_key(&self) -> String {
        self.state.read().await.data.session_key.clone()
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.state.read().await.data.data.get(key).cloned()
    }

    /// Returns the value under `key` when it is a JSON string.
    pub async fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .await
            .and_then(|v| v.as_str().map(ToString::to_string))
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.state.read().await.data.data.contains_key(key)
    }

    pub async fn set(&self, key: &str, value: serde_json::Value) {
        let mut state = self.state.write().await;
        state.data.data.insert(key.to_string(), value);
        state.modified = true;
    }

    pub async fn remove(&self, key: &str) -> Option<serde_json::Value> {
        let mut state = self.state.write().await;
        let removed = state.data.data.remove(key);
        if removed.is_some() {
            state.modified = true;
        }
        removed
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.data.data.is_empty()
    }

    pub async fn is_modified(&self) -> bool {
        self.state.read().await.modified
    }

    /// Drops all data and moves the session to a new key.
    pub async fn flush(&self) {
        let mut state = self.state.write().await;
        state.data.data.clear();
        Self::rotate(&mut state);
    }

    /// Keeps the data but moves the session to a new key.
    pub async fn cycle_key(&self) {
        let mut state = self.state.write().await;
        Self::rotate(&mut state);
    }

    fn rotate(state: &mut SessionState) {
        let old = std::mem::replace(&mut state.data.session_key, generate_session_key());
        if !state.is_new {
            state.stale_keys.push(old);
        }
        state.modified = true;
    }

    /// Returns a copy of the current data.
    pub async fn snapshot(&self) -> SessionData {
        self.state.read().await.data.clone()
    }
}

/// Storage for session data.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Loads a live session; expired or unknown keys are `DoesNotExist`.
    async fn load(&self, session_key: &str) -> AuthResult<SessionData>;

    async fn save(&self, session: &SessionData) -> AuthResult<()>;

    async fn delete(&self, session_key: &str) -> AuthResult<()>;

    async fn exists(&self, session_key: &str) -> AuthResult<bool>;

    async fn clear_expired(&self) -> AuthResult<()>;
}

/// A process-local session backend.
#[derive(Debug, Default, Clone)]
pub struct InMemorySessionBackend {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
}

impl InMemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionBackend for InMemorySessionBackend {
    async fn load(&self, session_key: &str) -> AuthResult<SessionData> {
        self.sessions
            .read()
            .await
            .get(session_key)
            .filter(|s| !s.is_expired())
            .cloned()
            .ok_or_else(|| AuthError::DoesNotExist(format!("Session '{session_key}'")))
    }

    async fn save(&self, session: &SessionData) -> AuthResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_key.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_key: &str) -> AuthResult<()> {
        self.sessions.write().await.remove(session_key);
        Ok(())
    }

    async fn exists(&self, session_key: &str) -> AuthResult<bool> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_key)
            .is_some_and(|s| !s.is_expired()))
    }

    async fn clear_expired(&self) -> AuthResult<()> {
        self.sessions
            .write()
            .await
            .retain(|_, session| !session.is_expired());
        Ok(())
    }
}

/// Loads the session named by the session cookie and saves it after the view.
pub struct SessionMiddleware {
    backend: Arc<dyn SessionBackend>,
    settings: SessionSettings,
}

impl SessionMiddleware {
    pub fn new(backend: Arc<dyn SessionBackend>, settings: SessionSettings) -> Self {
        Self { backend, settings }
    }

    pub fn backend(&self) -> &dyn SessionBackend {
        self.backend.as_ref()
    }

    fn lifetime(&self) -> i64 {
        i64::try_from(self.settings.cookie_age).unwrap_or(i64::MAX / 2)
    }

    fn build_set_cookie(&self, value: &str, max_age: u64) -> String {
        let mut cookie = format!("{}={value}", self.settings.cookie_name);
        let _ = write!(cookie, "; Max-Age={max_age}");
        let _ = write!(cookie, "; Path={}", self.settings.cookie_path);
        if self.settings.cookie_httponly {
            cookie.push_str("; HttpOnly");
        }
        if self.settings.cookie_secure {
            cookie.push_str("; Secure");
        }
        if !self.settings.cookie_samesite.is_empty() {
            let _ = write!(cookie, "; SameSite={}", self.settings.cookie_samesite);
        }
        cookie
    }

    fn with_cookie(response: HttpResponse, cookie: &str) -> HttpResponse {
        let mut response = response;
        if let Ok(value) = http::HeaderValue::from_str(cookie) {
            response
                .headers_mut()
                .append(http::header::SET_COOKIE, value);
        }
        response
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    async fn process_request(&self, request: &mut HttpRequest) -> AuthResult<Option<HttpResponse>> {
        let session = match request.cookie(&self.settings.cookie_name) {
            Some(key) => match self.backend.load(&key).await {
                Ok(data) => Session::from_data(data),
                Err(_) => Session::new_empty(self.lifetime()),
            },
            None => Session::new_empty(self.lifetime()),
        };
        request.set_session(session);
        Ok(None)
    }

    async fn process_response(
        &self,
        request: &HttpRequest,
        response: HttpResponse,
    ) -> HttpResponse {
        let Some(session) = request.session() else {
            return response;
        };
        let (data, modified, is_new, stale_keys) = {
            let mut state = session.state.write().await;
            (
                state.data.clone(),
                state.modified,
                state.is_new,
                std::mem::take(&mut state.stale_keys),
            )
        };

        for key in &stale_keys {
            if let Err(e) = self.backend.delete(key).await {
                tracing::warn!(error = %e, "failed to delete stale session");
            }
        }

        if !modified {
            return response;
        }

        if data.data.is_empty() {
            // An emptied session that came from a cookie: expire the cookie.
            if !is_new {
                let cookie = self.build_set_cookie("", 0);
                return Self::with_cookie(response, &cookie);
            }
            return response;
        }

        let mut data = data;
        data.expire_date = Utc::now() + Duration::seconds(self.lifetime());
        if let Err(e) = self.backend.save(&data).await {
            tracing::error!(error = %e, "failed to save session");
            return response;
        }
        let cookie = self.build_set_cookie(&data.session_key, self.settings.cookie_age);
        Self::with_cookie(response, &cookie)
    }
}
