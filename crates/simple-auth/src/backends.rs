//! Authentication backends and session login.
//!
//! [`ModelBackend`] checks an email and password against a [`Store`]. The
//! session side mirrors the classic flow:
//!
//! 1. [`AuthBackend::authenticate`] verifies credentials
//! 2. [`login`] writes the user into the session under three keys
//! 3. [`get_user_from_session`] reloads the user on later requests and
//!    rejects the session when the password has changed since login
//! 4. [`logout`] flushes the session
//!
//! ## Session keys
//!
//! - `_auth_user_id` - the user's primary key, as a string
//! - `_auth_user_backend` - the path of the backend that authenticated the user
//! - `_auth_user_hash` - an HMAC-SHA256 of the password hash, keyed by the secret key

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256};

use simple_auth_core::{AuthError, AuthResult};
use simple_auth_http::{HttpRequest, Session};

use crate::hashers::{constant_time_eq, PasswordHashers};
use crate::store::Store;
use crate::user::User;

/// Session key for the authenticated user's primary key.
pub const SESSION_KEY: &str = "_auth_user_id";
/// Session key for the backend that authenticated the user.
pub const BACKEND_SESSION_KEY: &str = "_auth_user_backend";
/// Session key for the password fingerprint.
pub const HASH_SESSION_KEY: &str = "_auth_user_hash";

const SESSION_HASH_SALT: &str = "simple_authentication.backends.session_auth_hash";

/// A source of users.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// The identifier stored in the session, e.g. `simple_authentication.backends.ModelBackend`.
    fn path(&self) -> &'static str;

    /// Returns the user for valid credentials, `None` otherwise.
    async fn authenticate(&self, email: &str, password: &str) -> AuthResult<Option<User>>;

    /// Loads an active user by primary key.
    async fn get_user(&self, user_id: i64) -> AuthResult<Option<User>>;

    /// Direct and group permissions, as `"app_label.codename"`.
    async fn get_all_permissions(&self, user: &User) -> AuthResult<HashSet<String>>;

    async fn has_perm(&self, user: &User, perm: &str) -> AuthResult<bool> {
        if !user.is_active {
            return Ok(false);
        }
        if user.is_superuser {
            return Ok(true);
        }
        Ok(self.get_all_permissions(user).await?.contains(perm))
    }
}

/// Authenticates against the user [`Store`] by email.
#[derive(Clone)]
pub struct ModelBackend {
    store: Arc<dyn Store>,
    hashers: PasswordHashers,
}

impl std::fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBackend")
            .field("hashers", &self.hashers)
            .finish_non_exhaustive()
    }
}

impl ModelBackend {
    pub const PATH: &'static str = "simple_authentication.backends.ModelBackend";

    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            hashers: PasswordHashers::default(),
        }
    }

    #[must_use]
    pub fn with_hashers(mut self, hashers: PasswordHashers) -> Self {
        self.hashers = hashers;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub const fn hashers(&self) -> &PasswordHashers {
        &self.hashers
    }
}

#[async_trait]
impl AuthBackend for ModelBackend {
    fn path(&self) -> &'static str {
        Self::PATH
    }

    async fn authenticate(&self, email: &str, password: &str) -> AuthResult<Option<User>> {
        let Some(mut user) = self.store.get_user_by_email(email).await? else {
            // Hash anyway so that unknown emails take as long as wrong passwords.
            self.hashers.make_password(Some(password)).await?;
            return Ok(None);
        };
        if !user.check_password_with(password, &self.hashers).await? || !user.is_active {
            return Ok(None);
        }

        if self.hashers.must_update(&user.password) {
            user.password = self.hashers.make_password(Some(password)).await?;
            self.store.save_user(&mut user).await?;
            tracing::debug!(user_id = user.id, "upgraded password hash");
        }
        Ok(Some(user))
    }

    async fn get_user(&self, user_id: i64) -> AuthResult<Option<User>> {
        Ok(self
            .store
            .get_user(user_id)
            .await?
            .filter(|user| user.is_active))
    }

    async fn get_all_permissions(&self, user: &User) -> AuthResult<HashSet<String>> {
        if !user.is_active {
            return Ok(HashSet::new());
        }
        let groups = self.store.groups_named(&user.groups).await?;
        Ok(user.get_all_permissions(&groups))
    }
}

// ── Request user ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RequestUser(User);

/// Access to the authenticated user attached to a request.
///
/// Anonymous requests carry no user.
pub trait RequestUserExt {
    fn user(&self) -> Option<&User>;

    fn set_user(&mut self, user: User);

    fn clear_user(&mut self);

    fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }
}

impl RequestUserExt for HttpRequest {
    fn user(&self) -> Option<&User> {
        self.extensions().get::<RequestUser>().map(|u| &u.0)
    }

    fn set_user(&mut self, user: User) {
        self.extensions_mut().insert(RequestUser(user));
    }

    fn clear_user(&mut self) {
        self.extensions_mut().remove::<RequestUser>();
    }
}

// ── Session login ───────────────────────────────────────────────────

/// The fingerprint stored under [`HASH_SESSION_KEY`].
///
/// Changes whenever the password hash changes, so sessions opened before a
/// password change stop authenticating.
pub fn session_auth_hash(password_hash: &str, secret_key: &str) -> AuthResult<String> {
    let key = Sha256::digest(format!("{SESSION_HASH_SALT}{secret_key}").as_bytes());
    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|e| AuthError::InternalServerError(format!("HMAC key error: {e}")))?;
    mac.update(password_hash.as_bytes());
    Ok(mac
        .finalize()
        .into_bytes()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        }))
}

async fn session_user_id(session: &Session) -> Option<i64> {
    match session.get(SESSION_KEY).await? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Logs `user` into the request's session.
///
/// The session is flushed when it belongs to a different user (or to the same
/// user with another password), and its key is cycled otherwise. The user is
/// attached to the request.
pub async fn login(
    request: &mut HttpRequest,
    user: &User,
    backend: &dyn AuthBackend,
    secret_key: &str,
) -> AuthResult<()> {
    let user_id = user
        .id
        .ok_or_else(|| AuthError::InvalidValue("Cannot log in an unsaved user".into()))?;
    let hash = session_auth_hash(&user.password, secret_key)?;
    let session = request.require_session()?.clone();

    if session.contains_key(SESSION_KEY).await {
        let same_user = session_user_id(&session).await == Some(user_id);
        let same_hash = session
            .get_str(HASH_SESSION_KEY)
            .await
            .is_some_and(|stored| constant_time_eq(stored.as_bytes(), hash.as_bytes()));
        if !same_user || !same_hash {
            session.flush().await;
        }
    } else {
        session.cycle_key().await;
    }

    session
        .set(SESSION_KEY, Value::String(user_id.to_string()))
        .await;
    session
        .set(BACKEND_SESSION_KEY, Value::String(backend.path().to_string()))
        .await;
    session.set(HASH_SESSION_KEY, Value::String(hash)).await;

    request.set_user(user.clone());
    tracing::info!(user_id, backend = backend.path(), "user logged in");
    Ok(())
}

/// Flushes the session and detaches the user.
pub async fn logout(request: &mut HttpRequest) -> AuthResult<()> {
    let user_id = request.user().and_then(|u| u.id);
    request.require_session()?.flush().await;
    request.clear_user();
    tracing::info!(user_id, "user logged out");
    Ok(())
}

/// Loads the user recorded in `session`.
///
/// Returns `None` when nobody is logged in, when another backend logged the
/// user in, when the user is gone or inactive, or when the password changed
/// since login (in which case the session is flushed).
pub async fn get_user_from_session(
    session: &Session,
    backend: &dyn AuthBackend,
    secret_key: &str,
) -> AuthResult<Option<User>> {
    let Some(user_id) = session_user_id(session).await else {
        return Ok(None);
    };
    if session.get_str(BACKEND_SESSION_KEY).await.as_deref() != Some(backend.path()) {
        return Ok(None);
    }
    let Some(user) = backend.get_user(user_id).await? else {
        return Ok(None);
    };

    let expected = session_auth_hash(&user.password, secret_key)?;
    let verified = session
        .get_str(HASH_SESSION_KEY)
        .await
        .is_some_and(|stored| constant_time_eq(stored.as_bytes(), expected.as_bytes()));
    if verified {
        Ok(Some(user))
    } else {
        tracing::debug!(user_id, "session hash mismatch, flushing session");
        session.flush().await;
        Ok(None)
    }
}

/// Keeps the current session valid after `user` changed its own password.
pub async fn update_session_auth_hash(
    request: &mut HttpRequest,
    user: &User,
    secret_key: &str,
) -> AuthResult<()> {
    let session = request.require_session()?.clone();
    session.cycle_key().await;
    if user.id.is_some() && session_user_id(&session).await == user.id {
        session
            .set(
                HASH_SESSION_KEY,
                Value::String(session_auth_hash(&user.password, secret_key)?),
            )
            .await;
        request.set_user(user.clone());
    }
    Ok(())
}
