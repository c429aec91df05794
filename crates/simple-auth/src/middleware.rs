//! Authentication middleware.
//!
//! Both middleware must come after the session middleware, and
//! [`ForcePasswordChangeMiddleware`] after [`AuthenticationMiddleware`]:
//!
//! ```text
//! SessionMiddleware -> AuthenticationMiddleware -> ForcePasswordChangeMiddleware -> view
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use simple_auth_core::settings::AuthSettings;
use simple_auth_core::{AuthError, AuthResult};
use simple_auth_http::middleware::Middleware;
use simple_auth_http::{HttpRequest, HttpResponse, HttpResponseRedirect};

use crate::backends::{get_user_from_session, AuthBackend, RequestUserExt};

/// Attaches the user recorded in the session to the request.
pub struct AuthenticationMiddleware {
    backend: Arc<dyn AuthBackend>,
    secret_key: String,
}

impl std::fmt::Debug for AuthenticationMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationMiddleware")
            .field("backend", &self.backend.path())
            .finish_non_exhaustive()
    }
}

impl AuthenticationMiddleware {
    pub fn new(backend: Arc<dyn AuthBackend>, secret_key: impl Into<String>) -> Self {
        Self {
            backend,
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl Middleware for AuthenticationMiddleware {
    async fn process_request(&self, request: &mut HttpRequest) -> AuthResult<Option<HttpResponse>> {
        let session = request.require_session()?.clone();
        match get_user_from_session(&session, self.backend.as_ref(), &self.secret_key).await? {
            Some(user) => request.set_user(user),
            None => request.clear_user(),
        }
        Ok(None)
    }
}

/// Keeps users flagged with `force_password_change` out of the admin until
/// they have picked a new password.
///
/// Any admin URL other than the password-change URL (and the URLs below it)
/// redirects to the password-change URL. Non-admin URLs are left alone.
#[derive(Debug, Clone)]
pub struct ForcePasswordChangeMiddleware {
    change_url_name: String,
    admin_namespace: String,
}

impl Default for ForcePasswordChangeMiddleware {
    fn default() -> Self {
        Self::from_settings(&AuthSettings::default())
    }
}

impl ForcePasswordChangeMiddleware {
    pub fn new(change_url_name: impl Into<String>, admin_namespace: impl Into<String>) -> Self {
        Self {
            change_url_name: change_url_name.into(),
            admin_namespace: admin_namespace.into(),
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(&settings.password_change_url_name, &settings.admin_namespace)
    }

    /// The redirect for `request`, or `None` to let it through.
    pub fn check(&self, request: &HttpRequest) -> AuthResult<Option<HttpResponse>> {
        if !request.user().is_some_and(|user| user.force_password_change) {
            return Ok(None);
        }

        let urlconf = request.require_urlconf()?;
        let change_url = urlconf.reverse(&self.change_url_name, &HashMap::new())?;
        let path = request.path();
        let resolved = urlconf.resolve(path.strip_prefix('/').unwrap_or(path))?;

        let is_admin_url = resolved.app_name() == self.admin_namespace;
        // The trailing character of the change URL is optional.
        let change_pattern = Regex::new(&format!("^{}?", regex::escape(&change_url)))
            .map_err(|e| {
                AuthError::InternalServerError(format!("Invalid change URL pattern: {e}"))
            })?;
        let is_change_url = change_pattern.is_match(path);

        if is_admin_url && !is_change_url {
            tracing::info!(
                user_id = request.user().and_then(|u| u.id),
                path,
                "redirecting to forced password change"
            );
            return Ok(Some(HttpResponseRedirect::new(&change_url)));
        }
        Ok(None)
    }
}

#[async_trait]
impl Middleware for ForcePasswordChangeMiddleware {
    async fn process_request(&self, request: &mut HttpRequest) -> AuthResult<Option<HttpResponse>> {
        self.check(request)
    }
}
