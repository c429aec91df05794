//! # simple-authentication
//!
//! A drop-in authentication application: email-keyed users, a forced
//! password change for flagged users, and an admin that can log in as any
//! user.
//!
//! This is the meta-crate. It re-exports the sub-crates and assembles them
//! into a servable [`Application`]:
//!
//! ```text
//! SessionMiddleware -> AuthenticationMiddleware -> ForcePasswordChangeMiddleware -> view
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use simple_authentication::{build_application, core::Settings, auth::open_store};
//!
//! # async fn run() -> simple_authentication::core::AuthResult<()> {
//! let settings = Settings::default();
//! let store = open_store(&settings.database)?;
//! let app = build_application(&settings, store)?;
//! app.run("127.0.0.1:8000").await
//! # }
//! ```

pub mod command;
pub mod commands;

use std::sync::Arc;

use simple_auth::backends::RequestUserExt;
use simple_auth::middleware::{AuthenticationMiddleware, ForcePasswordChangeMiddleware};
use simple_auth::store::Store;
use simple_auth::SimpleAuthenticationConfig;
use simple_auth_admin::AdminContext;
use simple_auth_core::apps::AppRegistry;
use simple_auth_core::{AuthResult, Settings};
use simple_auth_http::server::Application;
use simple_auth_http::session::{InMemorySessionBackend, SessionMiddleware};
use simple_auth_http::urls::{path, root, RouteHandler, URLEntry, URLResolver};
use simple_auth_http::{HttpRequest, JsonResponse};

/// Settings, errors, logging and app configuration.
pub use simple_auth_core as core;

/// Requests, responses, URL routing, middleware and sessions.
pub use simple_auth_http as http;

/// Users, groups, hashing, stores, backends, middleware and forms.
pub use simple_auth as auth;

/// Admin configuration, list views and the hijack action.
pub use simple_auth_admin as admin;

/// Registers and readies the installed apps.
pub fn installed_apps() -> AuthResult<AppRegistry> {
    let mut apps = AppRegistry::new();
    apps.register(Box::new(SimpleAuthenticationConfig))?;
    apps.populate();
    Ok(apps)
}

/// The site home page: who is logged in, if anyone.
fn home() -> RouteHandler {
    Arc::new(|request: HttpRequest| {
        Box::pin(async move {
            let user = request.user();
            Ok(JsonResponse::new(&serde_json::json!({
                "authenticated": user.is_some(),
                "email": user.map(|u| u.email.clone()),
                "name": user.map(|u| u.get_short_name().to_string()),
            })))
        })
    })
}

/// The root URL configuration: the home page at `/` and the admin under
/// `settings.admin.url_prefix`.
pub fn urlpatterns(settings: &Settings, ctx: &Arc<AdminContext>) -> AuthResult<URLResolver> {
    root(vec![
        URLEntry::Pattern(path("", home(), Some("home"))?),
        URLEntry::Resolver(simple_auth_admin::urls(ctx, &settings.admin_prefix())?),
    ])
}

/// Assembles the application over `store`.
pub fn build_application(settings: &Settings, store: Arc<dyn Store>) -> AuthResult<Application> {
    installed_apps()?;
    let ctx = Arc::new(AdminContext::from_settings(settings, store)?);
    build_with_context(settings, ctx)
}

/// Assembles the application around an existing admin context.
///
/// Sessions are verified with the context's secret key.
pub fn build_with_context(settings: &Settings, ctx: Arc<AdminContext>) -> AuthResult<Application> {
    let urls = urlpatterns(settings, &ctx)?;
    let app = Application::new(settings.clone(), urls)
        .middleware(SessionMiddleware::new(
            Arc::new(InMemorySessionBackend::new()),
            settings.session.clone(),
        ))
        .middleware(AuthenticationMiddleware::new(
            ctx.backend.clone(),
            ctx.secret_key.clone(),
        ))
        .middleware(ForcePasswordChangeMiddleware::from_settings(&settings.auth));
    tracing::debug!(middleware = app.middleware_count(), "application assembled");
    Ok(app)
}

#[cfg(test)]
mod tests {
    use simple_auth::store::InMemoryStore;

    use super::*;

    #[test]
    fn test_installed_apps() {
        let apps = installed_apps().unwrap();
        let config = apps.get_app_config("simple_authentication").unwrap();
        assert_eq!(config.verbose_name(), "Authentication");
    }

    #[test]
    fn test_urlpatterns_follow_admin_prefix() {
        let mut settings = Settings::default();
        settings.admin.url_prefix = "/backoffice/".into();
        let store = Arc::new(InMemoryStore::new());
        let ctx = Arc::new(AdminContext::from_settings(&settings, store).unwrap());
        let urls = urlpatterns(&settings, &ctx).unwrap();
        let no_kwargs = std::collections::HashMap::new();
        assert_eq!(
            urls.reverse("admin:password_change", &no_kwargs).unwrap(),
            "/backoffice/password_change/"
        );
        assert_eq!(urls.reverse("home", &no_kwargs).unwrap(), "/");
    }

    #[test]
    fn test_build_application_stacks_three_middleware() {
        let settings = Settings::default();
        let app = build_application(&settings, Arc::new(InMemoryStore::new())).unwrap();
        assert_eq!(app.middleware_count(), 3);
    }
}
