//! End-to-end tests of session login and forced password changes through the
//! middleware pipeline:
//!
//! `SessionMiddleware -> AuthenticationMiddleware -> ForcePasswordChangeMiddleware`

use std::sync::Arc;

use http::{Method, StatusCode};

use simple_auth::backends::{login, AuthBackend, ModelBackend, RequestUserExt};
use simple_auth::hashers::{PasswordHashers, Pbkdf2Hasher};
use simple_auth::manager::{ExtraFields, UserManager};
use simple_auth::middleware::{AuthenticationMiddleware, ForcePasswordChangeMiddleware};
use simple_auth::store::{InMemoryStore, Store, UserStore};
use simple_auth_core::{AuthError, Settings};
use simple_auth_http::server::Application;
use simple_auth_http::session::{InMemorySessionBackend, SessionMiddleware};
use simple_auth_http::urls::{include, path, root, RouteHandler, URLEntry};
use simple_auth_http::{HttpRequest, HttpResponse};

const SECRET: &str = "pipeline-secret";

// ── Helpers ──────────────────────────────────────────────────────────

struct Harness {
    app: Application,
    store: Arc<dyn Store>,
}

fn whoami() -> RouteHandler {
    Arc::new(|req: HttpRequest| {
        Box::pin(async move {
            let who = req.user().map_or_else(|| "anonymous".to_string(), |u| u.email.clone());
            Ok(HttpResponse::ok(who))
        })
    })
}

fn login_view(backend: Arc<ModelBackend>) -> RouteHandler {
    Arc::new(move |mut req: HttpRequest| {
        let backend = backend.clone();
        Box::pin(async move {
            let email = req.post().get("email").unwrap_or_default().to_string();
            let password = req.post().get("password").unwrap_or_default().to_string();
            let user = backend
                .authenticate(&email, &password)
                .await?
                .ok_or_else(|| AuthError::PermissionDenied("bad credentials".into()))?;
            login(&mut req, &user, backend.as_ref(), SECRET).await?;
            Ok(HttpResponse::ok("logged in"))
        })
    })
}

async fn harness(force_password_change: bool) -> Harness {
    let hashers = PasswordHashers::new(vec![Arc::new(Pbkdf2Hasher { iterations: 1000 })]).unwrap();
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let mut admin = UserManager::new(store.clone())
        .with_hashers(hashers.clone())
        .create_superuser("admin@example.com", Some("password"), ExtraFields::new())
        .await
        .unwrap();
    admin.force_password_change = force_password_change;
    store.save_user(&mut admin).await.unwrap();
    let backend = Arc::new(ModelBackend::new(store.clone()).with_hashers(hashers));

    let admin = include(
        "admin/",
        vec![
            URLEntry::Pattern(path("", whoami(), Some("index")).unwrap()),
            URLEntry::Pattern(path("password_change/", whoami(), Some("password_change")).unwrap()),
            URLEntry::Pattern(
                path("password_change/done/", whoami(), Some("password_change_done")).unwrap(),
            ),
            URLEntry::Pattern(
                path(
                    "simple_authentication/user/",
                    whoami(),
                    Some("simple_authentication_user_changelist"),
                )
                .unwrap(),
            ),
        ],
        Some("admin"),
        Some("admin"),
    )
    .unwrap();
    let urls = root(vec![
        URLEntry::Pattern(path("", whoami(), Some("home")).unwrap()),
        URLEntry::Pattern(path("login/", login_view(backend.clone()), Some("login")).unwrap()),
        URLEntry::Resolver(admin),
    ])
    .unwrap();

    let settings = Settings {
        secret_key: SECRET.into(),
        ..Settings::default()
    };
    let app = Application::new(settings.clone(), urls)
        .middleware(SessionMiddleware::new(
            Arc::new(InMemorySessionBackend::new()),
            settings.session.clone(),
        ))
        .middleware(AuthenticationMiddleware::new(backend, SECRET))
        .middleware(ForcePasswordChangeMiddleware::from_settings(&settings.auth));

    Harness { app, store }
}

fn session_cookie(response: &HttpResponse) -> String {
    response
        .headers()
        .get(http::header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

async fn log_in(h: &Harness) -> String {
    let response = h
        .app
        .handle(
            HttpRequest::builder()
                .method(Method::POST)
                .path("/login/")
                .form(&[("email", "ADMIN@example.com"), ("password", "password")])
                .build(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK, "{}", response.text());
    session_cookie(&response)
}

async fn get(h: &Harness, path: &str, cookie: Option<&str>) -> HttpResponse {
    let mut builder = HttpRequest::builder().path(path);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    h.app.handle(builder.build()).await
}

// ═══════════════════════════════════════════════════════════════════════
// 1. Session authentication
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn anonymous_requests_carry_no_user() {
    let h = harness(false).await;
    let response = get(&h, "/", None).await;
    assert_eq!(response.text(), "anonymous");
}

#[tokio::test]
async fn login_persists_across_requests() {
    let h = harness(false).await;
    let cookie = log_in(&h).await;

    let response = get(&h, "/admin/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), "admin@example.com");
}

#[tokio::test]
async fn wrong_credentials_are_forbidden() {
    let h = harness(false).await;
    let response = h
        .app
        .handle(
            HttpRequest::builder()
                .method(Method::POST)
                .path("/login/")
                .form(&[("email", "admin@example.com"), ("password", "nope")])
                .build(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn deactivated_user_loses_session() {
    let h = harness(false).await;
    let cookie = log_in(&h).await;

    let mut user = h.store.get_user_by_email("admin@example.com").await.unwrap().unwrap();
    user.is_active = false;
    h.store.save_user(&mut user).await.unwrap();

    assert_eq!(get(&h, "/", Some(&cookie)).await.text(), "anonymous");
}

// ═══════════════════════════════════════════════════════════════════════
// 2. Forced password change
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn flagged_user_is_redirected_from_admin_pages() {
    let h = harness(true).await;
    let cookie = log_in(&h).await;

    for path in ["/admin/", "/admin/simple_authentication/user/"] {
        let response = get(&h, path, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND, "{path}");
        assert_eq!(response.location(), Some("/admin/password_change/"), "{path}");
    }
}

#[tokio::test]
async fn flagged_user_reaches_change_pages_and_the_rest_of_the_site() {
    let h = harness(true).await;
    let cookie = log_in(&h).await;

    for path in ["/admin/password_change/", "/admin/password_change/done/", "/"] {
        let response = get(&h, path, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        assert_eq!(response.text(), "admin@example.com", "{path}");
    }
}

#[tokio::test]
async fn flagged_user_on_unknown_path_gets_not_found() {
    let h = harness(true).await;
    let cookie = log_in(&h).await;
    let response = get(&h, "/nowhere/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn clearing_the_flag_restores_admin_access() {
    let h = harness(true).await;
    let cookie = log_in(&h).await;

    let mut user = h.store.get_user_by_email("admin@example.com").await.unwrap().unwrap();
    user.force_password_change = false;
    h.store.save_user(&mut user).await.unwrap();

    let response = get(&h, "/admin/", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn anonymous_admin_requests_are_not_redirected() {
    let h = harness(true).await;
    let response = get(&h, "/admin/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), "anonymous");
}
