//! The application: URL configuration, middleware and settings served through axum.
//!
//! ```no_run
//! use std::sync::Arc;
//! use simple_auth_core::Settings;
//! use simple_auth_http::server::Application;
//! use simple_auth_http::urls::{path, root, URLEntry};
//! use simple_auth_http::{HttpRequest, HttpResponse};
//!
//! # async fn example() -> Result<(), simple_auth_core::AuthError> {
//! let handler = Arc::new(|_req: HttpRequest| -> simple_auth_http::BoxFuture {
//!     Box::pin(async { Ok(HttpResponse::ok("Hello")) })
//! });
//! let urls = root(vec![URLEntry::Pattern(path("", handler, Some("home"))?)])?;
//!
//! Application::new(Settings::default(), urls)
//!     .run("127.0.0.1:8000")
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::any;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use simple_auth_core::logging::request_span;
use simple_auth_core::{AuthError, AuthResult, Settings};

use crate::middleware::{Middleware, MiddlewarePipeline, ViewHandler};
use crate::urls::resolver::URLResolver;
use crate::{HttpRequest, HttpResponse};

/// Upper bound on request bodies read into memory.
pub const MAX_BODY_SIZE: usize = 2_621_440;

/// A runnable application.
pub struct Application {
    urlconf: Arc<URLResolver>,
    middleware: MiddlewarePipeline,
    settings: Arc<Settings>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("middleware", &self.middleware)
            .field("debug", &self.settings.debug)
            .finish_non_exhaustive()
    }
}

impl Application {
    pub fn new(settings: Settings, urlconf: URLResolver) -> Self {
        Self {
            urlconf: Arc::new(urlconf),
            middleware: MiddlewarePipeline::new(),
            settings: Arc::new(settings),
        }
    }

    /// Appends a middleware; the first one added sees the request first.
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.add(middleware);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn urlconf(&self) -> &Arc<URLResolver> {
        &self.urlconf
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    /// Serves one request: attaches the URL configuration, runs the pipeline,
    /// resolves the path and calls the matched view.
    pub async fn handle(&self, mut request: HttpRequest) -> HttpResponse {
        request.set_urlconf(self.urlconf.clone());

        let view: ViewHandler = Box::new(|mut request: HttpRequest| {
            Box::pin(async move {
                let urlconf = request.require_urlconf()?.clone();
                let path = request.path().strip_prefix('/').unwrap_or(request.path()).to_string();
                let resolver_match = urlconf.resolve(&path)?;
                let func = resolver_match.func.clone();
                request.set_resolver_match(resolver_match);
                func(request).await
            })
        });

        self.middleware.process(request, &view).await
    }

    /// Converts the application into an axum router answering every path.
    pub fn into_axum_router(self) -> axum::Router {
        let app = Arc::new(self);

        let handler = move |req: Request<Body>| {
            let app = app.clone();
            async move {
                let request_id = uuid::Uuid::new_v4().to_string();
                let span = request_span(&request_id, req.method().as_str(), req.uri().path());
                async move {
                    let (parts, body) = req.into_parts();
                    let response = match axum::body::to_bytes(body, MAX_BODY_SIZE).await {
                        Ok(bytes) => {
                            let request = HttpRequest::from_axum(parts, bytes.to_vec());
                            app.handle(request).await
                        }
                        Err(e) => HttpResponse::from_error(&AuthError::BadRequest(format!(
                            "Failed to read request body: {e}"
                        ))),
                    };
                    tracing::info!(status = response.status().as_u16(), "request finished");
                    response.into_response()
                }
                .instrument(span)
                .await
            }
        };

        axum::Router::new()
            .route("/", any(handler.clone()))
            .route("/{*path}", any(handler))
            .layer(TraceLayer::new_for_http())
    }

    /// Binds `addr` and serves until the process stops.
    pub async fn run(self, addr: &str) -> AuthResult<()> {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            AuthError::ConfigurationError(format!("Failed to bind to {addr}: {e}"))
        })?;
        if self.settings.debug {
            tracing::info!("Starting development server at http://{addr}/");
        }
        axum::serve(listener, self.into_axum_router())
            .await
            .map_err(|e| AuthError::InternalServerError(format!("Server error: {e}")))
    }
}
