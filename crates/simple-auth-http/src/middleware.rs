//! The middleware pipeline.
//!
//! Middleware runs in order for requests and in reverse order for responses
//! (the "onion" model). A middleware may answer a request itself, or fail it;
//! failures, from middleware or from the view, go through `process_exception`
//! in reverse order and fall back to [`HttpResponse::from_error`].

use async_trait::async_trait;

use simple_auth_core::{AuthError, AuthResult};

use crate::{HttpRequest, HttpResponse};

/// The view invoked at the center of the pipeline.
pub type ViewHandler = Box<dyn Fn(HttpRequest) -> crate::BoxFuture + Send + Sync>;

/// A component that can intercept requests and responses.
///
/// Every hook has a pass-through default.
///
/// ```
/// use async_trait::async_trait;
/// use simple_auth_core::AuthResult;
/// use simple_auth_http::middleware::Middleware;
/// use simple_auth_http::{HttpRequest, HttpResponse};
///
/// struct Maintenance;
///
/// #[async_trait]
/// impl Middleware for Maintenance {
///     async fn process_request(&self, _request: &mut HttpRequest) -> AuthResult<Option<HttpResponse>> {
///         Ok(Some(HttpResponse::new(http::StatusCode::SERVICE_UNAVAILABLE, "Back soon")))
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Runs before the view. `Ok(Some(response))` short-circuits the pipeline.
    async fn process_request(
        &self,
        _request: &mut HttpRequest,
    ) -> AuthResult<Option<HttpResponse>> {
        Ok(None)
    }

    /// Runs after the view, in reverse order.
    async fn process_response(
        &self,
        _request: &HttpRequest,
        response: HttpResponse,
    ) -> HttpResponse {
        response
    }

    /// Converts an error into a response; `None` defers to the next middleware.
    async fn process_exception(
        &self,
        _request: &HttpRequest,
        _error: &AuthError,
    ) -> Option<HttpResponse> {
        None
    }
}

/// An ordered list of middleware.
#[derive(Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("middleware_count", &self.middlewares.len())
            .finish()
    }
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, middleware: impl Middleware + 'static) {
        self.middlewares.push(Box::new(middleware));
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs `request` through the middleware and `handler`.
    pub async fn process(&self, mut request: HttpRequest, handler: &ViewHandler) -> HttpResponse {
        for (i, mw) in self.middlewares.iter().enumerate() {
            let response = match mw.process_request(&mut request).await {
                Ok(None) => continue,
                Ok(Some(response)) => response,
                Err(error) => self.handle_error(&request, &error, i + 1).await,
            };
            return self.respond(&request, response, i + 1).await;
        }

        let response = match handler(request.clone()).await {
            Ok(response) => response,
            Err(error) => self.handle_error(&request, &error, self.middlewares.len()).await,
        };
        self.respond(&request, response, self.middlewares.len()).await
    }

    /// Offers `error` to the first `depth` middleware, innermost first.
    async fn handle_error(
        &self,
        request: &HttpRequest,
        error: &AuthError,
        depth: usize,
    ) -> HttpResponse {
        for mw in self.middlewares[..depth].iter().rev() {
            if let Some(response) = mw.process_exception(request, error).await {
                return response;
            }
        }
        if error.status_code() >= 500 {
            tracing::error!(error = %error, path = request.path(), "request failed");
        } else {
            tracing::debug!(error = %error, path = request.path(), "request rejected");
        }
        HttpResponse::from_error(error)
    }

    /// Runs `process_response` of the first `depth` middleware, innermost first.
    async fn respond(
        &self,
        request: &HttpRequest,
        response: HttpResponse,
        depth: usize,
    ) -> HttpResponse {
        let mut response = response;
        for mw in self.middlewares[..depth].iter().rev() {
            response = mw.process_response(request, response).await;
        }
        response
    }
}
