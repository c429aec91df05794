//! # simple-auth-http
//!
//! The HTTP layer for simple-authentication: request and response types, URL
//! routing with namespaces, sessions, the middleware pipeline and the axum
//! application.
//!
//! ## Modules
//!
//! - [`request`] - [`HttpRequest`] and its builder
//! - [`response`] - [`HttpResponse`], [`JsonResponse`], [`HttpResponseRedirect`]
//! - [`querydict`] - Multi-valued GET/POST parameters
//! - [`urls`] - `path()` routes, `include()`, resolution and reversing
//! - [`middleware`] - The [`Middleware`](middleware::Middleware) trait and pipeline
//! - [`session`] - Session handles, backends and the session middleware
//! - [`server`] - [`Application`](server::Application), the axum entry point

use std::future::Future;
use std::pin::Pin;

use simple_auth_core::AuthResult;

pub mod middleware;
pub mod querydict;
pub mod request;
pub mod response;
pub mod server;
pub mod session;
pub mod urls;

pub use querydict::QueryDict;
pub use request::HttpRequest;
pub use response::{HttpResponse, HttpResponseRedirect, JsonResponse};
pub use session::Session;

/// The future returned by a view.
pub type BoxFuture = Pin<Box<dyn Future<Output = AuthResult<HttpResponse>> + Send>>;
