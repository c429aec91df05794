//! HTTP request type.
//!
//! [`HttpRequest`] carries the method, path, headers, GET/POST parameters and
//! server metadata of a request, plus the state middleware attaches to it: the
//! [`Session`], the resolved URL, the root URL configuration, and arbitrary
//! typed values in [`http::Extensions`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::{Extensions, HeaderMap, Method};

use simple_auth_core::{AuthError, AuthResult};

use crate::querydict::QueryDict;
use crate::session::Session;
use crate::urls::resolver::{ResolverMatch, URLResolver};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An HTTP request.
///
/// Cloning is cheap enough for the pipeline to hand the view its own copy;
/// the session handle inside stays shared.
///
/// # Examples
///
/// ```
/// use simple_auth_http::HttpRequest;
///
/// let request = HttpRequest::builder()
///     .method(http::Method::GET)
///     .path("/admin/simple_authentication/user/")
///     .query_string("q=thomas")
///     .build();
///
/// assert_eq!(request.get().get("q"), Some("thomas"));
/// assert_eq!(request.get_full_path(), "/admin/simple_authentication/user/?q=thomas");
/// ```
#[derive(Clone)]
pub struct HttpRequest {
    method: Method,
    path: String,
    query_string: String,
    content_type: Option<String>,
    get: QueryDict,
    post: QueryDict,
    headers: HeaderMap,
    meta: HashMap<String, String>,
    body: Vec<u8>,
    scheme: String,
    resolver_match: Option<ResolverMatch>,
    urlconf: Option<Arc<URLResolver>>,
    session: Option<Session>,
    extensions: Extensions,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query_string", &self.query_string)
            .field("resolver_match", &self.resolver_match)
            .finish_non_exhaustive()
    }
}

impl HttpRequest {
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    /// Creates a request from axum request parts and the collected body.
    pub fn from_axum(parts: http::request::Parts, body: Vec<u8>) -> Self {
        let scheme = if parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "https")
        {
            "https"
        } else {
            "http"
        };

        let mut builder = Self::builder()
            .method(parts.method)
            .path(parts.uri.path())
            .query_string(parts.uri.query().unwrap_or(""))
            .scheme(scheme)
            .body(body);
        builder.headers = parts.headers;
        builder.content_type = builder
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        for (name, value) in &builder.headers {
            if let Ok(v) = value.to_str() {
                builder.meta.insert(
                    format!("HTTP_{}", name.as_str().to_uppercase().replace('-', "_")),
                    v.to_string(),
                );
            }
        }
        let mut request = builder.build();
        request.extensions = parts.extensions;
        request
    }

    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// The path without query string, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Query string parameters.
    pub const fn get(&self) -> &QueryDict {
        &self.get
    }

    /// Form-encoded body parameters.
    pub const fn post(&self) -> &QueryDict {
        &self.post
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub const fn meta(&self) -> &HashMap<String, String> {
        &self.meta
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// Returns the path followed by `?query` when a query string is present.
    pub fn get_full_path(&self) -> String {
        if self.query_string.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query_string)
        }
    }

    /// Reads a cookie from the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|header| header.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }

    // ── Routing ─────────────────────────────────────────────────────

    pub const fn resolver_match(&self) -> Option<&ResolverMatch> {
        self.resolver_match.as_ref()
    }

    pub fn set_resolver_match(&mut self, resolver_match: ResolverMatch) {
        self.resolver_match = Some(resolver_match);
    }

    /// The root URL configuration this request is served under.
    pub fn urlconf(&self) -> Option<&Arc<URLResolver>> {
        self.urlconf.as_ref()
    }

    pub fn set_urlconf(&mut self, urlconf: Arc<URLResolver>) {
        self.urlconf = Some(urlconf);
    }

    /// Returns the URL configuration or a configuration error when none is set.
    pub fn require_urlconf(&self) -> AuthResult<&Arc<URLResolver>> {
        self.urlconf.as_ref().ok_or_else(|| {
            AuthError::ConfigurationError("No URL configuration attached to the request".into())
        })
    }

    // ── Session ─────────────────────────────────────────────────────

    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    /// Returns the session or a configuration error when the session
    /// middleware has not run.
    pub fn require_session(&self) -> AuthResult<&Session> {
        self.session.as_ref().ok_or_else(|| {
            AuthError::ConfigurationError(
                "The session middleware must run before this component".into(),
            )
        })
    }

    // ── Extensions ──────────────────────────────────────────────────

    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

/// Builder for [`HttpRequest`], used by tests and by [`HttpRequest::from_axum`].
#[derive(Debug)]
pub struct HttpRequestBuilder {
    method: Method,
    path: String,
    query_string: String,
    content_type: Option<String>,
    headers: HeaderMap,
    meta: HashMap<String, String>,
    body: Vec<u8>,
    scheme: String,
}

impl Default for HttpRequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_string(),
            query_string: String::new(),
            content_type: None,
            headers: HeaderMap::new(),
            meta: HashMap::new(),
            body: Vec::new(),
            scheme: "http".to_string(),
        }
    }
}

impl HttpRequestBuilder {
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    #[must_use]
    pub fn query_string(mut self, qs: &str) -> Self {
        self.query_string = qs.to_string();
        self
    }

    #[must_use]
    pub fn content_type(mut self, ct: &str) -> Self {
        self.content_type = Some(ct.to_string());
        self
    }

    /// Appends a header; invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::header::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    #[must_use]
    pub fn meta(mut self, key: &str, value: &str) -> Self {
        self.meta.insert(key.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Sets a form-encoded body from key/value pairs.
    #[must_use]
    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.body = QueryDict::from_pairs(pairs.iter().copied())
            .urlencode()
            .into_bytes();
        self.content_type = Some(FORM_CONTENT_TYPE.to_string());
        self
    }

    #[must_use]
    pub fn scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    pub fn build(self) -> HttpRequest {
        let get = QueryDict::parse(&self.query_string);
        let post = if self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE))
        {
            QueryDict::parse(&String::from_utf8_lossy(&self.body))
        } else {
            QueryDict::new()
        };

        let mut meta = self.meta;
        meta.entry("REQUEST_METHOD".to_string())
            .or_insert_with(|| self.method.to_string());
        meta.entry("PATH_INFO".to_string())
            .or_insert_with(|| self.path.clone());
        meta.entry("QUERY_STRING".to_string())
            .or_insert_with(|| self.query_string.clone());

        HttpRequest {
            method: self.method,
            path: self.path,
            query_string: self.query_string,
            content_type: self.content_type,
            get,
            post,
            headers: self.headers,
            meta,
            body: self.body,
            scheme: self.scheme,
            resolver_match: None,
            urlconf: None,
            session: None,
            extensions: Extensions::new(),
        }
    }
}
