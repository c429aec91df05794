//! Hierarchical URL resolution with namespaces.
//!
//! A [`URLResolver`] matches a prefix and hands the remainder to its children;
//! [`include`] builds one with an instance namespace and an application name.

use std::collections::HashMap;
use std::fmt;

use simple_auth_core::{AuthError, AuthResult};

use super::pattern::{self, Converter, RouteHandler, URLPattern};

/// A named route collected for reversing: `(qualified_name, full_route, converters)`.
pub type NamedPatternEntry = (String, String, Vec<(String, Converter)>);

/// The outcome of resolving a path.
#[derive(Clone)]
pub struct ResolverMatch {
    pub func: RouteHandler,
    pub kwargs: HashMap<String, String>,
    pub url_name: Option<String>,
    /// Application names along the resolution chain, outermost first.
    pub app_names: Vec<String>,
    /// Instance namespaces along the resolution chain, outermost first.
    pub namespaces: Vec<String>,
    pub route: String,
}

impl fmt::Debug for ResolverMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverMatch")
            .field("kwargs", &self.kwargs)
            .field("url_name", &self.url_name)
            .field("app_names", &self.app_names)
            .field("namespaces", &self.namespaces)
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

impl ResolverMatch {
    /// The application namespace, e.g. `admin`.
    pub fn app_name(&self) -> String {
        self.app_names.join(":")
    }

    /// The instance namespace.
    pub fn namespace(&self) -> String {
        self.namespaces.join(":")
    }

    /// The namespaced name of the matched route, e.g. `admin:index`.
    pub fn view_name(&self) -> String {
        let mut parts: Vec<&str> = self.namespaces.iter().map(String::as_str).collect();
        if let Some(name) = &self.url_name {
            parts.push(name);
        }
        parts.join(":")
    }

    /// Returns a captured value parsed as an integer.
    pub fn kwarg_i64(&self, name: &str) -> AuthResult<i64> {
        self.kwargs
            .get(name)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| AuthError::NotFound(format!("Missing URL parameter '{name}'")))
    }
}

/// An entry in a URL configuration.
pub enum URLEntry {
    Pattern(URLPattern),
    Resolver(URLResolver),
}

impl fmt::Debug for URLEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(p) => f.debug_tuple("Pattern").field(p).finish(),
            Self::Resolver(r) => f.debug_tuple("Resolver").field(r).finish(),
        }
    }
}

/// A prefix plus child entries.
pub struct URLResolver {
    pattern: URLPattern,
    url_patterns: Vec<URLEntry>,
    namespace: Option<String>,
    app_name: Option<String>,
}

impl fmt::Debug for URLResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("URLResolver")
            .field("pattern", &self.pattern)
            .field("url_patterns", &self.url_patterns)
            .field("namespace", &self.namespace)
            .field("app_name", &self.app_name)
            .finish()
    }
}

impl URLResolver {
    pub fn new(
        pattern: URLPattern,
        url_patterns: Vec<URLEntry>,
        namespace: Option<&str>,
        app_name: Option<&str>,
    ) -> Self {
        // An application name without an explicit instance namespace doubles as one.
        let namespace = namespace.or(app_name);
        Self {
            pattern,
            url_patterns,
            namespace: namespace.map(String::from),
            app_name: app_name.map(String::from),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    pub fn url_patterns(&self) -> &[URLEntry] {
        &self.url_patterns
    }

    /// Resolves a path given without its leading slash.
    ///
    /// Fails with [`AuthError::NotFound`] when nothing matches.
    pub fn resolve(&self, path: &str) -> AuthResult<ResolverMatch> {
        self.try_resolve(path)
            .ok_or_else(|| AuthError::NotFound(format!("No URL pattern matches '{path}'")))
    }

    fn try_resolve(&self, path: &str) -> Option<ResolverMatch> {
        let (prefix_kwargs, remaining) = self.pattern.match_path(path)?;

        for entry in &self.url_patterns {
            let found = match entry {
                URLEntry::Pattern(child) => child.full_match(remaining).and_then(|kwargs| {
                    Some(ResolverMatch {
                        func: child.callback()?.clone(),
                        kwargs,
                        url_name: child.name().map(String::from),
                        app_names: Vec::new(),
                        namespaces: Vec::new(),
                        route: child.route().to_string(),
                    })
                }),
                URLEntry::Resolver(child) => child.try_resolve(remaining),
            };

            if let Some(mut m) = found {
                for (k, v) in &prefix_kwargs {
                    m.kwargs.entry(k.clone()).or_insert_with(|| v.clone());
                }
                if let Some(ns) = &self.namespace {
                    m.namespaces.insert(0, ns.clone());
                }
                if let Some(app) = &self.app_name {
                    m.app_names.insert(0, app.clone());
                }
                m.route = format!("{}{}", self.pattern.route(), m.route);
                return Some(m);
            }
        }
        None
    }

    /// Collects every named route with its namespaced name and full route.
    pub fn collect_named_patterns(&self) -> Vec<NamedPatternEntry> {
        let mut result = Vec::new();
        self.collect_inner(&mut result, &[], "");
        result
    }

    fn collect_inner(
        &self,
        result: &mut Vec<NamedPatternEntry>,
        parent_ns: &[String],
        parent_route: &str,
    ) {
        let mut namespaces = parent_ns.to_vec();
        if let Some(ns) = &self.namespace {
            namespaces.push(ns.clone());
        }
        let route = format!("{parent_route}{}", self.pattern.route());
        let mut converters: Vec<(String, Converter)> = Vec::new();
        converters.extend(self.pattern.converters().iter().cloned());

        for entry in &self.url_patterns {
            match entry {
                URLEntry::Pattern(child) => {
                    if let Some(name) = child.name() {
                        let qualified = if namespaces.is_empty() {
                            name.to_string()
                        } else {
                            format!("{}:{name}", namespaces.join(":"))
                        };
                        let mut all = converters.clone();
                        all.extend(child.converters().iter().cloned());
                        result.push((qualified, format!("{route}{}", child.route()), all));
                    }
                }
                URLEntry::Resolver(child) => child.collect_inner(result, &namespaces, &route),
            }
        }
    }

    /// Reverses a namespaced route name; see [`reverse`](super::reverse::reverse).
    pub fn reverse(&self, viewname: &str, kwargs: &HashMap<&str, String>) -> AuthResult<String> {
        super::reverse::reverse(viewname, kwargs, self)
    }
}

/// Mounts `patterns` under `prefix` with an instance namespace and application name.
///
/// ```
/// use std::sync::Arc;
/// use simple_auth_http::urls::pattern::path;
/// use simple_auth_http::urls::resolver::{include, root, URLEntry};
/// use simple_auth_http::{HttpRequest, HttpResponse};
///
/// let handler = Arc::new(|_req: HttpRequest| -> simple_auth_http::BoxFuture {
///     Box::pin(async { Ok(HttpResponse::ok("index")) })
/// });
/// let admin = include(
///     "admin/",
///     vec![URLEntry::Pattern(path("", handler, Some("index")).unwrap())],
///     Some("admin"),
///     Some("admin"),
/// )
/// .unwrap();
/// let urls = root(vec![URLEntry::Resolver(admin)]).unwrap();
///
/// let m = urls.resolve("admin/").unwrap();
/// assert_eq!(m.app_name(), "admin");
/// assert_eq!(m.view_name(), "admin:index");
/// ```
pub fn include(
    prefix: &str,
    patterns: Vec<URLEntry>,
    namespace: Option<&str>,
    app_name: Option<&str>,
) -> AuthResult<URLResolver> {
    Ok(URLResolver::new(
        pattern::path_prefix(prefix)?,
        patterns,
        namespace,
        app_name,
    ))
}

/// The root resolver, with an empty prefix and no namespace.
pub fn root(patterns: Vec<URLEntry>) -> AuthResult<URLResolver> {
    Ok(URLResolver::new(pattern::path_prefix("")?, patterns, None, None))
}
