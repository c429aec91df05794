//! URL patterns in `path()` syntax.
//!
//! A route such as `simple_authentication/user/<int:id>/change/` compiles to an
//! anchored regex with one named group per `<type:name>` placeholder.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

use regex::Regex;

use simple_auth_core::{AuthError, AuthResult};

use crate::HttpRequest;

/// The handler invoked for a matched pattern.
pub type RouteHandler = Arc<dyn Fn(HttpRequest) -> crate::BoxFuture + Send + Sync>;

/// Placeholder types understood in routes.
///
/// | Name   | Regex            |
/// |--------|------------------|
/// | `int`  | `[0-9]+`         |
/// | `str`  | `[^/]+`          |
/// | `slug` | `[-a-zA-Z0-9_]+` |
/// | `path` | `.+`             |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    Int,
    Str,
    Slug,
    Path,
}

impl Converter {
    /// Looks up a converter by the name used in routes.
    pub fn from_name(name: &str) -> AuthResult<Self> {
        match name {
            "int" => Ok(Self::Int),
            "str" => Ok(Self::Str),
            "slug" => Ok(Self::Slug),
            "path" => Ok(Self::Path),
            other => Err(AuthError::ConfigurationError(format!(
                "Unknown path converter '{other}'"
            ))),
        }
    }

    pub const fn regex(self) -> &'static str {
        match self {
            Self::Int => "[0-9]+",
            Self::Str => "[^/]+",
            Self::Slug => "[-a-zA-Z0-9_]+",
            Self::Path => ".+",
        }
    }

    /// Returns `true` when `value` is acceptable for this converter.
    pub fn accepts(self, value: &str) -> bool {
        match self {
            Self::Int => value.parse::<i64>().is_ok(),
            Self::Str => !value.is_empty() && !value.contains('/'),
            Self::Slug => {
                !value.is_empty()
                    && value
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            }
            Self::Path => !value.is_empty(),
        }
    }
}

/// A single route.
pub struct URLPattern {
    route: String,
    regex: Regex,
    name: Option<String>,
    converters: Vec<(String, Converter)>,
    callback: Option<RouteHandler>,
}

impl fmt::Debug for URLPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("URLPattern")
            .field("route", &self.route)
            .field("regex", &self.regex.as_str())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl URLPattern {
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn converters(&self) -> &[(String, Converter)] {
        &self.converters
    }

    /// The handler; prefix patterns built by [`path_prefix`] have none.
    pub fn callback(&self) -> Option<&RouteHandler> {
        self.callback.as_ref()
    }

    /// Matches the start of `path`, returning the captured values and the
    /// unmatched remainder.
    pub fn match_path<'p>(&self, path: &'p str) -> Option<(HashMap<String, String>, &'p str)> {
        let captures = self.regex.captures(path)?;
        let full = captures.get(0)?;
        let mut kwargs = HashMap::new();
        for (name, converter) in &self.converters {
            let raw = captures.name(name)?.as_str();
            if !converter.accepts(raw) {
                return None;
            }
            kwargs.insert(name.clone(), raw.to_string());
        }
        Some((kwargs, &path[full.end()..]))
    }

    /// Matches the whole of `path`.
    pub fn full_match(&self, path: &str) -> Option<HashMap<String, String>> {
        let (kwargs, rest) = self.match_path(path)?;
        rest.is_empty().then_some(kwargs)
    }
}

fn compile(route: &str, anchored_end: bool) -> AuthResult<(Regex, Vec<(String, Converter)>)> {
    let mut regex_str = String::from("^");
    let mut converters = Vec::new();
    let mut remaining = route;

    while let Some(start) = remaining.find('<') {
        regex_str.push_str(&regex::escape(&remaining[..start]));
        let end = remaining[start..].find('>').ok_or_else(|| {
            AuthError::ConfigurationError(format!("Unclosed angle bracket in route: {route}"))
        })? + start;

        let inner = &remaining[start + 1..end];
        let (type_name, param_name) = inner.split_once(':').unwrap_or(("str", inner));
        let converter = Converter::from_name(type_name)?;
        let _ = write!(regex_str, "(?P<{param_name}>{})", converter.regex());
        converters.push((param_name.to_string(), converter));

        remaining = &remaining[end + 1..];
    }
    regex_str.push_str(&regex::escape(remaining));
    if anchored_end {
        regex_str.push('$');
    }

    let regex = Regex::new(&regex_str)
        .map_err(|e| AuthError::ConfigurationError(format!("Invalid route '{route}': {e}")))?;
    Ok((regex, converters))
}

/// Creates a named route.
///
/// ```
/// use std::sync::Arc;
/// use simple_auth_http::urls::pattern::path;
/// use simple_auth_http::{HttpRequest, HttpResponse};
///
/// let handler = Arc::new(|_req: HttpRequest| -> simple_auth_http::BoxFuture {
///     Box::pin(async { Ok(HttpResponse::ok("change")) })
/// });
/// let pattern = path("user/<int:id>/change/", handler, Some("user_change")).unwrap();
/// assert!(pattern.full_match("user/3/change/").is_some());
/// assert!(pattern.full_match("user/x/change/").is_none());
/// ```
pub fn path(route: &str, callback: RouteHandler, name: Option<&str>) -> AuthResult<URLPattern> {
    let (regex, converters) = compile(route, true)?;
    Ok(URLPattern {
        route: route.to_string(),
        regex,
        name: name.map(String::from),
        converters,
        callback: Some(callback),
    })
}

/// Creates an unanchored prefix pattern for a [`URLResolver`](super::resolver::URLResolver).
pub fn path_prefix(route: &str) -> AuthResult<URLPattern> {
    let (regex, converters) = compile(route, false)?;
    Ok(URLPattern {
        route: route.to_string(),
        regex,
        name: None,
        converters,
        callback: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> RouteHandler {
        Arc::new(|_req| Box::pin(async { Ok(crate::HttpResponse::ok("ok")) }))
    }

    #[test]
    fn test_literal_route() {
        let p = path("login/", handler(), Some("login")).unwrap();
        assert_eq!(p.name(), Some("login"));
        assert!(p.full_match("login/").is_some());
        assert!(p.full_match("login/extra").is_none());
        assert!(p.full_match("logout/").is_none());
    }

    #[test]
    fn test_empty_route_matches_only_empty() {
        let p = path("", handler(), None).unwrap();
        assert!(p.full_match("").is_some());
        assert!(p.full_match("x/").is_none());
    }

    #[test]
    fn test_int_converter() {
        let p = path("user/<int:id>/", handler(), None).unwrap();
        let kwargs = p.full_match("user/42/").unwrap();
        assert_eq!(kwargs.get("id").unwrap(), "42");
        assert!(p.full_match("user/abc/").is_none());
    }

    #[test]
    fn test_default_converter_is_str() {
        let p = path("<name>/", handler(), None).unwrap();
        assert_eq!(p.converters()[0].1, Converter::Str);
        assert!(p.full_match("a/b/").is_none());
    }

    #[test]
    fn test_regex_metacharacters_escaped() {
        let p = path("a.b/", handler(), None).unwrap();
        assert!(p.full_match("a.b/").is_some());
        assert!(p.full_match("axb/").is_none());
    }

    #[test]
    fn test_prefix_leaves_remainder() {
        let p = path_prefix("admin/").unwrap();
        let (kwargs, rest) = p.match_path("admin/login/").unwrap();
        assert!(kwargs.is_empty());
        assert_eq!(rest, "login/");
        assert!(p.callback().is_none());
    }

    #[test]
    fn test_unknown_converter() {
        assert!(path("<uuid:id>/", handler(), None).is_err());
        assert!(path("<int:id/", handler(), None).is_err());
    }

    #[test]
    fn test_slug_accepts() {
        assert!(Converter::Slug.accepts("simple-auth_1"));
        assert!(!Converter::Slug.accepts("a b"));
    }
}
