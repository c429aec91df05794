//! Reverse URL resolution.

use std::collections::HashMap;
use std::hash::BuildHasher;

use simple_auth_core::{AuthError, AuthResult};

use super::resolver::URLResolver;

/// Builds the absolute path of a named route, filling placeholders from `kwargs`.
///
/// Names are qualified by namespace, e.g. `admin:password_change`. Values are
/// checked against the placeholder's converter.
///
/// ```
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use simple_auth_http::urls::pattern::path;
/// use simple_auth_http::urls::resolver::{include, root, URLEntry};
/// use simple_auth_http::urls::reverse::reverse;
/// use simple_auth_http::{HttpRequest, HttpResponse};
///
/// let handler = Arc::new(|_req: HttpRequest| -> simple_auth_http::BoxFuture {
///     Box::pin(async { Ok(HttpResponse::ok("ok")) })
/// });
/// let admin = include(
///     "admin/",
///     vec![URLEntry::Pattern(path("password_change/", handler, Some("password_change")).unwrap())],
///     Some("admin"),
///     Some("admin"),
/// )
/// .unwrap();
/// let urls = root(vec![URLEntry::Resolver(admin)]).unwrap();
///
/// let url = reverse("admin:password_change", &HashMap::<&str, String>::new(), &urls).unwrap();
/// assert_eq!(url, "/admin/password_change/");
/// ```
pub fn reverse<S: BuildHasher>(
    viewname: &str,
    kwargs: &HashMap<&str, String, S>,
    urlconf: &URLResolver,
) -> AuthResult<String> {
    let mut candidates = urlconf
        .collect_named_patterns()
        .into_iter()
        .filter(|(name, _, _)| name == viewname)
        .peekable();

    if candidates.peek().is_none() {
        return Err(AuthError::NoReverseMatch(viewname.to_string()));
    }

    for (_, route, converters) in candidates {
        let arity_matches = converters.len() == kwargs.len()
            && converters.iter().all(|(name, converter)| {
                kwargs
                    .get(name.as_str())
                    .is_some_and(|value| converter.accepts(value))
            });
        if arity_matches {
            let url = substitute(&route, kwargs);
            return Ok(format!("/{}", url.trim_start_matches('/')));
        }
    }

    Err(AuthError::NoReverseMatch(format!(
        "{viewname} with keyword arguments {:?}",
        kwargs.keys().collect::<Vec<_>>()
    )))
}

fn substitute<S: BuildHasher>(route: &str, kwargs: &HashMap<&str, String, S>) -> String {
    let mut result = String::new();
    let mut remaining = route;
    while let Some(start) = remaining.find('<') {
        result.push_str(&remaining[..start]);
        let Some(len) = remaining[start..].find('>') else {
            break;
        };
        let end = start + len;
        let inner = &remaining[start + 1..end];
        let name = inner.split_once(':').map_or(inner, |(_, n)| n);
        if let Some(value) = kwargs.get(name) {
            result.push_str(value);
        }
        remaining = &remaining[end + 1..];
    }
    result.push_str(remaining);
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::urls::pattern::{path, RouteHandler};
    use crate::urls::resolver::{include, root, URLEntry};

    fn handler() -> RouteHandler {
        Arc::new(|_req| Box::pin(async { Ok(crate::HttpResponse::ok("ok")) }))
    }

    fn urls() -> URLResolver {
        let admin = vec![
            URLEntry::Pattern(path("", handler(), Some("index")).unwrap()),
            URLEntry::Pattern(
                path("user/<int:id>/change/", handler(), Some("user_change")).unwrap(),
            ),
        ];
        root(vec![
            URLEntry::Pattern(path("", handler(), Some("home")).unwrap()),
            URLEntry::Resolver(include("admin/", admin, Some("admin"), Some("admin")).unwrap()),
        ])
        .unwrap()
    }

    #[test]
    fn test_reverse_root() {
        let url = reverse("home", &HashMap::new(), &urls()).unwrap();
        assert_eq!(url, "/");
    }

    #[test]
    fn test_reverse_namespaced() {
        assert_eq!(urls().reverse("admin:index", &HashMap::new()).unwrap(), "/admin/");
    }

    #[test]
    fn test_reverse_with_kwargs() {
        let kwargs = HashMap::from([("id", "12".to_string())]);
        assert_eq!(
            urls().reverse("admin:user_change", &kwargs).unwrap(),
            "/admin/user/12/change/"
        );
    }

    #[test]
    fn test_reverse_rejects_bad_kwargs() {
        let bad = HashMap::from([("id", "abc".to_string())]);
        assert!(urls().reverse("admin:user_change", &bad).is_err());
        assert!(urls().reverse("admin:user_change", &HashMap::new()).is_err());
    }

    #[test]
    fn test_reverse_unknown_name() {
        let err = urls().reverse("index", &HashMap::new()).unwrap_err();
        assert!(matches!(err, AuthError::NoReverseMatch(_)));
    }
}
