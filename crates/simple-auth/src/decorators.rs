//! View decorators.

use std::sync::Arc;

use simple_auth_core::AuthError;
use simple_auth_http::urls::RouteHandler;
use simple_auth_http::HttpRequest;

use crate::backends::RequestUserExt;

/// Limits a view to superusers. Everyone else, including anonymous
/// requests, gets [`AuthError::PermissionDenied`] (403).
pub fn superuser_only(view: RouteHandler) -> RouteHandler {
    Arc::new(move |request: HttpRequest| {
        let view = view.clone();
        Box::pin(async move {
            if request.user().is_some_and(|user| user.is_superuser) {
                view(request).await
            } else {
                Err(AuthError::PermissionDenied(
                    "Only superusers can access this page".into(),
                ))
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::user::User;
    use simple_auth_http::HttpResponse;

    fn protected() -> RouteHandler {
        superuser_only(Arc::new(|_req| Box::pin(async { Ok(HttpResponse::ok("secret")) })))
    }

    #[tokio::test]
    async fn test_superuser_passes() {
        let mut request = HttpRequest::builder().build();
        request.set_user(User {
            is_superuser: true,
            ..User::new("admin@example.com")
        });
        let response = protected()(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text(), "secret");
    }

    #[tokio::test]
    async fn test_others_denied() {
        let mut staff = HttpRequest::builder().build();
        staff.set_user(User {
            is_staff: true,
            ..User::new("staff@example.com")
        });
        let err = protected()(staff).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        let anonymous = HttpRequest::builder().build();
        assert!(matches!(
            protected()(anonymous).await,
            Err(AuthError::PermissionDenied(_))
        ));
    }
}
