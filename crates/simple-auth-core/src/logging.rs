//! Tracing setup.
//!
//! [`setup_logging`] installs the global subscriber from [`Settings`];
//! [`request_span`] opens the span every HTTP request runs inside.

use crate::settings::Settings;

/// Installs the global tracing subscriber.
///
/// The filter comes from `settings.log_level`, falling back to `info` when the
/// directive does not parse. Debug mode logs in a pretty, human-readable
/// format; otherwise output is JSON. Installing twice is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates the span for one HTTP request.
///
/// ```
/// use simple_auth_core::logging::request_span;
///
/// let span = request_span("8d1c6f0e", "GET", "/admin/");
/// let _guard = span.enter();
/// tracing::info!("handling request");
/// ```
pub fn request_span(request_id: &str, method: &str, path: &str) -> tracing::Span {
    tracing::info_span!("request", id = request_id, method = method, path = path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice_does_not_panic() {
        let settings = Settings {
            log_level: "not a [valid directive".to_string(),
            ..Settings::default()
        };
        setup_logging(&settings);
        setup_logging(&settings);
    }

    #[test]
    fn test_request_span_metadata() {
        let span = request_span("abc", "GET", "/");
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "request");
        }
    }
}
