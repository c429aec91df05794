//! Application configuration.

use simple_auth_core::apps::AppConfig;

use crate::user::APP_LABEL;

/// Describes the authentication application to the app registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleAuthenticationConfig;

impl AppConfig for SimpleAuthenticationConfig {
    fn name(&self) -> &str {
        APP_LABEL
    }

    fn verbose_name(&self) -> &str {
        "Authentication"
    }

    fn ready(&self) {
        tracing::debug!(app = APP_LABEL, "application ready");
    }
}
