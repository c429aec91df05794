//! Application configuration.
//!
//! An installed application describes itself through [`AppConfig`];
//! [`AppRegistry`] keeps them in installation order and runs their `ready`
//! hooks once.

use std::collections::HashMap;

use crate::error::{AuthError, AuthResult};

/// Configuration for an installed application.
///
/// ```
/// use simple_auth_core::apps::AppConfig;
///
/// struct Shop;
///
/// impl AppConfig for Shop {
///     fn name(&self) -> &str { "project.shop" }
/// }
///
/// assert_eq!(Shop.label(), "shop");
/// assert_eq!(Shop.verbose_name(), "project.shop");
/// ```
pub trait AppConfig: Send + Sync {
    /// The dotted path of the application.
    fn name(&self) -> &str;

    /// The last component of [`name`](AppConfig::name).
    fn label(&self) -> &str {
        self.name().rsplit('.').next().unwrap_or_else(|| self.name())
    }

    /// Human-readable name.
    fn verbose_name(&self) -> &str {
        self.name()
    }

    /// Called once after all apps are registered.
    fn ready(&self) {}
}

/// The registry of installed applications.
#[derive(Default)]
pub struct AppRegistry {
    apps: Vec<Box<dyn AppConfig>>,
    labels: HashMap<String, usize>,
    ready: bool,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an application. Labels must be unique and registration
    /// closes once the registry is populated.
    pub fn register(&mut self, app: Box<dyn AppConfig>) -> AuthResult<()> {
        if self.ready {
            return Err(AuthError::ConfigurationError(
                "Cannot register apps after the registry has been populated".to_string(),
            ));
        }
        let label = app.label().to_string();
        if self.labels.contains_key(&label) {
            return Err(AuthError::ConfigurationError(format!(
                "Application labels aren't unique, duplicates: {label}"
            )));
        }
        self.labels.insert(label, self.apps.len());
        self.apps.push(app);
        Ok(())
    }

    pub fn get_app_config(&self, label: &str) -> Option<&dyn AppConfig> {
        self.labels.get(label).map(|&idx| self.apps[idx].as_ref())
    }

    pub fn get_app_configs(&self) -> &[Box<dyn AppConfig>] {
        &self.apps
    }

    /// Calls `ready()` on each app in registration order. Idempotent.
    pub fn populate(&mut self) {
        if self.ready {
            return;
        }
        for app in &self.apps {
            tracing::debug!(app = app.name(), "app ready");
            app.ready();
        }
        self.ready = true;
    }

    pub const fn is_ready(&self) -> bool {
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct Counting {
        name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl AppConfig for Counting {
        fn name(&self) -> &str {
            self.name
        }
        fn ready(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = AppRegistry::new();
        registry
            .register(Box::new(Counting { name: "project.blog", calls: calls.clone() }))
            .unwrap();
        assert!(registry.get_app_config("blog").is_some());
        assert!(registry.get_app_config("shop").is_none());
        assert_eq!(registry.get_app_configs().len(), 1);
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = AppRegistry::new();
        registry
            .register(Box::new(Counting { name: "a.blog", calls: calls.clone() }))
            .unwrap();
        let err = registry
            .register(Box::new(Counting { name: "b.blog", calls }))
            .unwrap_err();
        assert!(err.to_string().contains("duplicates: blog"));
    }

    #[test]
    fn test_populate_runs_ready_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = AppRegistry::new();
        registry
            .register(Box::new(Counting { name: "blog", calls: calls.clone() }))
            .unwrap();
        registry.populate();
        registry.populate();
        assert!(registry.is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry
            .register(Box::new(Counting { name: "late", calls }))
            .is_err());
    }
}
