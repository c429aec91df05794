//! The admin site registry.
//!
//! [`AdminSite`] maps model keys (`"app_label.model_name"`) to their
//! [`ModelAdmin`] configuration. The host framework's default site comes with
//! its own group admin under `auth.group`; [`AdminSite::install_simple_authentication`]
//! swaps it for the user and group admins of this application.

use std::collections::BTreeMap;

use simple_auth::user::APP_LABEL;
use simple_auth_core::{AuthError, AuthResult};

use crate::group::group_admin;
use crate::model_admin::ModelAdmin;
use crate::user::user_admin;

/// The framework's own group registration.
pub const FRAMEWORK_GROUP_KEY: &str = "auth.group";

/// The registry of administered models.
///
/// # Examples
///
/// ```
/// use simple_auth_admin::site::AdminSite;
///
/// let mut site = AdminSite::framework_default();
/// assert!(site.is_registered("auth.group"));
///
/// site.install_simple_authentication().unwrap();
/// assert!(!site.is_registered("auth.group"));
/// assert!(site.is_registered("simple_authentication.user"));
/// ```
#[derive(Debug, Clone)]
pub struct AdminSite {
    name: String,
    site_header: String,
    registry: BTreeMap<String, ModelAdmin>,
}

impl AdminSite {
    /// An empty site.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            site_header: "Administration".to_string(),
            registry: BTreeMap::new(),
        }
    }

    /// The site as the host framework ships it, with its group admin.
    pub fn framework_default() -> Self {
        let mut site = Self::new("admin");
        site.registry.insert(
            FRAMEWORK_GROUP_KEY.to_string(),
            ModelAdmin::new("auth", "group").search_fields(vec!["name"]).ordering(vec!["name"]),
        );
        site
    }

    #[must_use]
    pub fn site_header(mut self, header: impl Into<String>) -> Self {
        self.site_header = header.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &str {
        &self.site_header
    }

    /// Registers `admin` under its model key.
    ///
    /// Registering a model twice is an error, as in the framework.
    pub fn register(&mut self, admin: ModelAdmin) -> AuthResult<()> {
        let key = admin.model_key();
        if self.registry.contains_key(&key) {
            return Err(AuthError::ConfigurationError(format!(
                "The model {key} is already registered"
            )));
        }
        tracing::debug!(model = %key, "registered model admin");
        self.registry.insert(key, admin);
        Ok(())
    }

    pub fn unregister(&mut self, model_key: &str) -> AuthResult<ModelAdmin> {
        self.registry.remove(model_key).ok_or_else(|| {
            AuthError::ConfigurationError(format!("The model {model_key} is not registered"))
        })
    }

    pub fn is_registered(&self, model_key: &str) -> bool {
        self.registry.contains_key(model_key)
    }

    pub fn get_model_admin(&self, model_key: &str) -> Option<&ModelAdmin> {
        self.registry.get(model_key)
    }

    /// Registered model keys, sorted.
    pub fn registered_models(&self) -> Vec<&str> {
        self.registry.keys().map(String::as_str).collect()
    }

    /// Registered admins grouped by app label, for the index page.
    pub fn app_list(&self) -> BTreeMap<&str, Vec<&ModelAdmin>> {
        let mut apps: BTreeMap<&str, Vec<&ModelAdmin>> = BTreeMap::new();
        for admin in self.registry.values() {
            apps.entry(admin.app_label.as_str()).or_default().push(admin);
        }
        apps
    }

    /// Replaces the framework's group admin with the user and group admins.
    pub fn install_simple_authentication(&mut self) -> AuthResult<()> {
        if self.is_registered(FRAMEWORK_GROUP_KEY) {
            self.unregister(FRAMEWORK_GROUP_KEY)?;
        }
        self.register(user_admin())?;
        self.register(group_admin())?;
        tracing::debug!(app = APP_LABEL, "admin site configured");
        Ok(())
    }

    /// The registered user admin.
    pub fn user_admin(&self) -> AuthResult<&ModelAdmin> {
        self.lookup(&format!("{APP_LABEL}.user"))
    }

    pub fn group_admin(&self) -> AuthResult<&ModelAdmin> {
        self.lookup(&format!("{APP_LABEL}.group"))
    }

    fn lookup(&self, key: &str) -> AuthResult<&ModelAdmin> {
        self.get_model_admin(key)
            .ok_or_else(|| AuthError::NotFound(format!("The model {key} is not registered")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_unregister() {
        let mut site = AdminSite::new("admin");
        site.register(ModelAdmin::new("shop", "order")).unwrap();
        assert!(site.is_registered("shop.order"));
        assert!(matches!(
            site.register(ModelAdmin::new("shop", "order")),
            Err(AuthError::ConfigurationError(_))
        ));

        let removed = site.unregister("shop.order").unwrap();
        assert_eq!(removed.model_name, "order");
        assert!(!site.is_registered("shop.order"));
        assert!(site.unregister("shop.order").is_err());
    }

    #[test]
    fn test_install_replaces_framework_group() {
        let mut site = AdminSite::framework_default();
        site.install_simple_authentication().unwrap();
        assert_eq!(
            site.registered_models(),
            vec!["simple_authentication.group", "simple_authentication.user"]
        );
        assert_eq!(site.user_admin().unwrap().action_names, vec!["hijack"]);
        assert_eq!(site.group_admin().unwrap().search_fields, vec!["name"]);
    }

    #[test]
    fn test_install_on_empty_site() {
        let mut site = AdminSite::new("admin").site_header("Back office");
        site.install_simple_authentication().unwrap();
        assert_eq!(site.header(), "Back office");
        assert_eq!(site.app_list()["simple_authentication"].len(), 2);
        assert!(site.install_simple_authentication().is_err());
    }

    #[test]
    fn test_missing_admin_is_not_found() {
        let site = AdminSite::new("admin");
        assert!(matches!(site.user_admin(), Err(AuthError::NotFound(_))));
    }
}
