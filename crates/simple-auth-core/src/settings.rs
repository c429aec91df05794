//! Settings for simple-authentication.
//!
//! [`Settings`] holds everything the application reads at runtime. Every field
//! has a default so a partial configuration file is always valid; see
//! [`settings_loader`](crate::settings_loader) for how files and environment
//! variables are layered on top.

use serde::{Deserialize, Serialize};

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Either `sqlite` or `memory`.
    pub engine: String,
    /// The database file for `sqlite`; `:memory:` keeps it in RAM.
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "sqlite".to_string(),
            name: "db.sqlite3".to_string(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Hasher algorithms in order of preference. The first one hashes new passwords.
    pub password_hashers: Vec<String>,
    /// Qualified URL name of the admin password-change view.
    pub password_change_url_name: String,
    /// Application namespace that identifies admin URLs.
    pub admin_namespace: String,
    /// Where to send a user after logging in when no `next` is given.
    pub login_redirect_url: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            password_hashers: vec![
                "argon2".to_string(),
                "pbkdf2_sha256".to_string(),
                "bcrypt".to_string(),
            ],
            password_change_url_name: "admin:password_change".to_string(),
            admin_namespace: "admin".to_string(),
            login_redirect_url: "/".to_string(),
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub cookie_path: String,
    pub cookie_secure: bool,
    pub cookie_httponly: bool,
    pub cookie_samesite: String,
    /// Cookie max age in seconds.
    pub cookie_age: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "sessionid".to_string(),
            cookie_path: "/".to_string(),
            cookie_secure: false,
            cookie_httponly: true,
            cookie_samesite: "Lax".to_string(),
            cookie_age: 1_209_600,
        }
    }
}

/// Admin site configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    /// Mount point of the admin site, without a leading slash.
    pub url_prefix: String,
    pub site_header: String,
    /// Default page size of changelists.
    pub list_per_page: usize,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            url_prefix: "admin/".to_string(),
            site_header: "Administration".to_string(),
            list_per_page: 100,
        }
    }
}

/// The complete set of application settings.
///
/// # Examples
///
/// ```
/// use simple_auth_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.auth.password_change_url_name, "admin:password_change");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled.
    pub debug: bool,
    /// The key used to sign session auth hashes.
    pub secret_key: String,
    /// Log filter directive (e.g. "info", "simple_auth=debug").
    pub log_level: String,

    // ── Sections ─────────────────────────────────────────────────────

    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub session: SessionSettings,
    pub admin: AdminSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            secret_key: String::new(),
            log_level: "info".to_string(),
            database: DatabaseSettings::default(),
            auth: AuthSettings::default(),
            session: SessionSettings::default(),
            admin: AdminSettings::default(),
        }
    }
}

impl Settings {
    /// Returns the admin mount point normalized to `name/`.
    pub fn admin_prefix(&self) -> String {
        let trimmed = self.admin.url_prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        }
    }
}
