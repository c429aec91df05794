//! Loading [`Settings`] from configuration files and the environment.
//!
//! ## Loading order
//!
//! 1. Start with default settings.
//! 2. Merge a TOML or JSON file over the defaults.
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment variables
//!
//! | Env var | Setting |
//! |---|---|
//! | `SIMPLE_AUTH_SECRET_KEY` | `secret_key` |
//! | `SIMPLE_AUTH_DEBUG` | `debug` |
//! | `SIMPLE_AUTH_LOG_LEVEL` | `log_level` |
//! | `SIMPLE_AUTH_DATABASE_ENGINE` | `database.engine` |
//! | `SIMPLE_AUTH_DATABASE_NAME` | `database.name` |
//! | `SIMPLE_AUTH_PASSWORD_HASHERS` | `auth.password_hashers` (comma-separated) |
//! | `SIMPLE_AUTH_SESSION_COOKIE_NAME` | `session.cookie_name` |
//! | `SIMPLE_AUTH_SESSION_COOKIE_SECURE` | `session.cookie_secure` |
//! | `SIMPLE_AUTH_ADMIN_URL_PREFIX` | `admin.url_prefix` |

use std::path::Path;

use crate::error::AuthError;
use crate::settings::Settings;

/// Prefix of every environment variable read by [`apply_env_overrides`].
pub const ENV_PREFIX: &str = "SIMPLE_AUTH_";

/// Loads settings from a TOML string, keeping defaults for anything not given.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, AuthError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| AuthError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, AuthError> {
    from_toml_str(&read(path.as_ref(), "TOML")?)
}

/// Loads settings from a JSON string, keeping defaults for anything not given.
pub fn from_json_str(json_str: &str) -> Result<Settings, AuthError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| AuthError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, AuthError> {
    from_json_str(&read(path.as_ref(), "JSON")?)
}

/// Loads a `.toml` or `.json` file (picked by extension) and applies
/// environment overrides.
pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Settings, AuthError> {
    let path = path.as_ref();
    let mut settings = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => from_json_file(path)?,
        Some("toml") => from_toml_file(path)?,
        other => {
            return Err(AuthError::ConfigurationError(format!(
                "Unsupported settings file extension: {}",
                other.unwrap_or("<none>")
            )))
        }
    };
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from environment variables only.
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `SIMPLE_AUTH_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides_from(settings, |key| std::env::var(format!("{ENV_PREFIX}{key}")).ok());
}

/// Applies overrides read through `lookup`, which receives the variable name
/// without its prefix.
pub fn apply_overrides_from<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("SECRET_KEY") {
        settings.secret_key = val;
    }
    if let Some(val) = lookup("DEBUG") {
        settings.debug = parse_bool(&val);
    }
    if let Some(val) = lookup("LOG_LEVEL") {
        settings.log_level = val;
    }
    if let Some(val) = lookup("DATABASE_ENGINE") {
        settings.database.engine = val;
    }
    if let Some(val) = lookup("DATABASE_NAME") {
        settings.database.name = val;
    }
    if let Some(val) = lookup("PASSWORD_HASHERS") {
        settings.auth.password_hashers = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(val) = lookup("SESSION_COOKIE_NAME") {
        settings.session.cookie_name = val;
    }
    if let Some(val) = lookup("SESSION_COOKIE_SECURE") {
        settings.session.cookie_secure = parse_bool(&val);
    }
    if let Some(val) = lookup("ADMIN_URL_PREFIX") {
        settings.admin.url_prefix = val;
    }
}

fn parse_bool(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn read(path: &Path, kind: &str) -> Result<String, AuthError> {
    std::fs::read_to_string(path).map_err(|e| {
        AuthError::ConfigurationError(format!(
            "Failed to read {kind} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(value: serde_json::Value, kind: &str) -> Result<Settings, AuthError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        AuthError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;
    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        AuthError::ConfigurationError(format!("Failed to deserialize settings from {kind}: {e}"))
    })
}

fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values; `override_val` wins.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = match base_map.remove(&key) {
                    Some(base_v) => merge_json(base_v, override_v),
                    None => override_v,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    // ── TOML ────────────────────────────────────────────────────────

    #[test]
    fn test_from_toml_str_sections() {
        let toml = r#"
            secret_key = "s3cret"
            debug = false

            [database]
            engine = "memory"

            [auth]
            password_hashers = ["pbkdf2_sha256"]
        "#;
        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.secret_key, "s3cret");
        assert!(!settings.debug);
        assert_eq!(settings.database.engine, "memory");
        assert_eq!(settings.database.name, "db.sqlite3");
        assert_eq!(settings.auth.password_hashers, vec!["pbkdf2_sha256"]);
        assert_eq!(settings.auth.admin_namespace, "admin");
    }

    #[test]
    fn test_from_toml_str_empty_is_default() {
        assert_eq!(from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let err = from_toml_str("debug = = true").unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML"));
    }

    #[test]
    fn test_from_toml_str_wrong_type() {
        let err = from_toml_str("debug = \"maybe\"").unwrap_err();
        assert!(err.to_string().contains("Failed to deserialize"));
    }

    // ── JSON ────────────────────────────────────────────────────────

    #[test]
    fn test_from_json_str() {
        let settings =
            from_json_str(r#"{"admin": {"url_prefix": "staff/", "list_per_page": 20}}"#).unwrap();
        assert_eq!(settings.admin.url_prefix, "staff/");
        assert_eq!(settings.admin.list_per_page, 20);
        assert_eq!(settings.admin.site_header, "Administration");
    }

    // ── Files ───────────────────────────────────────────────────────

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "log_level = \"debug\"").unwrap();

        let settings = from_toml_file(&path).unwrap();
        assert_eq!(settings.log_level, "debug");

        let bad = dir.path().join("settings.yaml");
        std::fs::write(&bad, "x: 1").unwrap();
        assert!(from_file_with_env(&bad).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = from_json_file("/nonexistent/settings.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read JSON file"));
    }

    // ── Environment ─────────────────────────────────────────────────

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("SECRET_KEY", "from-env"),
            ("DEBUG", "0"),
            ("PASSWORD_HASHERS", "bcrypt, argon2,"),
            ("SESSION_COOKIE_SECURE", "yes"),
            ("DATABASE_ENGINE", "memory"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        apply_overrides_from(&mut settings, |k| vars.get(k).map(ToString::to_string));

        assert_eq!(settings.secret_key, "from-env");
        assert!(!settings.debug);
        assert_eq!(settings.auth.password_hashers, vec!["bcrypt", "argon2"]);
        assert!(settings.session.cookie_secure);
        assert_eq!(settings.database.engine, "memory");
        assert_eq!(settings.log_level, "info");
    }
}
