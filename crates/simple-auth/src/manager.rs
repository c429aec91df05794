//! The user factory.
//!
//! [`UserManager`] creates ordinary users and superusers. The email is
//! mandatory, the staff/superuser/active flags and the timestamps are set by
//! the factory itself, and anything else comes in through [`ExtraFields`].
//!
//! ```
//! use simple_auth::manager::{ExtraFields, UserManager};
//! use simple_auth::store::InMemoryStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = UserManager::new(Arc::new(InMemoryStore::new()));
//! let user = manager
//!     .create_user(
//!         "test@example.com",
//!         None,
//!         ExtraFields::new().first_name("Thomas").last_name("Power"),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(user.to_string(), "Thomas Power");
//! assert!(!user.is_staff);
//! # }
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use simple_auth_core::{AuthError, AuthResult};

use crate::hashers::PasswordHashers;
use crate::store::Store;
use crate::user::User;

/// Fields set by the factory; supplying them as extra fields is an error.
pub const PROTECTED_FIELDS: &[&str] = &[
    "email",
    "password",
    "is_active",
    "is_staff",
    "is_superuser",
    "date_joined",
    "last_login",
];

/// Optional attributes for a new user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFields {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub force_password_change: Option<bool>,
    pub groups: Vec<String>,
    pub user_permissions: Vec<String>,
}

impl ExtraFields {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn first_name(mut self, value: impl Into<String>) -> Self {
        self.first_name = Some(value.into());
        self
    }

    #[must_use]
    pub fn last_name(mut self, value: impl Into<String>) -> Self {
        self.last_name = Some(value.into());
        self
    }

    #[must_use]
    pub const fn force_password_change(mut self, value: bool) -> Self {
        self.force_password_change = Some(value);
        self
    }

    #[must_use]
    pub fn group(mut self, name: impl Into<String>) -> Self {
        self.groups.push(name.into());
        self
    }

    #[must_use]
    pub fn permission(mut self, perm: impl Into<String>) -> Self {
        self.user_permissions.push(perm.into());
        self
    }

    /// Builds extra fields from loose key/value pairs.
    ///
    /// Keys that are not user attributes, and the attributes the factory sets
    /// itself, fail with [`AuthError::UnexpectedField`]. Values of the wrong
    /// type fail with [`AuthError::InvalidValue`]; `null` leaves the default.
    pub fn from_map(map: &Map<String, Value>) -> AuthResult<Self> {
        let mut fields = Self::new();
        for (key, value) in map {
            match key.as_str() {
                "first_name" => fields.first_name = optional_string(key, value)?,
                "last_name" => fields.last_name = optional_string(key, value)?,
                "force_password_change" => {
                    fields.force_password_change = match value {
                        Value::Null => None,
                        Value::Bool(b) => Some(*b),
                        _ => return Err(wrong_type(key, "a boolean")),
                    };
                }
                "groups" => fields.groups = string_list(key, value)?,
                "user_permissions" => fields.user_permissions = string_list(key, value)?,
                other => return Err(AuthError::UnexpectedField(other.to_string())),
            }
        }
        Ok(fields)
    }

    fn apply(self, user: &mut User) {
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Some(force) = self.force_password_change {
            user.force_password_change = force;
        }
        user.groups = self.groups;
        user.user_permissions = self.user_permissions;
    }
}

fn wrong_type(key: &str, expected: &str) -> AuthError {
    AuthError::InvalidValue(format!("'{key}' must be {expected}"))
}

fn optional_string(key: &str, value: &Value) -> AuthResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(wrong_type(key, "a string")),
    }
}

fn string_list(key: &str, value: &Value) -> AuthResult<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(String::from)
                    .ok_or_else(|| wrong_type(key, "a list of strings"))
            })
            .collect(),
        _ => Err(wrong_type(key, "a list of strings")),
    }
}

/// Lower-cases the domain part of an address, leaving the local part alone.
///
/// Addresses without `@` are returned unchanged.
pub fn normalize_email(email: &str) -> String {
    match email.trim().rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Creates users and superusers in a [`Store`].
#[derive(Clone)]
pub struct UserManager {
    store: Arc<dyn Store>,
    hashers: PasswordHashers,
}

impl std::fmt::Debug for UserManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserManager")
            .field("hashers", &self.hashers)
            .finish_non_exhaustive()
    }
}

impl UserManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            hashers: PasswordHashers::default(),
        }
    }

    #[must_use]
    pub fn with_hashers(mut self, hashers: PasswordHashers) -> Self {
        self.hashers = hashers;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub const fn hashers(&self) -> &PasswordHashers {
        &self.hashers
    }

    /// Creates an active, non-staff user. `None` as password sets an
    /// unusable password.
    ///
    /// Setting the password clears `force_password_change`, so a flag passed
    /// in `extra_fields` does not survive creation.
    pub async fn create_user(
        &self,
        email: &str,
        password: Option<&str>,
        extra_fields: ExtraFields,
    ) -> AuthResult<User> {
        self.create(email, password, false, false, extra_fields).await
    }

    /// Creates an active user with staff and superuser flags set.
    pub async fn create_superuser(
        &self,
        email: &str,
        password: Option<&str>,
        extra_fields: ExtraFields,
    ) -> AuthResult<User> {
        self.create(email, password, true, true, extra_fields).await
    }

    async fn create(
        &self,
        email: &str,
        password: Option<&str>,
        is_staff: bool,
        is_superuser: bool,
        extra_fields: ExtraFields,
    ) -> AuthResult<User> {
        if email.is_empty() {
            return Err(AuthError::InvalidValue("The given email must be set.".into()));
        }

        let now = Utc::now();
        let mut user = User {
            email: normalize_email(email),
            is_active: true,
            is_staff,
            is_superuser,
            last_login: Some(now),
            date_joined: now,
            ..User::default()
        };
        extra_fields.apply(&mut user);
        user.set_password_with(password, &self.hashers).await?;

        self.store.save_user(&mut user).await?;
        tracing::info!(
            user_id = user.id,
            email = %user.email,
            is_superuser,
            "created user"
        );
        Ok(user)
    }

    pub async fn get_by_natural_key(&self, email: &str) -> AuthResult<User> {
        self.store
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| AuthError::DoesNotExist(format!("User matching email '{email}'")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::InMemoryStore;

    fn manager() -> UserManager {
        UserManager::new(Arc::new(InMemoryStore::new()))
            .with_hashers(PasswordHashers::from_names(&["pbkdf2_sha256".into()]).unwrap())
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("Test@EXAMPLE.com"), "Test@example.com");
        assert_eq!(normalize_email("a@b@EXAMPLE.COM"), "a@b@example.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_from_map_accepts_declared_fields() {
        let map = json!({
            "first_name": "Thomas",
            "last_name": "Power",
            "force_password_change": true,
            "groups": ["editors"],
        });
        let fields = ExtraFields::from_map(map.as_object().unwrap()).unwrap();
        assert_eq!(fields.first_name.as_deref(), Some("Thomas"));
        assert_eq!(fields.force_password_change, Some(true));
        assert_eq!(fields.groups, vec!["editors".to_string()]);
    }

    #[test]
    fn test_from_map_rejects_unknown_and_protected() {
        let unknown = json!({"test": "value"});
        assert!(matches!(
            ExtraFields::from_map(unknown.as_object().unwrap()),
            Err(AuthError::UnexpectedField(f)) if f == "test"
        ));

        for field in PROTECTED_FIELDS {
            let mut map = Map::new();
            map.insert((*field).to_string(), json!(true));
            assert!(matches!(
                ExtraFields::from_map(&map),
                Err(AuthError::UnexpectedField(_))
            ));
        }
    }

    #[test]
    fn test_from_map_type_errors() {
        let map = json!({"first_name": 3});
        assert!(matches!(
            ExtraFields::from_map(map.as_object().unwrap()),
            Err(AuthError::InvalidValue(_))
        ));
    }

    #[tokio::test]
    async fn test_create_user_defaults() {
        let before = Utc::now();
        let user = manager()
            .create_user("test@example.com", Some("password"), ExtraFields::new())
            .await
            .unwrap();
        assert_eq!(user.id, Some(1));
        assert!(user.is_active);
        assert!(!user.is_staff);
        assert!(!user.is_superuser);
        assert!(user.date_joined >= before);
        assert_eq!(user.last_login, Some(user.date_joined));
    }

    #[tokio::test]
    async fn test_create_user_empty_email() {
        let manager = manager();
        let err = manager
            .create_user("", Some("password"), ExtraFields::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "The given email must be set.");
        assert_eq!(manager.store().count_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_user_password_clears_force_password_change() {
        let manager = manager();
        let user = manager
            .create_user(
                "test@example.com",
                Some("password"),
                ExtraFields::new().force_password_change(true),
            )
            .await
            .unwrap();
        assert!(!user.force_password_change);
        let stored = manager.store().get_user(user.id.unwrap()).await.unwrap().unwrap();
        assert!(!stored.force_password_change);
    }

    #[tokio::test]
    async fn test_create_superuser_flags() {
        let user = manager()
            .create_superuser("admin@example.com", Some("password"), ExtraFields::new())
            .await
            .unwrap();
        assert!(user.is_staff);
        assert!(user.is_superuser);
        assert!(user.is_active);
    }

    #[tokio::test]
    async fn test_get_by_natural_key() {
        let manager = manager();
        manager
            .create_user("test@example.com", None, ExtraFields::new())
            .await
            .unwrap();
        assert!(manager.get_by_natural_key("TEST@example.com").await.is_ok());
        assert!(matches!(
            manager.get_by_natural_key("other@example.com").await,
            Err(AuthError::DoesNotExist(_))
        ));
    }
}
