//! The email-keyed user record.
//!
//! [`User`] is identified by its email address; there is no separate
//! username. Display names fall back to the email when no name is set, and a
//! deactivated account renders as "Deactivated user".
//!
//! ## Async password operations
//!
//! Hashing and verification use `tokio::task::spawn_blocking` internally, so
//! the password methods are async.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use simple_auth_core::AuthResult;

use crate::group::Group;
use crate::hashers::{self, PasswordHashers};

/// The app label under which users and groups are registered.
pub const APP_LABEL: &str = "simple_authentication";

/// The name displayed for an inactive account.
pub const DEACTIVATED_USER_NAME: &str = "Deactivated user";

/// A user of the site, keyed by email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Assigned by the store on first save.
    pub id: Option<i64>,
    /// Unique, compared case-insensitively, stored lower-case.
    pub email: String,
    /// The encoded password hash.
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    /// Inactive accounts cannot log in. Deactivate instead of deleting.
    pub is_active: bool,
    /// Staff can log into the admin site.
    pub is_staff: bool,
    /// Superusers hold every permission.
    pub is_superuser: bool,
    /// When set, admin pages redirect to the password-change page until the
    /// password is changed.
    pub force_password_change: bool,
    /// Names of the groups this user belongs to.
    pub groups: Vec<String>,
    /// Directly assigned permissions, as `"app_label.codename"`.
    pub user_permissions: Vec<String>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: None,
            email: String::new(),
            password: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            date_joined: Utc::now(),
            last_login: None,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            force_password_change: false,
            groups: Vec::new(),
            user_permissions: Vec::new(),
        }
    }
}

impl User {
    /// The field that identifies a user.
    pub const USERNAME_FIELD: &'static str = "email";
    /// The field holding the user's email address.
    pub const EMAIL_FIELD: &'static str = "email";

    /// Creates an unsaved user with default flags.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    pub const fn pk(&self) -> Option<i64> {
        self.id
    }

    /// Returns the email, which serves as the username.
    pub fn get_username(&self) -> &str {
        &self.email
    }

    pub fn username(&self) -> &str {
        self.get_username()
    }

    /// A displayable name: "Deactivated user" for inactive accounts,
    /// otherwise the string representation.
    pub fn name(&self) -> String {
        if self.is_active {
            self.to_string()
        } else {
            DEACTIVATED_USER_NAME.to_string()
        }
    }

    pub fn get_full_name(&self) -> String {
        self.name()
    }

    /// The first name, or the email when it is not set.
    pub fn get_short_name(&self) -> &str {
        if self.first_name.is_empty() {
            &self.email
        } else {
            &self.first_name
        }
    }

    /// "first last" when both are set, the first name alone, or the email.
    /// A last name without a first name is ignored.
    pub fn get_long_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            _ => self.email.clone(),
        }
    }

    /// Normalizes the record before it is written. Every store calls this.
    pub fn pre_save(&mut self) {
        if !self.email.is_empty() {
            self.email = self.email.to_lowercase();
        }
    }

    /// Hashes `raw` with the default hashers and clears `force_password_change`.
    pub async fn set_password(&mut self, raw: &str) -> AuthResult<()> {
        self.set_password_with(Some(raw), &PasswordHashers::default())
            .await
    }

    /// Hashes `raw` with `hashers` and clears `force_password_change`.
    /// `None` sets an unusable password.
    pub async fn set_password_with(
        &mut self,
        raw: Option<&str>,
        hashers: &PasswordHashers,
    ) -> AuthResult<()> {
        self.force_password_change = false;
        self.password = hashers.make_password(raw).await?;
        Ok(())
    }

    pub async fn check_password(&self, raw: &str) -> AuthResult<bool> {
        self.check_password_with(raw, &PasswordHashers::default())
            .await
    }

    pub async fn check_password_with(
        &self,
        raw: &str,
        hashers: &PasswordHashers,
    ) -> AuthResult<bool> {
        hashers.check_password(raw, &self.password).await
    }

    pub fn set_unusable_password(&mut self) {
        self.password = hashers::make_unusable_password();
    }

    pub fn has_usable_password(&self) -> bool {
        hashers::is_password_usable(&self.password)
    }

    /// Always `true`: anonymous requests carry no user.
    pub const fn is_authenticated(&self) -> bool {
        true
    }

    pub const fn is_anonymous(&self) -> bool {
        false
    }

    /// Direct permissions plus those of the member groups found in `groups`.
    /// Inactive users have none.
    pub fn get_all_permissions(&self, groups: &[Group]) -> HashSet<String> {
        if !self.is_active {
            return HashSet::new();
        }
        let mut perms: HashSet<String> = self.user_permissions.iter().cloned().collect();
        for group in groups.iter().filter(|g| self.groups.contains(&g.name)) {
            perms.extend(group.get_permissions());
        }
        perms
    }

    pub fn has_perm(&self, perm: &str, groups: &[Group]) -> bool {
        self.has_perms(&[perm], groups)
    }

    pub fn has_perms(&self, perms: &[&str], groups: &[Group]) -> bool {
        if !self.is_active {
            return false;
        }
        if self.is_superuser {
            return true;
        }
        let all = self.get_all_permissions(groups);
        perms.iter().all(|p| all.contains(*p))
    }

    /// Returns `true` if the user holds any permission in `app_label`.
    pub fn has_module_perms(&self, app_label: &str, groups: &[Group]) -> bool {
        if !self.is_active {
            return false;
        }
        if self.is_superuser {
            return true;
        }
        let prefix = format!("{app_label}.");
        self.get_all_permissions(groups)
            .iter()
            .any(|p| p.starts_with(&prefix))
    }
}

impl fmt::Display for User {
    /// First and last name joined by a space, skipping empty parts; the email
    /// when neither is set.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [self.first_name.as_str(), self.last_name.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            f.write_str(&self.email)
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}
