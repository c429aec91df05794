//! Forms for creating, editing and authenticating users.
//!
//! - [`UserCreationForm`] - email, names and a confirmed password
//! - [`UserChangeForm`] - edits an existing user; the password is read-only
//! - [`AuthenticationForm`] - email and password login
//! - [`PasswordChangeForm`] - the user changes their own password
//! - [`AdminPasswordChangeForm`] - an administrator sets a user's password
//!
//! Forms are bound to a [`QueryDict`] and validated with `is_valid`, which
//! collects per-field messages into a [`ValidationError`]. Store failures are
//! returned as errors rather than recorded as form errors.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use simple_auth_core::{AuthError, AuthResult, ValidationError};
use simple_auth_http::QueryDict;

use crate::backends::AuthBackend;
use crate::hashers::PasswordHashers;
use crate::manager::{ExtraFields, UserManager};
use crate::store::Store;
use crate::user::User;

/// Key under which errors not tied to a field are reported.
pub const NON_FIELD_ERRORS: &str = "__all__";

pub const EMAIL_MAX_LENGTH: usize = 255;
pub const NAME_MAX_LENGTH: usize = 100;

const REQUIRED: &str = "This field is required.";
const INVALID_EMAIL: &str = "Enter a valid email address.";
const DUPLICATE_EMAIL: &str = "A user with that email already exists.";
const PASSWORD_MISMATCH: &str = "The two password fields didn't match.";
const PASSWORD_INCORRECT: &str =
    "Your old password was entered incorrectly. Please enter it again.";
const INVALID_LOGIN: &str =
    "Please enter a correct email and password. Note that both fields may be case-sensitive.";
const INACTIVE: &str = "This account is inactive.";
const PASSWORD_HELP: &str = "Raw passwords are not stored, so there is no way to see this user's \
     password, but you can change the password using this form.";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@.]+$").expect("valid regex"))
}

// ── Field descriptions ──────────────────────────────────────────────

/// How a form field is presented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    pub widget: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub help_text: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<&'static str>,
}

impl FormField {
    const fn new(
        name: &'static str,
        label: &'static str,
        widget: &'static str,
        required: bool,
    ) -> Self {
        Self {
            name,
            label,
            widget,
            required,
            help_text: "",
            placeholder: None,
        }
    }

    const fn help(mut self, help_text: &'static str) -> Self {
        self.help_text = help_text;
        self
    }

    const fn with_placeholder(mut self) -> Self {
        self.placeholder = Some(self.label);
        self
    }
}

// ── Cleaning helpers ────────────────────────────────────────────────

fn required_value(
    data: &QueryDict,
    field: &str,
    strip: bool,
    errors: &mut ValidationError,
) -> Option<String> {
    let value = data.get(field).unwrap_or_default();
    let value = if strip { value.trim() } else { value };
    if value.is_empty() {
        errors.add_field_error(field, REQUIRED);
        None
    } else {
        Some(value.to_string())
    }
}

fn clean_email(data: &QueryDict, errors: &mut ValidationError) -> Option<String> {
    let email = required_value(data, "email", true, errors)?;
    if email.chars().count() > EMAIL_MAX_LENGTH {
        errors.add_field_error(
            "email",
            format!("Ensure this value has at most {EMAIL_MAX_LENGTH} characters."),
        );
        return None;
    }
    if !email_regex().is_match(&email) {
        errors.add_field_error("email", INVALID_EMAIL);
        return None;
    }
    Some(email)
}

fn clean_name(data: &QueryDict, field: &str, errors: &mut ValidationError) -> String {
    let value = data.get(field).unwrap_or_default().trim().to_string();
    if value.chars().count() > NAME_MAX_LENGTH {
        errors.add_field_error(
            field,
            format!("Ensure this value has at most {NAME_MAX_LENGTH} characters."),
        );
    }
    value
}

fn clean_password_pair(
    data: &QueryDict,
    first: &str,
    second: &str,
    errors: &mut ValidationError,
) -> Option<String> {
    let password1 = required_value(data, first, false, errors);
    let password2 = required_value(data, second, false, errors);
    match (password1, password2) {
        (Some(p1), Some(p2)) if p1 == p2 => Some(p1),
        (Some(_), Some(_)) => {
            errors.add_field_error(second, PASSWORD_MISMATCH);
            None
        }
        _ => None,
    }
}

fn checkbox(data: &QueryDict, field: &str) -> bool {
    data.get(field)
        .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "on" | "true" | "1"))
}

fn not_validated() -> AuthError {
    AuthError::ValidationError(ValidationError::new(
        "The form has not been validated, or has errors.",
        "invalid",
    ))
}

// ── UserCreationForm ────────────────────────────────────────────────

/// Creates a user from an email, optional names and a confirmed password.
#[derive(Debug, Clone)]
pub struct UserCreationForm {
    data: QueryDict,
    errors: ValidationError,
    cleaned: Option<(String, String, String, String)>,
}

impl UserCreationForm {
    pub const FIELDS: [FormField; 5] = [
        FormField::new("email", "Email", "email", true),
        FormField::new("first_name", "First name", "text", false),
        FormField::new("last_name", "Last name", "text", false),
        FormField::new("password1", "Password", "password", true).help("Enter a password."),
        FormField::new("password2", "Password confirmation", "password", true)
            .help("Enter the same password as above, for verification."),
    ];

    pub fn new(data: QueryDict) -> Self {
        Self {
            data,
            errors: ValidationError::default(),
            cleaned: None,
        }
    }

    pub async fn is_valid(&mut self, store: &dyn Store) -> AuthResult<bool> {
        let mut errors = ValidationError::default();
        let email = clean_email(&self.data, &mut errors);
        let first_name = clean_name(&self.data, "first_name", &mut errors);
        let last_name = clean_name(&self.data, "last_name", &mut errors);
        let password = clean_password_pair(&self.data, "password1", "password2", &mut errors);

        if let Some(email) = &email {
            if store.email_exists(email, None).await? {
                errors.add_field_error("email", DUPLICATE_EMAIL);
            }
        }

        self.cleaned = match (email, password) {
            (Some(email), Some(password)) if errors.is_empty() => {
                Some((email, first_name, last_name, password))
            }
            _ => None,
        };
        self.errors = errors;
        Ok(self.cleaned.is_some())
    }

    pub const fn errors(&self) -> &ValidationError {
        &self.errors
    }

    /// Creates the user through the manager.
    pub async fn save(&self, manager: &UserManager) -> AuthResult<User> {
        let (email, first_name, last_name, password) =
            self.cleaned.as_ref().ok_or_else(not_validated)?;
        manager
            .create_user(
                email,
                Some(password),
                ExtraFields::new().first_name(first_name).last_name(last_name),
            )
            .await
    }
}

// ── UserChangeForm ──────────────────────────────────────────────────

/// Edits an existing user. The password is shown read-only.
#[derive(Debug, Clone)]
pub struct UserChangeForm {
    instance: User,
    data: QueryDict,
    errors: ValidationError,
    cleaned: Option<User>,
}

impl UserChangeForm {
    pub const FIELDS: [FormField; 10] = [
        FormField::new("email", "Email", "email", true),
        FormField::new("first_name", "First name", "text", false),
        FormField::new("last_name", "Last name", "text", false),
        FormField::new("password", "Password", "readonly", false).help(PASSWORD_HELP),
        FormField::new("force_password_change", "Force password change", "checkbox", false),
        FormField::new("is_active", "Active", "checkbox", false),
        FormField::new("is_staff", "Staff status", "checkbox", false),
        FormField::new("is_superuser", "Superuser status", "checkbox", false),
        FormField::new("groups", "Groups", "select_multiple", false),
        FormField::new("user_permissions", "User permissions", "select_multiple", false),
    ];

    pub fn new(instance: User, data: QueryDict) -> Self {
        Self {
            instance,
            data,
            errors: ValidationError::default(),
            cleaned: None,
        }
    }

    pub const fn instance(&self) -> &User {
        &self.instance
    }

    pub async fn is_valid(&mut self, store: &dyn Store) -> AuthResult<bool> {
        let mut errors = ValidationError::default();
        let email = clean_email(&self.data, &mut errors);
        let first_name = clean_name(&self.data, "first_name", &mut errors);
        let last_name = clean_name(&self.data, "last_name", &mut errors);

        if let Some(email) = &email {
            if store.email_exists(email, self.instance.id).await? {
                errors.add_field_error("email", DUPLICATE_EMAIL);
            }
        }

        let groups: Vec<String> = self
            .data
            .get_list("groups")
            .into_iter()
            .map(String::from)
            .collect();
        for name in &groups {
            if store.get_group_by_name(name).await?.is_none() {
                errors.add_field_error(
                    "groups",
                    format!("Select a valid choice. {name} is not one of the available choices."),
                );
            }
        }

        self.cleaned = match email {
            Some(email) if errors.is_empty() => Some(User {
                email,
                first_name,
                last_name,
                force_password_change: checkbox(&self.data, "force_password_change"),
                is_active: checkbox(&self.data, "is_active"),
                is_staff: checkbox(&self.data, "is_staff"),
                is_superuser: checkbox(&self.data, "is_superuser"),
                groups,
                user_permissions: self
                    .data
                    .get_list("user_permissions")
                    .into_iter()
                    .map(String::from)
                    .collect(),
                ..self.instance.clone()
            }),
            _ => None,
        };
        self.errors = errors;
        Ok(self.cleaned.is_some())
    }

    pub const fn errors(&self) -> &ValidationError {
        &self.errors
    }

    pub async fn save(&self, store: &dyn Store) -> AuthResult<User> {
        let mut user = self.cleaned.clone().ok_or_else(not_validated)?;
        store.save_user(&mut user).await?;
        Ok(user)
    }
}

// ── AuthenticationForm ──────────────────────────────────────────────

/// Email and password login. Each field's placeholder is its label.
#[derive(Debug, Clone)]
pub struct AuthenticationForm {
    data: QueryDict,
    errors: ValidationError,
    user: Option<User>,
}

impl AuthenticationForm {
    pub const FIELDS: [FormField; 2] = [
        FormField::new("email", "Email", "email", true).with_placeholder(),
        FormField::new("password", "Password", "password", true).with_placeholder(),
    ];

    pub fn new(data: QueryDict) -> Self {
        Self {
            data,
            errors: ValidationError::default(),
            user: None,
        }
    }

    pub async fn is_valid(&mut self, backend: &dyn AuthBackend) -> AuthResult<bool> {
        let mut errors = ValidationError::default();
        let email = required_value(&self.data, "email", true, &mut errors);
        let password = required_value(&self.data, "password", false, &mut errors);

        self.user = None;
        if let (Some(email), Some(password)) = (email, password) {
            match backend.authenticate(&email, &password).await? {
                Some(user) if !user.is_active => errors.add_field_error(NON_FIELD_ERRORS, INACTIVE),
                Some(user) => self.user = Some(user),
                None => errors.add_field_error(NON_FIELD_ERRORS, INVALID_LOGIN),
            }
        }
        self.errors = errors;
        Ok(self.user.is_some())
    }

    pub const fn errors(&self) -> &ValidationError {
        &self.errors
    }

    /// The authenticated user after successful validation.
    pub const fn get_user(&self) -> Option<&User> {
        self.user.as_ref()
    }
}

// ── Password forms ──────────────────────────────────────────────────

/// Lets a user change their own password after confirming the old one.
#[derive(Debug, Clone)]
pub struct PasswordChangeForm {
    user: User,
    data: QueryDict,
    errors: ValidationError,
    new_password: Option<String>,
}

impl PasswordChangeForm {
    pub const FIELDS: [FormField; 3] = [
        FormField::new("old_password", "Old password", "password", true),
        FormField::new("new_password1", "New password", "password", true),
        FormField::new("new_password2", "New password confirmation", "password", true),
    ];

    pub fn new(user: User, data: QueryDict) -> Self {
        Self {
            user,
            data,
            errors: ValidationError::default(),
            new_password: None,
        }
    }

    pub async fn is_valid(&mut self, hashers: &PasswordHashers) -> AuthResult<bool> {
        let mut errors = ValidationError::default();
        if let Some(old) = required_value(&self.data, "old_password", false, &mut errors) {
            if !self.user.check_password_with(&old, hashers).await? {
                errors.add_field_error("old_password", PASSWORD_INCORRECT);
            }
        }
        let new_password =
            clean_password_pair(&self.data, "new_password1", "new_password2", &mut errors);

        self.new_password = new_password.filter(|_| errors.is_empty());
        self.errors = errors;
        Ok(self.new_password.is_some())
    }

    pub const fn errors(&self) -> &ValidationError {
        &self.errors
    }

    /// Sets the new password, which also clears `force_password_change`.
    pub async fn save(&self, store: &dyn Store, hashers: &PasswordHashers) -> AuthResult<User> {
        let password = self.new_password.as_deref().ok_or_else(not_validated)?;
        set_and_save(self.user.clone(), password, store, hashers).await
    }
}

/// Lets an administrator set a user's password without knowing the old one.
#[derive(Debug, Clone)]
pub struct AdminPasswordChangeForm {
    user: User,
    data: QueryDict,
    errors: ValidationError,
    new_password: Option<String>,
}

impl AdminPasswordChangeForm {
    pub const FIELDS: [FormField; 2] = [
        FormField::new("password1", "Password", "password", true),
        FormField::new("password2", "Password (again)", "password", true)
            .help("Enter the same password as before, for verification."),
    ];

    pub fn new(user: User, data: QueryDict) -> Self {
        Self {
            user,
            data,
            errors: ValidationError::default(),
            new_password: None,
        }
    }

    pub fn is_valid(&mut self) -> bool {
        let mut errors = ValidationError::default();
        self.new_password = clean_password_pair(&self.data, "password1", "password2", &mut errors);
        self.errors = errors;
        self.new_password.is_some()
    }

    pub const fn errors(&self) -> &ValidationError {
        &self.errors
    }

    pub async fn save(&self, store: &dyn Store, hashers: &PasswordHashers) -> AuthResult<User> {
        let password = self.new_password.as_deref().ok_or_else(not_validated)?;
        set_and_save(self.user.clone(), password, store, hashers).await
    }
}

async fn set_and_save(
    mut user: User,
    password: &str,
    store: &dyn Store,
    hashers: &PasswordHashers,
) -> AuthResult<User> {
    user.set_password_with(Some(password), hashers).await?;
    store.save_user(&mut user).await?;
    tracing::info!(user_id = user.id, "password changed");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backends::ModelBackend;
    use crate::group::Group;
    use crate::hashers::Pbkdf2Hasher;
    use crate::store::{GroupStore, InMemoryStore, UserStore};

    fn hashers() -> PasswordHashers {
        PasswordHashers::new(vec![Arc::new(Pbkdf2Hasher { iterations: 1000 })]).unwrap()
    }

    async fn setup() -> (Arc<dyn Store>, UserManager, User) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let manager = UserManager::new(store.clone()).with_hashers(hashers());
        let mut user = manager
            .create_user("test@example.com", Some("password"), ExtraFields::new())
            .await
            .unwrap();
        user.force_password_change = true;
        store.save_user(&mut user).await.unwrap();
        (store, manager, user)
    }

    fn data(pairs: &[(&str, &str)]) -> QueryDict {
        QueryDict::from_pairs(pairs.iter().copied())
    }

    // ── UserCreationForm ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_creation_form_saves_user() {
        let (store, manager, _) = setup().await;
        let mut form = UserCreationForm::new(data(&[
            ("email", "New@Example.com"),
            ("first_name", "Thomas"),
            ("password1", "s3cret-pass"),
            ("password2", "s3cret-pass"),
        ]));
        assert!(form.is_valid(store.as_ref()).await.unwrap());
        let user = form.save(&manager).await.unwrap();
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.first_name, "Thomas");
        assert!(user.check_password_with("s3cret-pass", &hashers()).await.unwrap());
    }

    #[tokio::test]
    async fn test_creation_form_errors() {
        let (store, manager, _) = setup().await;
        let mut form = UserCreationForm::new(data(&[
            ("email", "TEST@example.com"),
            ("password1", "one"),
            ("password2", "two"),
        ]));
        assert!(!form.is_valid(store.as_ref()).await.unwrap());
        let errors = form.errors();
        assert_eq!(errors.field_errors["email"], vec![DUPLICATE_EMAIL]);
        assert_eq!(errors.field_errors["password2"], vec![PASSWORD_MISMATCH]);
        assert!(form.save(&manager).await.is_err());
    }

    #[tokio::test]
    async fn test_creation_form_required_and_invalid() {
        let (store, _, _) = setup().await;
        let mut form = UserCreationForm::new(data(&[("email", "not-an-email")]));
        assert!(!form.is_valid(store.as_ref()).await.unwrap());
        assert_eq!(form.errors().field_errors["email"], vec![INVALID_EMAIL]);
        assert_eq!(form.errors().field_errors["password1"], vec![REQUIRED]);
        assert_eq!(form.errors().field_errors["password2"], vec![REQUIRED]);
    }

    // ── UserChangeForm ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_change_form_updates_and_keeps_password() {
        let (store, _, user) = setup().await;
        store.save_group(&mut Group::new("editors")).await.unwrap();
        let mut form = UserChangeForm::new(
            user.clone(),
            data(&[
                ("email", "test@example.com"),
                ("first_name", "Thomas"),
                ("is_active", "on"),
                ("is_staff", "on"),
                ("groups", "editors"),
                ("password", "ignored"),
            ]),
        );
        assert!(form.is_valid(store.as_ref()).await.unwrap(), "{:?}", form.errors());
        let saved = form.save(store.as_ref()).await.unwrap();
        assert!(saved.is_staff);
        assert!(!saved.is_superuser);
        assert!(!saved.force_password_change);
        assert_eq!(saved.groups, vec!["editors".to_string()]);
        assert_eq!(saved.password, user.password);
    }

    #[tokio::test]
    async fn test_change_form_rejects_taken_email_and_unknown_group() {
        let (store, manager, user) = setup().await;
        manager
            .create_user("other@example.com", None, ExtraFields::new())
            .await
            .unwrap();
        let mut form = UserChangeForm::new(
            user,
            data(&[("email", "OTHER@example.com"), ("groups", "ghosts")]),
        );
        assert!(!form.is_valid(store.as_ref()).await.unwrap());
        assert!(form.errors().has_field_error("email"));
        assert!(form.errors().has_field_error("groups"));
    }

    // ── AuthenticationForm ───────────────────────────────────────────

    #[test]
    fn test_authentication_form_placeholders_match_labels() {
        for field in &AuthenticationForm::FIELDS {
            assert_eq!(field.placeholder, Some(field.label));
        }
    }

    #[tokio::test]
    async fn test_authentication_form() {
        let (store, _, user) = setup().await;
        let backend = ModelBackend::new(store).with_hashers(hashers());

        let mut form = AuthenticationForm::new(data(&[
            ("email", "test@example.com"),
            ("password", "password"),
        ]));
        assert!(form.is_valid(&backend).await.unwrap());
        assert_eq!(form.get_user().unwrap().id, user.id);

        let mut form = AuthenticationForm::new(data(&[
            ("email", "test@example.com"),
            ("password", "nope"),
        ]));
        assert!(!form.is_valid(&backend).await.unwrap());
        assert_eq!(form.errors().field_errors[NON_FIELD_ERRORS], vec![INVALID_LOGIN]);
        assert!(form.get_user().is_none());
    }

    // ── Password forms ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_password_change_form_clears_flag() {
        let (store, _, user) = setup().await;
        let mut form = PasswordChangeForm::new(
            user,
            data(&[
                ("old_password", "password"),
                ("new_password1", "brand-new"),
                ("new_password2", "brand-new"),
            ]),
        );
        assert!(form.is_valid(&hashers()).await.unwrap());
        let saved = form.save(store.as_ref(), &hashers()).await.unwrap();
        assert!(!saved.force_password_change);

        let stored = store.get_user(saved.id.unwrap()).await.unwrap().unwrap();
        assert!(!stored.force_password_change);
        assert!(stored.check_password_with("brand-new", &hashers()).await.unwrap());
    }

    #[tokio::test]
    async fn test_password_change_form_wrong_old_password() {
        let (_, _, user) = setup().await;
        let mut form = PasswordChangeForm::new(
            user,
            data(&[
                ("old_password", "wrong"),
                ("new_password1", "brand-new"),
                ("new_password2", "brand-new"),
            ]),
        );
        assert!(!form.is_valid(&hashers()).await.unwrap());
        assert_eq!(form.errors().field_errors["old_password"], vec![PASSWORD_INCORRECT]);
    }

    #[tokio::test]
    async fn test_admin_password_change_form() {
        let (store, _, user) = setup().await;
        let mut form = AdminPasswordChangeForm::new(
            user.clone(),
            data(&[("password1", "a"), ("password2", "b")]),
        );
        assert!(!form.is_valid());
        assert!(form.errors().has_field_error("password2"));

        let mut form = AdminPasswordChangeForm::new(
            user,
            data(&[("password1", "abc"), ("password2", "abc")]),
        );
        assert!(form.is_valid());
        let saved = form.save(store.as_ref(), &hashers()).await.unwrap();
        assert!(!saved.force_password_change);
    }
}
