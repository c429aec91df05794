//! Admin configuration for users.

use simple_auth::user::APP_LABEL;

use crate::model_admin::{Fieldset, ModelAdmin};

/// The user admin: email-first fieldsets, flag filters and the `hijack` action.
pub fn user_admin() -> ModelAdmin {
    ModelAdmin::new(APP_LABEL, "user")
        .verbose_name("user")
        .verbose_name_plural("users")
        .add_fieldsets(vec![Fieldset::new(vec![
            "email",
            "first_name",
            "last_name",
            "password1",
            "password2",
        ])
        .name("Primary fields")])
        .fieldsets(vec![
            Fieldset::new(vec![
                "email",
                "first_name",
                "last_name",
                "password",
                "force_password_change",
            ])
            .name("Primary fields"),
            Fieldset::new(vec![
                "is_active",
                "is_staff",
                "is_superuser",
                "groups",
                "user_permissions",
            ])
            .name("Permissions"),
            Fieldset::new(vec!["last_login", "date_joined"]).name("Additional information"),
        ])
        .ordering(vec!["email"])
        .list_display(vec![
            "pk",
            "email",
            "first_name",
            "last_name",
            "is_active",
            "is_staff",
            "is_superuser",
        ])
        .list_filter(vec!["is_active", "is_staff", "is_superuser", "date_joined"])
        .search_fields(vec!["id", "email", "first_name", "last_name"])
        .readonly_fields(vec!["date_joined", "last_login"])
        .filter_horizontal(vec!["groups", "user_permissions"])
        .actions(vec!["hijack"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_admin_layout() {
        let admin = user_admin();
        assert_eq!(admin.model_key(), "simple_authentication.user");

        let names: Vec<_> = admin
            .fieldsets
            .iter()
            .map(|fs| fs.name.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["Primary fields", "Permissions", "Additional information"]);
        assert_eq!(
            admin.fieldsets[0].fields,
            vec!["email", "first_name", "last_name", "password", "force_password_change"]
        );
        assert_eq!(
            admin.add_fieldsets[0].fields,
            vec!["email", "first_name", "last_name", "password1", "password2"]
        );
    }

    #[test]
    fn test_user_admin_list_options() {
        let admin = user_admin();
        assert_eq!(admin.ordering, vec!["email"]);
        assert_eq!(
            admin.list_display,
            vec!["pk", "email", "first_name", "last_name", "is_active", "is_staff", "is_superuser"]
        );
        assert_eq!(admin.list_filter, vec!["is_active", "is_staff", "is_superuser", "date_joined"]);
        assert_eq!(admin.search_fields, vec!["id", "email", "first_name", "last_name"]);
        assert!(admin.is_readonly("date_joined") && admin.is_readonly("last_login"));
        assert_eq!(admin.filter_horizontal, vec!["groups", "user_permissions"]);
        assert_eq!(admin.action_names, vec!["hijack"]);
    }
}
