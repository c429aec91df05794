//! Admin configuration for groups.

use simple_auth::user::APP_LABEL;

use crate::model_admin::{Fieldset, ModelAdmin};

/// The group admin: searchable by name, permissions in the two-pane selector.
pub fn group_admin() -> ModelAdmin {
    ModelAdmin::new(APP_LABEL, "group")
        .list_display(vec!["pk", "name"])
        .search_fields(vec!["name"])
        .ordering(vec!["name"])
        .fieldsets(vec![Fieldset::new(vec!["name", "permissions"])])
        .add_fieldsets(vec![Fieldset::new(vec!["name", "permissions"])])
        .filter_horizontal(vec!["permissions"])
}
