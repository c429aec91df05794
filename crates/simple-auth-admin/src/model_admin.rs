//! Model administration configuration.
//!
//! [`ModelAdmin`] describes how a model is listed, searched, filtered and
//! edited in the admin. It is plain data built with chained setters.

use serde::{Deserialize, Serialize};

/// Configuration for how a model is displayed and managed in the admin.
///
/// # Examples
///
/// ```
/// use simple_auth_admin::model_admin::{Fieldset, ModelAdmin};
///
/// let admin = ModelAdmin::new("shop", "order")
///     .list_display(vec!["pk", "reference", "placed_at"])
///     .list_filter(vec!["placed_at"])
///     .search_fields(vec!["reference"])
///     .ordering(vec!["-placed_at"])
///     .fieldsets(vec![Fieldset::new(vec!["reference", "placed_at"]).name("Order")])
///     .list_per_page(25);
///
/// assert_eq!(admin.model_key(), "shop.order");
/// assert_eq!(admin.changelist_url_name(), "shop_order_changelist");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAdmin {
    /// The application label (e.g., "`simple_authentication`").
    pub app_label: String,
    /// The model name in lowercase (e.g., "user").
    pub model_name: String,
    pub verbose_name: String,
    pub verbose_name_plural: String,
    /// Columns of the list view.
    pub list_display: Vec<String>,
    /// Fields offered as list filters.
    pub list_filter: Vec<String>,
    /// Fields searched, case-insensitively, by the list view's `q` parameter.
    pub search_fields: Vec<String>,
    /// Default ordering for the list view (prefix with "-" for descending).
    pub ordering: Vec<String>,
    pub list_per_page: usize,
    pub readonly_fields: Vec<String>,
    /// Field groups of the change view.
    pub fieldsets: Vec<Fieldset>,
    /// Field groups of the add view.
    pub add_fieldsets: Vec<Fieldset>,
    /// Many-to-many fields rendered with the two-pane selector.
    pub filter_horizontal: Vec<String>,
    /// Names of the actions offered on the list view.
    pub action_names: Vec<String>,
}

impl ModelAdmin {
    pub fn new(app_label: impl Into<String>, model_name: impl Into<String>) -> Self {
        let model = model_name.into();
        let verbose = model.replace('_', " ");
        let verbose_plural = format!("{verbose}s");
        Self {
            app_label: app_label.into(),
            model_name: model,
            verbose_name: verbose,
            verbose_name_plural: verbose_plural,
            list_display: vec!["__str__".to_string()],
            list_filter: Vec::new(),
            search_fields: Vec::new(),
            ordering: Vec::new(),
            list_per_page: 100,
            readonly_fields: Vec::new(),
            fieldsets: Vec::new(),
            add_fieldsets: Vec::new(),
            filter_horizontal: Vec::new(),
            action_names: Vec::new(),
        }
    }

    #[must_use]
    pub fn verbose_name(mut self, name: impl Into<String>) -> Self {
        self.verbose_name = name.into();
        self
    }

    #[must_use]
    pub fn verbose_name_plural(mut self, name: impl Into<String>) -> Self {
        self.verbose_name_plural = name.into();
        self
    }

    #[must_use]
    pub fn list_display(mut self, fields: Vec<&str>) -> Self {
        self.list_display = fields.into_iter().map(String::from).collect();
        self
    }

    #[must_use]
    pub fn list_filter(mut self, fields: Vec<&str>) -> Self {
        self.list_filter = fields.into_iter().map(String::from).collect();
        self
    }

    #[must_use]
    pub fn search_fields(mut self, fields: Vec<&str>) -> Self {
        self.search_fields = fields.into_iter().map(String::from).collect();
        self
    }

    #[must_use]
    pub fn ordering(mut self, fields: Vec<&str>) -> Self {
        self.ordering = fields.into_iter().map(String::from).collect();
        self
    }

    #[must_use]
    pub const fn list_per_page(mut self, count: usize) -> Self {
        self.list_per_page = count;
        self
    }

    #[must_use]
    pub fn readonly_fields(mut self, fields: Vec<&str>) -> Self {
        self.readonly_fields = fields.into_iter().map(String::from).collect();
        self
    }

    #[must_use]
    pub fn fieldsets(mut self, fieldsets: Vec<Fieldset>) -> Self {
        self.fieldsets = fieldsets;
        self
    }

    #[must_use]
    pub fn add_fieldsets(mut self, fieldsets: Vec<Fieldset>) -> Self {
        self.add_fieldsets = fieldsets;
        self
    }

    #[must_use]
    pub fn filter_horizontal(mut self, fields: Vec<&str>) -> Self {
        self.filter_horizontal = fields.into_iter().map(String::from).collect();
        self
    }

    #[must_use]
    pub fn actions(mut self, names: Vec<&str>) -> Self {
        self.action_names = names.into_iter().map(String::from).collect();
        self
    }

    /// Returns the model key in `"app_label.model_name"` format.
    pub fn model_key(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }

    /// The URL name of the list view, e.g. `simple_authentication_user_changelist`.
    pub fn changelist_url_name(&self) -> String {
        self.url_name("changelist")
    }

    pub fn add_url_name(&self) -> String {
        self.url_name("add")
    }

    /// The URL name for `view` within the admin namespace.
    pub fn url_name(&self, view: &str) -> String {
        format!("{}_{}_{view}", self.app_label, self.model_name)
    }

    pub fn is_readonly(&self, field: &str) -> bool {
        self.readonly_fields.iter().any(|f| f == field)
    }
}

/// A titled group of fields on an add or change page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fieldset {
    pub name: Option<String>,
    pub fields: Vec<String>,
    /// CSS classes (e.g., `"collapse"`, `"wide"`).
    pub classes: Vec<String>,
    pub description: Option<String>,
}

impl Fieldset {
    /// Creates an untitled fieldset.
    pub fn new(fields: Vec<&str>) -> Self {
        Self {
            name: None,
            fields: fields.into_iter().map(String::from).collect(),
            classes: Vec::new(),
            description: None,
        }
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn classes(mut self, classes: Vec<&str>) -> Self {
        self.classes = classes.into_iter().map(String::from).collect();
        self
    }

    #[must_use]
    pub fn description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let admin = ModelAdmin::new("shop", "order_line");
        assert_eq!(admin.verbose_name, "order line");
        assert_eq!(admin.verbose_name_plural, "order lines");
        assert_eq!(admin.list_display, vec!["__str__"]);
        assert_eq!(admin.list_per_page, 100);
        assert!(admin.action_names.is_empty());
    }

    #[test]
    fn test_url_names() {
        let admin = ModelAdmin::new("simple_authentication", "user");
        assert_eq!(admin.model_key(), "simple_authentication.user");
        assert_eq!(admin.changelist_url_name(), "simple_authentication_user_changelist");
        assert_eq!(admin.add_url_name(), "simple_authentication_user_add");
        assert_eq!(admin.url_name("change"), "simple_authentication_user_change");
    }

    #[test]
    fn test_fieldset_builder() {
        let fs = Fieldset::new(vec!["a", "b"])
            .name("Primary fields")
            .classes(vec!["wide"])
            .description("Main data");
        assert_eq!(fs.name.as_deref(), Some("Primary fields"));
        assert_eq!(fs.fields, vec!["a", "b"]);
        assert_eq!(fs.classes, vec!["wide"]);
        assert_eq!(fs.description.as_deref(), Some("Main data"));
    }

    #[test]
    fn test_serializes() {
        let admin = ModelAdmin::new("shop", "order").readonly_fields(vec!["placed_at"]);
        assert!(admin.is_readonly("placed_at"));
        let json = serde_json::to_value(&admin).unwrap();
        assert_eq!(json["model_name"], "order");
        assert_eq!(json["readonly_fields"][0], "placed_at");
    }
}
