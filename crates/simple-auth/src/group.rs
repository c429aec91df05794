//! Groups and permissions.
//!
//! Permissions are written `"app_label.codename"` (e.g.
//! `"simple_authentication.change_user"`). A user's effective permissions
//! are its own plus those of every group it belongs to.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A single permission on a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Permission {
    /// Machine-readable identifier, e.g. `change_user`.
    pub codename: String,
    /// Human-readable name, e.g. `Can change user`.
    pub name: String,
    /// `app_label.model`, e.g. `simple_authentication.user`.
    pub content_type: String,
}

impl Permission {
    pub fn new(
        codename: impl Into<String>,
        name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            codename: codename.into(),
            name: name.into(),
            content_type: content_type.into(),
        }
    }

    pub fn app_label(&self) -> &str {
        self.content_type
            .split_once('.')
            .map_or(self.content_type.as_str(), |(app, _)| app)
    }

    /// Returns `"app_label.codename"`.
    pub fn full_codename(&self) -> String {
        format!("{}.{}", self.app_label(), self.codename)
    }
}

/// A named set of permissions shared by its members.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    /// Assigned by the store on first save.
    pub id: Option<i64>,
    pub name: String,
    pub permissions: Vec<Permission>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            permissions: Vec::new(),
        }
    }

    pub const fn pk(&self) -> Option<i64> {
        self.id
    }

    pub fn add_permission(&mut self, permission: Permission) {
        if !self.permissions.contains(&permission) {
            self.permissions.push(permission);
        }
    }

    pub fn remove_permission(&mut self, codename: &str) {
        self.permissions.retain(|p| p.codename != codename);
    }

    /// Returns every permission as `"app_label.codename"`.
    pub fn get_permissions(&self) -> HashSet<String> {
        self.permissions
            .iter()
            .map(Permission::full_codename)
            .collect()
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// The add, change, delete and view permissions of a model.
pub fn default_permissions(app_label: &str, model_name: &str) -> Vec<Permission> {
    ["add", "change", "delete", "view"]
        .iter()
        .map(|action| {
            Permission::new(
                format!("{action}_{model_name}"),
                format!("Can {action} {model_name}"),
                format!("{app_label}.{model_name}"),
            )
        })
        .collect()
}
