//! The list view of a model: filtering, search, ordering and paging.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use simple_auth::{Group, User};
use simple_auth_http::QueryDict;

use crate::filters::{apply_filters, apply_ordering, apply_search, FieldKind, FilterSpec};
use crate::model_admin::ModelAdmin;

/// Query parameter holding the search text.
pub const SEARCH_VAR: &str = "q";
/// Query parameter holding comma-separated ordering fields.
pub const ORDER_VAR: &str = "o";
/// Query parameter holding the 1-based page number.
pub const PAGE_VAR: &str = "p";

/// A record that can be listed in the admin.
pub trait AdminRecord: Clone + Send + Sync + 'static {
    fn pk(&self) -> Option<i64>;

    /// The record as a flat JSON row. Secrets are left out.
    fn to_row(&self) -> Value;

    /// How list filters treat `field`.
    fn field_kind(field: &str) -> FieldKind;
}

impl AdminRecord for User {
    fn pk(&self) -> Option<i64> {
        self.id
    }

    fn to_row(&self) -> Value {
        json!({
            "pk": self.id,
            "id": self.id,
            "__str__": self.to_string(),
            "email": self.email,
            "first_name": self.first_name,
            "last_name": self.last_name,
            "is_active": self.is_active,
            "is_staff": self.is_staff,
            "is_superuser": self.is_superuser,
            "force_password_change": self.force_password_change,
            "date_joined": self.date_joined,
            "last_login": self.last_login,
            "groups": self.groups,
            "user_permissions": self.user_permissions,
        })
    }

    fn field_kind(field: &str) -> FieldKind {
        match field {
            "is_active" | "is_staff" | "is_superuser" | "force_password_change" => {
                FieldKind::Boolean
            }
            "date_joined" | "last_login" => FieldKind::DateTime,
            _ => FieldKind::Text,
        }
    }
}

impl AdminRecord for Group {
    fn pk(&self) -> Option<i64> {
        self.id
    }

    fn to_row(&self) -> Value {
        let mut permissions: Vec<String> = self.get_permissions().into_iter().collect();
        permissions.sort();
        json!({
            "pk": self.id,
            "id": self.id,
            "__str__": self.name,
            "name": self.name,
            "permissions": permissions,
        })
    }

    fn field_kind(_field: &str) -> FieldKind {
        FieldKind::Text
    }
}

/// One page of a filtered, searched and ordered list.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeList {
    pub model: String,
    pub verbose_name_plural: String,
    /// The columns of each result.
    pub list_display: Vec<String>,
    pub results: Vec<Value>,
    /// Matches after filtering and search.
    pub result_count: usize,
    /// Records before filtering.
    pub full_count: usize,
    pub page: usize,
    pub num_pages: usize,
    pub search_query: String,
    pub ordering: Vec<String>,
    pub filters: Vec<FilterSpec>,
    pub actions: Vec<String>,
}

impl ChangeList {
    /// Builds the page requested by `params` out of `records`.
    pub fn build<T: AdminRecord>(
        admin: &ModelAdmin,
        records: &[T],
        params: &QueryDict,
        now: DateTime<Utc>,
    ) -> Self {
        let full_count = records.len();
        let rows: Vec<Value> = records.iter().map(AdminRecord::to_row).collect();

        let selected: BTreeMap<String, String> = admin
            .list_filter
            .iter()
            .filter_map(|field| params.get(field).map(|v| (field.clone(), v.to_string())))
            .collect();
        let filters = admin
            .list_filter
            .iter()
            .map(|field| {
                let spec = FilterSpec::for_field(field, T::field_kind(field));
                match selected.get(field) {
                    Some(value) if !value.is_empty() => spec.selected(value.clone()),
                    _ => spec,
                }
            })
            .collect();

        let search_query = params.get(SEARCH_VAR).unwrap_or_default().trim().to_string();
        let ordering: Vec<String> = params
            .get(ORDER_VAR)
            .map(|o| {
                o.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| admin.ordering.clone());

        let rows = apply_filters(rows, &selected, now);
        let rows = apply_search(rows, &admin.search_fields, &search_query);
        let rows = apply_ordering(rows, &ordering);

        let result_count = rows.len();
        let per_page = admin.list_per_page.max(1);
        let num_pages = result_count.div_ceil(per_page).max(1);
        let page = params
            .get(PAGE_VAR)
            .and_then(|p| p.parse::<usize>().ok())
            .unwrap_or(1)
            .clamp(1, num_pages);

        let results = rows
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .map(|row| project(&row, &admin.list_display))
            .collect();

        Self {
            model: admin.model_key(),
            verbose_name_plural: admin.verbose_name_plural.clone(),
            list_display: admin.list_display.clone(),
            results,
            result_count,
            full_count,
            page,
            num_pages,
            search_query,
            ordering,
            filters,
            actions: admin.action_names.clone(),
        }
    }
}

/// Keeps the `pk` and the displayed columns of a row.
fn project(row: &Value, columns: &[String]) -> Value {
    let mut out = serde_json::Map::new();
    out.insert("pk".into(), row.get("pk").cloned().unwrap_or(Value::Null));
    for column in columns {
        out.insert(column.clone(), row.get(column.as_str()).cloned().unwrap_or(Value::Null));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::group::group_admin;
    use crate::user::user_admin;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn user(id: i64, email: &str, staff: bool, joined: DateTime<Utc>) -> User {
        User {
            id: Some(id),
            email: email.into(),
            password: "pbkdf2_sha256$1$salt$hash".into(),
            is_staff: staff,
            date_joined: joined,
            ..User::default()
        }
    }

    fn users() -> Vec<User> {
        vec![
            user(1, "zed@example.com", true, now()),
            user(2, "amy@example.com", false, Utc.with_ymd_and_hms(2024, 5, 30, 0, 0, 0).unwrap()),
            user(3, "max@example.org", false, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
        ]
    }

    fn emails(cl: &ChangeList) -> Vec<&str> {
        cl.results.iter().filter_map(|r| r["email"].as_str()).collect()
    }

    #[test]
    fn test_user_row_hides_password() {
        let row = users()[0].to_row();
        assert!(row.get("password").is_none());
        assert_eq!(row["pk"], 1);
        assert_eq!(row["is_staff"], true);
    }

    #[test]
    fn test_default_ordering_by_email() {
        let cl = ChangeList::build(&user_admin(), &users(), &QueryDict::new(), now());
        assert_eq!(emails(&cl), vec!["amy@example.com", "max@example.org", "zed@example.com"]);
        assert_eq!(cl.result_count, 3);
        assert_eq!(cl.actions, vec!["hijack"]);
        assert_eq!(cl.filters.len(), 4);
        let columns: Vec<_> = cl.results[0].as_object().unwrap().keys().cloned().collect();
        assert!(columns.contains(&"is_superuser".to_string()));
        assert!(!columns.contains(&"password".to_string()));
    }

    #[test]
    fn test_filter_search_and_order_params() {
        let params = QueryDict::parse("is_staff=false&o=-email");
        let cl = ChangeList::build(&user_admin(), &users(), &params, now());
        assert_eq!(emails(&cl), vec!["max@example.org", "amy@example.com"]);
        assert_eq!(cl.full_count, 3);
        assert_eq!(cl.filters[1].selected.as_deref(), Some("false"));

        let params = QueryDict::parse("q=EXAMPLE.ORG");
        let cl = ChangeList::build(&user_admin(), &users(), &params, now());
        assert_eq!(emails(&cl), vec!["max@example.org"]);
        assert_eq!(cl.search_query, "EXAMPLE.ORG");
    }

    #[test]
    fn test_date_joined_filter() {
        let params = QueryDict::parse("date_joined=past_7_days");
        let cl = ChangeList::build(&user_admin(), &users(), &params, now());
        assert_eq!(emails(&cl), vec!["amy@example.com", "zed@example.com"]);
    }

    #[test]
    fn test_paging() {
        let admin = user_admin().list_per_page(2);
        let cl = ChangeList::build(&admin, &users(), &QueryDict::parse("p=2"), now());
        assert_eq!(cl.num_pages, 2);
        assert_eq!(cl.page, 2);
        assert_eq!(emails(&cl), vec!["zed@example.com"]);

        let cl = ChangeList::build(&admin, &users(), &QueryDict::parse("p=99"), now());
        assert_eq!(cl.page, 2);
    }

    #[test]
    fn test_group_changelist() {
        let groups = vec![
            Group { id: Some(1), name: "Editors".into(), permissions: Vec::new() },
            Group { id: Some(2), name: "Auditors".into(), permissions: Vec::new() },
        ];
        let cl = ChangeList::build(&group_admin(), &groups, &QueryDict::parse("q=edit"), now());
        assert_eq!(cl.results.len(), 1);
        assert_eq!(cl.results[0]["name"], "Editors");
        assert_eq!(cl.results[0]["pk"], 1);
    }
}
