//! List filters, search and ordering for the admin list views.
//!
//! Records are filtered as JSON rows (see [`crate::changelist::AdminRecord`]).
//! Boolean fields take `true`/`false`; datetime fields take one of the
//! [`DateRange`] keywords.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single selectable choice of a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterChoice {
    pub display: String,
    /// The query-string value; empty means "no filter".
    pub value: String,
}

impl FilterChoice {
    pub fn new(display: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            display: display.into(),
            value: value.into(),
        }
    }
}

/// A filter of the list sidebar with its choices and current selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub field: String,
    pub title: String,
    pub choices: Vec<FilterChoice>,
    pub selected: Option<String>,
}

impl FilterSpec {
    pub fn new(field: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            title: title.into(),
            choices: Vec::new(),
            selected: None,
        }
    }

    #[must_use]
    pub fn add_choice(mut self, choice: FilterChoice) -> Self {
        self.choices.push(choice);
        self
    }

    #[must_use]
    pub fn selected(mut self, value: impl Into<String>) -> Self {
        self.selected = Some(value.into());
        self
    }

    /// A filter with "All", "Yes" and "No".
    pub fn boolean(field: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(field, title)
            .add_choice(FilterChoice::new("All", ""))
            .add_choice(FilterChoice::new("Yes", "true"))
            .add_choice(FilterChoice::new("No", "false"))
    }

    /// A filter with "Any date" and each [`DateRange`].
    pub fn date(field: impl Into<String>, title: impl Into<String>) -> Self {
        DateRange::ALL.iter().fold(
            Self::new(field, title).add_choice(FilterChoice::new("Any date", "")),
            |spec, range| spec.add_choice(FilterChoice::new(range.label(), range.as_str())),
        )
    }

    /// Builds the spec for `field`, choosing the choice set from `kind`.
    pub fn for_field(field: &str, kind: FieldKind) -> Self {
        let title = field.replace('_', " ");
        match kind {
            FieldKind::Boolean => Self::boolean(field, title),
            FieldKind::DateTime => Self::date(field, title),
            FieldKind::Text => Self::new(field, title),
        }
    }
}

/// How a filterable field is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Boolean,
    DateTime,
    Text,
}

/// Relative date windows of a datetime filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    Today,
    Past7Days,
    ThisMonth,
    ThisYear,
}

impl DateRange {
    pub const ALL: [Self; 4] = [Self::Today, Self::Past7Days, Self::ThisMonth, Self::ThisYear];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "today" => Some(Self::Today),
            "past_7_days" => Some(Self::Past7Days),
            "this_month" => Some(Self::ThisMonth),
            "this_year" => Some(Self::ThisYear),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Past7Days => "past_7_days",
            Self::ThisMonth => "this_month",
            Self::ThisYear => "this_year",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Past7Days => "Past 7 days",
            Self::ThisMonth => "This month",
            Self::ThisYear => "This year",
        }
    }

    /// The half-open `[start, end)` window containing `now`.
    pub fn bounds(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let today = now.date_naive();
        let tomorrow = today + Duration::days(1);
        let (start, end) = match self {
            Self::Today => (today, tomorrow),
            Self::Past7Days => (today - Duration::days(7), tomorrow),
            Self::ThisMonth => {
                let first = today.with_day(1).unwrap_or(today);
                let next = if first.month() == 12 {
                    NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
                };
                (first, next.unwrap_or(tomorrow))
            }
            Self::ThisYear => {
                let first = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
                let next = NaiveDate::from_ymd_opt(today.year() + 1, 1, 1).unwrap_or(tomorrow);
                (first, next)
            }
        };
        (midnight(start), midnight(end))
    }

    pub fn contains(self, moment: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let (start, end) = self.bounds(now);
        start <= moment && moment < end
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

fn value_matches(value: &Value, wanted: &str, now: DateTime<Utc>) -> bool {
    match value {
        Value::Bool(b) => b.to_string() == wanted,
        Value::Number(n) => n.to_string() == wanted,
        Value::String(s) => match DateRange::parse(wanted) {
            Some(range) => DateTime::parse_from_rfc3339(s)
                .is_ok_and(|moment| range.contains(moment.with_timezone(&Utc), now)),
            None => s == wanted,
        },
        Value::Null => wanted.is_empty() || wanted == "null",
        _ => false,
    }
}

/// Keeps the rows matching every `field -> value` filter.
///
/// Empty values are ignored. An unknown date keyword matches nothing.
pub fn apply_filters(
    rows: Vec<Value>,
    filters: &BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> Vec<Value> {
    let active: Vec<_> = filters.iter().filter(|(_, v)| !v.is_empty()).collect();
    if active.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            active.iter().all(|(field, wanted)| {
                row.get(field.as_str())
                    .is_some_and(|v| value_matches(v, wanted, now))
            })
        })
        .collect()
}

/// Keeps the rows where any of `search_fields` contains every term of
/// `query`, case-insensitively.
pub fn apply_search(rows: Vec<Value>, search_fields: &[String], query: &str) -> Vec<Value> {
    let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() || search_fields.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            terms.iter().all(|term| {
                search_fields.iter().any(|field| {
                    row.get(field.as_str()).is_some_and(|v| match v {
                        Value::String(s) => s.to_lowercase().contains(term.as_str()),
                        Value::Number(n) => n.to_string() == *term,
                        _ => false,
                    })
                })
            })
        })
        .collect()
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Sorts rows by `ordering`; a leading `-` sorts that field descending.
pub fn apply_ordering(mut rows: Vec<Value>, ordering: &[String]) -> Vec<Value> {
    if ordering.is_empty() {
        return rows;
    }
    rows.sort_by(|a, b| {
        ordering.iter().fold(Ordering::Equal, |acc, key| {
            acc.then_with(|| {
                let (field, descending) = key
                    .strip_prefix('-')
                    .map_or((key.as_str(), false), |f| (f, true));
                let ord = compare(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            })
        })
    });
    rows
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn rows() -> Vec<Value> {
        vec![
            json!({
                "id": 1,
                "email": "alice@example.com",
                "is_staff": true,
                "date_joined": "2024-03-15T08:00:00Z",
            }),
            json!({
                "id": 2,
                "email": "bob@example.com",
                "is_staff": false,
                "date_joined": "2024-03-10T08:00:00Z",
            }),
            json!({
                "id": 3,
                "email": "carol@example.org",
                "is_staff": false,
                "date_joined": "2024-01-02T08:00:00Z",
            }),
            json!({
                "id": 12,
                "email": "dave@example.org",
                "is_staff": true,
                "date_joined": "2023-12-31T23:00:00Z",
            }),
        ]
    }

    fn ids(rows: &[Value]) -> Vec<i64> {
        rows.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    fn filter(field: &str, value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(field.to_string(), value.to_string())])
    }

    // ── FilterSpec ──────────────────────────────────────────────────

    #[test]
    fn test_boolean_spec() {
        let spec = FilterSpec::boolean("is_active", "active");
        let values: Vec<_> = spec.choices.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["", "true", "false"]);
        assert_eq!(spec.choices[1].display, "Yes");
    }

    #[test]
    fn test_date_spec() {
        let spec = FilterSpec::for_field("date_joined", FieldKind::DateTime).selected("today");
        assert_eq!(spec.title, "date joined");
        assert_eq!(spec.choices.len(), 5);
        assert_eq!(spec.choices[0].display, "Any date");
        assert_eq!(spec.choices[2].value, "past_7_days");
        assert_eq!(spec.selected.as_deref(), Some("today"));
    }

    // ── DateRange ───────────────────────────────────────────────────

    #[test]
    fn test_date_range_parse() {
        for range in DateRange::ALL {
            assert_eq!(DateRange::parse(range.as_str()), Some(range));
        }
        assert_eq!(DateRange::parse("yesterday"), None);
    }

    #[test]
    fn test_date_range_bounds() {
        let (start, end) = DateRange::ThisMonth.bounds(now());
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());

        let december = Utc.with_ymd_and_hms(2024, 12, 20, 0, 0, 0).unwrap();
        let (_, end) = DateRange::ThisMonth.bounds(december);
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());

        let (start, end) = DateRange::Past7Days.bounds(now());
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap());
    }

    // ── apply_filters ───────────────────────────────────────────────

    #[test]
    fn test_filters_boolean() {
        assert_eq!(ids(&apply_filters(rows(), &filter("is_staff", "true"), now())), vec![1, 12]);
        assert_eq!(ids(&apply_filters(rows(), &filter("is_staff", "false"), now())), vec![2, 3]);
    }

    #[test]
    fn test_filters_dates() {
        let cases = [
            ("today", vec![1]),
            ("past_7_days", vec![1, 2]),
            ("this_month", vec![1, 2]),
            ("this_year", vec![1, 2, 3]),
            ("", vec![1, 2, 3, 12]),
        ];
        for (value, expected) in cases {
            let got = apply_filters(rows(), &filter("date_joined", value), now());
            assert_eq!(ids(&got), expected, "{value}");
        }
    }

    #[test]
    fn test_filters_unknown_field_matches_nothing() {
        assert!(apply_filters(rows(), &filter("missing", "true"), now()).is_empty());
    }

    // ── search and ordering ─────────────────────────────────────────

    #[test]
    fn test_search_is_case_insensitive() {
        let fields = vec!["email".to_string()];
        assert_eq!(ids(&apply_search(rows(), &fields, "EXAMPLE.ORG")), vec![3, 12]);
        assert_eq!(ids(&apply_search(rows(), &fields, "")), vec![1, 2, 3, 12]);
    }

    #[test]
    fn test_search_by_id_is_exact() {
        let fields = vec!["id".to_string(), "email".to_string()];
        assert_eq!(ids(&apply_search(rows(), &fields, "12")), vec![12]);
        assert_eq!(ids(&apply_search(rows(), &fields, "1")), vec![1]);
    }

    #[test]
    fn test_ordering() {
        let by_email = apply_ordering(rows(), &["-email".to_string()]);
        assert_eq!(ids(&by_email), vec![12, 3, 2, 1]);

        let by_staff_then_id = apply_ordering(rows(), &["-is_staff".to_string(), "id".to_string()]);
        assert_eq!(ids(&by_staff_then_id), vec![1, 12, 2, 3]);
    }
}
