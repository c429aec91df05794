//! Multi-valued dictionaries for query strings and form bodies.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left unescaped in `application/x-www-form-urlencoded` output.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A dictionary of GET or POST parameters where every key may carry several values.
///
/// # Examples
///
/// ```
/// use simple_auth_http::QueryDict;
///
/// let qd = QueryDict::parse("_selected_action=1&_selected_action=2&action=hijack");
/// assert_eq!(qd.get("action"), Some("hijack"));
/// assert_eq!(qd.get_list("_selected_action"), vec!["1", "2"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDict {
    data: BTreeMap<String, Vec<String>>,
}

impl QueryDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `key=value&key=value`, decoding `+` and percent escapes.
    pub fn parse(query_string: &str) -> Self {
        let mut qd = Self::new();
        for pair in query_string.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            qd.append(&decode(key), &decode(value));
        }
        qd
    }

    /// Builds a dictionary from key/value pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut qd = Self::new();
        for (k, v) in pairs {
            qd.append(k, v);
        }
        qd
    }

    /// Returns the last value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    /// Returns every value for `key`, empty when absent.
    pub fn get_list(&self, key: &str) -> Vec<&str> {
        self.data
            .get(key)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Replaces all values of `key` with `value`.
    pub fn set(&mut self, key: &str, value: &str) {
        self.data.insert(key.to_string(), vec![value.to_string()]);
    }

    pub fn append(&mut self, key: &str, value: &str) {
        self.data
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encodes back to a query string, keys in sorted order.
    pub fn urlencode(&self) -> String {
        let mut parts = Vec::new();
        for (key, values) in &self.data {
            for value in values {
                parts.push(format!("{}={}", encode(key), encode(value)));
            }
        }
        parts.join("&")
    }
}

/// Percent-encodes one query component.
pub fn encode(input: &str) -> String {
    utf8_percent_encode(input, QUERY_ENCODE_SET).to_string()
}

fn decode(input: &str) -> String {
    percent_decode_str(&input.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}
