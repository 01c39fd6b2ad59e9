//! Ordered header list.

use std::fmt;

/// Header fields in arrival order.
///
/// Names compare ASCII-case-insensitively and a name may repeat; [`get`]
/// returns the first occurrence, [`set`] collapses every occurrence into one.
///
/// ```
/// use thunder::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Vary", "Origin");
/// headers.insert("vary", "Accept");
/// assert_eq!(headers.get_all("VARY").count(), 2);
///
/// headers.set("Vary", "Authorization");
/// assert_eq!(headers.get("vary"), Some("Authorization"));
/// ```
///
/// [`get`]: Headers::get
/// [`set`]: Headers::set
#[derive(Debug, Clone, Default)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Adds a field, keeping any existing ones with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Replaces every field named `name` with a single one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.fields.push((name, value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).next()
    }

    pub fn get_all<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.fields
            .iter()
            .filter(move |(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Drops every field named `name`; `true` if there was one.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|(field, _)| !field.eq_ignore_ascii_case(name));
        before != self.fields.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of fields, counting repeats.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// Wire form: one `name: value\r\n` line per field.
impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.iter()
            .try_for_each(|(name, value)| write!(f, "{name}: {value}\r\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("Authorization", "Bearer abc");
        assert_eq!(h.get("authorization"), Some("Bearer abc"));
        assert!(h.contains("AUTHORIZATION"));
        assert!(!h.contains("origin"));
    }

    #[test]
    fn value_outlives_the_lookup_name() {
        let mut h = Headers::new();
        h.insert("Vary", "Origin");
        let value = {
            let name = String::from("vary");
            h.get(&name)
        };
        assert_eq!(value, Some("Origin"));
    }

    #[test]
    fn remove_reports_whether_anything_went() {
        let mut h = Headers::new();
        h.insert("X-Trace", "1");
        h.insert("x-trace", "2");
        assert!(h.remove("X-TRACE"));
        assert!(h.is_empty());
        assert!(!h.remove("x-trace"));
    }

    #[test]
    fn display_writes_wire_lines() {
        let mut h = Headers::new();
        h.insert("Content-Type", "application/json");
        h.insert("Vary", "Origin");
        assert_eq!(
            h.to_string(),
            "Content-Type: application/json\r\nVary: Origin\r\n"
        );
    }
}
