//! Decoded header collection
//!
//! An ordered list of (name, value) pairs with case-insensitive lookups.
//! Insertion order and duplicate names are preserved exactly as decoded;
//! values are never joined or split, so multi-valued headers like
//! Set-Cookie keep their wire shape.

use crate::hpack::HeaderEntry;
use std::fmt;

/// HTTP header collection
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    /// Create a new empty headers collection
    pub fn new() -> Self {
        Headers {
            headers: Vec::new(),
        }
    }

    /// Append a header.
    ///
    /// A repeated name (case-insensitive) adds another value rather than
    /// replacing the existing one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Get the first value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get all values for a header (case-insensitive)
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Count how many times a header appears
    pub fn count(&self, name: &str) -> usize {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .count()
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Remove all instances of a header (case-insensitive), returning how
    /// many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let initial_len = self.headers.len();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        initial_len - self.headers.len()
    }

    /// Number of headers
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterate over all headers in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl From<Vec<HeaderEntry>> for Headers {
    fn from(entries: Vec<HeaderEntry>) -> Self {
        let mut headers = Headers::new();
        for entry in entries {
            headers.insert(entry.name, entry.value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut headers = Headers::new();
        headers.insert("content-type", "text/html");
        headers.insert("content-length", "42");

        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("content-length"), Some("42"));
        assert_eq!(headers.get("missing"), None);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = Headers::new();
        headers.insert("content-type", "text/html");

        assert_eq!(headers.get("Content-Type"), Some("text/html"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
        assert!(headers.contains("CoNtEnT-TyPe"));
    }

    #[test]
    fn test_duplicates_preserved_in_order() {
        let mut headers = Headers::new();
        headers.insert("set-cookie", "a=1");
        headers.insert("set-cookie", "b=2; Expires=Wed, 21 Oct 2026 07:28:00 GMT");
        headers.insert("set-cookie", "c=3");

        let values = headers.get_all("set-cookie");
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], "a=1");
        // Comma inside a value stays intact
        assert_eq!(values[1], "b=2; Expires=Wed, 21 Oct 2026 07:28:00 GMT");
        assert_eq!(values[2], "c=3");
        assert_eq!(headers.count("set-cookie"), 3);
        assert_eq!(headers.get("set-cookie"), Some("a=1"));
    }

    #[test]
    fn test_remove() {
        let mut headers = Headers::new();
        headers.insert("x-remove", "value1");
        headers.insert("x-keep", "value2");
        headers.insert("X-Remove", "value3");

        assert_eq!(headers.remove("x-remove"), 2);
        assert_eq!(headers.get("x-remove"), None);
        assert_eq!(headers.get("x-keep"), Some("value2"));
    }

    #[test]
    fn test_from_decoded_entries() {
        let entries = vec![
            HeaderEntry::new("content-type", "text/html"),
            HeaderEntry::new("vary", "accept-encoding"),
        ];
        let headers = Headers::from(entries);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("vary"), Some("accept-encoding"));
    }

    #[test]
    fn test_iteration_order() {
        let mut headers = Headers::new();
        headers.insert("a", "1");
        headers.insert("b", "2");
        headers.insert("c", "3");

        let collected: Vec<_> = headers.iter().collect();
        assert_eq!(collected, vec![("a", "1"), ("b", "2"), ("c", "3")]);
    }
}
