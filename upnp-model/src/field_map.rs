//! Insertion-ordered key/value store.
//!
//! Every wire-format model in the workspace (SSDP headers, description
//! elements, SOAP arguments, event property sets) is backed by a [`FieldMap`].
//! Keys are unique under the map's [`KeyMatch`] rule, order of first insertion
//! is preserved and writing an existing key replaces its value in place.

use std::fmt;

/// Equality rule applied to keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMatch {
    /// Byte-for-byte comparison (XML element names, SOAP arguments)
    #[default]
    Exact,
    /// ASCII case-insensitive comparison (HTTP/SSDP headers)
    IgnoreAsciiCase,
}

impl KeyMatch {
    fn matches(self, a: &str, b: &str) -> bool {
        match self {
            KeyMatch::Exact => a == b,
            KeyMatch::IgnoreAsciiCase => a.eq_ignore_ascii_case(b),
        }
    }
}

/// Ordered collection of `(key, value)` string pairs.
#[derive(Clone, Default)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
    key_match: KeyMatch,
}

impl FieldMap {
    /// Create an empty map with exact key matching.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map whose keys compare case-insensitively.
    pub fn case_insensitive() -> Self {
        Self {
            entries: Vec::new(),
            key_match: KeyMatch::IgnoreAsciiCase,
        }
    }

    pub fn with_key_match(key_match: KeyMatch) -> Self {
        Self {
            entries: Vec::new(),
            key_match,
        }
    }

    pub fn key_match(&self) -> KeyMatch {
        self.key_match
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| self.key_match.matches(k, key))
    }

    /// Get the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key).map(|i| self.entries[i].1.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Insert or update `key`.
    ///
    /// An existing key keeps its position and original spelling; only the
    /// value changes. Returns the previous value, if any.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, v)| v.as_str())
    }

    /// Iterate `(key, value)` pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for FieldMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

/// Two maps are equal when they hold the same pairs in the same order.
impl PartialEq for FieldMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for FieldMap {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        map.extend(iter);
        map
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for FieldMap {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

impl IntoIterator for FieldMap {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
