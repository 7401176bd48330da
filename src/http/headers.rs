//! Header list shared by outgoing requests and replies.
//!
//! Names compare case-insensitively; entries keep the order they were added
//! in, which is the order the transport hands them to the wire.

/// Ordered header list with case-insensitive lookup.
///
/// # Examples
///
/// ```
/// use fetchkit::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Accept", "application/json");
/// headers.set("accept", "text/plain");
/// headers.set_bearer("abc123");
///
/// assert_eq!(headers.get("ACCEPT"), Some("text/plain"));
/// assert_eq!(headers.get("authorization"), Some("Bearer abc123"));
/// assert_eq!(headers.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Adds an entry after any existing ones, even if the name repeats.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Leaves exactly one entry for `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.insert(name, value);
    }

    /// Sets `Authorization: Bearer <token>`, replacing any previous credential.
    pub fn set_bearer(&mut self, token: &str) {
        self.set("Authorization", format!("Bearer {token}"));
    }

    /// Adds `name` only if the list has no entry for it yet.
    pub fn insert_default(&mut self, name: &str, value: &str) {
        if self.get(name).is_none() {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find_map(|(key, value)| same_name(key, name).then_some(value))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Drops every entry for `name`.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(key, _)| !same_name(key, name));
    }

    /// Entry count; a repeated name counts once per entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Fills in entries from `defaults` that this list does not set itself.
    pub fn merge_defaults(&mut self, defaults: &Headers) {
        for (name, value) in defaults.iter() {
            self.insert_default(name, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}
