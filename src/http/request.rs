//! Outgoing request description.
//!
//! [`RequestConfig`] is what callers hand to the client: a method, a resource
//! path (or absolute URL), query [`Params`], an optional JSON body and extra
//! headers. [`WireRequest`] is the resolved form a transport sends.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::{Headers, Method};

/// Ordered query parameters.
///
/// Repeated names are allowed (`filter=Popular&filter=Trending`) and are sent
/// in insertion order.
///
/// # Examples
///
/// ```
/// use fetchkit::http::Params;
///
/// let params = Params::new().with("page", "2").with("key", "chair");
/// assert_eq!(params.to_query(), "page=2&key=chair");
/// assert_eq!(params.canonical_query(), "key=chair&page=2");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.push(name, value);
        self
    }

    /// Appends a parameter in place.
    pub fn push(&mut self, name: impl Into<String>, value: impl ToString) {
        self.pairs.push((name.into(), value.to_string()));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Pairs stably sorted by name; values of a repeated name keep their order.
    pub fn canonical(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<_> = self.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }

    /// Form-encoded query string in insertion order.
    pub fn to_query(&self) -> String {
        encode_pairs(self.iter())
    }

    /// Form-encoded query string in canonical (name-sorted) order.
    pub fn canonical_query(&self) -> String {
        encode_pairs(self.canonical())
    }
}

fn encode_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.push(k, v);
        }
        params
    }
}

/// A request as described by application code.
///
/// # Examples
///
/// ```
/// use fetchkit::http::{Method, RequestConfig};
///
/// let config = RequestConfig::get("/models")
///     .param("key", "chair")
///     .header("X-Client", "storefront");
///
/// assert_eq!(config.method, Method::Get);
/// assert_eq!(config.params.to_query(), "key=chair");
/// assert!(config.body.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    pub method: Method,
    /// Resource path relative to the client's base URL, or an absolute URL.
    pub url: String,
    pub params: Params,
    pub body: Option<Value>,
    pub headers: Headers,
}

impl RequestConfig {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Params::new(),
            body: None,
            headers: Headers::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    /// Replaces the query parameters.
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Appends one query parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push(name, value);
        self
    }

    /// Sets a JSON body. `Value::Null` means "no body".
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = (!body.is_null()).then_some(body);
        self
    }

    /// Serializes `body` and sets it as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] if `body` cannot be represented as JSON.
    pub fn json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, serde_json::Error> {
        Ok(self.body(serde_json::to_value(body)?))
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Resolves the target URL against `base` and appends the query parameters.
    ///
    /// Relative resources are joined the way browser HTTP clients join a base
    /// URL: the base path is kept, so `/models` against `http://host/api`
    /// becomes `http://host/api/models`.
    ///
    /// # Errors
    ///
    /// Returns a [`url::ParseError`] if the joined URL is not valid.
    pub fn resolve(&self, base: &Url) -> Result<Url, url::ParseError> {
        let mut url = match Url::parse(&self.url) {
            Ok(absolute) => absolute,
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!(
                "{}/{}",
                base.as_str().trim_end_matches('/'),
                self.url.trim_start_matches('/')
            ))?,
            Err(e) => return Err(e),
        };
        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(self.params.iter());
        }
        Ok(url)
    }
}

/// A fully resolved request: absolute URL, final headers, encoded body.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Bytes,
}

impl WireRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Sets a JSON body (already encoded).
    #[must_use]
    pub fn with_json(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.headers.insert_default("Content-Type", "application/json");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("http://api.local:5000/api").unwrap()
    }

    #[test]
    fn resolve_keeps_base_path() {
        let url = RequestConfig::get("/models").resolve(&base()).unwrap();
        assert_eq!(url.as_str(), "http://api.local:5000/api/models");

        let url = RequestConfig::get("models/trending").resolve(&base()).unwrap();
        assert_eq!(url.path(), "/api/models/trending");
    }

    #[test]
    fn resolve_appends_params_in_insertion_order() {
        let config = RequestConfig::get("/models")
            .param("key", "office chair")
            .param("filter", "Popular")
            .param("filter", "Trending");
        let url = config.resolve(&base()).unwrap();
        assert_eq!(
            url.query(),
            Some("key=office+chair&filter=Popular&filter=Trending")
        );
    }

    #[test]
    fn resolve_leaves_absolute_urls_alone() {
        let url = RequestConfig::get("https://cdn.example.com/x.json")
            .resolve(&base())
            .unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/x.json");
    }

    #[test]
    fn canonical_params_sort_by_name_only() {
        let params: Params = [("b", "1"), ("a", "2"), ("b", "0")].into_iter().collect();
        assert_eq!(params.canonical(), vec![("a", "2"), ("b", "1"), ("b", "0")]);
    }

    #[test]
    fn null_body_means_no_body() {
        let config = RequestConfig::delete("/models/1").json(&()).unwrap();
        assert!(config.body.is_none());

        let config = RequestConfig::post("/models/like")
            .json(&json!({"modelId": "m1"}))
            .unwrap();
        assert_eq!(config.body, Some(json!({"modelId": "m1"})));
    }

    #[test]
    fn with_json_defaults_content_type() {
        let url = Url::parse("http://localhost/categories").unwrap();
        let req = WireRequest::new(Method::Post, url.clone()).with_json(r#"{"name":"Chairs"}"#);
        assert_eq!(req.headers.get("content-type"), Some("application/json"));
        assert_eq!(req.body.as_ref(), br#"{"name":"Chairs"}"#);

        let mut req = WireRequest::new(Method::Post, url);
        req.headers.insert("Content-Type", "application/merge-patch+json");
        let req = req.with_json("{}");
        assert_eq!(req.headers.get("content-type"), Some("application/merge-patch+json"));
        assert_eq!(req.headers.len(), 1);
    }
}
