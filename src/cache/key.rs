//! Canonical request identity shared by the cache and the dedup registry.

use std::fmt;

use serde_json::Value;

use crate::http::{Method, Params, RequestConfig};

/// Deterministic identity of a request: `METHOD:url:query:body`.
///
/// Query parameters are sorted by name before encoding, and JSON bodies are
/// serialized with object keys in sorted order (serde_json's default map is a
/// `BTreeMap`), so two requests that differ only in parameter or field order
/// share one key. A query written into the resource itself
/// (`/models?page=2`) is folded into the parameters first.
///
/// # Examples
///
/// ```
/// use fetchkit::{RequestKey, http::RequestConfig};
///
/// let a = RequestConfig::get("/models").param("key", "chair").param("page", 1);
/// let b = RequestConfig::get("/models").param("page", 1).param("key", "chair");
///
/// assert_eq!(RequestKey::derive(&a), RequestKey::derive(&b));
/// assert_eq!(RequestKey::derive(&a).as_str(), "GET:/models:key=chair&page=1:null");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn derive(config: &RequestConfig) -> Self {
        let body = config
            .body
            .as_ref()
            .map_or_else(|| "null".to_owned(), Value::to_string);
        let (resource, query) = match config.url.split_once('?') {
            Some((resource, embedded)) => {
                let mut params: Params = url::form_urlencoded::parse(embedded.as_bytes()).collect();
                for (name, value) in config.params.iter() {
                    params.push(name, value);
                }
                (resource, params.canonical_query())
            }
            None => (config.url.as_str(), config.params.canonical_query()),
        };
        Self(format!("{}:{resource}:{query}:{body}", config.method))
    }

    /// Prefix matching every key for `resource` under `method`, including
    /// nested resources (`/models` also covers `/models/trending`).
    ///
    /// Intended for [`ApiClient::invalidate_prefix`](crate::ApiClient::invalidate_prefix)
    /// after a mutation.
    pub fn resource_prefix(method: &Method, resource: &str) -> String {
        format!("{method}:{resource}")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<RequestKey> for String {
    fn from(key: RequestKey) -> String {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn param_order_does_not_matter() {
        let a = RequestConfig::get("/models").param("a", 1).param("b", 2);
        let b = RequestConfig::get("/models").param("b", 2).param("a", 1);
        assert_eq!(RequestKey::derive(&a), RequestKey::derive(&b));
    }

    #[test]
    fn body_field_order_does_not_matter() {
        let a = RequestConfig::post("/models/like")
            .body(json!({"userId": "u1", "modelId": "m1"}));
        let b = RequestConfig::post("/models/like")
            .body(json!({"modelId": "m1", "userId": "u1"}));
        assert_eq!(RequestKey::derive(&a), RequestKey::derive(&b));
        assert_eq!(
            RequestKey::derive(&a).as_str(),
            r#"POST:/models/like::{"modelId":"m1","userId":"u1"}"#
        );
    }

    #[test]
    fn repeated_params_keep_value_order() {
        let a = RequestConfig::get("/models")
            .param("filter", "Popular")
            .param("filter", "Trending");
        let b = RequestConfig::get("/models")
            .param("filter", "Trending")
            .param("filter", "Popular");
        assert_ne!(RequestKey::derive(&a), RequestKey::derive(&b));
    }

    #[test]
    fn method_and_values_distinguish_keys() {
        let get = RequestConfig::get("/categories");
        let delete = RequestConfig::delete("/categories");
        assert_ne!(RequestKey::derive(&get), RequestKey::derive(&delete));

        let chair = RequestConfig::get("/models").param("key", "chair");
        let table = RequestConfig::get("/models").param("key", "table");
        assert_ne!(RequestKey::derive(&chair), RequestKey::derive(&table));
    }

    #[test]
    fn query_in_resource_is_canonicalized() {
        let embedded = RequestConfig::get("/models?b=2&a=1");
        let split = RequestConfig::get("/models").param("a", 1).param("b", 2);
        let mixed = RequestConfig::get("/models?b=2").param("a", 1);
        assert_eq!(RequestKey::derive(&embedded).as_str(), "GET:/models:a=1&b=2:null");
        assert_eq!(RequestKey::derive(&embedded), RequestKey::derive(&split));
        assert_eq!(RequestKey::derive(&embedded), RequestKey::derive(&mixed));
    }

    #[test]
    fn resource_prefix_covers_nested_keys() {
        let prefix = RequestKey::resource_prefix(&Method::Get, "/models");
        let trending = RequestKey::derive(&RequestConfig::get("/models/trending"));
        assert!(trending.as_str().starts_with(&prefix));
    }
}
