//! # Request Abstraction
//!
//! Transport-independent snapshot of an inbound call.
//!
//! Adapters fill a [`RequestBuilder`] from their native request type and
//! hand the built [`Request`] to a route's dispatch function. Once built the
//! request is read-only: header names are lower-cased at construction so
//! lookups are case-insensitive, and every mapping defaults to empty.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A header value as received: single or repeated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    /// Header sent once
    Single(String),
    /// Header sent several times
    Multiple(Vec<String>),
}

impl HeaderValue {
    /// The first value, if any
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(v) => Some(v),
            Self::Multiple(values) => values.first().map(String::as_str),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(existing) => {
                *self = Self::Multiple(vec![std::mem::take(existing), value]);
            }
            Self::Multiple(values) => values.push(value),
        }
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<Vec<String>> for HeaderValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

/// Header map keyed by lower-cased names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, HeaderValue>);

impl Headers {
    /// First value of a header, looked up case-insensitively
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .and_then(HeaderValue::first)
    }

    /// Raw value of a header, looked up case-insensitively
    #[must_use]
    pub fn get_all(&self, name: &str) -> Option<&HeaderValue> {
        self.0.get(&name.to_ascii_lowercase())
    }

    /// Check if a header is present
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    /// Number of distinct header names
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no headers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(lower-cased name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert, replacing any previous value under the same name
    fn insert(&mut self, name: &str, value: HeaderValue) {
        self.0.insert(name.to_ascii_lowercase(), value);
    }

    /// Append, turning a single value into a list when repeated
    fn append(&mut self, name: &str, value: String) {
        match self.0.get_mut(&name.to_ascii_lowercase()) {
            Some(existing) => existing.push(value),
            None => self.insert(name, HeaderValue::Single(value)),
        }
    }
}

impl<K: AsRef<str>, V: Into<HeaderValue>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::default();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value.into());
        }
        headers
    }
}

/// Normalized, immutable HTTP request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    method: String,
    url: String,
    path: String,
    protocol: String,
    original_url: String,
    http_version: String,
    ip: Option<String>,
    headers: Headers,
    body: Value,
    query: Map<String, Value>,
    params: Map<String, Value>,
    context: Map<String, Value>,
    cookies: BTreeMap<String, String>,
    signed_cookies: BTreeMap<String, String>,
}

impl Request {
    /// Start building a request for `method` and `url`
    pub fn builder(method: impl Into<String>, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// HTTP method as received (e.g. `GET`)
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Full URL including the query string
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path without the query string
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Protocol (`http` or `https`)
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// URL before any rewriting by the adapter
    #[must_use]
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// HTTP version (e.g. `1.1`)
    #[must_use]
    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    /// Remote client address, when the adapter knows it
    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    /// All headers
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get a header value by name (case-insensitive, first value wins)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Request body, `Null` when none was supplied
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// Query string mapping
    #[must_use]
    pub const fn query(&self) -> &Map<String, Value> {
        &self.query
    }

    /// Path parameters
    #[must_use]
    pub const fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Free-form per-request context (auth data and the like)
    #[must_use]
    pub const fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Parsed cookies
    #[must_use]
    pub const fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// Verified signed cookies
    #[must_use]
    pub const fn signed_cookies(&self) -> &BTreeMap<String, String> {
        &self.signed_cookies
    }
}

/// Builder for [`Request`]
///
/// Only `method` and `url` are required. `path` defaults to the url without
/// its query string, `original_url` to the url, `protocol` to `http` and
/// `http_version` to `1.1`.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    method: String,
    url: String,
    path: Option<String>,
    protocol: Option<String>,
    original_url: Option<String>,
    http_version: Option<String>,
    ip: Option<String>,
    headers: Headers,
    body: Value,
    query: Map<String, Value>,
    params: Map<String, Value>,
    context: Map<String, Value>,
    cookies: BTreeMap<String, String>,
    signed_cookies: BTreeMap<String, String>,
}

impl RequestBuilder {
    /// Create a builder for `method` and `url`
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the path (defaults to the url without query string)
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the protocol
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Set the original url
    #[must_use]
    pub fn original_url(mut self, original_url: impl Into<String>) -> Self {
        self.original_url = Some(original_url.into());
        self
    }

    /// Set the HTTP version
    #[must_use]
    pub fn http_version(mut self, version: impl Into<String>) -> Self {
        self.http_version = Some(version.into());
        self
    }

    /// Set the remote address
    #[must_use]
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Add a header; repeating a name collects the values
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value.into());
        self
    }

    /// Replace all headers
    #[must_use]
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body
    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Add a query entry
    #[must_use]
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Replace the query mapping
    #[must_use]
    pub fn query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    /// Add a path parameter
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), Value::String(value.into()));
        self
    }

    /// Replace the path parameters
    #[must_use]
    pub fn params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Add a context entry
    #[must_use]
    pub fn context_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Merge entries into the context, later keys win
    #[must_use]
    pub fn extend_context(mut self, context: Map<String, Value>) -> Self {
        self.context.extend(context);
        self
    }

    /// Add a cookie
    #[must_use]
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Replace the cookies
    #[must_use]
    pub fn cookies(mut self, cookies: BTreeMap<String, String>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Replace the signed cookies
    #[must_use]
    pub fn signed_cookies(mut self, cookies: BTreeMap<String, String>) -> Self {
        self.signed_cookies = cookies;
        self
    }

    /// Finish the request
    #[must_use]
    pub fn build(self) -> Request {
        let path = self.path.unwrap_or_else(|| {
            self.url
                .split_once('?')
                .map_or_else(|| self.url.clone(), |(p, _)| p.to_string())
        });
        Request {
            original_url: self.original_url.unwrap_or_else(|| self.url.clone()),
            protocol: self.protocol.unwrap_or_else(|| "http".to_string()),
            http_version: self.http_version.unwrap_or_else(|| "1.1".to_string()),
            method: self.method,
            url: self.url,
            path,
            ip: self.ip,
            headers: self.headers,
            body: self.body,
            query: self.query,
            params: self.params,
            context: self.context,
            cookies: self.cookies,
            signed_cookies: self.signed_cookies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let req = Request::builder("GET", "/orders?page=2").build();
        assert_eq!(req.path(), "/orders");
        assert_eq!(req.original_url(), "/orders?page=2");
        assert_eq!(req.protocol(), "http");
        assert_eq!(req.http_version(), "1.1");
        assert_eq!(req.body(), &Value::Null);
        assert!(req.query().is_empty());
        assert!(req.params().is_empty());
        assert!(req.context().is_empty());
        assert!(req.cookies().is_empty());
        assert!(req.signed_cookies().is_empty());
        assert!(req.ip().is_none());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = Request::builder("GET", "/")
            .header("Content-Type", "application/json")
            .build();
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn test_multi_valued_header_yields_first() {
        let req = Request::builder("GET", "/")
            .header("X-Forwarded-For", "10.0.0.1")
            .header("x-forwarded-for", "10.0.0.2")
            .build();
        assert_eq!(req.header("x-forwarded-for"), Some("10.0.0.1"));
        assert_eq!(
            req.headers().get_all("X-Forwarded-For"),
            Some(&HeaderValue::Multiple(vec![
                "10.0.0.1".to_string(),
                "10.0.0.2".to_string()
            ]))
        );
    }

    #[test]
    fn test_headers_from_iter_normalizes_keys() {
        let headers: Headers = [
            ("Accept", HeaderValue::from("text/plain")),
            ("Set-Cookie", HeaderValue::from(vec!["a=1".to_string(), "b=2".to_string()])),
        ]
        .into_iter()
        .collect();
        let req = Request::builder("GET", "/").headers(headers).build();
        assert_eq!(req.header("accept"), Some("text/plain"));
        assert_eq!(req.header("set-cookie"), Some("a=1"));
        assert_eq!(req.headers().len(), 2);
    }

    #[test]
    fn test_data_fields() {
        let req = Request::builder("POST", "/orders/42")
            .body(json!({"quantity": 3}))
            .param("id", "42")
            .query_param("expand", "items")
            .context_value("user", json!({"id": 7}))
            .cookie("session", "abc")
            .build();
        assert_eq!(req.body(), &json!({"quantity": 3}));
        assert_eq!(req.params().get("id"), Some(&json!("42")));
        assert_eq!(req.query().get("expand"), Some(&json!("items")));
        assert_eq!(req.context().get("user"), Some(&json!({"id": 7})));
        assert_eq!(req.cookies().get("session").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_serializes_as_snapshot() {
        let req = Request::builder("GET", "/a").header("X-Id", "1").build();
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["originalUrl"], json!("/a"));
        assert_eq!(value["headers"]["x-id"], json!("1"));
    }
}
