//! Abstract HTTP capability and its default reqwest-backed implementation.
//!
//! The rest of the crate never talks to the network directly. Both the
//! authenticated CRUD surface (`EdFiClient`) and the token manager consume
//! a [`Transport`]: five verb methods over a path, headers, query mapping,
//! and (for write verbs) a JSON payload, producing a raw `serde_json::Value`.
//!
//! Connection handling, TLS, socket-level retries, and timeout policy all
//! live behind this seam. [`HttpTransport`] is the stock implementation;
//! tests and embedders can substitute their own (e.g. a recording transport).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::{EdFiError, Result};

/// Content type that switches a payload to form encoding.
///
/// The authorization-code request is the one caller that needs this: it
/// posts `client_id`/`response_type` as `application/x-www-form-urlencoded`
/// while every other write in the API is JSON.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Query mapping passed to transport calls. Values are rendered as strings
/// on the query line; string values pass through unquoted.
pub type QueryMap = Map<String, Value>;

/// Abstract HTTP capability consumed by the client and the token manager.
///
/// Implementations own everything wire-level: connections, TLS, timeouts,
/// and any socket-level retry policy. Errors surface as [`EdFiError::Api`]
/// (non-success status, body preserved) or [`EdFiError::Network`] (the
/// request never completed); callers upstream do not reinterpret them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a GET request and returns the parsed JSON body.
    async fn get(&self, path: &str, headers: HeaderMap, query: &QueryMap) -> Result<Value>;

    /// Sends a DELETE request and returns the parsed JSON body
    /// (an empty object for bodiless 204 responses).
    async fn delete(&self, path: &str, headers: HeaderMap, query: &QueryMap) -> Result<Value>;

    /// Sends a POST request with a JSON (or form-encoded) payload.
    async fn post(
        &self,
        path: &str,
        headers: HeaderMap,
        query: &QueryMap,
        payload: &Value,
    ) -> Result<Value>;

    /// Sends a PUT request with a JSON payload.
    async fn put(
        &self,
        path: &str,
        headers: HeaderMap,
        query: &QueryMap,
        payload: &Value,
    ) -> Result<Value>;

    /// Sends a PATCH request with a JSON payload.
    async fn patch(
        &self,
        path: &str,
        headers: HeaderMap,
        query: &QueryMap,
        payload: &Value,
    ) -> Result<Value>;
}

/// Connect timeout for API calls. Covers TCP + TLS handshake only.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall request timeout, covering the full round-trip including the
/// response body. Ed-Fi payloads are small JSON documents; 30 seconds is
/// generous even for large paginated reads.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds a `reqwest::Client` with explicit timeouts.
fn build_http_client() -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Default [`Transport`] backed by `reqwest`.
///
/// `base_uri` is stored as a `String` rather than a `&'static str` so it can
/// point at a local mock server in tests. Paths are joined naively: a path
/// with a leading slash is appended to the trimmed base as-is.
pub struct HttpTransport {
    client: Client,
    base_uri: String,
}

impl HttpTransport {
    /// Creates a transport rooted at `base_uri`.
    pub fn new(base_uri: &str) -> Result<Self> {
        Ok(HttpTransport {
            client: build_http_client()?,
            base_uri: base_uri.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        // Hypermedia hrefs may be absolute; those bypass base joining.
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_uri, path)
        } else {
            format!("{}/{}", self.base_uri, path)
        }
    }

    /// Core request path shared by all five verbs.
    ///
    /// The payload is form-encoded when the caller set a
    /// `Content-Type: application/x-www-form-urlencoded` header, JSON
    /// otherwise. The response body is read as text before the status check
    /// so a failing response keeps its diagnostic body.
    async fn send(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        query: &QueryMap,
        payload: Option<&Value>,
    ) -> Result<Value> {
        let form_encoded = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(FORM_CONTENT_TYPE));

        let mut req = self.client.request(method, self.url(path)).headers(headers);

        if !query.is_empty() {
            req = req.query(&query_pairs(query));
        }

        if let Some(body) = payload {
            req = if form_encoded {
                req.form(&form_pairs(body))
            } else {
                req.json(body)
            };
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(EdFiError::Api { status, body });
        }

        if body.trim().is_empty() {
            // 204-style responses (DELETE, some PUTs) carry no body.
            return Ok(Value::Object(Map::new()));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Renders a query mapping as string pairs for the query line.
fn query_pairs(query: &QueryMap) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(k, v)| (k.clone(), scalar_string(v)))
        .collect()
}

/// Renders a payload's top-level object as form fields.
fn form_pairs(payload: &Value) -> Vec<(String, String)> {
    match payload {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), scalar_string(v)))
            .collect(),
        _ => Vec::new(),
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, headers: HeaderMap, query: &QueryMap) -> Result<Value> {
        self.send(Method::GET, path, headers, query, None).await
    }

    async fn delete(&self, path: &str, headers: HeaderMap, query: &QueryMap) -> Result<Value> {
        self.send(Method::DELETE, path, headers, query, None).await
    }

    async fn post(
        &self,
        path: &str,
        headers: HeaderMap,
        query: &QueryMap,
        payload: &Value,
    ) -> Result<Value> {
        self.send(Method::POST, path, headers, query, Some(payload))
            .await
    }

    async fn put(
        &self,
        path: &str,
        headers: HeaderMap,
        query: &QueryMap,
        payload: &Value,
    ) -> Result<Value> {
        self.send(Method::PUT, path, headers, query, Some(payload))
            .await
    }

    async fn patch(
        &self,
        path: &str,
        headers: HeaderMap,
        query: &QueryMap,
        payload: &Value,
    ) -> Result<Value> {
        self.send(Method::PATCH, path, headers, query, Some(payload))
            .await
    }
}

// StatusCode re-exported for downstream matching on Api errors without a
// direct reqwest dependency.
pub use reqwest::StatusCode as HttpStatus;
