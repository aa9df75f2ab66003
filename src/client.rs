//! Authenticated CRUD surface for the Ed-Fi ODS API.
//!
//! `EdFiClient` composes the three collaborators: a [`Transport`] for the
//! API proper, a [`TokenManager`] (over its own auth-scoped transport) for
//! bearer tokens, and the profile negotiation builders. Every verb method
//! injects the bearer token, camelizes outbound mapping keys to the wire
//! convention, and wraps the raw result in a [`Response`] bound back to
//! this client so reference traversal can fetch through it later.
//!
//! Token lifecycle:
//! - Lazy acquisition: the first request that finds no valid cached token
//!   triggers the two-step refresh automatically.
//! - Single-flight: the token manager sits behind a `Mutex` held across
//!   the validity check and refresh, so concurrent callers on an expired
//!   cache observe exactly one authorization + exchange sequence. The lock
//!   never spans an API round trip, only the auth ones.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{EdFiError, Result};
use crate::inflect;
use crate::profile::{self, Access};
use crate::response::Response;
use crate::token::TokenManager;
use crate::transport::{HttpTransport, QueryMap, Transport};

/// Credentialed client for one Ed-Fi ODS API host.
///
/// Constructed behind an `Arc` so response trees can hold weak
/// back-references to the client that produced them. Dropping the last
/// `Arc` leaves any surviving trees readable but no longer able to
/// resolve references.
pub struct EdFiClient {
    transport: Arc<dyn Transport>,
    auth: Mutex<TokenManager>,
    /// Session-scoped default profile for content negotiation. Mutable
    /// config: `set_profile` replaces it; the `*_as` header builders
    /// override per call without touching it.
    profile: RwLock<Option<String>>,
    /// Handle handed to every response tree produced by this client.
    self_handle: RwLock<std::sync::Weak<EdFiClient>>,
}

impl EdFiClient {
    /// Connects to the API at `base_uri` with OAuth client credentials.
    ///
    /// Builds two transports over the same base: one for the API surface
    /// and a dedicated one for the token manager, mirroring the separation
    /// between data and auth traffic.
    pub fn connect(
        base_uri: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Arc<EdFiClient>> {
        let api = Arc::new(HttpTransport::new(base_uri)?);
        let auth = Arc::new(HttpTransport::new(base_uri)?);
        Ok(EdFiClient::with_transports(
            api,
            auth,
            client_id,
            client_secret,
        ))
    }

    /// Like [`EdFiClient::connect`], with the session profile set at
    /// construction. Equivalent to `connect` followed by `set_profile`.
    pub fn connect_with_profile(
        base_uri: &str,
        client_id: &str,
        client_secret: &str,
        profile: &str,
    ) -> Result<Arc<EdFiClient>> {
        let client = EdFiClient::connect(base_uri, client_id, client_secret)?;
        client.set_profile(profile);
        Ok(client)
    }

    /// Assembles a client over caller-supplied transports. This is the
    /// seam tests and embedders use to substitute mock or instrumented
    /// transports.
    pub fn with_transports(
        api: Arc<dyn Transport>,
        auth: Arc<dyn Transport>,
        client_id: &str,
        client_secret: &str,
    ) -> Arc<EdFiClient> {
        let client = Arc::new(EdFiClient {
            transport: api,
            auth: Mutex::new(TokenManager::new(auth, client_id, client_secret)),
            profile: RwLock::new(None),
            self_handle: RwLock::new(std::sync::Weak::new()),
        });

        let weak = Arc::downgrade(&client);
        *client
            .self_handle
            .write()
            .unwrap_or_else(|e| e.into_inner()) = weak;
        client
    }

    fn handle(&self) -> std::sync::Weak<EdFiClient> {
        self.self_handle
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ── profile negotiation ────────────────────────────────────────────

    /// Sets the session default profile used by [`EdFiClient::read_header`]
    /// and [`EdFiClient::write_header`].
    pub fn set_profile(&self, profile: impl Into<String>) {
        let mut slot = self.profile.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(profile.into());
    }

    /// The session default profile, if one is set.
    pub fn profile(&self) -> Option<String> {
        self.profile
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// `Accept` header for a profiled read of `resource`, using the
    /// session profile. Fails when no session profile is set.
    pub fn read_header(&self, resource: &str) -> Result<HeaderMap> {
        let profile = self.require_profile()?;
        profile::read_header(resource, &profile)
    }

    /// `Content-Type` header for a profiled write of `resource`, using
    /// the session profile.
    pub fn write_header(&self, resource: &str) -> Result<HeaderMap> {
        let profile = self.require_profile()?;
        profile::write_header(resource, &profile)
    }

    /// `Accept` header with a per-call profile override. The session
    /// profile is left untouched.
    pub fn read_header_as(&self, resource: &str, profile: &str) -> Result<HeaderMap> {
        profile::read_header(resource, profile)
    }

    /// `Content-Type` header with a per-call profile override. The
    /// session profile is left untouched.
    pub fn write_header_as(&self, resource: &str, profile: &str) -> Result<HeaderMap> {
        profile::write_header(resource, profile)
    }

    /// The profiled vendor MIME type for `resource` under the session
    /// profile.
    pub fn profile_mime(&self, resource: &str, access: Access) -> Result<String> {
        let profile = self.require_profile()?;
        Ok(profile::profile_mime(resource, &profile, access))
    }

    fn require_profile(&self) -> Result<String> {
        self.profile()
            .ok_or_else(|| EdFiError::argument("no session profile set"))
    }

    // ── CRUD verbs ─────────────────────────────────────────────────────

    /// Authenticated GET. The raw result is wrapped and bound to this
    /// client.
    pub async fn get(&self, path: &str, headers: HeaderMap, query: &QueryMap) -> Result<Response> {
        let (headers, query) = self.preprocess(headers, query).await?;
        let raw = self.transport.get(path, headers, &query).await?;
        self.respond_with(raw)
    }

    /// Authenticated DELETE.
    pub async fn delete(
        &self,
        path: &str,
        headers: HeaderMap,
        query: &QueryMap,
    ) -> Result<Response> {
        let (headers, query) = self.preprocess(headers, query).await?;
        let raw = self.transport.delete(path, headers, &query).await?;
        self.respond_with(raw)
    }

    /// Authenticated POST with a JSON payload.
    pub async fn post(
        &self,
        path: &str,
        headers: HeaderMap,
        query: &QueryMap,
        payload: &Value,
    ) -> Result<Response> {
        let (headers, query) = self.preprocess(headers, query).await?;
        let payload = inflect::camelize_keys(payload);
        let raw = self.transport.post(path, headers, &query, &payload).await?;
        self.respond_with(raw)
    }

    /// Authenticated PUT with a JSON payload.
    pub async fn put(
        &self,
        path: &str,
        headers: HeaderMap,
        query: &QueryMap,
        payload: &Value,
    ) -> Result<Response> {
        let (headers, query) = self.preprocess(headers, query).await?;
        let payload = inflect::camelize_keys(payload);
        let raw = self.transport.put(path, headers, &query, &payload).await?;
        self.respond_with(raw)
    }

    /// Authenticated PATCH with a JSON payload.
    pub async fn patch(
        &self,
        path: &str,
        headers: HeaderMap,
        query: &QueryMap,
        payload: &Value,
    ) -> Result<Response> {
        let (headers, query) = self.preprocess(headers, query).await?;
        let raw = self
            .transport
            .patch(path, headers, &query, &inflect::camelize_keys(payload))
            .await?;
        self.respond_with(raw)
    }

    // ── internals ──────────────────────────────────────────────────────

    /// Returns a valid bearer token, refreshing through the token manager
    /// when needed. The mutex spans the check and the refresh.
    async fn bearer_token(&self) -> Result<String> {
        let mut auth = self.auth.lock().await;
        auth.token().await
    }

    /// Merges the bearer header under caller headers and camelizes query
    /// keys. The auth header goes in first, so an explicit caller
    /// `Authorization` wins.
    async fn preprocess(
        &self,
        caller_headers: HeaderMap,
        query: &QueryMap,
    ) -> Result<(HeaderMap, QueryMap)> {
        let token = self.bearer_token().await?;

        let mut headers = HeaderMap::with_capacity(caller_headers.len() + 1);
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| EdFiError::argument("token value is not a valid header"))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.extend(caller_headers);

        let query = query
            .iter()
            .map(|(key, value)| (inflect::to_lower_camel(key), value.clone()))
            .collect();

        Ok((headers, query))
    }

    /// Wraps a raw transport result into a tree bound to this client.
    fn respond_with(&self, raw: Value) -> Result<Response> {
        debug!("wrapping raw response");
        Response::wrap_bound(raw, self.handle())
    }
}
