//! Two-step OAuth token lifecycle for the Ed-Fi ODS API.
//!
//! Ed-Fi's machine-to-machine flow takes two round trips: a form-encoded
//! POST to `/oauth/authorize` yields a short-lived authorization `code`,
//! which a JSON POST to `/oauth/token` exchanges for a bearer token.
//! [`TokenManager`] drives both steps, caches the resulting
//! [`AccessToken`], and refreshes transparently when the cached token is
//! absent or inside its expiry safety window. Consumers (`EdFiClient`)
//! read tokens through `token()` and never see the refresh machinery.

use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{EdFiError, Result};
use crate::transport::{QueryMap, Transport, FORM_CONTENT_TYPE};

/// Authorization-code endpoint, relative to the API base.
const AUTHORIZATION_CODE_URI: &str = "/oauth/authorize";

/// Token-exchange endpoint, relative to the API base.
const ACCESS_TOKEN_URI: &str = "/oauth/token";

/// Margin subtracted from a token's computed expiry when judging validity.
/// Guards against a token expiring mid-flight between the local check and
/// the server receiving the request.
const SAFETY_WINDOW_SECS: i64 = 5;

/// One issued bearer token and its computed expiry.
///
/// Immutable after construction: a refresh creates a new instance that
/// supersedes the old one, it never mutates in place.
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: String,
    token_type: String,
    issued_at: DateTime<Utc>,
    expires_in: Duration,
}

impl AccessToken {
    /// Creates a token from its parts. `issued_at` defaults to now.
    pub fn new(
        value: impl Into<String>,
        token_type: impl Into<String>,
        issued_at: Option<DateTime<Utc>>,
        expires_in_secs: i64,
    ) -> Self {
        AccessToken {
            value: value.into(),
            token_type: token_type.into(),
            issued_at: issued_at.unwrap_or_else(Utc::now),
            expires_in: Duration::seconds(expires_in_secs),
        }
    }

    /// Builds a token from a raw `/oauth/token` response body.
    ///
    /// `access_token` and `expires_in` are required (the caller is expected
    /// to have pre-checked `access_token`, see [`TokenManager`]); a missing
    /// `expires_in` makes the expiry uncomputable and is rejected.
    /// `token_type` defaults to `bearer` and `issued_at` (epoch
    /// milliseconds) to the current time when absent.
    pub fn from_response(response: &Value) -> Result<AccessToken> {
        let value = response
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| EdFiError::argument("token response missing access_token"))?;

        let expires_in = response
            .get("expires_in")
            .and_then(Value::as_i64)
            .ok_or_else(|| EdFiError::argument("token response missing expires_in"))?;

        let token_type = response
            .get("token_type")
            .and_then(Value::as_str)
            .unwrap_or("bearer");

        let issued_at = response
            .get("issued_at")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Ok(AccessToken::new(value, token_type, issued_at, expires_in))
    }

    /// The instant past which the API will reject this token.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + self.expires_in
    }

    /// Whether the token is usable at `now`, leaving the safety window
    /// as margin before the real expiry. A token with an empty value is
    /// never valid, at any instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.value.is_empty() {
            return false;
        }
        now <= self.expires_at() - Duration::seconds(SAFETY_WINDOW_SECS)
    }

    /// Whether the token is usable right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// The issuer-reported token type (typically `bearer`).
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Returns an owned copy of the token value. Callers never receive the
    /// live internal reference, so shared state cannot be mutated from
    /// outside.
    pub fn value_copy(&self) -> String {
        self.value.clone()
    }
}

/// Owns token acquisition and refresh policy.
///
/// Holds at most one current [`AccessToken`]. The cached token is replaced
/// (never mutated) by each successful refresh. `token()` takes `&mut self`;
/// `EdFiClient` serializes access through a `tokio::sync::Mutex` held across
/// the validity check and refresh, so concurrent callers cannot race into
/// duplicate authorization/exchange sequences.
pub struct TokenManager {
    transport: Arc<dyn Transport>,
    client_id: String,
    client_secret: String,
    access_token: Option<AccessToken>,
}

impl TokenManager {
    /// Creates a manager over its own transport scoped to the auth
    /// endpoints. Keeping the auth transport separate from the API
    /// transport lets the two carry different base paths or timeout
    /// policies.
    pub fn new(
        transport: Arc<dyn Transport>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        TokenManager {
            transport,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            access_token: None,
        }
    }

    /// Returns a currently-valid token value, refreshing first when the
    /// cache is empty or invalid.
    ///
    /// Exactly one authorization + exchange attempt is made per call that
    /// finds the cache invalid; retry policy beyond that belongs to the
    /// transport. The returned value is guaranteed usable for at least the
    /// safety window.
    pub async fn token(&mut self) -> Result<String> {
        if let Some(current) = &self.access_token {
            if current.is_valid() {
                return Ok(current.value_copy());
            }
        }

        debug!("access token absent or expired, refreshing");
        let fresh = self.new_access_token().await?;
        let value = fresh.value_copy();
        self.access_token = Some(fresh);
        Ok(value)
    }

    /// Step 1: POST the form-encoded authorization-code request.
    async fn new_authorization_code(&self) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));

        let payload = json!({
            "client_id": self.client_id,
            "response_type": "code",
        });

        let auth = self
            .transport
            .post(AUTHORIZATION_CODE_URI, headers, &QueryMap::new(), &payload)
            .await
            .map_err(|e| wrap_auth("authorization code request failed", e))?;

        match auth.get("code").and_then(Value::as_str) {
            Some(code) => Ok(code.to_string()),
            None => {
                warn!("authorization response carried no code field");
                Err(EdFiError::Auth {
                    message: "failed to obtain authorization code".to_string(),
                    source: None,
                })
            }
        }
    }

    /// Step 2: exchange the authorization code for an access token.
    async fn new_access_token(&self) -> Result<AccessToken> {
        let code = self.new_authorization_code().await?;

        let payload = json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "code": code,
            "grant_type": "authorization_code",
        });

        let auth = self
            .transport
            .post(ACCESS_TOKEN_URI, HeaderMap::new(), &QueryMap::new(), &payload)
            .await
            .map_err(|e| wrap_auth("token exchange request failed", e))?;

        if auth.get("access_token").and_then(Value::as_str).is_none() {
            warn!("token exchange response carried no access_token field");
            return Err(EdFiError::Auth {
                message: "failed to obtain access token".to_string(),
                source: None,
            });
        }

        debug!("access token refreshed");
        AccessToken::from_response(&auth)
    }
}

/// Wraps a transport failure from one of the two auth calls so it surfaces
/// as an authentication error with the upstream cause still chained.
fn wrap_auth(message: &str, cause: EdFiError) -> EdFiError {
    EdFiError::Auth {
        message: message.to_string(),
        source: Some(Box::new(cause)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_at(issued_at: DateTime<Utc>, expires_in_secs: i64) -> AccessToken {
        AccessToken::new("tok-value", "bearer", Some(issued_at), expires_in_secs)
    }

    #[test]
    fn empty_token_is_never_valid() {
        let issued = Utc::now();
        let t = AccessToken::new("", "bearer", Some(issued), 3600);
        assert!(
            !t.is_valid_at(issued),
            "empty token must be invalid even at issue time"
        );
        assert!(!t.is_valid(), "empty token must be invalid now");
    }

    #[test]
    fn validity_boundary_sits_at_safety_window() {
        let issued = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let t = token_at(issued, 3600);
        let boundary = issued + Duration::seconds(3600 - SAFETY_WINDOW_SECS);

        assert!(
            t.is_valid_at(boundary - Duration::milliseconds(1)),
            "just inside the safety window the token is valid"
        );
        assert!(
            t.is_valid_at(boundary),
            "the boundary instant itself is still valid (<=)"
        );
        assert!(
            !t.is_valid_at(boundary + Duration::milliseconds(1)),
            "just past the safety window the token is invalid"
        );
    }

    #[test]
    fn expires_at_is_issue_plus_lifetime() {
        let issued = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let t = token_at(issued, 120);
        assert_eq!(t.expires_at(), issued + Duration::seconds(120));
    }

    #[test]
    fn value_copy_is_detached() {
        let t = token_at(Utc::now(), 60);
        let mut copy = t.value_copy();
        copy.push_str("-mutated");
        assert_eq!(t.value_copy(), "tok-value");
    }

    #[test]
    fn from_response_reads_full_shape() {
        let issued_ms = Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .unwrap()
            .timestamp_millis();
        let body = json!({
            "access_token": "abc123",
            "token_type": "bearer",
            "expires_in": 1800,
            "issued_at": issued_ms,
        });
        let t = AccessToken::from_response(&body).unwrap();
        assert_eq!(t.value_copy(), "abc123");
        assert_eq!(t.token_type(), "bearer");
        assert_eq!(
            t.expires_at().timestamp_millis(),
            issued_ms + 1800 * 1000
        );
    }

    #[test]
    fn from_response_defaults_issued_at_and_token_type() {
        let before = Utc::now();
        let body = json!({"access_token": "abc", "expires_in": 60});
        let t = AccessToken::from_response(&body).unwrap();
        assert_eq!(t.token_type(), "bearer");
        assert!(
            t.expires_at() >= before + Duration::seconds(60),
            "issued_at must default to construction time"
        );
    }

    #[test]
    fn from_response_requires_expires_in() {
        let body = json!({"access_token": "abc", "token_type": "bearer"});
        let err = AccessToken::from_response(&body).unwrap_err();
        assert!(
            matches!(err, EdFiError::Argument { .. }),
            "missing expires_in must be an argument error, got {err:?}"
        );
    }
}
