//! Typed error hierarchy for the edfi-client crate.
//!
//! `EdFiError` gives every failure in the library a structured home so that
//! callers can:
//! - Distinguish the failure category (argument, auth, missing field, API
//!   status, parse, network).
//! - Inspect the original cause via `source()` (thiserror derives this from
//!   `#[source]` fields).
//! - Display a human-readable message that includes the relevant context
//!   (field name, HTTP status, response body).
//!
//! Boundary rules:
//! - `Auth` is reserved for the two-step token flow (`/oauth/authorize` and
//!   `/oauth/token`). Transport failures during those calls are wrapped into
//!   `Auth` with the cause chained, so authentication surfaces as a single
//!   error kind while the underlying failure stays inspectable.
//! - Outside the auth flow, `Api` and `Network` errors propagate to the
//!   caller unchanged. Retry and backoff policy belongs to the transport,
//!   so the library never reinterprets those failures.

use reqwest::StatusCode;

/// Unified error type for all edfi-client library operations.
///
/// Each variant corresponds to a distinct failure boundary in the system.
/// The `#[source]` attribute on inner errors enables `Error::source()`
/// chaining so callers (and logging frameworks) can traverse the full
/// cause chain.
#[derive(Debug, thiserror::Error)]
pub enum EdFiError {
    /// Malformed caller input.
    ///
    /// This covers:
    /// - Conflicting or missing profile access directives (a header cannot
    ///   be both readable and writable).
    /// - An unexpected top-level response shape passed to `Response::wrap`
    ///   (anything other than a JSON object or array).
    /// - A token response that omits `expires_in`, which makes the token's
    ///   expiry uncomputable.
    #[error("{message}")]
    Argument {
        /// Description of the invalid input.
        message: String,
    },

    /// Authentication failure during the two-step token flow.
    ///
    /// This covers:
    /// - An authorization response missing its `code` field.
    /// - A token-exchange response missing its `access_token` field.
    /// - Any transport or API failure reaching either OAuth endpoint. The
    ///   original error is chained via `source` rather than discarded.
    #[error("authentication failed: {message}")]
    Auth {
        /// Human-readable description of the authentication failure.
        message: String,
        /// The underlying transport or parse error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A mapping field was neither declared nor resolvable as a reference.
    ///
    /// Raised by `Response::get` when the field is absent, and by
    /// `Response::resolve_reference` when `<field>_reference` is missing or
    /// malformed, or when no live client is bound to the node.
    #[error("field not found: {field}")]
    FieldNotFound {
        /// The field name that was requested.
        field: String,
    },

    /// The API returned a non-success HTTP status code.
    ///
    /// The full response body is preserved: Ed-Fi error responses carry
    /// diagnostic detail (validation messages, resource identifiers) that
    /// `error_for_status()` would discard.
    #[error("API error {status}: {body}")]
    Api {
        /// The HTTP status code returned by the API.
        status: StatusCode,
        /// The raw response body text, possibly empty.
        body: String,
    },

    /// A response body arrived but was not valid JSON.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The request never produced a response: DNS, connection, TLS, or
    /// timeout trouble below the HTTP layer. The wrapped `reqwest::Error`
    /// keeps the transport-level detail.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl EdFiError {
    /// Shorthand constructor for `Argument` errors.
    pub(crate) fn argument(message: impl Into<String>) -> Self {
        EdFiError::Argument {
            message: message.into(),
        }
    }

    /// Shorthand constructor for `FieldNotFound` errors.
    pub(crate) fn field_not_found(field: impl Into<String>) -> Self {
        EdFiError::FieldNotFound {
            field: field.into(),
        }
    }
}

/// Convenience alias used throughout the library.
/// Keeps function signatures concise while providing the full typed error.
pub type Result<T> = std::result::Result<T, EdFiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn argument_error_displays_message() {
        let err = EdFiError::argument("conflicting access directives");
        assert_eq!(err.to_string(), "conflicting access directives");
    }

    #[test]
    fn auth_error_displays_message() {
        let err = EdFiError::Auth {
            message: "failed to obtain authorization code".to_string(),
            source: None,
        };
        let msg = err.to_string();
        assert!(
            msg.contains("authentication failed"),
            "display should indicate auth failure"
        );
        assert!(
            msg.contains("authorization code"),
            "display should include the step that failed"
        );
    }

    #[test]
    fn auth_error_keeps_its_cause_reachable() {
        let json_err: serde_json::Error = serde_json::from_str::<String>("not-json").unwrap_err();
        let err = EdFiError::Auth {
            message: "failed to parse token response".to_string(),
            source: Some(Box::new(json_err)),
        };
        assert!(
            err.source().is_some(),
            "the wrapped failure must stay inspectable through source()"
        );
    }

    #[test]
    fn field_not_found_includes_field_name() {
        let err = EdFiError::field_not_found("school");
        let msg = err.to_string();
        assert!(msg.contains("school"), "display should name the field");
    }

    #[test]
    fn api_error_carries_the_diagnostic_body() {
        let err = EdFiError::Api {
            status: StatusCode::FORBIDDEN,
            body: r#"{"message":"Access to the resource could not be authorized."}"#.to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"), "status code belongs in the message");
        assert!(
            msg.contains("could not be authorized"),
            "the Ed-Fi error body must survive into the message"
        );
    }

    #[test]
    fn parse_error_chains_the_serde_failure() {
        let json_err: serde_json::Error =
            serde_json::from_str::<String>("{{bad json}}").unwrap_err();
        let err = EdFiError::Parse(json_err);
        assert!(
            err.to_string().contains("failed to parse response"),
            "a bad body reads as a parse failure"
        );
        assert!(
            err.source().is_some(),
            "the serde error is the cause, not the whole story"
        );
    }

    #[test]
    fn error_crosses_task_boundaries() {
        // Errors travel through spawned tasks and joined futures.
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EdFiError>();
    }
}
