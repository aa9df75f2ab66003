//! Profile content-type negotiation headers.
//!
//! Ed-Fi profiles select a named subset of a resource's representation via
//! a vendor MIME type carried in `Accept` (reads) or `Content-Type`
//! (writes):
//!
//! ```text
//! application/vnd.ed-fi.<resource>.<profile>.<access>+json
//! ```
//!
//! All three components are lower-cased; `access` is the literal token
//! `readable` or `writable`. The builders here are pure; the session-scoped
//! profile default lives on `EdFiClient`.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};

use crate::error::{EdFiError, Result};

/// Which side of the profile a request negotiates for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The read shape, negotiated through `Accept`.
    Readable,
    /// The write shape, negotiated through `Content-Type`.
    Writable,
}

impl Access {
    fn token(self) -> &'static str {
        match self {
            Access::Readable => "readable",
            Access::Writable => "writable",
        }
    }
}

/// Formats the vendor MIME type for a (resource, profile, access) triple.
/// All components are lower-cased; callers may pass any casing.
pub fn profile_mime(resource: &str, profile: &str, access: Access) -> String {
    format!(
        "application/vnd.ed-fi.{}.{}.{}+json",
        resource.to_lowercase(),
        profile.to_lowercase(),
        access.token()
    )
}

/// Builds the `Accept` header for a profiled read.
pub fn read_header(resource: &str, profile: &str) -> Result<HeaderMap> {
    single_header(ACCEPT, resource, profile, Access::Readable)
}

/// Builds the `Content-Type` header for a profiled write.
pub fn write_header(resource: &str, profile: &str) -> Result<HeaderMap> {
    single_header(CONTENT_TYPE, resource, profile, Access::Writable)
}

fn single_header(
    name: reqwest::header::HeaderName,
    resource: &str,
    profile: &str,
    access: Access,
) -> Result<HeaderMap> {
    let mime = profile_mime(resource, profile, access);
    let value = HeaderValue::from_str(&mime)
        .map_err(|_| EdFiError::argument(format!("profile mime is not a valid header: {mime}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(name, value);
    Ok(headers)
}

/// Legacy combined form: one call that names the resource through either a
/// `readable` or `writable` directive and sets both `Accept` and
/// `Content-Type` to the same profiled MIME type.
///
/// Exactly one directive must be given. Both at once is ambiguous
/// (`conflicting access directives`); neither leaves the resource unnamed
/// (`missing access directive`).
pub fn profile_header(
    readable: Option<&str>,
    writable: Option<&str>,
    profile: &str,
) -> Result<HeaderMap> {
    let (resource, access) = match (readable, writable) {
        (Some(_), Some(_)) => return Err(EdFiError::argument("conflicting access directives")),
        (Some(r), None) => (r, Access::Readable),
        (None, Some(w)) => (w, Access::Writable),
        (None, None) => return Err(EdFiError::argument("missing access directive")),
    };

    let mime = profile_mime(resource, profile, access);
    let value = HeaderValue::from_str(&mime)
        .map_err(|_| EdFiError::argument(format!("profile mime is not a valid header: {mime}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, value.clone());
    headers.insert(CONTENT_TYPE, value);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_lower_cases_every_component() {
        assert_eq!(
            profile_mime("Students", "MyProfile", Access::Readable),
            "application/vnd.ed-fi.students.myprofile.readable+json"
        );
    }

    #[test]
    fn read_header_sets_accept() {
        let headers = read_header("students", "myProfile").unwrap();
        assert_eq!(
            headers.get(ACCEPT).unwrap(),
            "application/vnd.ed-fi.students.myprofile.readable+json"
        );
        assert!(
            headers.get(CONTENT_TYPE).is_none(),
            "read negotiation must not set Content-Type"
        );
    }

    #[test]
    fn write_header_sets_content_type() {
        let headers = write_header("schools", "assessment").unwrap();
        assert_eq!(
            headers.get(CONTENT_TYPE).unwrap(),
            "application/vnd.ed-fi.schools.assessment.writable+json"
        );
        assert!(headers.get(ACCEPT).is_none());
    }

    #[test]
    fn combined_form_sets_both_headers() {
        let headers = profile_header(Some("students"), None, "myProfile").unwrap();
        let expected = "application/vnd.ed-fi.students.myprofile.readable+json";
        assert_eq!(headers.get(ACCEPT).unwrap(), expected);
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), expected);
    }

    #[test]
    fn conflicting_directives_are_rejected() {
        let err = profile_header(Some("students"), Some("students"), "p").unwrap_err();
        match err {
            EdFiError::Argument { message } => {
                assert_eq!(message, "conflicting access directives")
            }
            other => panic!("expected Argument error, got {other:?}"),
        }
    }

    #[test]
    fn missing_directive_is_rejected() {
        let err = profile_header(None, None, "p").unwrap_err();
        assert!(matches!(err, EdFiError::Argument { .. }));
    }
}
