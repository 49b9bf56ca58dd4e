//! Credential location
//!
//! The token is either a bearer credential in the `Authorization` header or
//! a session id held in a named cookie.

use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};

/// Where the credential is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    /// `Authorization: Bearer <token>`
    #[default]
    Bearer,
    /// Session id in a cookie named by `session_cookie_name`
    Session,
}

/// Resolved credential source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Bearer,
    Cookie { name: String },
}

impl CredentialSource {
    /// Extracts the token; `None` when absent or empty.
    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        let token = match self {
            CredentialSource::Bearer => bearer_token(headers),
            CredentialSource::Cookie { name } => session_cookie(headers, name),
        }?;
        (!token.is_empty()).then_some(token)
    }
}

/// Reads the token part of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim().to_string())
}

/// Reads cookie `name` from every `Cookie` header.
///
/// Pairs are split on `;`, each pair on its first `=`, and both sides are
/// trimmed. Pairs without `=` are skipped.
pub fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_header(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.append(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token() {
        let headers = with_header(header::AUTHORIZATION, "Bearer abc.def");
        assert_eq!(bearer_token(&headers), Some("abc.def".to_string()));

        let headers = with_header(header::AUTHORIZATION, "bearer  spaced ");
        assert_eq!(bearer_token(&headers), Some("spaced".to_string()));
    }

    #[test]
    fn test_non_bearer_scheme_rejected() {
        let headers = with_header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz");
        assert_eq!(bearer_token(&headers), None);

        let headers = with_header(header::AUTHORIZATION, "Bearer");
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_session_cookie() {
        let headers = with_header(header::COOKIE, "theme=dark; sid = s3ss10n ; lang=en");
        assert_eq!(session_cookie(&headers, "sid"), Some("s3ss10n".to_string()));
        assert_eq!(session_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_session_cookie_value_keeps_equals() {
        let headers = with_header(header::COOKIE, "sid=a=b==; flag");
        assert_eq!(session_cookie(&headers, "sid"), Some("a=b==".to_string()));
    }

    #[test]
    fn test_session_cookie_across_headers() {
        let mut headers = with_header(header::COOKIE, "theme=dark");
        headers.append(header::COOKIE, HeaderValue::from_static("sid=xyz"));
        assert_eq!(session_cookie(&headers, "sid"), Some("xyz".to_string()));
    }

    #[test]
    fn test_source_rejects_empty_token() {
        let headers = with_header(header::COOKIE, "sid=");
        let source = CredentialSource::Cookie {
            name: "sid".to_string(),
        };
        assert_eq!(source.extract(&headers), None);

        assert_eq!(CredentialSource::Bearer.extract(&HeaderMap::new()), None);
    }
}
