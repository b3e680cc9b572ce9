use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::router::AppState;

fn key_matches(candidate: &str, expected: &str) -> bool {
    bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
}

/// Check the request against the configured access key.
/// Accepts either:
/// - Header: `x-api-key: ...`
/// - Header: `Authorization: Bearer ...`
/// - Query string: `?key=...`
pub fn ensure_authorized(
    headers: &HeaderMap,
    query: Option<&str>,
    expected: &str,
) -> Result<(), AppError> {
    if let Some(hv) = headers.get("x-api-key").and_then(|v| v.to_str().ok())
        && key_matches(hv.trim(), expected)
    {
        return Ok(());
    }

    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        let auth = auth.trim();
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            && key_matches(token.trim(), expected)
        {
            return Ok(());
        }
    }

    if let Some(qs) = query {
        for (k, v) in url::form_urlencoded::parse(qs.as_bytes()) {
            if k == "key" && key_matches(&v, expected) {
                return Ok(());
            }
        }
    }

    Err(AppError::Unauthorized)
}

/// Extractor guarding `/api/*` and `/uploads/*`; a no-op when no key is configured.
#[derive(Debug, Clone, Copy)]
pub struct RequireAccessKey;

impl FromRequestParts<AppState> for RequireAccessKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(expected) = state.access_key.as_deref() {
            ensure_authorized(&parts.headers, parts.uri.query(), expected)?;
        }
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn accepts_each_key_location() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("s3cret"));
        assert!(ensure_authorized(&headers, None, "s3cret").is_ok());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        assert!(ensure_authorized(&headers, None, "s3cret").is_ok());

        assert!(ensure_authorized(&HeaderMap::new(), Some("days=7&key=s3cret"), "s3cret").is_ok());
    }

    #[test]
    fn rejects_wrong_or_missing_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("s3cre"));
        assert!(matches!(
            ensure_authorized(&headers, Some("key=nope"), "s3cret"),
            Err(AppError::Unauthorized)
        ));
        assert!(ensure_authorized(&HeaderMap::new(), None, "s3cret").is_err());
    }
}
