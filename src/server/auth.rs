//! Connection identity
//!
//! Authentication itself happens upstream. The server only needs to learn
//! which user a WebSocket upgrade request belongs to.

use axum::http::{HeaderMap, HeaderName};

/// Default header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Resolves the user id of an upgrade request
pub trait Authenticator: Send + Sync + 'static {
    /// `None` rejects the request as unauthenticated
    fn authenticate(&self, headers: &HeaderMap) -> Option<String>;
}

/// Trusts a header set by the upstream auth layer
#[derive(Debug, Clone)]
pub struct HeaderAuthenticator {
    header: HeaderName,
}

impl HeaderAuthenticator {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl Default for HeaderAuthenticator {
    fn default() -> Self {
        Self::new(HeaderName::from_static(USER_ID_HEADER))
    }
}

impl Authenticator for HeaderAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(&self.header)?.to_str().ok()?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_header_present() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" alice "));

        let user = HeaderAuthenticator::default().authenticate(&headers);

        assert_eq!(user.as_deref(), Some("alice"));
    }

    #[test]
    fn test_header_missing_or_blank() {
        let auth = HeaderAuthenticator::default();
        assert_eq!(auth.authenticate(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));
        assert_eq!(auth.authenticate(&headers), None);
    }

    #[test]
    fn test_custom_header() {
        let auth = HeaderAuthenticator::new(HeaderName::from_static("x-forwarded-user"));
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-user", HeaderValue::from_static("bob"));
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("mallory"));

        assert_eq!(auth.authenticate(&headers).as_deref(), Some("bob"));
    }
}
