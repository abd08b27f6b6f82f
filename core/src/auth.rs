//! OAuth client-credentials exchange and the in-memory token cache.
//!
//! The hosted WHO API hands out bearer tokens valid for about an hour.
//! Local deployments have no token endpoint at all, in which case none of
//! this is used.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;
use url::form_urlencoded;

use crate::error::{IcdError, IcdResult};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, ACCEPT, CONTENT_TYPE};

pub const TOKEN_SCOPE: &str = "icdapi_access";
pub const GRANT_TYPE: &str = "client_credentials";

/// Tokens are treated as expired this long before the server says so.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// A bearer token with optional expiry.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    /// A token that never expires for the lifetime of the client.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// A lifetime too long to represent as an `Instant` never expires.
    pub fn with_expiry(value: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Instant::now().checked_add(expires_in),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|exp| match exp.checked_duration_since(Instant::now()) {
                Some(left) => left <= EXPIRY_MARGIN,
                None => true,
            })
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Holds at most one token. Single caller, so no locking.
#[derive(Debug, Default)]
pub struct TokenCache {
    token: Option<AccessToken>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, unless it has expired.
    pub fn get(&self) -> Option<&AccessToken> {
        self.token.as_ref().filter(|t| !t.is_expired())
    }

    pub fn set(&mut self, token: AccessToken) {
        self.token = Some(token);
    }

    pub fn clear(&mut self) {
        self.token = None;
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Form-encoded client-credentials request for `token_endpoint`.
pub fn build_token_request(token_endpoint: &str, client_id: &str, client_secret: &str) -> HttpRequest {
    let body = form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", client_id)
        .append_pair("client_secret", client_secret)
        .append_pair("scope", TOKEN_SCOPE)
        .append_pair("grant_type", GRANT_TYPE)
        .finish();

    HttpRequest {
        method: HttpMethod::Post,
        url: token_endpoint.to_string(),
        headers: vec![
            (CONTENT_TYPE.to_string(), "application/x-www-form-urlencoded".to_string()),
            (ACCEPT.to_string(), "application/json".to_string()),
        ],
        body: Some(body),
    }
}

/// Extract the token from a token endpoint response.
pub fn parse_token_response(response: HttpResponse) -> IcdResult<AccessToken> {
    if !response.is_success() {
        return Err(IcdError::Authentication {
            status: Some(response.status),
            message: response.body,
        });
    }

    let parsed: TokenResponse = serde_json::from_str(&response.body).map_err(|e| IcdError::Authentication {
        status: Some(response.status),
        message: format!("malformed token response: {e}"),
    })?;

    let value = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| IcdError::Authentication {
            status: Some(response.status),
            message: "token response has no access_token".to_string(),
        })?;

    Ok(match parsed.expires_in {
        Some(secs) => AccessToken::with_expiry(value, Duration::from_secs(secs)),
        None => AccessToken::new(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn token_request_is_form_encoded() {
        let req = build_token_request("https://auth.example/connect/token", "my id", "s&cret");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "https://auth.example/connect/token");
        assert_eq!(req.header("content-type"), Some("application/x-www-form-urlencoded"));

        let pairs: Vec<(String, String)> = form_urlencoded::parse(req.body.as_deref().unwrap().as_bytes())
            .into_owned()
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".to_string(), "my id".to_string()),
                ("client_secret".to_string(), "s&cret".to_string()),
                ("scope".to_string(), "icdapi_access".to_string()),
                ("grant_type".to_string(), "client_credentials".to_string()),
            ]
        );
    }

    #[test]
    fn parses_token_with_expiry() {
        let token = parse_token_response(response(
            200,
            r#"{"access_token":"abc","expires_in":3600,"token_type":"Bearer"}"#,
        ))
        .unwrap();
        assert_eq!(token.value(), "abc");
        assert!(!token.is_expired());
    }

    #[test]
    fn short_lived_token_counts_as_expired() {
        let token = parse_token_response(response(200, r#"{"access_token":"abc","expires_in":30}"#)).unwrap();
        assert!(token.is_expired());
    }

    #[test]
    fn huge_lifetime_never_expires() {
        let token = parse_token_response(response(
            200,
            r#"{"access_token":"abc","expires_in":18446744073709551615}"#,
        ))
        .unwrap();
        assert_eq!(token.value(), "abc");
        assert!(!token.is_expired());
    }

    #[test]
    fn non_success_status_is_authentication_error() {
        let err = parse_token_response(response(400, r#"{"error":"invalid_client"}"#)).unwrap_err();
        assert!(matches!(err, IcdError::Authentication { status: Some(400), .. }));
    }

    #[test]
    fn malformed_body_is_authentication_error() {
        let err = parse_token_response(response(200, "<html>")).unwrap_err();
        assert!(matches!(err, IcdError::Authentication { .. }));
    }

    #[test]
    fn empty_token_is_rejected() {
        let err = parse_token_response(response(200, r#"{"access_token":""}"#)).unwrap_err();
        assert!(matches!(err, IcdError::Authentication { .. }));
    }

    #[test]
    fn cache_drops_expired_tokens() {
        let mut cache = TokenCache::new();
        assert!(cache.get().is_none());

        cache.set(AccessToken::with_expiry("stale", Duration::from_secs(1)));
        assert!(cache.get().is_none());

        cache.set(AccessToken::new("fresh"));
        assert_eq!(cache.get().map(AccessToken::value), Some("fresh"));

        cache.clear();
        assert!(cache.get().is_none());
    }

    #[test]
    fn debug_redacts_value() {
        let printed = format!("{:?}", AccessToken::new("secret-token"));
        assert!(!printed.contains("secret-token"));
    }
}
