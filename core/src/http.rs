//! HTTP transport types shared by the request builders and the transport.
//!
//! # Design
//! Requests and responses are plain data. `IcdClient` builds `HttpRequest`
//! values and parses `HttpResponse` values without touching the network;
//! a `Transport` executes the round-trip in between. Keeping the builders
//! pure is what makes outgoing requests directly comparable in tests.

/// HTTP method for a request. The ICD API only needs these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// An HTTP request described as plain data.
///
/// `url` is absolute and already carries its encoded query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Append a header, keeping insertion order.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Attach `Authorization: Bearer <token>`, replacing any previous one.
    #[must_use]
    pub fn with_bearer(mut self, token: &str) -> Self {
        self.headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case(AUTHORIZATION));
        self.with_header(AUTHORIZATION, format!("Bearer {token}"))
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

pub const AUTHORIZATION: &str = "authorization";
pub const ACCEPT: &str = "accept";
pub const ACCEPT_LANGUAGE: &str = "accept-language";
pub const API_VERSION: &str = "api-version";
pub const CONTENT_TYPE: &str = "content-type";

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
