//! Error types for the ICD API client.
//!
//! # Design
//! `NotFound` gets a dedicated variant because callers routinely treat
//! "no such entity" differently from a failing server. Every other non-2xx
//! status, transport failure or undecodable body lands in `Request`, with
//! the status when one was received. Token exchange failures are kept apart
//! in `Authentication` so they are never mistaken for a missing entity.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IcdError {
    /// Missing or inconsistent client setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The OAuth client-credentials exchange failed.
    #[error("authentication failed{}: {message}", fmt_status(.status))]
    Authentication { status: Option<u16>, message: String },

    /// The server returned 404 for the requested resource.
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Any other non-2xx status, transport failure or malformed body.
    #[error("request failed{}: {message}", fmt_status(.status))]
    Request { status: Option<u16>, message: String },

    /// A caller-supplied argument cannot form a valid request.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type IcdResult<T> = Result<T, IcdError>;

impl IcdError {
    /// HTTP status carried by the error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            IcdError::Authentication { status, .. } | IcdError::Request { status, .. } => *status,
            IcdError::NotFound { .. } => Some(404),
            IcdError::Configuration(_) | IcdError::InvalidInput(_) => None,
        }
    }

    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        IcdError::Request {
            status: None,
            message: err.to_string(),
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_when_present() {
        let err = IcdError::Request {
            status: Some(500),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "request failed (HTTP 500): boom");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn display_omits_missing_status() {
        let err = IcdError::transport("connection refused");
        assert_eq!(err.to_string(), "request failed: connection refused");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn not_found_reports_404() {
        let err = IcdError::NotFound {
            url: "http://localhost/icd/entity/1".to_string(),
        };
        assert_eq!(err.status(), Some(404));
    }
}
