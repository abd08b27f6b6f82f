//! Executes `HttpRequest` values against the network.

use tracing::debug;

use crate::error::{IcdError, IcdResult};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Performs one HTTP round-trip.
///
/// Implementations must hand back 4xx/5xx responses as data; only failures
/// to obtain a response at all are errors.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> IcdResult<HttpResponse>;
}

/// Blocking transport backed by a `ureq` agent.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        // Status interpretation belongs to the parsers, not the transport.
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> IcdResult<HttpResponse> {
        debug!(method = request.method.as_str(), url = %request.url, "sending request");

        let result = match (request.method, &request.body) {
            (HttpMethod::Get, _) => {
                let mut builder = self.agent.get(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            (HttpMethod::Post, body) => {
                let mut builder = self.agent.post(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                match body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };
        let mut response = result.map_err(IcdError::transport)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(IcdError::transport)?;

        debug!(status, url = %request.url, "received response");
        Ok(HttpResponse { status, headers, body })
    }
}
