//! Stateless request builder and response parser for the ICD API.
//!
//! # Design
//! `IcdClient` holds the parsed base URL and the per-request header values
//! and carries no mutable state between calls. Each endpoint is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method
//! that consumes an `HttpResponse`. Authentication, caching and the actual
//! round-trip live in `Api`.

use serde_json::Value;
use url::Url;

use crate::config::IcdConfig;
use crate::error::{IcdError, IcdResult};
use crate::http::{HttpRequest, HttpResponse, ACCEPT, ACCEPT_LANGUAGE, API_VERSION};
use crate::types::{CodeSystem, Include, Linearization};
use crate::uri::to_foundation_uri;

/// Synchronous, stateless request builder for one ICD API instance.
#[derive(Debug, Clone)]
pub struct IcdClient {
    base: Url,
    language: String,
    api_version: String,
    linearization_name: String,
}

impl IcdClient {
    pub fn new(config: &IcdConfig) -> IcdResult<Self> {
        let base = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| IcdError::Configuration(format!("invalid base_url {:?}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(IcdError::Configuration(format!(
                "base_url {:?} cannot carry a path",
                config.base_url
            )));
        }
        Ok(Self {
            base,
            language: config.language.clone(),
            api_version: config.api_version.clone(),
            linearization_name: config.linearization_name.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    pub fn linearization_name(&self) -> &str {
        &self.linearization_name
    }

    /// `GET {base}/entity/{id}`, pinned to `release_id` when given.
    pub fn build_get_entity(&self, entity_id: &str, release_id: Option<&str>) -> IcdResult<HttpRequest> {
        let entity_id = non_empty("entity_id", entity_id)?;
        let mut url = self.endpoint(&["entity", entity_id])?;
        if let Some(release_id) = release_id {
            url.query_pairs_mut().append_pair("releaseId", release_id);
        }
        Ok(self.request(url))
    }

    /// `GET {base}/entity/search?q=...`
    pub fn build_search_entities(&self, search_string: &str) -> IcdResult<HttpRequest> {
        let mut url = self.endpoint(&["entity", "search"])?;
        url.query_pairs_mut().append_pair("q", search_string);
        Ok(self.request(url))
    }

    /// Where a foundation entity is coded in the linearization.
    /// Accepts an entity id or a full foundation URI.
    pub fn build_lookup(&self, entity: &str, release_id: &str) -> IcdResult<HttpRequest> {
        let entity = non_empty("entity", entity)?;
        let mut url = self.endpoint(&["release", "11", release_id, &self.linearization_name, "lookup"])?;
        url.query_pairs_mut()
            .append_pair("foundationUri", &to_foundation_uri(entity));
        Ok(self.request(url))
    }

    /// `GET {base}/release/11/{linearization}`
    pub fn build_get_linearization(&self) -> IcdResult<HttpRequest> {
        let url = self.endpoint(&["release", "11", &self.linearization_name])?;
        Ok(self.request(url))
    }

    pub fn build_linearization_entity(
        &self,
        entity_id: &str,
        release_id: &str,
        include: Option<Include>,
    ) -> IcdResult<HttpRequest> {
        let entity_id = non_empty("entity_id", entity_id)?;
        let mut url = self.endpoint(&["release", "11", release_id, &self.linearization_name, entity_id])?;
        if let Some(include) = include {
            url.query_pairs_mut().append_pair("include", include.as_query_value());
        }
        Ok(self.request(url))
    }

    pub fn build_search_linearization(&self, search_string: &str, release_id: &str) -> IcdResult<HttpRequest> {
        let mut url = self.endpoint(&["release", "11", release_id, &self.linearization_name, "search"])?;
        url.query_pairs_mut().append_pair("q", search_string);
        Ok(self.request(url))
    }

    /// ICD-10 codes ignore `release_id`; ICD-11 codes go through `codeinfo`
    /// and need one.
    pub fn build_get_code(&self, system: CodeSystem, code: &str, release_id: Option<&str>) -> IcdResult<HttpRequest> {
        let code = non_empty("code", code)?;
        let url = match system {
            CodeSystem::Icd10 => self.endpoint(&["release", "10", code])?,
            CodeSystem::Icd11 => {
                let release_id = release_id
                    .ok_or_else(|| IcdError::InvalidInput("ICD-11 code lookups need a release id".to_string()))?;
                let mut url = self.endpoint(&[
                    "release",
                    "11",
                    release_id,
                    &self.linearization_name,
                    "codeinfo",
                    code,
                ])?;
                url.query_pairs_mut().append_pair("flexiblemode", "true");
                url
            }
        };
        Ok(self.request(url))
    }

    /// Requests for the "other" and "unspecified" residuals, in that order.
    pub fn build_residual_codes(&self, entity_id: &str, release_id: &str) -> IcdResult<[HttpRequest; 2]> {
        let entity_id = non_empty("entity_id", entity_id)?;
        let residual = |kind: &str| {
            self.endpoint(&["release", "11", release_id, &self.linearization_name, entity_id, kind])
                .map(|url| self.request(url))
        };
        Ok([residual("other")?, residual("unspecified")?])
    }

    /// Releases in which the entity appears in the linearization.
    pub fn build_entity_linearization_releases(&self, entity_id: &str) -> IcdResult<HttpRequest> {
        let entity_id = non_empty("entity_id", entity_id)?;
        let url = self.endpoint(&["release", "11", &self.linearization_name, entity_id])?;
        Ok(self.request(url))
    }

    /// `GET {base}/{path}` for endpoints without a dedicated builder.
    /// `path` may carry its own query string.
    pub fn build_get_uri(&self, path: &str) -> IcdResult<HttpRequest> {
        let path = non_empty("path", path.trim_start_matches('/'))?;
        let url = Url::parse(&format!("{}/{path}", self.base_url()))
            .map_err(|e| IcdError::InvalidInput(format!("invalid path {path:?}: {e}")))?;
        Ok(self.request(url))
    }

    /// Swagger page at the server root, used as a reachability probe.
    pub fn build_swagger_probe(&self) -> HttpRequest {
        let root = self.base_url();
        let root = root.strip_suffix("/icd").unwrap_or(root);
        HttpRequest::get(format!("{root}/swagger/index.html"))
    }

    pub fn parse_document(&self, response: HttpResponse, url: &str) -> IcdResult<Value> {
        check_status(&response, url)?;
        decode(&response)
    }

    /// Like `parse_document`, but a 404 is `Ok(None)`.
    pub fn parse_optional_document(&self, response: HttpResponse, url: &str) -> IcdResult<Option<Value>> {
        match check_status(&response, url) {
            Ok(()) => decode(&response).map(Some),
            Err(IcdError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Search endpoints answer 200 even when the search fails, flagging it
    /// with `"error": true` and an `errorMessage`.
    pub fn parse_search(&self, response: HttpResponse, url: &str) -> IcdResult<Value> {
        check_status(&response, url)?;
        let results: Value = decode(&response)?;
        if results.get("error").and_then(Value::as_bool) == Some(true) {
            let message = results
                .get("errorMessage")
                .and_then(Value::as_str)
                .unwrap_or("search failed");
            return Err(IcdError::Request {
                status: Some(response.status),
                message: message.to_string(),
            });
        }
        Ok(results)
    }

    pub fn parse_linearization(&self, response: HttpResponse, url: &str) -> IcdResult<Linearization> {
        check_status(&response, url)?;
        decode(&response)
    }

    fn endpoint(&self, segments: &[&str]) -> IcdResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| IcdError::Configuration(format!("base_url {} cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, url: Url) -> HttpRequest {
        HttpRequest::get(url.to_string())
            .with_header(ACCEPT, "application/json")
            .with_header(ACCEPT_LANGUAGE, self.language.as_str())
            .with_header(API_VERSION, self.api_version.as_str())
    }
}

/// Map non-success status codes to the appropriate `IcdError` variant.
fn check_status(response: &HttpResponse, url: &str) -> IcdResult<()> {
    if response.is_success() {
        return Ok(());
    }
    if response.status == 404 {
        return Err(IcdError::NotFound { url: url.to_string() });
    }
    Err(IcdError::Request {
        status: Some(response.status),
        message: response.body.clone(),
    })
}

fn decode<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> IcdResult<T> {
    serde_json::from_str(&response.body).map_err(|e| IcdError::Request {
        status: Some(response.status),
        message: format!("response body is not valid JSON: {e}"),
    })
}

fn non_empty<'a>(name: &str, value: &'a str) -> IcdResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(IcdError::InvalidInput(format!("{name} must not be empty")));
    }
    Ok(value)
}
