//! Client configuration, built literally or from `ICDAPI_*` environment variables.

use std::env;

use tracing::warn;
use url::Url;

use crate::error::{IcdError, IcdResult};

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_API_VERSION: &str = "v2";
pub const DEFAULT_LINEARIZATION: &str = "mms";
pub const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Settings for the in-memory response cache.
///
/// The cache is only switched on when `cache_name` is non-empty. It holds
/// at most `capacity` responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub cache_name: String,
    pub allowable_codes: Vec<u16>,
    pub capacity: usize,
}

impl CacheConfig {
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            allowable_codes: vec![200],
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.cache_name.trim().is_empty()
    }
}

/// Everything an `Api` needs to reach an ICD API instance.
///
/// A `token_endpoint` selects authenticated mode (the WHO hosted API);
/// leaving it unset targets a local deployment, which has no authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct IcdConfig {
    pub base_url: String,
    pub language: String,
    pub api_version: String,
    pub linearization_name: String,
    pub release_id: Option<String>,
    pub token_endpoint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub cache: Option<CacheConfig>,
}

impl IcdConfig {
    /// Local-deployment configuration with default language, API version
    /// and linearization.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            linearization_name: DEFAULT_LINEARIZATION.to_string(),
            release_id: None,
            token_endpoint: None,
            client_id: None,
            client_secret: None,
            cache: None,
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    #[must_use]
    pub fn with_api_version(mut self, api_version: &str) -> Self {
        self.api_version = api_version.to_string();
        self
    }

    #[must_use]
    pub fn with_linearization(mut self, linearization_name: &str) -> Self {
        self.linearization_name = linearization_name.to_string();
        self
    }

    #[must_use]
    pub fn with_release_id(mut self, release_id: &str) -> Self {
        self.release_id = Some(release_id.to_string());
        self
    }

    /// Switch to authenticated mode.
    #[must_use]
    pub fn with_credentials(mut self, token_endpoint: &str, client_id: &str, client_secret: &str) -> Self {
        self.token_endpoint = Some(token_endpoint.to_string());
        self.client_id = Some(client_id.to_string());
        self.client_secret = Some(client_secret.to_string());
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> IcdResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key/value source using the
    /// `ICDAPI_*` variable names. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> IcdResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = get("ICDAPI_BASE_URL")
            .ok_or_else(|| IcdError::Configuration("ICDAPI_BASE_URL is not set".to_string()))?;

        let mut config = Self::new(&base_url);
        if let Some(language) = get("ICDAPI_LANGUAGE") {
            config.language = language;
        }
        if let Some(api_version) = get("ICDAPI_API_VERSION") {
            config.api_version = api_version;
        }
        if let Some(linearization_name) = get("ICDAPI_LINEARIZATION_NAME") {
            config.linearization_name = linearization_name;
        }
        config.release_id = get("ICDAPI_RELEASE_ID");
        config.token_endpoint = get("ICDAPI_TOKEN_ENDPOINT");
        config.client_id = get("ICDAPI_CLIENT_ID");
        config.client_secret = get("ICDAPI_CLIENT_SECRET");

        if let Some(cache_name) = get("ICDAPI_REQUESTS_CACHE_NAME") {
            let mut cache = CacheConfig::new(cache_name);
            if let Some(codes) = get("ICDAPI_REQUESTS_CACHE_ALLOWABLE_CODES") {
                cache.allowable_codes = parse_status_codes(&codes)?;
            }
            if let Some(capacity) = get("ICDAPI_REQUESTS_CACHE_CAPACITY") {
                cache.capacity = capacity.parse().map_err(|_| {
                    IcdError::Configuration(format!("invalid ICDAPI_REQUESTS_CACHE_CAPACITY {capacity:?}"))
                })?;
            }
            config.cache = Some(cache);
        }

        Ok(config)
    }

    /// True when requests must carry a bearer token.
    pub fn uses_auth_token(&self) -> bool {
        self.token_endpoint.is_some()
    }

    /// Reject configurations that cannot produce working requests.
    pub fn validate(&self) -> IcdResult<()> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| IcdError::Configuration(format!("invalid base_url {:?}: {e}", self.base_url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(IcdError::Configuration(format!(
                "base_url must use http or https, got {:?}",
                base.scheme()
            )));
        }

        for (name, value) in [
            ("language", &self.language),
            ("api_version", &self.api_version),
            ("linearization_name", &self.linearization_name),
        ] {
            if value.trim().is_empty() {
                return Err(IcdError::Configuration(format!("{name} must not be empty")));
            }
        }

        if let Some(cache) = self.cache.as_ref().filter(|c| c.is_enabled()) {
            if cache.capacity == 0 {
                return Err(IcdError::Configuration("cache capacity must be at least 1".to_string()));
            }
        }

        let has = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        match &self.token_endpoint {
            Some(endpoint) => {
                Url::parse(endpoint).map_err(|e| {
                    IcdError::Configuration(format!("invalid token_endpoint {endpoint:?}: {e}"))
                })?;
                if !has(&self.client_id) || !has(&self.client_secret) {
                    return Err(IcdError::Configuration(
                        "token_endpoint is set but client_id or client_secret is missing".to_string(),
                    ));
                }
            }
            None => {
                if has(&self.client_id) || has(&self.client_secret) {
                    warn!("client credentials are set without a token_endpoint, requests will be unauthenticated");
                }
            }
        }

        Ok(())
    }
}

// Hand-written so the client secret never ends up in logs.
impl std::fmt::Debug for IcdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcdConfig")
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .field("api_version", &self.api_version)
            .field("linearization_name", &self.linearization_name)
            .field("release_id", &self.release_id)
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("cache", &self.cache)
            .finish()
    }
}

fn parse_status_codes(raw: &str) -> IcdResult<Vec<u16>> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| {
            code.parse::<u16>().map_err(|_| {
                IcdError::Configuration(format!("invalid status code {code:?} in ICDAPI_REQUESTS_CACHE_ALLOWABLE_CODES"))
            })
        })
        .collect()
}
