//! Optional in-memory response cache for GET requests.
//!
//! Bounded by `CacheConfig::capacity`; the least recently used entry is
//! evicted first. The bearer token is left out of the key so a token refresh
//! does not invalidate cached documents.

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::config::CacheConfig;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, AUTHORIZATION};

pub struct ResponseCache {
    name: String,
    allowable_codes: Vec<u16>,
    entries: LruCache<String, HttpResponse>,
}

impl ResponseCache {
    /// `None` when the configuration does not enable caching.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        if !config.is_enabled() {
            return None;
        }
        let capacity = NonZeroUsize::new(config.capacity)?;
        Some(Self {
            name: config.cache_name.clone(),
            allowable_codes: config.allowable_codes.clone(),
            entries: LruCache::new(capacity),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached response for `request`; a hit marks the entry as recently used.
    pub fn get(&mut self, request: &HttpRequest) -> Option<&HttpResponse> {
        let key = cache_key(request)?;
        self.entries.get(&key)
    }

    /// Store `response` if the request is cacheable and the status allowed.
    pub fn store(&mut self, request: &HttpRequest, response: &HttpResponse) {
        if !self.allowable_codes.contains(&response.status) {
            return;
        }
        if let Some(key) = cache_key(request) {
            self.entries.put(key, response.clone());
        }
    }
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("name", &self.name)
            .field("allowable_codes", &self.allowable_codes)
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

fn cache_key(request: &HttpRequest) -> Option<String> {
    if request.method != HttpMethod::Get {
        return None;
    }
    let mut key = request.url.clone();
    for (name, value) in &request.headers {
        if name.eq_ignore_ascii_case(AUTHORIZATION) {
            continue;
        }
        key.push('\n');
        key.push_str(&name.to_ascii_lowercase());
        key.push(':');
        key.push_str(value);
    }
    Some(key)
}
