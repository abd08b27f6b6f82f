//! `Api`: the client callers actually use.
//!
//! Composes the stateless `IcdClient` builders with a `Transport`, the
//! memoized bearer token and the optional response cache. In local mode
//! (no token endpoint) requests go out without an `Authorization` header.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{build_token_request, parse_token_response, TokenCache};
use crate::cache::ResponseCache;
use crate::client::IcdClient;
use crate::config::IcdConfig;
use crate::error::{IcdError, IcdResult};
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{Transport, UreqTransport};
use crate::types::{CodeSystem, EntityNode, Include, Linearization, ResidualCodes};
use crate::uri::uri_ids;

pub struct Api<T: Transport = UreqTransport> {
    config: IcdConfig,
    client: IcdClient,
    transport: T,
    tokens: TokenCache,
    cache: Option<ResponseCache>,
    release_id: Option<String>,
}

impl Api<UreqTransport> {
    pub fn new(config: IcdConfig) -> IcdResult<Self> {
        Self::with_transport(config, UreqTransport::new())
    }

    /// Build from `ICDAPI_*` environment variables.
    pub fn from_env() -> IcdResult<Self> {
        Self::new(IcdConfig::from_env()?)
    }
}

impl<T: Transport> Api<T> {
    pub fn with_transport(config: IcdConfig, transport: T) -> IcdResult<Self> {
        config.validate()?;
        let client = IcdClient::new(&config)?;
        let cache = config.cache.as_ref().and_then(ResponseCache::from_config);
        if let Some(cache) = &cache {
            debug!(cache = cache.name(), "response cache enabled");
        }
        Ok(Self {
            config,
            client,
            transport,
            tokens: TokenCache::new(),
            cache,
            release_id: None,
        })
    }

    pub fn config(&self) -> &IcdConfig {
        &self.config
    }

    pub fn client(&self) -> &IcdClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Return a bearer token, fetching one if none is cached or it expired.
    ///
    /// `Ok(None)` in local mode, without any request.
    pub fn authenticate(&mut self) -> IcdResult<Option<String>> {
        let Some(endpoint) = self.config.token_endpoint.as_deref() else {
            return Ok(None);
        };
        if let Some(token) = self.tokens.get() {
            return Ok(Some(token.value().to_string()));
        }

        let (Some(client_id), Some(client_secret)) =
            (self.config.client_id.as_deref(), self.config.client_secret.as_deref())
        else {
            return Err(IcdError::Configuration(
                "token_endpoint is set but client_id or client_secret is missing".to_string(),
            ));
        };

        let request = build_token_request(endpoint, client_id, client_secret);
        let response = self.transport.execute(&request).map_err(|e| IcdError::Authentication {
            status: None,
            message: e.to_string(),
        })?;
        let token = parse_token_response(response)?;
        info!(endpoint, "obtained access token");

        let value = token.value().to_string();
        self.tokens.set(token);
        Ok(Some(value))
    }

    /// Foundation entity by id, pinned to the configured release if any.
    pub fn get_entity(&mut self, entity_id: &str) -> IcdResult<Value> {
        let release_id = if self.config.release_id.is_some() {
            Some(self.release_id()?)
        } else {
            None
        };
        let request = self.client.build_get_entity(entity_id, release_id.as_deref())?;
        self.fetch(request)
    }

    /// Where a foundation entity (id or URI) is coded in the linearization.
    pub fn lookup(&mut self, entity: &str) -> IcdResult<Value> {
        let release_id = self.release_id()?;
        let request = self.client.build_lookup(entity, &release_id)?;
        self.fetch(request)
    }

    /// Search results; a response flagged `"error": true` is a `Request` error.
    pub fn search_entities(&mut self, search_string: &str) -> IcdResult<Value> {
        let request = self.client.build_search_entities(search_string)?;
        self.fetch_search(request)
    }

    /// The release every linearization call targets, settled on first use.
    ///
    /// A configured release id is checked against the linearization's
    /// releases; without one the latest release is used.
    pub fn release_id(&mut self) -> IcdResult<String> {
        if let Some(release_id) = &self.release_id {
            return Ok(release_id.clone());
        }

        let linearization = self.get_linearization()?;
        let release_id = match &self.config.release_id {
            Some(configured) => configured.clone(),
            None => linearization
                .latest_release_id()
                .ok_or_else(|| IcdError::Request {
                    status: None,
                    message: format!("linearization {} has no latest release", linearization.id),
                })?
                .to_string(),
        };
        debug!(release_id = %release_id, "resolved release");
        self.release_id = Some(release_id.clone());
        Ok(release_id)
    }

    /// Linearization summary with its available releases.
    ///
    /// Fails with `Configuration` if the configured release id is not one
    /// of them.
    pub fn get_linearization(&mut self) -> IcdResult<Linearization> {
        let request = self.client.build_get_linearization()?;
        let url = request.url.clone();
        let response = self.send(request)?;
        let linearization = self.client.parse_linearization(response, &url)?;

        if let Some(release_id) = &self.config.release_id {
            if !linearization.has_release(release_id) {
                return Err(IcdError::Configuration(format!(
                    "release_id {release_id} not in available releases {}",
                    linearization.release_ids().join(",")
                )));
            }
        }
        Ok(linearization)
    }

    pub fn get_linearization_entity(&mut self, entity_id: &str, include: Option<Include>) -> IcdResult<Value> {
        let release_id = self.release_id()?;
        let request = self
            .client
            .build_linearization_entity(entity_id, &release_id, include)?;
        self.fetch(request)
    }

    pub fn search_linearization(&mut self, search_string: &str) -> IcdResult<Value> {
        let release_id = self.release_id()?;
        let request = self.client.build_search_linearization(search_string, &release_id)?;
        self.fetch_search(request)
    }

    /// Ids of the entity's descendants in the linearization.
    pub fn get_linearization_descendant_ids(&mut self, entity_id: &str) -> IcdResult<Vec<String>> {
        let entity = self.get_linearization_entity(entity_id, Some(Include::Descendant))?;
        Ok(uri_ids(&entity, "descendant"))
    }

    /// Ids of the entity's ancestors in the linearization.
    pub fn get_linearization_ancestor_ids(&mut self, entity_id: &str) -> IcdResult<Vec<String>> {
        let entity = self.get_linearization_entity(entity_id, Some(Include::Ancestor))?;
        Ok(uri_ids(&entity, "ancestor"))
    }

    pub fn get_code(&mut self, system: CodeSystem, code: &str) -> IcdResult<Value> {
        let release_id = match system {
            CodeSystem::Icd10 => None,
            CodeSystem::Icd11 => Some(self.release_id()?),
        };
        let request = self.client.build_get_code(system, code, release_id.as_deref())?;
        self.fetch(request)
    }

    /// "Other" and "unspecified" residual categories; missing ones are `None`.
    pub fn get_residual_codes(&mut self, entity_id: &str) -> IcdResult<ResidualCodes> {
        let release_id = self.release_id()?;
        let [other, unspecified] = self.client.build_residual_codes(entity_id, &release_id)?;
        Ok(ResidualCodes {
            other: self.fetch_optional(other)?,
            unspecified: self.fetch_optional(unspecified)?,
        })
    }

    pub fn get_entity_linearization_releases(&mut self, entity_id: &str) -> IcdResult<Value> {
        let request = self.client.build_entity_linearization_releases(entity_id)?;
        self.fetch(request)
    }

    /// Any document below the base URL, e.g. `release/11/mms/257068234`.
    pub fn get_uri(&mut self, path: &str) -> IcdResult<Value> {
        let request = self.client.build_get_uri(path)?;
        self.fetch(request)
    }

    /// The foundation subtree under `entity_id`, following `child` links.
    ///
    /// Each entity is fetched once; a child already reached through another
    /// parent is not repeated. `EntityNode::flatten` gives the pre-order list.
    pub fn get_entity_tree(&mut self, entity_id: &str) -> IcdResult<EntityNode> {
        let mut visited = HashSet::from([entity_id.to_string()]);
        self.collect_subtree(entity_id, &mut visited, 0)
    }

    /// Ids of the entities under `entity_id` that have no children,
    /// in depth-first order. A childless root is its own leaf.
    pub fn get_leaf_nodes(&mut self, entity_id: &str) -> IcdResult<Vec<String>> {
        let mut visited = HashSet::from([entity_id.to_string()]);
        let mut leaves = Vec::new();
        self.collect_leaves(entity_id, &mut visited, &mut leaves)?;
        Ok(leaves)
    }

    /// Succeeds if the server answers at all, whatever the status.
    pub fn check_connection(&self) -> IcdResult<()> {
        let probe = self.client.build_swagger_probe();
        self.transport.execute(&probe).map(|_| ()).map_err(|e| IcdError::Request {
            status: None,
            message: format!("cannot connect to {}: {e}", self.config.base_url),
        })
    }

    fn fetch(&mut self, request: HttpRequest) -> IcdResult<Value> {
        let url = request.url.clone();
        let response = self.send(request)?;
        self.client.parse_document(response, &url)
    }

    fn fetch_search(&mut self, request: HttpRequest) -> IcdResult<Value> {
        let url = request.url.clone();
        let response = self.send(request)?;
        self.client.parse_search(response, &url)
    }

    fn collect_subtree(
        &mut self,
        entity_id: &str,
        visited: &mut HashSet<String>,
        depth: usize,
    ) -> IcdResult<EntityNode> {
        let entity = self.get_entity(entity_id)?;
        debug!(entity_id, depth, "fetched entity");

        let mut children = Vec::new();
        for child_id in uri_ids(&entity, "child") {
            if visited.insert(child_id.clone()) {
                children.push(self.collect_subtree(&child_id, visited, depth + 1)?);
            }
        }
        Ok(EntityNode {
            id: entity_id.to_string(),
            entity,
            children,
        })
    }

    fn collect_leaves(
        &mut self,
        entity_id: &str,
        visited: &mut HashSet<String>,
        leaves: &mut Vec<String>,
    ) -> IcdResult<()> {
        let entity = self.get_entity(entity_id)?;
        let children = uri_ids(&entity, "child");
        if children.is_empty() {
            leaves.push(entity_id.to_string());
        }
        for child_id in children {
            if visited.insert(child_id.clone()) {
                self.collect_leaves(&child_id, visited, leaves)?;
            }
        }
        Ok(())
    }

    fn fetch_optional(&mut self, request: HttpRequest) -> IcdResult<Option<Value>> {
        let url = request.url.clone();
        let response = self.send(request)?;
        self.client.parse_optional_document(response, &url)
    }

    fn send(&mut self, request: HttpRequest) -> IcdResult<HttpResponse> {
        if let Some(hit) = self.cache.as_mut().and_then(|cache| cache.get(&request).cloned()) {
            debug!(url = %request.url, "serving response from cache");
            return Ok(hit);
        }

        let request = match self.authenticate()? {
            Some(token) => request.with_bearer(&token),
            None => request,
        };
        let response = self.transport.execute(&request)?;

        if response.status == 401 && self.config.uses_auth_token() {
            warn!(url = %request.url, "request unauthorized, dropping cached token");
            self.tokens.clear();
        }
        if let Some(cache) = self.cache.as_mut() {
            cache.store(&request, &response);
        }
        Ok(response)
    }
}
