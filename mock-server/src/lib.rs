//! A stand-in for the ICD API used by integration tests and local runs.
//!
//! Serves a small fixed catalog through the same routes as the real server:
//! the OAuth token endpoint, foundation entities, entity search and the
//! linearization endpoints. Every request is recorded so tests can inspect
//! the headers the client actually sent.

use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::{
        header::{ACCEPT_LANGUAGE, AUTHORIZATION},
        StatusCode,
    },
    middleware::{self, Next},
    response::{Html, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub mod catalog;

pub use catalog::{Catalog, CatalogEntry};

pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";
pub const TOKEN_LIFETIME_SECS: u64 = 3600;

/// How the mock behaves. Without `require_auth` it acts like a local
/// deployment and ignores the `Authorization` header.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub require_auth: bool,
    pub client_id: String,
    pub client_secret: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            require_auth: false,
            client_id: CLIENT_ID.to_string(),
            client_secret: CLIENT_SECRET.to_string(),
        }
    }
}

/// One request as seen by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub accept_language: Option<String>,
    pub api_version: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<MockConfig>,
    catalog: Arc<Catalog>,
    tokens: Arc<RwLock<HashSet<String>>>,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
}

impl AppState {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(Catalog::sample()),
            tokens: Arc::new(RwLock::new(HashSet::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    /// For callers outside the runtime, such as blocking client tests.
    pub fn recorded_blocking(&self) -> Vec<RecordedRequest> {
        self.requests.blocking_read().clone()
    }

    pub fn tokens_issued_blocking(&self) -> usize {
        self.tokens.blocking_read().len()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

// Under `/release/11` the first segment is a linearization name on the
// summary and entity-release routes and a release id on the deeper ones;
// the second is an entity id on the entity-release route. matchit needs one
// name per position, so the handlers bind them by position.
pub fn app_with_state(state: AppState) -> Router {
    let icd = Router::new()
        .route("/icd/entity/search", get(search_entities))
        .route("/icd/entity/{id}", get(get_entity))
        .route("/icd/release/10/{code}", get(get_icd10_code))
        .route("/icd/release/11/{name}", get(get_linearization))
        .route("/icd/release/11/{name}/{linearization}", get(get_entity_releases))
        .route("/icd/release/11/{name}/{linearization}/lookup", get(lookup))
        .route("/icd/release/11/{name}/{linearization}/search", get(search_linearization))
        .route("/icd/release/11/{name}/{linearization}/codeinfo/{code}", get(get_code_info))
        .route("/icd/release/11/{name}/{linearization}/{id}", get(get_linearization_entity))
        .route("/icd/release/11/{name}/{linearization}/{id}/{residual}", get(get_residual))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/connect/token", post(issue_token))
        .route("/swagger/index.html", get(swagger))
        .merge(icd)
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, AppState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, require_auth = state.config.require_auth, "mock ICD API listening");
    }
    axum::serve(listener, app_with_state(state)).await
}

async fn record(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let recorded = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        RecordedRequest {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(str::to_string),
            authorization: header(AUTHORIZATION.as_str()),
            accept_language: header(ACCEPT_LANGUAGE.as_str()),
            api_version: header("api-version"),
        }
    };
    debug!(method = %recorded.method, path = %recorded.path, "request");
    state.requests.write().await.push(recorded);
    next.run(request).await
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, StatusCode> {
    if state.config.require_auth {
        let token = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);
        let known = match token {
            Some(token) => state.tokens.read().await.contains(&token),
            None => false,
        };
        if !known {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }
    Ok(next.run(request).await)
}

#[derive(Deserialize)]
pub struct TokenForm {
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: String,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub token_type: String,
    pub scope: String,
}

async fn issue_token(
    State(state): State<AppState>,
    Form(form): Form<TokenForm>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<Value>)> {
    if form.grant_type != "client_credentials" {
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": "unsupported_grant_type" }))));
    }
    if form.client_id != state.config.client_id || form.client_secret != state.config.client_secret {
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_client" }))));
    }

    let access_token = Uuid::new_v4().simple().to_string();
    state.tokens.write().await.insert(access_token.clone());
    Ok(Json(TokenResponse {
        access_token,
        expires_in: TOKEN_LIFETIME_SECS,
        token_type: "Bearer".to_string(),
        scope: form.scope.unwrap_or_else(|| "icdapi_access".to_string()),
    }))
}

async fn swagger() -> Html<&'static str> {
    Html("<html><body>mock ICD API</body></html>")
}

async fn get_entity(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    state
        .catalog
        .foundation_entity(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

async fn search_entities(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, StatusCode> {
    let q = query.q.ok_or(StatusCode::BAD_REQUEST)?;
    if q.trim().is_empty() {
        return Ok(Json(Catalog::search_error("search string is empty")));
    }
    Ok(Json(state.catalog.search(&q, None)))
}

async fn get_linearization(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state
        .catalog
        .linearization(&name)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
pub struct LookupQuery {
    #[serde(rename = "foundationUri")]
    pub foundation_uri: Option<String>,
}

async fn lookup(
    State(state): State<AppState>,
    Path((release, linearization)): Path<(String, String)>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<Value>, StatusCode> {
    let uri = query.foundation_uri.ok_or(StatusCode::BAD_REQUEST)?;
    let id = uri.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    state
        .catalog
        .linearization_entity(&release, &linearization, id, &[])
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn search_linearization(
    State(state): State<AppState>,
    Path((release, linearization)): Path<(String, String)>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, StatusCode> {
    if !state.catalog.has_release(&release, &linearization) {
        return Err(StatusCode::NOT_FOUND);
    }
    let q = query.q.ok_or(StatusCode::BAD_REQUEST)?;
    if q.trim().is_empty() {
        return Ok(Json(Catalog::search_error("search string is empty")));
    }
    Ok(Json(state.catalog.search(&q, Some((release.as_str(), linearization.as_str())))))
}

#[derive(Deserialize)]
pub struct IncludeQuery {
    pub include: Option<String>,
}

async fn get_linearization_entity(
    State(state): State<AppState>,
    Path((release, linearization, id)): Path<(String, String, String)>,
    Query(query): Query<IncludeQuery>,
) -> Result<Json<Value>, StatusCode> {
    let include: Vec<&str> = query
        .include
        .as_deref()
        .map(|v| v.split(',').map(str::trim).collect())
        .unwrap_or_default();
    state
        .catalog
        .linearization_entity(&release, &linearization, &id, &include)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_residual(
    State(state): State<AppState>,
    Path((release, linearization, id, residual)): Path<(String, String, String, String)>,
) -> Result<Json<Value>, StatusCode> {
    state
        .catalog
        .residual(&release, &linearization, &id, &residual)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_code_info(
    State(state): State<AppState>,
    Path((release, linearization, code)): Path<(String, String, String)>,
) -> Result<Json<Value>, StatusCode> {
    state
        .catalog
        .code_info(&release, &linearization, &code)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_entity_releases(
    State(state): State<AppState>,
    Path((linearization, id)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    state
        .catalog
        .entity_releases(&linearization, &id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_icd10_code(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<Value>, StatusCode> {
    state
        .catalog
        .icd10_code(&code)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
