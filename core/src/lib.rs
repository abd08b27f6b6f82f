//! Blocking client for the WHO ICD API.
//!
//! # Overview
//! `Api` fetches foundation entities, looks them up in a linearization and
//! searches the classification. Against the hosted WHO API it authenticates
//! with OAuth client credentials; against a local deployment it sends plain
//! requests.
//!
//! # Design
//! - `IcdClient` only builds `HttpRequest` values and parses `HttpResponse`
//!   values, so every outgoing request can be inspected without I/O.
//! - `Transport` executes the round-trip; `UreqTransport` is the default.
//! - `Api` owns the configuration, the memoized token and the optional
//!   in-memory response cache. Responses are returned as `serde_json::Value`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod transport;
pub mod types;
pub mod uri;

pub use api::Api;
pub use auth::AccessToken;
pub use client::IcdClient;
pub use config::{CacheConfig, IcdConfig};
pub use error::{IcdError, IcdResult};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, UreqTransport};
pub use types::{CodeSystem, EntityNode, Include, Linearization, ResidualCodes};
