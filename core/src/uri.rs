//! Helpers for the `http://id.who.int/...` identifiers that appear in
//! ICD responses.

use serde_json::Value;

pub const FOUNDATION_ENTITY_PREFIX: &str = "http://id.who.int/icd/entity/";

/// Last path segment of an ICD URI, e.g. the entity id.
pub fn entity_id_from_uri(uri: &str) -> &str {
    uri.trim_end_matches('/').rsplit('/').next().unwrap_or(uri)
}

/// Canonical foundation URI for an entity id.
pub fn foundation_uri(entity_id: &str) -> String {
    format!("{FOUNDATION_ENTITY_PREFIX}{entity_id}")
}

/// Release id embedded in a release URI such as
/// `http://id.who.int/icd/release/11/2024-01/mms`.
pub fn release_id_from_uri(uri: &str) -> Option<&str> {
    let mut segments = uri.trim_end_matches('/').rsplit('/');
    segments.next()?;
    segments.next().filter(|segment| !segment.is_empty())
}

/// Ids behind the URI list in `document[field]`, e.g. `child` or
/// `descendant`. A missing or non-array field yields no ids.
pub fn uri_ids(document: &Value, field: &str) -> Vec<String> {
    document
        .get(field)
        .and_then(Value::as_array)
        .map(|uris| {
            uris.iter()
                .filter_map(Value::as_str)
                .map(|uri| entity_id_from_uri(uri).to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Accept either an entity id or a full foundation URI.
pub(crate) fn to_foundation_uri(entity: &str) -> String {
    if entity.starts_with("http://") || entity.starts_with("https://") {
        entity.to_string()
    } else {
        foundation_uri(entity)
    }
}
