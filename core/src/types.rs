//! The few ICD documents the client needs to understand.
//!
//! Entities and search results are passed through as `serde_json::Value`;
//! only the linearization summary is typed because release resolution
//! reads it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::uri::release_id_from_uri;

/// Response of `GET /release/11/{linearization}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linearization {
    #[serde(rename = "@context", default)]
    pub context: Option<String>,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<Value>,
    #[serde(rename = "latestRelease")]
    pub latest_release: String,
    #[serde(rename = "release", default)]
    pub releases: Vec<String>,
}

impl Linearization {
    pub fn release_ids(&self) -> Vec<&str> {
        self.releases.iter().filter_map(|uri| release_id_from_uri(uri)).collect()
    }

    pub fn latest_release_id(&self) -> Option<&str> {
        release_id_from_uri(&self.latest_release)
    }

    pub fn has_release(&self, release_id: &str) -> bool {
        self.release_ids().contains(&release_id)
    }
}

/// Which hierarchy to embed in a linearization entity response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Include {
    Ancestor,
    Descendant,
    Both,
}

impl Include {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            Include::Ancestor => "ancestor",
            Include::Descendant => "descendant",
            Include::Both => "ancestor,descendant",
        }
    }
}

/// Classification a code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSystem {
    Icd10,
    Icd11,
}

/// Residual categories ("other" / "unspecified") of a linearization entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidualCodes {
    pub other: Option<Value>,
    pub unspecified: Option<Value>,
}

/// A foundation entity with the subtree fetched under it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityNode {
    pub id: String,
    pub entity: Value,
    pub children: Vec<EntityNode>,
}

impl EntityNode {
    /// Pre-order list of every node, each with its `children` emptied.
    pub fn flatten(self) -> Vec<EntityNode> {
        let mut nodes = Vec::new();
        let mut stack = vec![self];
        while let Some(mut node) = stack.pop() {
            let children = std::mem::take(&mut node.children);
            nodes.push(node);
            stack.extend(children.into_iter().rev());
        }
        nodes
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids = vec![self.id.as_str()];
        for child in &self.children {
            ids.extend(child.ids());
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linearization_exposes_release_ids() {
        let raw = r#"{
            "@context": "http://id.who.int/icd/contexts/contextForLinearization.json",
            "@id": "http://id.who.int/icd/release/11/mms",
            "title": {"@language": "en", "@value": "ICD-11 for Mortality and Morbidity Statistics"},
            "latestRelease": "http://id.who.int/icd/release/11/2024-01/mms",
            "release": [
                "http://id.who.int/icd/release/11/2023-01/mms",
                "http://id.who.int/icd/release/11/2024-01/mms"
            ]
        }"#;
        let lin: Linearization = serde_json::from_str(raw).unwrap();
        assert_eq!(lin.release_ids(), vec!["2023-01", "2024-01"]);
        assert_eq!(lin.latest_release_id(), Some("2024-01"));
        assert!(lin.has_release("2023-01"));
        assert!(!lin.has_release("2019-04"));
    }

    fn node(id: &str, children: Vec<EntityNode>) -> EntityNode {
        EntityNode {
            id: id.to_string(),
            entity: Value::Null,
            children,
        }
    }

    #[test]
    fn flatten_is_pre_order() {
        let tree = node("a", vec![node("b", vec![node("c", Vec::new())]), node("d", Vec::new())]);
        assert_eq!(tree.ids(), vec!["a", "b", "c", "d"]);

        let flat = tree.flatten();
        let ids: Vec<&str> = flat.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(flat.iter().all(|n| n.children.is_empty()));
    }

    #[test]
    fn include_query_values() {
        assert_eq!(Include::Both.as_query_value(), "ancestor,descendant");
        assert_eq!(Include::Descendant.as_query_value(), "descendant");
    }
}
