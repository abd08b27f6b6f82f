//! Fixed set of entities served by the mock, shaped like real ICD documents.

use serde_json::{json, Value};

pub const LINEARIZATION: &str = "mms";
pub const RELEASES: [&str; 2] = ["2023-01", "2024-01"];
const FOUNDATION: &str = "http://id.who.int/icd/entity";
const ICD10: &str = "http://id.who.int/icd/release/10";
const ICD10_RELEASES: [&str; 2] = ["2016", "2019"];

/// ICD-10 categories served at `/icd/release/10/{code}`.
const ICD10_CODES: [(&str, &str); 2] = [("A00", "Cholera"), ("M54.5", "Low back pain")];

#[derive(Clone, Debug)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub title: &'static str,
    pub parent: Option<&'static str>,
    pub children: Vec<&'static str>,
    /// Code in the linearization; `None` when the entity is not coded there.
    pub code: Option<&'static str>,
    pub class_kind: &'static str,
    /// Residual categories as `(kind, code)`, kind being `other` or `unspecified`.
    pub residuals: Vec<(&'static str, &'static str)>,
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn sample() -> Self {
        Self::new(vec![
            CatalogEntry {
                id: "455013390",
                title: "ICD Entity",
                parent: None,
                children: vec!["1435254666", "1766440644"],
                code: None,
                class_kind: "window",
                residuals: Vec::new(),
            },
            CatalogEntry {
                id: "1435254666",
                title: "Certain infectious or parasitic diseases",
                parent: Some("455013390"),
                children: vec!["257068234"],
                code: Some("01"),
                class_kind: "chapter",
                residuals: vec![("unspecified", "1A0Z")],
            },
            CatalogEntry {
                id: "257068234",
                title: "Cholera",
                parent: Some("1435254666"),
                children: Vec::new(),
                code: Some("1A00"),
                class_kind: "category",
                residuals: Vec::new(),
            },
            CatalogEntry {
                id: "1766440644",
                title: "Conditions related to sexual health",
                parent: Some("455013390"),
                children: Vec::new(),
                code: Some("17"),
                class_kind: "chapter",
                residuals: Vec::new(),
            },
        ])
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn has_release(&self, release: &str, linearization: &str) -> bool {
        linearization == LINEARIZATION && RELEASES.contains(&release)
    }

    /// Document served at `/icd/entity/{id}`.
    pub fn foundation_entity(&self, id: &str) -> Option<Value> {
        let entry = self.get(id)?;
        let mut doc = json!({
            "@context": "http://id.who.int/icd/contexts/contextForFoundationEntity.json",
            "@id": format!("{FOUNDATION}/{}", entry.id),
            "title": label(entry.title),
            "browserUrl": format!("https://icd.who.int/browse11/l-m/en#/{FOUNDATION}/{}", entry.id),
        });
        if let Some(parent) = entry.parent {
            doc["parent"] = json!([format!("{FOUNDATION}/{parent}")]);
        }
        if !entry.children.is_empty() {
            doc["child"] = entry
                .children
                .iter()
                .map(|c| Value::String(format!("{FOUNDATION}/{c}")))
                .collect();
        }
        Some(doc)
    }

    /// Document served at `/icd/release/11/{linearization}`.
    pub fn linearization(&self, name: &str) -> Option<Value> {
        if name != LINEARIZATION {
            return None;
        }
        let release_uri = |release: &str| format!("http://id.who.int/icd/release/11/{release}/{name}");
        Some(json!({
            "@context": "http://id.who.int/icd/contexts/contextForLinearization.json",
            "@id": format!("http://id.who.int/icd/release/11/{name}"),
            "title": label("International Classification of Diseases 11th Revision - Mortality and Morbidity Statistics"),
            "latestRelease": release_uri(RELEASES[RELEASES.len() - 1]),
            "release": RELEASES.iter().map(|r| release_uri(*r)).collect::<Vec<_>>(),
        }))
    }

    /// Coded ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<&'static str> {
        let mut ancestors = Vec::new();
        let mut current = self.get(id).and_then(|e| e.parent);
        while let Some(parent_id) = current {
            if ancestors.contains(&parent_id) || ancestors.len() > self.entries.len() {
                break;
            }
            ancestors.push(parent_id);
            current = self.get(parent_id).and_then(|e| e.parent);
        }
        ancestors.retain(|a| self.get(a).is_some_and(|e| e.code.is_some()));
        ancestors
    }

    /// Coded descendants of `id`, depth first.
    pub fn descendants(&self, id: &str) -> Vec<&'static str> {
        let mut descendants = Vec::new();
        let mut stack: Vec<&'static str> = self.get(id).map(|e| e.children.clone()).unwrap_or_default();
        stack.reverse();
        while let Some(child) = stack.pop() {
            if descendants.contains(&child) {
                continue;
            }
            descendants.push(child);
            if let Some(entry) = self.get(child) {
                stack.extend(entry.children.iter().rev());
            }
        }
        descendants.retain(|d| self.get(d).is_some_and(|e| e.code.is_some()));
        descendants
    }

    /// Linearization entity; `None` unless the release exists and the
    /// entity carries a code. `include` lists `ancestor` and/or `descendant`.
    pub fn linearization_entity(
        &self,
        release: &str,
        linearization: &str,
        id: &str,
        include: &[&str],
    ) -> Option<Value> {
        if !self.has_release(release, linearization) {
            return None;
        }
        let entry = self.get(id)?;
        let code = entry.code?;
        let base = format!("http://id.who.int/icd/release/11/{release}/{linearization}");
        let mut doc = json!({
            "@context": "http://id.who.int/icd/contexts/contextForLinearizationEntity.json",
            "@id": format!("{base}/{}", entry.id),
            "source": format!("{FOUNDATION}/{}", entry.id),
            "code": code,
            "classKind": entry.class_kind,
            "title": label(entry.title),
        });
        if let Some(parent) = entry.parent {
            doc["parent"] = json!([format!("{base}/{parent}")]);
        }
        if !entry.children.is_empty() {
            doc["child"] = entry
                .children
                .iter()
                .map(|c| Value::String(format!("{base}/{c}")))
                .collect();
        }
        let uris = |ids: Vec<&str>| ids.iter().map(|i| format!("{base}/{i}")).collect::<Vec<_>>();
        if include.contains(&"ancestor") {
            doc["ancestor"] = json!(uris(self.ancestors(id)));
        }
        if include.contains(&"descendant") {
            doc["descendant"] = json!(uris(self.descendants(id)));
        }
        Some(doc)
    }

    /// Residual category (`other` or `unspecified`) of a linearization entity.
    pub fn residual(&self, release: &str, linearization: &str, id: &str, kind: &str) -> Option<Value> {
        if !self.has_release(release, linearization) {
            return None;
        }
        let entry = self.get(id)?;
        let (kind, code) = entry.residuals.iter().find(|(k, _)| *k == kind)?;
        Some(json!({
            "@context": "http://id.who.int/icd/contexts/contextForLinearizationEntity.json",
            "@id": format!("http://id.who.int/icd/release/11/{release}/{linearization}/{id}/{kind}"),
            "code": code,
            "classKind": "category",
            "title": label(&format!("{}, {kind}", entry.title)),
        }))
    }

    /// `codeinfo` document for a code of the linearization.
    pub fn code_info(&self, release: &str, linearization: &str, code: &str) -> Option<Value> {
        if !self.has_release(release, linearization) {
            return None;
        }
        let entry = self.entries.iter().find(|e| e.code == Some(code))?;
        let base = format!("http://id.who.int/icd/release/11/{release}/{linearization}");
        Some(json!({
            "@context": "http://id.who.int/icd/contexts/contextForCodeinfo.json",
            "@id": format!("{base}/codeinfo/{code}"),
            "code": code,
            "stemId": format!("{base}/{}", entry.id),
        }))
    }

    /// Release-independent view of an entity: the linearization URIs it
    /// has in each release.
    pub fn entity_releases(&self, linearization: &str, id: &str) -> Option<Value> {
        if linearization != LINEARIZATION {
            return None;
        }
        let entry = self.get(id)?;
        entry.code?;
        let release_uri = |release: &str| format!("http://id.who.int/icd/release/11/{release}/{linearization}/{id}");
        Some(json!({
            "@context": "http://id.who.int/icd/contexts/contextForLinearizationEntity.json",
            "@id": format!("http://id.who.int/icd/release/11/{linearization}/{id}"),
            "title": label(entry.title),
            "latestRelease": release_uri(RELEASES[RELEASES.len() - 1]),
            "release": RELEASES.iter().map(|r| release_uri(r)).collect::<Vec<_>>(),
        }))
    }

    /// ICD-10 category with the releases it appears in.
    pub fn icd10_code(&self, code: &str) -> Option<Value> {
        let (code, title) = ICD10_CODES.iter().find(|(c, _)| c.eq_ignore_ascii_case(code))?;
        let release_uri = |release: &str| format!("{ICD10}/{release}/{code}");
        Some(json!({
            "@context": "http://id.who.int/icd/contexts/contextForTopLevel.json",
            "@id": format!("{ICD10}/{code}"),
            "title": label(title),
            "latestRelease": release_uri(ICD10_RELEASES[ICD10_RELEASES.len() - 1]),
            "release": ICD10_RELEASES.iter().map(|r| release_uri(r)).collect::<Vec<_>>(),
        }))
    }

    /// Search result reporting a failure, as the API does for unusable queries.
    pub fn search_error(message: &str) -> Value {
        json!({
            "error": true,
            "errorMessage": message,
            "resultChopped": false,
            "wordSuggestionsChopped": false,
            "guessType": 0,
            "uniqueSearchId": uuid::Uuid::new_v4().to_string(),
            "words": null,
            "destinationEntities": [],
        })
    }

    /// Case-insensitive title search, shaped like the API's search result.
    /// With `scope`, only entities coded in that release/linearization match.
    pub fn search(&self, q: &str, scope: Option<(&str, &str)>) -> Value {
        let needle = q.to_lowercase();
        let hits: Vec<Value> = self
            .entries
            .iter()
            .filter(|e| e.title.to_lowercase().contains(&needle))
            .filter(|e| scope.is_none() || e.code.is_some())
            .map(|e| {
                let id = match scope {
                    Some((release, linearization)) => {
                        format!("http://id.who.int/icd/release/11/{release}/{linearization}/{}", e.id)
                    }
                    None => format!("{FOUNDATION}/{}", e.id),
                };
                json!({
                    "id": id,
                    "title": e.title,
                    "theCode": e.code,
                    "score": 1.0,
                })
            })
            .collect();

        json!({
            "error": false,
            "errorMessage": null,
            "resultChopped": false,
            "wordSuggestionsChopped": false,
            "guessType": 0,
            "uniqueSearchId": uuid::Uuid::new_v4().to_string(),
            "words": null,
            "destinationEntities": hits,
        })
    }
}

fn label(value: &str) -> Value {
    json!({ "@language": "en", "@value": value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foundation_entity_lists_children() {
        let doc = Catalog::sample().foundation_entity("455013390").unwrap();
        assert_eq!(doc["@id"], "http://id.who.int/icd/entity/455013390");
        assert_eq!(doc["title"]["@value"], "ICD Entity");
        assert_eq!(doc["child"].as_array().unwrap().len(), 2);
        assert!(doc.get("parent").is_none());
    }

    #[test]
    fn unknown_entity_is_none() {
        assert!(Catalog::sample().foundation_entity("1").is_none());
    }

    #[test]
    fn linearization_entity_needs_code_and_release() {
        let catalog = Catalog::sample();
        assert!(catalog.linearization_entity("2024-01", "mms", "455013390", &[]).is_none());
        assert!(catalog.linearization_entity("2019-04", "mms", "257068234", &[]).is_none());
        let doc = catalog.linearization_entity("2024-01", "mms", "257068234", &[]).unwrap();
        assert_eq!(doc["code"], "1A00");
        assert_eq!(doc["parent"][0], "http://id.who.int/icd/release/11/2024-01/mms/1435254666");
        assert!(doc.get("ancestor").is_none());
    }

    #[test]
    fn include_lists_only_coded_relatives() {
        let catalog = Catalog::sample();
        assert_eq!(catalog.ancestors("257068234"), vec!["1435254666"]);
        assert_eq!(catalog.descendants("455013390"), vec!["1435254666", "257068234", "1766440644"]);

        let doc = catalog
            .linearization_entity("2024-01", "mms", "1435254666", &["ancestor", "descendant"])
            .unwrap();
        assert_eq!(doc["ancestor"], json!([]));
        assert_eq!(doc["descendant"], json!(["http://id.who.int/icd/release/11/2024-01/mms/257068234"]));
    }

    #[test]
    fn residuals_exist_only_where_listed() {
        let catalog = Catalog::sample();
        let doc = catalog.residual("2024-01", "mms", "1435254666", "unspecified").unwrap();
        assert_eq!(doc["code"], "1A0Z");
        assert!(catalog.residual("2024-01", "mms", "1435254666", "other").is_none());
    }

    #[test]
    fn code_info_points_at_stem() {
        let doc = Catalog::sample().code_info("2024-01", "mms", "1A00").unwrap();
        assert_eq!(doc["stemId"], "http://id.who.int/icd/release/11/2024-01/mms/257068234");
        assert!(Catalog::sample().code_info("2024-01", "mms", "XX99").is_none());
    }

    #[test]
    fn icd10_lookup_ignores_case() {
        let doc = Catalog::sample().icd10_code("a00").unwrap();
        assert_eq!(doc["@id"], "http://id.who.int/icd/release/10/A00");
        assert_eq!(doc["latestRelease"], "http://id.who.int/icd/release/10/2019/A00");
    }

    #[test]
    fn latest_release_is_last() {
        let doc = Catalog::sample().linearization("mms").unwrap();
        assert_eq!(doc["latestRelease"], "http://id.who.int/icd/release/11/2024-01/mms");
        assert!(Catalog::sample().linearization("icf").is_none());
    }

    #[test]
    fn search_is_case_insensitive() {
        let result = Catalog::sample().search("CHOLERA", None);
        let hits = result["destinationEntities"].as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["id"], "http://id.who.int/icd/entity/257068234");
    }

    #[test]
    fn scoped_search_skips_uncoded_entities() {
        let result = Catalog::sample().search("entity", Some(("2024-01", "mms")));
        assert!(result["destinationEntities"].as_array().unwrap().is_empty());
    }
}
