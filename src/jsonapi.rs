//! JSON:API envelope decoding.
//!
//! A [`Document`] is the top-level response shape (`data`, `included`,
//! `meta`, `errors`); a [`Resource`] is one resource object inside it.
//! Decoding failures here are domain errors, never retried: a missing
//! `data` section, a resource of the wrong type, or a relationship name
//! the resource does not carry.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON:API response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Document {
    /// The primary data: a resource object, an array of them, or absent.
    #[serde(default)]
    pub data: Option<Value>,
    /// Side-loaded resources referenced by relationships.
    #[serde(default)]
    pub included: Vec<Resource>,
    /// Non-standard meta information.
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// Error objects, present on failure envelopes.
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// A single JSON:API resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier.
    pub id: String,
    /// Declared entity type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Attribute map.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Relationship map, keyed by relation name.
    #[serde(default)]
    pub relationships: Map<String, Value>,
    /// Resource-level meta information.
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl Resource {
    /// Identifier-only resource, used when a relationship references an
    /// id that was not side-loaded.
    fn stub(kind: &str, id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            attributes: Map::new(),
            relationships: Map::new(),
            meta: Map::new(),
        }
    }

    /// Looks up an attribute by name.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

impl Document {
    /// Decodes a raw envelope value.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::MalformedDocument(e.to_string()))
    }

    /// Decodes the primary data as a collection of resources of the
    /// expected entity type.
    ///
    /// A missing `data` section raises [`Error::MissingData`]; a resource
    /// whose declared type differs raises [`Error::TypeMismatch`].
    pub fn collection_of(&self, expected: &str) -> Result<Vec<Resource>> {
        let data = self.data.clone().ok_or(Error::MissingData)?;

        let items: Vec<Resource> =
            serde_json::from_value(data).map_err(|e| Error::MalformedDocument(e.to_string()))?;

        for item in &items {
            if item.kind != expected {
                return Err(Error::TypeMismatch {
                    expected: expected.to_string(),
                    actual: item.kind.clone(),
                });
            }
        }

        Ok(items)
    }

    /// Decodes the primary data as a single resource of the expected
    /// entity type.
    pub fn single_of(&self, expected: &str) -> Result<Resource> {
        let data = self.data.clone().ok_or(Error::MissingData)?;

        let item: Resource =
            serde_json::from_value(data).map_err(|e| Error::MalformedDocument(e.to_string()))?;

        if item.kind != expected {
            return Err(Error::TypeMismatch {
                expected: expected.to_string(),
                actual: item.kind,
            });
        }

        Ok(item)
    }

    /// Resolves a to-many relationship of `resource` against this
    /// document's `included` section.
    ///
    /// An unknown relation name raises [`Error::RelationNotExist`].
    /// Each linkage identifier resolves independently, in linkage order:
    /// a side-loaded resource when one matches, an identifier-only stub
    /// otherwise. Absent or `null` linkage yields an empty collection.
    pub fn related(&self, resource: &Resource, relation: &str) -> Result<Vec<Resource>> {
        let link = resource
            .relationships
            .get(relation)
            .ok_or_else(|| Error::RelationNotExist(relation.to_string()))?;

        let ids: Vec<(String, String)> = match link.get("data") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items.iter().filter_map(identifier).collect(),
            Some(single) => identifier(single).into_iter().collect(),
        };

        Ok(ids
            .iter()
            .map(|(kind, id)| {
                self.included
                    .iter()
                    .find(|r| r.kind == *kind && r.id == *id)
                    .cloned()
                    .unwrap_or_else(|| Resource::stub(kind, id))
            })
            .collect())
    }
}

fn identifier(value: &Value) -> Option<(String, String)> {
    let kind = value.get("type")?.as_str()?;
    let id = value.get("id")?.as_str()?;
    Some((kind.to_string(), id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_collection_decodes_typed_resources() {
        let document = doc(json!({
            "data": [
                {"id": "1", "type": "flow_tags", "attributes": {"name": "alpha"}},
                {"id": "2", "type": "flow_tags", "attributes": {"name": "beta"}},
            ]
        }));

        let tags = document.collection_of("flow_tags").unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].attr("name"), Some(&json!("alpha")));
    }

    #[test]
    fn test_missing_data_section() {
        let document = doc(json!({"meta": {}}));

        let result = document.collection_of("flow_tags");
        assert!(matches!(result, Err(Error::MissingData)));
    }

    #[test]
    fn test_type_mismatch() {
        let document = doc(json!({
            "data": [{"id": "1", "type": "documents"}]
        }));

        let result = document.collection_of("flow_tags");
        assert!(matches!(
            result,
            Err(Error::TypeMismatch { expected, actual })
                if expected == "flow_tags" && actual == "documents"
        ));
    }

    #[test]
    fn test_single_decodes_typed_resource() {
        let document = doc(json!({
            "data": {"id": "1", "type": "organizations", "attributes": {"name": "Acme"}}
        }));

        let org = document.single_of("organizations").unwrap();
        assert_eq!(org.id, "1");
        assert_eq!(org.attr("name"), Some(&json!("Acme")));
    }

    #[test]
    fn test_single_type_mismatch() {
        let document = doc(json!({
            "data": {"id": "1", "type": "documents"}
        }));

        let result = document.single_of("organizations");
        assert!(matches!(
            result,
            Err(Error::TypeMismatch { expected, actual })
                if expected == "organizations" && actual == "documents"
        ));
    }

    #[test]
    fn test_single_missing_data() {
        let document = doc(json!({"meta": {}}));
        assert!(matches!(
            document.single_of("organizations"),
            Err(Error::MissingData)
        ));
    }

    #[test]
    fn test_unknown_relation() {
        let document = doc(json!({"data": []}));
        let resource = Resource::stub("flow_tags", "1");

        let result = document.related(&resource, "fields");
        assert!(matches!(result, Err(Error::RelationNotExist(name)) if name == "fields"));
    }

    #[test]
    fn test_related_matches_included() {
        let document = doc(json!({
            "data": [],
            "included": [
                {"id": "7", "type": "fields", "attributes": {"label": "Name"}},
                {"id": "8", "type": "fields", "attributes": {"label": "Date"}},
            ]
        }));

        let mut resource = Resource::stub("documents", "1");
        resource.relationships.insert(
            "fields".to_string(),
            json!({"data": [{"id": "7", "type": "fields"}]}),
        );

        let related = document.related(&resource, "fields").unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, "7");
        assert_eq!(related[0].attr("label"), Some(&json!("Name")));
    }

    #[test]
    fn test_related_falls_back_to_stubs() {
        let document = doc(json!({"data": []}));

        let mut resource = Resource::stub("documents", "1");
        resource.relationships.insert(
            "fields".to_string(),
            json!({"data": [{"id": "9", "type": "fields"}]}),
        );

        let related = document.related(&resource, "fields").unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, "9");
        assert!(related[0].attributes.is_empty());
    }

    #[test]
    fn test_related_mixed_linkage_stubs_unmatched_ids() {
        let document = doc(json!({
            "data": [],
            "included": [
                {"id": "7", "type": "fields", "attributes": {"label": "Name"}},
            ]
        }));

        let mut resource = Resource::stub("documents", "1");
        resource.relationships.insert(
            "fields".to_string(),
            json!({"data": [
                {"id": "9", "type": "fields"},
                {"id": "7", "type": "fields"},
            ]}),
        );

        // Linkage order is preserved; the id that was not side-loaded
        // comes back identifier-only.
        let related = document.related(&resource, "fields").unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].id, "9");
        assert!(related[0].attributes.is_empty());
        assert_eq!(related[1].id, "7");
        assert_eq!(related[1].attr("label"), Some(&json!("Name")));
    }

    #[test]
    fn test_related_null_linkage_is_empty() {
        let document = doc(json!({"data": []}));

        let mut resource = Resource::stub("documents", "1");
        resource
            .relationships
            .insert("fields".to_string(), json!({"data": null}));

        assert!(document.related(&resource, "fields").unwrap().is_empty());
    }
}
