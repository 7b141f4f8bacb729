//! STIX records as returned by the Inthreat API.
//!
//! Only the fields that drive reference closure are typed. Everything else is
//! kept in [`Record::properties`] and written back out unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Id prefix of identity records.
pub const IDENTITY_PREFIX: &str = "identity--";

/// Id prefix of marking definition records.
pub const MARKING_DEFINITION_PREFIX: &str = "marking-definition--";

/// Id prefix of relationship records.
pub const RELATIONSHIP_PREFIX: &str = "relationship--";

/// A single STIX object or relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Globally unique id, `<kind>--<uuid>`.
    pub id: String,

    /// STIX type (`report`, `relationship`, `indicator`, ...).
    #[serde(rename = "type")]
    pub record_type: String,

    /// TLP and other markings. A null or empty list is read as empty and
    /// left out when the record is written back.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub object_marking_refs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_ref: Option<String>,

    /// Contained objects. Only meaningful on reports. Empty lists are left
    /// out on output, like `object_marking_refs`.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub object_refs: Vec<String>,

    /// Relationship endpoints. Only meaningful on relationships.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<String>,

    /// All remaining STIX properties, forwarded verbatim.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Record {
    /// Creates a record with no references and no extra properties.
    pub fn new(id: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            record_type: record_type.into(),
            object_marking_refs: Vec::new(),
            created_by_ref: None,
            object_refs: Vec::new(),
            source_ref: None,
            target_ref: None,
            properties: Map::new(),
        }
    }

    pub fn with_markings<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_marking_refs = refs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_creator(mut self, identity: impl Into<String>) -> Self {
        self.created_by_ref = Some(identity.into());
        self
    }

    pub fn with_object_refs<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_refs = refs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_endpoints(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_ref = Some(source.into());
        self.target_ref = Some(target.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// The kind encoded in the id prefix, e.g. `indicator` for `indicator--1`.
    pub fn kind(&self) -> Option<&str> {
        id_kind(&self.id)
    }

    pub fn is_report(&self) -> bool {
        self.record_type == "report"
    }

    pub fn is_relationship(&self) -> bool {
        self.record_type == "relationship"
    }

    /// Every id this record points at, in field order.
    ///
    /// `object_refs` is read only on reports and the endpoints only on
    /// relationships. Empty ids are skipped.
    pub fn references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self
            .object_marking_refs
            .iter()
            .map(String::as_str)
            .collect();

        refs.extend(self.created_by_ref.as_deref());

        if self.is_report() {
            refs.extend(self.object_refs.iter().map(String::as_str));
        }

        if self.is_relationship() {
            refs.extend(self.source_ref.as_deref());
            refs.extend(self.target_ref.as_deref());
        }

        refs.retain(|id| !id.is_empty());
        refs
    }
}

/// The kind part of a STIX id, if the id is well formed.
pub fn id_kind(id: &str) -> Option<&str> {
    id.split_once("--").map(|(kind, _)| kind)
}

/// True for ids whose records are worth keeping for the whole run.
pub fn is_cacheable_id(id: &str) -> bool {
    id.starts_with(IDENTITY_PREFIX) || id.starts_with(MARKING_DEFINITION_PREFIX)
}

/// True for ids served by the relationship lookup endpoint.
pub fn is_relationship_id(id: &str) -> bool {
    id.starts_with(RELATIONSHIP_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_preserves_unknown_properties() {
        let record: Record = serde_json::from_value(json!({
            "id": "indicator--1",
            "type": "indicator",
            "pattern": "[ipv4-addr:value = '192.0.2.1']",
            "created_by_ref": "identity--a",
        }))
        .unwrap();

        assert_eq!(record.kind(), Some("indicator"));
        assert_eq!(record.created_by_ref.as_deref(), Some("identity--a"));
        assert_eq!(
            record.properties.get("pattern"),
            Some(&json!("[ipv4-addr:value = '192.0.2.1']"))
        );

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["pattern"], json!("[ipv4-addr:value = '192.0.2.1']"));
        assert_eq!(back["type"], json!("indicator"));
    }

    #[test]
    fn test_empty_reference_lists_are_omitted_on_output() {
        let record: Record = serde_json::from_value(json!({
            "id": "report--1",
            "type": "report",
            "object_marking_refs": [],
            "object_refs": [],
            "name": "weekly",
        }))
        .unwrap();

        let back = serde_json::to_value(&record).unwrap();
        assert!(back.get("object_marking_refs").is_none());
        assert!(back.get("object_refs").is_none());
        assert_eq!(back["name"], json!("weekly"));
    }

    #[test]
    fn test_null_reference_lists() {
        let record: Record = serde_json::from_value(json!({
            "id": "report--1",
            "type": "report",
            "object_marking_refs": null,
            "object_refs": null,
        }))
        .unwrap();
        assert!(record.references().is_empty());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let result = serde_json::from_value::<Record>(json!({ "type": "indicator" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_report_references() {
        let report = Record::new("report--1", "report")
            .with_markings(["marking-definition--m"])
            .with_creator("identity--c")
            .with_object_refs(["indicator--2", "malware--3"]);

        assert_eq!(
            report.references(),
            vec![
                "marking-definition--m",
                "identity--c",
                "indicator--2",
                "malware--3"
            ]
        );
    }

    #[test]
    fn test_object_refs_ignored_outside_reports() {
        let grouping = Record::new("grouping--1", "grouping").with_object_refs(["indicator--2"]);
        assert!(grouping.references().is_empty());
    }

    #[test]
    fn test_relationship_references() {
        let rel = Record::new("relationship--1", "relationship")
            .with_endpoints("indicator--2", "malware--3")
            .with_creator("");

        assert_eq!(rel.references(), vec!["indicator--2", "malware--3"]);
    }

    #[test]
    fn test_endpoints_ignored_outside_relationships() {
        let sighting = Record::new("sighting--1", "sighting").with_endpoints("a--1", "b--2");
        assert!(sighting.references().is_empty());
    }

    #[test]
    fn test_id_helpers() {
        assert!(is_cacheable_id("identity--1"));
        assert!(is_cacheable_id("marking-definition--1"));
        assert!(!is_cacheable_id("indicator--1"));
        assert!(is_relationship_id("relationship--1"));
        assert!(!is_relationship_id("report--1"));
        assert_eq!(id_kind("attack-pattern--x"), Some("attack-pattern"));
        assert_eq!(id_kind("malformed"), None);
    }
}
