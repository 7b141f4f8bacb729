//! Testing harness for connector and closure tests.
//!
//! Provides config and STIX record builders shared by unit and integration tests.

use crate::record::Record;
use crate::traits::{AuthConfig, ConnectorConfig, ConnectorHealth, ConnectorResult};
use std::collections::HashMap;

/// Creates a test connector config with sensible defaults.
pub fn test_connector_config(name: &str, base_url: &str) -> ConnectorConfig {
    ConnectorConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        auth: AuthConfig::None,
        timeout_secs: 30,
        max_retries: 0,
        verify_tls: true,
        headers: HashMap::new(),
    }
}

/// Creates a test connector config with bearer token auth.
pub fn test_connector_config_with_bearer(
    name: &str,
    base_url: &str,
    token: &str,
) -> ConnectorConfig {
    ConnectorConfig {
        auth: AuthConfig::BearerToken {
            token: crate::SecureString::new(token.to_string()),
        },
        ..test_connector_config(name, base_url)
    }
}

/// A record whose type is taken from its id prefix.
pub fn sample_record(id: &str) -> Record {
    let record_type = crate::record::id_kind(id).unwrap_or("x-unknown");
    Record::new(id, record_type)
}

/// A report containing `object_refs`.
pub fn sample_report(id: &str, object_refs: &[&str]) -> Record {
    Record::new(id, "report").with_object_refs(object_refs.iter().copied())
}

/// A relationship from `source` to `target`.
pub fn sample_relationship(id: &str, source: &str, target: &str) -> Record {
    Record::new(id, "relationship")
        .with_endpoints(source, target)
        .with_property("relationship_type", serde_json::json!("indicates"))
}

/// Ids `<kind>--0` .. `<kind>--{count-1}`.
pub fn sample_ids(kind: &str, count: usize) -> Vec<String> {
    (0..count).map(|n| format!("{kind}--{n}")).collect()
}

/// Asserts that a connector health check returns healthy.
pub fn assert_healthy(result: &ConnectorResult<ConnectorHealth>) {
    match result {
        Ok(ConnectorHealth::Healthy) => {}
        other => panic!("Expected Healthy, got {:?}", other),
    }
}
