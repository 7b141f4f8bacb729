//! SEKOIA.IO Inthreat feed connector.
//!
//! Reads a STIX collection page by page and resolves referenced objects and
//! relationships by id.

use crate::cursor::Cursor;
use crate::http::{HttpClient, RateLimitConfig};
use crate::record::Record;
use crate::traits::{
    Connector, ConnectorConfig, ConnectorHealth, ConnectorResult, IntelFeedConnector,
    LookupEndpoint, LookupResponse, Page,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.sekoia.io";

/// Default collection: the SEKOIA.IO CTI feed.
pub const DEFAULT_COLLECTION: &str = "d6092c37-d8d7-45c3-8aff-c4dc26030608";

/// Inthreat connector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InthreatConfig {
    #[serde(flatten)]
    pub connector: ConnectorConfig,
    /// Collection uuid to poll.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Client-side request budget. `None` leaves throttling to the server.
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

/// Inthreat connector.
pub struct InthreatConnector {
    config: InthreatConfig,
    client: HttpClient,
}

impl InthreatConnector {
    pub fn new(config: InthreatConfig) -> ConnectorResult<Self> {
        let rate_limit = config.requests_per_minute.map(RateLimitConfig::per_minute);
        let client = HttpClient::with_rate_limit(config.connector.clone(), rate_limit)?;

        info!(
            connector_name = %config.connector.name,
            collection = %config.collection,
            "Inthreat connector initialized"
        );

        Ok(Self { config, client })
    }

    /// Path of the collection's object feed.
    fn collection_path(&self) -> String {
        format!(
            "v2/inthreat/collections/{}/objects",
            self.config.collection
        )
    }

    /// Path looking up `ids` in one request.
    fn lookup_path(endpoint: LookupEndpoint, ids: &[String]) -> String {
        format!("{}/{}", endpoint.path(), ids.join(","))
    }
}

#[async_trait]
impl Connector for InthreatConnector {
    fn name(&self) -> &str {
        &self.config.connector.name
    }

    fn connector_type(&self) -> &str {
        "intel_feed"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        match self.test_connection().await {
            Ok(true) => Ok(ConnectorHealth::Healthy),
            Ok(false) => Ok(ConnectorHealth::Degraded(
                "Collection answered without a cursor".to_string(),
            )),
            Err(e) => Ok(ConnectorHealth::Unhealthy(e.to_string())),
        }
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        let query = [("limit", "1")];
        let page: CollectionPage = self
            .client
            .get_json_with_query(&self.collection_path(), &query)
            .await?;
        Ok(page.next_cursor.is_some() || !page.items.is_empty())
    }
}

#[async_trait]
impl IntelFeedConnector for InthreatConnector {
    #[instrument(skip(self), fields(connector_name = %self.config.connector.name))]
    async fn fetch_page(&self, cursor: &Cursor, limit: usize) -> ConnectorResult<Page> {
        let limit_param = limit.to_string();
        let query = [("limit", limit_param.as_str()), ("cursor", cursor.as_str())];

        let page: CollectionPage = self
            .client
            .get_json_with_query(&self.collection_path(), &query)
            .await?;

        if page.items.len() > limit {
            warn!(
                returned = page.items.len(),
                limit, "Collection returned more records than requested"
            );
        }

        let next_cursor = resolve_next_cursor(page.next_cursor, cursor);

        debug!(records = page.items.len(), "Fetched collection page");

        Ok(Page {
            records: page.items,
            next_cursor,
        })
    }

    async fn lookup(
        &self,
        endpoint: LookupEndpoint,
        ids: &[String],
    ) -> ConnectorResult<LookupResponse> {
        if ids.is_empty() {
            return Ok(LookupResponse::default());
        }

        debug!(%endpoint, ids = ids.len(), "Looking up records by id");
        self.client
            .get_json(&Self::lookup_path(endpoint, ids))
            .await
    }
}

/// The cursor to continue from. A null or empty `next_cursor` keeps the
/// request cursor, so the next sweep asks for the same position again.
fn resolve_next_cursor(raw: Option<String>, cursor: &Cursor) -> Cursor {
    raw.filter(|c| !c.is_empty())
        .map(Cursor::from)
        .unwrap_or_else(|| cursor.clone())
}

// Response types

#[derive(Debug, Deserialize)]
struct CollectionPage {
    #[serde(default)]
    items: Vec<Record>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_connector_config_with_bearer;

    fn create_test_config() -> InthreatConfig {
        InthreatConfig {
            connector: test_connector_config_with_bearer(
                "sekoia-test",
                DEFAULT_BASE_URL,
                "test-key",
            ),
            collection: "collection-1".to_string(),
            requests_per_minute: None,
        }
    }

    #[test]
    fn test_connector_creation() {
        let connector = InthreatConnector::new(create_test_config()).unwrap();
        assert_eq!(connector.name(), "sekoia-test");
        assert_eq!(connector.connector_type(), "intel_feed");
    }

    #[test]
    fn test_collection_path() {
        let connector = InthreatConnector::new(create_test_config()).unwrap();
        assert_eq!(
            connector.collection_path(),
            "v2/inthreat/collections/collection-1/objects"
        );
    }

    #[test]
    fn test_lookup_paths() {
        let ids = vec!["indicator--1".to_string(), "malware--2".to_string()];
        assert_eq!(
            InthreatConnector::lookup_path(LookupEndpoint::Objects, &ids),
            "v2/inthreat/objects/indicator--1,malware--2"
        );

        let rels = vec!["relationship--9".to_string()];
        assert_eq!(
            InthreatConnector::lookup_path(LookupEndpoint::Relationships, &rels),
            "v2/inthreat/relationships/relationship--9"
        );
    }

    #[test]
    fn test_collection_page_null_cursor() {
        let page: CollectionPage = serde_json::from_value(serde_json::json!({
            "items": [],
            "next_cursor": null
        }))
        .unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_next_cursor_fallback() {
        let cursor = Cursor::new("CUR");

        let parse = |body: serde_json::Value| {
            let page: CollectionPage = serde_json::from_value(body).unwrap();
            resolve_next_cursor(page.next_cursor, &cursor)
        };

        assert_eq!(parse(serde_json::json!({"items": [], "next_cursor": null})), cursor);
        assert_eq!(parse(serde_json::json!({"items": []})), cursor);
        assert_eq!(parse(serde_json::json!({"items": [], "next_cursor": ""})), cursor);
        assert_eq!(
            parse(serde_json::json!({"items": [], "next_cursor": "NEXT"})),
            Cursor::new("NEXT")
        );
    }

    #[test]
    fn test_config_defaults_collection() {
        let config: InthreatConfig = serde_json::from_value(serde_json::json!({
            "name": "sekoia",
            "base_url": DEFAULT_BASE_URL,
            "auth": { "type": "none" },
            "timeout_secs": 30,
            "max_retries": 0,
            "verify_tls": true,
            "headers": {}
        }))
        .unwrap();
        assert_eq!(config.collection, DEFAULT_COLLECTION);
        assert!(config.requests_per_minute.is_none());
    }

    #[tokio::test]
    async fn test_empty_lookup_sends_nothing() {
        let connector = InthreatConnector::new(create_test_config()).unwrap();
        let response = connector
            .lookup(LookupEndpoint::Objects, &[])
            .await
            .unwrap();
        assert_eq!(response, LookupResponse::default());
    }
}
