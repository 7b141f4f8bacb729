//! Connector trait definitions for Intel Relay.
//!
//! This module defines the interface the closure and sweep logic talk to, so
//! that the live Inthreat client and the test mock are interchangeable.

use crate::cursor::Cursor;
use crate::record::{is_relationship_id, Record};
use crate::secure_string::SecureString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur in connectors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    /// Whether the same request may succeed if sent again later.
    ///
    /// Transport problems, throttling and 5xx answers are retryable. A body
    /// that does not decode, a 4xx or a bad configuration is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed(_)
                | ConnectorError::Timeout(_)
                | ConnectorError::ServerError(_)
                | ConnectorError::RateLimited(_)
        )
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Health status of a connector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorHealth {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

/// Transport-level configuration shared by every HTTP connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connector name, used in log fields.
    pub name: String,
    /// Base URL for the API.
    pub base_url: String,
    pub auth: AuthConfig,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Extra attempts on retryable failures. Zero sends every request once.
    pub max_retries: u32,
    /// Whether to verify TLS certificates. Ignored in release builds.
    pub verify_tls: bool,
    /// Additional headers to include.
    pub headers: HashMap<String, String>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    None,
    BearerToken {
        token: SecureString,
    },
}

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector name.
    fn name(&self) -> &str;

    /// Returns the connector type (e.g. "intel_feed").
    fn connector_type(&self) -> &str;

    /// Checks the health of the connector.
    async fn health_check(&self) -> ConnectorResult<ConnectorHealth>;

    /// Tests the connection to the external system.
    async fn test_connection(&self) -> ConnectorResult<bool>;
}

/// The two id lookup endpoints of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupEndpoint {
    /// Generic object lookup, used for every kind except relationships.
    Objects,
    /// Relationship lookup, used only for `relationship--` ids.
    Relationships,
}

impl LookupEndpoint {
    /// Endpoint that serves the given id.
    pub fn for_id(id: &str) -> Self {
        if is_relationship_id(id) {
            LookupEndpoint::Relationships
        } else {
            LookupEndpoint::Objects
        }
    }

    /// Path segment under the API root.
    pub fn path(&self) -> &'static str {
        match self {
            LookupEndpoint::Objects => "v2/inthreat/objects",
            LookupEndpoint::Relationships => "v2/inthreat/relationships",
        }
    }
}

impl std::fmt::Display for LookupEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupEndpoint::Objects => write!(f, "objects"),
            LookupEndpoint::Relationships => write!(f, "relationships"),
        }
    }
}

/// One page of the collection feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// Cursor for the following page. Equal to the request cursor when the
    /// API did not hand out a new one.
    pub next_cursor: Cursor,
}

/// Body of an id lookup.
///
/// The API answers with `items` for multi-id lookups and `data` for single-id
/// lookups. Both keys are optional so either shape decodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Record>,
}

impl LookupResponse {
    pub fn items(records: Vec<Record>) -> Self {
        Self {
            items: Some(records),
            data: None,
        }
    }

    pub fn single(record: Record) -> Self {
        Self {
            items: None,
            data: Some(record),
        }
    }
}

/// A paginated STIX feed that can also resolve records by id.
#[async_trait]
pub trait IntelFeedConnector: Connector {
    /// Reads one page of the collection starting at `cursor`.
    async fn fetch_page(&self, cursor: &Cursor, limit: usize) -> ConnectorResult<Page>;

    /// Looks up `ids` in a single request against `endpoint`.
    async fn lookup(
        &self,
        endpoint: LookupEndpoint,
        ids: &[String],
    ) -> ConnectorResult<LookupResponse>;
}
