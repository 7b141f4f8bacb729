//! # ir-connectors
//!
//! Inthreat feed connector for Intel Relay.
//!
//! This crate provides the STIX record model, the connector trait the closure
//! logic is written against, the HTTP layer, and the live and mock Inthreat
//! connectors.

pub mod cursor;
pub mod http;
pub mod inthreat;
pub mod record;
pub mod secure_string;
pub mod testing;
pub mod traits;

pub use cursor::Cursor;
pub use record::{
    id_kind, is_cacheable_id, is_relationship_id, Record, IDENTITY_PREFIX,
    MARKING_DEFINITION_PREFIX, RELATIONSHIP_PREFIX,
};
pub use secure_string::SecureString;
pub use traits::{
    AuthConfig, Connector, ConnectorConfig, ConnectorError, ConnectorHealth, ConnectorResult,
    IntelFeedConnector, LookupEndpoint, LookupResponse, Page,
};

pub use inthreat::{
    InthreatConfig, InthreatConnector, MockBehavior, MockInthreatConnector, MockRequest,
    DEFAULT_BASE_URL, DEFAULT_COLLECTION,
};
