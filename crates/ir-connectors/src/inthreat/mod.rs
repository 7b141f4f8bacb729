//! SEKOIA.IO Inthreat connectors.

pub mod client;
pub mod mock;

pub use client::{InthreatConfig, InthreatConnector, DEFAULT_BASE_URL, DEFAULT_COLLECTION};
pub use mock::{MockBehavior, MockInthreatConnector, MockRequest};
