//! Mock Inthreat connector for testing.
//!
//! Serves a fixed collection and a table of lookupable records without making
//! real API calls. Supports failure injection and keeps a history of every
//! request so tests can assert on network traffic.

use crate::cursor::Cursor;
use crate::record::Record;
use crate::traits::{
    Connector, ConnectorError, ConnectorHealth, ConnectorResult, IntelFeedConnector,
    LookupEndpoint, LookupResponse, Page,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Behavior configuration for failure injection.
#[derive(Debug, Clone, Default)]
pub enum MockBehavior {
    /// Answer every request.
    #[default]
    Normal,
    /// Fail any lookup whose id list contains one of these ids.
    FailOn {
        ids: Vec<String>,
        error: ConnectorError,
    },
    /// Fail every lookup against one endpoint.
    FailEndpoint {
        endpoint: LookupEndpoint,
        error: ConnectorError,
    },
    /// Fail every page request; lookups still work.
    FailPages(ConnectorError),
    /// Fail everything.
    AlwaysFail(ConnectorError),
}

/// One request seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRequest {
    Page { cursor: Cursor, limit: usize },
    Lookup { endpoint: LookupEndpoint, ids: Vec<String> },
}

/// Mock Inthreat connector.
///
/// Page cursors are decimal offsets into the collection. Any cursor that does
/// not parse as an offset, such as a bootstrap cursor, reads from the start.
/// A request past the end of the collection gets its own cursor back, the
/// same as the live connector does when the API answers with a null cursor.
pub struct MockInthreatConnector {
    name: String,
    collection: RwLock<Vec<Record>>,
    records: RwLock<HashMap<String, Record>>,
    /// Answer single-id lookups with the `data` shape instead of `items`.
    single_record_shape: bool,
    behavior: RwLock<MockBehavior>,
    call_count: AtomicU64,
    history: RwLock<Vec<MockRequest>>,
}

impl MockInthreatConnector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            collection: RwLock::new(Vec::new()),
            records: RwLock::new(HashMap::new()),
            single_record_shape: false,
            behavior: RwLock::new(MockBehavior::Normal),
            call_count: AtomicU64::new(0),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Makes `records` resolvable through the lookup endpoints.
    pub fn with_records(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        let table = self.records.get_mut();
        for record in records {
            table.insert(record.id.clone(), record);
        }
        self
    }

    /// Sets the records served by the collection feed, in feed order.
    pub fn with_collection(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        self.collection.get_mut().extend(records);
        self
    }

    pub fn with_single_record_shape(mut self) -> Self {
        self.single_record_shape = true;
        self
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        *self.behavior.get_mut() = behavior;
        self
    }

    pub async fn push_collection(&self, records: impl IntoIterator<Item = Record>) {
        self.collection.write().await.extend(records);
    }

    /// Total number of requests received.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<MockRequest> {
        self.history.read().await.clone()
    }

    /// Id lists of every lookup, in request order.
    pub async fn lookup_requests(&self) -> Vec<(LookupEndpoint, Vec<String>)> {
        self.history
            .read()
            .await
            .iter()
            .filter_map(|req| match req {
                MockRequest::Lookup { endpoint, ids } => Some((*endpoint, ids.clone())),
                MockRequest::Page { .. } => None,
            })
            .collect()
    }

    /// Whether any lookup asked for `id`.
    pub async fn was_looked_up(&self, id: &str) -> bool {
        self.lookup_requests()
            .await
            .iter()
            .any(|(_, ids)| ids.iter().any(|i| i == id))
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear();
        self.call_count.store(0, Ordering::SeqCst);
    }

    async fn record_request(&self, request: MockRequest) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.history.write().await.push(request);
    }
}

#[async_trait]
impl Connector for MockInthreatConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn connector_type(&self) -> &str {
        "intel_feed"
    }

    async fn health_check(&self) -> ConnectorResult<ConnectorHealth> {
        match &*self.behavior.read().await {
            MockBehavior::AlwaysFail(e) | MockBehavior::FailPages(e) => {
                Ok(ConnectorHealth::Unhealthy(e.to_string()))
            }
            _ => Ok(ConnectorHealth::Healthy),
        }
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        match &*self.behavior.read().await {
            MockBehavior::AlwaysFail(e) | MockBehavior::FailPages(e) => Err(e.clone()),
            _ => Ok(true),
        }
    }
}

#[async_trait]
impl IntelFeedConnector for MockInthreatConnector {
    async fn fetch_page(&self, cursor: &Cursor, limit: usize) -> ConnectorResult<Page> {
        self.record_request(MockRequest::Page {
            cursor: cursor.clone(),
            limit,
        })
        .await;

        match &*self.behavior.read().await {
            MockBehavior::AlwaysFail(e) | MockBehavior::FailPages(e) => return Err(e.clone()),
            _ => {}
        }

        let collection = self.collection.read().await;
        let start = cursor
            .as_str()
            .parse::<usize>()
            .unwrap_or(0)
            .min(collection.len());
        let end = (start + limit).min(collection.len());
        let records = collection[start..end].to_vec();

        let next_cursor = if end == collection.len() && records.is_empty() {
            cursor.clone()
        } else {
            Cursor::new(end.to_string())
        };

        Ok(Page {
            records,
            next_cursor,
        })
    }

    async fn lookup(
        &self,
        endpoint: LookupEndpoint,
        ids: &[String],
    ) -> ConnectorResult<LookupResponse> {
        self.record_request(MockRequest::Lookup {
            endpoint,
            ids: ids.to_vec(),
        })
        .await;

        match &*self.behavior.read().await {
            MockBehavior::AlwaysFail(e) => return Err(e.clone()),
            MockBehavior::FailEndpoint {
                endpoint: failing,
                error,
            } if *failing == endpoint => return Err(error.clone()),
            MockBehavior::FailOn { ids: failing, error }
                if ids.iter().any(|id| failing.contains(id)) =>
            {
                return Err(error.clone())
            }
            _ => {}
        }

        let table = self.records.read().await;
        let found: Vec<Record> = ids.iter().filter_map(|id| table.get(id).cloned()).collect();

        if self.single_record_shape && ids.len() == 1 {
            return Ok(match found.into_iter().next() {
                Some(record) => LookupResponse::single(record),
                None => LookupResponse::default(),
            });
        }

        Ok(LookupResponse::items(found))
    }
}
