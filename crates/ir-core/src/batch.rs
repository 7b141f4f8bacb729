//! Chunked id lookups.

use crate::cache::RecordCache;
use ir_connectors::{IntelFeedConnector, LookupEndpoint, LookupResponse, Record};
use tracing::{debug, warn};

/// Most ids sent in one lookup request.
pub const LOOKUP_CHUNK_SIZE: usize = 40;

/// Resolves ids through one of the lookup endpoints, one chunk at a time.
///
/// A chunk whose request fails contributes nothing and does not stop the
/// remaining chunks. Every record that comes back is offered to the cache.
pub struct BatchFetcher<'a> {
    connector: &'a dyn IntelFeedConnector,
    chunk_size: usize,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(connector: &'a dyn IntelFeedConnector) -> Self {
        Self::with_chunk_size(connector, LOOKUP_CHUNK_SIZE)
    }

    /// Uses `chunk_size` ids per request, at least one.
    pub fn with_chunk_size(connector: &'a dyn IntelFeedConnector, chunk_size: usize) -> Self {
        Self {
            connector,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Fetches `ids` against `endpoint`, requests strictly in sequence.
    pub async fn fetch_by_ids(
        &self,
        ids: &[String],
        endpoint: LookupEndpoint,
        cache: &mut RecordCache,
    ) -> Vec<Record> {
        let mut records = Vec::new();

        for (index, chunk) in ids.chunks(self.chunk_size).enumerate() {
            let response = match self.connector.lookup(endpoint, chunk).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        %endpoint,
                        chunk = index,
                        ids = chunk.len(),
                        retryable = e.is_retryable(),
                        error = %e,
                        "Lookup chunk failed, skipping"
                    );
                    continue;
                }
            };

            let fetched = normalize_response(response);
            debug!(
                %endpoint,
                chunk = index,
                requested = chunk.len(),
                returned = fetched.len(),
                "Lookup chunk resolved"
            );

            for record in &fetched {
                cache.offer(record);
            }
            records.extend(fetched);
        }

        records
    }
}

/// Flattens both response shapes, `items` first.
pub fn normalize_response(response: LookupResponse) -> Vec<Record> {
    let mut records = response.items.unwrap_or_default();
    records.extend(response.data);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use ir_connectors::testing::{sample_ids, sample_record};
    use ir_connectors::{ConnectorError, MockBehavior, MockInthreatConnector};

    #[test]
    fn test_normalize_both_shapes() {
        let both = LookupResponse {
            items: Some(vec![sample_record("indicator--1")]),
            data: Some(sample_record("identity--1")),
        };
        let ids: Vec<String> = normalize_response(both).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["indicator--1", "identity--1"]);

        assert!(normalize_response(LookupResponse::default()).is_empty());
    }

    #[tokio::test]
    async fn test_splits_into_chunks_of_forty() {
        let ids = sample_ids("indicator", 90);
        let mock = MockInthreatConnector::new("mock")
            .with_records(ids.iter().map(|id| sample_record(id)));
        let mut cache = RecordCache::new();

        let records = BatchFetcher::new(&mock)
            .fetch_by_ids(&ids, LookupEndpoint::Objects, &mut cache)
            .await;

        let sizes: Vec<usize> = mock
            .lookup_requests()
            .await
            .iter()
            .map(|(_, chunk)| chunk.len())
            .collect();
        assert_eq!(sizes, vec![40, 40, 10]);
        assert_eq!(records.len(), 90);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_other_chunks() {
        let ids = sample_ids("indicator", 90);
        let mock = MockInthreatConnector::new("mock")
            .with_records(ids.iter().map(|id| sample_record(id)))
            .with_behavior(MockBehavior::FailOn {
                ids: vec!["indicator--45".to_string()],
                error: ConnectorError::ServerError("502 Bad Gateway".to_string()),
            });
        let mut cache = RecordCache::new();

        let records = BatchFetcher::new(&mock)
            .fetch_by_ids(&ids, LookupEndpoint::Objects, &mut cache)
            .await;

        assert_eq!(mock.call_count(), 3);
        assert_eq!(records.len(), 50);
        assert!(records.iter().all(|r| r.id != "indicator--45"));
        assert!(records.iter().any(|r| r.id == "indicator--89"));
    }

    #[tokio::test]
    async fn test_returned_records_offered_to_cache() {
        let mock = MockInthreatConnector::new("mock")
            .with_records([
                sample_record("identity--1"),
                sample_record("marking-definition--1"),
                sample_record("malware--1"),
            ])
            .with_single_record_shape();
        let mut cache = RecordCache::new();
        let fetcher = BatchFetcher::with_chunk_size(&mock, 1);

        let ids = vec![
            "identity--1".to_string(),
            "marking-definition--1".to_string(),
            "malware--1".to_string(),
        ];
        let records = fetcher
            .fetch_by_ids(&ids, LookupEndpoint::Objects, &mut cache)
            .await;

        assert_eq!(records.len(), 3);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("malware--1"));
    }

    #[tokio::test]
    async fn test_no_ids_no_requests() {
        let mock = MockInthreatConnector::new("mock");
        let mut cache = RecordCache::new();

        let records = BatchFetcher::new(&mock)
            .fetch_by_ids(&[], LookupEndpoint::Relationships, &mut cache)
            .await;

        assert!(records.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_zero_chunk_size_clamped() {
        let mock = MockInthreatConnector::new("mock");
        assert_eq!(BatchFetcher::with_chunk_size(&mock, 0).chunk_size(), 1);
    }
}
