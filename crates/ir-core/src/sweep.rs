//! Sweeps over the collection feed.
//!
//! A sweep reads pages until the feed runs dry, closes each page over its
//! references, hands it to the sink and commits the page's cursor. The driver
//! owns the record cache, so identities and markings fetched during one sweep
//! serve every later sweep of the same run.

use crate::bundle::{BundleSink, StixBundle};
use crate::cache::{CacheStats, RecordCache};
use crate::closure::ClosureResolver;
use crate::error::SyncResult;
use crate::state::{ConnectorState, StateStore};
use ir_connectors::{Cursor, IntelFeedConnector};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Page size the collection is read with unless configured otherwise.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Sweep settings.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Records requested per page. A shorter page ends the sweep.
    pub page_limit: usize,
    /// Passed to the sink with every bundle.
    pub update: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            update: true,
        }
    }
}

/// Why a sweep stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The page request failed; the cursor did not move.
    PageFailed,
    /// The feed had nothing past the cursor.
    EmptyPage,
    /// The last page was shorter than the page limit. Counted on the records
    /// the feed returned, before closure adds referenced ones.
    ShortPage,
}

/// Summary of one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub start_cursor: Cursor,
    pub end_cursor: Cursor,
    /// Pages delivered to the sink.
    pub pages: usize,
    /// Records read from the feed itself.
    pub records_fetched: usize,
    /// Records delivered, including those pulled in by closure.
    pub records_sent: usize,
    /// References given up on across all pages.
    pub unresolved: usize,
    pub stop_reason: StopReason,
    pub cache: CacheStats,
}

/// Runs sweeps against one feed for the lifetime of a connector run.
pub struct SweepDriver {
    connector: Arc<dyn IntelFeedConnector>,
    sink: Arc<dyn BundleSink>,
    state: Arc<dyn StateStore>,
    config: SweepConfig,
    cache: RecordCache,
    /// Cursor in memory, loaded from the state store on the first sweep.
    cursor: Option<Cursor>,
}

impl SweepDriver {
    pub fn new(
        connector: Arc<dyn IntelFeedConnector>,
        sink: Arc<dyn BundleSink>,
        state: Arc<dyn StateStore>,
        config: SweepConfig,
    ) -> Self {
        Self {
            connector,
            sink,
            state,
            config,
            cache: RecordCache::new(),
            cursor: None,
        }
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    /// The cursor the next sweep starts from, once known.
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    async fn starting_cursor(&mut self) -> SyncResult<Cursor> {
        if let Some(cursor) = &self.cursor {
            return Ok(cursor.clone());
        }

        let cursor = match self.state.load().await? {
            Some(state) => {
                info!(cursor = %state.last_cursor, "Resuming from stored cursor");
                state.last_cursor
            }
            None => {
                let cursor = Cursor::bootstrap();
                info!(
                    cursor = %cursor,
                    since = ?cursor.timestamp(),
                    "No stored cursor, starting one hour back"
                );
                cursor
            }
        };

        self.cursor = Some(cursor.clone());
        Ok(cursor)
    }

    async fn commit(&mut self, cursor: Cursor) -> SyncResult<()> {
        self.state.save(&ConnectorState::new(cursor.clone())).await?;
        self.cursor = Some(cursor);
        Ok(())
    }

    /// Reads the feed from the current cursor until it is exhausted.
    ///
    /// Page request failures end the sweep quietly. Sink and state store
    /// failures are returned, leaving the cursor at the last committed page.
    pub async fn sweep(&mut self) -> SyncResult<SweepReport> {
        let start_cursor = self.starting_cursor().await?;
        let limit = self.config.page_limit.max(1);

        let mut cursor = start_cursor.clone();
        let mut pages = 0;
        let mut records_fetched = 0;
        let mut records_sent = 0;
        let mut unresolved = 0;

        let stop_reason = loop {
            let page = match self.connector.fetch_page(&cursor, limit).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        cursor = %cursor,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Page request failed, ending sweep"
                    );
                    break StopReason::PageFailed;
                }
            };

            if page.records.is_empty() {
                if page.next_cursor != cursor {
                    self.commit(page.next_cursor.clone()).await?;
                    cursor = page.next_cursor;
                }
                break StopReason::EmptyPage;
            }

            let page_len = page.records.len();
            records_fetched += page_len;

            let closure = ClosureResolver::new(self.connector.as_ref())
                .resolve(page.records, &mut self.cache)
                .await;
            unresolved += closure.unresolved.len();

            let bundle = StixBundle::new(closure.records);
            self.sink.send(&bundle, self.config.update).await?;
            records_sent += bundle.len();

            self.commit(page.next_cursor.clone()).await?;
            cursor = page.next_cursor;
            pages += 1;

            debug!(
                page = pages,
                records = page_len,
                sent = bundle.len(),
                rounds = closure.rounds,
                "Page delivered"
            );

            if page_len < limit {
                break StopReason::ShortPage;
            }
        };

        let report = SweepReport {
            start_cursor,
            end_cursor: cursor,
            pages,
            records_fetched,
            records_sent,
            unresolved,
            stop_reason,
            cache: self.cache.stats(),
        };

        info!(
            pages = report.pages,
            fetched = report.records_fetched,
            sent = report.records_sent,
            unresolved = report.unresolved,
            stop_reason = ?report.stop_reason,
            cached = report.cache.entries,
            "Sweep finished"
        );

        Ok(report)
    }
}
