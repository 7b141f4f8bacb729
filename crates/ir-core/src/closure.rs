//! Reference closure over a page of STIX records.
//!
//! A page from the collection feed usually points at records that are not on
//! the page: TLP markings, the creating identity, a report's contents, the two
//! ends of a relationship. Downstream ingestion wants those present too, so
//! before a page is forwarded the resolver pulls in every referenced record it
//! can find, then the records those point at, and so on.
//!
//! # Algorithm
//!
//! Each round computes the ids referenced by the working set but absent from
//! it, serves what it can from the [`RecordCache`], and fetches the rest in
//! chunks: relationship ids through the relationship endpoint, everything else
//! through the object endpoint. Fetched records join the working set and the
//! next round starts over with the larger set.
//!
//! The number of fetching rounds is capped at [`MAX_CLOSURE_ROUNDS`]. Reference
//! cycles cannot loop forever because anything already present is never
//! requested again, and ids the API cannot resolve are given up on once the cap
//! is hit. Abandoned ids are reported in [`Closure::unresolved`] and are not
//! retried later.
//!
//! The working set is never deduplicated by id.

use crate::batch::BatchFetcher;
use crate::cache::RecordCache;
use ir_connectors::{is_relationship_id, IntelFeedConnector, LookupEndpoint, Record};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Upper bound on fetching rounds per closure.
pub const MAX_CLOSURE_ROUNDS: usize = 5;

/// Result of one closure run.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    /// The input records followed by every record added, in discovery order.
    pub records: Vec<Record>,
    /// Fetching rounds consumed. Zero when nothing had to be fetched.
    pub rounds: usize,
    /// Referenced ids still absent when the resolver stopped.
    pub unresolved: BTreeSet<String>,
}

impl Closure {
    /// Whether every reference ended up in `records`.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Ids referenced by `records` that none of them carries.
///
/// Sorted so that lookups are issued in a stable order.
pub fn missing_references(records: &[Record]) -> BTreeSet<String> {
    let present: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();

    records
        .iter()
        .flat_map(Record::references)
        .filter(|id| !present.contains(id))
        .map(str::to_string)
        .collect()
}

/// Drives closure rounds against a feed connector.
pub struct ClosureResolver<'a> {
    fetcher: BatchFetcher<'a>,
    max_rounds: usize,
}

impl<'a> ClosureResolver<'a> {
    pub fn new(connector: &'a dyn IntelFeedConnector) -> Self {
        Self::with_fetcher(BatchFetcher::new(connector))
    }

    pub fn with_fetcher(fetcher: BatchFetcher<'a>) -> Self {
        Self {
            fetcher,
            max_rounds: MAX_CLOSURE_ROUNDS,
        }
    }

    /// Closes `records` over their references.
    ///
    /// Never fails: lookups that error out only leave references unresolved.
    pub async fn resolve(&self, mut records: Vec<Record>, cache: &mut RecordCache) -> Closure {
        let mut rounds = 0;

        loop {
            if rounds == self.max_rounds {
                let unresolved = missing_references(&records);
                if !unresolved.is_empty() {
                    debug!(
                        rounds,
                        unresolved = unresolved.len(),
                        ids = ?unresolved,
                        "Closure round limit reached, abandoning references"
                    );
                }
                return Closure {
                    records,
                    rounds,
                    unresolved,
                };
            }

            let mut missing = missing_references(&records);

            let mut from_cache = 0;
            missing.retain(|id| match cache.lookup(id) {
                Some(record) => {
                    records.push(record);
                    from_cache += 1;
                    false
                }
                None => true,
            });

            if missing.is_empty() {
                debug!(rounds, from_cache, "Closure reached");
                return Closure {
                    records,
                    rounds,
                    unresolved: missing,
                };
            }

            let (relationships, objects): (Vec<String>, Vec<String>) =
                missing.into_iter().partition(|id| is_relationship_id(id));

            debug!(
                round = rounds + 1,
                from_cache,
                objects = objects.len(),
                relationships = relationships.len(),
                "Fetching missing references"
            );

            let fetched_objects = self
                .fetcher
                .fetch_by_ids(&objects, LookupEndpoint::Objects, cache)
                .await;
            records.extend(fetched_objects);

            let fetched_relationships = self
                .fetcher
                .fetch_by_ids(&relationships, LookupEndpoint::Relationships, cache)
                .await;
            records.extend(fetched_relationships);

            rounds += 1;
        }
    }
}
