//! Run-scoped cache of identities and marking definitions.
//!
//! Nearly every STIX object points at the same handful of creator identities
//! and TLP markings. Keeping those around for the whole connector run turns
//! most marking and creator references into local hits.
//!
//! Entries are never evicted or invalidated. The cache only admits ids with an
//! `identity--` or `marking-definition--` prefix, which keeps it small.

use ir_connectors::{is_cacheable_id, Record};
use std::collections::HashMap;

/// Hit and miss counters plus current size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Cache of shared records, owned by one connector run.
#[derive(Debug, Default)]
pub struct RecordCache {
    entries: HashMap<String, Record>,
    hits: u64,
    misses: u64,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record` if its kind is cacheable. Returns whether it was kept.
    ///
    /// A later offer for the same id replaces the earlier record.
    pub fn offer(&mut self, record: &Record) -> bool {
        if !is_cacheable_id(&record.id) {
            return false;
        }
        self.entries.insert(record.id.clone(), record.clone());
        true
    }

    /// Looks up `id`, counting the hit or miss.
    pub fn lookup(&mut self, id: &str) -> Option<Record> {
        match self.entries.get(id) {
            Some(record) => {
                self.hits += 1;
                Some(record.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}
