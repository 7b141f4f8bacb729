//! # ir-core
//!
//! Reference closure and sweep logic for Intel Relay.
//!
//! ```text
//! SweepDriver ── page ──▶ ClosureResolver ── missing ids ──▶ BatchFetcher
//!      │                        │                                 │
//!      │                        └──── RecordCache ◀── offers ─────┘
//!      ├── closed set ──▶ BundleSink
//!      └── cursor ──────▶ StateStore
//! ```

pub mod batch;
pub mod bundle;
pub mod cache;
pub mod closure;
pub mod error;
pub mod state;
pub mod sweep;

pub use batch::{normalize_response, BatchFetcher, LOOKUP_CHUNK_SIZE};
pub use bundle::{BundleSink, DirectoryBundleSink, MemoryBundleSink, StixBundle};
pub use cache::{CacheStats, RecordCache};
pub use closure::{missing_references, Closure, ClosureResolver, MAX_CLOSURE_ROUNDS};
pub use error::{SyncError, SyncResult};
pub use state::{ConnectorState, JsonFileStateStore, MemoryStateStore, StateStore};
pub use sweep::{StopReason, SweepConfig, SweepDriver, SweepReport, DEFAULT_PAGE_LIMIT};
