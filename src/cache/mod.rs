//! Client-side persistence for the profile feed.
//!
//! This module provides the storage half of the feed:
//! - A synchronous key-value store abstraction with SQLite, in-memory and no-op backends
//! - Snapshot encoding of the accumulated list plus its saved-at timestamp
//! - The freshness policy deciding whether a snapshot is good for a first paint
//! - The deduplicating merge of fetched pages
//! - Single-entity records for showing one profile offline

pub mod codec;
mod freshness;
mod layer;
mod merge;
mod storage;
mod traits;

pub use freshness::{is_fresh, FreshnessPolicy, DEFAULT_TTL_HOURS};
pub use layer::CacheLayer;
pub use merge::{merge, AccumulatedList, MergeOutcome};
pub use storage::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};
pub use traits::{CacheSource, Cacheable, Snapshot};
