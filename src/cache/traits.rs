//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use super::merge::AccumulatedList;
use crate::feed::{EntityId, Profile};

/// Trait for entities that can be cached.
///
/// Implementors must provide a stable identity key; the merge engine and the
/// snapshot codec rely on it being unique within a list.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this entity
  fn cache_key(&self) -> &EntityId;

  /// Entity type name used to prefix per-entity store keys (e.g., "profile")
  fn entity_type() -> &'static str;
}

impl Cacheable for Profile {
  fn cache_key(&self) -> &EntityId {
    &self.id
  }

  fn entity_type() -> &'static str {
    "profile"
  }
}

/// Indicates where the list currently on screen came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Nothing loaded yet
  Empty,
  /// Built from live pages in this session
  Network,
  /// Rehydrated at startup from a snapshot that was still fresh
  CacheFresh,
  /// Offline mode - the live fetch failed, serving the last snapshot
  Offline,
}

/// A list restored from the store along with when it was saved.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T: Cacheable> {
  pub list: AccumulatedList<T>,
  pub saved_at: DateTime<Utc>,
}
