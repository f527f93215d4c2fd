//! Cache layer that maps snapshots and single entities onto the key-value store.
//!
//! Store and decode failures stop here: they are logged and reported as "no
//! usable snapshot" so callers only ever see `Option`s.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::codec;
use super::freshness::FreshnessPolicy;
use super::merge::AccumulatedList;
use super::storage::KeyValueStore;
use super::traits::{Cacheable, Snapshot};
use crate::feed::{ContextName, EntityId};

/// Cache layer over a [`KeyValueStore`].
pub struct CacheLayer<S: KeyValueStore> {
  storage: Arc<S>,
  /// How long before a snapshot is no longer used for the first paint
  freshness: FreshnessPolicy,
}

impl<S: KeyValueStore> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self::from_shared(Arc::new(storage))
  }

  /// Create a cache layer over a store that is also used elsewhere.
  pub fn from_shared(storage: Arc<S>) -> Self {
    Self {
      storage,
      freshness: FreshnessPolicy::default(),
    }
  }

  pub fn with_freshness(mut self, freshness: FreshnessPolicy) -> Self {
    self.freshness = freshness;
    self
  }

  pub fn freshness(&self) -> FreshnessPolicy {
    self.freshness
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// When the context's snapshot was saved, read from the timestamp key only.
  pub fn saved_at(&self, context: &ContextName) -> Option<DateTime<Utc>> {
    let key = codec::timestamp_key(context);
    match self.storage.get(&key) {
      Ok(Some(raw)) => match codec::decode_timestamp(&raw) {
        Ok(at) => Some(at),
        Err(e) => {
          warn!(%context, error = %e, "ignoring unreadable snapshot timestamp");
          None
        }
      },
      Ok(None) => None,
      Err(e) => {
        warn!(%context, error = %e, "snapshot timestamp unavailable");
        None
      }
    }
  }

  /// Whether the context's snapshot is young enough to show before any fetch.
  pub fn is_fresh(&self, context: &ContextName, now: DateTime<Utc>) -> bool {
    self.freshness.is_fresh(self.saved_at(context), now)
  }

  /// Load the context's snapshot regardless of its age.
  pub fn load_snapshot<T: Cacheable>(&self, context: &ContextName) -> Option<Snapshot<T>> {
    let key = codec::snapshot_key(context);
    let raw = match self.storage.get(&key) {
      Ok(Some(raw)) => raw,
      Ok(None) => {
        debug!(%context, "no snapshot stored");
        return None;
      }
      Err(e) => {
        warn!(%context, error = %e, "snapshot unavailable");
        return None;
      }
    };

    match codec::decode(&raw) {
      Ok(snapshot) => Some(snapshot),
      Err(e) => {
        warn!(%context, error = %e, "ignoring corrupt snapshot");
        None
      }
    }
  }

  /// Persist the list as the context's snapshot. Returns whether both keys
  /// were written.
  pub fn save_snapshot<T: Cacheable>(
    &self,
    context: &ContextName,
    list: &AccumulatedList<T>,
    saved_at: DateTime<Utc>,
  ) -> bool {
    let encoded = match codec::encode(list, saved_at) {
      Ok(encoded) => encoded,
      Err(e) => {
        warn!(%context, error = %e, "failed to encode snapshot");
        return false;
      }
    };

    let written = self
      .storage
      .set(&codec::snapshot_key(context), &encoded)
      .and_then(|_| {
        self.storage.set(
          &codec::timestamp_key(context),
          &codec::encode_timestamp(saved_at),
        )
      });

    match written {
      Ok(()) => {
        debug!(%context, entries = list.len(), "snapshot saved");
        true
      }
      Err(e) => {
        warn!(%context, error = %e, "failed to persist snapshot");
        false
      }
    }
  }

  /// Remove both snapshot keys for the context. Returns whether both removals
  /// succeeded.
  pub fn remove_snapshot(&self, context: &ContextName) -> bool {
    let mut removed = true;
    for key in [codec::snapshot_key(context), codec::timestamp_key(context)] {
      if let Err(e) = self.storage.remove(&key) {
        warn!(%context, %key, error = %e, "failed to remove snapshot key");
        removed = false;
      }
    }
    removed
  }

  /// Store a single entity under its own key.
  pub fn store_entity<T: Cacheable>(&self, entity: &T) -> bool {
    let key = codec::entity_key::<T>(entity.cache_key());
    let result = serde_json::to_string(entity)
      .map_err(|e| e.to_string())
      .and_then(|data| self.storage.set(&key, &data).map_err(|e| e.to_string()));

    match result {
      Ok(()) => true,
      Err(e) => {
        warn!(%key, error = %e, "failed to cache entity");
        false
      }
    }
  }

  /// Get a single entity by its identity key. Never guesses another key.
  pub fn get_entity<T: Cacheable>(&self, id: &EntityId) -> Option<T> {
    let key = codec::entity_key::<T>(id);
    let raw = match self.storage.get(&key) {
      Ok(raw) => raw?,
      Err(e) => {
        warn!(%key, error = %e, "cached entity unavailable");
        return None;
      }
    };

    match serde_json::from_str::<T>(&raw) {
      Ok(entity) if entity.cache_key() == id => Some(entity),
      Ok(_) => {
        warn!(%key, "cached entity has a different id, ignoring");
        None
      }
      Err(e) => {
        warn!(%key, error = %e, "ignoring corrupt cached entity");
        None
      }
    }
  }
}

impl<S: KeyValueStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      freshness: self.freshness,
    }
  }
}
