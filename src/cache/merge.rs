//! Deduplicating merge of fetched pages into the accumulated list.

use std::collections::HashSet;

use super::traits::Cacheable;
use crate::error::DecodeError;
use crate::feed::{EntityId, Page, Profile};

/// Ordered list of entities with no duplicate identity keys.
///
/// The key set is kept alongside the entries so a merge never rescans the
/// list. The only ways to grow it are [`merge`] and [`AccumulatedList::extend_novel`].
#[derive(Debug, Clone)]
pub struct AccumulatedList<T: Cacheable = Profile> {
  entries: Vec<T>,
  keys: HashSet<EntityId>,
}

impl<T: Cacheable> Default for AccumulatedList<T> {
  fn default() -> Self {
    Self {
      entries: Vec::new(),
      keys: HashSet::new(),
    }
  }
}

impl<T: Cacheable + PartialEq> PartialEq for AccumulatedList<T> {
  fn eq(&self, other: &Self) -> bool {
    self.entries == other.entries
  }
}

impl<T: Cacheable> AccumulatedList<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a list from entries that must already be duplicate free, such as a
  /// decoded snapshot.
  pub fn try_from_entries(entries: Vec<T>) -> Result<Self, DecodeError> {
    let mut keys = HashSet::with_capacity(entries.len());
    for entity in &entries {
      if !keys.insert(entity.cache_key().clone()) {
        return Err(DecodeError::DuplicateId {
          id: entity.cache_key().clone(),
        });
      }
    }
    Ok(Self { entries, keys })
  }

  /// Append every entity whose key is not yet present, in iteration order.
  /// Returns how many were appended.
  pub fn extend_novel<'a, I>(&mut self, incoming: I) -> usize
  where
    I: IntoIterator<Item = &'a T>,
    T: 'a,
  {
    let mut appended = 0;
    for entity in incoming {
      if self.keys.insert(entity.cache_key().clone()) {
        self.entries.push(entity.clone());
        appended += 1;
      }
    }
    appended
  }

  pub fn contains(&self, id: &EntityId) -> bool {
    self.keys.contains(id)
  }

  pub fn get(&self, id: &EntityId) -> Option<&T> {
    if !self.contains(id) {
      return None;
    }
    self.entries.iter().find(|e| e.cache_key() == id)
  }

  pub fn as_slice(&self) -> &[T] {
    &self.entries
  }

  pub fn iter(&self) -> std::slice::Iter<'_, T> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
    self.entries.iter().map(Cacheable::cache_key)
  }

  pub fn clear(&mut self) {
    self.entries.clear();
    self.keys.clear();
  }
}

/// Result of folding one page into the list.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<T: Cacheable = Profile> {
  pub list: AccumulatedList<T>,
  /// Entities with novel keys, appended in page order
  pub appended: usize,
  /// Entities dropped because their key was already present
  pub dropped: usize,
}

/// Merge a page into the existing list.
///
/// First occurrence wins: an entity whose key is already in `existing` (or
/// earlier in the same page) is dropped, never overwritten. Merging the same
/// page twice changes nothing the second time.
pub fn merge<T: Cacheable>(mut existing: AccumulatedList<T>, incoming: &Page<T>) -> MergeOutcome<T> {
  let appended = existing.extend_novel(&incoming.entities);
  MergeOutcome {
    list: existing,
    appended,
    dropped: incoming.entities.len() - appended,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn page(index: u32, ids: &[i64]) -> Page {
    Page::new(
      index,
      ids
        .iter()
        .map(|id| Profile::new(*id).with_field("page", index))
        .collect(),
      false,
    )
  }

  fn ids(list: &AccumulatedList) -> Vec<i64> {
    list
      .ids()
      .map(|id| match id {
        EntityId::Int(n) => *n,
        EntityId::Text(_) => panic!("unexpected text id"),
      })
      .collect()
  }

  #[test]
  fn test_merge_into_empty() {
    let outcome = merge(AccumulatedList::new(), &page(0, &[1, 2]));
    assert_eq!(ids(&outcome.list), vec![1, 2]);
    assert_eq!(outcome.appended, 2);
    assert_eq!(outcome.dropped, 0);
  }

  #[test]
  fn test_merge_drops_known_ids() {
    let first = merge(AccumulatedList::new(), &page(0, &[1, 2])).list;
    let outcome = merge(first, &page(1, &[2, 3]));

    assert_eq!(ids(&outcome.list), vec![1, 2, 3]);
    assert_eq!(outcome.appended, 1);
    assert_eq!(outcome.dropped, 1);
  }

  #[test]
  fn test_first_occurrence_wins() {
    let first = merge(AccumulatedList::new(), &page(0, &[1, 2])).list;
    let merged = merge(first, &page(1, &[2])).list;

    let kept = merged.get(&EntityId::Int(2)).unwrap();
    assert_eq!(kept.fields.get("page"), Some(&serde_json::json!(0)));
  }

  #[test]
  fn test_merge_is_idempotent() {
    let base = merge(AccumulatedList::new(), &page(0, &[4, 5])).list;
    let incoming = page(1, &[5, 6, 7]);

    let once = merge(base, &incoming).list;
    let twice = merge(once.clone(), &incoming);

    assert_eq!(twice.list, once);
    assert_eq!(twice.appended, 0);
    assert_eq!(twice.dropped, 3);
  }

  #[test]
  fn test_novel_entities_keep_page_order_after_existing() {
    let base = merge(AccumulatedList::new(), &page(0, &[10, 3])).list;
    let merged = merge(base, &page(1, &[9, 3, 1, 8])).list;
    assert_eq!(ids(&merged), vec![10, 3, 9, 1, 8]);
  }

  #[test]
  fn test_duplicates_within_one_page() {
    let merged = merge(AccumulatedList::new(), &page(0, &[1, 1, 2, 1]));
    assert_eq!(ids(&merged.list), vec![1, 2]);
    assert_eq!(merged.dropped, 2);
  }

  #[test]
  fn test_no_duplicates_after_many_merges() {
    let mut list = AccumulatedList::new();
    for (index, window) in [[1, 2, 3], [3, 4, 5], [5, 1, 6], [6, 6, 7]].iter().enumerate() {
      list = merge(list, &page(index as u32, window)).list;
    }

    let all = ids(&list);
    let unique: HashSet<_> = all.iter().collect();
    assert_eq!(all.len(), unique.len());
    assert_eq!(all, vec![1, 2, 3, 4, 5, 6, 7]);
  }

  #[test]
  fn test_try_from_entries_rejects_duplicates() {
    let err = AccumulatedList::try_from_entries(vec![Profile::new(1), Profile::new(1)]).unwrap_err();
    assert_eq!(err, DecodeError::DuplicateId { id: EntityId::Int(1) });
  }

  #[test]
  fn test_clear() {
    let mut list = merge(AccumulatedList::new(), &page(0, &[1])).list;
    list.clear();
    assert!(list.is_empty());
    assert!(!list.contains(&EntityId::Int(1)));
  }
}
