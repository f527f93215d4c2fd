//! Snapshot encoding and store key naming.
//!
//! A snapshot is stored as `{"list":[...],"savedAt":<epoch ms>}` under
//! `cache_<context>`, with the same `savedAt` repeated under
//! `cache_<context>_timestamp` so freshness can be checked without parsing the
//! list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::merge::AccumulatedList;
use super::traits::{Cacheable, Snapshot};
use crate::error::DecodeError;
use crate::feed::{ContextName, EntityId};

#[derive(Serialize)]
struct EncodedSnapshot<'a, T> {
  list: &'a [T],
  #[serde(rename = "savedAt")]
  saved_at: i64,
}

#[derive(Deserialize)]
struct DecodedSnapshot<T> {
  list: Vec<T>,
  #[serde(rename = "savedAt")]
  saved_at: i64,
}

pub fn snapshot_key(context: &ContextName) -> String {
  format!("cache_{}", context)
}

pub fn timestamp_key(context: &ContextName) -> String {
  format!("cache_{}_timestamp", context)
}

/// Store key for a single cached entity: `profile_42` for numeric ids,
/// `profile_text_42` for text ids, so `42` and `"42"` never share a key.
pub fn entity_key<T: Cacheable>(id: &EntityId) -> String {
  match id {
    EntityId::Int(n) => format!("{}_{}", T::entity_type(), n),
    EntityId::Text(s) => format!("{}_text_{}", T::entity_type(), s),
  }
}

/// Drop sub-millisecond precision so a timestamp survives encoding unchanged.
pub fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
  DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

pub fn encode<T: Cacheable>(
  list: &AccumulatedList<T>,
  saved_at: DateTime<Utc>,
) -> serde_json::Result<String> {
  serde_json::to_string(&EncodedSnapshot {
    list: list.as_slice(),
    saved_at: saved_at.timestamp_millis(),
  })
}

pub fn decode<T: Cacheable>(encoded: &str) -> Result<Snapshot<T>, DecodeError> {
  let decoded: DecodedSnapshot<T> =
    serde_json::from_str(encoded).map_err(|e| DecodeError::Malformed {
      message: e.to_string(),
    })?;

  let saved_at = from_millis(decoded.saved_at)?;
  let list = AccumulatedList::try_from_entries(decoded.list)?;

  Ok(Snapshot { list, saved_at })
}

pub fn encode_timestamp(saved_at: DateTime<Utc>) -> String {
  saved_at.timestamp_millis().to_string()
}

pub fn decode_timestamp(encoded: &str) -> Result<DateTime<Utc>, DecodeError> {
  let millis = encoded
    .trim()
    .parse::<i64>()
    .map_err(|_| DecodeError::Timestamp {
      value: encoded.to_string(),
    })?;
  from_millis(millis)
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, DecodeError> {
  DateTime::from_timestamp_millis(millis).ok_or_else(|| DecodeError::Timestamp {
    value: millis.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::merge;
  use crate::feed::{Page, Profile};

  fn sample_list() -> AccumulatedList {
    let page = Page::new(
      0,
      vec![
        Profile::new(1)
          .with_field("firstName", "Asha")
          .with_field("age", 27),
        Profile::new("abc").with_field("currentCity", "Pune"),
        Profile::new(3).with_field("hasProfilePhoto", false),
      ],
      false,
    );
    merge(AccumulatedList::new(), &page).list
  }

  #[test]
  fn test_snapshot_round_trip() {
    let list = sample_list();
    let saved_at = DateTime::from_timestamp_millis(1_700_000_123_456).unwrap();

    let encoded = encode(&list, saved_at).unwrap();
    let snapshot: Snapshot<Profile> = decode(&encoded).unwrap();

    assert_eq!(snapshot.list, list);
    assert_eq!(snapshot.saved_at, saved_at);
  }

  #[test]
  fn test_empty_list_round_trip() {
    let saved_at = DateTime::from_timestamp_millis(0).unwrap();
    let encoded = encode(&AccumulatedList::<Profile>::new(), saved_at).unwrap();
    let snapshot: Snapshot<Profile> = decode(&encoded).unwrap();
    assert!(snapshot.list.is_empty());
    assert_eq!(snapshot.saved_at, saved_at);
  }

  #[test]
  fn test_decode_malformed() {
    for input in ["", "not json", "{\"list\":[]}", "{\"list\":{},\"savedAt\":1}"] {
      let result = decode::<Profile>(input);
      assert!(
        matches!(result, Err(DecodeError::Malformed { .. })),
        "expected malformed for {:?}",
        input
      );
    }
  }

  #[test]
  fn test_decode_rejects_entity_without_id() {
    let result = decode::<Profile>(r#"{"list":[{"firstName":"x"}],"savedAt":5}"#);
    assert!(matches!(result, Err(DecodeError::Malformed { .. })));
  }

  #[test]
  fn test_decode_rejects_duplicate_ids() {
    let result = decode::<Profile>(
      r#"{"list":[{"userProfileId":1},{"userProfileId":1}],"savedAt":5}"#,
    );
    assert_eq!(
      result.unwrap_err(),
      DecodeError::DuplicateId {
        id: EntityId::Int(1)
      }
    );
  }

  #[test]
  fn test_timestamp_round_trip() {
    let at = DateTime::from_timestamp_millis(1_700_000_000_001).unwrap();
    assert_eq!(encode_timestamp(at), "1700000000001");
    assert_eq!(decode_timestamp("1700000000001").unwrap(), at);
    assert!(decode_timestamp("yesterday").is_err());
  }

  #[test]
  fn test_truncate_to_millis() {
    let at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
    let truncated = truncate_to_millis(at);
    assert_eq!(truncated.timestamp_subsec_nanos(), 123_000_000);

    let list = sample_list();
    let snapshot: Snapshot<Profile> = decode(&encode(&list, truncated).unwrap()).unwrap();
    assert_eq!(snapshot.saved_at, truncated);
  }

  #[test]
  fn test_keys_are_namespaced_per_context() {
    let brides = ContextName::new("brides").unwrap();
    assert_eq!(snapshot_key(&brides), "cache_brides");
    assert_eq!(timestamp_key(&brides), "cache_brides_timestamp");
    assert_eq!(entity_key::<Profile>(&EntityId::Int(42)), "profile_42");
  }

  #[test]
  fn test_numeric_and_text_ids_use_distinct_keys() {
    let numeric = entity_key::<Profile>(&EntityId::Int(42));
    let text = entity_key::<Profile>(&EntityId::from("42"));
    assert_eq!(text, "profile_text_42");
    assert_ne!(numeric, text);
  }
}
