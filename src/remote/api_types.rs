//! Serde-deserializable types matching the profile service responses.
//!
//! These types are separate from domain types so a malformed record can be
//! rejected one at a time instead of failing the whole page.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::FetchError;
use crate::feed::{Page, Profile};

/// Every response is wrapped as `{"data": ..., "message": ...}`.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
  pub data: Option<T>,
  #[serde(default)]
  pub message: Option<String>,
}

/// Spring-style page body: `content` plus a `last` flag.
#[derive(Debug, Default, Deserialize)]
pub struct ApiProfilePage {
  #[serde(default)]
  pub content: Vec<Value>,
  #[serde(default)]
  pub last: bool,
}

impl ApiProfilePage {
  /// Convert into a domain page, dropping records without an identity key.
  pub fn into_page(self, index: u32) -> Page {
    let mut rejected = 0;
    let entities = self
      .content
      .into_iter()
      .filter_map(|raw| match Profile::from_value(raw) {
        Ok(profile) => Some(profile),
        Err(reason) => {
          warn!(page = index, %reason, "rejecting profile record");
          rejected += 1;
          None
        }
      })
      .collect();

    Page {
      index,
      entities,
      is_last_page: self.last,
      rejected,
    }
  }
}

/// Parse a successful browse response. A missing `data` object is an empty,
/// non-final page.
pub fn parse_page_body(body: &[u8], index: u32) -> Result<Page, FetchError> {
  let envelope: ApiEnvelope<ApiProfilePage> =
    serde_json::from_slice(body).map_err(|e| FetchError::Decode {
      message: e.to_string(),
    })?;

  Ok(envelope.data.unwrap_or_default().into_page(index))
}

/// Best-effort server message from an error response body.
pub fn error_message(body: &[u8]) -> Option<String> {
  serde_json::from_slice::<ApiEnvelope<Value>>(body)
    .ok()
    .and_then(|envelope| envelope.message)
    .filter(|m| !m.trim().is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feed::EntityId;

  #[test]
  fn test_parse_page_body() {
    let body = br#"{
      "data": {
        "content": [
          {"userProfileId": 1, "firstName": "Asha", "age": 27},
          {"firstName": "No id"},
          {"userProfileId": 2}
        ],
        "last": true
      }
    }"#;

    let page = parse_page_body(body, 3).unwrap();
    assert_eq!(page.index, 3);
    assert!(page.is_last_page);
    assert_eq!(page.rejected, 1);
    let ids: Vec<_> = page.entities.iter().map(|p| p.id.clone()).collect();
    assert_eq!(ids, vec![EntityId::Int(1), EntityId::Int(2)]);
  }

  #[test]
  fn test_missing_data_is_empty_page() {
    let page = parse_page_body(br#"{"message": "ok"}"#, 0).unwrap();
    assert!(page.entities.is_empty());
    assert!(!page.is_last_page);
  }

  #[test]
  fn test_undecodable_body_is_fetch_error() {
    let err = parse_page_body(b"<html>502</html>", 0).unwrap_err();
    assert!(matches!(err, FetchError::Decode { .. }));
  }

  #[test]
  fn test_error_message() {
    assert_eq!(
      error_message(br#"{"message": "Already in favorites"}"#).as_deref(),
      Some("Already in favorites")
    );
    assert_eq!(error_message(br#"{"message": ""}"#), None);
    assert_eq!(error_message(b"oops"), None);
  }
}
