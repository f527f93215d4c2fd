use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::FeedError;

/// JSON field carrying the identity key of a profile record.
pub const ID_FIELD: &str = "userProfileId";

/// Identity key of a profile. The remote service uses integers, but string
/// keys are accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
  Int(i64),
  Text(String),
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int(n) => write!(f, "{}", n),
      Self::Text(s) => f.write_str(s),
    }
  }
}

impl FromStr for EntityId {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    Ok(match s.parse::<i64>() {
      Ok(n) => Self::Int(n),
      Err(_) => Self::Text(s.to_string()),
    })
  }
}

impl From<i64> for EntityId {
  fn from(n: i64) -> Self {
    Self::Int(n)
  }
}

impl From<i32> for EntityId {
  fn from(n: i32) -> Self {
    Self::Int(n.into())
  }
}

impl From<&str> for EntityId {
  fn from(s: &str) -> Self {
    Self::Text(s.to_string())
  }
}

/// Why a raw record was not accepted as a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
  NotAnObject,
  MissingId,
  InvalidId(String),
}

impl fmt::Display for Rejection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NotAnObject => f.write_str("record is not a JSON object"),
      Self::MissingId => write!(f, "record has no {}", ID_FIELD),
      Self::InvalidId(v) => write!(f, "record has unusable {}: {}", ID_FIELD, v),
    }
  }
}

/// A profile record. Everything but the identity key is opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  #[serde(rename = "userProfileId")]
  pub id: EntityId,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl Profile {
  pub fn new(id: impl Into<EntityId>) -> Self {
    Self {
      id: id.into(),
      fields: Map::new(),
    }
  }

  pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
    self.fields.insert(name.to_string(), value.into());
    self
  }

  /// Accept a raw record from the remote service, rejecting records without
  /// a usable identity key.
  pub fn from_value(value: Value) -> Result<Self, Rejection> {
    let Value::Object(mut fields) = value else {
      return Err(Rejection::NotAnObject);
    };

    let id = match fields.remove(ID_FIELD) {
      None | Some(Value::Null) => return Err(Rejection::MissingId),
      Some(Value::Number(n)) => n
        .as_i64()
        .map(EntityId::Int)
        .ok_or_else(|| Rejection::InvalidId(n.to_string()))?,
      Some(Value::String(s)) if !s.trim().is_empty() => EntityId::Text(s),
      Some(other) => return Err(Rejection::InvalidId(other.to_string())),
    };

    Ok(Self { id, fields })
  }

  /// Text value of a descriptive field, if present and a string or number.
  pub fn field_text(&self, name: &str) -> Option<String> {
    match self.fields.get(name)? {
      Value::String(s) if !s.is_empty() => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    }
  }

  pub fn display_name(&self) -> String {
    self
      .field_text("firstName")
      .unwrap_or_else(|| "Profile".to_string())
  }
}

/// One page returned by the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T = Profile> {
  /// Page index that was requested
  pub index: u32,
  pub entities: Vec<T>,
  pub is_last_page: bool,
  /// Raw records dropped for lacking an identity key
  pub rejected: usize,
}

impl<T> Page<T> {
  pub fn new(index: u32, entities: Vec<T>, is_last_page: bool) -> Self {
    Self {
      index,
      entities,
      is_last_page,
      rejected: 0,
    }
  }
}

/// Named list scope, used to namespace store keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextName(String);

impl ContextName {
  /// Contexts must be explicit; an empty name is an error rather than a
  /// wildcard.
  pub fn new(name: &str) -> Result<Self, FeedError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(FeedError::MissingContext);
    }
    // `cache_<name>_timestamp` must never collide with another context's
    // snapshot key
    let valid_chars = name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid_chars || name.ends_with("_timestamp") {
      return Err(FeedError::InvalidContext(name.to_string()));
    }
    Ok(Self(name.to_string()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ContextName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Parameters of one page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
  pub context: ContextName,
  pub page_index: u32,
  pub page_size: u32,
}
