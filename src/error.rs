//! Error taxonomy for the feed core.
//!
//! Store and decode failures never leave the controller: they are logged and
//! treated as "no usable snapshot". Fetch and mutation failures are surfaced to
//! the caller so the presentation layer can show a notice or a retry action.

use std::time::Duration;
use thiserror::Error;

use crate::feed::EntityId;

/// Whole milliseconds in `limit`, saturating.
pub(crate) fn timeout_millis(limit: Duration) -> u64 {
  u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

/// Failure while loading a page from the remote service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  /// Connection, DNS or TLS failure
  #[error("transport error: {message}")]
  Transport { message: String },

  /// Non-2xx response
  #[error("server returned {status}: {message}")]
  Status { status: u16, message: String },

  /// The configured request timeout elapsed
  #[error("timed out after {millis}ms")]
  Timeout { millis: u64 },

  /// Response body did not match the expected envelope
  #[error("invalid response body: {message}")]
  Decode { message: String },
}

/// Failure while submitting a favorite for one entity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
  #[error("favorite {id}: transport error: {message}")]
  Transport { id: EntityId, message: String },

  #[error("favorite {id}: server returned {status}: {message}")]
  Status {
    id: EntityId,
    status: u16,
    message: String,
  },

  #[error("favorite {id}: timed out after {millis}ms")]
  Timeout { id: EntityId, millis: u64 },
}

impl MutationError {
  /// The entity the failed mutation was for.
  pub fn entity_id(&self) -> &EntityId {
    match self {
      Self::Transport { id, .. } | Self::Status { id, .. } | Self::Timeout { id, .. } => id,
    }
  }
}

/// A persisted snapshot or timestamp could not be read back.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
  #[error("malformed snapshot: {message}")]
  Malformed { message: String },

  #[error("snapshot contains duplicate id {id}")]
  DuplicateId { id: EntityId },

  #[error("malformed timestamp '{value}'")]
  Timestamp { value: String },
}

/// The underlying key-value store failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
  #[error("store backend error: {message}")]
  Backend { message: String },

  #[error("store lock poisoned")]
  LockPoisoned,

  #[error("store capacity exceeded writing '{key}' ({needed} bytes, {available} available)")]
  CapacityExceeded {
    key: String,
    needed: usize,
    available: usize,
  },
}

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    Self::Backend {
      message: e.to_string(),
    }
  }
}

/// Crate-level error for setup and configuration paths.
#[derive(Debug, Error)]
pub enum FeedError {
  /// A list context must be named explicitly
  #[error("list context must not be empty")]
  MissingContext,

  #[error("invalid list context name '{0}'")]
  InvalidContext(String),

  #[error("unknown list context '{0}'")]
  UnknownContext(String),

  #[error("configuration error: {0}")]
  Config(String),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Mutation(#[from] MutationError),
}
