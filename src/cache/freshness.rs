//! Snapshot freshness policy.

use chrono::{DateTime, Duration, Utc};

/// Default time-to-live for a persisted snapshot, in hours.
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// A snapshot is fresh while `now - saved_at < ttl`. An absent timestamp is
/// never fresh.
pub fn is_fresh(saved_at: Option<DateTime<Utc>>, now: DateTime<Utc>, ttl: Duration) -> bool {
  match saved_at {
    Some(saved_at) => now - saved_at < ttl,
    None => false,
  }
}

/// TTL holder used by the feed controller at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
  ttl: Duration,
}

impl Default for FreshnessPolicy {
  fn default() -> Self {
    Self {
      ttl: Duration::hours(DEFAULT_TTL_HOURS),
    }
  }
}

impl FreshnessPolicy {
  pub fn new(ttl: Duration) -> Self {
    Self { ttl }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  pub fn is_fresh(&self, saved_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    is_fresh(saved_at, now, self.ttl)
  }
}
