//! Time source for snapshot stamping and freshness checks.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Manually advanced clock for tests and simulations.
///
/// Clones share the same current time.
#[derive(Debug, Clone)]
pub struct ManualClock {
  current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
  pub fn at(start: DateTime<Utc>) -> Self {
    Self {
      current: Arc::new(Mutex::new(start)),
    }
  }

  pub fn at_ms(ms: i64) -> Self {
    Self::at(DateTime::from_timestamp_millis(ms).unwrap_or_default())
  }

  pub fn advance(&self, by: Duration) {
    if let Ok(mut current) = self.current.lock() {
      *current += by;
    }
  }

  pub fn set(&self, to: DateTime<Utc>) {
    if let Ok(mut current) = self.current.lock() {
      *current = to;
    }
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    self
      .current
      .lock()
      .map(|c| *c)
      .unwrap_or_else(|poisoned| *poisoned.into_inner())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_manual_clock_advances_shared_time() {
    let clock = ManualClock::at_ms(1_000);
    let other = clock.clone();

    other.advance(Duration::milliseconds(500));
    assert_eq!(clock.now().timestamp_millis(), 1_500);

    clock.set(DateTime::from_timestamp_millis(10).unwrap());
    assert_eq!(other.now().timestamp_millis(), 10);
  }
}
