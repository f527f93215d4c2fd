//! At-most-once guard for the favorite action.
//!
//! Each entity id is either untouched, pending (one submission in flight) or
//! confirmed. A favorite request for a pending or confirmed id never reaches
//! the remote service. A failed submission returns the id to untouched so the
//! user can retry.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{timeout_millis, MutationError};
use crate::remote::ProfileApi;

use super::types::EntityId;

/// What a favorite request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteOutcome {
  /// The mutation was submitted and succeeded
  Confirmed,
  /// A submission for this id is already in flight; nothing was sent
  AlreadyPending,
  /// The id was already favorited this session; nothing was sent
  AlreadyConfirmed,
}

#[derive(Debug, Default)]
struct GuardState {
  pending: HashSet<EntityId>,
  confirmed: HashSet<EntityId>,
}

/// Per-session favorite state.
///
/// The lock is only held for set updates, never across the remote call, so
/// submissions for different ids run concurrently.
#[derive(Debug, Default)]
pub struct FavoriteGuard {
  state: Mutex<GuardState>,
  timeout: Option<Duration>,
}

/// Releases a pending id if the submission is abandoned before it settles.
struct Reservation<'a> {
  guard: &'a FavoriteGuard,
  id: EntityId,
  settled: bool,
}

impl Drop for Reservation<'_> {
  fn drop(&mut self) {
    if !self.settled {
      debug!(id = %self.id, "favorite submission dropped, releasing");
      self.guard.state().pending.remove(&self.id);
    }
  }
}

impl FavoriteGuard {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fail a submission that takes longer than `timeout`.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  fn state(&self) -> MutexGuard<'_, GuardState> {
    // Both sets stay consistent across a panic, so a poisoned lock is usable
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Favorite `id` using `submit` as the remote mutation.
  ///
  /// `submit` is only called when the id is neither pending nor confirmed.
  pub async fn favorite<F, Fut>(
    &self,
    id: EntityId,
    submit: F,
  ) -> Result<FavoriteOutcome, MutationError>
  where
    F: FnOnce(EntityId) -> Fut,
    Fut: Future<Output = Result<(), MutationError>>,
  {
    let mut reservation = {
      let mut state = self.state();
      if state.confirmed.contains(&id) {
        debug!(%id, "already favorited");
        return Ok(FavoriteOutcome::AlreadyConfirmed);
      }
      if !state.pending.insert(id.clone()) {
        debug!(%id, "favorite already in flight");
        return Ok(FavoriteOutcome::AlreadyPending);
      }
      Reservation {
        guard: self,
        id: id.clone(),
        settled: false,
      }
    };

    let result = match self.timeout {
      Some(limit) => tokio::time::timeout(limit, submit(id.clone()))
        .await
        .unwrap_or_else(|_| {
          Err(MutationError::Timeout {
            id: id.clone(),
            millis: timeout_millis(limit),
          })
        }),
      None => submit(id.clone()).await,
    };

    let mut state = self.state();
    state.pending.remove(&id);
    reservation.settled = true;

    match result {
      Ok(()) => {
        state.confirmed.insert(id.clone());
        info!(%id, "favorite confirmed");
        Ok(FavoriteOutcome::Confirmed)
      }
      Err(e) => {
        warn!(%id, error = %e, "favorite failed");
        Err(e)
      }
    }
  }

  /// Favorite `id` through the profile service.
  pub async fn favorite_with<A: ProfileApi + ?Sized>(
    &self,
    api: &A,
    id: EntityId,
  ) -> Result<FavoriteOutcome, MutationError> {
    self
      .favorite(id, |id| async move { api.submit_favorite(&id).await })
      .await
  }

  pub fn is_pending(&self, id: &EntityId) -> bool {
    self.state().pending.contains(id)
  }

  pub fn is_confirmed(&self, id: &EntityId) -> bool {
    self.state().confirmed.contains(id)
  }

  /// Ids with a submission in flight, sorted.
  pub fn pending(&self) -> BTreeSet<EntityId> {
    self.state().pending.iter().cloned().collect()
  }

  /// Ids favorited this session, sorted.
  pub fn confirmed(&self) -> BTreeSet<EntityId> {
    self.state().confirmed.iter().cloned().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feed::testing::ScriptedApi;

  fn id(n: i64) -> EntityId {
    EntityId::Int(n)
  }

  #[tokio::test]
  async fn test_duplicate_request_while_pending_is_noop() {
    let guard = FavoriteGuard::new();
    let api = ScriptedApi::new(Vec::new()).with_gated_favorites();

    let (first, second, _) = tokio::join!(
      guard.favorite_with(&api, id(5)),
      async {
        // Runs after the first request has reserved the id
        assert!(guard.is_pending(&id(5)));
        guard.favorite_with(&api, id(5)).await
      },
      async {
        tokio::task::yield_now().await;
        api.release_favorites();
      }
    );

    assert_eq!(first.unwrap(), FavoriteOutcome::Confirmed);
    assert_eq!(second.unwrap(), FavoriteOutcome::AlreadyPending);
    assert_eq!(api.favorite_calls(), 1);
    assert_eq!(guard.confirmed().into_iter().collect::<Vec<_>>(), vec![id(5)]);
    assert!(guard.pending().is_empty());
  }

  #[tokio::test]
  async fn test_confirmed_is_not_resubmitted() {
    let guard = FavoriteGuard::new();
    let api = ScriptedApi::new(Vec::new());

    assert_eq!(
      guard.favorite_with(&api, id(1)).await.unwrap(),
      FavoriteOutcome::Confirmed
    );
    assert_eq!(
      guard.favorite_with(&api, id(1)).await.unwrap(),
      FavoriteOutcome::AlreadyConfirmed
    );
    assert_eq!(api.favorite_calls(), 1);
  }

  #[tokio::test]
  async fn test_failure_rolls_back_and_allows_retry() {
    let guard = FavoriteGuard::new();
    let api = ScriptedApi::new(Vec::new());
    api.fail_favorite(3);

    let err = guard.favorite_with(&api, id(3)).await.unwrap_err();
    assert_eq!(err.entity_id(), &id(3));
    assert!(!guard.is_pending(&id(3)));
    assert!(!guard.is_confirmed(&id(3)));

    api.allow_favorite(3);
    assert_eq!(
      guard.favorite_with(&api, id(3)).await.unwrap(),
      FavoriteOutcome::Confirmed
    );
    assert_eq!(api.favorite_calls(), 2);
  }

  #[tokio::test]
  async fn test_failure_does_not_touch_other_confirmed_ids() {
    let guard = FavoriteGuard::new();
    let api = ScriptedApi::new(Vec::new());
    api.fail_favorite(2);

    guard.favorite_with(&api, id(1)).await.unwrap();
    assert!(guard.favorite_with(&api, id(2)).await.is_err());
    assert_eq!(guard.confirmed().into_iter().collect::<Vec<_>>(), vec![id(1)]);
  }

  #[tokio::test]
  async fn test_different_ids_run_concurrently() {
    let guard = FavoriteGuard::new();
    let api = ScriptedApi::new(Vec::new()).with_gated_favorites();

    let (a, b, _) = tokio::join!(
      guard.favorite_with(&api, id(1)),
      guard.favorite_with(&api, id(2)),
      async {
        tokio::task::yield_now().await;
        assert_eq!(guard.pending().len(), 2);
        api.release_favorites();
      }
    );

    assert_eq!(a.unwrap(), FavoriteOutcome::Confirmed);
    assert_eq!(b.unwrap(), FavoriteOutcome::Confirmed);
    assert_eq!(api.favorite_calls(), 2);
  }

  #[tokio::test]
  async fn test_timeout_releases_pending() {
    let guard = FavoriteGuard::new().with_timeout(Duration::from_millis(10));

    let result = guard
      .favorite(id(9), |_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
      })
      .await;

    assert_eq!(
      result,
      Err(MutationError::Timeout {
        id: id(9),
        millis: 10
      })
    );
    assert_eq!(
      result.unwrap_err().to_string(),
      "favorite 9: timed out after 10ms"
    );
    assert!(!guard.is_pending(&id(9)));
  }

  #[tokio::test]
  async fn test_abandoned_submission_releases_pending() {
    let guard = FavoriteGuard::new();

    let abandoned = tokio::time::timeout(
      Duration::from_millis(10),
      guard.favorite(id(4), |_| std::future::pending::<Result<(), MutationError>>()),
    )
    .await;

    assert!(abandoned.is_err());
    assert!(!guard.is_pending(&id(4)));
  }
}
