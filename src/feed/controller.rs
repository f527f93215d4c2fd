//! Fallback controller for one list context.
//!
//! The controller owns the accumulated list and decides, for every page fetch,
//! whether the result is merged and persisted or whether the last snapshot is
//! served instead.
//!
//! ```text
//!   Idle ──begin_fetch──▶ Fetching ──Ok(page)──▶ Merged ──▶ Idle
//!                            │
//!                            ├──Err, snapshot stored──▶ Degraded
//!                            └──Err, nothing stored───▶ Idle (error, "show cached" offered)
//! ```
//!
//! Fetching is split into [`FeedController::begin_fetch`] and
//! [`FeedController::complete_fetch`] so a caller driving its own event loop
//! can issue the request itself; [`FeedController::request_next_page`] does
//! both against a [`ProfileApi`].

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{merge, AccumulatedList, CacheLayer, CacheSource, KeyValueStore};
use crate::clock::{Clock, SystemClock};
use crate::error::{timeout_millis, FetchError};
use crate::remote::ProfileApi;

use super::types::{ContextName, EntityId, Page, PageRequest, Profile};

/// Default number of profiles requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
  /// Ready for the next page request
  Idle,
  /// A page request is outstanding
  Fetching,
  /// A page was just merged and persisted; returns to `Idle` immediately
  Merged,
  /// The live fetch failed and the last snapshot is being served
  Degraded,
}

/// What a fetch attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
  /// The page was merged into the list
  Merged {
    appended: usize,
    dropped: usize,
    is_last_page: bool,
  },
  /// The fetch failed and the list was restored from the snapshot
  Degraded { error: FetchError, restored: usize },
  /// The fetch failed and there was no snapshot to fall back to
  Failed { error: FetchError },
  /// No request was issued or the completion was not expected
  Skipped,
}

/// Read-only summary for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedView {
  pub context: ContextName,
  pub len: usize,
  pub phase: FeedPhase,
  pub source: CacheSource,
  pub is_degraded: bool,
  pub is_last_page: bool,
  /// "Load more" should be offered
  pub can_load_more: bool,
  /// The fetch failed with nothing to show; offer "show last cached data"
  pub offer_show_cached: bool,
  pub error: Option<String>,
}

/// Resets an outstanding fetch if `request_next_page` is dropped mid-flight.
struct PendingFetch<'a, S: KeyValueStore, C: Clock> {
  controller: &'a mut FeedController<S, C>,
  settled: bool,
}

impl<S: KeyValueStore, C: Clock> Drop for PendingFetch<'_, S, C> {
  fn drop(&mut self) {
    if !self.settled {
      self.controller.abandon_fetch();
    }
  }
}

/// Paginated, cache-backed profile list for one context.
pub struct FeedController<S: KeyValueStore, C: Clock = SystemClock> {
  context: ContextName,
  page_size: u32,
  cache: CacheLayer<S>,
  clock: C,
  fetch_timeout: Option<Duration>,

  list: AccumulatedList,
  phase: FeedPhase,
  /// Index of the next page to request
  next_page: u32,
  is_last_page: bool,
  source: CacheSource,
  last_error: Option<FetchError>,
  in_flight: Option<PageRequest>,
}

impl<S: KeyValueStore> FeedController<S> {
  pub fn new(context: ContextName, cache: CacheLayer<S>) -> Self {
    FeedController {
      context,
      page_size: DEFAULT_PAGE_SIZE,
      cache,
      clock: SystemClock,
      fetch_timeout: None,
      list: AccumulatedList::new(),
      phase: FeedPhase::Idle,
      next_page: 0,
      is_last_page: false,
      source: CacheSource::Empty,
      last_error: None,
      in_flight: None,
    }
  }
}

impl<S: KeyValueStore, C: Clock> FeedController<S, C> {
  pub fn with_clock<C2: Clock>(self, clock: C2) -> FeedController<S, C2> {
    FeedController {
      context: self.context,
      page_size: self.page_size,
      cache: self.cache,
      clock,
      fetch_timeout: self.fetch_timeout,
      list: self.list,
      phase: self.phase,
      next_page: self.next_page,
      is_last_page: self.is_last_page,
      source: self.source,
      last_error: self.last_error,
      in_flight: self.in_flight,
    }
  }

  pub fn with_page_size(mut self, page_size: u32) -> Self {
    self.page_size = page_size.max(1);
    self
  }

  /// Fail a fetch that takes longer than `timeout`.
  pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
    self.fetch_timeout = Some(timeout);
    self
  }

  /// Show the last snapshot before the first fetch, but only while it is
  /// fresh. Returns whether anything was restored.
  ///
  /// Only applies before anything is on screen; later calls do nothing.
  pub fn hydrate_if_fresh(&mut self) -> bool {
    if self.phase != FeedPhase::Idle || !self.list.is_empty() {
      debug!(context = %self.context, "list already populated, not hydrating");
      return false;
    }

    let now = self.clock.now();
    if !self.cache.is_fresh(&self.context, now) {
      debug!(context = %self.context, "no fresh snapshot for first paint");
      return false;
    }

    match self.cache.load_snapshot::<Profile>(&self.context) {
      Some(snapshot) => {
        info!(
          context = %self.context,
          entries = snapshot.list.len(),
          saved_at = %snapshot.saved_at,
          "loaded list from fresh snapshot"
        );
        self.list = snapshot.list;
        self.source = CacheSource::CacheFresh;
        true
      }
      None => false,
    }
  }

  /// Move `Idle -> Fetching` and return the request to issue.
  ///
  /// Returns `None` while a fetch is outstanding, after the last page, and in
  /// degraded mode, where automatic pagination is suppressed.
  pub fn begin_fetch(&mut self) -> Option<PageRequest> {
    if self.phase != FeedPhase::Idle {
      debug!(context = %self.context, phase = ?self.phase, "ignoring page request");
      return None;
    }
    if self.is_last_page {
      debug!(context = %self.context, "already at last page");
      return None;
    }

    let request = PageRequest {
      context: self.context.clone(),
      page_index: self.next_page,
      page_size: self.page_size,
    };
    debug!(context = %self.context, page = request.page_index, "fetching page");

    self.phase = FeedPhase::Fetching;
    self.in_flight = Some(request.clone());
    Some(request)
  }

  /// Apply the result of the request returned by [`Self::begin_fetch`].
  pub fn complete_fetch(&mut self, result: Result<Page, FetchError>) -> FetchOutcome {
    let Some(request) = self.in_flight.take() else {
      warn!(context = %self.context, "fetch completed with no request outstanding");
      return FetchOutcome::Skipped;
    };

    match result {
      Ok(page) => self.apply_page(&request, page),
      Err(error) => self.apply_failure(&request, error),
    }
  }

  /// Fetch and apply the next page.
  ///
  /// Dropping the returned future before it finishes puts the controller back
  /// in `Idle` with nothing applied.
  pub async fn request_next_page<A: ProfileApi + ?Sized>(&mut self, api: &A) -> FetchOutcome {
    let Some(request) = self.begin_fetch() else {
      return FetchOutcome::Skipped;
    };
    let fetch_timeout = self.fetch_timeout;
    let mut pending = PendingFetch {
      controller: self,
      settled: false,
    };

    let result = match fetch_timeout {
      Some(limit) => tokio::time::timeout(limit, api.fetch_page(&request))
        .await
        .unwrap_or(Err(FetchError::Timeout {
          millis: timeout_millis(limit),
        })),
      None => api.fetch_page(&request).await,
    };

    pending.settled = true;
    pending.controller.complete_fetch(result)
  }

  fn abandon_fetch(&mut self) {
    if let Some(request) = self.in_flight.take() {
      debug!(context = %self.context, page = request.page_index, "page fetch dropped");
      self.phase = FeedPhase::Idle;
    }
  }

  /// Manual "show last cached data": retry rehydration after a failed fetch
  /// that had no snapshot. Returns whether a snapshot was found.
  pub fn retry_show_cached(&mut self) -> bool {
    if self.phase == FeedPhase::Fetching {
      return false;
    }
    self.rehydrate_degraded().is_some()
  }

  /// Leave degraded mode so the next request goes to the network again. The
  /// list on screen is kept as the merge base.
  pub fn resume_live(&mut self) {
    if self.phase == FeedPhase::Degraded {
      info!(context = %self.context, "leaving degraded mode");
      self.phase = FeedPhase::Idle;
      self.last_error = None;
    }
  }

  /// Remove the persisted snapshot and start over from an empty list.
  pub fn clear_cache(&mut self) {
    if !self.cache.remove_snapshot(&self.context) {
      warn!(context = %self.context, "snapshot may not have been fully removed");
    }
    info!(context = %self.context, "cache cleared");

    self.list.clear();
    self.phase = FeedPhase::Idle;
    self.next_page = 0;
    self.is_last_page = false;
    self.source = CacheSource::Empty;
    self.last_error = None;
    self.in_flight = None;
  }

  /// A single profile, from the list on screen or its own cache entry.
  pub fn cached_profile(&self, id: &EntityId) -> Option<Profile> {
    self
      .list
      .get(id)
      .cloned()
      .or_else(|| self.cache.get_entity::<Profile>(id))
  }

  fn apply_page(&mut self, request: &PageRequest, page: Page) -> FetchOutcome {
    if page.index != request.page_index {
      warn!(
        context = %self.context,
        requested = request.page_index,
        received = page.index,
        "page index mismatch"
      );
    }

    self.phase = FeedPhase::Merged;
    let outcome = merge(std::mem::take(&mut self.list), &page);
    self.list = outcome.list;

    info!(
      context = %self.context,
      page = request.page_index,
      appended = outcome.appended,
      dropped = outcome.dropped,
      rejected = page.rejected,
      total = self.list.len(),
      "merged page"
    );

    let saved_at = crate::cache::codec::truncate_to_millis(self.clock.now());
    self.cache.save_snapshot(&self.context, &self.list, saved_at);
    let appended = &self.list.as_slice()[self.list.len() - outcome.appended..];
    for profile in appended {
      self.cache.store_entity(profile);
    }

    self.next_page = request.page_index + 1;
    self.is_last_page = page.is_last_page;
    self.source = CacheSource::Network;
    self.last_error = None;
    self.phase = FeedPhase::Idle;

    FetchOutcome::Merged {
      appended: outcome.appended,
      dropped: outcome.dropped,
      is_last_page: page.is_last_page,
    }
  }

  fn apply_failure(&mut self, request: &PageRequest, error: FetchError) -> FetchOutcome {
    warn!(
      context = %self.context,
      page = request.page_index,
      error = %error,
      "page fetch failed"
    );
    self.phase = FeedPhase::Idle;
    self.last_error = Some(error.clone());

    match self.rehydrate_degraded() {
      Some(restored) => FetchOutcome::Degraded { error, restored },
      None => FetchOutcome::Failed { error },
    }
  }

  /// Serve the stored snapshot, whatever its age. Entries already on screen
  /// but missing from the snapshot are kept after it.
  fn rehydrate_degraded(&mut self) -> Option<usize> {
    let snapshot = self.cache.load_snapshot::<Profile>(&self.context)?;
    let mut restored = snapshot.list;
    restored.extend_novel(self.list.iter());

    info!(
      context = %self.context,
      entries = restored.len(),
      saved_at = %snapshot.saved_at,
      "serving cached data"
    );

    self.list = restored;
    self.phase = FeedPhase::Degraded;
    self.source = CacheSource::Offline;
    Some(self.list.len())
  }

  // Read-only projections

  pub fn context(&self) -> &ContextName {
    &self.context
  }

  pub fn profiles(&self) -> &[Profile] {
    self.list.as_slice()
  }

  pub fn list(&self) -> &AccumulatedList {
    &self.list
  }

  pub fn phase(&self) -> FeedPhase {
    self.phase
  }

  pub fn is_degraded(&self) -> bool {
    self.phase == FeedPhase::Degraded
  }

  pub fn is_last_page(&self) -> bool {
    self.is_last_page
  }

  pub fn page_index(&self) -> u32 {
    self.next_page
  }

  pub fn source(&self) -> CacheSource {
    self.source
  }

  pub fn last_error(&self) -> Option<&FetchError> {
    self.last_error.as_ref()
  }

  pub fn view(&self) -> FeedView {
    let is_degraded = self.is_degraded();
    FeedView {
      context: self.context.clone(),
      len: self.list.len(),
      phase: self.phase,
      source: self.source,
      is_degraded,
      is_last_page: self.is_last_page,
      can_load_more: self.phase == FeedPhase::Idle && !self.is_last_page,
      offer_show_cached: self.last_error.is_some() && self.list.is_empty() && !is_degraded,
      error: self.last_error.as_ref().map(ToString::to_string),
    }
  }
}
