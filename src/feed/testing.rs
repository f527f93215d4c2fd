//! Scripted remote service for controller and favorite tests.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::{FetchError, MutationError};
use crate::feed::{EntityId, Page, PageRequest, Profile};
use crate::remote::ProfileApi;

pub fn page(index: u32, ids: &[i64], is_last_page: bool) -> Page {
  Page::new(
    index,
    ids
      .iter()
      .map(|id| Profile::new(*id).with_field("firstName", format!("P{}", id)))
      .collect(),
    is_last_page,
  )
}

#[derive(Default)]
pub struct ScriptedApi {
  pages: Mutex<VecDeque<Result<Page, FetchError>>>,
  requested: Mutex<Vec<u32>>,
  delay: Option<Duration>,
  failing_favorites: Mutex<HashSet<EntityId>>,
  favorite_calls: AtomicUsize,
  /// When set, favorites wait for `release_favorites`
  favorite_gate: Option<Notify>,
}

impl ScriptedApi {
  pub fn new(pages: Vec<Result<Page, FetchError>>) -> Self {
    Self {
      pages: Mutex::new(pages.into()),
      ..Self::default()
    }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn with_gated_favorites(mut self) -> Self {
    self.favorite_gate = Some(Notify::new());
    self
  }

  pub fn fail_favorite(&self, id: impl Into<EntityId>) {
    self.failing_favorites.lock().unwrap().insert(id.into());
  }

  pub fn allow_favorite(&self, id: impl Into<EntityId>) {
    self.failing_favorites.lock().unwrap().remove(&id.into());
  }

  /// Let every waiting favorite submission finish.
  pub fn release_favorites(&self) {
    if let Some(gate) = &self.favorite_gate {
      gate.notify_waiters();
    }
  }

  pub fn requested_pages(&self) -> Vec<u32> {
    self.requested.lock().unwrap().clone()
  }

  pub fn favorite_calls(&self) -> usize {
    self.favorite_calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ProfileApi for ScriptedApi {
  async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
    self.requested.lock().unwrap().push(request.page_index);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    let next = self.pages.lock().unwrap().pop_front();
    next.unwrap_or_else(|| {
      Err(FetchError::Transport {
        message: "no scripted response".to_string(),
      })
    })
  }

  async fn submit_favorite(&self, id: &EntityId) -> Result<(), MutationError> {
    self.favorite_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(gate) = &self.favorite_gate {
      gate.notified().await;
    }

    if self.failing_favorites.lock().unwrap().contains(id) {
      return Err(MutationError::Status {
        id: id.clone(),
        status: 409,
        message: "Failed to add to favorites".to_string(),
      });
    }
    Ok(())
  }
}
