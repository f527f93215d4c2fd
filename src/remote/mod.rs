//! Remote collaborators: paged profile fetch and the favorite mutation.

pub mod api_types;
mod client;

use async_trait::async_trait;

use crate::error::{FetchError, MutationError};
use crate::feed::{EntityId, Page, PageRequest};

pub use client::HttpProfileClient;

/// The profile service as seen by the feed core.
///
/// Any non-2xx response, transport error or unreadable body is reported as a
/// failure; the core does not distinguish between them.
#[async_trait]
pub trait ProfileApi: Send + Sync {
  async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError>;

  async fn submit_favorite(&self, id: &EntityId) -> Result<(), MutationError>;
}

#[async_trait]
impl<A: ProfileApi + ?Sized> ProfileApi for std::sync::Arc<A> {
  async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
    (**self).fetch_page(request).await
  }

  async fn submit_favorite(&self, id: &EntityId) -> Result<(), MutationError> {
    (**self).submit_favorite(id).await
  }
}
