//! The profile feed: domain types, the fallback controller and the favorite guard.

mod controller;
mod favorites;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{FeedController, FeedPhase, FeedView, FetchOutcome, DEFAULT_PAGE_SIZE};
pub use favorites::{FavoriteGuard, FavoriteOutcome};
pub use types::{ContextName, EntityId, Page, PageRequest, Profile, Rejection, ID_FIELD};
