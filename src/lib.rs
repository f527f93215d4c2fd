//! Cache-backed, paginated profile feed.
//!
//! Pages fetched from the profile service are merged into a deduplicated list
//! that is persisted after every merge. When a fetch fails the last persisted
//! snapshot is served instead, and favorites are guarded so each profile is
//! submitted at most once per session.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod remote;
