//! The `persistence` module is the snapshot store the hub and the scheduler
//! read from.
//!
//! The rest of the platform owns the primary data; from this crate's point of
//! view the store only has to answer "what are the comments of template X
//! right now", "what are its aggregates" and "rebuild the derived view".
//! Two backends implement that contract: an embedded `sled` database and a
//! purely in-memory store.

pub mod memory;
pub mod record;
pub mod sled_store;

use async_trait::async_trait;

use crate::hub::TopicId;
use crate::utils::error::StoreError;

pub use memory::MemoryStore;
pub use record::{CommentAuthor, CommentView, NewComment, TemplateStats};
pub use sled_store::SledStore;

/// Read side of the primary data store.
///
/// Every call materializes a fresh view; callers never cache or mutate the
/// returned comment lists.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Comments of `topic_id`, ascending by `created_at`.
    async fn comments(&self, topic_id: TopicId) -> Result<Vec<CommentView>, StoreError>;

    /// Answer/like/comment aggregates as of the last derived view rebuild.
    async fn template_stats(&self, topic_id: TopicId) -> Result<TemplateStats, StoreError>;

    /// Recompute the derived view from the primary data. May be slow.
    async fn rebuild_derived_view(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests;
