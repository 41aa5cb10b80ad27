//! In-memory snapshot store
//!
//! Same contract as the sled store, without durability. Used by the `memory`
//! backend and throughout the tests.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::SnapshotStore;
use super::record::{CommentView, NewComment, TemplateStats};
use crate::hub::TopicId;
use crate::utils::error::StoreError;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    comments: HashMap<TopicId, Vec<CommentView>>,
    likes: HashMap<TopicId, HashSet<i64>>,
    answers: HashMap<TopicId, u64>,
    derived: HashMap<TopicId, TemplateStats>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    pub fn insert_comment(&self, comment: NewComment) -> Result<CommentView, StoreError> {
        self.insert_comment_at(comment, Utc::now())
    }

    /// Insert with an explicit creation time. The feed stays sorted by
    /// `created_at`; equal timestamps keep insertion order.
    pub fn insert_comment_at(
        &self,
        comment: NewComment,
        created_at: DateTime<Utc>,
    ) -> Result<CommentView, StoreError> {
        let mut state = self.write()?;
        state.next_id += 1;
        let view = comment.into_view(state.next_id, created_at);

        let feed = state.comments.entry(view.template_id).or_default();
        let at = feed.partition_point(|c| c.created_at <= view.created_at);
        feed.insert(at, view.clone());
        Ok(view)
    }

    pub fn add_like(&self, topic_id: TopicId, user_id: i64) -> Result<bool, StoreError> {
        Ok(self.write()?.likes.entry(topic_id).or_default().insert(user_id))
    }

    pub fn remove_like(&self, topic_id: TopicId, user_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .write()?
            .likes
            .get_mut(&topic_id)
            .is_some_and(|likes| likes.remove(&user_id)))
    }

    pub fn record_answer(&self, topic_id: TopicId, _user_id: i64) -> Result<(), StoreError> {
        *self.write()?.answers.entry(topic_id).or_default() += 1;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn comments(&self, topic_id: TopicId) -> Result<Vec<CommentView>, StoreError> {
        Ok(self
            .read()?
            .comments
            .get(&topic_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn template_stats(&self, topic_id: TopicId) -> Result<TemplateStats, StoreError> {
        Ok(self
            .read()?
            .derived
            .get(&topic_id)
            .cloned()
            .unwrap_or_else(|| TemplateStats::empty(topic_id)))
    }

    async fn rebuild_derived_view(&self) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let mut derived: HashMap<TopicId, TemplateStats> = HashMap::new();

        for (topic_id, feed) in &state.comments {
            let row = derived
                .entry(*topic_id)
                .or_insert_with(|| TemplateStats::empty(*topic_id));
            row.comment_count = feed.len() as u64;
            row.last_comment_at = feed.last().map(|c| c.created_at);
        }
        for (topic_id, likes) in &state.likes {
            derived
                .entry(*topic_id)
                .or_insert_with(|| TemplateStats::empty(*topic_id))
                .like_count = likes.len() as u64;
        }
        for (topic_id, answers) in &state.answers {
            derived
                .entry(*topic_id)
                .or_insert_with(|| TemplateStats::empty(*topic_id))
                .answer_count = *answers;
        }

        state.derived = derived;
        Ok(())
    }
}
