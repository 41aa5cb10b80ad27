//! Snapshot store backed by `sled`
//!
//! Layout:
//! - `comments/<template>`: one entry per comment, keyed by the zero-padded
//!   millisecond timestamp followed by the comment id, so iteration yields
//!   comments in chronological order.
//! - `likes/<template>`: one entry per liking user id.
//! - `answers/<template>`: one entry per submitted answer.
//! - `template_search_view`: the derived view, one `TemplateStats` per
//!   template, rebuilt from scratch by `rebuild_derived_view`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sled::{Db, Tree};
use tracing::debug;

use super::SnapshotStore;
use super::record::{CommentView, NewComment, TemplateStats};
use crate::hub::TopicId;
use crate::utils::error::StoreError;

const COMMENTS_PREFIX: &str = "comments/";
const LIKES_PREFIX: &str = "likes/";
const ANSWERS_PREFIX: &str = "answers/";
const DERIVED_VIEW: &str = "template_search_view";

#[derive(Clone)]
pub struct SledStore {
    db: Db,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn tree(&self, prefix: &str, topic_id: TopicId) -> Result<Tree, StoreError> {
        Ok(self.db.open_tree(format!("{prefix}{topic_id}"))?)
    }

    // `open_tree` creates missing trees, so the read path checks first and
    // never leaves an empty tree behind for an unknown template.
    fn existing_tree(&self, name: &str) -> Result<Option<Tree>, StoreError> {
        let exists = self
            .db
            .tree_names()
            .iter()
            .any(|existing| existing.as_ref() == name.as_bytes());
        if !exists {
            return Ok(None);
        }
        Ok(Some(self.db.open_tree(name)?))
    }

    /// Persist a comment and return its feed projection.
    pub fn insert_comment(&self, comment: NewComment) -> Result<CommentView, StoreError> {
        let tree = self.tree(COMMENTS_PREFIX, comment.template_id)?;
        let id = self.db.generate_id()? as i64;
        let view = comment.into_view(id, Utc::now());

        let key = format!("{:020}_{:020}", view.created_at.timestamp_millis(), id);
        tree.insert(key.as_bytes(), serde_json::to_vec(&view)?)?;
        Ok(view)
    }

    /// Record a like. Returns `false` if the user already liked the template.
    pub fn add_like(&self, topic_id: TopicId, user_id: i64) -> Result<bool, StoreError> {
        let tree = self.tree(LIKES_PREFIX, topic_id)?;
        Ok(tree.insert(user_id.to_be_bytes(), Vec::<u8>::new())?.is_none())
    }

    /// Remove a like. Returns `false` if there was nothing to remove.
    pub fn remove_like(&self, topic_id: TopicId, user_id: i64) -> Result<bool, StoreError> {
        let Some(tree) = self.existing_tree(&format!("{LIKES_PREFIX}{topic_id}"))? else {
            return Ok(false);
        };
        Ok(tree.remove(user_id.to_be_bytes())?.is_some())
    }

    pub fn record_answer(&self, topic_id: TopicId, user_id: i64) -> Result<(), StoreError> {
        let tree = self.tree(ANSWERS_PREFIX, topic_id)?;
        let id = self.db.generate_id()?;
        tree.insert(id.to_be_bytes(), user_id.to_be_bytes().to_vec())?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn tree_names(&self) -> Vec<Vec<u8>> {
        let mut names: Vec<Vec<u8>> = self
            .db
            .tree_names()
            .iter()
            .map(|name| name.to_vec())
            .collect();
        names.sort();
        names
    }

    #[cfg(test)]
    pub(crate) fn derived_view_len(&self) -> Result<usize, StoreError> {
        Ok(self.existing_tree(DERIVED_VIEW)?.map_or(0, |view| view.len()))
    }

    /// Template ids that have a tree with the given prefix.
    fn topics_with(&self, prefix: &str) -> Vec<TopicId> {
        self.db
            .tree_names()
            .into_iter()
            .filter_map(|name| {
                std::str::from_utf8(&name)
                    .ok()
                    .and_then(|name| name.strip_prefix(prefix))
                    .and_then(|id| id.parse().ok())
            })
            .collect()
    }

    fn last_comment_at(&self, topic_id: TopicId) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(tree) = self.existing_tree(&format!("{COMMENTS_PREFIX}{topic_id}"))? else {
            return Ok(None);
        };
        match tree.last()? {
            Some((_, value)) => {
                let view: CommentView = serde_json::from_slice(&value)?;
                Ok(Some(view.created_at))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SnapshotStore for SledStore {
    async fn comments(&self, topic_id: TopicId) -> Result<Vec<CommentView>, StoreError> {
        let Some(tree) = self.existing_tree(&format!("{COMMENTS_PREFIX}{topic_id}"))? else {
            return Ok(Vec::new());
        };
        tree.iter()
            .values()
            .map(|value| -> Result<CommentView, StoreError> {
                Ok(serde_json::from_slice(&value?)?)
            })
            .collect()
    }

    async fn template_stats(&self, topic_id: TopicId) -> Result<TemplateStats, StoreError> {
        let Some(view) = self.existing_tree(DERIVED_VIEW)? else {
            return Ok(TemplateStats::empty(topic_id));
        };
        match view.get(topic_id.to_be_bytes())? {
            Some(row) => Ok(serde_json::from_slice(&row)?),
            None => Ok(TemplateStats::empty(topic_id)),
        }
    }

    async fn rebuild_derived_view(&self) -> Result<(), StoreError> {
        let mut rows: BTreeMap<TopicId, TemplateStats> = BTreeMap::new();

        for topic_id in self.topics_with(COMMENTS_PREFIX) {
            let row = rows
                .entry(topic_id)
                .or_insert_with(|| TemplateStats::empty(topic_id));
            row.comment_count = self.tree(COMMENTS_PREFIX, topic_id)?.len() as u64;
            row.last_comment_at = self.last_comment_at(topic_id)?;
        }
        for topic_id in self.topics_with(LIKES_PREFIX) {
            let count = self.tree(LIKES_PREFIX, topic_id)?.len() as u64;
            rows.entry(topic_id)
                .or_insert_with(|| TemplateStats::empty(topic_id))
                .like_count = count;
        }
        for topic_id in self.topics_with(ANSWERS_PREFIX) {
            let count = self.tree(ANSWERS_PREFIX, topic_id)?.len() as u64;
            rows.entry(topic_id)
                .or_insert_with(|| TemplateStats::empty(topic_id))
                .answer_count = count;
        }

        let view = self.db.open_tree(DERIVED_VIEW)?;
        let mut batch = sled::Batch::default();
        for key in view.iter().keys() {
            batch.remove(key?);
        }
        for (topic_id, row) in &rows {
            batch.insert(topic_id.to_be_bytes().to_vec(), serde_json::to_vec(row)?);
        }
        view.apply_batch(batch)?;
        view.flush_async().await?;

        debug!(templates = rows.len(), "derived view rebuilt");
        Ok(())
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .finish()
    }
}
