use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hub::TopicId;

/// Public projection of the comment author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// One comment as it appears in a feed snapshot.
///
/// Serialized with camelCase keys: `{id, templateId, userId, content,
/// createdAt, user: {id, name, email}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: i64,
    pub template_id: TopicId,
    pub user_id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub user: CommentAuthor,
}

/// Input for the write helpers of the bundled stores.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub template_id: TopicId,
    pub author: CommentAuthor,
    pub content: String,
}

impl NewComment {
    pub fn new(template_id: TopicId, author: CommentAuthor, content: impl Into<String>) -> Self {
        Self {
            template_id,
            author,
            content: content.into(),
        }
    }

    pub(crate) fn into_view(self, id: i64, created_at: DateTime<Utc>) -> CommentView {
        CommentView {
            id,
            template_id: self.template_id,
            user_id: self.author.id,
            content: self.content,
            created_at,
            user: self.author,
        }
    }
}

/// Row of the derived view: per-template aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateStats {
    pub template_id: TopicId,
    pub comment_count: u64,
    pub like_count: u64,
    pub answer_count: u64,
    pub last_comment_at: Option<DateTime<Utc>>,
}

impl TemplateStats {
    /// Aggregates of a template the derived view has never seen.
    pub fn empty(template_id: TopicId) -> Self {
        Self {
            template_id,
            comment_count: 0,
            like_count: 0,
            answer_count: 0,
            last_comment_at: None,
        }
    }
}
