//! Feed message pushed to subscribers
//!
//! Every push is a full replacement of the client's comment list, never a
//! delta: `{"templateId": <int>, "comments": [...]}` ascending by
//! `createdAt`.

use serde::{Deserialize, Serialize};
use tungstenite::protocol::Message as WsMessage;

use super::topic::TopicId;
use crate::persistence::CommentView;
use crate::utils::error::HubError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentUpdate {
    pub template_id: TopicId,
    pub comments: Vec<CommentView>,
}

impl CommentUpdate {
    pub fn new(template_id: TopicId, comments: Vec<CommentView>) -> Self {
        Self {
            template_id,
            comments,
        }
    }

    pub fn to_ws_message(&self) -> Result<WsMessage, HubError> {
        Ok(WsMessage::text(serde_json::to_string(self)?))
    }
}
